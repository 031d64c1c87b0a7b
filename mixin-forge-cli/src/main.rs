//! CLI front-end for `mixin-forge`: reads mixin sidecar descriptors and
//! their owning `.class` files from a mixin directory, registers them, then
//! walks a target directory rewriting every `.class` file the registry
//! applies to into an output directory.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use classfile::strings::ClassName;
use classfile::tree::class::ClassFile;
use clap::{Parser, Subcommand, ValueEnum};
use mixin_forge::directive::{MixinClassSource, MixinDescriptor, MixinEntry};
use mixin_forge::{Registry, Transformer};
use walkdir::WalkDir;

#[derive(Debug, Parser)]
#[command(name = "mixin-forge-cli")]
struct Cli {
	/// Be verbose.
	#[arg(short = 'v', long = "verbose")]
	verbose: bool,

	#[command(subcommand)]
	command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
	/// Applies every mixin in `mixin_dir` to the `.class` files under
	/// `target_dir`, writing the (possibly rewritten) classfiles to
	/// `output_dir`.
	Transform {
		#[arg(long = "target-dir")]
		target_dir: PathBuf,
		#[arg(long = "mixin-dir")]
		mixin_dir: PathBuf,
		#[arg(long = "output-dir")]
		output_dir: PathBuf,
		/// Report what would change without writing any output.
		#[arg(long)]
		dry_run: bool,
		#[arg(long = "on-error", value_enum, default_value_t)]
		on_error: OnError,
	},
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum OnError {
	/// Keep going after a class fails to transform, reporting every failure at the end.
	#[default]
	CollectAll,
	/// Abort the whole run on the first class that fails to transform.
	FailFast,
}

fn setup_logging(verbose: bool) -> Result<()> {
	let level = if verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };
	fern::Dispatch::new()
		.format(|out, message, record| out.finish(format_args!("[{} {}] {}", record.target(), record.level(), message)))
		.level(level)
		.chain(std::io::stderr())
		.apply()
		.context("failed to install logger")
}

/// An in-memory mixin class store, loaded once from `mixin_dir` and reused
/// both as the registry's source of `MixinEntry`s and as the
/// [`MixinClassSource`] injectors resolve handler bodies through (§4.7).
struct MixinStore(HashMap<ClassName, ClassFile>);

impl MixinClassSource for MixinStore {
	fn get(&self, name: &ClassName) -> Result<ClassFile> {
		self.0.get(name).cloned().with_context(|| format!("no mixin class loaded for {name}"))
	}
}

/// Internal class name for a `.class` file, derived from its path relative
/// to `root` (directory separators become `/`, the convention every `.class`
/// directory tree on disk already follows).
fn class_name_for(root: &Path, path: &Path) -> Result<ClassName> {
	let relative = path.strip_prefix(root).with_context(|| format!("{path:?} is not under {root:?}"))?;
	let without_extension = relative.with_extension("");
	let name = without_extension.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect::<Vec<_>>().join("/");
	Ok(ClassName::from(name.as_str()))
}

fn load_mixins(mixin_dir: &Path, registry: &Registry) -> Result<MixinStore> {
	let mut classes = HashMap::new();

	for entry in WalkDir::new(mixin_dir).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()) {
		let path = entry.path();
		if path.extension().and_then(|e| e.to_str()) != Some("json") {
			continue;
		}
		let Some(stem) = path.file_name().and_then(|n| n.to_str()).and_then(|n| n.strip_suffix(".mixin.json")) else { continue };

		let class_path = path.with_file_name(format!("{stem}.class"));
		let class_bytes = fs::read(&class_path).with_context(|| format!("reading mixin class bytes {class_path:?}"))?;
		let mixin_tree = classfile::reader::read_class(&class_bytes).with_context(|| format!("parsing mixin class {class_path:?}"))?;

		let descriptor_text = fs::read_to_string(path).with_context(|| format!("reading mixin descriptor {path:?}"))?;
		let descriptor: MixinDescriptor = serde_json::from_str(&descriptor_text).with_context(|| format!("parsing mixin descriptor {path:?}"))?;

		let entry = MixinEntry::from_descriptor(&mixin_tree, &descriptor).with_context(|| format!("lowering mixin descriptor {path:?}"))?;
		log::info!("loaded mixin {} ({} directives)", entry.mixin_class, entry.directives.len());

		classes.insert(mixin_tree.name.clone(), mixin_tree);
		registry.register(entry);
	}

	Ok(MixinStore(classes))
}

fn run_transform(target_dir: &Path, mixin_dir: &Path, output_dir: &Path, dry_run: bool, on_error: OnError) -> Result<()> {
	let registry = Registry::new();
	let source = load_mixins(mixin_dir, &registry)?;
	let transformer = Transformer::new(registry);

	let mut changed_count = 0usize;
	let mut failures: Vec<(PathBuf, anyhow::Error)> = Vec::new();

	for entry in WalkDir::new(target_dir).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()) {
		let path = entry.path();
		if path.extension().and_then(|e| e.to_str()) != Some("class") {
			continue;
		}

		let result = (|| -> Result<()> {
			let class_name = class_name_for(target_dir, path)?;
			let bytes = fs::read(path).with_context(|| format!("reading {path:?}"))?;
			let outcome = transformer.transform(&class_name, &bytes, &source).with_context(|| format!("transforming {class_name}"))?;

			if outcome.changed {
				changed_count += 1;
				log::info!("rewrote {class_name} ({} diagnostics)", outcome.diagnostics.len());
			}

			if !dry_run {
				let relative = path.strip_prefix(target_dir).with_context(|| format!("{path:?} is not under {target_dir:?}"))?;
				let out_path = output_dir.join(relative);
				if let Some(parent) = out_path.parent() {
					fs::create_dir_all(parent).with_context(|| format!("creating {parent:?}"))?;
				}
				fs::write(&out_path, &outcome.bytes).with_context(|| format!("writing {out_path:?}"))?;
			}

			Ok(())
		})();

		if let Err(e) = result {
			if matches!(on_error, OnError::FailFast) {
				return Err(e);
			}
			failures.push((path.to_path_buf(), e));
		}
	}

	for (path, error) in &failures {
		log::error!("{path:?}: {error:#}");
	}

	log::info!("{changed_count} class(es) rewritten, {} failure(s)", failures.len());

	if !failures.is_empty() {
		return Err(anyhow!("{} class(es) failed to transform", failures.len()));
	}
	Ok(())
}

fn main() -> Result<()> {
	let cli = Cli::parse();
	setup_logging(cli.verbose)?;

	match cli.command {
		Command::Transform { target_dir, mixin_dir, output_dir, dry_run, on_error } => run_transform(&target_dir, &mixin_dir, &output_dir, dry_run, on_error),
	}
}
