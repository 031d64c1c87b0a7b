//! Class transformer entry point (component G, §4.8).

use anyhow::{Context, Result};
use classfile::strings::ClassName;
use classfile::{reader, writer};

use crate::context;
pub use crate::context::Diagnostic;
use crate::directive::MixinClassSource;
use crate::registry::Registry;

/// Outcome of one [`Transformer::transform`] call.
pub struct TransformOutcome {
	pub bytes: Vec<u8>,
	pub changed: bool,
	pub diagnostics: Vec<Diagnostic>,
}

/// Owns the mixin registry and drives §4.8's four steps over one class at a
/// time.
pub struct Transformer {
	registry: Registry,
}

impl Transformer {
	pub fn new(registry: Registry) -> Transformer {
		Transformer { registry }
	}

	pub fn registry(&self) -> &Registry {
		&self.registry
	}

	/// Transforms `bytes` (the unmodified classfile for `class_name`) against
	/// every mixin registered for it. Returns the input unchanged (step 1/4
	/// short-circuits) if no mixin applies or none of them changed anything.
	pub fn transform(&self, class_name: &ClassName, bytes: &[u8], mixin_source: &dyn MixinClassSource) -> Result<TransformOutcome> {
		let entries = self.registry.lookup(class_name);
		if entries.is_empty() {
			return Ok(TransformOutcome { bytes: bytes.to_vec(), changed: false, diagnostics: Vec::new() });
		}

		let mut class = reader::read_class(bytes).with_context(|| format!("parsing classfile bytes for {class_name}"))?;

		let mut any_change = false;
		let mut diagnostics = Vec::new();
		for entry in &entries {
			let (changed, entry_diagnostics) = context::apply(&mut class, entry, mixin_source);
			any_change |= changed;
			for d in &entry_diagnostics {
				log::warn!("{}: mixin {} — {}", d.target_class, d.mixin_class, d.message);
			}
			diagnostics.extend(entry_diagnostics);
		}

		if !any_change {
			return Ok(TransformOutcome { bytes: bytes.to_vec(), changed: false, diagnostics });
		}

		let new_bytes = writer::write_class(&class).with_context(|| format!("reserializing transformed classfile for {class_name}"))?;
		Ok(TransformOutcome { bytes: new_bytes, changed: true, diagnostics })
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use classfile::strings::{MethodDescriptor, MethodName};
	use classfile::tree::class::{ClassAccess, ClassFile};
	use classfile::tree::method::code::{Code, Instruction};
	use classfile::tree::method::{Method, MethodAccess};
	use pretty_assertions::assert_eq;

	use super::*;
	use crate::directive::{MixinDescriptor, MixinEntry};

	#[test]
	fn unregistered_class_is_returned_unchanged() {
		let transformer = Transformer::new(Registry::new());
		let source: HashMap<ClassName, ClassFile> = HashMap::new();
		let bytes = vec![1, 2, 3];
		let outcome = transformer.transform(&ClassName::from("t/Target"), &bytes, &source).unwrap();
		assert!(!outcome.changed);
		assert_eq!(outcome.bytes, bytes);
	}

	#[test]
	fn registered_mixin_changes_and_reserializes_bytes() {
		let mut class = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from("t/Target"), Some(ClassName::from("java/lang/Object")), vec![]);
		let mut method = Method::new(MethodAccess { is_public: true, ..Default::default() }, MethodName::from("testA0"), MethodDescriptor::from("()V"));
		let mut code = Code::default();
		code.push(Instruction::Return);
		method.code = Some(code);
		class.methods.push(method);
		let original_bytes = writer::write_class(&class).unwrap();

		let mixin_class = ClassName::from("m/Mixin");
		let mut mixin_tree = ClassFile::new(52, 0, ClassAccess::default(), mixin_class.clone(), Some(ClassName::from("java/lang/Object")), vec![]);
		mixin_tree.methods.push(Method::new(MethodAccess { is_public: true, ..Default::default() }, MethodName::from("onHead"), MethodDescriptor::from("()V")));

		let descriptor_json = r#"{
			"targets": ["t/Target"],
			"methods": [{"kind":"inject","handler":"onHead","method":"testA0","target":"head","at":{"value":"HEAD"}}]
		}"#;
		let descriptor: MixinDescriptor = serde_json::from_str(descriptor_json).unwrap();
		let entry = MixinEntry::from_descriptor(&mixin_tree, &descriptor).unwrap();

		let registry = Registry::new();
		registry.register(entry);
		let transformer = Transformer::new(registry);

		let mut source = HashMap::new();
		source.insert(mixin_class, mixin_tree);

		let outcome = transformer.transform(&ClassName::from("t/Target"), &original_bytes, &source).unwrap();
		assert!(outcome.changed);
		assert_ne!(outcome.bytes, original_bytes);

		let reparsed = reader::read_class(&outcome.bytes).unwrap();
		let transformed_method = reparsed.find_method("testA0", None).unwrap();
		let code = transformed_method.code.as_ref().unwrap();
		assert!(code.instructions.iter().any(|e| matches!(&e.instruction, Instruction::InvokeStatic(m, _) if m.name == MethodName::from("onHead"))));
	}
}
