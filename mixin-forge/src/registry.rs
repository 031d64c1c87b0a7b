//! The mixin registry (component C): maps a target class name to the
//! ordered list of mixins that apply to it.
//!
//! Grounded in the same `RwLock`-guarded interior-state pattern the teacher
//! crate uses for its version graph: writers (`register`, `clear`) are
//! expected to run before the transformer is used concurrently by readers
//! (`lookup`), enforced structurally rather than by runtime checks.

use std::collections::HashMap;
use std::sync::RwLock;

use classfile::strings::ClassName;

use crate::directive::{MixinEntry, TargetMatcher};

#[derive(Debug, Default)]
struct RegistryState {
	exact: HashMap<String, Vec<MixinEntry>>,
	predicate: Vec<MixinEntry>,
}

/// Process-wide table of registered mixins. Predicate-matched entries are
/// returned before exact-name matches, each group in insertion order.
#[derive(Debug, Default)]
pub struct Registry {
	state: RwLock<RegistryState>,
}

impl Registry {
	pub fn new() -> Registry {
		Registry::default()
	}

	/// Registers `entry` under every name in its exact target list, or under
	/// the predicate list if it matches by prefix instead.
	pub fn register(&self, entry: MixinEntry) {
		let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
		match &entry.matcher {
			TargetMatcher::Exact(names) => {
				for name in names.clone() {
					state.exact.entry(name.to_string()).or_default().push(entry.clone());
				}
			}
			TargetMatcher::Prefix(_) => state.predicate.push(entry),
		}
	}

	/// Every mixin entry applicable to `target`, predicate matches first.
	pub fn lookup(&self, target: &ClassName) -> Vec<MixinEntry> {
		let state = self.state.read().unwrap_or_else(|e| e.into_inner());
		let mut out: Vec<MixinEntry> = state.predicate.iter().filter(|e| e.matches(target)).cloned().collect();
		if let Some(exact) = state.exact.get(target.as_str()) {
			out.extend(exact.iter().cloned());
		}
		out
	}

	/// Empties both indexes atomically.
	pub fn clear(&self) {
		let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
		state.exact.clear();
		state.predicate.clear();
	}
}

#[cfg(test)]
mod tests {
	use classfile::tree::class::ClassFile;
	use pretty_assertions::assert_eq;

	use super::*;
	use crate::directive::MixinDescriptor;

	fn entry(name: &str, target: &str) -> MixinEntry {
		let tree = ClassFile::new(52, 0, Default::default(), ClassName::from(name), Some(ClassName::from("java/lang/Object")), vec![]);
		let descriptor = MixinDescriptor { targets: vec![target.to_owned()], target_prefix: None, replace_all_methods: None, methods: vec![], fields: vec![] };
		MixinEntry::from_descriptor(&tree, &descriptor).unwrap()
	}

	#[test]
	fn lookup_returns_predicate_before_exact() {
		let registry = Registry::new();
		registry.register(entry("m/Exact", "a/Target"));

		let mut predicate_entry = entry("m/Predicate", "unused");
		predicate_entry.matcher = TargetMatcher::Prefix("a/".to_owned());
		registry.register(predicate_entry);

		let found = registry.lookup(&ClassName::from("a/Target"));
		assert_eq!(found.len(), 2);
		assert_eq!(found[0].mixin_class, ClassName::from("m/Predicate"));
		assert_eq!(found[1].mixin_class, ClassName::from("m/Exact"));
	}

	#[test]
	fn clear_empties_both_indexes() {
		let registry = Registry::new();
		registry.register(entry("m/Exact", "a/Target"));
		registry.clear();
		assert!(registry.lookup(&ClassName::from("a/Target")).is_empty());
	}
}
