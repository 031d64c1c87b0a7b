//! Runtime dispatch surface (component H, §4.9): the two static entry
//! points (`invoke`/`invokeIgnore`) transformed bytecode calls into at
//! runtime.
//!
//! No JVM runs inside this crate, so there is nothing for generated
//! `invokestatic mixin/Runtime.invoke(...)` calls to actually reach. This
//! module models the collaborator anyway, as a plain Rust API: a
//! [`ReplacementRegistry`] callers install replacements into, and the two
//! free functions a loaded-and-run transformed class's bytecode would be
//! calling, so the "manager + fallback table" shape from the reference
//! design is at least documented and exercised by tests even though it is
//! never wired to a real classloader.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;

/// A boxed runtime value, standing in for `java.lang.Object` at the
/// (nonexistent, here) JVM boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeValue {
	Null,
	Bool(bool),
	Int(i32),
	Long(i64),
	Float(f32),
	Double(f64),
	Str(String),
	/// A class literal, by internal name (`I`, `java/lang/String`, ...).
	Class(String),
	Array(Vec<RuntimeValue>),
	/// An opaque instance tagged with its class name, for `instanceof`-style
	/// checks in the cast path.
	Object(String),
}

/// A user-installed stand-in for a method body, keyed by the
/// `owner.name(desc)` string the transformer burns into the generated call.
pub type Replacement = Box<dyn Fn(Option<&RuntimeValue>, &[RuntimeValue]) -> Result<RuntimeValue> + Send + Sync>;

/// Keyed by `desc_string`; the manager half of "manager + fallback table"
/// (§4.9).
#[derive(Default)]
pub struct ReplacementRegistry {
	table: Mutex<HashMap<String, Replacement>>,
}

impl ReplacementRegistry {
	pub fn new() -> ReplacementRegistry {
		ReplacementRegistry::default()
	}

	pub fn install(&self, desc_string: impl Into<String>, replacement: Replacement) {
		let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
		table.insert(desc_string.into(), replacement);
	}

	pub fn clear(&self) {
		let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
		table.clear();
	}

	fn call(&self, desc_string: &str, receiver: Option<&RuntimeValue>, args: &[RuntimeValue]) -> Option<Result<RuntimeValue>> {
		let table = self.table.lock().unwrap_or_else(|e| e.into_inner());
		table.get(desc_string).map(|r| r(receiver, args))
	}
}

fn instance_of(value: &RuntimeValue, class_name: &str) -> bool {
	matches!(value, RuntimeValue::Object(tag) if tag == class_name)
}

/// The zero/empty/default-construction fallback the reference design uses
/// when no replacement is installed: zero for primitives, `null` for
/// reference types, an empty array for array types. Interfaces (real
/// `Proxy`-style recursive replacers) and best-effort constructor calls for
/// instantiable classes are out of reach without a real class loader; both
/// fall back to `Null` here, a documented simplification.
fn fallback_for(return_class: &RuntimeValue) -> RuntimeValue {
	let RuntimeValue::Class(name) = return_class else { return RuntimeValue::Null };
	match name.as_str() {
		"Z" => RuntimeValue::Bool(false),
		"B" | "C" | "S" | "I" => RuntimeValue::Int(0),
		"J" => RuntimeValue::Long(0),
		"F" => RuntimeValue::Float(0.0),
		"D" => RuntimeValue::Double(0.0),
		"V" => RuntimeValue::Null,
		name if name.starts_with('[') => RuntimeValue::Array(Vec::new()),
		_ => RuntimeValue::Null,
	}
}

fn dispatch(registry: &ReplacementRegistry, receiver: Option<&RuntimeValue>, desc_string: &str, return_class: &RuntimeValue, args: &[RuntimeValue]) -> Result<RuntimeValue> {
	if let Some(target_class) = desc_string.strip_prefix("<cast> ") {
		return Ok(match receiver {
			Some(r) if instance_of(r, target_class) => r.clone(),
			_ => RuntimeValue::Null,
		});
	}

	if let Some(result) = registry.call(desc_string, receiver, args) {
		return result;
	}

	Ok(fallback_for(return_class))
}

/// `mixin/Runtime.invoke`: the general replacement entry point.
pub fn invoke(registry: &ReplacementRegistry, receiver: Option<&RuntimeValue>, desc_string: &str, return_class: &RuntimeValue, args: &[RuntimeValue]) -> Result<RuntimeValue> {
	dispatch(registry, receiver, desc_string, return_class, args)
}

/// `mixin/Runtime.invokeIgnore`: the entry point `ReplaceAllMethodsInjector`
/// generates calls through. Same manager/fallback shape as [`invoke`]; the
/// reference design's note that "the fallback path differs" describes a
/// distinction in the original replace-all default handling this crate does
/// not otherwise model, since it has no class loader to construct real
/// fallback instances from.
pub fn invoke_ignore(registry: &ReplacementRegistry, receiver: Option<&RuntimeValue>, desc_string: &str, return_class: &RuntimeValue, args: &[RuntimeValue]) -> Result<RuntimeValue> {
	dispatch(registry, receiver, desc_string, return_class, args)
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn falls_back_to_zero_for_primitive_return() {
		let registry = ReplacementRegistry::new();
		let result = invoke(&registry, None, "t/Target.foo()I", &RuntimeValue::Class("I".to_owned()), &[]).unwrap();
		assert_eq!(result, RuntimeValue::Int(0));
	}

	#[test]
	fn installed_replacement_runs_instead_of_fallback() {
		let registry = ReplacementRegistry::new();
		registry.install("t/Target.foo()I", Box::new(|_, _| Ok(RuntimeValue::Int(42))));
		let result = invoke(&registry, None, "t/Target.foo()I", &RuntimeValue::Class("I".to_owned()), &[]).unwrap();
		assert_eq!(result, RuntimeValue::Int(42));
	}

	#[test]
	fn cast_prefixed_descriptor_returns_receiver_when_matching() {
		let registry = ReplacementRegistry::new();
		let receiver = RuntimeValue::Object("t/Target".to_owned());
		let result = invoke(&registry, Some(&receiver), "<cast> t/Target", &RuntimeValue::Class("t/Target".to_owned()), &[]).unwrap();
		assert_eq!(result, receiver);
	}

	#[test]
	fn cast_prefixed_descriptor_returns_null_when_not_matching() {
		let registry = ReplacementRegistry::new();
		let receiver = RuntimeValue::Object("t/Other".to_owned());
		let result = invoke(&registry, Some(&receiver), "<cast> t/Target", &RuntimeValue::Class("t/Target".to_owned()), &[]).unwrap();
		assert_eq!(result, RuntimeValue::Null);
	}
}
