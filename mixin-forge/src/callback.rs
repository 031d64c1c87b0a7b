//! `CallbackInfo` (§4.2): the value type HEAD/TAIL/RETURN inject handlers
//! can request as their first parameter to cancel the target method or
//! override its return value.
//!
//! Transformed bytecode never runs in this crate (no JVM here), so
//! `CallbackInfo` is modeled twice: as the Rust value below (used by the
//! crate's own tests to assert on injector behavior at the value level) and
//! as a synthesized class the injectors reference by name/descriptor when
//! emitting bytecode (`bytecode_class`/`bytecode_descriptor` below).

use classfile::strings::{ClassName, MethodDescriptor};

/// The fixed internal name inject handlers see for the callback type.
pub const CALLBACK_INFO_CLASS: &str = "mixin/CallbackInfo";

pub fn callback_info_class() -> ClassName {
	ClassName::from(CALLBACK_INFO_CLASS)
}

/// `(Lmixin/CallbackInfo;)V`-shaped descriptor fragment for a handler whose
/// only (or trailing) parameter is a `CallbackInfo`.
pub fn callback_info_descriptor() -> MethodDescriptor {
	MethodDescriptor::from(format!("L{CALLBACK_INFO_CLASS};").as_str())
}

/// `true` if `desc`'s parameter list starts with a `CallbackInfo`
/// parameter, the convention injectors use to detect a handler wants one
/// (§4.2: "detected by the first parameter being of CallbackInfo type").
pub fn wants_callback_info(params: &[classfile::tree::descriptor::JType]) -> bool {
	matches!(params.first(), Some(classfile::tree::descriptor::JType::Reference(name)) if name == CALLBACK_INFO_CLASS)
}

/// The Rust-level mirror of a single inject call's `CallbackInfo`, used by
/// this crate's own unit tests to exercise HEAD/RETURN cancellation logic
/// without bytecode.
#[derive(Debug, Clone, Default)]
pub struct CallbackInfo {
	cancelled: bool,
	return_value: Option<CallbackValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallbackValue {
	Int(i32),
	Long(i64),
	Float(f32),
	Double(f64),
	Object(String),
}

impl CallbackInfo {
	pub fn new() -> CallbackInfo {
		CallbackInfo::default()
	}

	pub fn cancel(&mut self) {
		self.cancelled = true;
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancelled
	}

	pub fn set_return_value(&mut self, value: CallbackValue) {
		self.return_value = Some(value);
	}

	pub fn return_value(&self) -> Option<&CallbackValue> {
		self.return_value.as_ref()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cancel_and_override_are_independent() {
		let mut info = CallbackInfo::new();
		assert!(!info.is_cancelled());
		info.cancel();
		info.set_return_value(CallbackValue::Object("InjectedAtHeadA0".to_owned()));
		assert!(info.is_cancelled());
		assert_eq!(info.return_value(), Some(&CallbackValue::Object("InjectedAtHeadA0".to_owned())));
	}

	#[test]
	fn wants_callback_info_checks_leading_param() {
		use classfile::tree::descriptor::JType;
		let params = vec![JType::Reference(CALLBACK_INFO_CLASS.to_owned()), JType::Int];
		assert!(wants_callback_info(&params));
		assert!(!wants_callback_info(&[JType::Int]));
	}
}
