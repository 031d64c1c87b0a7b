//! One module per directive family (component E). Each injector takes the
//! target [`ClassFile`], the resolved directive fields, the mixin's own
//! classfile tree (for handler lookup), and returns whether it changed
//! anything; errors here are *directive-shape-invalid*/*signature-mismatch*
//! failures (§7) the caller (component F) catches and reports per-directive.

pub mod dispatch;

pub mod accessor;
pub mod copy;
pub mod head;
pub mod invoke;
pub mod invoker;
pub mod modify_arg;
pub mod modify_constant;
pub mod modify_return_value;
pub mod overwrite;
pub mod redirect;
pub mod remove;
pub mod replace_all;
pub mod return_injector;
pub mod tail;

use classfile::tree::class::ClassFile;
use classfile::tree::method::Method;

use crate::directive::MethodKey;

/// Finds the target method this directive applies to, per §3's matching
/// rule (exact descriptor if supplied, else name-only).
pub fn find_target_method<'a>(class: &'a ClassFile, key: &MethodKey) -> Option<&'a Method> {
	class.methods.iter().find(|m| key.matches(&m.name, &m.descriptor))
}

pub fn find_target_method_mut<'a>(class: &'a mut ClassFile, key: &MethodKey) -> Option<&'a mut Method> {
	class.methods.iter_mut().find(|m| key.matches(&m.name, &m.descriptor))
}
