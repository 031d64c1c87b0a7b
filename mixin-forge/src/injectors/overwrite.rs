//! OverwriteInjector (§4.5): replaces a target method's entire body with the
//! handler's, via the inline code generator (component D).

use anyhow::{anyhow, Result};
use classfile::strings::ClassName;
use classfile::tree::class::ClassFile;
use classfile::tree::descriptor::parse_method_descriptor;
use classfile::tree::method::MethodNameAndDesc;

use crate::directive::MethodKey;
use crate::inline::{inline_body, InlineRequest, ShadowBindings};
use crate::injectors::find_target_method_mut;

pub fn apply(class: &mut ClassFile, mixin_class: &ClassName, target: &MethodKey, handler: &MethodNameAndDesc, shadows: &ShadowBindings, source: &dyn crate::directive::MixinClassSource) -> Result<bool> {
	let target_class_name = class.name.clone();
	let method = find_target_method_mut(class, target).ok_or_else(|| anyhow!("Overwrite target {} not found", target.name))?;
	let (target_params, target_return) = parse_method_descriptor(method.descriptor.as_str())?;
	let target_is_static = method.access.is_static;

	let req = InlineRequest {
		mixin_class,
		handler,
		target_class: &target_class_name,
		target_is_static,
		target_params: &target_params,
		target_return: target_return.as_ref(),
		shadows,
		source,
	};
	let new_code = inline_body(&req)?;

	method.code = Some(new_code);
	method.access.is_abstract = false;
	method.access.is_native = false;
	method.exceptions = None;
	method.method_parameters = None;
	Ok(true)
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use classfile::strings::{MethodDescriptor, MethodName};
	use classfile::tree::class::ClassAccess;
	use classfile::tree::method::code::{Code, Instruction, Loadable};
	use classfile::tree::method::{Method, MethodAccess};
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn overwrite_replaces_target_body() {
		let mut class = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from("t/Target"), Some(ClassName::from("java/lang/Object")), vec![]);
		let mut original = Method::new(MethodAccess { is_public: true, ..Default::default() }, MethodName::from("testA0"), MethodDescriptor::from("()Ljava/lang/String;"));
		let mut original_code = Code::default();
		original_code.push(Instruction::Ldc(Loadable::String("DynamicString".to_owned())));
		original_code.push(Instruction::AReturn);
		original.code = Some(original_code);
		class.methods.push(original);

		let mixin_class = ClassName::from("m/Mixin");
		let mut mixin_tree = ClassFile::new(52, 0, ClassAccess::default(), mixin_class.clone(), Some(ClassName::from("java/lang/Object")), vec![]);
		let mut overwrite_method = Method::new(MethodAccess { is_public: true, ..Default::default() }, MethodName::from("overwriteA0"), MethodDescriptor::from("()Ljava/lang/String;"));
		let mut overwrite_code = Code::default();
		overwrite_code.push(Instruction::Ldc(Loadable::String("OverwrittenA0".to_owned())));
		overwrite_code.push(Instruction::AReturn);
		overwrite_method.code = Some(overwrite_code);
		mixin_tree.methods.push(overwrite_method);

		let mut source = HashMap::new();
		source.insert(mixin_class.clone(), mixin_tree);

		let handler = MethodNameAndDesc { name: MethodName::from("overwriteA0"), desc: MethodDescriptor::from("()Ljava/lang/String;") };
		let target = MethodKey { name: MethodName::from("testA0"), desc: None };

		apply(&mut class, &mixin_class, &target, &handler, &ShadowBindings::default(), &source).unwrap();

		let code = class.methods[0].code.as_ref().unwrap();
		assert!(matches!(&code.instructions[0].instruction, Instruction::Ldc(Loadable::String(s)) if s == "OverwrittenA0"));
	}
}
