//! TailInjector (§4.3): calls the handler once before every original RETURN
//! (or appended at the end if the method never returns normally).

use anyhow::{anyhow, Result};
use classfile::strings::ClassName;
use classfile::tree::class::ClassFile;
use classfile::tree::descriptor::parse_method_descriptor;
use classfile::tree::method::MethodNameAndDesc;

use crate::callback::wants_callback_info;
use crate::directive::MethodKey;
use crate::injectors::dispatch::build_void_call_block;
use crate::injectors::find_target_method_mut;
use crate::labels::refresh_labels;

pub fn apply(class: &mut ClassFile, mixin_class: &ClassName, mixin_tree: &ClassFile, target: &MethodKey, handler: &MethodNameAndDesc) -> Result<bool> {
	let handler_method = mixin_tree
		.find_method(handler.name.as_str(), Some(handler.desc.as_str()))
		.ok_or_else(|| anyhow!("TAIL handler {}{} not found on mixin {}", handler.name, handler.desc, mixin_class))?;
	let handler_is_static = handler_method.access.is_static;
	let (handler_params, handler_return) = parse_method_descriptor(handler.desc.as_str())?;
	let wants_info = wants_callback_info(&handler_params);

	let target_class_name = class.name.clone();
	let method = find_target_method_mut(class, target).ok_or_else(|| anyhow!("TAIL target {} not found", target.name))?;
	let code = method.code.as_mut().ok_or_else(|| anyhow!("TAIL target {} has no body", method.name))?;

	let mut labels = refresh_labels(code);
	let positions = code.return_positions();

	if positions.is_empty() {
		let block = build_void_call_block(&target_class_name, mixin_class, handler, handler_is_static, wants_info, handler_return.is_some(), &mut labels);
		code.instructions.extend(block);
	} else {
		for &pos in positions.iter().rev() {
			let block = build_void_call_block(&target_class_name, mixin_class, handler, handler_is_static, wants_info, handler_return.is_some(), &mut labels);
			code.instructions.splice(pos..pos, block);
		}
	}

	code.max_locals = None;
	code.max_stack = None;
	Ok(true)
}

#[cfg(test)]
mod tests {
	use classfile::strings::{MethodDescriptor, MethodName};
	use classfile::tree::class::ClassAccess;
	use classfile::tree::method::code::{Code, Instruction};
	use classfile::tree::method::{Method, MethodAccess};
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn tail_inserts_before_every_return() {
		let mut class = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from("t/Target"), Some(ClassName::from("java/lang/Object")), vec![]);
		let mut method = Method::new(MethodAccess { is_public: true, is_static: true, ..Default::default() }, MethodName::from("testB0"), MethodDescriptor::from("()V"));
		let mut code = Code::default();
		code.push(Instruction::Return);
		method.code = Some(code);
		class.methods.push(method);

		let mut mixin_tree = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from("m/Mixin"), Some(ClassName::from("java/lang/Object")), vec![]);
		mixin_tree.methods.push(Method::new(MethodAccess { is_public: true, is_static: true, ..Default::default() }, MethodName::from("onTail"), MethodDescriptor::from("()V")));

		let mixin_class = ClassName::from("m/Mixin");
		let handler = MethodNameAndDesc { name: MethodName::from("onTail"), desc: MethodDescriptor::from("()V") };
		let target = MethodKey { name: MethodName::from("testB0"), desc: None };

		apply(&mut class, &mixin_class, &mixin_tree, &target, &handler).unwrap();

		let code = class.methods[0].code.as_ref().unwrap();
		assert_eq!(code.instructions.len(), 2);
		assert!(matches!(code.instructions.last().unwrap().instruction, Instruction::Return));
	}
}
