//! ModifyReturnValueInjector (§4.4): lets a handler rewrite the value about
//! to be returned, at every original RETURN site. Unlike ReturnInjector this
//! never touches `CallbackInfo` — the handler's own parameter/return types
//! carry the value directly.

use anyhow::{anyhow, Result};
use classfile::strings::ClassName;
use classfile::tree::class::ClassFile;
use classfile::tree::descriptor::parse_method_descriptor;
use classfile::tree::method::code::InstructionListEntry;
use classfile::tree::method::MethodNameAndDesc;

use crate::bytecode::{load_param, next_free_local, store_param};
use crate::directive::MethodKey;
use crate::injectors::dispatch::{emit_receiver, invoke_instruction};
use crate::injectors::find_target_method_mut;
use crate::labels::refresh_labels;

pub fn apply(class: &mut ClassFile, mixin_class: &ClassName, mixin_tree: &ClassFile, target: &MethodKey, handler: &MethodNameAndDesc) -> Result<bool> {
	let handler_method = mixin_tree
		.find_method(handler.name.as_str(), Some(handler.desc.as_str()))
		.ok_or_else(|| anyhow!("ModifyReturnValue handler {}{} not found on mixin {}", handler.name, handler.desc, mixin_class))?;
	let handler_is_static = handler_method.access.is_static;
	let (handler_params, handler_return) = parse_method_descriptor(handler.desc.as_str())?;
	let Some(first_param) = handler_params.first() else {
		return Err(anyhow!("ModifyReturnValue handler {} must take the original return value as its first parameter", handler.name));
	};
	if handler_params.len() > 1 {
		return Err(anyhow!("ModifyReturnValue handler {} must take only the original return value, found {} parameters", handler.name, handler_params.len()));
	}
	let Some(handler_return) = handler_return else {
		return Err(anyhow!("ModifyReturnValue handler {} must return a value", handler.name));
	};
	if handler_return != *first_param {
		return Err(anyhow!("ModifyReturnValue handler {} must return the same type as its first parameter", handler.name));
	}

	let target_class_name = class.name.clone();
	let method = find_target_method_mut(class, target).ok_or_else(|| anyhow!("ModifyReturnValue target {} not found", target.name))?;
	let (_, target_return) = parse_method_descriptor(method.descriptor.as_str())?;
	let Some(return_type) = target_return else {
		return Err(anyhow!("ModifyReturnValue inject on void method {}", target.name));
	};
	if return_type != *first_param {
		return Err(anyhow!("ModifyReturnValue handler {} expects {:?}, target {} returns {:?}", handler.name, first_param, target.name, return_type));
	}

	let code = method.code.as_mut().ok_or_else(|| anyhow!("ModifyReturnValue target {} has no body", method.name))?;
	let mut labels = refresh_labels(code);
	let value_local = next_free_local(code);
	let positions = code.return_positions();

	for &pos in positions.iter().rev() {
		let mut block = vec![InstructionListEntry::plain(store_param(&return_type, value_local))];
		block.extend(emit_receiver(&target_class_name, mixin_class, handler_is_static, &mut labels));
		block.push(InstructionListEntry::plain(load_param(&return_type, value_local)));
		block.push(InstructionListEntry::plain(invoke_instruction(mixin_class, handler, handler_is_static)));
		block.push(InstructionListEntry::plain(store_param(&return_type, value_local)));
		block.push(InstructionListEntry::plain(load_param(&return_type, value_local)));

		code.instructions.splice(pos..pos, block);
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
	fn rewrites_return_value_before_return() {
		let mut class = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from("t/Target"), Some(ClassName::from("java/lang/Object")), vec![]);
		let mut method = Method::new(MethodAccess { is_public: true, is_static: true, ..Default::default() }, MethodName::from("testC1"), MethodDescriptor::from("()I"));
		let mut code = Code::default();
		code.push(Instruction::IConst1);
		code.push(Instruction::IReturn);
		method.code = Some(code);
		class.methods.push(method);

		let mut mixin_tree = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from("m/Mixin"), Some(ClassName::from("java/lang/Object")), vec![]);
		mixin_tree.methods.push(Method::new(MethodAccess { is_public: true, is_static: true, ..Default::default() }, MethodName::from("onModifyReturn"), MethodDescriptor::from("(I)I")));

		let mixin_class = ClassName::from("m/Mixin");
		let handler = MethodNameAndDesc { name: MethodName::from("onModifyReturn"), desc: MethodDescriptor::from("(I)I") };
		let target = MethodKey { name: MethodName::from("testC1"), desc: None };

		apply(&mut class, &mixin_class, &mixin_tree, &target, &handler).unwrap();

		let code = class.methods[0].code.as_ref().unwrap();
		assert_eq!(code.instructions.len(), 7);
		assert!(matches!(code.instructions.last().unwrap().instruction, Instruction::IReturn));
	}

	#[test]
	fn rejects_void_target() {
		let mut class = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from("t/Target"), Some(ClassName::from("java/lang/Object")), vec![]);
		let mut method = Method::new(MethodAccess { is_public: true, is_static: true, ..Default::default() }, MethodName::from("testC1"), MethodDescriptor::from("()V"));
		let mut code = Code::default();
		code.push(Instruction::Return);
		method.code = Some(code);
		class.methods.push(method);

		let mut mixin_tree = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from("m/Mixin"), Some(ClassName::from("java/lang/Object")), vec![]);
		mixin_tree.methods.push(Method::new(MethodAccess { is_public: true, is_static: true, ..Default::default() }, MethodName::from("onModifyReturn"), MethodDescriptor::from("(I)I")));

		let mixin_class = ClassName::from("m/Mixin");
		let handler = MethodNameAndDesc { name: MethodName::from("onModifyReturn"), desc: MethodDescriptor::from("(I)I") };
		let target = MethodKey { name: MethodName::from("testC1"), desc: None };

		assert!(apply(&mut class, &mixin_class, &mixin_tree, &target, &handler).is_err());
	}

	#[test]
	fn rejects_handler_with_extra_parameter() {
		let mut class = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from("t/Target"), Some(ClassName::from("java/lang/Object")), vec![]);
		let mut method = Method::new(MethodAccess { is_public: true, is_static: true, ..Default::default() }, MethodName::from("testC1"), MethodDescriptor::from("()I"));
		let mut code = Code::default();
		code.push(Instruction::IConst1);
		code.push(Instruction::IReturn);
		method.code = Some(code);
		class.methods.push(method);

		let mut mixin_tree = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from("m/Mixin"), Some(ClassName::from("java/lang/Object")), vec![]);
		mixin_tree.methods.push(Method::new(MethodAccess { is_public: true, is_static: true, ..Default::default() }, MethodName::from("onModifyReturn"), MethodDescriptor::from("(II)I")));

		let mixin_class = ClassName::from("m/Mixin");
		let handler = MethodNameAndDesc { name: MethodName::from("onModifyReturn"), desc: MethodDescriptor::from("(II)I") };
		let target = MethodKey { name: MethodName::from("testC1"), desc: None };

		assert!(apply(&mut class, &mixin_class, &mixin_tree, &target, &handler).is_err());
	}
}
