//! ReturnInjector (§4.3): lets a handler observe and optionally override the
//! value about to be returned at every original RETURN site.
//!
//! Runs *before* HeadInjector in the three-pass driver (§4.6) so that a
//! RETURN HeadInjector generates for a cancelled call is never re-processed
//! here.

use anyhow::{anyhow, Result};
use classfile::strings::ClassName;
use classfile::tree::class::ClassFile;
use classfile::tree::descriptor::parse_method_descriptor;
use classfile::tree::method::code::{Instruction, InstructionListEntry, LvIndex};
use classfile::tree::method::{MethodNameAndDesc, MethodRef};

use crate::bytecode::{box_value, load_param, next_free_local, store_param, unbox_value};
use crate::callback::{callback_info_class, wants_callback_info};
use crate::directive::MethodKey;
use crate::injectors::dispatch::{emit_receiver, invoke_instruction};
use crate::injectors::find_target_method_mut;
use crate::labels::refresh_labels;

pub fn apply(class: &mut ClassFile, mixin_class: &ClassName, mixin_tree: &ClassFile, target: &MethodKey, handler: &MethodNameAndDesc) -> Result<bool> {
	let handler_method = mixin_tree
		.find_method(handler.name.as_str(), Some(handler.desc.as_str()))
		.ok_or_else(|| anyhow!("RETURN handler {}{} not found on mixin {}", handler.name, handler.desc, mixin_class))?;
	let handler_is_static = handler_method.access.is_static;
	let (handler_params, handler_return) = parse_method_descriptor(handler.desc.as_str())?;
	let wants_info = wants_callback_info(&handler_params);

	let target_class_name = class.name.clone();
	let method = find_target_method_mut(class, target).ok_or_else(|| anyhow!("RETURN target {} not found", target.name))?;
	let (_, target_return) = parse_method_descriptor(method.descriptor.as_str())?;
	let Some(return_type) = target_return else {
		return Err(anyhow!("RETURN inject on void method {} has nothing to observe", target.name));
	};
	let code = method.code.as_mut().ok_or_else(|| anyhow!("RETURN target {} has no body", method.name))?;

	let mut labels = refresh_labels(code);
	let value_local = next_free_local(code);
	let info_local = LvIndex::new(value_local.index + return_type.category() as u16);

	let positions = code.return_positions();

	for &pos in positions.iter().rev() {
		let mut block = Vec::new();
		block.push(InstructionListEntry::plain(store_param(&return_type, value_local)));

		if wants_info {
			block.push(InstructionListEntry::plain(Instruction::New(callback_info_class())));
			block.push(InstructionListEntry::plain(Instruction::Dup));
			block.push(InstructionListEntry::plain(Instruction::InvokeSpecial(
				MethodRef { class: callback_info_class(), name: "<init>".into(), desc: "()V".into() },
				false,
			)));
			block.push(InstructionListEntry::plain(Instruction::Dup));
			block.push(InstructionListEntry::plain(Instruction::AStore(info_local)));

			block.push(InstructionListEntry::plain(load_param(&return_type, value_local)));
			if let Some(box_insn) = box_value(&return_type) {
				block.push(InstructionListEntry::plain(box_insn));
			}
			block.push(InstructionListEntry::plain(Instruction::InvokeVirtual(MethodRef {
				class: callback_info_class(),
				name: "setReturnValue".into(),
				desc: "(Ljava/lang/Object;)V".into(),
			})));
		}

		block.extend(emit_receiver(&target_class_name, mixin_class, handler_is_static, &mut labels));
		if wants_info {
			block.push(InstructionListEntry::plain(Instruction::ALoad(info_local)));
		}
		block.push(InstructionListEntry::plain(invoke_instruction(mixin_class, handler, handler_is_static)));
		if handler_return.is_some() {
			block.push(InstructionListEntry::plain(Instruction::Pop));
		}

		if wants_info {
			let skip = labels.fresh();
			let end = labels.fresh();
			block.push(InstructionListEntry::plain(Instruction::ALoad(info_local)));
			block.push(InstructionListEntry::plain(Instruction::InvokeVirtual(MethodRef {
				class: callback_info_class(),
				name: "getReturnValue".into(),
				desc: "()Ljava/lang/Object;".into(),
			})));
			block.push(InstructionListEntry::plain(Instruction::Dup));
			block.push(InstructionListEntry::plain(Instruction::IfNull(skip)));
			for insn in unbox_value(Some(&return_type)) {
				block.push(InstructionListEntry::plain(insn));
			}
			block.push(InstructionListEntry::plain(store_param(&return_type, value_local)));
			block.push(InstructionListEntry::plain(Instruction::Goto(end)));
			block.push(InstructionListEntry { label: Some(skip), instruction: Instruction::Pop });
			block.push(InstructionListEntry { label: Some(end), instruction: Instruction::Nop });
		}

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
	use classfile::tree::method::code::Code;
	use classfile::tree::method::{Method, MethodAccess};
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn wraps_return_value_through_handler() {
		let mut class = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from("t/Target"), Some(ClassName::from("java/lang/Object")), vec![]);
		let mut method = Method::new(MethodAccess { is_public: true, is_static: true, ..Default::default() }, MethodName::from("testB0"), MethodDescriptor::from("()Ljava/lang/String;"));
		let mut code = Code::default();
		code.push(Instruction::Ldc(classfile::tree::method::code::Loadable::String("StaticFinalString".to_owned())));
		code.push(Instruction::AReturn);
		method.code = Some(code);
		class.methods.push(method);

		let mut mixin_tree = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from("m/Mixin"), Some(ClassName::from("java/lang/Object")), vec![]);
		mixin_tree.methods.push(Method::new(
			MethodAccess { is_public: true, is_static: true, ..Default::default() },
			MethodName::from("onReturnB0"),
			MethodDescriptor::from("(Ljava/lang/Object;)Ljava/lang/Object;"),
		));

		let mixin_class = ClassName::from("m/Mixin");
		let handler = MethodNameAndDesc { name: MethodName::from("onReturnB0"), desc: MethodDescriptor::from("(Ljava/lang/Object;)Ljava/lang/Object;") };
		let target = MethodKey { name: MethodName::from("testB0"), desc: None };

		apply(&mut class, &mixin_class, &mixin_tree, &target, &handler).unwrap();

		let code = class.methods[0].code.as_ref().unwrap();
		assert_eq!(code.instructions.last().map(|e| matches!(e.instruction, Instruction::AReturn)), Some(true));
		assert!(code.instructions.len() > 3);
	}
}
