//! HeadInjector (§4.3): runs the handler before any original instruction,
//! with an optional guarded early return when the handler cancels.

use anyhow::{anyhow, Result};
use classfile::strings::{ClassName, MethodDescriptor};
use classfile::tree::class::ClassFile;
use classfile::tree::descriptor::parse_method_descriptor;
use classfile::tree::method::code::{Instruction, InstructionListEntry};
use classfile::tree::method::{MethodNameAndDesc, MethodRef};

use crate::bytecode::{next_free_local, return_for, unbox_value};
use crate::callback::{callback_info_class, wants_callback_info};
use crate::directive::MethodKey;
use crate::injectors::dispatch::{emit_receiver, invoke_instruction};
use crate::injectors::find_target_method_mut;
use crate::labels::refresh_labels;

pub fn apply(class: &mut ClassFile, mixin_class: &ClassName, mixin_tree: &ClassFile, target: &MethodKey, handler: &MethodNameAndDesc, cancellable: bool) -> Result<bool> {
	let handler_method = mixin_tree
		.find_method(handler.name.as_str(), Some(handler.desc.as_str()))
		.ok_or_else(|| anyhow!("HEAD handler {}{} not found on mixin {}", handler.name, handler.desc, mixin_class))?;
	let handler_is_static = handler_method.access.is_static;
	let (handler_params, handler_return) = parse_method_descriptor(handler.desc.as_str())?;
	let wants_info = wants_callback_info(&handler_params);
	if cancellable && !wants_info {
		return Err(anyhow!("HEAD inject on {} is cancellable but its handler takes no CallbackInfo", target.name));
	}

	let target_class_name = class.name.clone();
	let method = find_target_method_mut(class, target).ok_or_else(|| anyhow!("HEAD target {} not found", target.name))?;
	let (_, target_return) = parse_method_descriptor(method.descriptor.as_str())?;
	let code = method.code.as_mut().ok_or_else(|| anyhow!("HEAD target {} has no body", method.name))?;

	let mut labels = refresh_labels(code);
	let info_local = next_free_local(code);

	let mut prelude: Vec<InstructionListEntry> = Vec::new();
	prelude.extend(emit_receiver(&target_class_name, mixin_class, handler_is_static, &mut labels));

	if wants_info {
		prelude.push(InstructionListEntry::plain(Instruction::New(callback_info_class())));
		prelude.push(InstructionListEntry::plain(Instruction::Dup));
		prelude.push(InstructionListEntry::plain(Instruction::InvokeSpecial(
			MethodRef { class: callback_info_class(), name: "<init>".into(), desc: MethodDescriptor::from("()V") },
			false,
		)));
		prelude.push(InstructionListEntry::plain(Instruction::Dup));
		prelude.push(InstructionListEntry::plain(Instruction::AStore(info_local)));
	}

	prelude.push(InstructionListEntry::plain(invoke_instruction(mixin_class, handler, handler_is_static)));
	if handler_return.is_some() {
		prelude.push(InstructionListEntry::plain(Instruction::Pop));
	}

	if cancellable {
		let skip = labels.fresh();
		prelude.push(InstructionListEntry::plain(Instruction::ALoad(info_local)));
		prelude.push(InstructionListEntry::plain(Instruction::InvokeVirtual(MethodRef {
			class: callback_info_class(),
			name: "isCancelled".into(),
			desc: MethodDescriptor::from("()Z"),
		})));
		prelude.push(InstructionListEntry::plain(Instruction::IfEq(skip)));
		prelude.push(InstructionListEntry::plain(Instruction::ALoad(info_local)));
		prelude.push(InstructionListEntry::plain(Instruction::InvokeVirtual(MethodRef {
			class: callback_info_class(),
			name: "getReturnValue".into(),
			desc: MethodDescriptor::from("()Ljava/lang/Object;"),
		})));
		for insn in unbox_value(target_return.as_ref()) {
			prelude.push(InstructionListEntry::plain(insn));
		}
		prelude.push(InstructionListEntry::plain(return_for(target_return.as_ref())));
		prelude.push(InstructionListEntry { label: Some(skip), instruction: Instruction::Nop });
	}

	code.instructions.splice(0..0, prelude);
	code.max_locals = None;
	code.max_stack = None;
	Ok(true)
}

#[cfg(test)]
mod tests {
	use classfile::strings::{FieldDescriptor, MethodName};
	use classfile::tree::class::ClassAccess;
	use classfile::tree::method::code::Code;
	use classfile::tree::method::{Method, MethodAccess};
	use pretty_assertions::assert_eq;

	use super::*;

	fn target_class() -> ClassFile {
		let mut class = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from("t/Target"), Some(ClassName::from("java/lang/Object")), vec![]);
		let mut method = Method::new(MethodAccess { is_public: true, ..Default::default() }, MethodName::from("testA0"), MethodDescriptor::from("()Ljava/lang/String;"));
		let mut code = Code::default();
		code.push(Instruction::ALoad(classfile::tree::method::code::LvIndex::new(0)));
		code.push(Instruction::GetField(classfile::tree::field::FieldRef {
			class: ClassName::from("t/Target"),
			name: "dynamicString".into(),
			desc: FieldDescriptor::from("Ljava/lang/String;"),
		}));
		code.push(Instruction::AReturn);
		method.code = Some(code);
		class.methods.push(method);
		class
	}

	fn mixin_class_tree() -> ClassFile {
		let mut tree = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from("m/Mixin"), Some(ClassName::from("java/lang/Object")), vec![]);
		tree.methods.push(Method::new(
			MethodAccess { is_public: true, is_static: true, ..Default::default() },
			MethodName::from("onHeadA0"),
			MethodDescriptor::from(format!("(L{};)V", crate::callback::CALLBACK_INFO_CLASS).as_str()),
		));
		tree
	}

	#[test]
	fn cancellable_head_prepends_guard_before_original_code() {
		let mut class = target_class();
		let mixin_class = ClassName::from("m/Mixin");
		let mixin_tree = mixin_class_tree();
		let handler = MethodNameAndDesc { name: MethodName::from("onHeadA0"), desc: MethodDescriptor::from(format!("(L{};)V", crate::callback::CALLBACK_INFO_CLASS).as_str()) };
		let target = MethodKey { name: MethodName::from("testA0"), desc: None };

		let changed = apply(&mut class, &mixin_class, &mixin_tree, &target, &handler, true).unwrap();
		assert!(changed);

		let code = class.methods[0].code.as_ref().unwrap();
		assert!(code.instructions.len() > 3);
		assert!(matches!(code.instructions.last().unwrap().instruction, Instruction::AReturn));
	}
}
