//! InvokeInjector (§4.3): calls the handler around every matching `invoke*`
//! site in the target method, without disturbing the call's own operands.

use anyhow::{anyhow, Result};
use classfile::strings::{ClassName, MethodDescriptor, MethodName};
use classfile::tree::class::ClassFile;
use classfile::tree::descriptor::parse_method_descriptor;
use classfile::tree::method::code::{Instruction, InstructionListEntry, LvIndex};
use classfile::tree::method::MethodNameAndDesc;

use crate::bytecode::{load_param, next_free_local, store_param};
use crate::callback::wants_callback_info;
use crate::directive::{MethodKey, Shift};
use crate::injectors::dispatch::build_void_call_block;
use crate::injectors::find_target_method_mut;
use crate::labels::refresh_labels;

fn matches_call(insn: &Instruction, owner: &ClassName, name: &MethodName, desc: Option<&MethodDescriptor>) -> bool {
	let Some(method_ref) = insn.invoked_method() else { return false };
	let desc_matches = match desc {
		Some(d) => *d == method_ref.desc,
		None => true,
	};
	method_ref.class == *owner && method_ref.name == *name && desc_matches
}

#[allow(clippy::too_many_arguments)]
pub fn apply(
	class: &mut ClassFile,
	mixin_class: &ClassName,
	mixin_tree: &ClassFile,
	target: &MethodKey,
	handler: &MethodNameAndDesc,
	call_owner: &ClassName,
	call_name: &MethodName,
	call_desc: Option<&MethodDescriptor>,
	shift: Shift,
) -> Result<bool> {
	let handler_method = mixin_tree
		.find_method(handler.name.as_str(), Some(handler.desc.as_str()))
		.ok_or_else(|| anyhow!("INVOKE handler {}{} not found on mixin {}", handler.name, handler.desc, mixin_class))?;
	let handler_is_static = handler_method.access.is_static;
	let (handler_params, handler_return) = parse_method_descriptor(handler.desc.as_str())?;
	let wants_info = wants_callback_info(&handler_params);

	let target_class_name = class.name.clone();
	let method = find_target_method_mut(class, target).ok_or_else(|| anyhow!("INVOKE target {} not found", target.name))?;
	let code = method.code.as_mut().ok_or_else(|| anyhow!("INVOKE target {} has no body", method.name))?;

	let mut labels = refresh_labels(code);

	let positions: Vec<usize> = code.instructions.iter().enumerate().filter(|(_, e)| matches_call(&e.instruction, call_owner, call_name, call_desc)).map(|(i, _)| i).collect();
	if positions.is_empty() {
		return Err(anyhow!("INVOKE directive on {} matched no call to {}.{}", target.name, call_owner, call_name));
	}

	for &pos in positions.iter().rev() {
		match shift {
			Shift::Before => {
				let entry = code.instructions[pos].clone();
				let Some(call_ref) = entry.instruction.invoked_method().cloned() else { continue };
				let (call_params, _) = parse_method_descriptor(call_ref.desc.as_str())?;
				let has_receiver = !entry.instruction.is_static_invoke();

				let mut locals = Vec::new();
				let mut next = next_free_local(code);
				if has_receiver {
					locals.push((classfile::tree::descriptor::JType::Reference(call_owner.to_string()), next));
					next = LvIndex::new(next.index + 1);
				}
				for p in &call_params {
					locals.push((p.clone(), next));
					next = LvIndex::new(next.index + p.category() as u16);
				}

				let mut block = Vec::new();
				for (ty, slot) in locals.iter().rev() {
					block.push(InstructionListEntry::plain(store_param(ty, *slot)));
				}
				block.extend(build_void_call_block(&target_class_name, mixin_class, handler, handler_is_static, wants_info, handler_return.is_some(), &mut labels));
				for (ty, slot) in locals.iter() {
					block.push(InstructionListEntry::plain(load_param(ty, *slot)));
				}

				code.instructions.splice(pos..pos, block);
			}
			Shift::After => {
				let entry = code.instructions[pos].clone();
				let Some(call_ref) = entry.instruction.invoked_method().cloned() else { continue };
				let (_, call_return) = parse_method_descriptor(call_ref.desc.as_str())?;

				let mut block = Vec::new();
				let return_local = call_return.as_ref().map(|t| {
					let slot = next_free_local(code);
					(t.clone(), slot)
				});
				if let Some((ty, slot)) = &return_local {
					block.push(InstructionListEntry::plain(store_param(ty, *slot)));
				}
				block.extend(build_void_call_block(&target_class_name, mixin_class, handler, handler_is_static, wants_info, handler_return.is_some(), &mut labels));
				if let Some((ty, slot)) = &return_local {
					block.push(InstructionListEntry::plain(load_param(ty, *slot)));
				}

				code.instructions.splice(pos + 1..pos + 1, block);
			}
			Shift::Replace => {
				let entry = code.instructions[pos].clone();
				let Some(call_ref) = entry.instruction.invoked_method().cloned() else { continue };
				let (call_params, call_return) = parse_method_descriptor(call_ref.desc.as_str())?;
				let has_receiver = !entry.instruction.is_static_invoke();

				let mut block = Vec::new();
				let arg_count = call_params.len() + usize::from(has_receiver);
				for _ in 0..arg_count {
					block.push(InstructionListEntry::plain(Instruction::Pop));
				}
				block.extend(crate::injectors::dispatch::emit_receiver(&target_class_name, mixin_class, handler_is_static, &mut labels));
				block.push(InstructionListEntry::plain(crate::injectors::dispatch::invoke_instruction(mixin_class, handler, handler_is_static)));

				match (call_return.as_ref(), handler_return.as_ref()) {
					(None, Some(_)) => block.push(InstructionListEntry::plain(Instruction::Pop)),
					(Some(_), None) => return Err(anyhow!("REPLACE handler for {} must return a value", target.name)),
					_ => {}
				}

				code.instructions.splice(pos..pos + 1, block);
			}
		}
	}

	code.max_locals = None;
	code.max_stack = None;
	Ok(true)
}

#[cfg(test)]
mod tests {
	use classfile::strings::MethodDescriptor;
	use classfile::tree::class::ClassAccess;
	use classfile::tree::method::code::Code;
	use classfile::tree::method::{Method, MethodAccess, MethodRef};
	use pretty_assertions::assert_eq;

	use super::*;

	fn target_class() -> ClassFile {
		let mut class = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from("t/Target"), Some(ClassName::from("java/lang/Object")), vec![]);
		let mut method = Method::new(MethodAccess { is_public: true, is_static: true, ..Default::default() }, MethodName::from("testC0"), MethodDescriptor::from("()V"));
		let mut code = Code::default();
		code.push(Instruction::InvokeStatic(MethodRef { class: ClassName::from("a/Logger"), name: MethodName::from("log"), desc: MethodDescriptor::from("()V") }, false));
		code.push(Instruction::Return);
		method.code = Some(code);
		class.methods.push(method);
		class
	}

	fn mixin_tree() -> ClassFile {
		let mut tree = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from("m/Mixin"), Some(ClassName::from("java/lang/Object")), vec![]);
		tree.methods.push(Method::new(MethodAccess { is_public: true, is_static: true, ..Default::default() }, MethodName::from("onInvoke"), MethodDescriptor::from("()V")));
		tree
	}

	#[test]
	fn before_wraps_call_without_disturbing_it() {
		let mut class = target_class();
		let mixin_tree = mixin_tree();
		let mixin_class = ClassName::from("m/Mixin");
		let handler = MethodNameAndDesc { name: MethodName::from("onInvoke"), desc: MethodDescriptor::from("()V") };
		let target = MethodKey { name: MethodName::from("testC0"), desc: None };

		apply(&mut class, &mixin_class, &mixin_tree, &target, &handler, &ClassName::from("a/Logger"), &MethodName::from("log"), None, Shift::Before).unwrap();

		let code = class.methods[0].code.as_ref().unwrap();
		assert!(code.instructions.iter().any(|e| matches!(&e.instruction, Instruction::InvokeStatic(m, _) if m.name == MethodName::from("log"))));
		assert!(code.instructions.iter().any(|e| matches!(&e.instruction, Instruction::InvokeStatic(m, _) if m.name == MethodName::from("onInvoke"))));
	}
}
