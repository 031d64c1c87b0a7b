//! RedirectInjector (§4.5): replaces every matching `invoke*` with a call to
//! the handler carrying the same receiver and arguments, deleting the
//! original invocation entirely.

use anyhow::{anyhow, Result};
use classfile::strings::{ClassName, MethodDescriptor, MethodName};
use classfile::tree::class::ClassFile;
use classfile::tree::descriptor::{parse_method_descriptor, JType};
use classfile::tree::method::code::{Instruction, InstructionListEntry, LvIndex};
use classfile::tree::method::MethodNameAndDesc;

use crate::bytecode::{box_value, load_param, next_free_local, store_param, unbox_value};
use crate::directive::MethodKey;
use crate::injectors::dispatch::{emit_receiver, invoke_instruction};
use crate::injectors::find_target_method_mut;
use crate::labels::refresh_labels;

/// The instructions to turn a `value_type` value on the stack into
/// `target_type`: box it if `target_type` is a wrapper's primitive, unbox/
/// checkcast it if `value_type` is boxed/loosely-typed, or nothing if they
/// already agree.
fn coerce_return(value_type: &JType, target_type: &JType) -> Vec<Instruction> {
	if value_type == target_type {
		return Vec::new();
	}
	if let Some(box_insn) = box_value(value_type) {
		return vec![box_insn];
	}
	unbox_value(Some(target_type))
}

fn matches_call(insn: &Instruction, owner: &ClassName, name: &MethodName, desc: Option<&MethodDescriptor>) -> bool {
	let Some(method_ref) = insn.invoked_method() else { return false };
	let desc_matches = match desc {
		Some(d) => *d == method_ref.desc,
		None => true,
	};
	method_ref.class == *owner && method_ref.name == *name && desc_matches
}

/// Redirect's handler sees the call's own receiver+args (for a non-static
/// call, the receiver becomes the handler's own leading parameter). The
/// original call's operands are stowed into fresh locals first so a
/// non-static handler's own receiver can be pushed ahead of them in the
/// order `invokevirtual`/`invokeinterface` require.
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
) -> Result<bool> {
	let handler_method = mixin_tree
		.find_method(handler.name.as_str(), Some(handler.desc.as_str()))
		.ok_or_else(|| anyhow!("Redirect handler {}{} not found on mixin {}", handler.name, handler.desc, mixin_class))?;
	let handler_is_static = handler_method.access.is_static;
	let (_, handler_return) = parse_method_descriptor(handler.desc.as_str())?;

	let target_class_name = class.name.clone();
	let method = find_target_method_mut(class, target).ok_or_else(|| anyhow!("Redirect target {} not found", target.name))?;
	let code = method.code.as_mut().ok_or_else(|| anyhow!("Redirect target {} has no body", method.name))?;
	let mut labels = refresh_labels(code);

	let positions: Vec<usize> = code.instructions.iter().enumerate().filter(|(_, e)| matches_call(&e.instruction, call_owner, call_name, call_desc)).map(|(i, _)| i).collect();
	if positions.is_empty() {
		return Err(anyhow!("Redirect directive on {} matched no call to {}.{}", target.name, call_owner, call_name));
	}

	for &pos in positions.iter().rev() {
		let original = code.instructions[pos].clone();
		let Some(call_ref) = original.instruction.invoked_method() else { continue };
		let call_is_static = original.instruction.is_static_invoke();
		let (call_params, call_return) = parse_method_descriptor(call_ref.desc.as_str())?;

		// Stash the original call's receiver (if any) and args into fresh
		// locals so the mixin receiver can be pushed ahead of them below.
		let mut slots: Vec<(JType, LvIndex)> = Vec::new();
		let mut next = next_free_local(code);
		if !call_is_static {
			slots.push((JType::Reference(call_ref.class.as_str().to_owned()), next));
			next = LvIndex::new(next.index + 1);
		}
		for p in &call_params {
			slots.push((p.clone(), next));
			next = LvIndex::new(next.index + p.category() as u16);
		}

		let mut block = Vec::new();
		for (t, slot) in slots.iter().rev() {
			block.push(InstructionListEntry::plain(store_param(t, *slot)));
		}

		if !handler_is_static {
			block.extend(emit_receiver(&target_class_name, mixin_class, false, &mut labels));
		}
		for (t, slot) in &slots {
			block.push(InstructionListEntry::plain(load_param(t, *slot)));
		}
		block.push(InstructionListEntry::plain(invoke_instruction(mixin_class, handler, handler_is_static)));

		match (call_return.as_ref(), handler_return.as_ref()) {
			(None, Some(_)) => block.push(InstructionListEntry::plain(Instruction::Pop)),
			(Some(_), None) => return Err(anyhow!("Redirect handler for {} must return a value", target.name)),
			(Some(cr), Some(hr)) => block.extend(coerce_return(hr, cr).into_iter().map(InstructionListEntry::plain)),
			(None, None) => {}
		}

		code.instructions.splice(pos..pos + 1, block);
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

	#[test]
	fn replaces_matching_invocation() {
		let mut class = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from("t/Target"), Some(ClassName::from("java/lang/Object")), vec![]);
		let mut method = Method::new(MethodAccess { is_public: true, is_static: true, ..Default::default() }, MethodName::from("testC3"), MethodDescriptor::from("()V"));
		let mut code = Code::default();
		code.push(Instruction::InvokeStatic(MethodRef { class: ClassName::from("a/Logger"), name: MethodName::from("log"), desc: MethodDescriptor::from("()V") }, false));
		code.push(Instruction::Return);
		method.code = Some(code);
		class.methods.push(method);

		let mut mixin_tree = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from("m/Mixin"), Some(ClassName::from("java/lang/Object")), vec![]);
		mixin_tree.methods.push(Method::new(MethodAccess { is_public: true, is_static: true, ..Default::default() }, MethodName::from("onRedirect"), MethodDescriptor::from("()V")));

		let mixin_class = ClassName::from("m/Mixin");
		let handler = MethodNameAndDesc { name: MethodName::from("onRedirect"), desc: MethodDescriptor::from("()V") };
		let target = MethodKey { name: MethodName::from("testC3"), desc: None };

		apply(&mut class, &mixin_class, &mixin_tree, &target, &handler, &ClassName::from("a/Logger"), &MethodName::from("log"), None).unwrap();

		let code = class.methods[0].code.as_ref().unwrap();
		assert_eq!(code.instructions.len(), 2);
		assert!(matches!(&code.instructions[0].instruction, Instruction::InvokeStatic(m, _) if m.name == MethodName::from("onRedirect")));
	}

	#[test]
	fn redirects_instance_call_with_non_static_handler() {
		let mut class = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from("t/Target"), Some(ClassName::from("java/lang/Object")), vec![]);
		let mut method = Method::new(MethodAccess { is_public: true, ..Default::default() }, MethodName::from("testC4"), MethodDescriptor::from("()V"));
		let mut code = Code::default();
		code.push(Instruction::ALoad(LvIndex::new(0)));
		code.push(Instruction::InvokeVirtual(MethodRef { class: ClassName::from("t/Target"), name: MethodName::from("helper"), desc: MethodDescriptor::from("()V") }));
		code.push(Instruction::Return);
		method.code = Some(code);
		class.methods.push(method);

		let mut mixin_tree = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from("m/Mixin"), Some(ClassName::from("java/lang/Object")), vec![]);
		mixin_tree.methods.push(Method::new(MethodAccess { is_public: true, ..Default::default() }, MethodName::from("onRedirect"), MethodDescriptor::from("(Lt/Target;)V")));

		let mixin_class = ClassName::from("m/Mixin");
		let handler = MethodNameAndDesc { name: MethodName::from("onRedirect"), desc: MethodDescriptor::from("(Lt/Target;)V") };
		let target = MethodKey { name: MethodName::from("testC4"), desc: None };

		apply(&mut class, &mixin_class, &mixin_tree, &target, &handler, &ClassName::from("t/Target"), &MethodName::from("helper"), None).unwrap();

		let code = class.methods[0].code.as_ref().unwrap();
		assert!(matches!(code.instructions.last().unwrap().instruction, Instruction::Return));

		let invoke_pos = code.instructions.iter().position(|e| matches!(&e.instruction, Instruction::InvokeVirtual(m) if m.name == MethodName::from("onRedirect"))).unwrap();
		let getstatic_pos = code.instructions.iter().position(|e| matches!(&e.instruction, Instruction::GetStatic(_))).unwrap();
		// the mixin's own receiver (fetched through the singleton field) must be
		// loaded before the stashed original receiver is reloaded as the handler's argument
		assert!(getstatic_pos < invoke_pos);
		assert!(matches!(code.instructions[invoke_pos - 1].instruction, Instruction::ALoad(_)));
	}

	#[test]
	fn coerces_mismatched_return_type() {
		let mut class = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from("t/Target"), Some(ClassName::from("java/lang/Object")), vec![]);
		let mut method = Method::new(MethodAccess { is_public: true, is_static: true, ..Default::default() }, MethodName::from("testC5"), MethodDescriptor::from("()I"));
		let mut code = Code::default();
		code.push(Instruction::InvokeStatic(MethodRef { class: ClassName::from("a/Math"), name: MethodName::from("compute"), desc: MethodDescriptor::from("()I") }, false));
		code.push(Instruction::IReturn);
		method.code = Some(code);
		class.methods.push(method);

		let mut mixin_tree = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from("m/Mixin"), Some(ClassName::from("java/lang/Object")), vec![]);
		mixin_tree.methods.push(Method::new(MethodAccess { is_public: true, is_static: true, ..Default::default() }, MethodName::from("onRedirect"), MethodDescriptor::from("()Ljava/lang/Integer;")));

		let mixin_class = ClassName::from("m/Mixin");
		let handler = MethodNameAndDesc { name: MethodName::from("onRedirect"), desc: MethodDescriptor::from("()Ljava/lang/Integer;") };
		let target = MethodKey { name: MethodName::from("testC5"), desc: None };

		apply(&mut class, &mixin_class, &mixin_tree, &target, &handler, &ClassName::from("a/Math"), &MethodName::from("compute"), None).unwrap();

		let code = class.methods[0].code.as_ref().unwrap();
		assert!(code.instructions.iter().any(|e| matches!(&e.instruction, Instruction::CheckCast(c) if *c == ClassName::from("java/lang/Integer"))));
		assert!(code.instructions.iter().any(|e| matches!(&e.instruction, Instruction::InvokeVirtual(m) if m.name.as_str() == "intValue")));
	}
}
