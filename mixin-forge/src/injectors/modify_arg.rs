//! ModifyArgInjector (§4.4): lets a handler rewrite one parameter's value at
//! method entry, before any original instruction runs.

use anyhow::{anyhow, Result};
use classfile::strings::ClassName;
use classfile::tree::class::ClassFile;
use classfile::tree::descriptor::parse_method_descriptor;
use classfile::tree::method::code::{Instruction, InstructionListEntry, LvIndex};
use classfile::tree::method::MethodNameAndDesc;

use crate::bytecode::{load_param, store_param};
use crate::directive::MethodKey;
use crate::injectors::dispatch::invoke_instruction;
use crate::injectors::find_target_method_mut;
use crate::labels::refresh_labels;

pub fn apply(class: &mut ClassFile, mixin_class: &ClassName, mixin_tree: &ClassFile, target: &MethodKey, handler: &MethodNameAndDesc, index: u16) -> Result<bool> {
	let handler_method = mixin_tree
		.find_method(handler.name.as_str(), Some(handler.desc.as_str()))
		.ok_or_else(|| anyhow!("ModifyArg handler {}{} not found on mixin {}", handler.name, handler.desc, mixin_class))?;
	let handler_is_static = handler_method.access.is_static;
	let (handler_params, handler_return) = parse_method_descriptor(handler.desc.as_str())?;
	let &[ref param_type] = handler_params.as_slice() else {
		return Err(anyhow!("ModifyArg handler {} must take exactly one parameter", handler.name));
	};
	let Some(handler_return) = handler_return else {
		return Err(anyhow!("ModifyArg handler {} must return a value", handler.name));
	};
	if handler_return != *param_type {
		return Err(anyhow!("ModifyArg handler {} must return the same type it accepts", handler.name));
	}

	let target_class_name = class.name.clone();
	let method = find_target_method_mut(class, target).ok_or_else(|| anyhow!("ModifyArg target {} not found", target.name))?;
	let (target_params, _) = parse_method_descriptor(method.descriptor.as_str())?;
	let Some(target_param) = target_params.get(index as usize) else {
		return Err(anyhow!("ModifyArg index {} out of range for {} ({} params)", index, target.name, target_params.len()));
	};
	if target_param != param_type {
		return Err(anyhow!("ModifyArg index {} on {} is type {:?}, handler expects {:?}", index, target.name, target_param, param_type));
	}
	let target_is_static = method.access.is_static;

	let mut slot = LvIndex::new(u16::from(!target_is_static));
	for p in &target_params[..index as usize] {
		slot = LvIndex::new(slot.index + p.category() as u16);
	}

	let code = method.code.as_mut().ok_or_else(|| anyhow!("ModifyArg target {} has no body", method.name))?;
	let mut labels = refresh_labels(code);

	let mut prelude = crate::injectors::dispatch::emit_receiver(&target_class_name, mixin_class, handler_is_static, &mut labels);
	prelude.push(InstructionListEntry::plain(load_param(target_param, slot)));
	prelude.push(InstructionListEntry::plain(invoke_instruction(mixin_class, handler, handler_is_static)));
	prelude.push(InstructionListEntry::plain(store_param(target_param, slot)));

	code.instructions.splice(0..0, prelude);
	code.max_locals = None;
	code.max_stack = None;
	Ok(true)
}
