//! ModifyConstantInjector (§4.4): replaces matching constant-producing
//! instructions with a call through the handler.

use anyhow::{anyhow, Result};
use classfile::strings::ClassName;
use classfile::tree::class::ClassFile;
use classfile::tree::descriptor::parse_method_descriptor;
use classfile::tree::method::code::InstructionListEntry;
use classfile::tree::method::MethodNameAndDesc;

use crate::bytecode::{constant_type, constant_value, is_constant, ConstValue};
use crate::directive::{ConstantMatch, MethodKey};
use crate::injectors::dispatch::{emit_receiver, invoke_instruction};
use crate::injectors::find_target_method_mut;
use crate::labels::refresh_labels;

fn literal_matches(value: &ConstValue, literal: &ConstantMatch) -> bool {
	match (value, literal) {
		(ConstValue::Int(v), ConstantMatch::Int(l)) => i64::from(*v) == *l,
		(ConstValue::Long(v), ConstantMatch::Int(l)) => *v == *l,
		(ConstValue::Float(v), ConstantMatch::Float(l)) => f64::from(*v) == *l,
		(ConstValue::Double(v), ConstantMatch::Float(l)) => *v == *l,
		(ConstValue::String(v), ConstantMatch::Str(l)) => v == l,
		(ConstValue::Class(v) | ConstValue::Type(v), ConstantMatch::Str(l)) => v.as_str() == l.as_str(),
		_ => false,
	}
}

pub fn apply(class: &mut ClassFile, mixin_class: &ClassName, mixin_tree: &ClassFile, target: &MethodKey, handler: &MethodNameAndDesc, constant: &ConstantMatch) -> Result<bool> {
	let handler_method = mixin_tree
		.find_method(handler.name.as_str(), Some(handler.desc.as_str()))
		.ok_or_else(|| anyhow!("ModifyConstant handler {}{} not found on mixin {}", handler.name, handler.desc, mixin_class))?;
	let handler_is_static = handler_method.access.is_static;
	let (_, handler_return) = parse_method_descriptor(handler.desc.as_str())?;
	let Some(handler_return) = handler_return else {
		return Err(anyhow!("ModifyConstant handler {} must return a value", handler.name));
	};

	let target_class_name = class.name.clone();
	let method = find_target_method_mut(class, target).ok_or_else(|| anyhow!("ModifyConstant target {} not found", target.name))?;
	let code = method.code.as_mut().ok_or_else(|| anyhow!("ModifyConstant target {} has no body", method.name))?;
	let mut labels = refresh_labels(code);

	let positions: Vec<usize> = code
		.instructions
		.iter()
		.enumerate()
		.filter(|(_, e)| {
			is_constant(&e.instruction) && constant_value(&e.instruction).is_some_and(|v| literal_matches(&v, constant)) && constant_type(&e.instruction) == Some(handler_return.clone())
		})
		.map(|(i, _)| i)
		.collect();

	if positions.is_empty() {
		return Err(anyhow!("ModifyConstant directive on {} matched no constant of type {:?}", target.name, handler_return));
	}

	for &pos in positions.iter().rev() {
		let original = code.instructions[pos].clone();

		let mut block = emit_receiver(&target_class_name, mixin_class, handler_is_static, &mut labels);
		block.push(original);
		block.push(InstructionListEntry::plain(invoke_instruction(mixin_class, handler, handler_is_static)));

		code.instructions.splice(pos..pos + 1, block);
	}

	code.max_locals = None;
	code.max_stack = None;
	Ok(true)
}
