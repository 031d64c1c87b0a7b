//! RemoveMethod / RemoveSynchronized (§4.5). A coarse strip: RemoveMethod
//! drops the method outright, RemoveSynchronized swaps `monitorenter` for
//! `pop` and clears the `synchronized` flag without rebalancing
//! `monitorexit` (§9 note (b)).

use anyhow::{anyhow, Result};
use classfile::tree::class::ClassFile;
use classfile::tree::method::code::Instruction;

use crate::directive::MethodKey;
use crate::injectors::find_target_method_mut;

pub fn remove_method(class: &mut ClassFile, target: &MethodKey) -> Result<bool> {
	let before = class.methods.len();
	class.methods.retain(|m| !target.matches(&m.name, &m.descriptor));
	if class.methods.len() == before {
		return Err(anyhow!("RemoveMethod target {} not found", target.name));
	}
	Ok(true)
}

pub fn remove_synchronized(class: &mut ClassFile, target: &MethodKey) -> Result<bool> {
	let method = find_target_method_mut(class, target).ok_or_else(|| anyhow!("RemoveSynchronized target {} not found", target.name))?;
	method.access.is_synchronized = false;
	if let Some(code) = method.code.as_mut() {
		for entry in &mut code.instructions {
			if matches!(entry.instruction, Instruction::MonitorEnter) {
				entry.instruction = Instruction::Pop;
			}
		}
	}
	Ok(true)
}
