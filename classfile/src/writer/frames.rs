//! Recomputes `max_stack`/`max_locals` for a [`Code`] body that doesn't
//! carry them (typically because a directive inserted or removed
//! instructions).
//!
//! This deliberately does not reconstruct `StackMapTable` frames. Doing so
//! correctly means a verifier-grade type dataflow analysis (ASM's
//! `COMPUTE_FRAMES`); instead we emit classfiles with a `-noverify`-shaped
//! gap, the same tradeoff the spec documents elsewhere for its own
//! heuristics (the Kotlin-object lookahead bound, racy singleton init).
//! Any consumer that loads these classes through a stock JVM verifier will
//! need to also pass `-Xverify:none` or regenerate frames with a tool like
//! ASM's `ClassWriter::COMPUTE_FRAMES`. Tracked as a known limitation.

use std::collections::{HashMap, VecDeque};

use anyhow::{bail, Result};

use crate::tree::method::code::{Code, Instruction, Label};

/// A conservative upper bound on the maximum operand stack depth reached
/// anywhere in `code`, computed by propagating stack height across the
/// control-flow graph rather than doing full type inference.
pub fn compute_max_stack(code: &Code) -> Result<u16> {
	if code.instructions.is_empty() {
		return Ok(0);
	}

	let label_index: HashMap<Label, usize> = code.instructions.iter().enumerate().filter_map(|(i, e)| e.label.map(|l| (l, i))).collect();

	let mut entry_depth: HashMap<usize, i32> = HashMap::new();
	let mut queue = VecDeque::new();
	entry_depth.insert(0, 0);
	queue.push_back(0usize);

	for exception in &code.exception_table {
		if let Some(&handler_index) = label_index.get(&exception.handler) {
			entry_depth.entry(handler_index).or_insert(1);
			queue.push_back(handler_index);
		}
	}

	let mut max_depth: i32 = 0;
	let mut visited: HashMap<usize, i32> = HashMap::new();

	while let Some(index) = queue.pop_front() {
		let Some(start_entry) = code.instructions.get(index) else { continue };
		let start_depth = entry_depth[&index];
		if visited.get(&index).is_some_and(|&seen| seen >= start_depth) {
			continue;
		}
		visited.insert(index, start_depth);
		let _ = start_entry;

		let (pop, push) = stack_effect(&code.instructions[index].instruction);
		let mut depth = start_depth - pop as i32;
		if depth < 0 {
			bail!("stack underflow recomputing max_stack at instruction {index}");
		}
		depth += push as i32;
		max_depth = max_depth.max(depth);

		for target in branch_targets(&code.instructions[index].instruction, &label_index) {
			let existing = entry_depth.entry(target).or_insert(depth);
			if *existing < depth {
				*existing = depth;
			}
			queue.push_back(target);
		}

		if falls_through(&code.instructions[index].instruction) && index + 1 < code.instructions.len() {
			let next = index + 1;
			let existing = entry_depth.entry(next).or_insert(depth);
			if *existing < depth {
				*existing = depth;
			}
			queue.push_back(next);
		}
	}

	Ok(max_depth.max(0) as u16)
}

/// A bound on the number of local variable slots `code` touches, derived
/// from every load/store/iinc operand and the declared local variable table
/// (which may describe slots never directly referenced by a directive's
/// injected code, e.g. a captured outer local).
pub fn compute_max_locals(code: &Code) -> u16 {
	let mut max_slot: u32 = 0;
	for entry in &code.instructions {
		if let Some((index, width)) = local_slot(&entry.instruction) {
			max_slot = max_slot.max(index as u32 + width as u32);
		}
	}
	if let Some(locals) = &code.local_variables {
		for lv in locals {
			let width = lv.descriptor.as_ref().map_or(1, |d| if matches!(d.as_str(), "J" | "D") { 2 } else { 1 });
			max_slot = max_slot.max(lv.index.index as u32 + width);
		}
	}
	max_slot.min(u16::MAX as u32) as u16
}

fn local_slot(instruction: &Instruction) -> Option<(u16, u16)> {
	use Instruction::*;
	Some(match instruction {
		ILoad(i) | IStore(i) => (i.index, 1),
		FLoad(i) | FStore(i) => (i.index, 1),
		ALoad(i) | AStore(i) => (i.index, 1),
		LLoad(i) | LStore(i) => (i.index, 2),
		DLoad(i) | DStore(i) => (i.index, 2),
		IInc(i, _) => (i.index, 1),
		Ret(i) => (i.index, 1),
		_ => return None,
	})
}

fn falls_through(instruction: &Instruction) -> bool {
	!matches!(
		instruction,
		Instruction::Goto(_) | Instruction::TableSwitch { .. } | Instruction::LookupSwitch { .. } | Instruction::AThrow
	) && !instruction.is_return()
}

fn branch_targets(instruction: &Instruction, label_index: &HashMap<Label, usize>) -> Vec<usize> {
	use Instruction::*;
	let labels: Vec<Label> = match instruction {
		IfEq(l) | IfNe(l) | IfLt(l) | IfGe(l) | IfGt(l) | IfLe(l) => vec![*l],
		IfICmpEq(l) | IfICmpNe(l) | IfICmpLt(l) | IfICmpGe(l) | IfICmpGt(l) | IfICmpLe(l) => vec![*l],
		IfACmpEq(l) | IfACmpNe(l) => vec![*l],
		IfNull(l) | IfNonNull(l) => vec![*l],
		Goto(l) => vec![*l],
		TableSwitch { default, table, .. } => std::iter::once(*default).chain(table.iter().copied()).collect(),
		LookupSwitch { default, pairs } => std::iter::once(*default).chain(pairs.iter().map(|(_, l)| *l)).collect(),
		_ => Vec::new(),
	};
	labels.iter().filter_map(|l| label_index.get(l).copied()).collect()
}

/// The `(pop, push)` slot-count effect of an instruction on the operand
/// stack, treating `long`/`double` as two slots.
fn stack_effect(instruction: &Instruction) -> (u16, u16) {
	use Instruction::*;
	match instruction {
		Nop => (0, 0),
		AConstNull | IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5 | FConst0 | FConst1 | FConst2 | BiPush(_) | SiPush(_) => (0, 1),
		LConst0 | LConst1 | DConst0 | DConst1 => (0, 2),
		Ldc(v) => (0, loadable_width(v)),
		ILoad(_) | FLoad(_) | ALoad(_) => (0, 1),
		LLoad(_) | DLoad(_) => (0, 2),
		IALoad | FALoad | AALoad | BALoad | CALoad | SALoad => (2, 1),
		LALoad | DALoad => (2, 2),
		IStore(_) | FStore(_) | AStore(_) => (1, 0),
		LStore(_) | DStore(_) => (2, 0),
		IAStore | FAStore | AAStore | BAStore | CAStore | SAStore => (3, 0),
		LAStore | DAStore => (4, 0),
		Pop => (1, 0),
		Pop2 => (2, 0),
		Dup => (1, 2),
		DupX1 => (2, 3),
		DupX2 => (3, 4),
		Dup2 => (2, 4),
		Dup2X1 => (3, 5),
		Dup2X2 => (4, 6),
		Swap => (2, 2),
		IAdd | ISub | IMul | IDiv | IRem | IAnd | IOr | IXor | IShl | IShr | IUShr | FAdd | FSub | FMul | FDiv | FRem => (2, 1),
		LAdd | LSub | LMul | LDiv | LRem | LAnd | LOr | LXor | DAdd | DSub | DMul | DDiv | DRem => (4, 2),
		LShl | LShr | LUShr => (3, 2),
		INeg | FNeg => (1, 1),
		LNeg | DNeg => (2, 2),
		IInc(_, _) => (0, 0),
		I2L | I2D => (1, 2),
		I2F | I2B | I2C | I2S => (1, 1),
		L2I | L2F => (2, 1),
		L2D => (2, 2),
		F2I => (1, 1),
		F2L | F2D => (1, 2),
		D2I | D2F => (2, 1),
		D2L => (2, 2),
		LCmp => (4, 1),
		FCmpL | FCmpG => (2, 1),
		DCmpL | DCmpG => (4, 1),
		IfEq(_) | IfNe(_) | IfLt(_) | IfGe(_) | IfGt(_) | IfLe(_) | IfNull(_) | IfNonNull(_) => (1, 0),
		IfICmpEq(_) | IfICmpNe(_) | IfICmpLt(_) | IfICmpGe(_) | IfICmpGt(_) | IfICmpLe(_) | IfACmpEq(_) | IfACmpNe(_) => (2, 0),
		Goto(_) => (0, 0),
		Ret(_) => (0, 0),
		TableSwitch { .. } | LookupSwitch { .. } => (1, 0),
		IReturn | FReturn | AReturn => (1, 0),
		LReturn | DReturn => (2, 0),
		Return => (0, 0),
		GetStatic(f) => (0, descriptor_width(f.desc.as_str())),
		PutStatic(f) => (descriptor_width(f.desc.as_str()), 0),
		GetField(f) => (1, descriptor_width(f.desc.as_str())),
		PutField(f) => (1 + descriptor_width(f.desc.as_str()), 0),
		InvokeVirtual(m) | InvokeSpecial(m, _) | InvokeInterface(m) => {
			let (args, ret) = method_effect(m.desc.as_str());
			(1 + args, ret)
		}
		InvokeStatic(m, _) => method_effect(m.desc.as_str()),
		InvokeDynamic(d) => method_effect(d.descriptor.as_str()),
		New(_) => (0, 1),
		NewArray(_) | ANewArray(_) => (1, 1),
		ArrayLength => (1, 1),
		AThrow => (1, 0),
		CheckCast(_) | InstanceOf(_) => (1, 1),
		MonitorEnter | MonitorExit => (1, 0),
		MultiANewArray(_, dims) => (*dims as u16, 1),
	}
}

fn loadable_width(value: &crate::tree::method::code::Loadable) -> u16 {
	use crate::tree::method::code::Loadable;
	match value {
		Loadable::Long(_) | Loadable::Double(_) => 2,
		_ => 1,
	}
}

fn descriptor_width(descriptor: &str) -> u16 {
	if matches!(descriptor, "J" | "D") { 2 } else { 1 }
}

fn method_effect(descriptor: &str) -> (u16, u16) {
	let (params, ret) = crate::tree::descriptor::parse_method_descriptor(descriptor).unwrap_or_default();
	let args = params.iter().map(|t| t.category() as u16).sum();
	let ret = ret.map_or(0, |t| t.category() as u16);
	(args, ret)
}
