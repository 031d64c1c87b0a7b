//! Label-identity hygiene.
//!
//! [`classfile::tree::method::code::Label`] ids are only unique within the
//! method whose [`LabelMap`] minted them: the reader resets its allocator per
//! method, so two labels built independently can carry the same numeric id
//! while meaning entirely different offsets. Before any injector mints a
//! fresh label to splice new control flow into an *existing* method, every
//! label already in that method must first be funnelled through one shared
//! [`LabelMap`] so `.fresh()` calls afterwards are guaranteed collision-free.

use classfile::tree::method::code::{Code, Instruction, Label, LabelMap};

/// Remaps every [`Label`] reachable from `instruction` through `map`.
pub fn remap_instruction(instruction: &mut Instruction, map: &mut LabelMap) {
	use Instruction::*;
	match instruction {
		IfEq(l) | IfNe(l) | IfLt(l) | IfGe(l) | IfGt(l) | IfLe(l)
		| IfICmpEq(l) | IfICmpNe(l) | IfICmpLt(l) | IfICmpGe(l) | IfICmpGt(l) | IfICmpLe(l)
		| IfACmpEq(l) | IfACmpNe(l)
		| Goto(l)
		| IfNull(l) | IfNonNull(l) => {
			*l = map.remap(*l);
		}
		TableSwitch { default, table, .. } => {
			*default = map.remap(*default);
			for l in table.iter_mut() {
				*l = map.remap(*l);
			}
		}
		LookupSwitch { default, pairs } => {
			*default = map.remap(*default);
			for (_, l) in pairs.iter_mut() {
				*l = map.remap(*l);
			}
		}
		_ => {}
	}
}

fn remap_label_opt(label: &mut Option<Label>, map: &mut LabelMap) {
	if let Some(l) = label {
		*l = map.remap(*l);
	}
}

/// Remaps every label in `code` (instruction entry labels, branch targets,
/// exception table, line numbers, local variable ranges, `last_label`)
/// through one fresh [`LabelMap`], and returns it so the caller can keep
/// minting collision-free labels with `.fresh()`.
pub fn refresh_labels(code: &mut Code) -> LabelMap {
	let mut map = LabelMap::new();

	for entry in code.instructions.iter_mut() {
		remap_label_opt(&mut entry.label, &mut map);
		remap_instruction(&mut entry.instruction, &mut map);
	}

	for exc in code.exception_table.iter_mut() {
		exc.start = map.remap(exc.start);
		exc.end = map.remap(exc.end);
		exc.handler = map.remap(exc.handler);
	}

	remap_label_opt(&mut code.last_label, &mut map);

	if let Some(line_numbers) = code.line_numbers.as_mut() {
		for (label, _) in line_numbers.iter_mut() {
			*label = map.remap(*label);
		}
	}

	if let Some(locals) = code.local_variables.as_mut() {
		for lv in locals.iter_mut() {
			lv.range.start = map.remap(lv.range.start);
			lv.range.end = map.remap(lv.range.end);
		}
	}

	map
}

#[cfg(test)]
mod tests {
	use classfile::tree::method::code::InstructionListEntry;

	use super::*;

	#[test]
	fn refresh_preserves_jump_shape_while_changing_ids() {
		let mut map = LabelMap::new();
		let target = map.fresh();
		let mut code = Code {
			instructions: vec![
				InstructionListEntry { label: Some(target), instruction: Instruction::Nop },
				InstructionListEntry { label: None, instruction: Instruction::Goto(target) },
			],
			..Code::default()
		};

		let mut fresh_map = refresh_labels(&mut code);
		let new_label = code.instructions[0].label.unwrap();
		match code.instructions[1].instruction {
			Instruction::Goto(l) => assert_eq!(l, new_label),
			_ => panic!("expected goto"),
		}

		// subsequent fresh labels never collide with remapped ones
		let extra = fresh_map.fresh();
		assert_ne!(extra, new_label);
	}
}
