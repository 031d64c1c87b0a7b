//! The inline code generator (component D): clones a mixin handler's body
//! into a target method's frame.
//!
//! Never mutates the mixin's own bytecode; operates entirely on a clone
//! produced from bytes resolved through [`MixinClassSource`].

use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use classfile::strings::ClassName;
use classfile::tree::descriptor::{parse_method_descriptor, JType};
use classfile::tree::method::code::{Code, Instruction, InstructionListEntry, Label, LvIndex};
use classfile::tree::method::MethodNameAndDesc;

use crate::bytecode::{default_value, pop_for, return_for};
use crate::directive::MixinClassSource;
use crate::labels::refresh_labels;

/// Shadow/copy owner-rebindings to apply while cloning a handler body, per
/// §4.7 step 4. Keyed by the mixin-side `(name, descriptor)`.
#[derive(Debug, Clone, Default)]
pub struct ShadowBindings {
	pub fields: HashMap<String, String>,
	pub methods: HashMap<(String, String), String>,
	pub copies: HashMap<(String, String), String>,
}

pub struct InlineRequest<'a> {
	pub mixin_class: &'a ClassName,
	pub handler: &'a MethodNameAndDesc,
	pub target_class: &'a ClassName,
	pub target_is_static: bool,
	pub target_params: &'a [JType],
	pub target_return: Option<&'a JType>,
	pub shadows: &'a ShadowBindings,
	pub source: &'a dyn MixinClassSource,
}

/// Clones `req.handler`'s body, remapped for `req.target_class`'s frame.
/// Returns the new [`Code`] ready to attach to the target method (caller
/// still must recompute `max_locals`/`max_stack`).
///
/// A non-static handler's own `aload_0` (`this`) is left in place rather
/// than stripped: `remap_local_index` resolves index 0 to itself, which is
/// exactly the target method's own receiver slot, so `this.field`/`this.m()`
/// references to shadowed members keep a receiver under the rebound
/// `getfield`/`invokevirtual` `rewrite_owner` produces.
pub fn inline_body(req: &InlineRequest) -> Result<Code> {
	let mixin_tree = req.source.get(req.mixin_class).with_context(|| format!("resolving mixin class {}", req.mixin_class))?;
	let handler_method = mixin_tree
		.find_method(req.handler.name.as_str(), Some(req.handler.desc.as_str()))
		.ok_or_else(|| anyhow!("mixin {} has no method {}{}", req.mixin_class, req.handler.name, req.handler.desc))?;
	let source_code = handler_method.code.as_ref().ok_or_else(|| anyhow!("mixin handler {}{} has no body to inline", req.handler.name, req.handler.desc))?;
	let (source_params, source_return) = parse_method_descriptor(req.handler.desc.as_str())?;
	let source_is_static = handler_method.access.is_static;

	let mut code = source_code.clone();
	refresh_labels(&mut code);

	let is_singleton = mixin_tree
		.find_field("INSTANCE")
		.map(|f| f.access.is_static && f.descriptor.as_str() == format!("L{};", req.mixin_class))
		.unwrap_or(false);

	if is_singleton && req.target_is_static && !source_is_static {
		promote_singleton_calls(&mut code.instructions, req.mixin_class);
	}

	let index_map = build_index_map(source_is_static, &source_params, req.target_is_static, req.target_params);

	let mut new_instructions = Vec::with_capacity(code.instructions.len());

	for entry in code.instructions {
		let label = entry.label;

		let rewritten = rewrite_owner(entry.instruction, req.mixin_class, req.target_class, req.shadows);
		let rewritten = remap_local_index(rewritten, &index_map);

		if rewritten.is_return() {
			emit_return_adaptation(&mut new_instructions, label, &rewritten, source_return.as_ref(), req.target_return);
			continue;
		}

		new_instructions.push(InstructionListEntry { label, instruction: rewritten });
	}

	code.instructions = new_instructions;
	code.max_locals = None;
	code.max_stack = None;
	Ok(code)
}

/// Builds the source-local-slot → target-local-slot map for genuine
/// parameters, plus applies to every caller the uniform offset for true
/// locals (slots `>= S_params`).
fn build_index_map(source_is_static: bool, source_params: &[JType], target_is_static: bool, target_params: &[JType]) -> IndexMap {
	let mut map = HashMap::new();

	let mut source_slot = if source_is_static { 0u16 } else { 1u16 };
	let mut target_slot = if target_is_static { 0u16 } else { 1u16 };

	for (s, t) in source_params.iter().zip(target_params.iter()) {
		let category = s.category() as u16;
		for offset in 0..category {
			map.insert(source_slot + offset, target_slot + offset);
		}
		source_slot += category;
		target_slot += t.category() as u16;
	}

	IndexMap { map, source_params_width: source_slot, offset: target_slot as i32 - source_slot as i32 }
}

struct IndexMap {
	map: HashMap<u16, u16>,
	source_params_width: u16,
	offset: i32,
}

impl IndexMap {
	fn resolve(&self, index: u16) -> u16 {
		if index < self.source_params_width {
			*self.map.get(&index).unwrap_or(&index)
		} else {
			(index as i32 + self.offset).max(0) as u16
		}
	}
}

fn remap_local_index(insn: Instruction, map: &IndexMap) -> Instruction {
	use Instruction::*;
	match insn {
		ILoad(i) => ILoad(LvIndex::new(map.resolve(i.index))),
		LLoad(i) => LLoad(LvIndex::new(map.resolve(i.index))),
		FLoad(i) => FLoad(LvIndex::new(map.resolve(i.index))),
		DLoad(i) => DLoad(LvIndex::new(map.resolve(i.index))),
		ALoad(i) => ALoad(LvIndex::new(map.resolve(i.index))),
		IStore(i) => IStore(LvIndex::new(map.resolve(i.index))),
		LStore(i) => LStore(LvIndex::new(map.resolve(i.index))),
		FStore(i) => FStore(LvIndex::new(map.resolve(i.index))),
		DStore(i) => DStore(LvIndex::new(map.resolve(i.index))),
		AStore(i) => AStore(LvIndex::new(map.resolve(i.index))),
		Ret(i) => Ret(LvIndex::new(map.resolve(i.index))),
		IInc(i, delta) => IInc(LvIndex::new(map.resolve(i.index)), delta),
		other => other,
	}
}

fn rewrite_owner(insn: Instruction, mixin_class: &ClassName, target_class: &ClassName, shadows: &ShadowBindings) -> Instruction {
	use Instruction::*;
	match insn {
		GetField(mut f) if f.class == *mixin_class => {
			if let Some(target_name) = shadows.fields.get(f.name.as_str()) {
				f.class = target_class.clone();
				f.name = target_name.as_str().into();
			}
			GetField(f)
		}
		PutField(mut f) if f.class == *mixin_class => {
			if let Some(target_name) = shadows.fields.get(f.name.as_str()) {
				f.class = target_class.clone();
				f.name = target_name.as_str().into();
			}
			PutField(f)
		}
		GetStatic(mut f) if f.class == *mixin_class => {
			if let Some(target_name) = shadows.fields.get(f.name.as_str()) {
				f.class = target_class.clone();
				f.name = target_name.as_str().into();
			}
			GetStatic(f)
		}
		PutStatic(mut f) if f.class == *mixin_class => {
			if let Some(target_name) = shadows.fields.get(f.name.as_str()) {
				f.class = target_class.clone();
				f.name = target_name.as_str().into();
			}
			PutStatic(f)
		}
		InvokeVirtual(mut m) if m.class == *mixin_class => {
			rebind_method(&mut m, target_class, shadows);
			InvokeVirtual(m)
		}
		InvokeSpecial(mut m, itf) if m.class == *mixin_class => {
			rebind_method(&mut m, target_class, shadows);
			InvokeSpecial(m, itf)
		}
		InvokeStatic(mut m, itf) if m.class == *mixin_class => {
			rebind_method(&mut m, target_class, shadows);
			InvokeStatic(m, itf)
		}
		other => other,
	}
}

fn rebind_method(m: &mut classfile::tree::method::MethodRef, target_class: &ClassName, shadows: &ShadowBindings) {
	let key = (m.name.as_str().to_owned(), m.desc.as_str().to_owned());
	if let Some(target_name) = shadows.methods.get(&key).or_else(|| shadows.copies.get(&key)) {
		m.class = target_class.clone();
		m.name = target_name.as_str().into();
	}
}

fn emit_return_adaptation(out: &mut Vec<InstructionListEntry>, label: Option<Label>, original: &Instruction, source_return: Option<&JType>, target_return: Option<&JType>) {
	if source_return == target_return {
		out.push(InstructionListEntry { label, instruction: original.clone() });
		return;
	}

	let mut first = true;
	let mut push = |instruction: Instruction, out: &mut Vec<InstructionListEntry>| {
		out.push(InstructionListEntry { label: if first { label } else { None }, instruction });
		first = false;
	};

	if let Some(source_type) = source_return {
		push(pop_for(source_type), out);
	}
	if target_return.is_some() {
		push(default_value(target_return), out);
	}
	push(return_for(target_return), out);
}

/// The abstract stack-depth heuristic for Kotlin-object singleton promotion
/// (§4.7 step 5): scans for `getstatic Mixin.INSTANCE`, then looks ahead up
/// to 100 instructions for the first invocation on `Mixin` whose receiver is
/// exactly that pushed instance, replacing both with `invokestatic`.
fn promote_singleton_calls(instructions: &mut Vec<InstructionListEntry>, mixin_class: &ClassName) {
	let mut i = 0;
	while i < instructions.len() {
		let is_instance_load = matches!(&instructions[i].instruction, Instruction::GetStatic(f) if f.class == *mixin_class && f.name.as_str() == "INSTANCE");
		if !is_instance_load {
			i += 1;
			continue;
		}

		let mut depth: i32 = 1;
		let mut matched_at = None;
		let limit = (i + 1 + 100).min(instructions.len());
		for (offset, entry) in instructions[i + 1..limit].iter().enumerate() {
			let j = i + 1 + offset;
			if let Some(args) = invoke_on_mixin_arg_count(&entry.instruction, mixin_class) {
				if depth == args + 1 {
					matched_at = Some(j);
					break;
				}
			}
			depth += stack_delta(&entry.instruction);
			if depth <= 0 {
				break;
			}
		}

		if let Some(j) = matched_at {
			instructions.remove(i);
			let j = j - 1; // indices shifted left by the removal above
			if let Instruction::InvokeVirtual(m) | Instruction::InvokeSpecial(m, _) = instructions[j].instruction.clone() {
				instructions[j].instruction = Instruction::InvokeStatic(m, false);
			}
			// don't advance i: re-examine the same position in case of nested singleton loads
			continue;
		}

		i += 1;
	}
}

fn invoke_on_mixin_arg_count(insn: &Instruction, mixin_class: &ClassName) -> Option<i32> {
	match insn {
		Instruction::InvokeVirtual(m) | Instruction::InvokeSpecial(m, _) if m.class == *mixin_class => {
			let (params, _) = parse_method_descriptor(m.desc.as_str()).ok()?;
			Some(params.iter().map(|p| p.category() as i32).sum())
		}
		_ => None,
	}
}

/// A deliberately approximate stack-effect calculator used only to bound the
/// singleton-promotion search; `classfile`'s own, more precise version in
/// `writer::frames` is private to that crate.
fn stack_delta(insn: &Instruction) -> i32 {
	use Instruction::*;
	match insn {
		Nop | IInc(..) | Goto(_) => 0,
		AConstNull | IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5 | FConst0 | FConst1 | FConst2 | BiPush(_) | SiPush(_) => 1,
		LConst0 | LConst1 | DConst0 | DConst1 => 2,
		ILoad(_) | FLoad(_) | ALoad(_) => 1,
		LLoad(_) | DLoad(_) => 2,
		IStore(_) | FStore(_) | AStore(_) => -1,
		LStore(_) | DStore(_) => -2,
		Pop | IAdd | LAdd | FAdd | DAdd | ISub | LSub | FSub | DSub | IMul | LMul | FMul | DMul | IDiv | LDiv | FDiv | DDiv | IRem | LRem | FRem | DRem
		| IAnd | LAnd | IOr | LOr | IXor | LXor | IShl | LShl | IShr | LShr | IUShr | LUShr => -1,
		Pop2 => -2,
		Dup | DupX1 | DupX2 => 1,
		Dup2 | Dup2X1 | Dup2X2 => 2,
		INeg | LNeg | FNeg | DNeg | I2L | I2F | I2D | L2I | L2F | L2D | F2I | F2L | F2D | D2I | D2L | D2F | I2B | I2C | I2S => 0,
		GetField(_) => 0,
		PutField(_) => -2,
		GetStatic(_) => 1,
		PutStatic(_) => -1,
		New(_) => 1,
		CheckCast(_) | InstanceOf(_) => 0,
		AThrow => -1,
		InvokeVirtual(m) | InvokeInterface(m) => invoke_delta(m, true),
		InvokeSpecial(m, _) | InvokeStatic(m, _) => invoke_delta(m, !matches!(insn, InvokeStatic(..))),
		_ => 0,
	}
}

fn invoke_delta(m: &classfile::tree::method::MethodRef, has_receiver: bool) -> i32 {
	let Ok((params, ret)) = parse_method_descriptor(m.desc.as_str()) else { return 0 };
	let args: i32 = params.iter().map(|p| p.category() as i32).sum::<i32>() + if has_receiver { 1 } else { 0 };
	let pushed = ret.map(|t| t.category() as i32).unwrap_or(0);
	pushed - args
}

#[cfg(test)]
mod tests {
	use classfile::tree::class::{ClassAccess, ClassFile};
	use classfile::tree::field::{Field, FieldAccess};
	use classfile::tree::method::code::InstructionListEntry;
	use classfile::tree::method::{Method, MethodAccess};
	use classfile::strings::{FieldDescriptor, MethodDescriptor, MethodName};
	use pretty_assertions::assert_eq;
	use std::collections::HashMap as StdHashMap;

	use super::*;

	struct MapSource(StdHashMap<ClassName, ClassFile>);
	impl MixinClassSource for MapSource {
		fn get(&self, name: &ClassName) -> Result<ClassFile> {
			self.0.get(name).cloned().ok_or_else(|| anyhow!("missing {name}"))
		}
	}

	fn simple_mixin() -> ClassFile {
		let mut tree = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from("m/Mixin"), Some(ClassName::from("java/lang/Object")), vec![]);
		let mut method = Method::new(MethodAccess { is_public: true, ..Default::default() }, MethodName::from("overwriteA0"), MethodDescriptor::from("()Ljava/lang/String;"));
		let mut code = Code::default();
		code.push(Instruction::Ldc(classfile::tree::method::code::Loadable::String("OverwrittenA0".to_owned())));
		code.push(Instruction::AReturn);
		method.code = Some(code);
		tree.methods.push(method);
		tree
	}

	#[test]
	fn inlines_simple_static_body() {
		let mixin_class = ClassName::from("m/Mixin");
		let target_class = ClassName::from("t/Target");
		let mut source_map = StdHashMap::new();
		source_map.insert(mixin_class.clone(), simple_mixin());
		let source = MapSource(source_map);

		let handler = MethodNameAndDesc { name: MethodName::from("overwriteA0"), desc: MethodDescriptor::from("()Ljava/lang/String;") };
		let req = InlineRequest {
			mixin_class: &mixin_class,
			handler: &handler,
			target_class: &target_class,
			target_is_static: false,
			target_params: &[],
			target_return: Some(&JType::Reference("java/lang/String".to_owned())),
			shadows: &ShadowBindings::default(),
			source: &source,
		};

		let code = inline_body(&req).unwrap();
		assert_eq!(code.instructions.len(), 2);
		assert!(matches!(code.instructions[1].instruction, Instruction::AReturn));
	}

	fn shadow_reading_mixin() -> ClassFile {
		let mut tree = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from("m/Mixin"), Some(ClassName::from("java/lang/Object")), vec![]);
		let mut method = Method::new(MethodAccess { is_public: true, ..Default::default() }, MethodName::from("overwriteA0"), MethodDescriptor::from("()Ljava/lang/String;"));
		let mut code = Code::default();
		code.push(Instruction::ALoad(LvIndex::new(0)));
		code.push(Instruction::GetField(classfile::tree::field::FieldRef {
			class: ClassName::from("m/Mixin"),
			name: "shadowField".into(),
			desc: classfile::strings::FieldDescriptor::from("Ljava/lang/String;"),
		}));
		code.push(Instruction::AReturn);
		method.code = Some(code);
		tree.methods.push(method);
		tree
	}

	#[test]
	fn this_load_is_kept_and_remapped_for_shadowed_field_access() {
		let mixin_class = ClassName::from("m/Mixin");
		let target_class = ClassName::from("t/Target");
		let mut source_map = StdHashMap::new();
		source_map.insert(mixin_class.clone(), shadow_reading_mixin());
		let source = MapSource(source_map);

		let mut shadows = ShadowBindings::default();
		shadows.fields.insert("shadowField".to_owned(), "realField".to_owned());

		let handler = MethodNameAndDesc { name: MethodName::from("overwriteA0"), desc: MethodDescriptor::from("()Ljava/lang/String;") };
		let req = InlineRequest {
			mixin_class: &mixin_class,
			handler: &handler,
			target_class: &target_class,
			target_is_static: false,
			target_params: &[],
			target_return: Some(&JType::Reference("java/lang/String".to_owned())),
			shadows: &shadows,
			source: &source,
		};

		let code = inline_body(&req).unwrap();
		assert_eq!(code.instructions.len(), 3);
		assert!(matches!(code.instructions[0].instruction, Instruction::ALoad(LvIndex { index: 0 })));
		assert!(matches!(&code.instructions[1].instruction, Instruction::GetField(f) if f.class == target_class && f.name.as_str() == "realField"));
		assert!(matches!(code.instructions[2].instruction, Instruction::AReturn));
	}
}
