pub mod frames;
mod pool;

use std::collections::HashMap;

use anyhow::{bail, Result};

use crate::class_constants::op;
use crate::tree::class::ClassFile;
use crate::tree::field::Field;
use crate::tree::method::Method;
use crate::tree::method::code::{Code, Instruction, Label, Loadable};
use crate::writer::pool::PoolBuilder;

/// Serializes a [`ClassFile`] tree back into classfile bytes.
///
/// The constant pool is rebuilt from scratch by walking the tree once,
/// rather than reusing whatever pool it was read with: a transformer is
/// expected to have mutated names, descriptors, and instructions freely, so
/// any previously-assigned indices are meaningless by the time we get here.
pub fn write_class(class: &ClassFile) -> Result<Vec<u8>> {
	let mut pool = PoolBuilder::new();

	let this_class_index = pool.class(&class.name);
	let super_class_index = class.super_class.as_ref().map(|c| pool.class(c));
	let interface_indices: Vec<u16> = class.interfaces.iter().map(|c| pool.class(c)).collect();

	let mut field_bytes = Vec::new();
	for field in &class.fields {
		field_bytes.extend(write_field(&mut pool, field)?);
	}

	let mut method_bytes = Vec::new();
	for method in &class.methods {
		method_bytes.extend(write_method(&mut pool, method)?);
	}

	let mut class_attributes = Vec::new();
	let mut class_attribute_count = 0u16;
	if let Some(source_file) = &class.source_file {
		let name_index = pool.utf8("SourceFile");
		let value_index = pool.utf8(source_file);
		class_attributes.extend(name_index.to_be_bytes());
		class_attributes.extend(4u32.to_be_bytes());
		class_attributes.extend(value_index.to_be_bytes());
		class_attribute_count += 1;
	}
	if let Some(signature) = &class.signature {
		let name_index = pool.utf8("Signature");
		let value_index = pool.utf8(signature);
		class_attributes.extend(name_index.to_be_bytes());
		class_attributes.extend(4u32.to_be_bytes());
		class_attributes.extend(value_index.to_be_bytes());
		class_attribute_count += 1;
	}
	if class.has_synthetic_attribute {
		let name_index = pool.utf8("Synthetic");
		class_attributes.extend(name_index.to_be_bytes());
		class_attributes.extend(0u32.to_be_bytes());
		class_attribute_count += 1;
	}
	if class.has_deprecated_attribute {
		let name_index = pool.utf8("Deprecated");
		class_attributes.extend(name_index.to_be_bytes());
		class_attributes.extend(0u32.to_be_bytes());
		class_attribute_count += 1;
	}
	for raw in &class.attributes {
		let name_index = pool.utf8(&raw.name);
		class_attributes.extend(name_index.to_be_bytes());
		class_attributes.extend((raw.data.len() as u32).to_be_bytes());
		class_attributes.extend(&raw.data);
		class_attribute_count += 1;
	}

	let bootstrap_name_index = if pool.has_bootstrap_methods() { Some(pool.utf8("BootstrapMethods")) } else { None };

	let (pool_bytes, pool_count, bootstrap_bytes) = pool.finish();

	if let Some(name_index) = bootstrap_name_index {
		class_attributes.extend(name_index.to_be_bytes());
		class_attributes.extend((bootstrap_bytes.len() as u32).to_be_bytes());
		class_attributes.extend(&bootstrap_bytes);
		class_attribute_count += 1;
	}

	let mut out = Vec::new();
	out.extend(0xCAFEBABEu32.to_be_bytes());
	out.extend(class.minor_version.to_be_bytes());
	out.extend(class.major_version.to_be_bytes());
	out.extend(pool_count.to_be_bytes());
	out.extend(pool_bytes);
	out.extend(u16::from(class.access).to_be_bytes());
	out.extend(this_class_index.to_be_bytes());
	out.extend(super_class_index.unwrap_or(0).to_be_bytes());
	out.extend((interface_indices.len() as u16).to_be_bytes());
	for index in interface_indices {
		out.extend(index.to_be_bytes());
	}
	out.extend((class.fields.len() as u16).to_be_bytes());
	out.extend(field_bytes);
	out.extend((class.methods.len() as u16).to_be_bytes());
	out.extend(method_bytes);

	out.extend(class_attribute_count.to_be_bytes());
	out.extend(class_attributes);

	Ok(out)
}

fn write_field(pool: &mut PoolBuilder, field: &Field) -> Result<Vec<u8>> {
	let mut out = Vec::new();
	out.extend(u16::from(field.access).to_be_bytes());
	out.extend(pool.field_name(&field.name).to_be_bytes());
	out.extend(pool.field_descriptor(&field.descriptor).to_be_bytes());

	let mut attributes = Vec::new();
	let mut count = 0u16;
	if let Some(value) = &field.constant_value {
		let name_index = pool.utf8("ConstantValue");
		let value_index = match value {
			crate::tree::field::ConstantValue::Integer(v) => pool.integer(*v),
			crate::tree::field::ConstantValue::Float(v) => pool.float(*v),
			crate::tree::field::ConstantValue::Long(v) => pool.long(*v),
			crate::tree::field::ConstantValue::Double(v) => pool.double(*v),
			crate::tree::field::ConstantValue::String(s) => pool.string(s),
		};
		attributes.extend(name_index.to_be_bytes());
		attributes.extend(2u32.to_be_bytes());
		attributes.extend(value_index.to_be_bytes());
		count += 1;
	}
	if let Some(signature) = &field.signature {
		let name_index = pool.utf8("Signature");
		let value_index = pool.utf8(signature);
		attributes.extend(name_index.to_be_bytes());
		attributes.extend(2u32.to_be_bytes());
		attributes.extend(value_index.to_be_bytes());
		count += 1;
	}
	if field.has_synthetic_attribute {
		attributes.extend(pool.utf8("Synthetic").to_be_bytes());
		attributes.extend(0u32.to_be_bytes());
		count += 1;
	}
	if field.has_deprecated_attribute {
		attributes.extend(pool.utf8("Deprecated").to_be_bytes());
		attributes.extend(0u32.to_be_bytes());
		count += 1;
	}
	for raw in &field.attributes {
		attributes.extend(pool.utf8(&raw.name).to_be_bytes());
		attributes.extend((raw.data.len() as u32).to_be_bytes());
		attributes.extend(&raw.data);
		count += 1;
	}

	out.extend(count.to_be_bytes());
	out.extend(attributes);
	Ok(out)
}

fn write_method(pool: &mut PoolBuilder, method: &Method) -> Result<Vec<u8>> {
	let mut out = Vec::new();
	out.extend(u16::from(method.access).to_be_bytes());
	out.extend(pool.method_name(&method.name).to_be_bytes());
	out.extend(pool.method_descriptor(&method.descriptor).to_be_bytes());

	let mut attributes = Vec::new();
	let mut count = 0u16;

	if let Some(code) = &method.code {
		let name_index = pool.utf8("Code");
		let body = write_code(pool, code)?;
		attributes.extend(name_index.to_be_bytes());
		attributes.extend((body.len() as u32).to_be_bytes());
		attributes.extend(body);
		count += 1;
	}
	if let Some(exceptions) = &method.exceptions {
		let name_index = pool.utf8("Exceptions");
		let mut body = Vec::new();
		body.extend((exceptions.len() as u16).to_be_bytes());
		for exception in exceptions {
			body.extend(pool.class(exception).to_be_bytes());
		}
		attributes.extend(name_index.to_be_bytes());
		attributes.extend((body.len() as u32).to_be_bytes());
		attributes.extend(body);
		count += 1;
	}
	if let Some(signature) = &method.signature {
		attributes.extend(pool.utf8("Signature").to_be_bytes());
		attributes.extend(2u32.to_be_bytes());
		attributes.extend(pool.utf8(signature).to_be_bytes());
		count += 1;
	}
	if method.has_synthetic_attribute {
		attributes.extend(pool.utf8("Synthetic").to_be_bytes());
		attributes.extend(0u32.to_be_bytes());
		count += 1;
	}
	if method.has_deprecated_attribute {
		attributes.extend(pool.utf8("Deprecated").to_be_bytes());
		attributes.extend(0u32.to_be_bytes());
		count += 1;
	}
	if let Some(params) = &method.method_parameters {
		let mut body = vec![params.len() as u8];
		for param in params {
			let name_index = param.name.as_deref().map_or(0, |n| pool.utf8(n));
			body.extend(name_index.to_be_bytes());
			body.extend(parameter_flags_bits(param.flags).to_be_bytes());
		}
		attributes.extend(pool.utf8("MethodParameters").to_be_bytes());
		attributes.extend((body.len() as u32).to_be_bytes());
		attributes.extend(body);
		count += 1;
	}
	for raw in &method.attributes {
		attributes.extend(pool.utf8(&raw.name).to_be_bytes());
		attributes.extend((raw.data.len() as u32).to_be_bytes());
		attributes.extend(&raw.data);
		count += 1;
	}

	out.extend(count.to_be_bytes());
	out.extend(attributes);
	Ok(out)
}

fn parameter_flags_bits(flags: crate::tree::method::ParameterFlags) -> u16 {
	(if flags.is_final { 0x0010 } else { 0 }) | (if flags.is_synthetic { 0x1000 } else { 0 }) | (if flags.is_mandated { 0x8000 } else { 0 })
}

/// Encodes a `Code` attribute body. `max_stack`/`max_locals` are taken from
/// `code` if present, else recomputed via [`frames::compute_max_stack`] /
/// [`frames::compute_max_locals`] — the path every directive-inserted
/// method body goes through, since injectors don't track stack depth.
fn write_code(pool: &mut PoolBuilder, code: &Code) -> Result<Vec<u8>> {
	let (instruction_bytes, label_offsets, code_length) = encode_instructions(pool, code)?;

	let max_stack = match code.max_stack {
		Some(v) => v,
		None => frames::compute_max_stack(code)?,
	};
	let max_locals = match code.max_locals {
		Some(v) => v,
		None => frames::compute_max_locals(code),
	};

	let mut out = Vec::new();
	out.extend(max_stack.to_be_bytes());
	out.extend(max_locals.to_be_bytes());
	out.extend((code_length as u32).to_be_bytes());
	out.extend(instruction_bytes);

	out.extend((code.exception_table.len() as u16).to_be_bytes());
	for exception in &code.exception_table {
		out.extend(label_offset(&label_offsets, exception.start)?.to_be_bytes());
		out.extend(label_offset(&label_offsets, exception.end)?.to_be_bytes());
		out.extend(label_offset(&label_offsets, exception.handler)?.to_be_bytes());
		out.extend(exception.catch_type.as_ref().map_or(0, |c| pool.class(c)).to_be_bytes());
	}

	let mut attributes = Vec::new();
	let mut attribute_count = 0u16;
	if let Some(line_numbers) = &code.line_numbers {
		let mut body = Vec::new();
		body.extend((line_numbers.len() as u16).to_be_bytes());
		for (label, line) in line_numbers {
			body.extend(label_offset(&label_offsets, *label)?.to_be_bytes());
			body.extend(line.to_be_bytes());
		}
		attributes.extend(pool.utf8("LineNumberTable").to_be_bytes());
		attributes.extend((body.len() as u32).to_be_bytes());
		attributes.extend(body);
		attribute_count += 1;
	}
	if let Some(locals) = &code.local_variables {
		let mut body = Vec::new();
		body.extend((locals.len() as u16).to_be_bytes());
		for lv in locals {
			let start = label_offset(&label_offsets, lv.range.start)?;
			let end = label_offset(&label_offsets, lv.range.end)?;
			body.extend(start.to_be_bytes());
			body.extend((end - start).to_be_bytes());
			body.extend(pool.utf8(&lv.name).to_be_bytes());
			let descriptor_index = lv.descriptor.as_ref().map_or_else(|| pool.utf8(""), |d| pool.field_descriptor(d));
			body.extend(descriptor_index.to_be_bytes());
			body.extend(lv.index.index.to_be_bytes());
		}
		attributes.extend(pool.utf8("LocalVariableTable").to_be_bytes());
		attributes.extend((body.len() as u32).to_be_bytes());
		attributes.extend(body);
		attribute_count += 1;
	}
	for raw in &code.attributes {
		attributes.extend(pool.utf8(&raw.name).to_be_bytes());
		attributes.extend((raw.data.len() as u32).to_be_bytes());
		attributes.extend(&raw.data);
		attribute_count += 1;
	}

	out.extend(attribute_count.to_be_bytes());
	out.extend(attributes);
	Ok(out)
}

fn label_offset(offsets: &HashMap<Label, u16>, label: Label) -> Result<u16> {
	offsets.get(&label).copied().ok_or_else(|| anyhow::anyhow!("label has no instruction position; only labels attached to an instruction entry or the implicit end-of-code label can be resolved"))
}

/// Two-pass instruction encoder: pass one computes each instruction's byte
/// offset (needed for switch padding and for resolving forward branches in
/// pass two), pass two emits the actual bytes.
fn encode_instructions(pool: &mut PoolBuilder, code: &Code) -> Result<(Vec<u8>, HashMap<Label, u16>, usize)> {
	let mut offsets = Vec::with_capacity(code.instructions.len());
	let mut offset = 0usize;
	for entry in &code.instructions {
		offsets.push(offset as u32);
		offset += instruction_size(pool, &entry.instruction, offset as u32)?;
	}
	let code_length = offset;

	let mut label_offsets: HashMap<Label, u16> = HashMap::new();
	for (entry, &off) in code.instructions.iter().zip(&offsets) {
		if let Some(label) = entry.label {
			label_offsets.insert(label, u16::try_from(off).map_err(|_| anyhow::anyhow!("method body exceeds 65535 bytes"))?);
		}
	}
	if let Some(last) = code.last_label {
		label_offsets.insert(last, u16::try_from(code_length).map_err(|_| anyhow::anyhow!("method body exceeds 65535 bytes"))?);
	}

	let mut out = Vec::with_capacity(code_length);
	for (entry, &insn_offset) in code.instructions.iter().zip(&offsets) {
		encode_instruction(pool, &entry.instruction, insn_offset, &label_offsets, &mut out)?;
	}
	if out.len() != code_length {
		bail!("instruction encoder produced {} bytes but sizing pass computed {code_length}", out.len());
	}

	Ok((out, label_offsets, code_length))
}

fn switch_padding(offset: u32) -> usize {
	((4 - (offset + 1) % 4) % 4) as usize
}

/// Computes an instruction's encoded size. Takes `pool` because `Ldc`'s size
/// depends on whether its constant needs a wide (`ldc_w`) or two-slot
/// (`ldc2_w`) index, which is only known once the constant has actually been
/// interned; interning here is safe since `encode_instruction` interns the
/// same value again afterwards and gets the same index back.
fn instruction_size(pool: &mut PoolBuilder, instruction: &Instruction, offset: u32) -> Result<usize> {
	use Instruction::*;
	Ok(match instruction {
		Nop | AConstNull | IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5 | LConst0 | LConst1 | FConst0 | FConst1 | FConst2 | DConst0 | DConst1 => 1,
		BiPush(_) => 2,
		SiPush(_) => 3,
		Ldc(v) => {
			if matches!(v, Loadable::Long(_) | Loadable::Double(_)) {
				3
			} else {
				let index = pool.loadable(v);
				if index <= u8::MAX as u16 { 2 } else { 3 }
			}
		}
		ILoad(i) | LLoad(i) | FLoad(i) | DLoad(i) | ALoad(i) | IStore(i) | LStore(i) | FStore(i) | DStore(i) | AStore(i) => if i.index < 4 { 1 } else { 2 },
		IALoad | LALoad | FALoad | DALoad | AALoad | BALoad | CALoad | SALoad => 1,
		IAStore | LAStore | FAStore | DAStore | AAStore | BAStore | CAStore | SAStore => 1,
		Pop | Pop2 | Dup | DupX1 | DupX2 | Dup2 | Dup2X1 | Dup2X2 | Swap => 1,
		IAdd | LAdd | FAdd | DAdd | ISub | LSub | FSub | DSub | IMul | LMul | FMul | DMul | IDiv | LDiv | FDiv | DDiv | IRem | LRem | FRem | DRem => 1,
		INeg | LNeg | FNeg | DNeg | IShl | LShl | IShr | LShr | IUShr | LUShr | IAnd | LAnd | IOr | LOr | IXor | LXor => 1,
		IInc(i, _) => if i.index < 256 { 3 } else { 6 },
		I2L | I2F | I2D | L2I | L2F | L2D | F2I | F2L | F2D | D2I | D2L | D2F | I2B | I2C | I2S => 1,
		LCmp | FCmpL | FCmpG | DCmpL | DCmpG => 1,
		IfEq(_) | IfNe(_) | IfLt(_) | IfGe(_) | IfGt(_) | IfLe(_) => 3,
		IfICmpEq(_) | IfICmpNe(_) | IfICmpLt(_) | IfICmpGe(_) | IfICmpGt(_) | IfICmpLe(_) | IfACmpEq(_) | IfACmpNe(_) => 3,
		Goto(_) => 3,
		Ret(i) => if i.index < 256 { 2 } else { 4 },
		TableSwitch { low, high, .. } => 1 + switch_padding(offset) + 12 + 4 * (high - low + 1).max(0) as usize,
		LookupSwitch { pairs, .. } => 1 + switch_padding(offset) + 8 + 8 * pairs.len(),
		IReturn | LReturn | FReturn | DReturn | AReturn | Return => 1,
		GetStatic(_) | PutStatic(_) | GetField(_) | PutField(_) => 3,
		InvokeVirtual(_) | InvokeSpecial(_, _) | InvokeStatic(_, _) => 3,
		InvokeInterface(_) => 5,
		InvokeDynamic(_) => 5,
		New(_) => 3,
		NewArray(_) => 2,
		ANewArray(_) => 3,
		ArrayLength | AThrow => 1,
		CheckCast(_) | InstanceOf(_) => 3,
		MonitorEnter | MonitorExit => 1,
		MultiANewArray(_, _) => 4,
		IfNull(_) | IfNonNull(_) => 3,
	})
}

fn encode_instruction(pool: &mut PoolBuilder, instruction: &Instruction, insn_offset: u32, label_offsets: &HashMap<Label, u16>, out: &mut Vec<u8>) -> Result<()> {
	use Instruction::*;

	let rel = |target: Label, out: &mut Vec<u8>| -> Result<()> {
		let target_offset = label_offset(label_offsets, target)? as i32;
		let delta = target_offset - insn_offset as i32;
		let delta = i16::try_from(delta).map_err(|_| anyhow::anyhow!("branch offset {delta} does not fit in a 16-bit jump; wide goto rewriting is not supported"))?;
		out.extend(delta.to_be_bytes());
		Ok(())
	};

	match instruction {
		Nop => out.push(op::NOP),
		AConstNull => out.push(op::ACONST_NULL),
		IConstM1 => out.push(op::ICONST_M1),
		IConst0 => out.push(op::ICONST_0),
		IConst1 => out.push(op::ICONST_1),
		IConst2 => out.push(op::ICONST_2),
		IConst3 => out.push(op::ICONST_3),
		IConst4 => out.push(op::ICONST_4),
		IConst5 => out.push(op::ICONST_5),
		LConst0 => out.push(op::LCONST_0),
		LConst1 => out.push(op::LCONST_1),
		FConst0 => out.push(op::FCONST_0),
		FConst1 => out.push(op::FCONST_1),
		FConst2 => out.push(op::FCONST_2),
		DConst0 => out.push(op::DCONST_0),
		DConst1 => out.push(op::DCONST_1),
		BiPush(v) => { out.push(op::BIPUSH); out.push(*v as u8); }
		SiPush(v) => { out.push(op::SIPUSH); out.extend(v.to_be_bytes()); }
		Ldc(v) => {
			let index = pool.loadable(v);
			let wide = matches!(v, Loadable::Long(_) | Loadable::Double(_));
			if wide {
				out.push(op::LDC2_W);
				out.extend(index.to_be_bytes());
			} else if index <= u8::MAX as u16 {
				out.push(op::LDC);
				out.push(index as u8);
			} else {
				out.push(op::LDC_W);
				out.extend(index.to_be_bytes());
			}
		}
		ILoad(i) => load_store_op(out, op::ILOAD, op::ILOAD_0, *i),
		LLoad(i) => load_store_op(out, op::LLOAD, op::LLOAD_0, *i),
		FLoad(i) => load_store_op(out, op::FLOAD, op::FLOAD_0, *i),
		DLoad(i) => load_store_op(out, op::DLOAD, op::DLOAD_0, *i),
		ALoad(i) => load_store_op(out, op::ALOAD, op::ALOAD_0, *i),
		IStore(i) => load_store_op(out, op::ISTORE, op::ISTORE_0, *i),
		LStore(i) => load_store_op(out, op::LSTORE, op::LSTORE_0, *i),
		FStore(i) => load_store_op(out, op::FSTORE, op::FSTORE_0, *i),
		DStore(i) => load_store_op(out, op::DSTORE, op::DSTORE_0, *i),
		AStore(i) => load_store_op(out, op::ASTORE, op::ASTORE_0, *i),
		IALoad => out.push(op::IALOAD), LALoad => out.push(op::LALOAD), FALoad => out.push(op::FALOAD), DALoad => out.push(op::DALOAD),
		AALoad => out.push(op::AALOAD), BALoad => out.push(op::BALOAD), CALoad => out.push(op::CALOAD), SALoad => out.push(op::SALOAD),
		IAStore => out.push(op::IASTORE), LAStore => out.push(op::LASTORE), FAStore => out.push(op::FASTORE), DAStore => out.push(op::DASTORE),
		AAStore => out.push(op::AASTORE), BAStore => out.push(op::BASTORE), CAStore => out.push(op::CASTORE), SAStore => out.push(op::SASTORE),
		Pop => out.push(op::POP), Pop2 => out.push(op::POP2),
		Dup => out.push(op::DUP), DupX1 => out.push(op::DUP_X1), DupX2 => out.push(op::DUP_X2),
		Dup2 => out.push(op::DUP2), Dup2X1 => out.push(op::DUP2_X1), Dup2X2 => out.push(op::DUP2_X2),
		Swap => out.push(op::SWAP),
		IAdd => out.push(op::IADD), LAdd => out.push(op::LADD), FAdd => out.push(op::FADD), DAdd => out.push(op::DADD),
		ISub => out.push(op::ISUB), LSub => out.push(op::LSUB), FSub => out.push(op::FSUB), DSub => out.push(op::DSUB),
		IMul => out.push(op::IMUL), LMul => out.push(op::LMUL), FMul => out.push(op::FMUL), DMul => out.push(op::DMUL),
		IDiv => out.push(op::IDIV), LDiv => out.push(op::LDIV), FDiv => out.push(op::FDIV), DDiv => out.push(op::DDIV),
		IRem => out.push(op::IREM), LRem => out.push(op::LREM), FRem => out.push(op::FREM), DRem => out.push(op::DREM),
		INeg => out.push(op::INEG), LNeg => out.push(op::LNEG), FNeg => out.push(op::FNEG), DNeg => out.push(op::DNEG),
		IShl => out.push(op::ISHL), LShl => out.push(op::LSHL),
		IShr => out.push(op::ISHR), LShr => out.push(op::LSHR),
		IUShr => out.push(op::IUSHR), LUShr => out.push(op::LUSHR),
		IAnd => out.push(op::IAND), LAnd => out.push(op::LAND),
		IOr => out.push(op::IOR), LOr => out.push(op::LOR),
		IXor => out.push(op::IXOR), LXor => out.push(op::LXOR),
		IInc(i, delta) => {
			if i.index < 256 && i8::try_from(*delta).is_ok() {
				out.push(op::IINC);
				out.push(i.index as u8);
				out.push(*delta as i8 as u8);
			} else {
				out.push(op::WIDE);
				out.push(op::IINC);
				out.extend(i.index.to_be_bytes());
				out.extend(delta.to_be_bytes());
			}
		}
		I2L => out.push(op::I2L), I2F => out.push(op::I2F), I2D => out.push(op::I2D),
		L2I => out.push(op::L2I), L2F => out.push(op::L2F), L2D => out.push(op::L2D),
		F2I => out.push(op::F2I), F2L => out.push(op::F2L), F2D => out.push(op::F2D),
		D2I => out.push(op::D2I), D2L => out.push(op::D2L), D2F => out.push(op::D2F),
		I2B => out.push(op::I2B), I2C => out.push(op::I2C), I2S => out.push(op::I2S),
		LCmp => out.push(op::LCMP), FCmpL => out.push(op::FCMPL), FCmpG => out.push(op::FCMPG), DCmpL => out.push(op::DCMPL), DCmpG => out.push(op::DCMPG),
		IfEq(l) => { out.push(op::IFEQ); rel(*l, out)?; }
		IfNe(l) => { out.push(op::IFNE); rel(*l, out)?; }
		IfLt(l) => { out.push(op::IFLT); rel(*l, out)?; }
		IfGe(l) => { out.push(op::IFGE); rel(*l, out)?; }
		IfGt(l) => { out.push(op::IFGT); rel(*l, out)?; }
		IfLe(l) => { out.push(op::IFLE); rel(*l, out)?; }
		IfICmpEq(l) => { out.push(op::IF_ICMPEQ); rel(*l, out)?; }
		IfICmpNe(l) => { out.push(op::IF_ICMPNE); rel(*l, out)?; }
		IfICmpLt(l) => { out.push(op::IF_ICMPLT); rel(*l, out)?; }
		IfICmpGe(l) => { out.push(op::IF_ICMPGE); rel(*l, out)?; }
		IfICmpGt(l) => { out.push(op::IF_ICMPGT); rel(*l, out)?; }
		IfICmpLe(l) => { out.push(op::IF_ICMPLE); rel(*l, out)?; }
		IfACmpEq(l) => { out.push(op::IF_ACMPEQ); rel(*l, out)?; }
		IfACmpNe(l) => { out.push(op::IF_ACMPNE); rel(*l, out)?; }
		Goto(l) => { out.push(op::GOTO); rel(*l, out)?; }
		Ret(i) => {
			if i.index < 256 {
				out.push(op::RET);
				out.push(i.index as u8);
			} else {
				out.push(op::WIDE);
				out.push(op::RET);
				out.extend(i.index.to_be_bytes());
			}
		}
		TableSwitch { default, low, high, table } => {
			out.push(op::TABLESWITCH);
			for _ in 0..switch_padding(insn_offset) {
				out.push(0);
			}
			out.extend((label_offset(label_offsets, *default)? as i32 - insn_offset as i32).to_be_bytes());
			out.extend(low.to_be_bytes());
			out.extend(high.to_be_bytes());
			for label in table {
				out.extend((label_offset(label_offsets, *label)? as i32 - insn_offset as i32).to_be_bytes());
			}
		}
		LookupSwitch { default, pairs } => {
			out.push(op::LOOKUPSWITCH);
			for _ in 0..switch_padding(insn_offset) {
				out.push(0);
			}
			out.extend((label_offset(label_offsets, *default)? as i32 - insn_offset as i32).to_be_bytes());
			out.extend((pairs.len() as i32).to_be_bytes());
			for (key, label) in pairs {
				out.extend(key.to_be_bytes());
				out.extend((label_offset(label_offsets, *label)? as i32 - insn_offset as i32).to_be_bytes());
			}
		}
		IReturn => out.push(op::IRETURN), LReturn => out.push(op::LRETURN), FReturn => out.push(op::FRETURN), DReturn => out.push(op::DRETURN), AReturn => out.push(op::ARETURN),
		Return => out.push(op::RETURN),
		GetStatic(f) => { out.push(op::GETSTATIC); out.extend(pool.field_ref(f).to_be_bytes()); }
		PutStatic(f) => { out.push(op::PUTSTATIC); out.extend(pool.field_ref(f).to_be_bytes()); }
		GetField(f) => { out.push(op::GETFIELD); out.extend(pool.field_ref(f).to_be_bytes()); }
		PutField(f) => { out.push(op::PUTFIELD); out.extend(pool.field_ref(f).to_be_bytes()); }
		InvokeVirtual(m) => { out.push(op::INVOKEVIRTUAL); out.extend(pool.method_ref(m, false).to_be_bytes()); }
		InvokeSpecial(m, is_if) => { out.push(op::INVOKESPECIAL); out.extend(pool.method_ref(m, *is_if).to_be_bytes()); }
		InvokeStatic(m, is_if) => { out.push(op::INVOKESTATIC); out.extend(pool.method_ref(m, *is_if).to_be_bytes()); }
		InvokeInterface(m) => {
			out.push(op::INVOKEINTERFACE);
			out.extend(pool.method_ref(m, true).to_be_bytes());
			let (params, _) = crate::tree::descriptor::parse_method_descriptor(m.desc.as_str()).unwrap_or_default();
			let count: u8 = 1 + params.iter().map(|t| t.category()).sum::<u8>();
			out.push(count);
			out.push(0);
		}
		InvokeDynamic(d) => {
			out.push(op::INVOKEDYNAMIC);
			out.extend(pool.invoke_dynamic(d).to_be_bytes());
			out.extend(0u16.to_be_bytes());
		}
		New(c) => { out.push(op::NEW); out.extend(pool.class(c).to_be_bytes()); }
		NewArray(t) => { out.push(op::NEWARRAY); out.push(t.to_atype()); }
		ANewArray(c) => { out.push(op::ANEWARRAY); out.extend(pool.class(c).to_be_bytes()); }
		ArrayLength => out.push(op::ARRAYLENGTH),
		AThrow => out.push(op::ATHROW),
		CheckCast(c) => { out.push(op::CHECKCAST); out.extend(pool.class(c).to_be_bytes()); }
		InstanceOf(c) => { out.push(op::INSTANCEOF); out.extend(pool.class(c).to_be_bytes()); }
		MonitorEnter => out.push(op::MONITORENTER),
		MonitorExit => out.push(op::MONITOREXIT),
		MultiANewArray(c, dims) => { out.push(op::MULTIANEWARRAY); out.extend(pool.class(c).to_be_bytes()); out.push(*dims); }
		IfNull(l) => { out.push(op::IFNULL); rel(*l, out)?; }
		IfNonNull(l) => { out.push(op::IFNONNULL); rel(*l, out)?; }
	}

	Ok(())
}

fn load_store_op(out: &mut Vec<u8>, wide_op: u8, narrow_base: u8, index: crate::tree::method::code::LvIndex) {
	if index.index < 4 {
		out.push(narrow_base + index.index as u8);
	} else if index.index < 256 {
		out.push(wide_op);
		out.push(index.index as u8);
	} else {
		out.push(op::WIDE);
		out.push(wide_op);
		out.extend(index.index.to_be_bytes());
	}
}
