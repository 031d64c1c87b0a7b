mod cursor;
pub(crate) mod pool;

use std::collections::BTreeMap;
use anyhow::{bail, Context, Result};
use crate::class_constants::{op, tag};
use crate::reader::cursor::Cursor;
use crate::reader::pool::{BootstrapMethod, ConstantPool, RawEntry};
use crate::strings::{FieldDescriptor, FieldName, MethodDescriptor, MethodName};
use crate::tree::attribute::RawAttribute;
use crate::tree::class::{ClassAccess, ClassFile};
use crate::tree::field::{ConstantValue, Field, FieldAccess};
use crate::tree::method::{Method, MethodAccess, MethodParameter, ParameterFlags};
use crate::tree::method::code::{
	ArrayType, Code, Exception, Instruction, InstructionListEntry, InvokeDynamic, Label, LabelRange, Loadable, Lv, LvIndex,
};

/// Parses a full classfile from bytes into a mutable [`ClassFile`] tree.
///
/// `StackMapTable` frames are discarded on read and recomputed on write (see
/// `crate::writer::frames`) rather than carried through, since any directive
/// that inserts or removes instructions invalidates them anyway.
pub fn read_class(bytes: &[u8]) -> Result<ClassFile> {
	let mut cursor = Cursor::new(bytes);

	let magic = cursor.u32()?;
	if magic != 0xCAFEBABE {
		bail!("not a classfile: bad magic {magic:#x}");
	}
	let minor_version = cursor.u16()?;
	let major_version = cursor.u16()?;

	let pool = read_constant_pool(&mut cursor)?;

	let access = ClassAccess::from(cursor.u16()?);
	let this_class = pool.class_name(cursor.u16()?)?;
	let super_index = cursor.u16()?;
	let super_class = if super_index == 0 { None } else { Some(pool.class_name(super_index)?) };

	let interfaces_count = cursor.u16()?;
	let mut interfaces = Vec::with_capacity(interfaces_count as usize);
	for _ in 0..interfaces_count {
		interfaces.push(pool.class_name(cursor.u16()?)?);
	}

	// `BootstrapMethods` is a class-level attribute that appears, in byte
	// order, after every field and method. Any `invokedynamic` or `Dynamic`
	// constant decoded while reading a method's Code needs that table, so we
	// scan ahead for it before parsing fields and methods for real.
	let fields_and_methods_start = cursor.pos();
	skip_fields_and_methods(&mut cursor)?;
	let bootstrap_methods = read_bootstrap_methods(&mut cursor, &pool)?;

	let mut cursor = Cursor::new(bytes);
	cursor.skip(fields_and_methods_start)?;

	let fields_count = cursor.u16()?;
	let mut fields = Vec::with_capacity(fields_count as usize);
	for _ in 0..fields_count {
		fields.push(read_field(&mut cursor, &pool, &bootstrap_methods)?);
	}

	let methods_count = cursor.u16()?;
	let mut methods = Vec::with_capacity(methods_count as usize);
	for _ in 0..methods_count {
		methods.push(read_method(&mut cursor, &pool, &bootstrap_methods)?);
	}

	let mut class = ClassFile::new(major_version, minor_version, access, this_class, super_class, interfaces);
	class.fields = fields;
	class.methods = methods;

	let attributes_count = cursor.u16()?;
	for _ in 0..attributes_count {
		let name = read_attribute_name(&mut cursor, &pool)?;
		let length = cursor.u32()? as usize;
		let data = cursor.bytes(length)?;
		match name.as_str() {
			"SourceFile" => {
				let index = Cursor::new(data).u16()?;
				class.source_file = Some(pool.utf8(index)?.to_owned());
			}
			"Signature" => {
				let index = Cursor::new(data).u16()?;
				class.signature = Some(pool.utf8(index)?.to_owned());
			}
			"Synthetic" => class.has_synthetic_attribute = true,
			"Deprecated" => class.has_deprecated_attribute = true,
			"BootstrapMethods" => {} // already consumed above
			_ => class.attributes.push(RawAttribute { name, data: data.to_vec() }),
		}
	}

	Ok(class)
}

fn read_attribute_name(cursor: &mut Cursor, pool: &ConstantPool) -> Result<String> {
	let index = cursor.u16()?;
	Ok(pool.utf8(index)?.to_owned())
}

fn skip_fields_and_methods(cursor: &mut Cursor) -> Result<()> {
	let fields_count = cursor.u16()?;
	for _ in 0..fields_count {
		cursor.skip(2 + 2 + 2)?; // access, name_index, descriptor_index
		skip_attributes(cursor)?;
	}
	let methods_count = cursor.u16()?;
	for _ in 0..methods_count {
		cursor.skip(2 + 2 + 2)?;
		skip_attributes(cursor)?;
	}
	Ok(())
}

fn skip_attributes(cursor: &mut Cursor) -> Result<()> {
	let count = cursor.u16()?;
	for _ in 0..count {
		cursor.skip(2)?; // attribute_name_index
		let length = cursor.u32()? as usize;
		cursor.skip(length)?;
	}
	Ok(())
}

/// Scans the class-attributes section (cursor positioned right after the
/// last method) for `BootstrapMethods`, skipping every other attribute by
/// its declared length.
fn read_bootstrap_methods(cursor: &mut Cursor, pool: &ConstantPool) -> Result<Vec<BootstrapMethod>> {
	let count = cursor.u16()?;
	for _ in 0..count {
		let name = read_attribute_name(cursor, pool)?;
		let length = cursor.u32()? as usize;
		let data = cursor.bytes(length)?;
		if name == "BootstrapMethods" {
			let mut c = Cursor::new(data);
			let n = c.u16()?;
			let mut methods = Vec::with_capacity(n as usize);
			for _ in 0..n {
				let handle_index = c.u16()?;
				let arg_count = c.u16()?;
				let mut arg_indices = Vec::with_capacity(arg_count as usize);
				for _ in 0..arg_count {
					arg_indices.push(c.u16()?);
				}
				methods.push(BootstrapMethod { handle_index, arg_indices });
			}
			return Ok(methods);
		}
	}
	Ok(Vec::new())
}

fn read_field(cursor: &mut Cursor, pool: &ConstantPool, bootstrap_methods: &[BootstrapMethod]) -> Result<Field> {
	let access = FieldAccess::from(cursor.u16()?);
	let name = FieldName::from(pool.utf8(cursor.u16()?)?);
	let descriptor = FieldDescriptor::from(pool.utf8(cursor.u16()?)?);

	let mut field = Field::new(access, name, descriptor);

	let attributes_count = cursor.u16()?;
	for _ in 0..attributes_count {
		let name = read_attribute_name(cursor, pool)?;
		let length = cursor.u32()? as usize;
		let data = cursor.bytes(length)?;
		match name.as_str() {
			"ConstantValue" => {
				let index = Cursor::new(data).u16()?;
				field.constant_value = Some(read_constant_value(pool, index, bootstrap_methods)?);
			}
			"Signature" => field.signature = Some(Cursor::new(data).u16().and_then(|i| pool.utf8(i).map(str::to_owned))?),
			"Synthetic" => field.has_synthetic_attribute = true,
			"Deprecated" => field.has_deprecated_attribute = true,
			_ => field.attributes.push(RawAttribute { name, data: data.to_vec() }),
		}
	}

	Ok(field)
}

fn read_constant_value(pool: &ConstantPool, index: u16, bootstrap_methods: &[BootstrapMethod]) -> Result<ConstantValue> {
	match pool.loadable(index, bootstrap_methods)? {
		Loadable::Integer(v) => Ok(ConstantValue::Integer(v)),
		Loadable::Float(v) => Ok(ConstantValue::Float(v)),
		Loadable::Long(v) => Ok(ConstantValue::Long(v)),
		Loadable::Double(v) => Ok(ConstantValue::Double(v)),
		Loadable::String(v) => Ok(ConstantValue::String(v)),
		other => bail!("unsupported ConstantValue entry: {other:?}"),
	}
}

fn read_method(cursor: &mut Cursor, pool: &ConstantPool, bootstrap_methods: &[BootstrapMethod]) -> Result<Method> {
	let access = MethodAccess::from(cursor.u16()?);
	let name = MethodName::from(pool.utf8(cursor.u16()?)?);
	let descriptor = MethodDescriptor::from(pool.utf8(cursor.u16()?)?);

	let mut method = Method::new(access, name, descriptor);

	let attributes_count = cursor.u16()?;
	for _ in 0..attributes_count {
		let attr_name = read_attribute_name(cursor, pool)?;
		let length = cursor.u32()? as usize;
		let data = cursor.bytes(length)?;
		match attr_name.as_str() {
			"Code" => method.code = Some(read_code(data, pool, bootstrap_methods)?),
			"Exceptions" => {
				let mut c = Cursor::new(data);
				let n = c.u16()?;
				let mut exceptions = Vec::with_capacity(n as usize);
				for _ in 0..n {
					exceptions.push(pool.class_name(c.u16()?)?);
				}
				method.exceptions = Some(exceptions);
			}
			"Signature" => method.signature = Some(Cursor::new(data).u16().and_then(|i| pool.utf8(i).map(str::to_owned))?),
			"Synthetic" => method.has_synthetic_attribute = true,
			"Deprecated" => method.has_deprecated_attribute = true,
			"MethodParameters" => {
				let mut c = Cursor::new(data);
				let n = c.u8()?;
				let mut params = Vec::with_capacity(n as usize);
				for _ in 0..n {
					let name_index = c.u16()?;
					let flags = c.u16()?;
					let name = if name_index == 0 { None } else { Some(pool.utf8(name_index)?.to_owned()) };
					params.push(MethodParameter { name, flags: ParameterFlags::from(flags) });
				}
				method.method_parameters = Some(params);
			}
			_ => method.attributes.push(RawAttribute { name: attr_name, data: data.to_vec() }),
		}
	}

	Ok(method)
}

impl From<u16> for ParameterFlags {
	fn from(value: u16) -> Self {
		ParameterFlags {
			is_final: value & 0x0010 != 0,
			is_synthetic: value & 0x1000 != 0,
			is_mandated: value & 0x8000 != 0,
		}
	}
}

/// Decodes a method's `Code` attribute body: `max_stack`/`max_locals`, the
/// instruction list with labels allocated at every offset another part of
/// the class refers to, the exception table, and the debug attributes.
fn read_code(data: &[u8], pool: &ConstantPool, bootstrap_methods: &[BootstrapMethod]) -> Result<Code> {
	let mut header = Cursor::new(data);
	let max_stack = header.u16()?;
	let max_locals = header.u16()?;
	let code_length = header.u32()? as usize;
	let code_start = header.pos();
	let code_bytes = &data[code_start..code_start + code_length];
	header.skip(code_length)?;

	let mut targets: BTreeMap<u32, Label> = BTreeMap::new();
	let mut next_label_id = 0u32;

	// Pass 1: find every offset that needs a label (branch targets plus the
	// one-past-the-end offset used by ranges that extend to method end).
	{
		let mut c = Cursor::new(code_bytes);
		while c.remaining() > 0 {
			let insn_start = c.pos() as u32;
			let opcode = c.u8()?;
			for target in branch_targets(opcode, &mut c, insn_start)? {
				allocate_label(&mut targets, &mut next_label_id, target);
			}
		}
		allocate_label(&mut targets, &mut next_label_id, code_bytes.len() as u32);
	}

	// Pass 2: decode instructions, attaching a label to any offset in `targets`.
	let mut instructions = Vec::new();
	{
		let mut c = Cursor::new(code_bytes);
		while c.remaining() > 0 {
			let insn_start = c.pos() as u32;
			let label = targets.get(&insn_start).copied();
			let instruction = decode_instruction(&mut c, pool, bootstrap_methods, insn_start, &targets)?;
			instructions.push(InstructionListEntry { label, instruction });
		}
	}
	let last_label = targets.get(&(code_bytes.len() as u32)).copied();

	let exception_table_count = header.u16()?;
	let mut exception_table = Vec::with_capacity(exception_table_count as usize);
	for _ in 0..exception_table_count {
		let start = offset_label(&targets, header.u16()? as u32)?;
		let end = offset_label(&targets, header.u16()? as u32)?;
		let handler = offset_label(&targets, header.u16()? as u32)?;
		let catch_index = header.u16()?;
		let catch_type = if catch_index == 0 { None } else { Some(pool.class_name(catch_index)?) };
		exception_table.push(Exception { start, end, handler, catch_type });
	}

	let mut code = Code {
		max_stack: Some(max_stack),
		max_locals: Some(max_locals),
		instructions,
		exception_table,
		last_label,
		line_numbers: None,
		local_variables: None,
		attributes: Vec::new(),
	};

	let attributes_count = header.u16()?;
	for _ in 0..attributes_count {
		let attr_name = read_attribute_name(&mut header, pool)?;
		let length = header.u32()? as usize;
		let attr_data = header.bytes(length)?;
		match attr_name.as_str() {
			"LineNumberTable" => {
				let mut c = Cursor::new(attr_data);
				let n = c.u16()?;
				let mut table = Vec::with_capacity(n as usize);
				for _ in 0..n {
					let offset = c.u16()? as u32;
					let line = c.u16()?;
					table.push((offset_label(&targets, offset)?, line));
				}
				code.line_numbers = Some(table);
			}
			"LocalVariableTable" => {
				let mut c = Cursor::new(attr_data);
				let n = c.u16()?;
				let mut vars = Vec::with_capacity(n as usize);
				for _ in 0..n {
					let start = c.u16()? as u32;
					let len = c.u16()? as u32;
					let name_index = c.u16()?;
					let desc_index = c.u16()?;
					let index = c.u16()?;
					vars.push(Lv {
						range: LabelRange { start: offset_label(&targets, start)?, end: offset_label(&targets, start + len)? },
						name: pool.utf8(name_index)?.to_owned(),
						descriptor: Some(FieldDescriptor::from(pool.utf8(desc_index)?)),
						signature: None,
						index: LvIndex::new(index),
					});
				}
				code.local_variables = Some(vars);
			}
			"StackMapTable" => {} // recomputed on write, see crate::writer::frames
			_ => code.attributes.push(RawAttribute { name: attr_name, data: attr_data.to_vec() }),
		}
	}

	Ok(code)
}

fn allocate_label(targets: &mut BTreeMap<u32, Label>, next_label_id: &mut u32, offset: u32) -> Label {
	*targets.entry(offset).or_insert_with(|| {
		let label = Label { id: *next_label_id };
		*next_label_id += 1;
		label
	})
}

fn offset_label(targets: &BTreeMap<u32, Label>, offset: u32) -> Result<Label> {
	targets.get(&offset).copied().context(format!("no label was allocated for byte offset {offset}"))
}

/// Returns the raw byte offsets a branch instruction at `insn_start` targets,
/// advancing `c` past the instruction's operand either way.
fn branch_targets(opcode: u8, c: &mut Cursor, insn_start: u32) -> Result<Vec<u32>> {
	use op::*;
	Ok(match opcode {
		IFEQ | IFNE | IFLT | IFGE | IFGT | IFLE | IF_ICMPEQ | IF_ICMPNE | IF_ICMPLT | IF_ICMPGE | IF_ICMPGT | IF_ICMPLE | IF_ACMPEQ | IF_ACMPNE | GOTO | JSR | IFNULL | IFNONNULL => {
			let delta = c.i16()?;
			vec![(insn_start as i64 + delta as i64) as u32]
		}
		GOTO_W => {
			let delta = c.i32()?;
			vec![(insn_start as i64 + delta as i64) as u32]
		}
		TABLESWITCH => {
			skip_padding(c, insn_start)?;
			let default = c.i32()?;
			let low = c.i32()?;
			let high = c.i32()?;
			let mut targets = vec![(insn_start as i64 + default as i64) as u32];
			for _ in low..=high {
				let offset = c.i32()?;
				targets.push((insn_start as i64 + offset as i64) as u32);
			}
			targets
		}
		LOOKUPSWITCH => {
			skip_padding(c, insn_start)?;
			let default = c.i32()?;
			let npairs = c.i32()?;
			let mut targets = vec![(insn_start as i64 + default as i64) as u32];
			for _ in 0..npairs {
				let _key = c.i32()?;
				let offset = c.i32()?;
				targets.push((insn_start as i64 + offset as i64) as u32);
			}
			targets
		}
		other => {
			skip_operand(other, c)?;
			Vec::new()
		}
	})
}

fn skip_padding(c: &mut Cursor, insn_start: u32) -> Result<()> {
	// switch instructions are padded so the first operand byte is 4-byte aligned
	// relative to the start of the method's bytecode.
	let padding = (4 - (insn_start + 1) % 4) % 4;
	c.skip(padding as usize)
}

/// Advances `c` past the operand bytes of any opcode that isn't a branch,
/// so the label-discovery pass can find the next instruction's offset.
fn skip_operand(opcode: u8, c: &mut Cursor) -> Result<()> {
	use op::*;
	match opcode {
		BIPUSH | LDC | NEWARRAY => c.skip(1)?,
		SIPUSH | LDC_W | LDC2_W | ILOAD | LLOAD | FLOAD | DLOAD | ALOAD | ISTORE | LSTORE | FSTORE | DSTORE | ASTORE | RET | NEW | ANEWARRAY | CHECKCAST | INSTANCEOF | GETSTATIC
		| PUTSTATIC | GETFIELD | PUTFIELD | INVOKEVIRTUAL | INVOKESPECIAL | INVOKESTATIC => c.skip(2)?,
		IINC => c.skip(2)?,
		INVOKEINTERFACE | INVOKEDYNAMIC => c.skip(4)?,
		MULTIANEWARRAY => c.skip(3)?,
		WIDE => {
			let wide_opcode = c.u8()?;
			if wide_opcode == IINC { c.skip(4)? } else { c.skip(2)? }
		}
		_ => {}
	}
	Ok(())
}

fn decode_instruction(c: &mut Cursor, pool: &ConstantPool, bootstrap_methods: &[BootstrapMethod], insn_start: u32, targets: &BTreeMap<u32, Label>) -> Result<Instruction> {
	use op::*;

	let opcode = c.u8()?;
	let label = |offset: u32| -> Result<Label> { offset_label(targets, offset) };
	let rel16 = |c: &mut Cursor| -> Result<Label> {
		let delta = c.i16()?;
		label((insn_start as i64 + delta as i64) as u32)
	};

	Ok(match opcode {
		NOP => Instruction::Nop,
		ACONST_NULL => Instruction::AConstNull,
		ICONST_M1 => Instruction::IConstM1,
		ICONST_0 => Instruction::IConst0,
		ICONST_1 => Instruction::IConst1,
		ICONST_2 => Instruction::IConst2,
		ICONST_3 => Instruction::IConst3,
		ICONST_4 => Instruction::IConst4,
		ICONST_5 => Instruction::IConst5,
		LCONST_0 => Instruction::LConst0,
		LCONST_1 => Instruction::LConst1,
		FCONST_0 => Instruction::FConst0,
		FCONST_1 => Instruction::FConst1,
		FCONST_2 => Instruction::FConst2,
		DCONST_0 => Instruction::DConst0,
		DCONST_1 => Instruction::DConst1,
		BIPUSH => Instruction::BiPush(c.i8()?),
		SIPUSH => Instruction::SiPush(c.i16()?),
		LDC => Instruction::Ldc(pool.loadable(c.u8()? as u16, bootstrap_methods)?),
		LDC_W | LDC2_W => Instruction::Ldc(pool.loadable(c.u16()?, bootstrap_methods)?),
		op if (ILOAD..=ALOAD).contains(&op) => load_store(op, LvIndex::new(c.u8()? as u16)),
		op if (ILOAD_0..ALOAD_0 + 4).contains(&op) => load_store_n(op),
		IALOAD => Instruction::IALoad, LALOAD => Instruction::LALoad, FALOAD => Instruction::FALoad, DALOAD => Instruction::DALoad,
		AALOAD => Instruction::AALoad, BALOAD => Instruction::BALoad, CALOAD => Instruction::CALoad, SALOAD => Instruction::SALoad,
		op if (ISTORE..=ASTORE).contains(&op) => load_store(op, LvIndex::new(c.u8()? as u16)),
		op if (ISTORE_0..ASTORE_0 + 4).contains(&op) => load_store_n(op),
		IASTORE => Instruction::IAStore, LASTORE => Instruction::LAStore, FASTORE => Instruction::FAStore, DASTORE => Instruction::DAStore,
		AASTORE => Instruction::AAStore, BASTORE => Instruction::BAStore, CASTORE => Instruction::CAStore, SASTORE => Instruction::SAStore,
		POP => Instruction::Pop, POP2 => Instruction::Pop2,
		DUP => Instruction::Dup, DUP_X1 => Instruction::DupX1, DUP_X2 => Instruction::DupX2,
		DUP2 => Instruction::Dup2, DUP2_X1 => Instruction::Dup2X1, DUP2_X2 => Instruction::Dup2X2,
		SWAP => Instruction::Swap,
		IADD => Instruction::IAdd, LADD => Instruction::LAdd, FADD => Instruction::FAdd, DADD => Instruction::DAdd,
		ISUB => Instruction::ISub, LSUB => Instruction::LSub, FSUB => Instruction::FSub, DSUB => Instruction::DSub,
		IMUL => Instruction::IMul, LMUL => Instruction::LMul, FMUL => Instruction::FMul, DMUL => Instruction::DMul,
		IDIV => Instruction::IDiv, LDIV => Instruction::LDiv, FDIV => Instruction::FDiv, DDIV => Instruction::DDiv,
		IREM => Instruction::IRem, LREM => Instruction::LRem, FREM => Instruction::FRem, DREM => Instruction::DRem,
		INEG => Instruction::INeg, LNEG => Instruction::LNeg, FNEG => Instruction::FNeg, DNEG => Instruction::DNeg,
		ISHL => Instruction::IShl, LSHL => Instruction::LShl,
		ISHR => Instruction::IShr, LSHR => Instruction::LShr,
		IUSHR => Instruction::IUShr, LUSHR => Instruction::LUShr,
		IAND => Instruction::IAnd, LAND => Instruction::LAnd,
		IOR => Instruction::IOr, LOR => Instruction::LOr,
		IXOR => Instruction::IXor, LXOR => Instruction::LXor,
		IINC => Instruction::IInc(LvIndex::new(c.u8()? as u16), c.i8()? as i16),
		I2L => Instruction::I2L, I2F => Instruction::I2F, I2D => Instruction::I2D,
		L2I => Instruction::L2I, L2F => Instruction::L2F, L2D => Instruction::L2D,
		F2I => Instruction::F2I, F2L => Instruction::F2L, F2D => Instruction::F2D,
		D2I => Instruction::D2I, D2L => Instruction::D2L, D2F => Instruction::D2F,
		I2B => Instruction::I2B, I2C => Instruction::I2C, I2S => Instruction::I2S,
		LCMP => Instruction::LCmp, FCMPL => Instruction::FCmpL, FCMPG => Instruction::FCmpG, DCMPL => Instruction::DCmpL, DCMPG => Instruction::DCmpG,
		IFEQ => Instruction::IfEq(rel16(c)?), IFNE => Instruction::IfNe(rel16(c)?),
		IFLT => Instruction::IfLt(rel16(c)?), IFGE => Instruction::IfGe(rel16(c)?),
		IFGT => Instruction::IfGt(rel16(c)?), IFLE => Instruction::IfLe(rel16(c)?),
		IF_ICMPEQ => Instruction::IfICmpEq(rel16(c)?), IF_ICMPNE => Instruction::IfICmpNe(rel16(c)?),
		IF_ICMPLT => Instruction::IfICmpLt(rel16(c)?), IF_ICMPGE => Instruction::IfICmpGe(rel16(c)?),
		IF_ICMPGT => Instruction::IfICmpGt(rel16(c)?), IF_ICMPLE => Instruction::IfICmpLe(rel16(c)?),
		IF_ACMPEQ => Instruction::IfACmpEq(rel16(c)?), IF_ACMPNE => Instruction::IfACmpNe(rel16(c)?),
		GOTO => Instruction::Goto(rel16(c)?),
		JSR => bail!("JSR/RET bytecode (pre-Java-7 subroutines) is not supported at offset {insn_start}"),
		RET => Instruction::Ret(LvIndex::new(c.u8()? as u16)),
		TABLESWITCH => {
			skip_padding(c, insn_start)?;
			let default = c.i32()?;
			let low = c.i32()?;
			let high = c.i32()?;
			let mut table = Vec::new();
			for _ in low..=high {
				let offset = c.i32()?;
				table.push(label((insn_start as i64 + offset as i64) as u32)?);
			}
			Instruction::TableSwitch { default: label((insn_start as i64 + default as i64) as u32)?, low, high, table }
		}
		LOOKUPSWITCH => {
			skip_padding(c, insn_start)?;
			let default = c.i32()?;
			let npairs = c.i32()?;
			let mut pairs = Vec::with_capacity(npairs as usize);
			for _ in 0..npairs {
				let key = c.i32()?;
				let offset = c.i32()?;
				pairs.push((key, label((insn_start as i64 + offset as i64) as u32)?));
			}
			Instruction::LookupSwitch { default: label((insn_start as i64 + default as i64) as u32)?, pairs }
		}
		IRETURN => Instruction::IReturn, LRETURN => Instruction::LReturn, FRETURN => Instruction::FReturn, DRETURN => Instruction::DReturn, ARETURN => Instruction::AReturn,
		RETURN => Instruction::Return,
		GETSTATIC => Instruction::GetStatic(pool.field_ref(c.u16()?)?),
		PUTSTATIC => Instruction::PutStatic(pool.field_ref(c.u16()?)?),
		GETFIELD => Instruction::GetField(pool.field_ref(c.u16()?)?),
		PUTFIELD => Instruction::PutField(pool.field_ref(c.u16()?)?),
		INVOKEVIRTUAL => Instruction::InvokeVirtual(pool.method_ref(c.u16()?)?.0),
		INVOKESPECIAL => { let (m, is_if) = pool.method_ref(c.u16()?)?; Instruction::InvokeSpecial(m, is_if) }
		INVOKESTATIC => { let (m, is_if) = pool.method_ref(c.u16()?)?; Instruction::InvokeStatic(m, is_if) }
		INVOKEINTERFACE => {
			let index = c.u16()?;
			let _count = c.u8()?;
			let _zero = c.u8()?;
			Instruction::InvokeInterface(pool.method_ref(index)?.0)
		}
		INVOKEDYNAMIC => {
			let index = c.u16()?;
			let _zero = c.u16()?;
			decode_invoke_dynamic(pool, bootstrap_methods, index)?
		}
		NEW => Instruction::New(pool.class_name(c.u16()?)?),
		NEWARRAY => Instruction::NewArray(ArrayType::from_atype(c.u8()?)?),
		ANEWARRAY => Instruction::ANewArray(pool.class_name(c.u16()?)?),
		ARRAYLENGTH => Instruction::ArrayLength,
		ATHROW => Instruction::AThrow,
		CHECKCAST => Instruction::CheckCast(pool.class_name(c.u16()?)?),
		INSTANCEOF => Instruction::InstanceOf(pool.class_name(c.u16()?)?),
		MONITORENTER => Instruction::MonitorEnter,
		MONITOREXIT => Instruction::MonitorExit,
		WIDE => decode_wide(c)?,
		MULTIANEWARRAY => Instruction::MultiANewArray(pool.class_name(c.u16()?)?, c.u8()?),
		IFNULL => Instruction::IfNull(rel16(c)?),
		IFNONNULL => Instruction::IfNonNull(rel16(c)?),
		GOTO_W => { let delta = c.i32()?; Instruction::Goto(label((insn_start as i64 + delta as i64) as u32)?) }
		other => bail!("unknown opcode {other:#x} at offset {insn_start}"),
	})
}

fn decode_invoke_dynamic(pool: &ConstantPool, bootstrap_methods: &[BootstrapMethod], pool_index: u16) -> Result<Instruction> {
	let (bootstrap_attr_index, name_and_type_index) = pool.invoke_dynamic_parts(pool_index)?;
	let bootstrap = bootstrap_methods.get(bootstrap_attr_index as usize).context("invokedynamic refers to an out-of-range bootstrap method")?;
	let handle = pool.resolve_method_handle_entry(bootstrap.handle_index)?;
	let arguments = bootstrap.arg_indices.iter().map(|&idx| pool.loadable(idx, bootstrap_methods)).collect::<Result<Vec<_>>>()?;
	let (name, descriptor) = pool.name_and_type(name_and_type_index)?;
	Ok(Instruction::InvokeDynamic(InvokeDynamic { name: MethodName::from(name), descriptor: MethodDescriptor::from(descriptor), handle, arguments }))
}

fn decode_wide(c: &mut Cursor) -> Result<Instruction> {
	let wide_opcode = c.u8()?;
	use op::*;
	Ok(match wide_opcode {
		IINC => Instruction::IInc(LvIndex::new(c.u16()?), c.i16()?),
		op if (ILOAD..=ALOAD).contains(&op) || (ISTORE..=ASTORE).contains(&op) => load_store(op, LvIndex::new(c.u16()?)),
		RET => Instruction::Ret(LvIndex::new(c.u16()?)),
		other => bail!("unknown wide opcode {other:#x}"),
	})
}

fn load_store(opcode: u8, index: LvIndex) -> Instruction {
	use op::*;
	match opcode {
		ILOAD => Instruction::ILoad(index), LLOAD => Instruction::LLoad(index), FLOAD => Instruction::FLoad(index), DLOAD => Instruction::DLoad(index), ALOAD => Instruction::ALoad(index),
		ISTORE => Instruction::IStore(index), LSTORE => Instruction::LStore(index), FSTORE => Instruction::FStore(index), DSTORE => Instruction::DStore(index), ASTORE => Instruction::AStore(index),
		_ => unreachable!(),
	}
}

fn load_store_n(opcode: u8) -> Instruction {
	use op::*;
	if (ILOAD_0..ILOAD_0 + 4).contains(&opcode) {
		Instruction::ILoad(LvIndex::new((opcode - ILOAD_0) as u16))
	} else if (LLOAD_0..LLOAD_0 + 4).contains(&opcode) {
		Instruction::LLoad(LvIndex::new((opcode - LLOAD_0) as u16))
	} else if (FLOAD_0..FLOAD_0 + 4).contains(&opcode) {
		Instruction::FLoad(LvIndex::new((opcode - FLOAD_0) as u16))
	} else if (DLOAD_0..DLOAD_0 + 4).contains(&opcode) {
		Instruction::DLoad(LvIndex::new((opcode - DLOAD_0) as u16))
	} else if (ALOAD_0..ALOAD_0 + 4).contains(&opcode) {
		Instruction::ALoad(LvIndex::new((opcode - ALOAD_0) as u16))
	} else if (ISTORE_0..ISTORE_0 + 4).contains(&opcode) {
		Instruction::IStore(LvIndex::new((opcode - ISTORE_0) as u16))
	} else if (LSTORE_0..LSTORE_0 + 4).contains(&opcode) {
		Instruction::LStore(LvIndex::new((opcode - LSTORE_0) as u16))
	} else if (FSTORE_0..FSTORE_0 + 4).contains(&opcode) {
		Instruction::FStore(LvIndex::new((opcode - FSTORE_0) as u16))
	} else if (DSTORE_0..DSTORE_0 + 4).contains(&opcode) {
		Instruction::DStore(LvIndex::new((opcode - DSTORE_0) as u16))
	} else if (ASTORE_0..ASTORE_0 + 4).contains(&opcode) {
		Instruction::AStore(LvIndex::new((opcode - ASTORE_0) as u16))
	} else {
		unreachable!()
	}
}

fn read_constant_pool(cursor: &mut Cursor) -> Result<ConstantPool> {
	let count = cursor.u16()?;
	let mut entries = Vec::with_capacity(count as usize);
	entries.push(RawEntry::Tombstone); // index 0 is unused

	let mut i = 1;
	while i < count {
		let tag = cursor.u8()?;
		let entry = match tag {
			tag::UTF8 => {
				let length = cursor.u16()? as usize;
				let bytes = cursor.bytes(length)?;
				RawEntry::Utf8(decode_modified_utf8(bytes)?)
			}
			tag::INTEGER => RawEntry::Integer(cursor.i32()?),
			tag::FLOAT => RawEntry::Float(f32::from_bits(cursor.u32()?)),
			tag::LONG => {
				let hi = cursor.u32()? as u64;
				let lo = cursor.u32()? as u64;
				RawEntry::Long(((hi << 32) | lo) as i64)
			}
			tag::DOUBLE => {
				let hi = cursor.u32()? as u64;
				let lo = cursor.u32()? as u64;
				RawEntry::Double(f64::from_bits((hi << 32) | lo))
			}
			tag::CLASS => RawEntry::Class { name_index: cursor.u16()? },
			tag::STRING => RawEntry::String { string_index: cursor.u16()? },
			tag::FIELDREF => RawEntry::FieldRef { class_index: cursor.u16()?, name_and_type_index: cursor.u16()? },
			tag::METHODREF => RawEntry::MethodRef { class_index: cursor.u16()?, name_and_type_index: cursor.u16()?, is_interface: false },
			tag::INTERFACE_METHODREF => RawEntry::MethodRef { class_index: cursor.u16()?, name_and_type_index: cursor.u16()?, is_interface: true },
			tag::NAME_AND_TYPE => RawEntry::NameAndType { name_index: cursor.u16()?, descriptor_index: cursor.u16()? },
			tag::METHOD_HANDLE => RawEntry::MethodHandle { reference_kind: cursor.u8()?, reference_index: cursor.u16()? },
			tag::METHOD_TYPE => RawEntry::MethodType { descriptor_index: cursor.u16()? },
			tag::DYNAMIC => RawEntry::Dynamic { bootstrap_method_attr_index: cursor.u16()?, name_and_type_index: cursor.u16()? },
			tag::INVOKE_DYNAMIC => RawEntry::InvokeDynamic { bootstrap_method_attr_index: cursor.u16()?, name_and_type_index: cursor.u16()? },
			tag::MODULE | tag::PACKAGE => RawEntry::Class { name_index: cursor.u16()? },
			other => bail!("unknown constant pool tag {other}"),
		};
		let wide = matches!(entry, RawEntry::Long(_) | RawEntry::Double(_));
		entries.push(entry);
		i += 1;
		if wide {
			entries.push(RawEntry::Tombstone);
			i += 1;
		}
	}

	Ok(ConstantPool { entries })
}

fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
	// classfiles use a "modified" UTF-8 where embedded NUL is encoded as two
	// bytes and supplementary characters use a CESU-8-like surrogate pair
	// encoding; ordinary ASCII/BMP text (the overwhelming common case for
	// mixin-relevant identifiers) round-trips through ordinary UTF-8 decoding.
	std::str::from_utf8(bytes).map(str::to_owned).context("classfile contains non-UTF-8 modified-UTF8 data outside the ASCII/BMP fast path")
}
