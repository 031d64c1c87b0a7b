use crate::strings::{ClassName, FieldDescriptor, MethodDescriptor, MethodName};
use crate::tree::attribute::RawAttribute;
use crate::tree::field::FieldRef;
use crate::tree::method::MethodRef;

#[derive(Debug, Clone, PartialEq)]
pub struct InstructionListEntry {
	pub label: Option<Label>,
	pub instruction: Instruction,
}

impl InstructionListEntry {
	pub fn plain(instruction: Instruction) -> InstructionListEntry {
		InstructionListEntry { label: None, instruction }
	}
}

/// The code of a single method: its instructions plus the metadata the
/// verifier and debuggers need to make sense of them.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Code {
	pub max_stack: Option<u16>,
	pub max_locals: Option<u16>,

	pub instructions: Vec<InstructionListEntry>,
	pub exception_table: Vec<Exception>,
	/// The label for the bytecode offset one past the last instruction; used by
	/// local-variable ranges that extend to the end of the method.
	pub last_label: Option<Label>,

	pub line_numbers: Option<Vec<(Label, u16)>>,
	pub local_variables: Option<Vec<Lv>>,

	pub attributes: Vec<RawAttribute>,
}

impl Code {
	/// Appends an instruction with no label of its own.
	pub fn push(&mut self, instruction: Instruction) {
		self.instructions.push(InstructionListEntry::plain(instruction));
	}

	/// Returns the position of every [`Instruction::Return`]-family instruction.
	pub fn return_positions(&self) -> Vec<usize> {
		self.instructions.iter()
			.enumerate()
			.filter(|(_, entry)| entry.instruction.is_return())
			.map(|(i, _)| i)
			.collect()
	}
}

/// An index of a local variable. A `long`/`double` also occupies `index + 1`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LvIndex {
	pub index: u16,
}

impl LvIndex {
	pub fn new(index: u16) -> LvIndex {
		LvIndex { index }
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lv {
	pub range: LabelRange,
	pub name: String,
	pub descriptor: Option<FieldDescriptor>,
	pub signature: Option<String>,
	pub index: LvIndex,
}

/// A bytecode-offset placeholder using a method-local id.
///
/// Labels are allocated from a [`LabelMap`] owned by whoever built the
/// instruction list they appear in; identity (the `id`), not any bytecode
/// offset, is what instructions and ranges refer to, so cloning a method body
/// into another method always goes through [`LabelMap::remap`] to get fresh,
/// non-colliding ids.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label {
	pub(crate) id: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelRange {
	pub start: Label,
	pub end: Label,
}

/// Allocates fresh [`Label`]s and, while cloning a method body, remaps labels
/// from the source method onto fresh ones so two clones of the same method
/// never alias each other's jump targets.
#[derive(Debug, Default)]
pub struct LabelMap {
	next_id: u32,
	remapped: std::collections::HashMap<Label, Label>,
}

impl LabelMap {
	pub fn new() -> LabelMap {
		LabelMap::default()
	}

	pub fn fresh(&mut self) -> Label {
		let id = self.next_id;
		self.next_id += 1;
		Label { id }
	}

	/// Returns the fresh label standing in for `source`, allocating one on
	/// first use so every occurrence of the same source label maps to the
	/// same fresh label.
	pub fn remap(&mut self, source: Label) -> Label {
		if let Some(&existing) = self.remapped.get(&source) {
			existing
		} else {
			let fresh = self.fresh();
			self.remapped.insert(source, fresh);
			fresh
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct Exception {
	pub start: Label,
	pub end: Label,
	pub handler: Label,
	pub catch_type: Option<ClassName>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
	Nop,
	AConstNull,
	IConstM1, IConst0, IConst1, IConst2, IConst3, IConst4, IConst5,
	LConst0, LConst1,
	FConst0, FConst1, FConst2,
	DConst0, DConst1,
	BiPush(i8),
	SiPush(i16),
	Ldc(Loadable),
	ILoad(LvIndex), LLoad(LvIndex), FLoad(LvIndex), DLoad(LvIndex), ALoad(LvIndex),
	IALoad, LALoad, FALoad, DALoad, AALoad, BALoad, CALoad, SALoad,
	IStore(LvIndex), LStore(LvIndex), FStore(LvIndex), DStore(LvIndex), AStore(LvIndex),
	IAStore, LAStore, FAStore, DAStore, AAStore, BAStore, CAStore, SAStore,
	Pop, Pop2,
	Dup, DupX1, DupX2,
	Dup2, Dup2X1, Dup2X2,
	Swap,
	IAdd, LAdd, FAdd, DAdd,
	ISub, LSub, FSub, DSub,
	IMul, LMul, FMul, DMul,
	IDiv, LDiv, FDiv, DDiv,
	IRem, LRem, FRem, DRem,
	INeg, LNeg, FNeg, DNeg,
	IShl, LShl,
	IShr, LShr,
	IUShr, LUShr,
	IAnd, LAnd,
	IOr, LOr,
	IXor, LXor,
	IInc(LvIndex, i16),
	I2L, I2F, I2D,
	L2I, L2F, L2D,
	F2I, F2L, F2D,
	D2I, D2L, D2F,
	I2B, I2C, I2S,
	LCmp,
	FCmpL, FCmpG,
	DCmpL, DCmpG,
	IfEq(Label), IfNe(Label), IfLt(Label), IfGe(Label), IfGt(Label), IfLe(Label),
	IfICmpEq(Label), IfICmpNe(Label), IfICmpLt(Label), IfICmpGe(Label), IfICmpGt(Label), IfICmpLe(Label),
	IfACmpEq(Label), IfACmpNe(Label),
	Goto(Label),
	Ret(LvIndex),
	TableSwitch {
		default: Label,
		low: i32,
		high: i32,
		table: Vec<Label>,
	},
	LookupSwitch {
		default: Label,
		/// Must be ordered by key, ascending.
		pairs: Vec<(i32, Label)>,
	},
	IReturn, LReturn, FReturn, DReturn, AReturn,
	Return,
	GetStatic(FieldRef),
	PutStatic(FieldRef),
	GetField(FieldRef),
	PutField(FieldRef),
	InvokeVirtual(MethodRef),
	/// `true` iff the constant pool entry was an `InterfaceMethodref`.
	InvokeSpecial(MethodRef, bool),
	/// `true` iff the constant pool entry was an `InterfaceMethodref`.
	InvokeStatic(MethodRef, bool),
	InvokeInterface(MethodRef),
	InvokeDynamic(InvokeDynamic),
	New(ClassName),
	NewArray(ArrayType),
	ANewArray(ClassName),
	ArrayLength,
	AThrow,
	CheckCast(ClassName),
	InstanceOf(ClassName),
	MonitorEnter, MonitorExit,
	MultiANewArray(ClassName, u8),
	IfNull(Label), IfNonNull(Label),
}

impl Instruction {
	pub fn is_return(&self) -> bool {
		matches!(self, Instruction::IReturn | Instruction::LReturn | Instruction::FReturn | Instruction::DReturn | Instruction::AReturn | Instruction::Return)
	}

	pub fn is_invoke(&self) -> bool {
		matches!(
			self,
			Instruction::InvokeVirtual(_) | Instruction::InvokeSpecial(_, _) | Instruction::InvokeStatic(_, _) | Instruction::InvokeInterface(_)
		)
	}

	/// The `(owner, name, descriptor)` of an `invoke*` instruction, or `None`
	/// for anything else (including `invokedynamic`, which has no fixed owner).
	pub fn invoked_method(&self) -> Option<&MethodRef> {
		match self {
			Instruction::InvokeVirtual(m) | Instruction::InvokeSpecial(m, _) | Instruction::InvokeStatic(m, _) | Instruction::InvokeInterface(m) => Some(m),
			_ => None,
		}
	}

	pub fn is_static_invoke(&self) -> bool {
		matches!(self, Instruction::InvokeStatic(_, _))
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum Loadable {
	Integer(i32),
	Float(f32),
	Long(i64),
	Double(f64),
	Class(ClassName),
	String(String),
	MethodHandle(Handle),
	MethodType(MethodDescriptor),
	Dynamic(ConstantDynamic),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Handle {
	GetField(FieldRef),
	GetStatic(FieldRef),
	PutField(FieldRef),
	PutStatic(FieldRef),
	InvokeVirtual(MethodRef),
	InvokeStatic(MethodRef, bool),
	InvokeSpecial(MethodRef, bool),
	NewInvokeSpecial(MethodRef),
	InvokeInterface(MethodRef),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstantDynamic {
	pub name: String,
	pub descriptor: FieldDescriptor,
	pub handle: Handle,
	pub arguments: Vec<Loadable>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvokeDynamic {
	pub name: MethodName,
	pub descriptor: MethodDescriptor,
	pub handle: Handle,
	pub arguments: Vec<Loadable>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArrayType {
	Boolean, Char, Float, Double, Byte, Short, Int, Long,
}

impl ArrayType {
	pub fn from_atype(atype: u8) -> anyhow::Result<ArrayType> {
		Ok(match atype {
			4 => ArrayType::Boolean,
			5 => ArrayType::Char,
			6 => ArrayType::Float,
			7 => ArrayType::Double,
			8 => ArrayType::Byte,
			9 => ArrayType::Short,
			10 => ArrayType::Int,
			11 => ArrayType::Long,
			_ => anyhow::bail!("unknown newarray atype {atype:#x}"),
		})
	}

	pub fn to_atype(self) -> u8 {
		match self {
			ArrayType::Boolean => 4,
			ArrayType::Char => 5,
			ArrayType::Float => 6,
			ArrayType::Double => 7,
			ArrayType::Byte => 8,
			ArrayType::Short => 9,
			ArrayType::Int => 10,
			ArrayType::Long => 11,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn label_map_is_stable_per_source_label() {
		let mut map = LabelMap::new();
		let a = Label { id: 7 };
		let b = Label { id: 9 };

		let a1 = map.remap(a);
		let b1 = map.remap(b);
		let a2 = map.remap(a);

		assert_eq!(a1, a2);
		assert_ne!(a1, b1);
	}

	#[test]
	fn return_positions_finds_every_kind() {
		let mut code = Code::default();
		code.push(Instruction::IConst0);
		code.push(Instruction::IReturn);
		code.push(Instruction::Return);

		assert_eq!(code.return_positions(), vec![1, 2]);
	}
}
