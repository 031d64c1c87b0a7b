//! Primitive bytecode helpers shared by every injector: classifying constant
//! instructions, boxing/unboxing, picking load/store/return opcodes for a
//! [`JType`], and splitting a `owner.name(desc)` reference string.
//!
//! Grounded the same way `classfile`'s own `tree::descriptor` module is: a
//! handful of small, total functions over the tree types rather than a
//! generic visitor.

use classfile::strings::{ClassName, MethodDescriptor, MethodName};
use classfile::tree::descriptor::{method_reference_parse, JType};
use classfile::tree::method::MethodRef;
use classfile::tree::method::code::{Code, Instruction, Loadable, LvIndex};
use classfile::writer::frames::compute_max_locals;

/// The value a constant-producing instruction yields, mirrored from its
/// operand rather than re-derived from the instruction each time.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
	Null,
	Int(i32),
	Long(i64),
	Float(f32),
	Double(f64),
	String(String),
	Class(ClassName),
	/// The operand of a `checkcast`/`instanceof`, treated as a constant type
	/// reference for `ModifyConstant` matching purposes.
	Type(ClassName),
}

/// The value a constant instruction pushes, or `None` if `insn` isn't one.
pub fn constant_value(insn: &Instruction) -> Option<ConstValue> {
	use Instruction::*;
	Some(match insn {
		AConstNull => ConstValue::Null,
		IConstM1 => ConstValue::Int(-1),
		IConst0 => ConstValue::Int(0),
		IConst1 => ConstValue::Int(1),
		IConst2 => ConstValue::Int(2),
		IConst3 => ConstValue::Int(3),
		IConst4 => ConstValue::Int(4),
		IConst5 => ConstValue::Int(5),
		LConst0 => ConstValue::Long(0),
		LConst1 => ConstValue::Long(1),
		FConst0 => ConstValue::Float(0.0),
		FConst1 => ConstValue::Float(1.0),
		FConst2 => ConstValue::Float(2.0),
		DConst0 => ConstValue::Double(0.0),
		DConst1 => ConstValue::Double(1.0),
		BiPush(v) => ConstValue::Int(*v as i32),
		SiPush(v) => ConstValue::Int(*v as i32),
		Ldc(Loadable::Integer(v)) => ConstValue::Int(*v),
		Ldc(Loadable::Float(v)) => ConstValue::Float(*v),
		Ldc(Loadable::Long(v)) => ConstValue::Long(*v),
		Ldc(Loadable::Double(v)) => ConstValue::Double(*v),
		Ldc(Loadable::Class(c)) => ConstValue::Class(c.clone()),
		Ldc(Loadable::String(s)) => ConstValue::String(s.clone()),
		Ldc(Loadable::MethodHandle(_) | Loadable::MethodType(_) | Loadable::Dynamic(_)) => return None,
		CheckCast(c) | InstanceOf(c) => ConstValue::Type(c.clone()),
		_ => return None,
	})
}

/// `true` iff `insn` is a constant-producing instruction. Defined in terms of
/// [`constant_value`] so the two stay total on the same subset by
/// construction.
pub fn is_constant(insn: &Instruction) -> bool {
	constant_value(insn).is_some()
}

/// The JVM type a constant instruction's value would occupy on the operand
/// stack.
pub fn constant_type(insn: &Instruction) -> Option<JType> {
	constant_value(insn).map(|v| match v {
		ConstValue::Null => JType::Reference("java/lang/Object".to_owned()),
		ConstValue::Int(_) => JType::Int,
		ConstValue::Long(_) => JType::Long,
		ConstValue::Float(_) => JType::Float,
		ConstValue::Double(_) => JType::Double,
		ConstValue::String(_) => JType::Reference("java/lang/String".to_owned()),
		ConstValue::Class(_) => JType::Reference("java/lang/Class".to_owned()),
		ConstValue::Type(_) => JType::Reference("java/lang/Class".to_owned()),
	})
}

struct WrapperInfo {
	class: &'static str,
	box_desc: &'static str,
	unbox_name: &'static str,
	unbox_desc: &'static str,
}

fn wrapper_info(t: &JType) -> Option<WrapperInfo> {
	Some(match t {
		JType::Boolean => WrapperInfo { class: "java/lang/Boolean", box_desc: "(Z)Ljava/lang/Boolean;", unbox_name: "booleanValue", unbox_desc: "()Z" },
		JType::Byte => WrapperInfo { class: "java/lang/Byte", box_desc: "(B)Ljava/lang/Byte;", unbox_name: "byteValue", unbox_desc: "()B" },
		JType::Char => WrapperInfo { class: "java/lang/Character", box_desc: "(C)Ljava/lang/Character;", unbox_name: "charValue", unbox_desc: "()C" },
		JType::Short => WrapperInfo { class: "java/lang/Short", box_desc: "(S)Ljava/lang/Short;", unbox_name: "shortValue", unbox_desc: "()S" },
		JType::Int => WrapperInfo { class: "java/lang/Integer", box_desc: "(I)Ljava/lang/Integer;", unbox_name: "intValue", unbox_desc: "()I" },
		JType::Long => WrapperInfo { class: "java/lang/Long", box_desc: "(J)Ljava/lang/Long;", unbox_name: "longValue", unbox_desc: "()J" },
		JType::Float => WrapperInfo { class: "java/lang/Float", box_desc: "(F)Ljava/lang/Float;", unbox_name: "floatValue", unbox_desc: "()F" },
		JType::Double => WrapperInfo { class: "java/lang/Double", box_desc: "(D)Ljava/lang/Double;", unbox_name: "doubleValue", unbox_desc: "()D" },
		JType::Reference(_) | JType::Array(_) => return None,
	})
}

/// The JVM field/method descriptor string for `t`.
pub fn descriptor_of(t: &JType) -> String {
	match t {
		JType::Boolean => "Z".to_owned(),
		JType::Byte => "B".to_owned(),
		JType::Char => "C".to_owned(),
		JType::Short => "S".to_owned(),
		JType::Int => "I".to_owned(),
		JType::Long => "J".to_owned(),
		JType::Float => "F".to_owned(),
		JType::Double => "D".to_owned(),
		JType::Reference(name) => format!("L{name};"),
		JType::Array(inner) => format!("[{}", descriptor_of(inner)),
	}
}

/// `invokestatic <Wrapper>.valueOf(prim)Wrapper;` for a primitive `t`, or
/// `None` for a reference type (already boxed, nothing to do).
pub fn box_value(t: &JType) -> Option<Instruction> {
	let info = wrapper_info(t)?;
	Some(Instruction::InvokeStatic(
		MethodRef { class: ClassName::from(info.class), name: MethodName::from("valueOf"), desc: MethodDescriptor::from(info.box_desc) },
		false,
	))
}

/// The instructions to turn a boxed/reference value on the stack into a
/// value of type `t` (`None` for `void`, which just pops it).
pub fn unbox_value(t: Option<&JType>) -> Vec<Instruction> {
	match t {
		None => vec![Instruction::Pop],
		Some(t) => match wrapper_info(t) {
			Some(info) => vec![
				Instruction::CheckCast(ClassName::from(info.class)),
				Instruction::InvokeVirtual(MethodRef { class: ClassName::from(info.class), name: MethodName::from(info.unbox_name), desc: MethodDescriptor::from(info.unbox_desc) }),
			],
			None => vec![Instruction::CheckCast(reference_class_name(t))],
		},
	}
}

fn reference_class_name(t: &JType) -> ClassName {
	match t {
		JType::Reference(name) => ClassName::from(name.as_str()),
		// array types are checkcast using their own descriptor as the "class name" operand
		other => ClassName::from(descriptor_of(other).as_str()),
	}
}

/// `iload`/`lload`/.../`aload` appropriate for `t`.
pub fn load_param(t: &JType, index: LvIndex) -> Instruction {
	match t {
		JType::Int | JType::Boolean | JType::Byte | JType::Char | JType::Short => Instruction::ILoad(index),
		JType::Long => Instruction::LLoad(index),
		JType::Float => Instruction::FLoad(index),
		JType::Double => Instruction::DLoad(index),
		JType::Reference(_) | JType::Array(_) => Instruction::ALoad(index),
	}
}

/// `istore`/`lstore`/.../`astore` appropriate for `t`.
pub fn store_param(t: &JType, index: LvIndex) -> Instruction {
	match t {
		JType::Int | JType::Boolean | JType::Byte | JType::Char | JType::Short => Instruction::IStore(index),
		JType::Long => Instruction::LStore(index),
		JType::Float => Instruction::FStore(index),
		JType::Double => Instruction::DStore(index),
		JType::Reference(_) | JType::Array(_) => Instruction::AStore(index),
	}
}

/// The correct return opcode for `t` (`None` meaning `void`).
pub fn return_for(t: Option<&JType>) -> Instruction {
	match t {
		None => Instruction::Return,
		Some(JType::Int | JType::Boolean | JType::Byte | JType::Char | JType::Short) => Instruction::IReturn,
		Some(JType::Long) => Instruction::LReturn,
		Some(JType::Float) => Instruction::FReturn,
		Some(JType::Double) => Instruction::DReturn,
		Some(JType::Reference(_) | JType::Array(_)) => Instruction::AReturn,
	}
}

/// A type-appropriate zero/default-value push (`0`/`0L`/`0.0`/`null`); used
/// when a cancelled HEAD inject needs to return a value but none was set.
pub fn default_value(t: Option<&JType>) -> Instruction {
	match t {
		None => Instruction::AConstNull, // caller must special-case void and skip pushing anything
		Some(JType::Int | JType::Boolean | JType::Byte | JType::Char | JType::Short) => Instruction::IConst0,
		Some(JType::Long) => Instruction::LConst0,
		Some(JType::Float) => Instruction::FConst0,
		Some(JType::Double) => Instruction::DConst0,
		Some(JType::Reference(_) | JType::Array(_)) => Instruction::AConstNull,
	}
}

/// `dup`/`dup2` depending on `t`'s category.
pub fn dup_for(t: &JType) -> Instruction {
	if t.category() == 2 { Instruction::Dup2 } else { Instruction::Dup }
}

/// `pop`/`pop2` depending on `t`'s category.
pub fn pop_for(t: &JType) -> Instruction {
	if t.category() == 2 { Instruction::Pop2 } else { Instruction::Pop }
}

/// The first local-variable slot known not to be in use by `code`, suitable
/// for a freshly-introduced temporary (e.g. a `CallbackInfo` instance).
/// Computed from `classfile`'s own writer-side local-count pass rather than
/// re-deriving it, since that pass already accounts for every var/iinc use.
pub fn next_free_local(code: &Code) -> LvIndex {
	LvIndex::new(compute_max_locals(code))
}

/// Splits `owner.name(desc)` or bare `name` into its parts. Missing parts
/// come back empty, never as an error.
pub fn method_descriptor_parse(sig: &str) -> (String, String, String) {
	method_reference_parse(sig)
}
