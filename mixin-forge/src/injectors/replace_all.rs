//! ReplaceAllMethodsInjector (§4.5): replaces every applicable method body
//! with a stub forwarding to the runtime dispatch surface (component H,
//! §4.9), so registered replacements can be swapped in without re-running
//! this transform.

use anyhow::Result;
use classfile::strings::{ClassName, FieldDescriptor, MethodDescriptor, MethodName};
use classfile::tree::class::ClassFile;
use classfile::tree::descriptor::{parse_method_descriptor, JType};
use classfile::tree::field::FieldRef;
use classfile::tree::method::code::{Code, Instruction, Loadable, LvIndex};
use classfile::tree::method::MethodRef;

use crate::bytecode::{box_value, descriptor_of, load_param, return_for, unbox_value};

const RUNTIME_CLASS: &str = "mixin/Runtime";
const RUNTIME_METHOD: &str = "invokeIgnore";
const RUNTIME_DESC: &str = "(Ljava/lang/Object;Ljava/lang/String;Ljava/lang/Class;[Ljava/lang/Object;)Ljava/lang/Object;";

fn runtime_method_ref() -> MethodRef {
	MethodRef { class: ClassName::from(RUNTIME_CLASS), name: MethodName::from(RUNTIME_METHOD), desc: MethodDescriptor::from(RUNTIME_DESC) }
}

fn primitive_wrapper_class(t: &JType) -> Option<&'static str> {
	Some(match t {
		JType::Boolean => "java/lang/Boolean",
		JType::Byte => "java/lang/Byte",
		JType::Char => "java/lang/Character",
		JType::Short => "java/lang/Short",
		JType::Int => "java/lang/Integer",
		JType::Long => "java/lang/Long",
		JType::Float => "java/lang/Float",
		JType::Double => "java/lang/Double",
		JType::Reference(_) | JType::Array(_) => return None,
	})
}

fn class_literal(t: Option<&JType>) -> Instruction {
	match t {
		None => Instruction::GetStatic(FieldRef { class: ClassName::from("java/lang/Void"), name: "TYPE".into(), desc: FieldDescriptor::from("Ljava/lang/Class;") }),
		Some(t) => match primitive_wrapper_class(t) {
			Some(wrapper) => Instruction::GetStatic(FieldRef { class: ClassName::from(wrapper), name: "TYPE".into(), desc: FieldDescriptor::from("Ljava/lang/Class;") }),
			None => Instruction::Ldc(Loadable::Class(ClassName::from(descriptor_reference(t).as_str()))),
		},
	}
}

fn descriptor_reference(t: &JType) -> String {
	match t {
		JType::Reference(name) => name.clone(),
		other => descriptor_of(other),
	}
}

fn push_int(n: i32) -> Instruction {
	match n {
		-1 => Instruction::IConstM1,
		0 => Instruction::IConst0,
		1 => Instruction::IConst1,
		2 => Instruction::IConst2,
		3 => Instruction::IConst3,
		4 => Instruction::IConst4,
		5 => Instruction::IConst5,
		-128..=127 => Instruction::BiPush(n as i8),
		-32768..=32767 => Instruction::SiPush(n as i16),
		_ => Instruction::Ldc(Loadable::Integer(n)),
	}
}

/// Builds the stub body: `(receiver-or-class-literal, "owner.name(desc)",
/// return-type-class, boxed-arg-array)` forwarded to [`RUNTIME_METHOD`].
fn build_stub(target_class: &ClassName, name: &MethodName, descriptor: &MethodDescriptor, params: &[JType], return_type: Option<&JType>, is_static: bool) -> Code {
	let mut code = Code::default();

	if is_static {
		code.push(Instruction::Ldc(Loadable::Class(target_class.clone())));
	} else {
		code.push(Instruction::ALoad(LvIndex::new(0)));
	}

	code.push(Instruction::Ldc(Loadable::String(format!("{target_class}.{name}{descriptor}"))));
	code.push(class_literal(return_type));

	code.push(push_int(params.len() as i32));
	code.push(Instruction::ANewArray(ClassName::from("java/lang/Object")));

	let mut slot = u16::from(!is_static);
	for (i, p) in params.iter().enumerate() {
		code.push(Instruction::Dup);
		code.push(push_int(i as i32));
		code.push(load_param(p, LvIndex::new(slot)));
		if let Some(box_insn) = box_value(p) {
			code.push(box_insn);
		}
		code.push(Instruction::AAStore);
		slot += p.category() as u16;
	}

	code.push(Instruction::InvokeStatic(runtime_method_ref(), false));

	match return_type {
		None => {
			code.push(Instruction::Pop);
			code.push(Instruction::Return);
		}
		Some(t) => {
			for insn in unbox_value(Some(t)) {
				code.push(insn);
			}
			code.push(return_for(Some(t)));
		}
	}

	code
}

/// Rewrites `class` in place: every eligible method's body is replaced (or,
/// for the zero-arg constructor, has a forwarding call spliced before each
/// `return`), non-static fields lose `final`, and (if `remove_sync`) every
/// `monitorenter` is stripped along with the `synchronized` flag.
pub fn apply(class: &mut ClassFile, remove_sync: bool) -> Result<bool> {
	let target_class_name = class.name.clone();
	let is_interface = class.access.is_interface;

	for field in &mut class.fields {
		if !field.access.is_static {
			field.access.is_final = false;
		}
	}

	for method in &mut class.methods {
		if is_interface && method.access.is_abstract && !method.access.is_static {
			continue;
		}
		if method.access.is_abstract || method.access.is_native {
			continue;
		}

		let (params, return_type) = parse_method_descriptor(method.descriptor.as_str())?;
		let is_zero_arg_ctor = method.name.as_str() == "<init>" && params.is_empty();

		if is_zero_arg_ctor {
			method.access.is_public = true;
			if let Some(code) = method.code.as_mut() {
				let mut labels = crate::labels::refresh_labels(code);
				let _ = &mut labels;
				let positions = code.return_positions();
				for &pos in positions.iter().rev() {
					let mut block = vec![Instruction::ALoad(LvIndex::new(0)), Instruction::Ldc(Loadable::String(format!("{}.{}{}", target_class_name, method.name, method.descriptor))), class_literal(None), push_int(0), Instruction::ANewArray(ClassName::from("java/lang/Object")), Instruction::InvokeStatic(runtime_method_ref(), false), Instruction::Pop]
						.into_iter()
						.map(classfile::tree::method::code::InstructionListEntry::plain)
						.collect::<Vec<_>>();
					code.instructions.splice(pos..pos, block.drain(..));
				}
				code.max_locals = None;
				code.max_stack = None;
			}
			if remove_sync {
				method.access.is_synchronized = false;
			}
			continue;
		}

		if method.name.as_str() == "<init>" {
			continue;
		}

		let new_code = build_stub(&target_class_name, &method.name, &method.descriptor, &params, return_type.as_ref(), method.access.is_static);
		method.code = Some(new_code);
		if remove_sync {
			method.access.is_synchronized = false;
		}
	}

	Ok(true)
}

#[cfg(test)]
mod tests {
	use classfile::strings::MethodDescriptor;
	use classfile::tree::class::ClassAccess;
	use classfile::tree::method::{Method, MethodAccess};
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn replaces_instance_method_with_forwarding_stub() {
		let mut class = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from("t/Target"), Some(ClassName::from("java/lang/Object")), vec![]);
		class.methods.push(Method::new(MethodAccess { is_public: true, ..Default::default() }, MethodName::from("greet"), MethodDescriptor::from("(I)Ljava/lang/String;")));

		apply(&mut class, false).unwrap();

		let method = class.find_method("greet", None).unwrap();
		let code = method.code.as_ref().unwrap();
		assert!(code.instructions.iter().any(|e| matches!(&e.instruction, Instruction::InvokeStatic(m, _) if m.name.as_str() == RUNTIME_METHOD)));
	}

	#[test]
	fn clears_final_on_non_static_fields() {
		use classfile::strings::{FieldDescriptor, FieldName};
		use classfile::tree::field::{Field, FieldAccess};

		let mut class = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from("t/Target"), Some(ClassName::from("java/lang/Object")), vec![]);
		class.fields.push(Field::new(FieldAccess { is_final: true, ..Default::default() }, FieldName::from("x"), FieldDescriptor::from("I")));

		apply(&mut class, false).unwrap();
		assert!(!class.fields[0].access.is_final);
	}
}
