//! AccessorGenerator (§4.5): synthesizes a getter or setter on the target
//! class for one of its own fields, named and shaped after an abstract
//! method the mixin declares.

use anyhow::{anyhow, Result};
use classfile::strings::{FieldName, MethodName};
use classfile::tree::class::ClassFile;
use classfile::tree::descriptor::parse_method_descriptor;
use classfile::tree::field::FieldRef;
use classfile::tree::method::code::{Code, Instruction, LvIndex};
use classfile::tree::method::{Method, MethodAccess};

use crate::bytecode::{load_param, return_for};

pub fn apply(class: &mut ClassFile, mixin_tree: &ClassFile, handler: &MethodName, field: &FieldName) -> Result<bool> {
	let declared = mixin_tree.find_method(handler.as_str(), None).ok_or_else(|| anyhow!("accessor handler {} not declared on mixin {}", handler, mixin_tree.name))?;
	let (params, return_type) = parse_method_descriptor(declared.descriptor.as_str())?;
	let descriptor = declared.descriptor.clone();

	let target_field = class.find_field(field.as_str()).ok_or_else(|| anyhow!("accessor field {} not found on {}", field, class.name))?;
	let field_is_static = target_field.access.is_static;
	let field_descriptor = target_field.descriptor.clone();
	let target_class_name = class.name.clone();

	let is_getter = params.is_empty() && return_type.is_some();
	let is_setter = params.len() == 1 && return_type.is_none();

	let mut code = Code::default();
	let field_ref = FieldRef { class: target_class_name, name: field.clone(), desc: field_descriptor };

	if is_getter {
		if !field_is_static {
			code.push(Instruction::ALoad(LvIndex::new(0)));
		}
		code.push(if field_is_static { Instruction::GetStatic(field_ref) } else { Instruction::GetField(field_ref) });
		code.push(return_for(return_type.as_ref()));
	} else if is_setter {
		let value_type = &params[0];
		if target_field.access.is_final {
			class.find_field_mut(field.as_str()).unwrap().access.is_final = false;
		}
		let value_slot = LvIndex::new(u16::from(!field_is_static));
		if !field_is_static {
			code.push(Instruction::ALoad(LvIndex::new(0)));
		}
		code.push(load_param(value_type, value_slot));
		code.push(if field_is_static { Instruction::PutStatic(field_ref) } else { Instruction::PutField(field_ref) });
		code.push(Instruction::Return);
	} else {
		return Err(anyhow!("accessor handler {} is neither a getter nor a setter shape for field {}", handler, field));
	}

	let access = MethodAccess { is_public: true, is_static: field_is_static, is_synthetic: true, ..Default::default() };
	let mut method = Method::new(access, handler.clone(), descriptor);
	method.code = Some(code);
	class.methods.push(method);
	Ok(true)
}

#[cfg(test)]
mod tests {
	use classfile::strings::{ClassName, FieldDescriptor, MethodDescriptor};
	use classfile::tree::class::ClassAccess;
	use classfile::tree::field::{Field, FieldAccess};
	use pretty_assertions::assert_eq;

	use super::*;

	fn target_with_field() -> ClassFile {
		let mut class = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from("t/Target"), Some(ClassName::from("java/lang/Object")), vec![]);
		class.fields.push(Field::new(FieldAccess { is_private: true, ..Default::default() }, FieldName::from("dynamicString"), FieldDescriptor::from("Ljava/lang/String;")));
		class
	}

	fn mixin_with_accessor_decls() -> ClassFile {
		let mut tree = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from("m/Mixin"), Some(ClassName::from("java/lang/Object")), vec![]);
		tree.methods.push(Method::new(MethodAccess { is_public: true, is_abstract: true, ..Default::default() }, MethodName::from("getDynamicString"), MethodDescriptor::from("()Ljava/lang/String;")));
		tree.methods.push(Method::new(MethodAccess { is_public: true, is_abstract: true, ..Default::default() }, MethodName::from("setDynamicString"), MethodDescriptor::from("(Ljava/lang/String;)V")));
		tree
	}

	#[test]
	fn generates_getter_and_setter() {
		let mut class = target_with_field();
		let mixin_tree = mixin_with_accessor_decls();

		apply(&mut class, &mixin_tree, &MethodName::from("getDynamicString"), &FieldName::from("dynamicString")).unwrap();
		apply(&mut class, &mixin_tree, &MethodName::from("setDynamicString"), &FieldName::from("dynamicString")).unwrap();

		assert!(class.find_method("getDynamicString", None).is_some());
		assert!(class.find_method("setDynamicString", None).is_some());
	}
}
