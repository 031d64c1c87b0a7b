//! InvokerGenerator (§4.5): synthesizes a forwarding method for a named
//! method on the target class, picking the correct `invoke*` opcode.

use anyhow::{anyhow, Result};
use classfile::strings::MethodName;
use classfile::tree::class::ClassFile;
use classfile::tree::descriptor::parse_method_descriptor;
use classfile::tree::method::code::{Code, Instruction, LvIndex};
use classfile::tree::method::{Method, MethodAccess, MethodRef};

use crate::bytecode::{load_param, return_for};
use crate::directive::MethodKey;
use crate::injectors::find_target_method;

pub fn apply(class: &mut ClassFile, handler: &MethodName, target: &MethodKey) -> Result<bool> {
	let is_interface = class.access.is_interface;
	let target_class_name = class.name.clone();

	let found = find_target_method(class, target).ok_or_else(|| anyhow!("invoker target {} not found on {}", target.name, class.name))?;
	let is_static = found.access.is_static;
	let is_private = found.access.is_private;
	let is_ctor = found.name.as_str() == "<init>";
	let descriptor = found.descriptor.clone();
	let name = found.name.clone();
	let (params, return_type) = parse_method_descriptor(descriptor.as_str())?;

	let method_ref = MethodRef { class: target_class_name, name, desc: descriptor.clone() };

	let mut code = Code::default();
	let mut slot = 0u16;
	if !is_static {
		code.push(Instruction::ALoad(LvIndex::new(slot)));
		slot += 1;
	}
	for p in &params {
		code.push(load_param(p, LvIndex::new(slot)));
		slot += p.category() as u16;
	}

	let call = if is_static {
		Instruction::InvokeStatic(method_ref, is_interface)
	} else if is_ctor || is_private || (is_interface && is_private) {
		Instruction::InvokeSpecial(method_ref, is_interface)
	} else if is_interface {
		Instruction::InvokeInterface(method_ref)
	} else {
		Instruction::InvokeVirtual(method_ref)
	};
	code.push(call);
	code.push(return_for(return_type.as_ref()));

	let access = MethodAccess { is_public: true, is_static, is_synthetic: true, ..Default::default() };
	let mut invoker_method = Method::new(access, handler.clone(), descriptor);
	invoker_method.code = Some(code);
	class.methods.push(invoker_method);
	Ok(true)
}

#[cfg(test)]
mod tests {
	use classfile::strings::{ClassName, MethodDescriptor};
	use classfile::tree::class::ClassAccess;
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn forwards_to_private_instance_method_via_invokespecial() {
		let mut class = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from("t/Target"), Some(ClassName::from("java/lang/Object")), vec![]);
		class.methods.push(Method::new(MethodAccess { is_private: true, ..Default::default() }, MethodName::from("secret"), MethodDescriptor::from("()I")));

		let target = MethodKey { name: MethodName::from("secret"), desc: None };
		apply(&mut class, &MethodName::from("invokeSecret"), &target).unwrap();

		let invoker = class.find_method("invokeSecret", None).unwrap();
		let code = invoker.code.as_ref().unwrap();
		assert!(matches!(&code.instructions[1].instruction, Instruction::InvokeSpecial(m, _) if m.name == MethodName::from("secret")));
	}

	#[test]
	fn forwards_to_static_method_via_invokestatic() {
		let mut class = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from("t/Target"), Some(ClassName::from("java/lang/Object")), vec![]);
		class.methods.push(Method::new(MethodAccess { is_public: true, is_static: true, ..Default::default() }, MethodName::from("helper"), MethodDescriptor::from("()V")));

		let target = MethodKey { name: MethodName::from("helper"), desc: None };
		apply(&mut class, &MethodName::from("invokeHelper"), &target).unwrap();

		let invoker = class.find_method("invokeHelper", None).unwrap();
		let code = invoker.code.as_ref().unwrap();
		assert!(matches!(&code.instructions[0].instruction, Instruction::InvokeStatic(m, _) if m.name == MethodName::from("helper")));
	}
}
