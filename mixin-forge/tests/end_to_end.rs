//! Integration test implementing §8's literal scenarios against the test
//! class `Test` (fields `dynamicString`/`staticString`/`staticFinalString`,
//! methods `testA0`/`testB0`/`testC0`/`testC1`). No JVM runs here, so each
//! scenario asserts on the *shape* of the emitted instruction list rather
//! than executing it, the same way `classfile`'s own tests assert on parsed
//! trees instead of running them.

use std::collections::HashMap;

use classfile::strings::{ClassName, FieldDescriptor, FieldName, MethodDescriptor, MethodName};
use classfile::tree::class::{ClassAccess, ClassFile};
use classfile::tree::field::{Field, FieldAccess};
use classfile::tree::method::code::{Code, Instruction, Loadable, LvIndex};
use classfile::tree::method::{Method, MethodAccess};
use mixin_forge::directive::{MixinDescriptor, MixinEntry};
use mixin_forge::{context, Registry, Transformer};
use pretty_assertions::assert_eq;

const TARGET: &str = "t/Test";
const MIXIN: &str = "m/TestMixin";

fn target_class() -> ClassFile {
	let mut class = ClassFile::new(52, 0, ClassAccess { is_public: true, ..Default::default() }, ClassName::from(TARGET), Some(ClassName::from("java/lang/Object")), vec![]);

	class.fields.push(Field::new(FieldAccess { is_public: true, ..Default::default() }, FieldName::from("dynamicString"), FieldDescriptor::from("Ljava/lang/String;")));
	class.fields.push(Field::new(FieldAccess { is_public: true, is_static: true, ..Default::default() }, FieldName::from("staticString"), FieldDescriptor::from("Ljava/lang/String;")));
	class.fields.push(Field::new(FieldAccess { is_public: true, is_static: true, is_final: true, ..Default::default() }, FieldName::from("staticFinalString"), FieldDescriptor::from("Ljava/lang/String;")));

	let mut test_a0 = Method::new(MethodAccess { is_public: true, ..Default::default() }, MethodName::from("testA0"), MethodDescriptor::from("()Ljava/lang/String;"));
	let mut a0_code = Code::default();
	a0_code.push(Instruction::ALoad(LvIndex::new(0)));
	a0_code.push(Instruction::GetField(classfile::tree::field::FieldRef { class: ClassName::from(TARGET), name: "dynamicString".into(), desc: FieldDescriptor::from("Ljava/lang/String;") }));
	a0_code.push(Instruction::AReturn);
	test_a0.code = Some(a0_code);
	class.methods.push(test_a0);

	let mut test_b0 = Method::new(MethodAccess { is_public: true, is_static: true, ..Default::default() }, MethodName::from("testB0"), MethodDescriptor::from("()Ljava/lang/String;"));
	let mut b0_code = Code::default();
	b0_code.push(Instruction::GetStatic(classfile::tree::field::FieldRef { class: ClassName::from(TARGET), name: "staticFinalString".into(), desc: FieldDescriptor::from("Ljava/lang/String;") }));
	b0_code.push(Instruction::AReturn);
	test_b0.code = Some(b0_code);
	class.methods.push(test_b0);

	let mut test_c0 = Method::new(MethodAccess { is_public: true, ..Default::default() }, MethodName::from("testC0"), MethodDescriptor::from("(Ljava/lang/String;)Ljava/lang/String;"));
	let mut c0_code = Code::default();
	c0_code.push(Instruction::ALoad(LvIndex::new(1)));
	c0_code.push(Instruction::AReturn);
	test_c0.code = Some(c0_code);
	class.methods.push(test_c0);

	let mut test_c1 = Method::new(MethodAccess { is_public: true, is_static: true, ..Default::default() }, MethodName::from("testC1"), MethodDescriptor::from("(Ljava/lang/String;)Ljava/lang/String;"));
	let mut c1_code = Code::default();
	c1_code.push(Instruction::ALoad(LvIndex::new(0)));
	c1_code.push(Instruction::AReturn);
	test_c1.code = Some(c1_code);
	class.methods.push(test_c1);

	class
}

/// A mixin handler with no body/params beyond what's listed, returning the
/// given string constant, for use by Overwrite scenarios.
fn constant_handler(name: &str, literal: &str) -> Method {
	let mut method = Method::new(MethodAccess { is_public: true, is_static: true, ..Default::default() }, MethodName::from(name), MethodDescriptor::from("()Ljava/lang/String;"));
	let mut code = Code::default();
	code.push(Instruction::Ldc(Loadable::String(literal.to_owned())));
	code.push(Instruction::AReturn);
	method.code = Some(code);
	method
}

fn entry_from_json(mixin_tree: &ClassFile, json: &str) -> MixinEntry {
	let descriptor: MixinDescriptor = serde_json::from_str(json).unwrap();
	MixinEntry::from_descriptor(mixin_tree, &descriptor).unwrap()
}

fn source_with(mixin_tree: ClassFile) -> HashMap<ClassName, ClassFile> {
	let mut source = HashMap::new();
	source.insert(mixin_tree.name.clone(), mixin_tree);
	source
}

fn has_invoke(code: &Code, name: &str) -> bool {
	code.instructions.iter().any(|e| matches!(&e.instruction, Instruction::InvokeStatic(m, _) | Instruction::InvokeVirtual(m) if m.name.as_str() == name))
}

fn has_string_constant(code: &Code, literal: &str) -> bool {
	code.instructions.iter().any(|e| matches!(&e.instruction, Instruction::Ldc(Loadable::String(s)) if s == literal))
}

/// Scenario 1: overwrite all four methods to return a fixed constant each.
#[test]
fn overwrite_all_four_methods_to_constants() {
	let mut class = target_class();

	let mut mixin_tree = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from(MIXIN), Some(ClassName::from("java/lang/Object")), vec![]);
	mixin_tree.methods.push(constant_handler("newA0", "OverwrittenA0"));
	mixin_tree.methods.push(constant_handler("newB0", "OverwrittenB0"));
	mixin_tree.methods.push(constant_handler("newC0", "OverwrittenC0"));
	mixin_tree.methods.push(constant_handler("newC1", "OverwrittenC1"));

	let descriptor_json = format!(
		r#"{{
			"targets": ["{TARGET}"],
			"methods": [
				{{"kind":"overwrite","handler":"newA0","method":"testA0"}},
				{{"kind":"overwrite","handler":"newB0","method":"testB0"}},
				{{"kind":"overwrite","handler":"newC0","method":"testC0"}},
				{{"kind":"overwrite","handler":"newC1","method":"testC1"}}
			]
		}}"#
	);
	let entry = entry_from_json(&mixin_tree, &descriptor_json);
	let source = source_with(mixin_tree);

	let (changed, diagnostics) = context::apply(&mut class, &entry, &source);
	assert!(changed);
	assert!(diagnostics.is_empty(), "{diagnostics:?}");

	for (method, literal) in [("testA0", "OverwrittenA0"), ("testB0", "OverwrittenB0"), ("testC0", "OverwrittenC0"), ("testC1", "OverwrittenC1")] {
		let code = class.find_method(method, None).unwrap().code.as_ref().unwrap();
		assert!(has_string_constant(code, literal), "{method} missing {literal}");
		assert!(matches!(code.instructions.last().unwrap().instruction, Instruction::AReturn));
	}
}

/// Scenario 2: cancellable HEAD inject on `testA0` short-circuits before the
/// original field read ever runs.
#[test]
fn cancellable_head_inject_shortcircuits_before_original_body() {
	let mut class = target_class();

	let mut mixin_tree = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from(MIXIN), Some(ClassName::from("java/lang/Object")), vec![]);
	let cb_desc = format!("(L{};)V", mixin_forge::callback::CALLBACK_INFO_CLASS);
	mixin_tree.methods.push(Method::new(MethodAccess { is_public: true, is_static: true, ..Default::default() }, MethodName::from("onHeadA0"), MethodDescriptor::from(cb_desc.as_str())));

	let descriptor_json = format!(
		r#"{{
			"targets": ["{TARGET}"],
			"methods": [
				{{"kind":"inject","handler":"onHeadA0","method":"testA0","target":"head","cancellable":true,"at":{{"value":"HEAD"}}}}
			]
		}}"#
	);
	let entry = entry_from_json(&mixin_tree, &descriptor_json);
	let source = source_with(mixin_tree);

	let (changed, diagnostics) = context::apply(&mut class, &entry, &source);
	assert!(changed);
	assert!(diagnostics.is_empty(), "{diagnostics:?}");

	let code = class.find_method("testA0", None).unwrap().code.as_ref().unwrap();
	assert!(has_invoke(code, "onHeadA0"));
	assert!(has_invoke(code, "isCancelled"));
	// the guarded early return precedes the original field read, which is still present further down.
	let cancel_check = code.instructions.iter().position(|e| matches!(&e.instruction, Instruction::InvokeVirtual(m) if m.name.as_str() == "isCancelled")).unwrap();
	let original_read = code.instructions.iter().position(|e| matches!(&e.instruction, Instruction::GetField(f) if f.name.as_str() == "dynamicString")).unwrap();
	assert!(cancel_check < original_read);
}

/// Scenario 3: `ModifyArg(testC0, index=0)` rewrites the parameter before
/// the original body observes it.
#[test]
fn modify_arg_rewrites_parameter_before_original_body() {
	let mut class = target_class();

	let mut mixin_tree = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from(MIXIN), Some(ClassName::from("java/lang/Object")), vec![]);
	mixin_tree.methods.push(Method::new(MethodAccess { is_public: true, is_static: true, ..Default::default() }, MethodName::from("modifyC0Arg"), MethodDescriptor::from("(Ljava/lang/String;)Ljava/lang/String;")));

	let descriptor_json = format!(
		r#"{{
			"targets": ["{TARGET}"],
			"methods": [
				{{"kind":"modify_arg","handler":"modifyC0Arg","method":"testC0","index":0,"at":{{"value":"ARG"}}}}
			]
		}}"#
	);
	let entry = entry_from_json(&mixin_tree, &descriptor_json);
	let source = source_with(mixin_tree);

	let (changed, diagnostics) = context::apply(&mut class, &entry, &source);
	assert!(changed);
	assert!(diagnostics.is_empty(), "{diagnostics:?}");

	let code = class.find_method("testC0", None).unwrap().code.as_ref().unwrap();
	assert!(has_invoke(code, "modifyC0Arg"));
	let invoke_pos = code.instructions.iter().position(|e| matches!(&e.instruction, Instruction::InvokeStatic(m, _) if m.name.as_str() == "modifyC0Arg")).unwrap();
	assert!(invoke_pos < code.instructions.len() - 1, "handler call must precede the rest of the original body");
}

/// Scenario 4: `ModifyReturnValue(testB0)` rewrites the value at the sole
/// RETURN site.
#[test]
fn modify_return_value_rewrites_at_return_site() {
	let mut class = target_class();

	let mut mixin_tree = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from(MIXIN), Some(ClassName::from("java/lang/Object")), vec![]);
	mixin_tree.methods.push(Method::new(MethodAccess { is_public: true, is_static: true, ..Default::default() }, MethodName::from("modifyB0Return"), MethodDescriptor::from("(Ljava/lang/String;)Ljava/lang/String;")));

	let descriptor_json = format!(
		r#"{{
			"targets": ["{TARGET}"],
			"methods": [
				{{"kind":"modify_return_value","handler":"modifyB0Return","method":"testB0","at":{{"value":"RETURN"}}}}
			]
		}}"#
	);
	let entry = entry_from_json(&mixin_tree, &descriptor_json);
	let source = source_with(mixin_tree);

	let (changed, diagnostics) = context::apply(&mut class, &entry, &source);
	assert!(changed);
	assert!(diagnostics.is_empty(), "{diagnostics:?}");

	let code = class.find_method("testB0", None).unwrap().code.as_ref().unwrap();
	assert!(has_invoke(code, "modifyB0Return"));
	assert!(matches!(code.instructions.last().unwrap().instruction, Instruction::AReturn));
}

/// Scenario 5: `Accessor("dynamicString")` synthesizes a getter and setter.
#[test]
fn accessor_synthesizes_getter_and_setter() {
	let mut class = target_class();

	let mut mixin_tree = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from(MIXIN), Some(ClassName::from("java/lang/Object")), vec![]);
	mixin_tree.methods.push(Method::new(MethodAccess { is_public: true, is_abstract: true, ..Default::default() }, MethodName::from("getDynamicString"), MethodDescriptor::from("()Ljava/lang/String;")));
	mixin_tree.methods.push(Method::new(MethodAccess { is_public: true, is_abstract: true, ..Default::default() }, MethodName::from("setDynamicString"), MethodDescriptor::from("(Ljava/lang/String;)V")));

	let descriptor_json = format!(
		r#"{{
			"targets": ["{TARGET}"],
			"methods": [
				{{"kind":"accessor","handler":"getDynamicString","value":"dynamicString"}},
				{{"kind":"accessor","handler":"setDynamicString","value":"dynamicString"}}
			]
		}}"#
	);
	let entry = entry_from_json(&mixin_tree, &descriptor_json);
	let source = source_with(mixin_tree);

	let (changed, diagnostics) = context::apply(&mut class, &entry, &source);
	assert!(changed);
	assert!(diagnostics.is_empty(), "{diagnostics:?}");

	let getter = class.find_method("getDynamicString", None).unwrap();
	let getter_code = getter.code.as_ref().unwrap();
	assert!(getter_code.instructions.iter().any(|e| matches!(&e.instruction, Instruction::GetField(f) if f.name.as_str() == "dynamicString")));
	assert!(matches!(getter_code.instructions.last().unwrap().instruction, Instruction::AReturn));

	let setter = class.find_method("setDynamicString", None).unwrap();
	let setter_code = setter.code.as_ref().unwrap();
	assert!(setter_code.instructions.iter().any(|e| matches!(&e.instruction, Instruction::PutField(f) if f.name.as_str() == "dynamicString")));
	assert!(matches!(setter_code.instructions.last().unwrap().instruction, Instruction::Return));
}

/// Scenario 6: combined `ModifyArg` + `ModifyReturnValue` on `testC0`; both
/// directives apply independently (the spec notes the ReturnValue wins at
/// runtime, which is a statement about dispatch order, not about either
/// directive failing to take effect in the emitted bytecode).
#[test]
fn combined_modify_arg_and_modify_return_value_both_apply() {
	let mut class = target_class();

	let mut mixin_tree = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from(MIXIN), Some(ClassName::from("java/lang/Object")), vec![]);
	mixin_tree.methods.push(Method::new(MethodAccess { is_public: true, is_static: true, ..Default::default() }, MethodName::from("modifyC0Arg"), MethodDescriptor::from("(Ljava/lang/String;)Ljava/lang/String;")));
	mixin_tree.methods.push(Method::new(MethodAccess { is_public: true, is_static: true, ..Default::default() }, MethodName::from("modifyC0Return"), MethodDescriptor::from("(Ljava/lang/String;)Ljava/lang/String;")));

	let descriptor_json = format!(
		r#"{{
			"targets": ["{TARGET}"],
			"methods": [
				{{"kind":"modify_arg","handler":"modifyC0Arg","method":"testC0","index":0,"at":{{"value":"ARG"}}}},
				{{"kind":"modify_return_value","handler":"modifyC0Return","method":"testC0","at":{{"value":"RETURN"}}}}
			]
		}}"#
	);
	let entry = entry_from_json(&mixin_tree, &descriptor_json);
	let source = source_with(mixin_tree);

	let (changed, diagnostics) = context::apply(&mut class, &entry, &source);
	assert!(changed);
	assert!(diagnostics.is_empty(), "{diagnostics:?}");

	let code = class.find_method("testC0", None).unwrap().code.as_ref().unwrap();
	assert!(has_invoke(code, "modifyC0Arg"));
	assert!(has_invoke(code, "modifyC0Return"));
}

/// End-to-end through [`Transformer`]: registry lookup, read, apply, write,
/// re-parse, confirming the full §4.8 pipeline round-trips a HEAD inject.
#[test]
fn transformer_round_trips_bytes_through_registry_and_reparse() {
	let class = target_class();
	let original_bytes = classfile::writer::write_class(&class).unwrap();

	let mut mixin_tree = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from(MIXIN), Some(ClassName::from("java/lang/Object")), vec![]);
	let cb_desc = format!("(L{};)V", mixin_forge::callback::CALLBACK_INFO_CLASS);
	mixin_tree.methods.push(Method::new(MethodAccess { is_public: true, is_static: true, ..Default::default() }, MethodName::from("onHeadA0"), MethodDescriptor::from(cb_desc.as_str())));

	let descriptor_json = format!(
		r#"{{
			"targets": ["{TARGET}"],
			"methods": [
				{{"kind":"inject","handler":"onHeadA0","method":"testA0","target":"head","cancellable":true,"at":{{"value":"HEAD"}}}}
			]
		}}"#
	);
	let entry = entry_from_json(&mixin_tree, &descriptor_json);

	let registry = Registry::new();
	registry.register(entry);
	let transformer = Transformer::new(registry);
	let source = source_with(mixin_tree);

	let outcome = transformer.transform(&ClassName::from(TARGET), &original_bytes, &source).unwrap();
	assert!(outcome.changed);
	assert!(outcome.diagnostics.is_empty());
	assert_ne!(outcome.bytes, original_bytes);

	let reparsed = classfile::reader::read_class(&outcome.bytes).unwrap();
	let method = reparsed.find_method("testA0", None).unwrap();
	let code = method.code.as_ref().unwrap();
	assert!(has_invoke(code, "onHeadA0"));
}
