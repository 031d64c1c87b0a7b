//! `TargetClassContext` (component F): the fixed three-pass driver that
//! applies one mixin's directives to one target class (§4.6).

use classfile::strings::ClassName;
use classfile::tree::class::ClassFile;

use crate::directive::{Directive, InjectTarget, MixinClassSource, MixinEntry};
use crate::inline::ShadowBindings;
use crate::injectors::dispatch::ensure_singleton_field;
use crate::injectors::{accessor, copy, head, invoke, invoker, modify_arg, modify_constant, modify_return_value, overwrite, redirect, remove, replace_all, return_injector, tail};

/// One directive's outcome, non-fatal to the rest of the class: per §4.6's
/// error policy, a failing directive is logged and skipped, never aborts the
/// class.
#[derive(Debug, Clone)]
pub struct Diagnostic {
	pub target_class: ClassName,
	pub mixin_class: ClassName,
	pub message: String,
}

fn is_singleton(mixin_tree: &ClassFile) -> bool {
	mixin_tree.find_field("INSTANCE").map(|f| f.access.is_static && f.descriptor.as_str() == format!("L{};", mixin_tree.name)).unwrap_or(false)
}

fn build_shadows(entry: &MixinEntry) -> ShadowBindings {
	let mut shadows = ShadowBindings::default();
	for d in &entry.directives {
		match d {
			Directive::ShadowField { mixin_field, target_field } => {
				shadows.fields.insert(mixin_field.to_string(), target_field.to_string());
			}
			Directive::ShadowMethod { mixin_method, target_name } => {
				shadows.methods.insert((mixin_method.name.to_string(), mixin_method.desc.to_string()), target_name.to_string());
			}
			Directive::Copy { target_name, handler } => {
				shadows.copies.insert((handler.name.to_string(), handler.desc.to_string()), target_name.to_string());
			}
			_ => {}
		}
	}
	shadows
}

/// Applies `entry` to `class`, never failing the whole class on a single
/// directive's error. Returns whether anything changed and any per-directive
/// diagnostics collected along the way.
pub fn apply(class: &mut ClassFile, entry: &MixinEntry, source: &dyn MixinClassSource) -> (bool, Vec<Diagnostic>) {
	let mut diagnostics = Vec::new();
	let mut changed = false;

	let diag = |message: String| Diagnostic { target_class: class.name.clone(), mixin_class: entry.mixin_class.clone(), message };

	let mixin_tree = match source.get(&entry.mixin_class) {
		Ok(tree) => tree,
		Err(e) => {
			diagnostics.push(diag(format!("could not resolve mixin class bytes: {e:#}")));
			return (changed, diagnostics);
		}
	};

	// Step 1: prepare target shape.
	if !is_singleton(&mixin_tree) {
		ensure_singleton_field(class, &entry.mixin_class);
		changed = true;
	}

	// Step 2: replace-all-methods, applied first so later directives edit its output.
	if let Some(ram) = &entry.replace_all_methods {
		match replace_all::apply(class, ram.remove_sync) {
			Ok(c) => changed |= c,
			Err(e) => diagnostics.push(diag(format!("ReplaceAllMethods failed: {e:#}"))),
		}
		if !class.access.is_interface {
			class.access.is_abstract = false;
		}
	}

	let shadows = build_shadows(entry);

	// Step 3: field directives, then non-HEAD/RETURN/TAIL method directives.
	for d in &entry.directives {
		match d {
			Directive::Mutable { field } => {
				if let Some(f) = class.find_field_mut(field.as_str()) {
					f.access.is_final = false;
					changed = true;
				}
			}
			Directive::Final { field } => {
				if let Some(f) = class.find_field_mut(field.as_str()) {
					f.access.is_final = true;
					changed = true;
				}
			}
			_ => {}
		}
	}

	for d in &entry.directives {
		let result = match d {
			Directive::Inject { point: InjectTarget::Invoke, target, handler, at, .. } => {
				let (owner, name, desc) = crate::bytecode::method_descriptor_parse(&at.value);
				let call_owner = ClassName::from(owner.as_str());
				let call_name = classfile::strings::MethodName::from(name.as_str());
				let call_desc = if desc.is_empty() { None } else { Some(classfile::strings::MethodDescriptor::from(desc.as_str())) };
				invoke::apply(class, &entry.mixin_class, &mixin_tree, target, handler, &call_owner, &call_name, call_desc.as_ref(), at.shift)
			}
			Directive::Overwrite { target, handler } => overwrite::apply(class, &entry.mixin_class, target, handler, &shadows, source),
			Directive::ModifyArg { target, handler, index, .. } => modify_arg::apply(class, &entry.mixin_class, &mixin_tree, target, handler, *index),
			Directive::ModifyReturnValue { target, handler } => modify_return_value::apply(class, &entry.mixin_class, &mixin_tree, target, handler),
			Directive::ModifyConstant { target, handler, constant } => modify_constant::apply(class, &entry.mixin_class, &mixin_tree, target, handler, constant),
			Directive::Redirect { target, handler, call_owner, call_target, .. } => {
				redirect::apply(class, &entry.mixin_class, &mixin_tree, target, handler, call_owner, &call_target.name, call_target.desc.as_ref())
			}
			Directive::Accessor { handler, field } => accessor::apply(class, &mixin_tree, handler, field),
			Directive::Invoker { handler, target } => invoker::apply(class, handler, target),
			Directive::Copy { target_name, handler } => copy::apply(class, &entry.mixin_class, target_name, handler, &shadows, source),
			Directive::RemoveMethod { target } => remove::remove_method(class, target),
			Directive::RemoveSynchronized { target } => remove::remove_synchronized(class, target),
			_ => continue,
		};
		match result {
			Ok(c) => changed |= c,
			Err(e) => diagnostics.push(diag(format!("directive failed: {e:#}"))),
		}
	}

	// Step 4: RETURN and TAIL injects.
	for d in &entry.directives {
		let Directive::Inject { point, target, handler, .. } = d else { continue };
		let result = match point {
			InjectTarget::Return => return_injector::apply(class, &entry.mixin_class, &mixin_tree, target, handler),
			InjectTarget::Tail => tail::apply(class, &entry.mixin_class, &mixin_tree, target, handler),
			_ => continue,
		};
		match result {
			Ok(c) => changed |= c,
			Err(e) => diagnostics.push(diag(format!("directive failed: {e:#}"))),
		}
	}

	// Step 5: HEAD injects, last, so their generated RETURNs are invisible to step 4.
	for d in &entry.directives {
		let Directive::Inject { point: InjectTarget::Head, target, handler, cancellable, .. } = d else { continue };
		match head::apply(class, &entry.mixin_class, &mixin_tree, target, handler, *cancellable) {
			Ok(c) => changed |= c,
			Err(e) => diagnostics.push(diag(format!("directive failed: {e:#}"))),
		}
	}

	(changed, diagnostics)
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use classfile::strings::{ClassName as CN, MethodDescriptor, MethodName};
	use classfile::tree::class::ClassAccess;
	use classfile::tree::method::code::{Code, Instruction};
	use classfile::tree::method::{Method, MethodAccess};
	use pretty_assertions::assert_eq;

	use super::*;
	use crate::directive::{MixinDescriptor, MixinEntry};

	#[test]
	fn head_inject_runs_before_original_code() {
		let mut class = ClassFile::new(52, 0, ClassAccess::default(), CN::from("t/Target"), Some(CN::from("java/lang/Object")), vec![]);
		let mut method = Method::new(MethodAccess { is_public: true, ..Default::default() }, MethodName::from("testA0"), MethodDescriptor::from("()V"));
		let mut code = Code::default();
		code.push(Instruction::Return);
		method.code = Some(code);
		class.methods.push(method);

		let mixin_class = CN::from("m/Mixin");
		let mut mixin_tree = ClassFile::new(52, 0, ClassAccess::default(), mixin_class.clone(), Some(CN::from("java/lang/Object")), vec![]);
		mixin_tree.methods.push(Method::new(MethodAccess { is_public: true, ..Default::default() }, MethodName::from("onHead"), MethodDescriptor::from("()V")));

		let descriptor_json = r#"{
			"targets": ["t/Target"],
			"methods": [{"kind":"inject","handler":"onHead","method":"testA0","target":"head","at":{"value":"HEAD"}}]
		}"#;
		let descriptor: MixinDescriptor = serde_json::from_str(descriptor_json).unwrap();
		let entry = MixinEntry::from_descriptor(&mixin_tree, &descriptor).unwrap();

		let mut source = HashMap::new();
		source.insert(mixin_class, mixin_tree);

		let (changed, diagnostics) = apply(&mut class, &entry, &source);
		assert!(changed);
		assert!(diagnostics.is_empty());

		let method_code = class.methods[0].code.as_ref().unwrap();
		assert!(method_code.instructions.iter().any(|e| matches!(&e.instruction, Instruction::InvokeStatic(m, _) if m.name == MethodName::from("onHead"))));
	}

	#[test]
	fn unresolvable_directive_becomes_diagnostic_not_failure() {
		let mut class = ClassFile::new(52, 0, ClassAccess::default(), CN::from("t/Target"), Some(CN::from("java/lang/Object")), vec![]);

		let mixin_class = CN::from("m/Mixin");
		let mut mixin_tree = ClassFile::new(52, 0, ClassAccess::default(), mixin_class.clone(), Some(CN::from("java/lang/Object")), vec![]);
		mixin_tree.methods.push(Method::new(MethodAccess { is_public: true, ..Default::default() }, MethodName::from("onHead"), MethodDescriptor::from("()V")));

		let descriptor_json = r#"{
			"targets": ["t/Target"],
			"methods": [{"kind":"inject","handler":"onHead","method":"missingMethod","target":"head","at":{"value":"HEAD"}}]
		}"#;
		let descriptor: MixinDescriptor = serde_json::from_str(descriptor_json).unwrap();
		let entry = MixinEntry::from_descriptor(&mixin_tree, &descriptor).unwrap();

		let mut source = HashMap::new();
		source.insert(mixin_class, mixin_tree);

		let (_, diagnostics) = apply(&mut class, &entry, &source);
		assert_eq!(diagnostics.len(), 1);
	}
}
