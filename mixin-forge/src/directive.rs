//! The directive model (component B) and the JSON sidecar front-end that
//! lowers into it (component J).
//!
//! Real mixin frameworks attach this metadata as annotations directly on the
//! mixin class and its members; since annotation attributes are out of scope
//! for the `classfile` crate this is built on, each mixin instead ships a
//! `<ClassName>.mixin.json` sidecar listing its directives. Each entry names
//! its own `handler` (the mixin's method/field implementing the edit)
//! explicitly, standing in for "the member this annotation decorates".

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use classfile::strings::{ClassName, FieldName, MethodDescriptor, MethodName};
use classfile::tree::class::ClassFile;
use classfile::tree::method::MethodNameAndDesc;
use serde::Deserialize;

use crate::bytecode::method_descriptor_parse;

// ---- JSON sidecar shape -----------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct MixinDescriptor {
	#[serde(default)]
	pub targets: Vec<String>,
	#[serde(default)]
	pub target_prefix: Option<String>,
	#[serde(default)]
	pub replace_all_methods: Option<ReplaceAllMethodsMeta>,
	#[serde(default)]
	pub methods: Vec<MethodMeta>,
	#[serde(default)]
	pub fields: Vec<FieldMeta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplaceAllMethodsMeta {
	#[serde(default)]
	pub remove_sync: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectPoint {
	Head,
	Tail,
	Return,
	Invoke,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shift {
	#[default]
	Before,
	After,
	Replace,
}

#[derive(Debug, Clone, Deserialize)]
pub struct At {
	pub value: String,
	#[serde(default)]
	pub target: Option<String>,
	#[serde(default)]
	pub shift: Shift,
	#[serde(default)]
	pub by: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Slice {
	#[serde(default)]
	pub from: Option<String>,
	#[serde(default)]
	pub to: Option<String>,
	#[serde(default)]
	pub id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ConstantMatch {
	Int(i64),
	Float(f64),
	Str(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MethodMeta {
	Inject {
		handler: String,
		method: String,
		target: InjectPoint,
		#[serde(default)]
		cancellable: bool,
		at: At,
		#[serde(default)]
		ordinal: Option<u32>,
		#[serde(default)]
		require: Option<u32>,
		#[serde(default)]
		slice: Option<Slice>,
	},
	Overwrite {
		handler: String,
		method: String,
	},
	ModifyArg {
		handler: String,
		method: String,
		index: u16,
		at: At,
		#[serde(default)]
		slice: Option<Slice>,
	},
	ModifyReturnValue {
		handler: String,
		method: String,
		at: At,
	},
	ModifyConstant {
		handler: String,
		method: String,
		constant: ConstantMatch,
	},
	Redirect {
		handler: String,
		method: String,
		target: String,
		at: At,
		#[serde(default)]
		slice: Option<Slice>,
	},
	Accessor {
		handler: String,
		value: String,
	},
	Invoker {
		handler: String,
		value: String,
	},
	Shadow {
		handler: String,
		#[serde(default)]
		method: Option<String>,
	},
	Copy {
		handler: String,
		method: String,
	},
	RemoveMethod {
		method: String,
	},
	RemoveSynchronized {
		method: String,
	},
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldMeta {
	Shadow {
		field: String,
		#[serde(default)]
		target: Option<String>,
	},
	Mutable {
		field: String,
	},
	Final {
		field: String,
	},
}

// ---- Resolved, in-memory model -----------------------------------------

/// `name` + an optional descriptor; absent descriptor means "match by name
/// only", the fallback the reference design uses when a directive's target
/// string carries no `(...)` suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodKey {
	pub name: MethodName,
	pub desc: Option<MethodDescriptor>,
}

impl MethodKey {
	fn parse(s: &str) -> MethodKey {
		let (_, name, desc) = method_descriptor_parse(s);
		MethodKey { name: MethodName::from(name), desc: if desc.is_empty() { None } else { Some(MethodDescriptor::from(desc)) } }
	}

	pub fn matches(&self, name: &MethodName, desc: &MethodDescriptor) -> bool {
		self.name == *name && match &self.desc {
			Some(d) => d == desc,
			None => true,
		}
	}
}

#[derive(Debug, Clone)]
pub struct SliceSpec {
	pub from: Option<String>,
	pub to: Option<String>,
}

impl SliceSpec {
	fn lower(s: &Slice) -> SliceSpec {
		SliceSpec { from: s.from.clone(), to: s.to.clone() }
	}
}

#[derive(Debug, Clone)]
pub struct AtSpec {
	pub value: String,
	pub target: Option<String>,
	pub shift: Shift,
	pub by: i32,
}

impl AtSpec {
	fn lower(a: &At) -> AtSpec {
		AtSpec { value: a.value.clone(), target: a.target.clone(), shift: a.shift, by: a.by }
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectTarget {
	Head,
	Tail,
	Return,
	Invoke,
}

#[derive(Debug, Clone)]
pub struct ReplaceAllMethods {
	pub remove_sync: bool,
}

#[derive(Debug, Clone)]
pub enum Directive {
	Inject {
		target: MethodKey,
		handler: MethodNameAndDesc,
		point: InjectTarget,
		cancellable: bool,
		at: AtSpec,
		ordinal: Option<u32>,
		require: Option<u32>,
		slice: Option<SliceSpec>,
	},
	Overwrite {
		target: MethodKey,
		handler: MethodNameAndDesc,
	},
	ModifyArg {
		target: MethodKey,
		handler: MethodNameAndDesc,
		index: u16,
		slice: Option<SliceSpec>,
	},
	ModifyReturnValue {
		target: MethodKey,
		handler: MethodNameAndDesc,
	},
	ModifyConstant {
		target: MethodKey,
		handler: MethodNameAndDesc,
		constant: ConstantMatch,
	},
	Redirect {
		target: MethodKey,
		handler: MethodNameAndDesc,
		call_owner: ClassName,
		call_target: MethodKey,
		slice: Option<SliceSpec>,
	},
	Accessor {
		handler: MethodName,
		field: FieldName,
	},
	Invoker {
		handler: MethodName,
		target: MethodKey,
	},
	ShadowMethod {
		mixin_method: MethodNameAndDesc,
		target_name: MethodName,
	},
	Copy {
		target_name: MethodName,
		handler: MethodNameAndDesc,
	},
	RemoveMethod {
		target: MethodKey,
	},
	RemoveSynchronized {
		target: MethodKey,
	},
	ShadowField {
		mixin_field: FieldName,
		target_field: FieldName,
	},
	Mutable {
		field: FieldName,
	},
	Final {
		field: FieldName,
	},
}

/// Resolves `name` against `mixin_tree`'s own methods, erroring if it's
/// absent or ambiguous (more than one overload sharing the name).
fn resolve_handler(mixin_tree: &ClassFile, name: &str) -> Result<MethodNameAndDesc> {
	let mut matches = mixin_tree.methods.iter().filter(|m| m.name.as_str() == name);
	let first = matches.next().with_context(|| format!("mixin handler {name:?} not found on {}", mixin_tree.name))?;
	if matches.next().is_some() {
		bail!("mixin handler {name:?} on {} is ambiguous (multiple overloads); give an explicit descriptor", mixin_tree.name);
	}
	Ok(first.name_and_desc())
}

fn shadow_target_name(handler_name: &str, explicit: Option<&str>) -> MethodName {
	if let Some(explicit) = explicit {
		return MethodName::from(explicit);
	}
	MethodName::from(handler_name.strip_prefix("shadow_").unwrap_or(handler_name))
}

fn lower_method_meta(mixin_tree: &ClassFile, meta: &MethodMeta) -> Result<Directive> {
	Ok(match meta {
		MethodMeta::Inject { handler, method, target, cancellable, at, ordinal, require, slice } => Directive::Inject {
			target: MethodKey::parse(method),
			handler: resolve_handler(mixin_tree, handler)?,
			point: match target {
				InjectPoint::Head => InjectTarget::Head,
				InjectPoint::Tail => InjectTarget::Tail,
				InjectPoint::Return => InjectTarget::Return,
				InjectPoint::Invoke => InjectTarget::Invoke,
			},
			cancellable: *cancellable,
			at: AtSpec::lower(at),
			ordinal: *ordinal,
			require: *require,
			slice: slice.as_ref().map(SliceSpec::lower),
		},
		MethodMeta::Overwrite { handler, method } => {
			Directive::Overwrite { target: MethodKey::parse(method), handler: resolve_handler(mixin_tree, handler)? }
		}
		MethodMeta::ModifyArg { handler, method, index, slice, .. } => Directive::ModifyArg {
			target: MethodKey::parse(method),
			handler: resolve_handler(mixin_tree, handler)?,
			index: *index,
			slice: slice.as_ref().map(SliceSpec::lower),
		},
		MethodMeta::ModifyReturnValue { handler, method, .. } => {
			Directive::ModifyReturnValue { target: MethodKey::parse(method), handler: resolve_handler(mixin_tree, handler)? }
		}
		MethodMeta::ModifyConstant { handler, method, constant } => Directive::ModifyConstant {
			target: MethodKey::parse(method),
			handler: resolve_handler(mixin_tree, handler)?,
			constant: constant.clone(),
		},
		MethodMeta::Redirect { handler, method, target, slice, .. } => {
			let (owner, name, desc) = method_descriptor_parse(target);
			Directive::Redirect {
				target: MethodKey::parse(method),
				handler: resolve_handler(mixin_tree, handler)?,
				call_owner: ClassName::from(owner.as_str()),
				call_target: MethodKey { name: MethodName::from(name.as_str()), desc: if desc.is_empty() { None } else { Some(MethodDescriptor::from(desc.as_str())) } },
				slice: slice.as_ref().map(SliceSpec::lower),
			}
		}
		MethodMeta::Accessor { handler, value } => Directive::Accessor { handler: MethodName::from(handler.as_str()), field: FieldName::from(value.as_str()) },
		MethodMeta::Invoker { handler, value } => Directive::Invoker { handler: MethodName::from(handler.as_str()), target: MethodKey::parse(value) },
		MethodMeta::Shadow { handler, method } => Directive::ShadowMethod {
			mixin_method: resolve_handler(mixin_tree, handler)?,
			target_name: shadow_target_name(handler, method.as_deref()),
		},
		MethodMeta::Copy { handler, method } => {
			Directive::Copy { target_name: MethodName::from(method.as_str()), handler: resolve_handler(mixin_tree, handler)? }
		}
		MethodMeta::RemoveMethod { method } => Directive::RemoveMethod { target: MethodKey::parse(method) },
		MethodMeta::RemoveSynchronized { method } => Directive::RemoveSynchronized { target: MethodKey::parse(method) },
	})
}

fn lower_field_meta(meta: &FieldMeta) -> Directive {
	match meta {
		FieldMeta::Shadow { field, target } => {
			Directive::ShadowField { mixin_field: FieldName::from(field.as_str()), target_field: FieldName::from(shadow_target_name(field, target.as_deref()).as_str()) }
		}
		FieldMeta::Mutable { field } => Directive::Mutable { field: FieldName::from(field.as_str()) },
		FieldMeta::Final { field } => Directive::Final { field: FieldName::from(field.as_str()) },
	}
}

#[derive(Debug, Clone)]
pub enum TargetMatcher {
	Exact(Vec<ClassName>),
	Prefix(String),
}

impl TargetMatcher {
	pub fn matches(&self, target: &ClassName) -> bool {
		match self {
			TargetMatcher::Exact(names) => names.iter().any(|n| n == target),
			TargetMatcher::Prefix(prefix) => target.as_str().starts_with(prefix.as_str()),
		}
	}
}

#[derive(Debug, Clone)]
pub struct MixinEntry {
	pub mixin_class: ClassName,
	pub matcher: TargetMatcher,
	pub replace_all_methods: Option<ReplaceAllMethods>,
	pub directives: Vec<Directive>,
}

impl MixinEntry {
	/// Lowers a parsed [`MixinDescriptor`] into a [`MixinEntry`], resolving
	/// every `handler` name against `mixin_tree`'s own members.
	pub fn from_descriptor(mixin_tree: &ClassFile, descriptor: &MixinDescriptor) -> Result<MixinEntry> {
		let matcher = match &descriptor.target_prefix {
			Some(prefix) => TargetMatcher::Prefix(prefix.clone()),
			None => TargetMatcher::Exact(descriptor.targets.iter().map(|s| ClassName::from(s.as_str())).collect()),
		};

		let mut directives = Vec::with_capacity(descriptor.methods.len() + descriptor.fields.len());
		for m in &descriptor.methods {
			directives.push(lower_method_meta(mixin_tree, m).with_context(|| format!("lowering directive on mixin {}", mixin_tree.name))?);
		}
		for f in &descriptor.fields {
			directives.push(lower_field_meta(f));
		}

		Ok(MixinEntry {
			mixin_class: mixin_tree.name.clone(),
			matcher,
			replace_all_methods: descriptor.replace_all_methods.as_ref().map(|r| ReplaceAllMethods { remove_sync: r.remove_sync }),
			directives,
		})
	}

	pub fn matches(&self, target: &ClassName) -> bool {
		self.matcher.matches(target)
	}
}

/// Resolves mixin classfile bytes by internal name, used by the inline code
/// generator (D) and by whoever loads the mixin trees before registration.
pub trait MixinClassSource {
	fn get(&self, name: &ClassName) -> Result<ClassFile>;
}

impl MixinClassSource for HashMap<ClassName, ClassFile> {
	fn get(&self, name: &ClassName) -> Result<ClassFile> {
		self.get(name).cloned().with_context(|| format!("no mixin class bytes registered for {name}"))
	}
}

#[cfg(test)]
mod tests {
	use classfile::tree::class::{ClassAccess, ClassFile};
	use classfile::tree::method::{Method, MethodAccess};
	use pretty_assertions::assert_eq;

	use super::*;

	fn mixin_tree() -> ClassFile {
		let mut tree = ClassFile::new(52, 0, ClassAccess::default(), ClassName::from("test/ExampleMixin"), Some(ClassName::from("java/lang/Object")), vec![]);
		tree.methods.push(Method::new(MethodAccess { is_public: true, ..Default::default() }, MethodName::from("onHead"), MethodDescriptor::from("(Lmixin/CallbackInfo;)V")));
		tree
	}

	#[test]
	fn resolves_unique_handler() {
		let tree = mixin_tree();
		let resolved = resolve_handler(&tree, "onHead").unwrap();
		assert_eq!(resolved.desc, MethodDescriptor::from("(Lmixin/CallbackInfo;)V"));
	}

	#[test]
	fn missing_handler_errors() {
		let tree = mixin_tree();
		assert!(resolve_handler(&tree, "missing").is_err());
	}

	#[test]
	fn shadow_strips_prefix_by_default() {
		assert_eq!(shadow_target_name("shadow_count", None), MethodName::from("count"));
		assert_eq!(shadow_target_name("notPrefixed", None), MethodName::from("notPrefixed"));
		assert_eq!(shadow_target_name("shadow_count", Some("realCount")), MethodName::from("realCount"));
	}

	#[test]
	fn method_key_matches_name_only_when_desc_absent() {
		let key = MethodKey::parse("testC0");
		assert!(key.matches(&MethodName::from("testC0"), &MethodDescriptor::from("(Ljava/lang/String;)Ljava/lang/String;")));
		assert!(!key.matches(&MethodName::from("other"), &MethodDescriptor::from("()V")));
	}
}
