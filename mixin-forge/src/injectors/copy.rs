//! CopyInjector (§4.5): like Overwrite's body-copy path, but creates a new
//! method on the target rather than replacing an existing one.

use anyhow::{anyhow, Result};
use classfile::strings::{ClassName, MethodName};
use classfile::tree::class::ClassFile;
use classfile::tree::descriptor::parse_method_descriptor;
use classfile::tree::method::{Method, MethodNameAndDesc};

use crate::inline::{inline_body, InlineRequest, ShadowBindings};

pub fn apply(class: &mut ClassFile, mixin_class: &ClassName, target_name: &MethodName, handler: &MethodNameAndDesc, shadows: &ShadowBindings, source: &dyn crate::directive::MixinClassSource) -> Result<bool> {
	if class.find_method(target_name.as_str(), None).is_some() {
		return Err(anyhow!("Copy target {} already exists on {}", target_name, class.name));
	}

	let target_class_name = class.name.clone();
	let (handler_params, handler_return) = parse_method_descriptor(handler.desc.as_str())?;

	let mixin_tree = source.get(mixin_class)?;
	let handler_method = mixin_tree
		.find_method(handler.name.as_str(), Some(handler.desc.as_str()))
		.ok_or_else(|| anyhow!("Copy handler {}{} not found on mixin {}", handler.name, handler.desc, mixin_class))?;
	let target_is_static = handler_method.access.is_static;

	let req = InlineRequest {
		mixin_class,
		handler,
		target_class: &target_class_name,
		target_is_static,
		target_params: &handler_params,
		target_return: handler_return.as_ref(),
		shadows,
		source,
	};
	let new_code = inline_body(&req)?;

	let mut access = handler_method.access;
	access.is_abstract = false;
	access.is_native = false;
	let mut new_method = Method::new(access, target_name.clone(), handler.desc.clone());
	new_method.code = Some(new_code);
	class.methods.push(new_method);
	Ok(true)
}
