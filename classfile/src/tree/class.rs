use crate::strings::ClassName;
use crate::tree::attribute::RawAttribute;
use crate::tree::field::Field;
use crate::tree::method::Method;

/// A mutable tree representation of a single classfile.
///
/// Unlike duke's visitor-driven `ClassFile`, this tree is built to be edited
/// in place: a transformer reads one in from bytes, mutates its `fields` and
/// `methods` vectors and the `Code` of individual methods, then hands it to
/// the writer.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
	pub major_version: u16,
	pub minor_version: u16,

	pub access: ClassAccess,
	pub name: ClassName,
	pub super_class: Option<ClassName>,
	pub interfaces: Vec<ClassName>,

	pub fields: Vec<Field>,
	pub methods: Vec<Method>,

	pub has_synthetic_attribute: bool,
	pub has_deprecated_attribute: bool,

	pub signature: Option<String>,
	pub source_file: Option<String>,

	pub attributes: Vec<RawAttribute>,
}

impl ClassFile {
	pub fn new(major_version: u16, minor_version: u16, access: ClassAccess, name: ClassName, super_class: Option<ClassName>, interfaces: Vec<ClassName>) -> ClassFile {
		ClassFile {
			major_version,
			minor_version,
			access,
			name,
			super_class,
			interfaces,
			fields: Vec::new(),
			methods: Vec::new(),
			has_synthetic_attribute: false,
			has_deprecated_attribute: false,
			signature: None,
			source_file: None,
			attributes: Vec::new(),
		}
	}

	pub fn find_method(&self, name: &str, descriptor: Option<&str>) -> Option<&Method> {
		self.methods.iter().find(|m| m.name.as_str() == name && descriptor.map_or(true, |d| m.descriptor.as_str() == d))
	}

	pub fn find_method_mut(&mut self, name: &str, descriptor: Option<&str>) -> Option<&mut Method> {
		self.methods.iter_mut().find(|m| m.name.as_str() == name && descriptor.map_or(true, |d| m.descriptor.as_str() == d))
	}

	pub fn find_field(&self, name: &str) -> Option<&Field> {
		self.fields.iter().find(|f| f.name.as_str() == name)
	}

	pub fn find_field_mut(&mut self, name: &str) -> Option<&mut Field> {
		self.fields.iter_mut().find(|f| f.name.as_str() == name)
	}

	/// The method keys available on this class, formatted `name(desc)`; used
	/// in diagnostics when a directive's target method can't be found.
	pub fn method_keys(&self) -> Vec<String> {
		self.methods.iter().map(|m| format!("{}{}", m.name, m.descriptor)).collect()
	}
}

#[derive(Copy, Clone, Default, PartialEq)]
pub struct ClassAccess {
	pub is_public: bool,
	pub is_final: bool,
	pub is_super: bool,
	pub is_interface: bool,
	pub is_abstract: bool,
	pub is_synthetic: bool,
	pub is_annotation: bool,
	pub is_enum: bool,
}

impl std::fmt::Debug for ClassAccess {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str("ClassAccess { ")?;
		if self.is_public { f.write_str("public ")?; }
		if self.is_final { f.write_str("final ")?; }
		if self.is_super { f.write_str("super ")?; }
		if self.is_interface { f.write_str("interface ")?; }
		if self.is_abstract { f.write_str("abstract ")?; }
		if self.is_synthetic { f.write_str("synthetic ")?; }
		if self.is_annotation { f.write_str("annotation ")?; }
		if self.is_enum { f.write_str("enum ")?; }
		f.write_str("}")
	}
}

impl From<u16> for ClassAccess {
	fn from(value: u16) -> Self {
		ClassAccess {
			is_public: value & 0x0001 != 0,
			is_final: value & 0x0010 != 0,
			is_super: value & 0x0020 != 0,
			is_interface: value & 0x0200 != 0,
			is_abstract: value & 0x0400 != 0,
			is_synthetic: value & 0x1000 != 0,
			is_annotation: value & 0x2000 != 0,
			is_enum: value & 0x4000 != 0,
		}
	}
}

impl From<ClassAccess> for u16 {
	fn from(value: ClassAccess) -> Self {
		(if value.is_public { 0x0001 } else { 0 })
			| (if value.is_final { 0x0010 } else { 0 })
			| (if value.is_super { 0x0020 } else { 0 })
			| (if value.is_interface { 0x0200 } else { 0 })
			| (if value.is_abstract { 0x0400 } else { 0 })
			| (if value.is_synthetic { 0x1000 } else { 0 })
			| (if value.is_annotation { 0x2000 } else { 0 })
			| (if value.is_enum { 0x4000 } else { 0 })
	}
}
