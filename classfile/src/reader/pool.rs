use anyhow::{bail, Context, Result};
use crate::strings::{ClassName, FieldDescriptor, FieldName, MethodDescriptor, MethodName};
use crate::tree::field::FieldRef;
use crate::tree::method::MethodRef;
use crate::tree::method::code::{ConstantDynamic, Handle, Loadable};

#[derive(Debug, Clone)]
pub(crate) enum RawEntry {
	Utf8(String),
	Integer(i32),
	Float(f32),
	Long(i64),
	Double(f64),
	Class { name_index: u16 },
	String { string_index: u16 },
	FieldRef { class_index: u16, name_and_type_index: u16 },
	MethodRef { class_index: u16, name_and_type_index: u16, is_interface: bool },
	NameAndType { name_index: u16, descriptor_index: u16 },
	MethodHandle { reference_kind: u8, reference_index: u16 },
	MethodType { descriptor_index: u16 },
	Dynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
	InvokeDynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
	/// Occupies the slot after a `Long`/`Double` entry; any index into it is invalid.
	Tombstone,
}

/// A single entry of the class-level `BootstrapMethods` attribute: a
/// `MethodHandle` pool index plus the pool indices of its static arguments.
#[derive(Debug, Clone)]
pub(crate) struct BootstrapMethod {
	pub handle_index: u16,
	pub arg_indices: Vec<u16>,
}

/// Constant-dynamic resolution can in principle reference another constant
/// dynamic among its arguments; real-world classfiles never nest this deep,
/// so a small bound keeps a malformed or adversarial classfile from
/// recursing without limit.
const MAX_DYNAMIC_RESOLUTION_DEPTH: u32 = 8;

/// A parsed constant pool, still addressed by its 1-based classfile indices.
///
/// Resolution (turning a `Fieldref` index into an actual [`FieldRef`]) is
/// done lazily on demand rather than up front, the same way duke's reader
/// keeps the raw entries around and only builds tree types for the handful
/// of entries actually referenced by code that's visited.
pub struct ConstantPool {
	pub(crate) entries: Vec<RawEntry>, // index 0 is unused, matches the 1-based pool
}

impl ConstantPool {
	fn entry(&self, index: u16) -> Result<&RawEntry> {
		self.entries.get(index as usize).context("constant pool index out of range")
	}

	pub fn utf8(&self, index: u16) -> Result<&str> {
		match self.entry(index)? {
			RawEntry::Utf8(s) => Ok(s),
			other => bail!("expected Utf8 constant at index {index}, found {other:?}"),
		}
	}

	pub fn class_name(&self, index: u16) -> Result<ClassName> {
		match self.entry(index)? {
			RawEntry::Class { name_index } => Ok(ClassName::from(self.utf8(*name_index)?)),
			other => bail!("expected Class constant at index {index}, found {other:?}"),
		}
	}

	pub(crate) fn name_and_type(&self, index: u16) -> Result<(&str, &str)> {
		match self.entry(index)? {
			RawEntry::NameAndType { name_index, descriptor_index } => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
			other => bail!("expected NameAndType constant at index {index}, found {other:?}"),
		}
	}

	pub fn field_ref(&self, index: u16) -> Result<FieldRef> {
		match self.entry(index)? {
			RawEntry::FieldRef { class_index, name_and_type_index } => {
				let class = self.class_name(*class_index)?;
				let (name, desc) = self.name_and_type(*name_and_type_index)?;
				Ok(FieldRef { class, name: FieldName::from(name), desc: FieldDescriptor::from(desc) })
			}
			other => bail!("expected Fieldref constant at index {index}, found {other:?}"),
		}
	}

	/// Resolves a Methodref/InterfaceMethodref, returning whether it was the
	/// interface variant alongside the resolved reference.
	pub fn method_ref(&self, index: u16) -> Result<(MethodRef, bool)> {
		match self.entry(index)? {
			RawEntry::MethodRef { class_index, name_and_type_index, is_interface } => {
				let class = self.class_name(*class_index)?;
				let (name, desc) = self.name_and_type(*name_and_type_index)?;
				Ok((MethodRef { class, name: MethodName::from(name), desc: MethodDescriptor::from(desc) }, *is_interface))
			}
			other => bail!("expected Methodref constant at index {index}, found {other:?}"),
		}
	}

	/// The `(bootstrap_method_attr_index, name_and_type_index)` of an
	/// `InvokeDynamic` pool entry, for the code reader to pair with the
	/// class's `BootstrapMethods` attribute.
	pub(crate) fn invoke_dynamic_parts(&self, index: u16) -> Result<(u16, u16)> {
		match self.entry(index)? {
			RawEntry::InvokeDynamic { bootstrap_method_attr_index, name_and_type_index } => Ok((*bootstrap_method_attr_index, *name_and_type_index)),
			other => bail!("expected InvokeDynamic constant at index {index}, found {other:?}"),
		}
	}

	pub fn loadable(&self, index: u16, bootstrap_methods: &[BootstrapMethod]) -> Result<Loadable> {
		self.loadable_at_depth(index, bootstrap_methods, 0)
	}

	fn loadable_at_depth(&self, index: u16, bootstrap_methods: &[BootstrapMethod], depth: u32) -> Result<Loadable> {
		match self.entry(index)?.clone() {
			RawEntry::Integer(v) => Ok(Loadable::Integer(v)),
			RawEntry::Float(v) => Ok(Loadable::Float(v)),
			RawEntry::Long(v) => Ok(Loadable::Long(v)),
			RawEntry::Double(v) => Ok(Loadable::Double(v)),
			RawEntry::Class { name_index } => Ok(Loadable::Class(ClassName::from(self.utf8(name_index)?))),
			RawEntry::String { string_index } => Ok(Loadable::String(self.utf8(string_index)?.to_owned())),
			RawEntry::MethodType { descriptor_index } => Ok(Loadable::MethodType(MethodDescriptor::from(self.utf8(descriptor_index)?))),
			RawEntry::MethodHandle { reference_kind, reference_index } => Ok(Loadable::MethodHandle(self.method_handle(reference_kind, reference_index)?)),
			RawEntry::Dynamic { bootstrap_method_attr_index, name_and_type_index } => {
				if depth >= MAX_DYNAMIC_RESOLUTION_DEPTH {
					bail!("constant dynamic at index {index} nests deeper than {MAX_DYNAMIC_RESOLUTION_DEPTH} levels");
				}
				let (name, desc) = self.name_and_type(name_and_type_index)?;
				let bootstrap = bootstrap_methods.get(bootstrap_method_attr_index as usize).context("Dynamic constant refers to an out-of-range bootstrap method")?;
				let handle = self.resolve_method_handle_entry(bootstrap.handle_index)?;
				let arguments = bootstrap.arg_indices.iter().map(|&idx| self.loadable_at_depth(idx, bootstrap_methods, depth + 1)).collect::<Result<Vec<_>>>()?;
				Ok(Loadable::Dynamic(ConstantDynamic { name: name.to_owned(), descriptor: FieldDescriptor::from(desc), handle, arguments }))
			}
			other => bail!("constant at index {index} is not loadable via ldc: {other:?}"),
		}
	}

	/// Resolves a pool index that is itself a `MethodHandle` entry.
	pub(crate) fn resolve_method_handle_entry(&self, index: u16) -> Result<Handle> {
		match self.entry(index)? {
			RawEntry::MethodHandle { reference_kind, reference_index } => self.method_handle(*reference_kind, *reference_index),
			other => bail!("expected MethodHandle constant at index {index}, found {other:?}"),
		}
	}

	fn method_handle(&self, kind: u8, index: u16) -> Result<Handle> {
		Ok(match kind {
			1 => Handle::GetField(self.field_ref(index)?),
			2 => Handle::GetStatic(self.field_ref(index)?),
			3 => Handle::PutField(self.field_ref(index)?),
			4 => Handle::PutStatic(self.field_ref(index)?),
			5 => Handle::InvokeVirtual(self.method_ref(index)?.0),
			6 => { let (m, _) = self.method_ref(index)?; Handle::InvokeStatic(m, false) }
			7 => { let (m, is_if) = self.method_ref(index)?; Handle::InvokeSpecial(m, is_if) }
			8 => Handle::NewInvokeSpecial(self.method_ref(index)?.0),
			9 => Handle::InvokeInterface(self.method_ref(index)?.0),
			other => bail!("unknown method handle reference kind {other}"),
		})
	}
}
