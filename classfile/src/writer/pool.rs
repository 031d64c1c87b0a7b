use std::collections::HashMap;

use indexmap::IndexSet;

use crate::strings::{ClassName, FieldDescriptor, FieldName, MethodDescriptor, MethodName};
use crate::tree::field::FieldRef;
use crate::tree::method::MethodRef;
use crate::tree::method::code::{ConstantDynamic, Handle, InvokeDynamic, Loadable};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Entry {
	Utf8(String),
	Integer(i32),
	Float(u32), // bit pattern, so NaN payloads hash/compare consistently
	Long(i64),
	Double(u64),
	Class(u16),
	String(u16),
	FieldRef(u16, u16),
	MethodRef(u16, u16, bool),
	NameAndType(u16, u16),
	MethodHandle(u8, u16),
	MethodType(u16),
	Dynamic(u16, u16),
	InvokeDynamic(u16, u16),
}

/// Builds a deduplicated constant pool in the order entries are first
/// requested, same as a typical bytecode writer: nothing is pre-sorted or
/// grouped by kind, callers just intern what they reference.
///
/// Indices are assigned immediately on first insertion (tracked via
/// `next_slot`) rather than derived from storage position afterwards, since
/// a `Long`/`Double` entry consumes two pool slots and every entry inserted
/// after it needs its index shifted accordingly.
#[derive(Default)]
pub(crate) struct PoolBuilder {
	order: Vec<Entry>,
	indices: HashMap<Entry, u16>,
	next_slot: u16,
	bootstrap_methods: IndexSet<(u16, Vec<u16>)>,
}

impl PoolBuilder {
	pub(crate) fn new() -> PoolBuilder {
		PoolBuilder { next_slot: 1, ..PoolBuilder::default() }
	}

	fn intern(&mut self, entry: Entry) -> u16 {
		if let Some(&index) = self.indices.get(&entry) {
			return index;
		}
		let index = self.next_slot;
		let wide = matches!(entry, Entry::Long(_) | Entry::Double(_));
		self.next_slot += if wide { 2 } else { 1 };
		self.indices.insert(entry.clone(), index);
		self.order.push(entry);
		index
	}

	pub(crate) fn utf8(&mut self, s: &str) -> u16 {
		self.intern(Entry::Utf8(s.to_owned()))
	}

	pub(crate) fn class(&mut self, name: &ClassName) -> u16 {
		let name_index = self.utf8(name.as_str());
		self.intern(Entry::Class(name_index))
	}

	pub(crate) fn string(&mut self, s: &str) -> u16 {
		let index = self.utf8(s);
		self.intern(Entry::String(index))
	}

	pub(crate) fn integer(&mut self, v: i32) -> u16 {
		self.intern(Entry::Integer(v))
	}

	pub(crate) fn float(&mut self, v: f32) -> u16 {
		self.intern(Entry::Float(v.to_bits()))
	}

	pub(crate) fn long(&mut self, v: i64) -> u16 {
		self.intern(Entry::Long(v))
	}

	pub(crate) fn double(&mut self, v: f64) -> u16 {
		self.intern(Entry::Double(v.to_bits()))
	}

	pub(crate) fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
		let name_index = self.utf8(name);
		let descriptor_index = self.utf8(descriptor);
		self.intern(Entry::NameAndType(name_index, descriptor_index))
	}

	pub(crate) fn field_ref(&mut self, field: &FieldRef) -> u16 {
		let class_index = self.class(&field.class);
		let nat_index = self.name_and_type(field.name.as_str(), field.desc.as_str());
		self.intern(Entry::FieldRef(class_index, nat_index))
	}

	pub(crate) fn method_ref(&mut self, method: &MethodRef, is_interface: bool) -> u16 {
		let class_index = self.class(&method.class);
		let nat_index = self.name_and_type(method.name.as_str(), method.desc.as_str());
		self.intern(Entry::MethodRef(class_index, nat_index, is_interface))
	}

	pub(crate) fn method_type(&mut self, descriptor: &MethodDescriptor) -> u16 {
		let index = self.utf8(descriptor.as_str());
		self.intern(Entry::MethodType(index))
	}

	pub(crate) fn handle(&mut self, handle: &Handle) -> u16 {
		let (kind, index) = match handle {
			Handle::GetField(f) => (1, self.field_ref(f)),
			Handle::GetStatic(f) => (2, self.field_ref(f)),
			Handle::PutField(f) => (3, self.field_ref(f)),
			Handle::PutStatic(f) => (4, self.field_ref(f)),
			Handle::InvokeVirtual(m) => (5, self.method_ref(m, false)),
			Handle::InvokeStatic(m, is_if) => (6, self.method_ref(m, *is_if)),
			Handle::InvokeSpecial(m, is_if) => (7, self.method_ref(m, *is_if)),
			Handle::NewInvokeSpecial(m) => (8, self.method_ref(m, false)),
			Handle::InvokeInterface(m) => (9, self.method_ref(m, true)),
		};
		self.intern(Entry::MethodHandle(kind, index))
	}

	pub(crate) fn loadable(&mut self, value: &Loadable) -> u16 {
		match value {
			Loadable::Integer(v) => self.integer(*v),
			Loadable::Float(v) => self.float(*v),
			Loadable::Long(v) => self.long(*v),
			Loadable::Double(v) => self.double(*v),
			Loadable::Class(c) => self.class(c),
			Loadable::String(s) => self.string(s),
			Loadable::MethodHandle(h) => self.handle(h),
			Loadable::MethodType(d) => self.method_type(d),
			Loadable::Dynamic(d) => self.dynamic(d),
		}
	}

	fn dynamic(&mut self, dynamic: &ConstantDynamic) -> u16 {
		let bootstrap_index = self.bootstrap_method(&dynamic.handle, &dynamic.arguments);
		let nat_index = self.name_and_type(&dynamic.name, dynamic.descriptor.as_str());
		self.intern(Entry::Dynamic(bootstrap_index, nat_index))
	}

	pub(crate) fn invoke_dynamic(&mut self, invoke: &InvokeDynamic) -> u16 {
		let bootstrap_index = self.bootstrap_method(&invoke.handle, &invoke.arguments);
		let nat_index = self.name_and_type(invoke.name.as_str(), invoke.descriptor.as_str());
		self.intern(Entry::InvokeDynamic(bootstrap_index, nat_index))
	}

	fn bootstrap_method(&mut self, handle: &Handle, arguments: &[Loadable]) -> u16 {
		let handle_index = self.handle(handle);
		let arg_indices: Vec<u16> = arguments.iter().map(|a| self.loadable(a)).collect();
		let (index, _) = self.bootstrap_methods.insert_full((handle_index, arg_indices));
		index as u16
	}

	pub(crate) fn field_name(&mut self, name: &FieldName) -> u16 {
		self.utf8(name.as_str())
	}

	pub(crate) fn method_name(&mut self, name: &MethodName) -> u16 {
		self.utf8(name.as_str())
	}

	pub(crate) fn field_descriptor(&mut self, d: &FieldDescriptor) -> u16 {
		self.utf8(d.as_str())
	}

	pub(crate) fn method_descriptor(&mut self, d: &MethodDescriptor) -> u16 {
		self.utf8(d.as_str())
	}

	/// Serializes the accumulated constant pool and bootstrap method table.
	/// Must be called only after every other part of the class has been
	/// visited, since constants are discovered while walking methods.
	pub(crate) fn finish(&self) -> (Vec<u8>, u16, Vec<u8>) {
		let mut pool_bytes = Vec::new();
		let count = self.next_slot;

		for entry in &self.order {
			match entry {
				Entry::Utf8(s) => {
					pool_bytes.push(1);
					pool_bytes.extend((s.len() as u16).to_be_bytes());
					pool_bytes.extend(s.as_bytes());
				}
				Entry::Integer(v) => {
					pool_bytes.push(3);
					pool_bytes.extend(v.to_be_bytes());
				}
				Entry::Float(bits) => {
					pool_bytes.push(4);
					pool_bytes.extend(bits.to_be_bytes());
				}
				Entry::Long(v) => {
					pool_bytes.push(5);
					pool_bytes.extend(v.to_be_bytes());
				}
				Entry::Double(bits) => {
					pool_bytes.push(6);
					pool_bytes.extend(bits.to_be_bytes());
				}
				Entry::Class(name_index) => {
					pool_bytes.push(7);
					pool_bytes.extend(name_index.to_be_bytes());
				}
				Entry::String(index) => {
					pool_bytes.push(8);
					pool_bytes.extend(index.to_be_bytes());
				}
				Entry::FieldRef(c, nat) => {
					pool_bytes.push(9);
					pool_bytes.extend(c.to_be_bytes());
					pool_bytes.extend(nat.to_be_bytes());
				}
				Entry::MethodRef(c, nat, is_interface) => {
					pool_bytes.push(if *is_interface { 11 } else { 10 });
					pool_bytes.extend(c.to_be_bytes());
					pool_bytes.extend(nat.to_be_bytes());
				}
				Entry::NameAndType(n, d) => {
					pool_bytes.push(12);
					pool_bytes.extend(n.to_be_bytes());
					pool_bytes.extend(d.to_be_bytes());
				}
				Entry::MethodHandle(kind, index) => {
					pool_bytes.push(15);
					pool_bytes.push(*kind);
					pool_bytes.extend(index.to_be_bytes());
				}
				Entry::MethodType(index) => {
					pool_bytes.push(16);
					pool_bytes.extend(index.to_be_bytes());
				}
				Entry::Dynamic(bootstrap, nat) => {
					pool_bytes.push(17);
					pool_bytes.extend(bootstrap.to_be_bytes());
					pool_bytes.extend(nat.to_be_bytes());
				}
				Entry::InvokeDynamic(bootstrap, nat) => {
					pool_bytes.push(18);
					pool_bytes.extend(bootstrap.to_be_bytes());
					pool_bytes.extend(nat.to_be_bytes());
				}
			}
		}

		let mut bootstrap_bytes = Vec::new();
		bootstrap_bytes.extend((self.bootstrap_methods.len() as u16).to_be_bytes());
		for (handle_index, args) in &self.bootstrap_methods {
			bootstrap_bytes.extend(handle_index.to_be_bytes());
			bootstrap_bytes.extend((args.len() as u16).to_be_bytes());
			for arg in args {
				bootstrap_bytes.extend(arg.to_be_bytes());
			}
		}

		(pool_bytes, count, bootstrap_bytes)
	}

	pub(crate) fn has_bootstrap_methods(&self) -> bool {
		!self.bootstrap_methods.is_empty()
	}
}
