/// An attribute this library doesn't model explicitly, kept around byte-for-byte
/// so that a round trip without any edits reproduces the original classfile.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAttribute {
	pub name: String,
	pub data: Vec<u8>,
}
