//! Parsing of JVM field and method descriptors into a structured [`JType`].
//!
//! Grounded in the same split-on-shape approach duke's descriptor module
//! uses: descriptors are a small recursive-descent grammar over raw bytes
//! of the class name, there's no need for a general parser library.

use anyhow::{bail, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JType {
	Boolean,
	Byte,
	Char,
	Short,
	Int,
	Long,
	Float,
	Double,
	/// Holds the internal class name, without the leading `L` or trailing `;`.
	Reference(String),
	Array(Box<JType>),
}

impl JType {
	/// The number of local-variable / operand-stack slots this type occupies.
	pub fn category(&self) -> u8 {
		match self {
			JType::Long | JType::Double => 2,
			_ => 1,
		}
	}

	pub fn is_primitive(&self) -> bool {
		!matches!(self, JType::Reference(_) | JType::Array(_))
	}
}

/// Parses a single field descriptor, e.g. `I`, `Ljava/lang/String;`, `[[I`.
pub fn parse_field_descriptor(s: &str) -> Result<JType> {
	let (ty, rest) = parse_one(s)?;
	if !rest.is_empty() {
		bail!("trailing data after field descriptor {s:?}: {rest:?}");
	}
	Ok(ty)
}

/// Parses a method descriptor into its parameter types and return type.
/// The return type is `None` for `V` (void).
pub fn parse_method_descriptor(s: &str) -> Result<(Vec<JType>, Option<JType>)> {
	let mut rest = s.strip_prefix('(').ok_or_else(|| anyhow::anyhow!("method descriptor {s:?} doesn't start with '('"))?;
	let mut params = Vec::new();
	while !rest.starts_with(')') {
		let (ty, tail) = parse_one(rest)?;
		params.push(ty);
		rest = tail;
	}
	rest = &rest[1..]; // skip ')'
	if rest == "V" {
		Ok((params, None))
	} else {
		let (ty, tail) = parse_one(rest)?;
		if !tail.is_empty() {
			bail!("trailing data after method descriptor {s:?}: {tail:?}");
		}
		Ok((params, Some(ty)))
	}
}

fn parse_one(s: &str) -> Result<(JType, &str)> {
	let mut chars = s.char_indices();
	let (_, first) = chars.next().ok_or_else(|| anyhow::anyhow!("empty descriptor"))?;
	match first {
		'Z' => Ok((JType::Boolean, &s[1..])),
		'B' => Ok((JType::Byte, &s[1..])),
		'C' => Ok((JType::Char, &s[1..])),
		'S' => Ok((JType::Short, &s[1..])),
		'I' => Ok((JType::Int, &s[1..])),
		'J' => Ok((JType::Long, &s[1..])),
		'F' => Ok((JType::Float, &s[1..])),
		'D' => Ok((JType::Double, &s[1..])),
		'L' => {
			let end = s.find(';').ok_or_else(|| anyhow::anyhow!("unterminated reference descriptor in {s:?}"))?;
			Ok((JType::Reference(s[1..end].to_owned()), &s[end + 1..]))
		}
		'[' => {
			let (inner, rest) = parse_one(&s[1..])?;
			Ok((JType::Array(Box::new(inner)), rest))
		}
		other => bail!("unknown descriptor character {other:?} in {s:?}"),
	}
}

/// Splits a method-reference string of the shape `owner.name(desc)` or bare
/// `name` into its parts, as used for the `method`/`target` strings that
/// appear in directive metadata. Missing parts come back as empty strings,
/// never as an error: callers fall back to name-only matching.
pub fn method_reference_parse(sig: &str) -> (String, String, String) {
	let (head, descriptor) = match sig.find('(') {
		Some(idx) => (&sig[..idx], sig[idx..].to_owned()),
		None => (sig, String::new()),
	};

	let split_at = head.rfind(|c| c == '.' || c == '/').map(|i| i + 1);
	match split_at {
		Some(idx) if idx > 0 => (head[..idx - 1].to_owned(), head[idx..].to_owned(), descriptor),
		_ => (String::new(), head.to_owned(), descriptor),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn field_descriptors() {
		assert_eq!(parse_field_descriptor("I").unwrap(), JType::Int);
		assert_eq!(parse_field_descriptor("[I").unwrap(), JType::Array(Box::new(JType::Int)));
		assert_eq!(parse_field_descriptor("Ljava/lang/String;").unwrap(), JType::Reference("java/lang/String".to_owned()));
		assert_eq!(parse_field_descriptor("[[Ljava/lang/String;").unwrap(), JType::Array(Box::new(JType::Array(Box::new(JType::Reference("java/lang/String".to_owned()))))));
	}

	#[test]
	fn method_descriptors() {
		let (params, ret) = parse_method_descriptor("(Ljava/lang/String;I)V").unwrap();
		assert_eq!(params, vec![JType::Reference("java/lang/String".to_owned()), JType::Int]);
		assert_eq!(ret, None);

		let (params, ret) = parse_method_descriptor("()I").unwrap();
		assert!(params.is_empty());
		assert_eq!(ret, Some(JType::Int));
	}

	#[test]
	fn reference_parse() {
		assert_eq!(method_reference_parse("a/b/C.foo(I)V"), ("a/b/C".to_owned(), "foo".to_owned(), "(I)V".to_owned()));
		assert_eq!(method_reference_parse("foo"), (String::new(), "foo".to_owned(), String::new()));
		assert_eq!(method_reference_parse("foo(I)V"), (String::new(), "foo".to_owned(), "(I)V".to_owned()));
	}
}
