//! Validated newtype wrappers around [`String`] for the various name and
//! descriptor kinds that appear in a classfile constant pool.
//!
//! Mirrors the `make_string_str_like!` pattern used throughout duke-style
//! classfile trees: every kind gets its own type so a [`ClassName`] can never
//! be passed where a [`MethodDescriptor`] is expected, while still being
//! cheap to construct from a plain `&str` at the call site.

/// Declares a validated string newtype.
///
/// `$check` receives the raw `&str` and returns `Ok(())` or a message
/// describing why the value is invalid.
macro_rules! string_like {
	($(#[$meta:meta])* $name:ident, $check:expr) => {
		$(#[$meta])*
		#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
		pub struct $name(String);

		impl $name {
			pub fn new(s: impl Into<String>) -> anyhow::Result<$name> {
				let s = s.into();
				let check: fn(&str) -> anyhow::Result<()> = $check;
				check(&s)?;
				Ok($name(s))
			}

			pub fn as_str(&self) -> &str {
				&self.0
			}
		}

		impl From<&str> for $name {
			fn from(s: &str) -> Self {
				$name(s.to_owned())
			}
		}

		impl From<String> for $name {
			fn from(s: String) -> Self {
				$name(s)
			}
		}

		impl From<$name> for String {
			fn from(v: $name) -> Self {
				v.0
			}
		}

		impl std::fmt::Display for $name {
			fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
				f.write_str(&self.0)
			}
		}

		impl std::borrow::Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}

		impl PartialEq<str> for $name {
			fn eq(&self, other: &str) -> bool {
				self.0 == other
			}
		}
		impl PartialEq<&str> for $name {
			fn eq(&self, other: &&str) -> bool {
				self.0 == *other
			}
		}
	};
}

fn no_check(_s: &str) -> anyhow::Result<()> {
	Ok(())
}

string_like!(
	/// A slash-separated internal class name, e.g. `java/lang/Object`.
	ClassName,
	no_check
);

impl ClassName {
	pub const JAVA_LANG_OBJECT: &'static str = "java/lang/Object";

	/// The part of the name after the last `/`.
	pub fn simple_name(&self) -> &str {
		self.0.rsplit_once('/').map_or(self.0.as_str(), |(_, s)| s)
	}
}

string_like!(
	/// The unqualified name of a method, or one of `<init>`/`<clinit>`.
	MethodName,
	no_check
);

impl MethodName {
	pub const INIT: &'static str = "<init>";
	pub const CLINIT: &'static str = "<clinit>";

	pub fn is_constructor(&self) -> bool {
		self.0 == Self::INIT
	}
}

string_like!(
	/// A JVM method descriptor, e.g. `(Ljava/lang/String;I)V`.
	MethodDescriptor,
	no_check
);

string_like!(
	/// The unqualified name of a field.
	FieldName,
	no_check
);

string_like!(
	/// A JVM field descriptor, e.g. `Ljava/lang/String;` or `I`.
	FieldDescriptor,
	no_check
);
