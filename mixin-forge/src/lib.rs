//! A declarative bytecode transformer: mixins describe structural edits to
//! apply to target classes, and this crate rewrites a [`classfile::tree::class::ClassFile`]
//! tree to match.
//!
//! Built on top of the `classfile` crate's tree, reader and writer; this
//! crate never reads or writes raw bytes itself except through that crate.

pub mod bytecode;
pub mod callback;
pub mod context;
pub mod directive;
pub mod inline;
pub mod labels;
pub mod registry;
pub mod runtime;
pub mod transform;

pub mod injectors;

pub use directive::{Directive, MixinClassSource, MixinDescriptor, MixinEntry};
pub use registry::Registry;
pub use transform::{Diagnostic, TransformOutcome, Transformer};
