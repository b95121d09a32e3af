//! # StrandLS Core
//!
//! The language analysis engine that underpins Strand editor tooling:
//! tokenization, syntax tree construction with error recovery, post-parse
//! validation, scope and structural type resolution, and a checksum-keyed,
//! cancellable workspace index. Host integration (RPC framing, file watching,
//! rendering) lives with the consumers of this crate.

use std::hash::BuildHasherDefault;

use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHasher;

pub mod cancel;
pub mod checksum;
pub mod diag;
pub mod error;
pub mod index;
pub mod parser;
pub mod scan;
pub mod semtok;
pub mod sym;
pub mod syntax;
pub mod validate;

mod builtins;
mod front;
mod lines;

#[cfg(test)]
mod test;

pub type ErrorBox = Box<dyn std::error::Error + Send + Sync>;
pub type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;
pub type FxIndexSet<T> = IndexSet<T, BuildHasherDefault<FxHasher>>;

pub use cancel::CancellationToken;
pub use error::Error;
pub use index::{IndexOptions, WorkspaceIndex};
pub use parser::{parse, parse_file, ParseOptions, ParsedResult};
