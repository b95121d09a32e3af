//! Symbol and type data structures; pieces of data declared by routines and
//! inspected by the resolver and the workspace index.

use std::path::PathBuf;

use rustc_hash::FxHashMap;

use crate::{scan::Span, FxIndexMap, FxIndexSet};

/// The routine forms Strand knows about; the unit of local scoping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoutineKind {
	Procedure,
	Function,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolSource {
	User,
	Builtin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldDirection {
	Input,
	Output,
	Bidirectional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldSource {
	User,
	Inferred,
}

/// Case-insensitive identity for every name in the language.
#[must_use]
pub fn canonical(name: &str) -> String {
	name.to_ascii_lowercase()
}

/// A structural type descriptor.
///
/// Scalars carry an optional constant-folded literal `value`; structures
/// carry `fields`, which nest arbitrarily for structure-in-structure
/// literals. `name` is the canonical spelling, `display` the user's.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TypeSpec {
	pub display: String,
	pub name: String,
	pub args: Vec<TypeSpec>,
	pub fields: FxIndexMap<String, FieldSpec>,
	pub value: Option<Box<str>>,
}

pub(crate) const TY_INT: &str = "Int";
pub(crate) const TY_FLOAT: &str = "Float";
pub(crate) const TY_STRING: &str = "String";
pub(crate) const TY_STRUCTURE: &str = "Structure";

impl TypeSpec {
	#[must_use]
	pub(crate) fn scalar(name: &str) -> Self {
		Self {
			display: name.to_string(),
			name: name.to_string(),
			..Self::default()
		}
	}

	#[must_use]
	pub(crate) fn with_value(name: &str, value: &str) -> Self {
		Self {
			value: Some(value.into()),
			..Self::scalar(name)
		}
	}

	#[must_use]
	pub(crate) fn structure() -> Self {
		Self::scalar(TY_STRUCTURE)
	}

	#[must_use]
	pub fn is_structure(&self) -> bool {
		self.name == TY_STRUCTURE
	}

	/// Shape equality: same canonical name, same type arguments, same field
	/// names with same-shaped field types. Literal values are not part of a
	/// type's shape.
	#[must_use]
	pub(crate) fn same_shape(&self, other: &Self) -> bool {
		if self.name != other.name || self.args.len() != other.args.len() {
			return false;
		}

		if !self
			.args
			.iter()
			.zip(&other.args)
			.all(|(a, b)| a.same_shape(b))
		{
			return false;
		}

		if self.fields.len() != other.fields.len() {
			return false;
		}

		self.fields.iter().all(|(name, field)| {
			other.fields.get(name).is_some_and(|o_field| {
				field.types.len() == o_field.types.len()
					&& field
						.types
						.iter()
						.zip(&o_field.types)
						.all(|(a, b)| a.same_shape(b))
			})
		})
	}
}

/// One field of a structural type.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
	pub display: String,
	pub types: Vec<TypeSpec>,
	pub direction: FieldDirection,
	pub source: FieldSource,
	pub docs: String,
	pub span: Span,
}

/// A positional argument or keyword in a routine signature.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
	pub display: String,
	pub name: String,
	pub keyword: bool,
	pub span: Span,
}

/// A workspace-visible routine definition.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalSymbol {
	pub kind: RoutineKind,
	pub name: String,
	pub display: String,
	pub file: PathBuf,
	pub span: Span,
	pub args: Vec<ParamSpec>,
	pub kws: Vec<ParamSpec>,
	pub docs: String,
	pub source: SymbolSource,
	/// Structure fields this routine traffics in, when it returns or fills
	/// in a structure.
	pub fields: Vec<FieldSpec>,
}

/// A variable binding scoped to one routine body (or the main program).
#[derive(Debug, Clone, PartialEq)]
pub struct LocalSymbol {
	pub name: String,
	pub display: String,
	pub span: Span,
	pub usage: Vec<Span>,
	/// Every distinct type shape this variable was seen holding, in order of
	/// first occurrence.
	pub types: Vec<TypeSpec>,
	/// Whether the variable was ever explicitly assigned, as opposed to only
	/// being read.
	pub defined: bool,
}

impl LocalSymbol {
	pub(crate) fn merge_types(&mut self, incoming: Vec<TypeSpec>) {
		for ty in incoming {
			if !self.types.iter().any(|have| have.same_shape(&ty)) {
				self.types.push(ty);
			}
		}
	}
}

pub type LocalScope = FxIndexMap<String, LocalSymbol>;

/// Local symbol tables keyed by routine kind, then canonical routine name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalTables {
	pub func: FxHashMap<String, LocalScope>,
	pub pro: FxHashMap<String, LocalScope>,
	pub main: LocalScope,
}

/// Compile directives per routine, plus the main program's own list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompileOpts {
	pub func: FxHashMap<String, Vec<String>>,
	pub pro: FxHashMap<String, Vec<String>>,
	pub main: Vec<String>,
}

/// Names referenced but not resolvable within the file that referenced them,
/// split by call form. Resolved (or not) later against the workspace table;
/// never reported as "undefined" at single-file time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Uses {
	pub func: FxIndexSet<String>,
	pub pro: FxIndexSet<String>,
}

impl Uses {
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.func.is_empty() && self.pro.is_empty()
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn shape_ignores_values() {
		let a = TypeSpec::with_value(TY_STRING, "hello");
		let b = TypeSpec::with_value(TY_STRING, "world");
		assert!(a.same_shape(&b));
		assert!(!a.same_shape(&TypeSpec::scalar(TY_INT)));
	}

	#[test]
	fn shape_compares_field_names() {
		let field = |name: &str| FieldSpec {
			display: name.to_string(),
			types: vec![TypeSpec::scalar(TY_INT)],
			direction: FieldDirection::Bidirectional,
			source: FieldSource::User,
			docs: String::new(),
			span: Span::default(),
		};

		let mut a = TypeSpec::structure();
		a.fields.insert("x".to_string(), field("x"));

		let mut b = TypeSpec::structure();
		b.fields.insert("x".to_string(), field("x"));

		assert!(a.same_shape(&b));

		b.fields.insert("y".to_string(), field("y"));
		assert!(!a.same_shape(&b));
	}

	#[test]
	fn merge_keeps_first_seen_order() {
		let mut local = LocalSymbol {
			name: "v".to_string(),
			display: "v".to_string(),
			span: Span::default(),
			usage: vec![],
			types: vec![TypeSpec::scalar(TY_INT)],
			defined: true,
		};

		local.merge_types(vec![TypeSpec::scalar(TY_STRING)]);
		local.merge_types(vec![TypeSpec::scalar(TY_INT)]);

		let names: Vec<_> = local.types.iter().map(|t| t.name.as_str()).collect();
		assert_eq!(names, vec![TY_INT, TY_STRING]);
	}
}
