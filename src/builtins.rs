//! The builtin routine database: symbols every workspace sees without any
//! file declaring them. Registered once per index construction.

use std::path::PathBuf;

use rustc_hash::FxHashMap;

use crate::{
	scan::Span,
	sym::{GlobalSymbol, ParamSpec, RoutineKind, SymbolSource},
};

struct RawBuiltin {
	kind: RoutineKind,
	name: &'static str,
	args: &'static [&'static str],
	kws: &'static [&'static str],
	docs: &'static str,
}

const BUILTINS: &[RawBuiltin] = &[
	RawBuiltin {
		kind: RoutineKind::Procedure,
		name: "print",
		args: &["value"],
		kws: &[],
		docs: "Writes its arguments to the session console.",
	},
	RawBuiltin {
		kind: RoutineKind::Procedure,
		name: "plot",
		args: &["x", "y"],
		kws: &["thick", "title"],
		docs: "Draws a line plot of y against x.",
	},
	RawBuiltin {
		kind: RoutineKind::Procedure,
		name: "readtab",
		args: &["path", "out"],
		kws: &["delim"],
		docs: "Reads a delimited table from disk into `out`.",
	},
	RawBuiltin {
		kind: RoutineKind::Procedure,
		name: "writetab",
		args: &["path", "data"],
		kws: &["delim"],
		docs: "Writes a table back to disk.",
	},
	RawBuiltin {
		kind: RoutineKind::Function,
		name: "count",
		args: &["value"],
		kws: &[],
		docs: "Number of elements in a value; 0 for an undefined variable.",
	},
	RawBuiltin {
		kind: RoutineKind::Function,
		name: "defined",
		args: &["value"],
		kws: &[],
		docs: "1 if the variable has been assigned, otherwise 0.",
	},
	RawBuiltin {
		kind: RoutineKind::Function,
		name: "strlen",
		args: &["s"],
		kws: &[],
		docs: "Length of a string in characters.",
	},
	RawBuiltin {
		kind: RoutineKind::Function,
		name: "substr",
		args: &["s", "start", "len"],
		kws: &[],
		docs: "Extracts a substring.",
	},
	RawBuiltin {
		kind: RoutineKind::Function,
		name: "total",
		args: &["values"],
		kws: &[],
		docs: "Sum of all elements.",
	},
	RawBuiltin {
		kind: RoutineKind::Function,
		name: "locate",
		args: &["values", "target"],
		kws: &[],
		docs: "Indices of elements matching `target`, or -1.",
	},
	RawBuiltin {
		kind: RoutineKind::Function,
		name: "abs",
		args: &["x"],
		kws: &[],
		docs: "Absolute value.",
	},
	RawBuiltin {
		kind: RoutineKind::Function,
		name: "sqrt",
		args: &["x"],
		kws: &[],
		docs: "Square root.",
	},
];

/// Builds the builtin symbol table. Names are already canonical.
#[must_use]
pub(crate) fn table() -> FxHashMap<String, GlobalSymbol> {
	let mut ret = FxHashMap::default();

	for raw in BUILTINS {
		let param = |name: &&str, keyword: bool| ParamSpec {
			display: (*name).to_string(),
			name: (*name).to_string(),
			keyword,
			span: Span::default(),
		};

		ret.insert(
			raw.name.to_string(),
			GlobalSymbol {
				kind: raw.kind,
				name: raw.name.to_string(),
				display: raw.name.to_string(),
				file: PathBuf::new(),
				span: Span::default(),
				args: raw.args.iter().map(|a| param(a, false)).collect(),
				kws: raw.kws.iter().map(|k| param(k, true)).collect(),
				docs: raw.docs.to_string(),
				source: SymbolSource::Builtin,
				fields: vec![],
			},
		);
	}

	ret
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn table_is_builtin_sourced() {
		let table = table();
		assert!(table.len() >= 10);
		assert!(table.values().all(|g| g.source == SymbolSource::Builtin));
		assert_eq!(table["plot"].kws.len(), 2);
	}
}
