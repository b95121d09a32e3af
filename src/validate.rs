//! Post-parse validation rules.
//!
//! Each rule is an independent check over the finished tree; no rule may
//! depend on another's output, and the engine keeps running the rest of the
//! set when one rule fails. A panicking rule degrades into a generic
//! diagnostic instead of taking the whole pass down with it.

use std::panic::{catch_unwind, AssertUnwindSafe};

use lsp_types::Diagnostic;
use rustc_hash::FxHashMap;
use tracing::error;

use crate::{
	diag::{self, DiagCode},
	scan::Span,
	sym::{self, RoutineKind},
	syntax::{NodeKind, SyntaxNode},
};

pub type Validator = fn(&SyntaxNode) -> Vec<Diagnostic>;

/// The rule registry. Constructed explicitly (default set once per process,
/// isolated sets in tests) rather than living in an ambient singleton; the
/// set in use is fixed for the lifetime of whatever owns it.
#[derive(Debug, Clone)]
pub struct ValidatorSet {
	rules: Vec<(&'static str, Validator)>,
}

impl ValidatorSet {
	#[must_use]
	pub fn empty() -> Self {
		Self { rules: vec![] }
	}

	pub fn register(&mut self, name: &'static str, rule: Validator) {
		self.rules.push((name, rule));
	}

	#[must_use]
	pub(crate) fn run(&self, tree: &SyntaxNode) -> Vec<Diagnostic> {
		let mut out = vec![];

		for (name, rule) in &self.rules {
			match catch_unwind(AssertUnwindSafe(|| rule(tree))) {
				Ok(diags) => out.extend(diags),
				Err(_) => {
					error!("Validator `{name}` panicked; converting to a diagnostic.");

					out.push(diag::build_with_message(
						DiagCode::Internal,
						Span::default(),
						format!("internal analysis failure in rule `{name}`"),
					));
				}
			}
		}

		out
	}
}

impl Default for ValidatorSet {
	fn default() -> Self {
		let mut ret = Self::empty();
		ret.register("duplicate-routines", duplicate_routines);
		ret.register("return-forms", return_forms);
		ret.register("code-after-main-end", code_after_main_end);
		ret.register("unreachable-after-return", unreachable_after_return);
		ret
	}
}

// Rules ///////////////////////////////////////////////////////////////////////

fn duplicate_routines(tree: &SyntaxNode) -> Vec<Diagnostic> {
	let mut seen: FxHashMap<(RoutineKind, String), u32> = FxHashMap::default();
	let mut out = vec![];

	for node in &tree.children {
		let Some(kind) = node.routine_kind() else {
			continue;
		};

		let count = seen
			.entry((kind, sym::canonical(&node.text)))
			.or_insert(0_u32);
		*count += 1;

		if *count > 1 {
			let span = node
				.children
				.first()
				.filter(|c| c.kind == NodeKind::Ident)
				.map_or(node.span, |c| c.span);

			out.push(diag::build(DiagCode::DuplicateRoutine, span));
		}
	}

	out
}

fn return_forms(tree: &SyntaxNode) -> Vec<Diagnostic> {
	let mut out = vec![];

	for node in &tree.children {
		let Some(kind) = node.routine_kind() else {
			continue;
		};

		node.preorder(&mut |n| {
			if n.kind != NodeKind::Return {
				return;
			}

			match kind {
				RoutineKind::Procedure if !n.children.is_empty() => {
					out.push(diag::build(DiagCode::ReturnValueInProc, n.span));
				}
				RoutineKind::Function if n.children.is_empty() => {
					out.push(diag::build(DiagCode::ReturnNoValueInFunc, n.span));
				}
				_ => {}
			}
		});
	}

	out
}

fn code_after_main_end(tree: &SyntaxNode) -> Vec<Diagnostic> {
	let mut out = vec![];
	let mut ended = false;

	for node in &tree.children {
		if node.kind == NodeKind::MainEnd {
			ended = true;
			continue;
		}

		if ended && node.routine_kind().is_none() {
			out.push(diag::build(DiagCode::CodeAfterMainEnd, node.span));
		}
	}

	out
}

fn unreachable_after_return(tree: &SyntaxNode) -> Vec<Diagnostic> {
	let mut out = vec![];

	tree.preorder(&mut |node| {
		let statements: Vec<&SyntaxNode> = match node.kind {
			NodeKind::Block => node.children.iter().collect(),
			NodeKind::Procedure | NodeKind::Function => node
				.children
				.iter()
				.filter(|c| {
					!matches!(
						c.kind,
						NodeKind::Ident | NodeKind::ParamName | NodeKind::KeywordParam
					)
				})
				.collect(),
			_ => return,
		};

		let Some(ret_ix) = statements.iter().position(|s| s.kind == NodeKind::Return) else {
			return;
		};

		if let Some(next) = statements.get(ret_ix + 1) {
			out.push(diag::build(DiagCode::UnreachableCode, next.span));
		}
	});

	out
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::{cancel::CancellationToken, scan, syntax};

	fn run_default(code: &str) -> Vec<Diagnostic> {
		let (tokens, _) = scan::tokenize(code);
		let (tree, _) = syntax::build(&tokens, true, &CancellationToken::new()).unwrap();
		ValidatorSet::default().run(&tree)
	}

	#[test]
	fn duplicates_found_case_insensitively() {
		let diags = run_default("pro alpha\nend\npro ALPHA\nend");
		assert!(diags.iter().any(|d| diag::has_code(d, DiagCode::DuplicateRoutine)));
	}

	#[test]
	fn function_and_procedure_do_not_collide() {
		let diags = run_default("pro alpha\nend\nfunction alpha\n  return, 1\nend");
		assert!(!diags.iter().any(|d| diag::has_code(d, DiagCode::DuplicateRoutine)));
	}

	#[test]
	fn return_value_in_procedure() {
		let diags = run_default("pro p\n  return, 5\nend");
		assert!(diags.iter().any(|d| diag::has_code(d, DiagCode::ReturnValueInProc)));
	}

	#[test]
	fn bare_return_in_function() {
		let diags = run_default("function f\n  return\nend");
		assert!(diags.iter().any(|d| diag::has_code(d, DiagCode::ReturnNoValueInFunc)));
	}

	#[test]
	fn trailing_code_after_main() {
		let diags = run_default("x = 1\nend\ny = 2");
		assert!(diags.iter().any(|d| diag::has_code(d, DiagCode::CodeAfterMainEnd)));
	}

	#[test]
	fn unreachable_statement() {
		let diags = run_default("function f\n  return, 1\n  x = 2\nend");
		assert!(diags.iter().any(|d| diag::has_code(d, DiagCode::UnreachableCode)));
	}

	#[test]
	fn panicking_rule_is_isolated() {
		fn bad(_: &SyntaxNode) -> Vec<Diagnostic> {
			panic!("rule blew up");
		}

		let mut set = ValidatorSet::empty();
		set.register("bad", bad);
		set.register("return-forms", return_forms);

		let (tokens, _) = scan::tokenize("pro p\n  return, 5\nend");
		let (tree, _) = syntax::build(&tokens, true, &CancellationToken::new()).unwrap();
		let diags = set.run(&tree);

		// The panic became a diagnostic and the later rule still ran.
		assert!(diags.iter().any(|d| diag::has_code(d, DiagCode::Internal)));
		assert!(diags.iter().any(|d| diag::has_code(d, DiagCode::ReturnValueInProc)));
	}
}
