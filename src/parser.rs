//! The single-file analysis pipeline: tokenize, build the tree, resolve
//! scopes and types, then run the post-parse rule set.
//!
//! [`parse`] never fails for malformed-but-decodable input; everything the
//! language can get wrong becomes a diagnostic on the result. Cancellation is
//! the one way out of the pipeline, and a cancelled parse yields no result at
//! all rather than a partially-filled one.

use std::path::Path;

use lsp_types::Diagnostic;

use crate::{
	cancel::CancellationToken,
	checksum::Checksum,
	diag::{self, DiagCode},
	error::Error,
	front, lines,
	scan::{self, Span, Token},
	sym::{CompileOpts, GlobalSymbol, LocalTables, Uses},
	syntax::{self, NodeKind, SyntaxNode},
	validate::ValidatorSet,
};

#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
	/// Full structural recovery. Turn off for a cheap outline-only pass.
	pub full: bool,
	/// Drop the token sequence and text lines once the tree and tables are
	/// built, to bound what a cached result keeps alive.
	pub cleanup: bool,
}

impl Default for ParseOptions {
	fn default() -> Self {
		Self {
			full: true,
			cleanup: true,
		}
	}
}

/// Everything one parse invocation produces; the unit of caching.
///
/// The checksum determines every other field for a given resolver version,
/// and a finalized result is replaced wholesale on reparse, never patched.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResult {
	pub checksum: Checksum,
	pub has_detail: bool,
	/// Cleared after the pipeline finishes unless the caller opted out of
	/// cleanup.
	pub tokens: Vec<Token>,
	/// Source text lines; cleared alongside `tokens`.
	pub text: Vec<String>,
	pub lines: usize,
	pub tree: SyntaxNode,
	pub parse_problems: Vec<Diagnostic>,
	pub post_process_problems: Vec<Diagnostic>,
	pub global: Vec<GlobalSymbol>,
	pub local: LocalTables,
	pub compile: CompileOpts,
	pub uses: Uses,
}

impl ParsedResult {
	#[must_use]
	pub(crate) fn empty(checksum: Checksum) -> Self {
		Self {
			checksum,
			has_detail: false,
			tokens: vec![],
			text: vec![],
			lines: 0,
			tree: SyntaxNode::new(NodeKind::File, Span::default()),
			parse_problems: vec![],
			post_process_problems: vec![],
			global: vec![],
			local: LocalTables::default(),
			compile: CompileOpts::default(),
			uses: Uses::default(),
		}
	}

	/// All diagnostics, parse and post-parse alike, in collection order.
	pub fn problems(&self) -> impl Iterator<Item = &Diagnostic> {
		self.parse_problems
			.iter()
			.chain(self.post_process_problems.iter())
	}
}

/// Runs every stage against `code`, checking `cancel` between stages (the
/// tree builder also polls it at statement boundaries).
pub(crate) fn pipeline(
	code: &str,
	options: ParseOptions,
	cancel: &CancellationToken,
	validators: &ValidatorSet,
	file: &Path,
) -> Result<ParsedResult, Error> {
	cancel.throw_if_cancelled()?;

	let checksum = Checksum::of(code);
	let (tokens, mut parse_problems) = scan::tokenize(code);

	cancel.throw_if_cancelled()?;

	let (mut tree, mut build_problems) = syntax::build(&tokens, options.full, cancel)?;
	parse_problems.append(&mut build_problems);

	cancel.throw_if_cancelled()?;

	let mut resolution = front::resolve(&mut tree, &tokens, file);
	parse_problems.append(&mut resolution.diags);

	cancel.throw_if_cancelled()?;

	let post_process_problems = validators.run(&tree);

	let (tokens, text) = if options.cleanup {
		(vec![], vec![])
	} else {
		let text = lines::split_lines(code)
			.iter()
			.map(|l| l.text.to_string())
			.collect();

		(tokens, text)
	};

	Ok(ParsedResult {
		checksum,
		has_detail: options.full,
		tokens,
		text,
		lines: lines::split_lines(code).len(),
		tree,
		parse_problems,
		post_process_problems,
		global: resolution.global,
		local: resolution.local,
		compile: resolution.compile,
		uses: resolution.uses,
	})
}

/// Parses a single source text with no cache involved.
#[must_use]
pub fn parse(code: &str, options: ParseOptions) -> ParsedResult {
	let cancel = CancellationToken::new();
	let validators = ValidatorSet::default();

	match pipeline(code, options, &cancel, &validators, Path::new("")) {
		Ok(parsed) => parsed,
		// Unreachable with a token nothing cancels; degrade all the same.
		Err(_) => {
			let mut ret = ParsedResult::empty(Checksum::of(code));
			ret.parse_problems
				.push(diag::build(DiagCode::Internal, Span::default()));
			ret
		}
	}
}

/// Reads `path` and parses it. Fails with [`Error::NotFound`] when the file
/// does not exist or cannot be read as text.
pub fn parse_file(path: &Path, options: ParseOptions) -> Result<ParsedResult, Error> {
	let code =
		std::fs::read_to_string(path).map_err(|_| Error::NotFound(path.to_path_buf()))?;

	let cancel = CancellationToken::new();
	let validators = ValidatorSet::default();
	pipeline(&code, options, &cancel, &validators, path)
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn malformed_input_never_panics() {
		let samples = [
			"",
			"pro",
			"pro p\n  = 5\nend",
			"function f, ,\nend",
			"x = {a: }\nend",
			"if then else\nend",
			"\u{1F600} = 1",
			"pro p\n  s = {a: 'unterminated\nend",
		];

		for code in samples {
			let parsed = parse(code, ParseOptions::default());
			let _ = parsed.problems().count();
		}
	}

	#[test]
	fn cleanup_drops_tokens_and_text() {
		let parsed = parse("pro p\nend", ParseOptions::default());
		assert!(parsed.tokens.is_empty());
		assert!(parsed.text.is_empty());
		assert_eq!(parsed.lines, 2);

		let kept = parse(
			"pro p\nend",
			ParseOptions {
				cleanup: false,
				..ParseOptions::default()
			},
		);

		assert!(!kept.tokens.is_empty());
		assert_eq!(kept.text.len(), 2);
	}

	#[test]
	fn checksum_keys_the_result() {
		let a = parse("pro p\nend", ParseOptions::default());
		let b = parse("pro p\nend", ParseOptions::default());
		let c = parse("pro q\nend", ParseOptions::default());

		assert_eq!(a, b);
		assert_eq!(a.checksum, b.checksum);
		assert_ne!(a.checksum, c.checksum);
	}

	#[test]
	fn shallow_parse_still_yields_globals() {
		let parsed = parse(
			"pro outline_me, a\n  x = {f: 1}\nend",
			ParseOptions {
				full: false,
				..ParseOptions::default()
			},
		);

		assert!(!parsed.has_detail);
		assert_eq!(parsed.global.len(), 1);
		assert_eq!(parsed.global[0].name, "outline_me");
		// The shallow pass skips bodies; only the parameter was resolved.
		let scope = parsed.local.pro.get("outline_me").unwrap();
		assert!(scope.contains_key("a"));
		assert!(!scope.contains_key("x"));
	}

	#[test]
	fn missing_file_is_not_found() {
		let err = parse_file(Path::new("/no/such/file.strand"), ParseOptions::default());
		assert!(matches!(err, Err(Error::NotFound(_))));
	}
}
