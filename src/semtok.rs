//! Semantic token classification: deriving (range, class) pairs from a token
//! stream plus the resolved tables, in the delta-encoded form editors expect.

use lsp_types::{SemanticToken, SemanticTokenModifier, SemanticTokenType, SemanticTokensLegend};
use rustc_hash::FxHashMap;

use crate::{
	parser::ParsedResult,
	scan::{Pos, Token, TokenKind},
	sym::{self, GlobalSymbol, RoutineKind, SymbolSource},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemToken {
	Comment,
	Function,
	Keyword,
	Number,
	Operator,
	Param,
	Property,
	String,
	Variable,
}

impl From<SemToken> for SemanticTokenType {
	fn from(value: SemToken) -> Self {
		match value {
			SemToken::Comment => Self::COMMENT,
			SemToken::Function => Self::FUNCTION,
			SemToken::Keyword => Self::KEYWORD,
			SemToken::Number => Self::NUMBER,
			SemToken::Operator => Self::OPERATOR,
			SemToken::Param => Self::PARAMETER,
			SemToken::Property => Self::PROPERTY,
			SemToken::String => Self::STRING,
			SemToken::Variable => Self::VARIABLE,
		}
	}
}

bitflags::bitflags! {
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
	pub struct SemTokenFlags: u8 {
		const DEFINITION = 1 << 0;
		const DEFAULT_LIBRARY = 1 << 1;
	}
}

#[must_use]
pub fn legend() -> SemanticTokensLegend {
	// Ordering must match that of `SemToken`.
	let types = vec![
		SemToken::Comment.into(),
		SemToken::Function.into(),
		SemToken::Keyword.into(),
		SemToken::Number.into(),
		SemToken::Operator.into(),
		SemToken::Param.into(),
		SemToken::Property.into(),
		SemToken::String.into(),
		SemToken::Variable.into(),
	];

	let modifiers = vec![
		SemanticTokenModifier::DEFINITION,
		SemanticTokenModifier::DEFAULT_LIBRARY,
	];

	SemanticTokensLegend {
		token_types: types,
		token_modifiers: modifiers,
	}
}

pub(crate) struct Highlighter {
	tokens: Vec<SemanticToken>,
	prev_line: u32,
	prev_col: u32,
}

impl Highlighter {
	#[must_use]
	pub(crate) fn new() -> Self {
		Self {
			tokens: vec![],
			prev_line: 0,
			prev_col: 0,
		}
	}

	pub(crate) fn advance(&mut self, semtok: SemToken, pos: Pos, len: u32, flags: SemTokenFlags) {
		let mut line = pos.line;
		let mut col = pos.col;

		if !self.tokens.is_empty() {
			line -= self.prev_line;

			if line == 0 {
				col -= self.prev_col;
			}
		}

		self.tokens.push(SemanticToken {
			delta_line: line,
			delta_start: col,
			length: len,
			token_type: semtok as u32,
			token_modifiers_bitset: flags.bits() as u32,
		});

		self.prev_line = pos.line;
		self.prev_col = pos.col;
	}

	#[must_use]
	pub(crate) fn finish(self) -> Vec<SemanticToken> {
		self.tokens
	}
}

/// Classifies `tokens` in order. `globals` is the workspace-merged table, so
/// cross-file and builtin routine names classify correctly.
#[must_use]
pub(crate) fn walk(
	tokens: &[Token],
	parsed: &ParsedResult,
	globals: &FxHashMap<String, GlobalSymbol>,
) -> Vec<SemanticToken> {
	let mut hl = Highlighter::new();
	let mut brace_depth = 0_u32;

	for (ix, token) in tokens.iter().enumerate() {
		match token.kind {
			TokenKind::Comment => hl.advance(
				SemToken::Comment,
				token.pos,
				token.len,
				SemTokenFlags::empty(),
			),
			TokenKind::Number => hl.advance(
				SemToken::Number,
				token.pos,
				token.len,
				SemTokenFlags::empty(),
			),
			TokenKind::Str => hl.advance(
				SemToken::String,
				token.pos,
				token.len,
				SemTokenFlags::empty(),
			),
			TokenKind::LBrace => brace_depth += 1,
			TokenKind::RBrace => brace_depth = brace_depth.saturating_sub(1),
			TokenKind::Ident => {
				let (semtok, flags) = classify_ident(tokens, ix, brace_depth, parsed, globals);
				hl.advance(semtok, token.pos, token.len, flags);
			}
			kind if kind.is_keyword() => hl.advance(
				SemToken::Keyword,
				token.pos,
				token.len,
				SemTokenFlags::empty(),
			),
			kind if kind.is_operator() => hl.advance(
				SemToken::Operator,
				token.pos,
				token.len,
				SemTokenFlags::empty(),
			),
			_ => {}
		}
	}

	hl.finish()
}

#[must_use]
fn classify_ident(
	tokens: &[Token],
	ix: usize,
	brace_depth: u32,
	parsed: &ParsedResult,
	globals: &FxHashMap<String, GlobalSymbol>,
) -> (SemToken, SemTokenFlags) {
	let token = &tokens[ix];
	let name = sym::canonical(&token.text);

	let prev = prev_meaningful(tokens, ix);
	let next = next_meaningful(tokens, ix);

	if prev == Some(TokenKind::Dot) {
		return (SemToken::Property, SemTokenFlags::empty());
	}

	if brace_depth > 0 && next == Some(TokenKind::Colon) {
		return (SemToken::Property, SemTokenFlags::empty());
	}

	if matches!(prev, Some(TokenKind::KwPro | TokenKind::KwFunction)) {
		return (SemToken::Function, SemTokenFlags::DEFINITION);
	}

	let routine = enclosing_routine(parsed, token.pos.line);

	let scope = match routine {
		Some((RoutineKind::Function, ref rname)) => parsed.local.func.get(rname),
		Some((RoutineKind::Procedure, ref rname)) => parsed.local.pro.get(rname),
		None => Some(&parsed.local.main),
	};

	if scope.is_some_and(|s| s.contains_key(&name)) {
		let is_param = routine.as_ref().is_some_and(|(kind, rname)| {
			parsed
				.global
				.iter()
				.find(|g| g.kind == *kind && &g.name == rname)
				.is_some_and(|g| g.args.iter().any(|a| a.name == name))
		});

		let semtok = if is_param {
			SemToken::Param
		} else {
			SemToken::Variable
		};

		return (semtok, SemTokenFlags::empty());
	}

	if let Some(gsym) = globals.get(&name) {
		let flags = if gsym.source == SymbolSource::Builtin {
			SemTokenFlags::DEFAULT_LIBRARY
		} else {
			SemTokenFlags::empty()
		};

		return (SemToken::Function, flags);
	}

	if next == Some(TokenKind::LParen) {
		return (SemToken::Function, SemTokenFlags::empty());
	}

	(SemToken::Variable, SemTokenFlags::empty())
}

#[must_use]
fn prev_meaningful(tokens: &[Token], ix: usize) -> Option<TokenKind> {
	tokens[..ix]
		.iter()
		.rev()
		.find(|t| !matches!(t.kind, TokenKind::Comment))
		.map(|t| t.kind)
}

#[must_use]
fn next_meaningful(tokens: &[Token], ix: usize) -> Option<TokenKind> {
	tokens[(ix + 1)..]
		.iter()
		.find(|t| !matches!(t.kind, TokenKind::Comment))
		.map(|t| t.kind)
}

#[must_use]
fn enclosing_routine(parsed: &ParsedResult, line: u32) -> Option<(RoutineKind, String)> {
	parsed.tree.children.iter().find_map(|node| {
		let kind = node.routine_kind()?;

		if node.span.contains_line(line) {
			Some((kind, sym::canonical(&node.text)))
		} else {
			None
		}
	})
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::{
		parser::{self, ParseOptions},
		scan,
	};

	fn classify(code: &str) -> Vec<(SemToken, u32)> {
		let parsed = parser::parse(code, ParseOptions::default());
		let (tokens, _) = scan::tokenize(code);
		let globals = FxHashMap::default();

		walk(&tokens, &parsed, &globals)
			.into_iter()
			.map(|t| {
				let semtok = match t.token_type {
					0 => SemToken::Comment,
					1 => SemToken::Function,
					2 => SemToken::Keyword,
					3 => SemToken::Number,
					4 => SemToken::Operator,
					5 => SemToken::Param,
					6 => SemToken::Property,
					7 => SemToken::String,
					_ => SemToken::Variable,
				};

				(semtok, t.token_modifiers_bitset)
			})
			.collect()
	}

	#[test]
	fn routine_name_is_a_definition() {
		let classified = classify("pro myPro\nend");

		assert_eq!(classified[0].0, SemToken::Keyword);
		assert_eq!(classified[1].0, SemToken::Function);
		assert_eq!(classified[1].1, SemTokenFlags::DEFINITION.bits() as u32);
	}

	#[test]
	fn struct_fields_are_properties() {
		let classified = classify("pro p\n  s = {alpha: 1}\n  x = s.alpha\nend");

		let properties = classified
			.iter()
			.filter(|(t, _)| *t == SemToken::Property)
			.count();

		assert_eq!(properties, 2);
	}

	#[test]
	fn locals_and_params_differ() {
		let classified = classify("pro p, arg\n  x = arg\nend");

		assert!(classified.contains(&(SemToken::Param, 0)));
		assert!(classified.contains(&(SemToken::Variable, 0)));
	}

	#[test]
	fn delta_encoding_is_relative() {
		let parsed = parser::parse("x = 1\nend", ParseOptions::default());
		let (tokens, _) = scan::tokenize("x = 1\nend");
		let sem = walk(&tokens, &parsed, &FxHashMap::default());

		// First token is absolute; the second is relative to it.
		assert_eq!(sem[0].delta_line, 0);
		assert_eq!(sem[0].delta_start, 0);
		assert_eq!(sem[1].delta_line, 0);
		assert_eq!(sem[1].delta_start, 2);
	}
}
