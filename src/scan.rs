//! Lexical scanning: Strand source text to a flat, ordered token sequence.
//!
//! Scanning is line-oriented; a `$` at the end of a physical line joins it to
//! the next one. Unrecognized byte sequences become [`TokenKind::Unknown`]
//! tokens plus a diagnostic rather than aborting the scan, and the output is
//! fully determined by the input text.

use std::sync::OnceLock;

use lsp_types::Diagnostic;
use regex::Regex;

use crate::{
	diag::{self, DiagCode},
	lines,
};

/// Zero-based source position. `col` and `offset` are byte-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Pos {
	pub line: u32,
	pub col: u32,
	pub offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
	pub start: Pos,
	pub end: Pos,
}

impl Span {
	#[must_use]
	pub(crate) fn new(start: Pos, end: Pos) -> Self {
		Self { start, end }
	}

	/// A span covering `len` bytes on `pos`'s own line.
	#[must_use]
	pub(crate) fn at(pos: Pos, len: u32) -> Self {
		Self {
			start: pos,
			end: Pos {
				line: pos.line,
				col: pos.col + len,
				offset: pos.offset + len,
			},
		}
	}

	#[must_use]
	pub(crate) fn cover(self, other: Self) -> Self {
		Self {
			start: if self.start.offset <= other.start.offset {
				self.start
			} else {
				other.start
			},
			end: if self.end.offset >= other.end.offset {
				self.end
			} else {
				other.end
			},
		}
	}

	#[must_use]
	pub(crate) fn contains_line(self, line: u32) -> bool {
		line >= self.start.line && line <= self.end.line
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
	Ident,
	Number,
	Str,
	Comment,
	Newline,
	Unknown,

	Comma,
	Colon,
	Dot,
	LParen,
	RParen,
	LBrace,
	RBrace,
	Plus,
	Minus,
	Star,
	Slash,
	Caret,
	Assign,

	KwPro,
	KwFunction,
	KwEnd,
	KwEndIf,
	KwEndElse,
	KwEndFor,
	KwEndWhile,
	KwBegin,
	KwIf,
	KwThen,
	KwElse,
	KwFor,
	KwWhile,
	KwDo,
	KwReturn,
	KwCompileOpt,
	KwAnd,
	KwOr,
	KwNot,
	KwEq,
	KwNe,
	KwLt,
	KwLe,
	KwGt,
	KwGe,
}

impl TokenKind {
	/// Keyword lookup. Strand keywords are reserved case-insensitively.
	#[must_use]
	pub(crate) fn from_word(word: &str) -> Option<Self> {
		let lower = word.to_ascii_lowercase();

		let ret = match lower.as_str() {
			"pro" => Self::KwPro,
			"function" => Self::KwFunction,
			"end" => Self::KwEnd,
			"endif" => Self::KwEndIf,
			"endelse" => Self::KwEndElse,
			"endfor" => Self::KwEndFor,
			"endwhile" => Self::KwEndWhile,
			"begin" => Self::KwBegin,
			"if" => Self::KwIf,
			"then" => Self::KwThen,
			"else" => Self::KwElse,
			"for" => Self::KwFor,
			"while" => Self::KwWhile,
			"do" => Self::KwDo,
			"return" => Self::KwReturn,
			"compile_opt" => Self::KwCompileOpt,
			"and" => Self::KwAnd,
			"or" => Self::KwOr,
			"not" => Self::KwNot,
			"eq" => Self::KwEq,
			"ne" => Self::KwNe,
			"lt" => Self::KwLt,
			"le" => Self::KwLe,
			"gt" => Self::KwGt,
			"ge" => Self::KwGe,
			_ => return None,
		};

		Some(ret)
	}

	#[must_use]
	pub fn is_keyword(self) -> bool {
		matches!(
			self,
			Self::KwPro
				| Self::KwFunction
				| Self::KwEnd | Self::KwEndIf
				| Self::KwEndElse
				| Self::KwEndFor
				| Self::KwEndWhile
				| Self::KwBegin
				| Self::KwIf | Self::KwThen
				| Self::KwElse
				| Self::KwFor | Self::KwWhile
				| Self::KwDo | Self::KwReturn
				| Self::KwCompileOpt
				| Self::KwAnd | Self::KwOr
				| Self::KwNot | Self::KwEq
				| Self::KwNe | Self::KwLt
				| Self::KwLe | Self::KwGt
				| Self::KwGe
		)
	}

	/// `end` and its specialized forms, all of which close a block.
	#[must_use]
	pub(crate) fn is_block_terminator(self) -> bool {
		matches!(
			self,
			Self::KwEnd | Self::KwEndIf | Self::KwEndElse | Self::KwEndFor | Self::KwEndWhile
		)
	}

	#[must_use]
	pub(crate) fn is_operator(self) -> bool {
		matches!(
			self,
			Self::Plus | Self::Minus | Self::Star | Self::Slash | Self::Caret | Self::Assign
		)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
	pub kind: TokenKind,
	pub text: Box<str>,
	pub pos: Pos,
	pub len: u32,
}

impl Token {
	#[must_use]
	pub fn span(&self) -> Span {
		Span::at(self.pos, self.len)
	}
}

#[must_use]
fn number_regex() -> &'static Regex {
	static REGEX: OnceLock<Regex> = OnceLock::new();

	REGEX.get_or_init(|| {
		Regex::new(r"^(?:[0-9]+\.?[0-9]*|\.[0-9]+)(?:[eEdD][+-]?[0-9]+)?").unwrap()
	})
}

/// Converts source text into tokens and scan diagnostics.
///
/// Never fails; malformed input degrades into [`TokenKind::Unknown`] tokens
/// and diagnostics so downstream passes always have a stream to work with.
#[must_use]
pub fn tokenize(code: &str) -> (Vec<Token>, Vec<Diagnostic>) {
	let mut tokens = vec![];
	let mut diags = vec![];

	for (line_ix, line) in lines::split_lines(code).iter().enumerate() {
		let line_no = line_ix as u32;
		let text = line.text;
		let bytes = text.as_bytes();
		let mut col = 0_usize;
		let mut continued = false;

		while col < bytes.len() {
			let byte = bytes[col];

			if byte == b' ' || byte == b'\t' {
				col += 1;
				continue;
			}

			let pos = Pos {
				line: line_no,
				col: col as u32,
				offset: line.offset + col as u32,
			};

			match byte {
				b';' => {
					push_token(&mut tokens, TokenKind::Comment, &text[col..], pos);
					col = bytes.len();
				}
				b'\'' | b'"' | b'`' => {
					let (end, terminated) = scan_string(bytes, col, byte);

					if !terminated {
						diags.push(diag::build(
							DiagCode::UnterminatedString,
							Span::at(pos, (end - col) as u32),
						));
					}

					push_token(&mut tokens, TokenKind::Str, &text[col..end], pos);
					col = end;
				}
				b'0'..=b'9' => {
					col += scan_number(&mut tokens, &text[col..], pos);
				}
				b'.' if bytes.get(col + 1).is_some_and(u8::is_ascii_digit) => {
					col += scan_number(&mut tokens, &text[col..], pos);
				}
				b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
					let mut end = col + 1;

					while end < bytes.len()
						&& (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_')
					{
						end += 1;
					}

					let word = &text[col..end];
					let kind = TokenKind::from_word(word).unwrap_or(TokenKind::Ident);
					push_token(&mut tokens, kind, word, pos);
					col = end;
				}
				b'$' => {
					// Line continuation; only trivia may follow.
					continued = true;
					col += 1;
				}
				b',' | b':' | b'.' | b'(' | b')' | b'{' | b'}' | b'+' | b'-' | b'*' | b'/'
				| b'^' | b'=' => {
					let kind = match byte {
						b',' => TokenKind::Comma,
						b':' => TokenKind::Colon,
						b'.' => TokenKind::Dot,
						b'(' => TokenKind::LParen,
						b')' => TokenKind::RParen,
						b'{' => TokenKind::LBrace,
						b'}' => TokenKind::RBrace,
						b'+' => TokenKind::Plus,
						b'-' => TokenKind::Minus,
						b'*' => TokenKind::Star,
						b'/' => TokenKind::Slash,
						b'^' => TokenKind::Caret,
						_ => TokenKind::Assign,
					};

					push_token(&mut tokens, kind, &text[col..(col + 1)], pos);
					col += 1;
				}
				_ => {
					let end = scan_unknown(text, col);
					push_token(&mut tokens, TokenKind::Unknown, &text[col..end], pos);

					diags.push(diag::build(
						DiagCode::UnknownToken,
						Span::at(pos, (end - col) as u32),
					));

					col = end;
				}
			}
		}

		if !continued {
			tokens.push(Token {
				kind: TokenKind::Newline,
				text: "".into(),
				pos: Pos {
					line: line_no,
					col: bytes.len() as u32,
					offset: line.offset + bytes.len() as u32,
				},
				len: 0,
			});
		}
	}

	(tokens, diags)
}

fn push_token(tokens: &mut Vec<Token>, kind: TokenKind, text: &str, pos: Pos) {
	tokens.push(Token {
		kind,
		text: text.into(),
		pos,
		len: text.len() as u32,
	});
}

/// Returns the exclusive end of the literal and whether it was terminated.
/// A doubled quote within the literal escapes to a single quote character.
#[must_use]
fn scan_string(bytes: &[u8], start: usize, quote: u8) -> (usize, bool) {
	let mut at = start + 1;

	loop {
		let Some(rel) = bytes[at..].iter().position(|&b| b == quote) else {
			return (bytes.len(), false);
		};

		let close = at + rel;

		if bytes.get(close + 1) == Some(&quote) {
			at = close + 2;
			continue;
		}

		return (close + 1, true);
	}
}

/// Returns the number of bytes consumed.
fn scan_number(tokens: &mut Vec<Token>, rest: &str, pos: Pos) -> usize {
	// The guard on the caller's side makes a non-match impossible, but fall
	// back to a single digit rather than panicking if the pattern drifts.
	let lexeme = match number_regex().find(rest) {
		Some(m) => m.as_str(),
		None => &rest[..1],
	};

	push_token(tokens, TokenKind::Number, lexeme, pos);
	lexeme.len()
}

/// Consumes a run of bytes no other scanner rule can start with.
#[must_use]
fn scan_unknown(text: &str, start: usize) -> usize {
	let mut end = start;

	for ch in text[start..].chars() {
		if ch.is_ascii_alphanumeric()
			|| ch.is_ascii_whitespace()
			|| "_;'\"`$,:.(){}+-*/^=".contains(ch)
		{
			break;
		}

		end += ch.len_utf8();
	}

	if end == start {
		end + 1
	} else {
		end
	}
}
