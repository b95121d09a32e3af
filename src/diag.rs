//! Diagnostic codes and construction helpers.
//!
//! All expected, recoverable language-level findings flow through here; they
//! ride on a parsed result and are never raised as errors.

use lsp_types::{Diagnostic, DiagnosticSeverity, NumberOrString};

use crate::scan::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum DiagCode {
	UnknownToken = 0,
	UnterminatedString = 1,
	UnexpectedToken = 2,
	UnclosedBlock = 3,
	MismatchedEnd = 4,
	MissingRoutineName = 5,
	DirectiveNotFirst = 6,
	DuplicateRoutine = 7,
	ReturnValueInProc = 8,
	ReturnNoValueInFunc = 9,
	CodeAfterMainEnd = 10,
	UnreachableCode = 11,
	Internal = 12,
}

impl DiagCode {
	#[must_use]
	pub fn message(self) -> &'static str {
		match self {
			Self::UnknownToken => "unrecognized character sequence",
			Self::UnterminatedString => "string literal is missing its closing quote",
			Self::UnexpectedToken => "unexpected token",
			Self::UnclosedBlock => "block is never closed",
			Self::MismatchedEnd => "block terminator does not match its opener",
			Self::MissingRoutineName => "routine declaration is missing a name",
			Self::DirectiveNotFirst => {
				"compile_opt must come before the first executable statement"
			}
			Self::DuplicateRoutine => "routine with this name is already defined in this file",
			Self::ReturnValueInProc => "procedures cannot return a value",
			Self::ReturnNoValueInFunc => "functions must return a value",
			Self::CodeAfterMainEnd => "code after the end of the main program is never reached",
			Self::UnreachableCode => "statement is never reached",
			Self::Internal => "internal analysis failure",
		}
	}

	#[must_use]
	pub fn severity(self) -> DiagnosticSeverity {
		match self {
			Self::UnknownToken
			| Self::UnterminatedString
			| Self::UnexpectedToken
			| Self::UnclosedBlock
			| Self::MismatchedEnd
			| Self::MissingRoutineName
			| Self::ReturnValueInProc
			| Self::ReturnNoValueInFunc
			| Self::Internal => DiagnosticSeverity::ERROR,
			Self::DirectiveNotFirst | Self::DuplicateRoutine | Self::CodeAfterMainEnd => {
				DiagnosticSeverity::WARNING
			}
			Self::UnreachableCode => DiagnosticSeverity::HINT,
		}
	}
}

#[must_use]
pub(crate) fn make_range(span: Span) -> lsp_types::Range {
	lsp_types::Range {
		start: lsp_types::Position {
			line: span.start.line,
			character: span.start.col,
		},
		end: lsp_types::Position {
			line: span.end.line,
			character: span.end.col,
		},
	}
}

#[must_use]
pub(crate) fn build(code: DiagCode, span: Span) -> Diagnostic {
	build_with_message(code, span, code.message().to_string())
}

#[must_use]
pub(crate) fn build_with_message(code: DiagCode, span: Span, message: String) -> Diagnostic {
	Diagnostic {
		range: make_range(span),
		severity: Some(code.severity()),
		code: Some(NumberOrString::Number(code as i32)),
		code_description: None,
		source: Some("strand-ls".to_string()),
		message,
		related_information: None,
		tags: None,
		data: None,
	}
}

/// Convenience for tests and callers filtering by code.
#[must_use]
pub fn has_code(diag: &Diagnostic, code: DiagCode) -> bool {
	matches!(diag.code, Some(NumberOrString::Number(n)) if n == code as i32)
}
