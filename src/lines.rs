//! Functions for dealing in source text in terms of lines.

/// One physical line of source, minus its terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SourceLine<'s> {
	pub(crate) text: &'s str,
	/// Byte offset of the line's first character within the full source.
	pub(crate) offset: u32,
}

/// Splits `src` on `\n`, tolerating `\r\n`. The terminators are not part of
/// the yielded text, but they do count towards the offsets of later lines.
#[must_use]
pub(crate) fn split_lines(src: &str) -> Vec<SourceLine> {
	let mut ret = vec![];
	let mut offset = 0_u32;

	for part in src.split('\n') {
		let text = part.strip_suffix('\r').unwrap_or(part);

		ret.push(SourceLine { text, offset });

		offset += part.len() as u32 + 1;
	}

	// `split` always yields a final empty piece after a trailing newline;
	// it does not correspond to a real line.
	if src.ends_with('\n') {
		let _ = ret.pop();
	}

	ret
}
