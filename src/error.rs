use std::path::PathBuf;

use crate::ErrorBox;

#[derive(Debug)]
pub enum Error {
	/// The caller asked for a file that does not exist or could not be read.
	NotFound(PathBuf),
	/// A cancellation token fired. Control flow, not a language diagnostic;
	/// callers translate this into "no result for this request".
	Canceled,
	Process {
		source: Option<ErrorBox>,
		ctx: String,
	},
}

impl Error {
	#[must_use]
	pub fn is_cancellation(&self) -> bool {
		matches!(self, Self::Canceled)
	}

	#[must_use]
	pub(crate) fn process(ctx: impl Into<String>) -> Self {
		Self::Process {
			source: None,
			ctx: ctx.into(),
		}
	}
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::NotFound(path) => write!(f, "file not found: {}", path.display()),
			Self::Canceled => write!(f, "operation canceled"),
			Self::Process { source, ctx } => match source {
				Some(s) => {
					write!(f, "{ctx}: {s}")
				}
				None => {
					write!(f, "{ctx}")
				}
			},
		}
	}
}

impl From<std::io::Error> for Error {
	fn from(value: std::io::Error) -> Self {
		Self::Process {
			source: Some(Box::new(value)),
			ctx: "file I/O failure".to_string(),
		}
	}
}
