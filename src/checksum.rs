//! Content hashing for cache keys and change detection.

use sha2::{Digest, Sha256};

/// A stable digest of one file's source text. Equal checksums mean the
/// analysis pipeline would produce an identical result for the same resolver
/// version, so the workspace index compares these before re-parsing.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Checksum([u8; 32]);

impl Checksum {
	#[must_use]
	pub fn of(code: &str) -> Self {
		let mut hasher = Sha256::new();
		hasher.update(code.as_bytes());
		Self(hasher.finalize().into())
	}
}

impl std::fmt::Debug for Checksum {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		for byte in self.0 {
			write!(f, "{byte:02x}")?;
		}

		Ok(())
	}
}
