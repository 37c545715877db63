//! Core type definitions

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Number of hex characters kept from a SHA-256 digest
pub const FINGERPRINT_LEN: usize = 16;

/// Build profile: one cacheable library build
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildProfile {
    /// Debug or release build
    pub debug: bool,
    /// Generation root the library is built under
    pub output_folder: PathBuf,
}

impl BuildProfile {
    pub fn debug(output_folder: impl Into<PathBuf>) -> Self {
        Self {
            debug: true,
            output_folder: output_folder.into(),
        }
    }

    pub fn release(output_folder: impl Into<PathBuf>) -> Self {
        Self {
            debug: false,
            output_folder: output_folder.into(),
        }
    }

    /// `debug` or `release`
    pub fn label(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "release"
        }
    }
}

impl std::fmt::Display for BuildProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.label(), self.output_folder.display())
    }
}

/// Truncated SHA-256 of a unit's effective content.
///
/// Lowercase hex, [`FINGERPRINT_LEN`] characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Incremental fingerprint builder.
///
/// Every part is length-prefixed so `("ab", "c")` and `("a", "bc")` differ.
#[derive(Default)]
pub struct Fingerprinter {
    hasher: Sha256,
}

impl Fingerprinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chunk of bytes
    pub fn update(&mut self, bytes: impl AsRef<[u8]>) -> &mut Self {
        let bytes = bytes.as_ref();
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
        self
    }

    /// Add a file's path and contents; unreadable files contribute only their path
    pub fn update_file(&mut self, path: &Path) -> &mut Self {
        self.update(path.to_string_lossy().as_bytes());
        match std::fs::read(path) {
            Ok(content) => self.update(content),
            Err(_) => self.update(b""),
        }
    }

    pub fn finish(self) -> Fingerprint {
        let full = format!("{:x}", self.hasher.finalize());
        Fingerprint(full[..FINGERPRINT_LEN].to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_label() {
        assert_eq!(BuildProfile::debug("/tmp/x").label(), "debug");
        assert_eq!(BuildProfile::release("/tmp/x").to_string(), "release@/tmp/x");
    }

    #[test]
    fn test_fingerprint_is_stable_and_length_prefixed() {
        let mut a = Fingerprinter::new();
        a.update("ab").update("c");
        let mut b = Fingerprinter::new();
        b.update("ab").update("c");
        let mut c = Fingerprinter::new();
        c.update("a").update("bc");

        let (a, b, c) = (a.finish(), b.finish(), c.finish());
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), FINGERPRINT_LEN);
        assert!(a.as_str().chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_tracks_file_contents() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("unit.c");

        std::fs::write(&path, "int a(void) { return 1; }").unwrap();
        let mut first = Fingerprinter::new();
        first.update_file(&path);

        std::fs::write(&path, "int a(void) { return 2; }").unwrap();
        let mut second = Fingerprinter::new();
        second.update_file(&path);

        assert_ne!(first.finish(), second.finish());
    }
}
