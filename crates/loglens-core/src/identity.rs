//! Content-addressed line identity.
//!
//! A line's id is the SHA-256 of its exact bytes (terminator excluded),
//! rendered as 64 lowercase hex characters. The id is both the in-batch
//! dedup key and the store's upsert key, so it must never depend on the
//! process, the machine, or when the line was read.

use sha2::{Digest, Sha256};

/// Length of a rendered line id.
pub const LINE_ID_LEN: usize = 64;

pub fn line_id(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let a = line_id(b"2025-12-17T16:16:00 host INFO: user alice logged in");
        let b = line_id(b"2025-12-17T16:16:00 host INFO: user alice logged in");
        assert_eq!(a, b);
    }

    #[test]
    fn test_fixed_width_hex() {
        for input in [&b""[..], b"x", b"a much longer line with \xff invalid bytes"] {
            let id = line_id(input);
            assert_eq!(id.len(), LINE_ID_LEN);
            assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn test_known_vector() {
        assert_eq!(
            line_id(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_trailing_whitespace_matters() {
        assert_ne!(line_id(b"ERROR: timeout"), line_id(b"ERROR: timeout "));
    }
}
