//! Content fingerprints for fetched index resources and selection criteria

use crate::error::{FidxError, Result};
use sha2::{Digest, Sha256};

/// SHA-256 hex digest, the fingerprint stored in ingestion cursors
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Compare a buffer against an expected SHA-256 digest
pub fn verify_sha256(data: &[u8], expected: &str) -> Result<()> {
    let actual = sha256_hex(data);
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(FidxError::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_sha256_hex() {
        assert_eq!(sha256_hex(b"hello world"), HELLO_SHA256);
        assert_eq!(sha256_hex(&[b'x'; 20_000]).len(), 64);
    }

    #[test]
    fn test_verify_sha256() {
        assert!(verify_sha256(b"hello world", HELLO_SHA256).is_ok());
        assert!(verify_sha256(b"hello world", &HELLO_SHA256.to_uppercase()).is_ok());

        let err = verify_sha256(b"hello", HELLO_SHA256).unwrap_err();
        assert!(matches!(err, FidxError::ChecksumMismatch { ref expected, .. } if expected == HELLO_SHA256));
    }
}
