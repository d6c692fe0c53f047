use sha1::{Digest, Sha1};

/// Compute the 20-byte SHA1 digest of arbitrary input
pub fn sha1_digest(input: impl AsRef<[u8]>) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(input.as_ref());
    let hash = hasher.finalize();

    let mut result = [0u8; 20];
    result.copy_from_slice(&hash);
    result
}
