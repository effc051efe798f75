//! Randomness and hashing primitives handed to the engine.

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Width of the underlying SHA-256 digest.
pub const DIGEST_LEN: usize = 32;

/// Fill `buf` with random bytes and return how many were written.
pub fn random_bytes(buf: &mut [u8]) -> usize {
    rand::thread_rng().fill_bytes(buf);
    buf.len()
}

/// Domain hash over up to three segments, producing `out.len()` bytes.
///
/// The digest covers the output size and every segment prefixed with its
/// length, so moving bytes between segments changes the result. Lengths are
/// 32 bit; anything past `u32::MAX` is recorded as `u32::MAX`. The output
/// tiles the digest; when the output size is a multiple of [DIGEST_LEN] the
/// accumulated output is fed back into the hash before every byte.
pub fn dht_hash(out: &mut [u8], v1: &[u8], v2: &[u8], v3: &[u8]) {
    out.fill(0);
    let size = out.len();

    let mut hasher = Sha256::new();
    hasher.update(length_prefix(size));
    for segment in [v1, v2, v3] {
        hasher.update(length_prefix(segment.len()));
        hasher.update(segment);
    }

    if size % DIGEST_LEN != 0 {
        let digest = hasher.finalize();
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = digest[i % DIGEST_LEN];
        }
        return;
    }

    for i in 0..size {
        hasher.update(&*out);
        let digest = hasher.clone().finalize();
        out[i] = digest[i % DIGEST_LEN];
    }
}

fn length_prefix(len: usize) -> [u8; 4] {
    u32::try_from(len).unwrap_or(u32::MAX).to_le_bytes()
}
