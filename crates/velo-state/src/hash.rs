//! Content and command hashing
//!
//! Content digests use SHA-256 and are rendered with a `sha256:` prefix so
//! manifests stay readable across digest upgrades. The command hash is a
//! 64-bit FNV-1a over the ordered flag list with a separator byte folded in
//! after each element, so `["ab"]` and `["a", "b"]` hash differently.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Separator folded into the flag hash after each element
const FLAG_SEPARATOR: u8 = 0xff;

/// Separator between per-source digests in the combined source hash
const DIGEST_SEPARATOR: u8 = b'\n';

/// Prefix identifying the content digest algorithm in rendered hashes
pub const DIGEST_PREFIX: &str = "sha256:";

/// FNV-1a over a byte slice
pub fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// 64-bit hash of an ordered flag list
pub fn hash_flags<S: AsRef<str>>(flags: &[S]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for flag in flags {
        for &byte in flag.as_ref().as_bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        hash ^= u64::from(FLAG_SEPARATOR);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// SHA-256 digest of a byte slice, rendered with the algorithm prefix
pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{DIGEST_PREFIX}{:x}", hasher.finalize())
}

/// SHA-256 digest of a file's content, streamed in 8 KiB chunks
pub fn digest_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{DIGEST_PREFIX}{:x}", hasher.finalize()))
}

/// Combine per-source digests into one digest, preserving the given order.
/// A separator byte between entries keeps adjacent digests from aliasing.
pub fn combine_digests<S: AsRef<str>>(digests: &[S]) -> String {
    let mut hasher = Sha256::new();
    for digest in digests {
        hasher.update(digest.as_ref().as_bytes());
        hasher.update([DIGEST_SEPARATOR]);
    }
    format!("{DIGEST_PREFIX}{:x}", hasher.finalize())
}
