//! Synthetic `$id` generation
//!
//! Every node and edge the mapper writes is stamped with a `$id` string.
//! The default scheme is cuid-like: a lowercase alphanumeric string built
//! from a millisecond timestamp, a per-process counter, a process
//! fingerprint, and a BLAKE3-derived random block. Ids never need escaping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use blake3::Hasher;

/// Source of synthetic identifiers
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

impl<F> IdGenerator for F
where
    F: Fn() -> String + Send + Sync,
{
    fn next_id(&self) -> String {
        self()
    }
}

const BASE: u128 = 36;
const BLOCK: usize = 4;
const COUNTER_SPACE: u64 = 36 * 36 * 36 * 36;

/// Default generator: `c` + timestamp(8) + counter(4) + fingerprint(4) + random(8)
pub struct CuidGenerator {
    counter: AtomicU64,
    seed: [u8; 32],
    fingerprint: String,
}

impl CuidGenerator {
    pub fn new() -> Self {
        let pid = std::process::id();
        let started = now_nanos();

        let mut hasher = Hasher::new();
        hasher.update(&pid.to_le_bytes());
        hasher.update(&started.to_le_bytes());
        if let Ok(host) = std::env::var("HOSTNAME") {
            hasher.update(host.as_bytes());
        }
        let seed = *hasher.finalize().as_bytes();

        let fingerprint = to_base36(u128::from(pid), 2) + &to_base36(hash_prefix(&seed), 2);

        Self {
            counter: AtomicU64::new(0),
            seed,
            fingerprint,
        }
    }

    fn random_block(&self, count: u64, nanos: u128) -> String {
        let mut hasher = Hasher::new_keyed(&self.seed);
        hasher.update(&count.to_le_bytes());
        hasher.update(&nanos.to_le_bytes());
        let hash = hasher.finalize();
        to_base36(hash_prefix(hash.as_bytes()), BLOCK * 2)
    }
}

impl Default for CuidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for CuidGenerator {
    fn next_id(&self) -> String {
        let nanos = now_nanos();
        let count = self.counter.fetch_add(1, Ordering::Relaxed);

        let mut id = String::with_capacity(25);
        id.push('c');
        id.push_str(&to_base36(nanos / 1_000_000, BLOCK * 2));
        id.push_str(&to_base36(u128::from(count % COUNTER_SPACE), BLOCK));
        id.push_str(&self.fingerprint);
        id.push_str(&self.random_block(count, nanos));
        id
    }
}

fn now_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}

fn hash_prefix(bytes: &[u8]) -> u128 {
    let mut buf = [0u8; 16];
    buf.copy_from_slice(&bytes[0..16]);
    u128::from_le_bytes(buf)
}

/// Base-36 rendering padded or truncated to exactly `width` digits
/// (the least significant digits are kept)
fn to_base36(mut n: u128, width: usize) -> String {
    let mut digits = Vec::with_capacity(width);
    for _ in 0..width {
        let d = (n % BASE) as u32;
        digits.push(char::from_digit(d, BASE as u32).unwrap_or('0'));
        n /= BASE;
    }
    digits.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_are_unique() {
        let gen = CuidGenerator::new();
        let ids: HashSet<String> = (0..10_000).map(|_| gen.next_id()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn test_id_format() {
        let gen = CuidGenerator::new();
        let id = gen.next_id();
        assert_eq!(id.len(), 25);
        assert!(id.starts_with('c'));
        assert!(id.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn test_separate_generators_differ() {
        let a = CuidGenerator::new();
        let b = CuidGenerator::new();
        assert_ne!(a.next_id(), b.next_id());
    }

    #[test]
    fn test_closure_generator() {
        let counter = AtomicU64::new(0);
        let gen = move || format!("id-{}", counter.fetch_add(1, Ordering::SeqCst));
        assert_eq!(gen.next_id(), "id-0");
        assert_eq!(gen.next_id(), "id-1");
    }

    #[test]
    fn test_to_base36() {
        assert_eq!(to_base36(0, 4), "0000");
        assert_eq!(to_base36(35, 2), "0z");
        assert_eq!(to_base36(36, 2), "10");
        // Truncates to the low digits
        assert_eq!(to_base36(36 * 36 * 36, 2), "00");
    }
}
