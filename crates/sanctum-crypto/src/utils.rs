//! Common utility functions for sanctum cryptographic operations.

use rand::RngCore;
use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current Unix timestamp in seconds.
///
/// This is the single source of truth for timestamp generation across the
/// subsystem (vault `created_at`, attempt-limiter windows, lease expiry).
///
/// # Panics
///
/// Panics if the system time is set before the Unix epoch.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("System time is before Unix epoch")
        .as_secs()
}

/// Generate cryptographically secure random bytes.
///
/// # Example
///
/// ```
/// use sanctum_crypto::generate_random_bytes;
///
/// let nonce: [u8; 24] = generate_random_bytes();
/// let salt: [u8; 32] = generate_random_bytes();
/// ```
pub fn generate_random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_timestamp() {
        let ts1 = current_timestamp();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let ts2 = current_timestamp();

        assert!(ts2 >= ts1, "Timestamp should increase with time");
        assert!(ts1 > 1_700_000_000, "Timestamp should be after Nov 2023");
    }

    #[test]
    fn test_generate_random_bytes_different() {
        let bytes1: [u8; 32] = generate_random_bytes();
        let bytes2: [u8; 32] = generate_random_bytes();
        assert_ne!(bytes1, bytes2, "Random bytes should be different");
    }

    #[test]
    fn test_generate_random_bytes_sizes() {
        let _small: [u8; 16] = generate_random_bytes();
        let _medium: [u8; 32] = generate_random_bytes();
        let _large: [u8; 64] = generate_random_bytes();
    }
}
