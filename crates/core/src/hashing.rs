//! Idempotency id derivation for published events.
//!
//! Republishing a tick after a crash must yield byte-identical message ids so that
//! downstream consumers can collapse duplicates. The id therefore depends only on the
//! event coordinates, never on wall-clock time or process state.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::types::{Epoch, Tick};

/// Compute the idempotency id of an event.
///
/// The digest input is `epoch (u32 LE) || tick (u32 LE) || event_id (u64 LE) ||
/// event_digest (u64 LE) || transaction_hash (raw bytes)`, hashed with SHA-256 and
/// encoded as standard padded base64.
///
/// # Example
///
/// ```
/// use tickstream_core::hashing::idempotency_id;
///
/// let a = idempotency_id(153, 21_679_416, 13_857, 42, "tx");
/// let b = idempotency_id(153, 21_679_416, 13_857, 42, "tx");
/// assert_eq!(a, b);
/// ```
pub fn idempotency_id(
    epoch: Epoch,
    tick: Tick,
    event_id: u64,
    event_digest: u64,
    transaction_hash: &str,
) -> String {
    let mut data = Vec::with_capacity(24 + transaction_hash.len());
    data.extend_from_slice(&epoch.to_le_bytes());
    data.extend_from_slice(&tick.to_le_bytes());
    data.extend_from_slice(&event_id.to_le_bytes());
    data.extend_from_slice(&event_digest.to_le_bytes());
    data.extend_from_slice(transaction_hash.as_bytes());

    STANDARD.encode(Sha256::digest(&data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        let id = idempotency_id(
            153,
            21_679_416,
            13_857,
            1_715_952_909_454_684_526,
            "wjydyydyoltqlfdvnldtqqargoiamutsfqjnojyjhemhbrckrvxeyjodnfil",
        );
        assert_eq!(id, "Jhk7NpjwByhV2IRRj0tYjmfOkxqez7nkYYh+u8BgZwc=");
    }

    #[test]
    fn test_zero_coordinates_without_hash() {
        // 24 zero bytes
        assert_eq!(
            idempotency_id(0, 0, 0, 0, ""),
            "nZCOz7ayVt74tJp8UE5siJxLDkH+bOPgGGPde2GiCqA="
        );
    }

    #[test]
    fn test_every_coordinate_changes_id() {
        let base = idempotency_id(1, 2, 3, 4, "tx");
        assert_ne!(base, idempotency_id(9, 2, 3, 4, "tx"));
        assert_ne!(base, idempotency_id(1, 9, 3, 4, "tx"));
        assert_ne!(base, idempotency_id(1, 2, 9, 4, "tx"));
        assert_ne!(base, idempotency_id(1, 2, 3, 9, "tx"));
        assert_ne!(base, idempotency_id(1, 2, 3, 4, "ty"));
    }

    #[test]
    fn test_id_is_base64_of_32_bytes() {
        let id = idempotency_id(120, 1230, 7, 8, "abc");
        let decoded = STANDARD.decode(&id).unwrap();
        assert_eq!(decoded.len(), 32);
    }
}
