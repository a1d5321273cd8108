//! Address classification: precompile/zero exclusion and the implicit-address
//! heuristic used to pull 20-byte values out of 32-byte trace/log words.

use alloy_primitives::Address;

/// Largest value reserved for precompiles (EIP-1352); anything at or below
/// this, plus the zero address, is never indexed as a "real" address.
const PRECOMPILE_CEILING: u64 = 0x0000_0000_0000_ffff;

/// Legacy sentinel substituted for a zero-address block/uncle author whose
/// reward was burned. Preserved verbatim for compatibility with existing
/// downstream index readers.
pub const BURN_SENTINEL: Address = Address::new([
    0xde, 0xad, 0xde, 0xad, 0xde, 0xad, 0xde, 0xad, 0xde, 0xad, 0xde, 0xad, 0xde, 0xad, 0xde, 0xad,
    0xde, 0xad, 0xde, 0xad,
]);

/// Reserved transaction-index sentinels used for non-transaction appearances.
pub mod sentinel_txid {
    /// External (xDai-style) reward.
    pub const EXTERNAL_REWARD: u32 = 99_996;
    /// Burned block reward (author was the zero address).
    pub const BURNED_BLOCK_REWARD: u32 = 99_997;
    /// Uncle reward (also used for a burned/zero-address uncle author).
    pub const UNCLE_REWARD: u32 = 99_998;
    /// Block (miner) reward.
    pub const BLOCK_REWARD: u32 = 99_999;
}

/// Returns the address's value as a `u64` if every byte above the low 8 is
/// zero, i.e. the address would fit in a `u64`. Used to compare against
/// [`PRECOMPILE_CEILING`].
fn low_u64(address: &Address) -> Option<u64> {
    let bytes = address.as_slice();
    if bytes[..12].iter().any(|&b| b != 0) {
        return None;
    }
    Some(u64::from_be_bytes(bytes[12..20].try_into().unwrap()))
}

/// True if `address` is neither the zero address nor a reserved precompile
/// address. Reward sentinels (including [`BURN_SENTINEL`]) are inserted
/// without going through this filter.
pub fn is_real_address(address: &Address) -> bool {
    match low_u64(address) {
        Some(value) => value > PRECOMPILE_CEILING,
        None => true,
    }
}

/// Scans a 32-byte trace/log word for an implicit address per the heuristic:
/// at least 12 leading zero bytes, not a "numeric value" (low 8 bytes only),
/// no 4 trailing zero bytes, and the remaining 20 bytes are not a precompile.
///
/// Returns `None` when the word fails any gate.
pub fn implicit_address(word: &[u8; 32]) -> Option<Address> {
    // A value whose low 8 bytes are set and everything else is zero is
    // assumed to be a plain numeric value, not an address.
    if word[..24].iter().all(|&b| b == 0) {
        return None;
    }
    if word[..12].iter().any(|&b| b != 0) {
        return None;
    }
    if word[28..32] == [0, 0, 0, 0] {
        return None;
    }
    let address = Address::from_slice(&word[12..32]);
    is_real_address(&address).then_some(address)
}

/// Canonical lowercase `0x`-prefixed rendering used throughout the on-disk
/// index (`alloy_primitives::Address`'s `Display` impl emits EIP-55 checksum
/// casing, which the ripe/chunk file formats do not want).
pub fn format_lower(address: &Address) -> String {
    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for byte in address.as_slice() {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Scans `data` in 32-byte windows (after skipping the leading 4-byte ABI
/// selector when `skip_selector` is set) for implicit addresses.
pub fn scan_implicit_addresses(data: &[u8], skip_selector: bool) -> Vec<Address> {
    let data = if skip_selector && data.len() > 4 {
        &data[4..]
    } else if skip_selector {
        return Vec::new();
    } else {
        data
    };
    data.chunks_exact(32)
        .filter_map(|chunk| implicit_address(chunk.try_into().unwrap()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_from_address(address: &Address) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[12..32].copy_from_slice(address.as_slice());
        word
    }

    #[test]
    fn real_address_round_trips_through_scanner() {
        let address = Address::new([0xaa; 20]);
        let word = word_from_address(&address);
        assert_eq!(implicit_address(&word), Some(address));
    }

    #[test]
    fn numeric_value_is_rejected() {
        let mut word = [0u8; 32];
        word[24..32].copy_from_slice(&u64::MAX.to_be_bytes());
        assert_eq!(implicit_address(&word), None);
    }

    #[test]
    fn trailing_zero_suffix_is_rejected() {
        let mut word = [0u8; 32];
        word[12..28].copy_from_slice(&[0xaa; 16]);
        // last 4 bytes left zero
        assert_eq!(implicit_address(&word), None);
    }

    #[test]
    fn precompile_is_rejected_even_with_enough_leading_zeros() {
        let mut word = [0u8; 32];
        word[31] = 0x09; // address 0x...09, below the precompile ceiling
        assert_eq!(implicit_address(&word), None);
    }

    #[test]
    fn zero_address_is_not_real() {
        assert!(!is_real_address(&Address::ZERO));
    }

    #[test]
    fn burn_sentinel_renders_verbatim() {
        assert_eq!(
            format_lower(&BURN_SENTINEL),
            "0xdeaddeaddeaddeaddeaddeaddeaddeaddeaddead"
        );
    }
}
