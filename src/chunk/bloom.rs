//! Multi-hash address-membership bloom filter with zero false negatives.
//! Parameters are a frozen on-disk contract (§9 open-question resolution):
//! one [`PAGE_BYTES`]-byte page per finalized chunk, [`K_HASHES`] independent
//! bit positions per inserted address, derived from non-overlapping 4-byte
//! windows of `keccak256(address)`.

use alloy_primitives::{keccak256, Address};

/// Width of one bloom page, in bytes. 1024 bytes = 8192 bits.
pub const PAGE_BYTES: usize = 1024;
/// Bits per page.
pub const PAGE_BITS: usize = PAGE_BYTES * 8;
/// Independent hash positions set per inserted address.
pub const K_HASHES: usize = 3;

/// One chunk's worth of bloom bits: a single fixed-width page.
#[derive(Debug, Clone)]
pub struct BloomPage {
    bits: Box<[u8; PAGE_BYTES]>,
}

impl Default for BloomPage {
    fn default() -> Self {
        Self {
            bits: Box::new([0u8; PAGE_BYTES]),
        }
    }
}

impl BloomPage {
    /// A fresh, all-zero page.
    pub fn new() -> Self {
        Self::default()
    }

    /// The `K_HASHES` bit positions an address maps to.
    fn positions(address: &Address) -> [usize; K_HASHES] {
        let digest = keccak256(address.as_slice());
        let mut positions = [0usize; K_HASHES];
        for (i, pos) in positions.iter_mut().enumerate() {
            let window: [u8; 4] = digest[i * 4..i * 4 + 4].try_into().unwrap();
            *pos = (u32::from_le_bytes(window) as usize) % PAGE_BITS;
        }
        positions
    }

    /// Marks `address` as present.
    pub fn insert(&mut self, address: &Address) {
        for pos in Self::positions(address) {
            self.bits[pos / 8] |= 1 << (pos % 8);
        }
    }

    /// True if `address` *might* be present; false means it definitely isn't.
    pub fn contains(&self, address: &Address) -> bool {
        Self::positions(address)
            .iter()
            .all(|&pos| self.bits[pos / 8] & (1 << (pos % 8)) != 0)
    }

    /// Raw page bytes, for writing the `.bloom` sidecar.
    pub fn as_bytes(&self) -> &[u8; PAGE_BYTES] {
        &self.bits
    }

    /// Reconstructs a page from sidecar bytes.
    pub fn from_bytes(bytes: [u8; PAGE_BYTES]) -> Self {
        Self {
            bits: Box::new(bytes),
        }
    }
}

/// Builds a single-page bloom filter covering every address in `addresses`.
pub fn build_page<'a>(addresses: impl Iterator<Item = &'a Address>) -> BloomPage {
    let mut page = BloomPage::new();
    for address in addresses {
        page.insert(address);
    }
    page
}

/// Serializes the `.bloom` sidecar: a `u32` page count followed by that many
/// `PAGE_BYTES`-byte pages (one page per finalized chunk in this crate, so
/// the count is always 1, but the format allows more).
pub fn encode_sidecar(pages: &[BloomPage]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + pages.len() * PAGE_BYTES);
    out.extend_from_slice(&(pages.len() as u32).to_le_bytes());
    for page in pages {
        out.extend_from_slice(page.as_bytes());
    }
    out
}

/// Parses a `.bloom` sidecar back into its pages.
pub fn decode_sidecar(bytes: &[u8]) -> Option<Vec<BloomPage>> {
    if bytes.len() < 4 {
        return None;
    }
    let count = u32::from_le_bytes(bytes[0..4].try_into().ok()?) as usize;
    let expected = 4 + count * PAGE_BYTES;
    if bytes.len() != expected {
        return None;
    }
    let mut pages = Vec::with_capacity(count);
    for i in 0..count {
        let start = 4 + i * PAGE_BYTES;
        let page_bytes: [u8; PAGE_BYTES] = bytes[start..start + PAGE_BYTES].try_into().ok()?;
        pages.push(BloomPage::from_bytes(page_bytes));
    }
    Some(pages)
}
