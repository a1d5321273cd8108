//! Fixed-width, byte-exact `.bin` chunk format (§3/§6): header, address
//! table, appearance table. Hand-written with `to_le_bytes`/`from_le_bytes`
//! rather than a general serde codec — the layout is an external reader
//! contract that a length-prefixed collection encoding would not reproduce.

use std::collections::BTreeMap;

use alloy_primitives::{keccak256, Address};

/// Identifies this crate's writer; readers reject any other value.
pub const MAGIC: u32 = 0x4352_4931;

const ADDRESS_RECORD_LEN: usize = 20 + 4 + 4;
const APPEARANCE_RECORD_LEN: usize = 4 + 4;
const HEADER_LEN: usize = 4 + 32 + 4 + 4;

/// One row of the address table: the address plus where its appearances live
/// in the appearance table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    /// The address.
    pub address: Address,
    /// Offset (in records) into the appearance table.
    pub offset: u32,
    /// Number of appearance records belonging to this address.
    pub count: u32,
}

/// One row of the appearance table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct AppearanceRecord {
    /// Block number.
    pub block: u32,
    /// Transaction index (or reward sentinel).
    pub txid: u32,
}

/// A fully assembled chunk, ready to serialize.
#[derive(Debug, Clone)]
pub struct ChunkData {
    /// Sorted, deduplicated address → appearances map.
    pub by_address: BTreeMap<Address, Vec<AppearanceRecord>>,
}

impl ChunkData {
    /// Builds address/appearance tables from a sorted map, assigning offsets
    /// in address order (so the appearance table is grouped by address, as
    /// required by §3's invariants).
    pub fn tables(&self) -> (Vec<AddressRecord>, Vec<AppearanceRecord>) {
        let mut addresses = Vec::with_capacity(self.by_address.len());
        let mut appearances = Vec::new();
        for (address, records) in &self.by_address {
            let offset = appearances.len() as u32;
            appearances.extend_from_slice(records);
            addresses.push(AddressRecord {
                address: *address,
                offset,
                count: records.len() as u32,
            });
        }
        (addresses, appearances)
    }

    /// Serializes the `.bin` contents: header, address table, appearance
    /// table, in that order.
    pub fn encode(&self) -> Vec<u8> {
        let (addresses, appearances) = self.tables();
        let mut address_bytes = Vec::with_capacity(addresses.len() * ADDRESS_RECORD_LEN);
        for record in &addresses {
            address_bytes.extend_from_slice(record.address.as_slice());
            address_bytes.extend_from_slice(&record.offset.to_le_bytes());
            address_bytes.extend_from_slice(&record.count.to_le_bytes());
        }
        let mut appearance_bytes = Vec::with_capacity(appearances.len() * APPEARANCE_RECORD_LEN);
        for record in &appearances {
            appearance_bytes.extend_from_slice(&record.block.to_le_bytes());
            appearance_bytes.extend_from_slice(&record.txid.to_le_bytes());
        }

        let mut combined = Vec::with_capacity(address_bytes.len() + appearance_bytes.len());
        combined.extend_from_slice(&address_bytes);
        combined.extend_from_slice(&appearance_bytes);
        let hash = keccak256(&combined);

        let mut out = Vec::with_capacity(HEADER_LEN + combined.len());
        out.extend_from_slice(&MAGIC.to_le_bytes());
        out.extend_from_slice(hash.as_slice());
        out.extend_from_slice(&(addresses.len() as u32).to_le_bytes());
        out.extend_from_slice(&(appearances.len() as u32).to_le_bytes());
        out.extend_from_slice(&combined);
        out
    }

    /// Every distinct address in the chunk, for feeding the bloom builder.
    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.by_address.keys()
    }
}

/// Parsed header fields of a `.bin` file, for the invariant tests; a real
/// reader (out of scope here) would go on to parse the tables too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Writer identifier; must equal [`MAGIC`].
    pub magic: u32,
    /// Content hash of `address_table || appearance_table`.
    pub hash: [u8; 32],
    /// Number of address-table records.
    pub address_count: u32,
    /// Number of appearance-table records.
    pub appearance_count: u32,
}

/// Decodes just the header, for tests that check round-tripping without
/// reimplementing a full reader.
pub fn decode_header(bytes: &[u8]) -> Option<ChunkHeader> {
    if bytes.len() < HEADER_LEN {
        return None;
    }
    Some(ChunkHeader {
        magic: u32::from_le_bytes(bytes[0..4].try_into().ok()?),
        hash: bytes[4..36].try_into().ok()?,
        address_count: u32::from_le_bytes(bytes[36..40].try_into().ok()?),
        appearance_count: u32::from_le_bytes(bytes[40..44].try_into().ok()?),
    })
}

/// Decodes the address table that follows the header, for invariant tests.
pub fn decode_address_table(bytes: &[u8], address_count: u32) -> Option<Vec<AddressRecord>> {
    let mut out = Vec::with_capacity(address_count as usize);
    let mut offset = HEADER_LEN;
    for _ in 0..address_count {
        if bytes.len() < offset + ADDRESS_RECORD_LEN {
            return None;
        }
        let address = Address::from_slice(&bytes[offset..offset + 20]);
        let record_offset = u32::from_le_bytes(bytes[offset + 20..offset + 24].try_into().ok()?);
        let count = u32::from_le_bytes(bytes[offset + 24..offset + 28].try_into().ok()?);
        out.push(AddressRecord {
            address,
            offset: record_offset,
            count,
        });
        offset += ADDRESS_RECORD_LEN;
    }
    Some(out)
}
