//! Benchmarks extraction and bloom-page construction. Adapted from the
//! teacher's mainnet/optimism criterion benches: same `harness = false`
//! shape, now timing `extract::from_logs` and bloom inserts instead of EVM
//! execution.

use appearance_index::chunk::bloom::build_page;
use appearance_index::extract::from_logs;
use appearance_index::rpc::types::Log;
use alloy_primitives::{Address, Bytes, Log as PrimLog};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn make_logs(count: usize) -> Vec<Log> {
    (0..count)
        .map(|i| {
            let mut data = vec![0u8; 12];
            data.extend_from_slice(&[i as u8; 20]);
            Log {
                inner: PrimLog::new_unchecked(Address::ZERO, vec![], Bytes::from(data)),
                block_hash: None,
                block_number: None,
                block_timestamp: None,
                transaction_hash: None,
                transaction_index: Some(i as u64),
                log_index: None,
                removed: false,
            }
        })
        .collect()
}

fn bench_extract_from_logs(c: &mut Criterion) {
    let logs = make_logs(500);
    c.bench_function("extract_from_logs_500", |b| {
        b.iter(|| from_logs(black_box(1), black_box(&logs)))
    });
}

fn bench_bloom_build_page(c: &mut Criterion) {
    let addresses: Vec<Address> = (0u32..2000)
        .map(|i| {
            let mut bytes = [0u8; 20];
            bytes[16..20].copy_from_slice(&i.to_le_bytes());
            Address::new(bytes)
        })
        .collect();
    c.bench_function("bloom_build_page_2000", |b| {
        b.iter(|| build_page(black_box(addresses.iter())))
    });
}

criterion_group!(benches, bench_extract_from_logs, bench_bloom_build_page);
criterion_main!(benches);
