//! Column family definitions for RocksDB.
//!
//! Each column family isolates data with different access patterns:
//! - parse_cache: write-once extraction results (keep-first merge)
//! - records: invoice records by ULID
//! - records_by_hash: content-hash -> record-id pointers
//! - vendors: canonical vendors (associative aggregate merge)
//! - embedding_cache: vector bytes keyed by text hash + provider + mode
//! - embed_outbox: queue of record ids awaiting embedding (FIFO compaction)

use rocksdb::{ColumnFamilyDescriptor, MergeOperands, Options};

use invodex_types::Vendor;

/// Column family for content-addressed extraction results
pub const CF_PARSE_CACHE: &str = "parse_cache";

/// Column family for invoice records
pub const CF_RECORDS: &str = "records";

/// Column family for content-hash -> record-id pointers
pub const CF_RECORDS_BY_HASH: &str = "records_by_hash";

/// Column family for canonical vendors
pub const CF_VENDORS: &str = "vendors";

/// Column family for cached embedding vectors
pub const CF_EMBED_CACHE: &str = "embedding_cache";

/// Column family for the pending-embedding queue
pub const CF_EMBED_OUTBOX: &str = "embed_outbox";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[
    CF_PARSE_CACHE,
    CF_RECORDS,
    CF_RECORDS_BY_HASH,
    CF_VENDORS,
    CF_EMBED_CACHE,
    CF_EMBED_OUTBOX,
];

/// Keep-first merge: the first value written under a key is canonical and
/// every later operand is discarded. This is what makes parse-cache writes
/// insert-if-absent without any application-level locking.
fn keep_first_merge(
    _key: &[u8],
    existing: Option<&[u8]>,
    operands: &MergeOperands,
) -> Option<Vec<u8>> {
    match existing {
        Some(value) => Some(value.to_vec()),
        None => operands.iter().next().map(|op| op.to_vec()),
    }
}

/// Vendor aggregate merge: fold every operand (a seed vendor for one record)
/// into the stored vendor. `Vendor::absorb` is associative, so RocksDB may
/// group operands however it likes and the totals come out the same.
fn vendor_merge(_key: &[u8], existing: Option<&[u8]>, operands: &MergeOperands) -> Option<Vec<u8>> {
    let mut merged: Option<Vendor> = existing.and_then(|v| serde_json::from_slice(v).ok());

    for op in operands.iter() {
        let seed: Vendor = match serde_json::from_slice(op) {
            Ok(v) => v,
            // An undecodable operand is dropped rather than poisoning the key.
            Err(_) => continue,
        };
        match merged.as_mut() {
            Some(vendor) => vendor.absorb(&seed),
            None => merged = Some(seed),
        }
    }

    merged.and_then(|v| serde_json::to_vec(&v).ok())
}

fn parse_cache_options() -> Options {
    let mut opts = Options::default();
    opts.set_merge_operator_associative("keep_first", keep_first_merge);
    opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
    opts
}

fn records_by_hash_options() -> Options {
    let mut opts = Options::default();
    // First record to claim a content hash owns it; later claims lose.
    opts.set_merge_operator_associative("keep_first", keep_first_merge);
    opts
}

fn vendors_options() -> Options {
    let mut opts = Options::default();
    opts.set_merge_operator_associative("vendor_absorb", vendor_merge);
    opts
}

fn outbox_options() -> Options {
    let mut opts = Options::default();
    // FIFO compaction for queue-like workload
    opts.set_compaction_style(rocksdb::DBCompactionStyle::Fifo);
    opts.set_fifo_compaction_options(&rocksdb::FifoCompactOptions::default());
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_PARSE_CACHE, parse_cache_options()),
        ColumnFamilyDescriptor::new(CF_RECORDS, Options::default()),
        ColumnFamilyDescriptor::new(CF_RECORDS_BY_HASH, records_by_hash_options()),
        ColumnFamilyDescriptor::new(CF_VENDORS, vendors_options()),
        ColumnFamilyDescriptor::new(CF_EMBED_CACHE, Options::default()),
        ColumnFamilyDescriptor::new(CF_EMBED_OUTBOX, outbox_options()),
    ]
}
