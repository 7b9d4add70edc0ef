//! Shared fixtures for benchmarks and end-to-end tests: mixed Big5/Latin
//! corpora of known shape, plus a scaling helper for larger runs.

use bfx_core::config::EngineConfig;
use bfx_indexer::IndexEngine;
use bfx_storage::store::MemDupStore;

/// Two Chinese characters, traditional Big5 encoding, each repeated to
/// build up runs of varying length.
pub const NI_HAO: [u8; 4] = [0xA7, 0x41, 0xA6, 0x6E]; // 你好
pub const SHI_JIE: [u8; 4] = [0xA5, 0x40, 0xAC, 0xC9]; // 世界

/// A short mixed-language document: an English sentence followed by a
/// Big5 greeting, mirroring how the retrieval adapter's entries mix
/// scripts in practice.
pub fn mixed_document(n: &str) -> Vec<u8> {
    let mut body = format!("welcome to document {n} please read on ").into_bytes();
    body.extend_from_slice(&NI_HAO);
    body.extend_from_slice(b" ");
    body.extend_from_slice(&SHI_JIE);
    body
}

/// `count` documents, each with a distinct body, for throughput runs.
pub fn corpus(count: usize) -> Vec<(String, Vec<u8>)> {
    (0..count).map(|i| (format!("doc-{i}"), mixed_document(&i.to_string()))).collect()
}

/// A fresh in-memory engine preloaded with [`corpus`] of the given size.
pub fn preloaded_engine(count: usize) -> IndexEngine<MemDupStore> {
    let mut engine = IndexEngine::new(MemDupStore::new(), EngineConfig::default());
    for (key, body) in corpus(count) {
        engine.insert(key.as_bytes(), &body).unwrap();
    }
    engine
}
