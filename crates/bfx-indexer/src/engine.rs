use bfx_core::config::EngineConfig;
use bfx_core::docid::DocId;
use bfx_storage::codec::encode_records;
use bfx_storage::store::DupStore;

use crate::error::IndexError;
use crate::router::Routing;
use crate::scoring::{evaluate_routed, QueryMode, ScoreMap};
use crate::sharded_store::ShardedStore;

/// Reserved meta key: next [`DocId`] to hand out.
const META_IDXCOUNT: &str = "_idxcount";
/// Reserved meta key: newline-free list of deleted doc ids (4 BE bytes each,
/// concatenated).
const META_DELETED: &str = "_deleted";
/// Reserved meta key: the shard count this engine was opened with, set once
/// on first construction and thereafter just read back.
const META_SUBCOUNT: &str = "_subcount";

fn meta_doc_key(id: DocId) -> String {
    format!("!key:{}", id.0)
}

/// Disk-backed inverted-index engine: owns doc-id assignment, the
/// Big5/Latin posting store, tombstone deletes, and ad-hoc caller
/// variables, and exposes the scoring evaluator as [`IndexEngine::query`].
///
/// Document keys are arbitrary bytes, not necessarily valid UTF-8: a Big5
/// document's own content is a legitimate key.
pub struct IndexEngine<S: DupStore> {
    store: ShardedStore<S>,
    routing: Routing,
}

impl<S: DupStore> IndexEngine<S> {
    /// An unsharded engine over a single store.
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self::new_sharded(store, Vec::new(), config)
    }

    /// An engine over a primary store plus one store per shard this process
    /// owns. `shards[i]` holds shard index `config.submin + i`; pass an
    /// empty `Vec` when `config` doesn't enable sharding.
    pub fn new_sharded(primary: S, shards: Vec<S>, config: EngineConfig) -> Self {
        let routing = Routing::from_config(&config);
        let mut store = ShardedStore::new(primary, shards, routing);
        init_subcount(&mut store, config.subcount);
        Self { store, routing }
    }

    pub fn routing(&self) -> Routing {
        self.routing
    }

    /// The shard count this engine was opened with (0 if sharding is
    /// disabled), read back from `_subcount`.
    pub fn subcount(&self) -> Result<u32, IndexError> {
        Ok(self
            .store
            .get_meta(META_SUBCOUNT)?
            .and_then(|bytes| bytes.try_into().ok())
            .map(u32::from_be_bytes)
            .unwrap_or(0))
    }

    fn next_doc_id(&mut self) -> Result<DocId, IndexError> {
        let current = self
            .store
            .get_meta(META_IDXCOUNT)?
            .and_then(|bytes| bytes.try_into().ok())
            .map(DocId::from_be_bytes);
        let next = match current {
            None => DocId::FIRST,
            Some(id) if id.0 == u32::MAX => return Err(IndexError::DocCounterOverflow),
            Some(id) => id.next(),
        };
        self.store.set_meta(META_IDXCOUNT, &next.to_be_bytes())?;
        Ok(next)
    }

    /// Look up the [`DocId`] already assigned to `doc_key`, if any, by a
    /// linear scan of the `!key:<id>` entries up to the current doc count.
    #[tracing::instrument(skip(self, doc_key))]
    pub fn find_key(&self, doc_key: &[u8]) -> Result<Option<DocId>, IndexError> {
        let count = self.doc_count()?;
        for n in 1..=count {
            let id = DocId(n);
            if self.get_key(id)?.as_deref() == Some(doc_key) {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    /// The document key a given [`DocId`] was inserted under, or `None` if
    /// the id has never been assigned or has since been deleted.
    pub fn get_key(&self, id: DocId) -> Result<Option<Vec<u8>>, IndexError> {
        Ok(self.store.get_meta(&meta_doc_key(id))?)
    }

    /// Parse `body` and index it under `doc_key`, allocating a fresh id.
    /// Doc ids are never reused or renumbered, even for a repeated key —
    /// callers that want update-in-place semantics should `delete` the old
    /// entry themselves first and track the returned id.
    #[tracing::instrument(skip(self, doc_key, body), fields(body_len = body.len()))]
    pub fn insert(&mut self, doc_key: &[u8], body: &[u8]) -> Result<DocId, IndexError> {
        let id = self.next_doc_id()?;
        self.store.set_meta(&meta_doc_key(id), doc_key)?;

        let tokens = bfx_parser::parse(body, false);
        for (key, record) in encode_records(id, &tokens) {
            self.store.insert(&key, &record.encode())?;
        }
        Ok(id)
    }

    /// Mark `doc_key`'s document deleted. Matching postings remain on disk
    /// (the engine is append-only for postings) but deleted ids are
    /// filtered out of query results, and their doc-key mapping is removed
    /// so neither `find_key` nor `get_key` can resolve them again.
    #[tracing::instrument(skip(self, doc_key))]
    pub fn delete(&mut self, doc_key: &[u8]) -> Result<bool, IndexError> {
        let Some(id) = self.find_key(doc_key)? else {
            return Ok(false);
        };
        self.tombstone(id)?;
        Ok(true)
    }

    /// Mark `id`'s document deleted directly, without a `doc_key` lookup.
    #[tracing::instrument(skip(self))]
    pub fn delete_id(&mut self, id: DocId) -> Result<bool, IndexError> {
        if self.get_key(id)?.is_none() {
            return Ok(false);
        }
        self.tombstone(id)?;
        Ok(true)
    }

    fn tombstone(&mut self, id: DocId) -> Result<(), IndexError> {
        let mut deleted = self.deleted_ids()?;
        if !deleted.contains(&id) {
            deleted.push(id);
            self.store.set_meta(META_DELETED, &encode_deleted(&deleted))?;
        }
        self.store.delete_meta(&meta_doc_key(id))?;
        Ok(())
    }

    pub fn is_deleted(&self, id: DocId) -> Result<bool, IndexError> {
        Ok(self.deleted_ids()?.contains(&id))
    }

    fn deleted_ids(&self) -> Result<Vec<DocId>, IndexError> {
        Ok(self.store.get_meta(META_DELETED)?.map(|b| decode_deleted(&b)).unwrap_or_default())
    }

    /// Every live (non-deleted) document key, in ascending id order.
    pub fn list_keys(&self) -> Result<Vec<Vec<u8>>, IndexError> {
        let count = self.doc_count()?;
        let mut out = Vec::new();
        for n in 1..=count {
            if let Some(key) = self.get_key(DocId(n))? {
                out.push(key);
            }
        }
        Ok(out)
    }

    /// Set a caller-defined variable, namespaced away from reserved keys.
    pub fn set_var(&mut self, name: &str, value: &[u8]) -> Result<(), IndexError> {
        Ok(self.store.set_meta(&format!("var:{name}"), value)?)
    }

    pub fn get_var(&self, name: &str) -> Result<Option<Vec<u8>>, IndexError> {
        Ok(self.store.get_meta(&format!("var:{name}"))?)
    }

    /// Parse `query_text` and score it against the index under `mode`,
    /// starting from `prior` (an empty accumulator if this is the first
    /// call in a chain). Deleted documents are filtered from the result.
    #[tracing::instrument(skip(self, query_text, prior), fields(mode = ?mode))]
    pub fn query(
        &self,
        query_text: &[u8],
        mode: QueryMode,
        prior: Option<&ScoreMap>,
    ) -> Result<ScoreMap, IndexError> {
        let tokens = bfx_parser::parse(query_text, true);
        let mut scores = evaluate_routed(&self.store, &tokens, mode, prior, &self.routing)?;
        let deleted = self.deleted_ids()?;
        scores.retain(|id, _| !deleted.contains(id));
        Ok(scores)
    }

    /// Ranked `(doc_key, score)` pairs for `scores`, highest score first.
    pub fn resolve_ranked(&self, scores: &ScoreMap) -> Result<Vec<(Vec<u8>, i64)>, IndexError> {
        let mut ranked = Vec::with_capacity(scores.len());
        for (id, score) in scores {
            if let Some(key) = self.get_key(*id)? {
                ranked.push((key, *score));
            }
        }
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(ranked)
    }

    pub fn sync(&mut self) -> Result<(), IndexError> {
        Ok(self.store.flush()?)
    }

    /// The current value of `_idxcount`: how many documents have ever been
    /// assigned an id (deleted documents still count).
    pub fn doc_count(&self) -> Result<u32, IndexError> {
        Ok(self
            .store
            .get_meta(META_IDXCOUNT)?
            .and_then(|bytes| bytes.try_into().ok())
            .map(u32::from_be_bytes)
            .unwrap_or(0))
    }
}

impl IndexEngine<bfx_storage::store::SqliteDupStore> {
    /// Open a disk-backed engine at `path`. When `config` enables sharding,
    /// also opens `path.<i>` for every shard index this process owns
    /// (`config.submin..=config.submax`), per the data model's file naming:
    /// `<path>`, `<path>.0` … `<path>.(subcount-1)`.
    pub fn open_sharded(path: &std::path::Path, config: EngineConfig) -> Result<Self, IndexError> {
        use bfx_storage::store::{shard_path, SqliteDupStore};

        let primary = SqliteDupStore::open_with_config(path, &config)?;
        let routing = Routing::from_config(&config);
        let mut shards = Vec::new();
        if let Routing::Active { submin, submax, .. } = routing {
            for i in submin..=submax {
                shards.push(SqliteDupStore::open_with_config(&shard_path(path, i), &config)?);
            }
        }
        Ok(Self::new_sharded(primary, shards, config))
    }
}

fn init_subcount<S: DupStore>(store: &mut ShardedStore<S>, subcount: u32) {
    // Best-effort: a read-only store can't persist this, but it was handed
    // the same `config.subcount` at construction, so nothing is lost.
    if store.get_meta(META_SUBCOUNT).ok().flatten().is_none() {
        let _ = store.set_meta(META_SUBCOUNT, &subcount.to_be_bytes());
    }
}

fn encode_deleted(ids: &[DocId]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ids.len() * 4);
    for id in ids {
        out.extend_from_slice(&id.to_be_bytes());
    }
    out
}

fn decode_deleted(bytes: &[u8]) -> Vec<DocId> {
    bytes.chunks_exact(4).map(|c| DocId::from_be_bytes([c[0], c[1], c[2], c[3]])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bfx_storage::store::MemDupStore;

    fn engine() -> IndexEngine<MemDupStore> {
        IndexEngine::new(MemDupStore::new(), EngineConfig::default())
    }

    #[test]
    fn insert_assigns_monotonic_ids() {
        let mut eng = engine();
        let id1 = eng.insert(b"doc-a", b"hello world").unwrap();
        let id2 = eng.insert(b"doc-b", b"more words").unwrap();
        assert_eq!(id1, DocId(1));
        assert_eq!(id2, DocId(2));
    }

    #[test]
    fn reinserting_the_same_key_allocates_a_fresh_id() {
        let mut eng = engine();
        let id1 = eng.insert(b"doc-a", b"hello").unwrap();
        let id2 = eng.insert(b"doc-a", b"hello again").unwrap();
        assert_ne!(id1, id2);
        assert_eq!(eng.doc_count().unwrap(), 2);
    }

    #[test]
    fn find_key_and_get_key_round_trip() {
        let mut eng = engine();
        let id = eng.insert(b"doc-a", b"hello").unwrap();
        assert_eq!(eng.find_key(b"doc-a").unwrap(), Some(id));
        assert_eq!(eng.get_key(id).unwrap(), Some(b"doc-a".to_vec()));
        assert_eq!(eng.find_key(b"missing").unwrap(), None);
    }

    #[test]
    fn doc_keys_may_be_non_utf8_big5_bytes() {
        let mut eng = engine();
        let key: &[u8] = &[0xA4, 0xA4, 0xA4, 0x40];
        let id = eng.insert(key, &[0xA4, 0xA4, 0xA4, 0x40]).unwrap();
        assert_eq!(eng.find_key(key).unwrap(), Some(id));
        assert_eq!(eng.get_key(id).unwrap().as_deref(), Some(key));
    }

    #[test]
    fn query_finds_inserted_document() {
        let mut eng = engine();
        eng.insert(b"doc-a", b"hello world").unwrap();
        eng.insert(b"doc-b", b"goodbye world").unwrap();

        let scores = eng.query(b"hello", QueryMode::Fuzzy, None).unwrap();
        assert_eq!(scores.len(), 1);
        assert!(scores.contains_key(&DocId(1)));
    }

    #[test]
    fn delete_filters_query_results_and_list_keys() {
        let mut eng = engine();
        eng.insert(b"doc-a", b"hello world").unwrap();
        eng.insert(b"doc-b", b"hello again").unwrap();

        assert!(eng.delete(b"doc-a").unwrap());
        assert!(!eng.delete(b"nope").unwrap());

        let scores = eng.query(b"hello", QueryMode::Fuzzy, None).unwrap();
        assert_eq!(scores.len(), 1);
        assert!(scores.contains_key(&DocId(2)));

        assert_eq!(eng.list_keys().unwrap(), vec![b"doc-b".to_vec()]);
        assert!(eng.is_deleted(DocId(1)).unwrap());
        assert_eq!(eng.find_key(b"doc-a").unwrap(), None);
    }

    #[test]
    fn delete_id_removes_the_doc_key_mapping() {
        let mut eng = engine();
        let id = eng.insert(b"doc-a", b"hello world").unwrap();

        assert!(eng.delete_id(id).unwrap());
        assert!(!eng.delete_id(DocId(999)).unwrap());

        assert_eq!(eng.get_key(id).unwrap(), None);
        assert!(eng.is_deleted(id).unwrap());
    }

    #[test]
    fn vars_are_namespaced_away_from_reserved_keys() {
        let mut eng = engine();
        eng.set_var("avoid_count", b"3").unwrap();
        assert_eq!(eng.get_var("avoid_count").unwrap(), Some(b"3".to_vec()));
        assert_eq!(eng.get_var("_idxcount").unwrap(), None);
    }

    #[test]
    fn resolve_ranked_orders_by_score_descending() {
        let mut eng = engine();
        eng.insert(b"doc-a", b"hello hello hello").unwrap();
        eng.insert(b"doc-b", b"hello").unwrap();

        let scores = eng.query(b"hello", QueryMode::Fuzzy, None).unwrap();
        let ranked = eng.resolve_ranked(&scores).unwrap();
        assert_eq!(ranked[0].0, b"doc-a");
        assert_eq!(ranked[1].0, b"doc-b");
    }

    #[test]
    fn subcount_persists_across_shared_config() {
        let eng = IndexEngine::new(MemDupStore::new(), EngineConfig::default().with_sharding(4, 0, 1));
        assert_eq!(eng.subcount().unwrap(), 4);
    }

    #[test]
    fn unsharded_config_persists_zero_subcount() {
        let eng = engine();
        assert_eq!(eng.subcount().unwrap(), 0);
    }
}
