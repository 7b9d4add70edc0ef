use bfx_core::docid::DocId;
use bfx_core::token::QUERY_MARKER;
use bfx_indexer::{IndexEngine, QueryMode};
use bfx_storage::store::DupStore;
use rand::Rng;

use crate::error::RetrievalError;

/// Thin question/answer adapter over an [`IndexEngine`].
///
/// Owns exactly the interfaces the engine is contracted through: indexing
/// an entry, and resolving free-text input to a stored answer. Synonym
/// substitution and avoid-list persistence are the calling application's
/// concern, not this adapter's — `input` takes the avoid set by value from
/// the caller each call rather than tracking it itself.
pub struct ChatBot<S: DupStore> {
    engine: IndexEngine<S>,
    /// When set, a resolved doc id is remapped through `(id mod idxcount) +
    /// 1` before being looked up. Preserved as-is per the design notes'
    /// explicit instruction, despite the original author's own description
    /// of it as "badly implemented" — client behavior depends on its
    /// presence.
    nextone: bool,
    /// Picked uniformly at random when a query scores nothing (or
    /// everything it scored is in the caller's avoid set).
    fallback_responses: Vec<String>,
}

impl<S: DupStore> ChatBot<S> {
    pub fn open(engine: IndexEngine<S>, nextone: bool, fallback_responses: Vec<String>) -> Self {
        Self { engine, nextone, fallback_responses }
    }

    /// Index one entry. `content` becomes both the returned doc key and,
    /// absent a `trigger`, the text that gets parsed and indexed; when
    /// `trigger` is given, it is the text indexed (what callers will query
    /// against) while `content` remains the value a later lookup resolves
    /// to. Content is arbitrary bytes — it need not be valid UTF-8.
    #[tracing::instrument(skip(self, content, trigger))]
    pub fn add_entry(
        &mut self,
        content: &[u8],
        trigger: Option<&[u8]>,
    ) -> Result<DocId, RetrievalError> {
        if content.is_empty() {
            return Err(RetrievalError::EmptyEntry);
        }
        let indexed = trigger.unwrap_or(content);
        if indexed.is_empty() {
            return Err(RetrievalError::EmptyEntry);
        }
        Ok(self.engine.insert(content, indexed)?)
    }

    /// Resolve free-text `say` to a stored answer.
    ///
    /// Appends the query-text sentinel, scores the index in PART mode,
    /// ranks descending by score, and returns the first entry whose id is
    /// not in `avoid`. Never errors outward — a storage failure or an
    /// empty/fully-avoided result both fall through to a uniform-random
    /// pick from the configured fallback list, matching the original
    /// conversational wrapper's contract that `input` never throws.
    #[tracing::instrument(skip(self, say, avoid))]
    pub fn input(&self, say: &[u8], avoid: &[DocId]) -> String {
        match self.best_match(say, avoid) {
            Ok(Some(answer)) => String::from_utf8_lossy(&answer).into_owned(),
            Ok(None) => self.fallback(),
            Err(error) => {
                tracing::warn!(%error, "chatbot lookup failed, falling back");
                self.fallback()
            }
        }
    }

    fn best_match(&self, say: &[u8], avoid: &[DocId]) -> Result<Option<Vec<u8>>, RetrievalError> {
        let mut query = say.to_vec();
        query.extend_from_slice(&QUERY_MARKER);

        let scores = self.engine.query(&query, QueryMode::Part, None)?;
        let mut ranked: Vec<(DocId, i64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        for (id, _score) in ranked {
            if avoid.contains(&id) {
                continue;
            }
            let resolved = self.apply_nextone(id)?;
            if let Some(content) = self.engine.get_key(resolved)? {
                return Ok(Some(content));
            }
        }
        Ok(None)
    }

    /// The `nextone` remap: `(id mod idxcount) + 1`. A no-op when the flag
    /// is off or the engine has no documents yet.
    fn apply_nextone(&self, id: DocId) -> Result<DocId, RetrievalError> {
        if !self.nextone {
            return Ok(id);
        }
        let idxcount = self.engine.doc_count()?;
        if idxcount == 0 {
            return Ok(id);
        }
        Ok(DocId(id.0 % idxcount + 1))
    }

    fn fallback(&self) -> String {
        if self.fallback_responses.is_empty() {
            return String::new();
        }
        let pick = rand::thread_rng().gen_range(0..self.fallback_responses.len());
        self.fallback_responses[pick].clone()
    }
}
