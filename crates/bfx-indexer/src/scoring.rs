use std::collections::BTreeMap;

use bfx_core::docid::DocId;
use bfx_core::token::{Token, TokenMap, LATIN_SENTINEL, SINGLE_CHAR_PAD};
use bfx_storage::codec::{big5_group_key, PostingKind};
use bfx_storage::store::DupStore;

use crate::error::IndexError;
use crate::router::Routing;

/// How a query's tokens combine against the accumulated candidate set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// Every token must match every candidate; non-matching candidates are
    /// dropped as each token is processed (conjunctive narrowing).
    Exact,
    /// Every token's contribution is added to the running score; no token
    /// is required.
    Fuzzy,
    /// Like `Fuzzy`, but a token with no match anywhere still credits every
    /// candidate already accumulated, and a document that shares a Big5
    /// leading pair without the exact trailing pair still earns a flat
    /// partial credit.
    Part,
    /// Tokens exclude: any candidate a token matches is removed from the
    /// accumulated set.
    Not,
}

/// Relative-term-frequency scale in `score_add = (tf * TF_SCALE / wordcount
/// + PRESENCE_BONUS) * vv`.
const TF_SCALE: i64 = 800;
/// Flat bonus in the same formula, rewarding shared presence of a token in
/// both query and document regardless of relative frequency.
const PRESENCE_BONUS: i64 = 200;
/// Flat credit PART mode gives a partial or wholly-absent match.
const PART_CREDIT: i64 = 50;

pub type ScoreMap = BTreeMap<DocId, i64>;

/// One query-side token group: every trailing-pair/frequency pair sharing a
/// Big5 leading pair (or, for a Latin word, a single synthetic pair keyed
/// on the Latin sentinel), plus the storage key and kind this group is
/// looked up under. Mirrors how `bfx_storage::codec::encode_records` groups
/// a document's tokens, applied here to the query's token map instead.
struct QueryGroup {
    key: Vec<u8>,
    kind: PostingKind,
    triples: Vec<([u8; 2], i64)>,
}

/// Group a query's parsed [`TokenMap`] into per-leading-pair (or per-word)
/// groups, in the same bytewise-ascending order the parser emitted them —
/// Latin tokens always sort before Big5 tokens, so pushing Latin groups as
/// encountered and Big5 groups afterward (themselves in ascending leading-
/// pair order) reproduces that order without an extra sort.
fn group_tokens(tokens: &TokenMap) -> Vec<QueryGroup> {
    let mut big5_groups: BTreeMap<[u8; 2], Vec<([u8; 2], i64)>> = BTreeMap::new();
    let mut out = Vec::new();

    for (token, freq) in tokens {
        match token {
            Token::Big5 { lead, trail } => {
                big5_groups.entry(*lead).or_default().push((*trail, *freq as i64));
            }
            Token::Latin(word) => {
                out.push(QueryGroup {
                    key: word.clone(),
                    kind: PostingKind::Latin,
                    triples: vec![(LATIN_SENTINEL, *freq as i64)],
                });
            }
        }
    }
    for (lead, triples) in big5_groups {
        out.push(QueryGroup { key: big5_group_key(lead), kind: PostingKind::Big5, triples });
    }
    out
}

/// Find `vk`'s stored trailing-pair frequency inside one matched posting
/// value, if present. Big5 triples start at byte 8 (past `id(4) +
/// delim(4)`); a Latin value has exactly one implicit "triple" at a fixed
/// offset, keyed on the Latin sentinel rather than a real trailing pair.
fn find_trail_freq(kind: PostingKind, raw: &[u8], vk: [u8; 2]) -> Option<i64> {
    match kind {
        PostingKind::Big5 => {
            let mut i = 8;
            while i + 3 <= raw.len() {
                if raw[i] == vk[0] && raw[i + 1] == vk[1] {
                    return Some(raw[i + 2] as i64);
                }
                i += 3;
            }
            None
        }
        PostingKind::Latin => {
            if raw.len() == 7 && raw[4] == vk[0] && raw[5] == vk[1] {
                Some(raw[6] as i64)
            } else {
                None
            }
        }
    }
}

fn score_add(tf: i64, wordcount: i64, vv: i64) -> i64 {
    debug_assert!(wordcount > 0);
    (tf * TF_SCALE / wordcount + PRESENCE_BONUS) * vv
}

/// Evaluate `tokens` (already parsed in query mode) against `store` under
/// `mode`, starting from `prior` (an empty map if this is the first query
/// in a chain), restricted to keys `routing` owns.
///
/// Implements the evaluator exactly as specified: routing skips a whole
/// group, each triple within a group accumulates `words` before it is
/// used, `score_add` uses truncating integer division throughout, EXACT
/// narrows the running candidate set per triple and short-circuits the
/// moment a triple leaves nothing to carry forward, and the final score
/// map is divided by `words` when more than one query token contributed.
pub fn evaluate_routed<S: DupStore>(
    store: &S,
    tokens: &TokenMap,
    mode: QueryMode,
    prior: Option<&ScoreMap>,
    routing: &Routing,
) -> Result<ScoreMap, IndexError> {
    let groups = group_tokens(tokens);
    let mut words: i64 = 0;
    let mut score: ScoreMap = prior.cloned().unwrap_or_default();

    for group in &groups {
        if !routing.owns(&group.key) {
            continue;
        }

        let raw_values = store.get(&group.key)?;
        let matched: Vec<(DocId, Vec<u8>)> = raw_values
            .into_iter()
            .filter_map(|v| DocId::read_prefix(&v).map(|id| (id, v)))
            .collect();

        for (vk, vv) in &group.triples {
            words += *vv;
            let vv = *vv;
            let is_marker = group.kind == PostingKind::Big5 && *vk == SINGLE_CHAR_PAD;

            let (found, not_found, wordcount): (Vec<(DocId, i64)>, Vec<DocId>, i64) = if is_marker {
                let wordcount: i64 = matched.iter().map(|(_, raw)| raw.len() as i64).sum();
                let found: Vec<(DocId, i64)> =
                    matched.iter().map(|(id, raw)| (*id, raw.len() as i64)).collect();
                (found, Vec::new(), wordcount)
            } else {
                let mut found = Vec::new();
                let mut not_found = Vec::new();
                for (id, raw) in &matched {
                    match find_trail_freq(group.kind, raw, *vk) {
                        Some(tf) => found.push((*id, tf)),
                        None => not_found.push(*id),
                    }
                }
                let wordcount: i64 = found.iter().map(|(_, tf)| tf).sum();
                (found, not_found, wordcount)
            };

            match mode {
                QueryMode::Fuzzy => {
                    for (id, tf) in &found {
                        *score.entry(*id).or_insert(0) += score_add(*tf, wordcount, vv);
                    }
                }
                QueryMode::Part => {
                    if matched.is_empty() {
                        // No document has this token at all: every candidate
                        // already accumulated from earlier tokens still gets
                        // a flat consolation credit.
                        for val in score.values_mut() {
                            *val += PART_CREDIT / words;
                        }
                    } else {
                        for (id, tf) in &found {
                            *score.entry(*id).or_insert(0) += score_add(*tf, wordcount, vv);
                        }
                        for id in &not_found {
                            *score.entry(*id).or_insert(0) += PART_CREDIT / words;
                        }
                    }
                }
                QueryMode::Exact => {
                    let mut next = ScoreMap::new();
                    let prior_empty = score.is_empty();
                    for (id, tf) in &found {
                        let add = score_add(*tf, wordcount, vv);
                        if let Some(existing) = score.get(id) {
                            next.insert(*id, existing + add);
                        } else if prior_empty {
                            next.insert(*id, add);
                        }
                    }
                    if next.is_empty() {
                        return Ok(ScoreMap::new());
                    }
                    score = next;
                }
                QueryMode::Not => {
                    for (id, _) in &found {
                        score.remove(id);
                    }
                }
            }
        }
    }

    if words > 1 {
        for v in score.values_mut() {
            *v /= words;
        }
    }

    Ok(score)
}

/// Convenience wrapper for an unsharded evaluation (routing disabled).
pub fn evaluate<S: DupStore>(
    store: &S,
    tokens: &TokenMap,
    mode: QueryMode,
    prior: Option<&ScoreMap>,
) -> Result<ScoreMap, IndexError> {
    evaluate_routed(store, tokens, mode, prior, &Routing::Disabled)
}
