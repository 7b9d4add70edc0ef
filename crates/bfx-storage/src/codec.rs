use bfx_core::docid::DocId;
use bfx_core::token::{clamp, Token, TokenMap, LATIN_SENTINEL};

use crate::error::StorageError;

/// Framing marker separating a Big5 record's doc id from its trailing-pair
/// triples: four ASCII spaces, per the data model's documented delim/seed
/// value.
pub const BIG5_DELIM: [u8; 4] = [0x20, 0x20, 0x20, 0x20];

/// Which on-disk value shape a posting record uses. The caller always
/// knows this up front, from which key space (Big5 leading pairs vs Latin
/// words) it queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostingKind {
    Big5,
    Latin,
}

/// One trailing-pair/frequency entry inside a Big5 posting record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triple {
    pub trail: [u8; 2],
    pub freq: u8,
}

/// A single document's posting entry under one storage key.
///
/// One row in the store holds exactly one `PostingRecord`: the ordered
/// duplicate-key store's `(key, seq)` rows already give us one slot per
/// document per key, so a record never needs to multiplex more than one
/// document's data internally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostingRecord {
    Big5 { id: DocId, triples: Vec<Triple> },
    Latin { id: DocId, freq: u8 },
}

impl PostingRecord {
    pub fn doc_id(&self) -> DocId {
        match self {
            PostingRecord::Big5 { id, .. } => *id,
            PostingRecord::Latin { id, .. } => *id,
        }
    }

    pub fn kind(&self) -> PostingKind {
        match self {
            PostingRecord::Big5 { .. } => PostingKind::Big5,
            PostingRecord::Latin { .. } => PostingKind::Latin,
        }
    }

    /// Encode to the on-disk byte representation.
    ///
    /// Big5: `id(4) || delim(4) || triple{1..}(3 each)`.
    /// Latin: `id(4) || sentinel(2) || freq(1)`, 7 bytes, no delim — the
    /// sentinel alone disambiguates a Latin record from a Big5 one.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            PostingRecord::Big5 { id, triples } => {
                let mut buf = Vec::with_capacity(8 + triples.len() * 3);
                buf.extend_from_slice(&id.to_be_bytes());
                buf.extend_from_slice(&BIG5_DELIM);
                for t in triples {
                    buf.extend_from_slice(&t.trail);
                    buf.push(t.freq);
                }
                buf
            }
            PostingRecord::Latin { id, freq } => {
                let mut buf = Vec::with_capacity(7);
                buf.extend_from_slice(&id.to_be_bytes());
                buf.extend_from_slice(&LATIN_SENTINEL);
                buf.push(*freq);
                buf
            }
        }
    }

    /// Decode a stored value, given the key space it was read from.
    pub fn decode(kind: PostingKind, bytes: &[u8]) -> Result<Self, StorageError> {
        let id = DocId::read_prefix(bytes).ok_or_else(|| StorageError::Corrupt {
            reason: format!("posting value too short to hold a doc id: {} bytes", bytes.len()),
        })?;

        match kind {
            PostingKind::Big5 => {
                const TRIPLE_START: usize = 8;
                if bytes.len() < TRIPLE_START || (bytes.len() - TRIPLE_START) % 3 != 0 {
                    return Err(StorageError::Corrupt {
                        reason: format!("malformed big5 posting, len={}", bytes.len()),
                    });
                }
                let mut triples = Vec::with_capacity((bytes.len() - TRIPLE_START) / 3);
                let mut i = TRIPLE_START;
                while i < bytes.len() {
                    triples.push(Triple {
                        trail: [bytes[i], bytes[i + 1]],
                        freq: bytes[i + 2],
                    });
                    i += 3;
                }
                if triples.is_empty() {
                    return Err(StorageError::Corrupt {
                        reason: "big5 posting has no triples".to_string(),
                    });
                }
                Ok(PostingRecord::Big5 { id, triples })
            }
            PostingKind::Latin => {
                if bytes.len() != 7 {
                    return Err(StorageError::Corrupt {
                        reason: format!("malformed latin posting, len={}", bytes.len()),
                    });
                }
                Ok(PostingRecord::Latin { id, freq: bytes[6] })
            }
        }
    }
}

/// Group a document's parsed [`TokenMap`] into per-key posting records,
/// one record per distinct storage key the document touches.
///
/// Big5 tokens sharing a leading pair collapse into a single record whose
/// triples enumerate every trailing pair (including the single-character
/// marker) the document used under that leading pair; each Latin word
/// gets its own record keyed on the word itself.
pub fn encode_records(id: DocId, tokens: &TokenMap) -> Vec<(Vec<u8>, PostingRecord)> {
    use std::collections::BTreeMap;

    let mut big5_groups: BTreeMap<[u8; 2], Vec<Triple>> = BTreeMap::new();
    let mut out = Vec::new();

    for (token, freq) in tokens {
        match token {
            Token::Big5 { lead, trail } => {
                big5_groups.entry(*lead).or_default().push(Triple {
                    trail: *trail,
                    freq: clamp(*freq),
                });
            }
            Token::Latin(word) => {
                out.push((word.clone(), PostingRecord::Latin { id, freq: clamp(*freq) }));
            }
        }
    }

    for (lead, triples) in big5_groups {
        out.push((big5_group_key(lead), PostingRecord::Big5 { id, triples }));
    }

    out
}

/// Storage key for a Big5 leading-pair group: the pair followed by a
/// literal NUL, per the data model's key notation.
pub fn big5_group_key(lead: [u8; 2]) -> Vec<u8> {
    let mut key = Vec::with_capacity(3);
    key.extend_from_slice(&lead);
    key.push(0x00);
    key
}
