use std::collections::BTreeMap;

/// Byte above which a byte is a candidate Big5 lead byte (`*p > 0xA0`).
pub const BIG5_LEAD_MIN_EXCL: u8 = 0xA0;

/// Byte above which a following pair continues a Big5 word (`p2 > 0xA3`).
pub const BIG5_CONT_MIN_EXCL: u8 = 0xA3;

/// Trailing-pair padding for a single-character token: ASCII `"!!"`.
///
/// Doubles as the evaluator's leading-pair-only marker (`vk == "!!"`):
/// a real Big5 trailing pair can never take this value since Big5 bytes
/// are always `> 0xA0`.
pub const SINGLE_CHAR_PAD: [u8; 2] = [0x21, 0x21];

/// Value-half sentinel for Latin word tokens: two ASCII spaces.
pub const LATIN_SENTINEL: [u8; 2] = [0x20, 0x20];

/// Query-text terminator the chatbot adapter appends before parsing.
pub const QUERY_MARKER: [u8; 2] = [0xA4, 0x3F];

/// Maximum byte length of a stored Latin token.
pub const MAXKEY: usize = 32;

/// Per-triple frequency ceiling.
pub const FREQ_CLAMP: u8 = 0xA3;

/// Whether the parser emits single-character padded tokens at all.
///
/// A compile-time switch in the original; the reference design enables it.
pub const SINGLE_CHARACTER: bool = true;

fn clamp_freq(freq: u32) -> u8 {
    freq.min(FREQ_CLAMP as u32) as u8
}

/// One lexical unit produced by the parser.
///
/// Two shapes, per the data model: a Big5 bigram (or a single Big5
/// character, padded with [`SINGLE_CHAR_PAD`] in the `trail` slot so it
/// groups with real bigrams sharing the same leading pair), and a
/// lowercased Latin alphanumeric run.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Token {
    Big5 { lead: [u8; 2], trail: [u8; 2] },
    Latin(Vec<u8>),
}

impl Token {
    /// True if this token's trailing half is the single-char/marker pad.
    pub fn is_single_char(&self) -> bool {
        matches!(self, Token::Big5 { trail, .. } if *trail == SINGLE_CHAR_PAD)
    }

    /// Bytewise key representation used for ordering and as the storage key
    /// prefix (Big5 tokens) or the storage key itself (Latin tokens).
    pub fn key_bytes(&self) -> Vec<u8> {
        match self {
            Token::Big5 { lead, trail } => {
                let mut v = Vec::with_capacity(4);
                v.extend_from_slice(lead);
                v.extend_from_slice(trail);
                v
            }
            Token::Latin(word) => word.clone(),
        }
    }

    /// The leading pair of a Big5 token, or `None` for Latin tokens.
    pub fn lead_pair(&self) -> Option<[u8; 2]> {
        match self {
            Token::Big5 { lead, .. } => Some(*lead),
            Token::Latin(_) => None,
        }
    }
}

impl PartialOrd for Token {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Token {
    /// Tokens compare bytewise on their key representation, exactly as
    /// the store compares keys. Latin tokens (ASCII, high bit clear)
    /// always sort before Big5 tokens (lead byte `> 0xA0`).
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key_bytes().cmp(&other.key_bytes())
    }
}

/// An ordered multiset of tokens with their (clamped on write) frequencies.
pub type TokenMap = BTreeMap<Token, u32>;

/// Bump `token`'s frequency in `map` by one.
pub fn bump(map: &mut TokenMap, token: Token) {
    *map.entry(token).or_insert(0) += 1;
}

/// Clamp a raw frequency count to the on-disk representable range.
pub fn clamp(freq: u32) -> u8 {
    clamp_freq(freq)
}
