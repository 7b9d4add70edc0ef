use bfx_core::token::{
    bump, Token, TokenMap, BIG5_CONT_MIN_EXCL, BIG5_LEAD_MIN_EXCL, MAXKEY, SINGLE_CHARACTER,
    SINGLE_CHAR_PAD,
};

/// Read the byte at `pos`, treating any out-of-range position (including
/// the implicit NUL terminator past the end of the buffer) as `0x00`.
#[inline]
fn byte_at(bytes: &[u8], pos: usize) -> u8 {
    bytes.get(pos).copied().unwrap_or(0)
}

#[inline]
fn pair_at(bytes: &[u8], pos: usize) -> [u8; 2] {
    [byte_at(bytes, pos), byte_at(bytes, pos + 1)]
}

/// Parse a byte buffer into an ordered token-frequency map.
///
/// `query` suppresses single-char tokens for a character that already
/// participated in a bigram, avoiding inflated token counts in query mode
/// (it has no effect on Latin words). The buffer is not required to be
/// NUL-terminated by callers; a `0x00` byte anywhere is treated as an
/// end-of-input terminator, matching the internal scan of the original.
///
/// Deterministic and total: depends only on `bytes` and `query`.
pub fn parse(bytes: &[u8], query: bool) -> TokenMap {
    let mut map: TokenMap = TokenMap::new();
    let n = bytes.len();
    let mut p = 0usize;

    while p < n {
        let b = bytes[p];
        if b == 0x00 {
            break;
        }

        if b > BIG5_LEAD_MIN_EXCL {
            p = scan_big5(bytes, p, query, &mut map);
        } else if b.is_ascii_alphanumeric() {
            p = scan_latin(bytes, p, &mut map);
        } else {
            p += 1;
        }
    }

    tracing::debug!(token_count = map.len(), byte_len = n, query, "parsed token map");
    map
}

/// Scan one Big5 lead-byte-candidate run starting at `p`, emitting bigram
/// and/or single-char tokens. Returns the position just past what was
/// consumed.
///
/// A run of `k+1` characters yields `k` rolling bigrams plus single-char
/// tokens for the two endpoint characters (head and tail); interior
/// characters are covered only by the bigrams on either side of them.
fn scan_big5(bytes: &[u8], p: usize, query: bool, map: &mut TokenMap) -> usize {
    let pair1_start = p;
    let mut p = p + 2;

    if byte_at(bytes, p) > BIG5_CONT_MIN_EXCL {
        // Forms a bigram with the next pair; roll forward while the run
        // of continuing pairs holds.
        let pair2_start = p;
        emit_bigram(bytes, pair1_start, pair2_start, map);
        p += 2;

        let mut prev_start = pair2_start;
        while byte_at(bytes, p) > BIG5_CONT_MIN_EXCL {
            let next_start = p;
            emit_bigram(bytes, prev_start, next_start, map);
            p += 2;
            prev_start = next_start;
        }

        // The run just terminated; `p == prev_start + 2` always holds here.
        if SINGLE_CHARACTER {
            maybe_emit_single(bytes, pair1_start, query, map);
            maybe_emit_single(bytes, prev_start, query, map);
        }
    } else if SINGLE_CHARACTER && byte_at(bytes, pair1_start) > BIG5_CONT_MIN_EXCL {
        // The lead pair didn't form a bigram, but is itself high enough to
        // stand alone as a single-character token.
        emit_single(bytes, pair1_start, map);
    }

    p
}

/// Emit a single-char token for the pair at `pair_start`, unless `query`
/// mode and the byte immediately preceding it is itself a continuing
/// Big5 byte — that shape means this endpoint abuts another high byte
/// already accounted for elsewhere, so query mode skips the redundant
/// single.
fn maybe_emit_single(bytes: &[u8], pair_start: usize, query: bool, map: &mut TokenMap) {
    let predecessor = pair_start.checked_sub(2).map(|i| byte_at(bytes, i)).unwrap_or(0);
    let suppress = query && predecessor > BIG5_CONT_MIN_EXCL;
    if !suppress {
        emit_single(bytes, pair_start, map);
    }
}

fn emit_bigram(bytes: &[u8], lead_start: usize, trail_start: usize, map: &mut TokenMap) {
    bump(
        map,
        Token::Big5 {
            lead: pair_at(bytes, lead_start),
            trail: pair_at(bytes, trail_start),
        },
    );
}

fn emit_single(bytes: &[u8], pair_start: usize, map: &mut TokenMap) {
    bump(
        map,
        Token::Big5 {
            lead: pair_at(bytes, pair_start),
            trail: SINGLE_CHAR_PAD,
        },
    );
}

/// Scan a run of ASCII alphanumerics starting at `p`, lowercasing and
/// truncating to [`MAXKEY`] bytes. Runs shorter than 2 bytes are dropped.
/// Returns the position just past the whole run (even the truncated tail).
fn scan_latin(bytes: &[u8], p: usize, map: &mut TokenMap) -> usize {
    let start = p;
    let mut end = p + 1;
    while end < bytes.len() && bytes[end].is_ascii_alphanumeric() {
        end += 1;
    }

    if end - start >= 2 {
        let mut word: Vec<u8> = bytes[start..end].iter().map(|c| c.to_ascii_lowercase()).collect();
        word.truncate(MAXKEY);
        bump(map, Token::Latin(word));
    }

    end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(bytes: &[u8], query: bool) -> TokenMap {
        parse(bytes, query)
    }

    #[test]
    fn latin_word_lowercased_and_counted() {
        let map = tokens(b"Hello hello world", false);
        assert_eq!(map.get(&Token::Latin(b"hello".to_vec())), Some(&2));
        assert_eq!(map.get(&Token::Latin(b"world".to_vec())), Some(&1));
    }

    #[test]
    fn single_ascii_char_is_dropped() {
        let map = tokens(b"a b cd", false);
        assert!(map.get(&Token::Latin(b"a".to_vec())).is_none());
        assert_eq!(map.get(&Token::Latin(b"cd".to_vec())), Some(&1));
    }

    #[test]
    fn latin_word_truncated_at_maxkey() {
        let long = "x".repeat(40);
        let map = tokens(long.as_bytes(), false);
        let expected = Token::Latin(vec![b'x'; MAXKEY]);
        assert_eq!(map.get(&expected), Some(&1));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn big5_bigram_and_single_chars() {
        // 0xA4 0xA4 0xA4 0xE5 => bigram(A4A4, A4E5) + single(A4A4) + single(A4E5)
        let map = tokens(&[0xA4, 0xA4, 0xA4, 0xE5], false);
        assert_eq!(
            map.get(&Token::Big5 { lead: [0xA4, 0xA4], trail: [0xA4, 0xE5] }),
            Some(&1)
        );
        assert_eq!(
            map.get(&Token::Big5 { lead: [0xA4, 0xA4], trail: SINGLE_CHAR_PAD }),
            Some(&1)
        );
        assert_eq!(
            map.get(&Token::Big5 { lead: [0xA4, 0xE5], trail: SINGLE_CHAR_PAD }),
            Some(&1)
        );
    }

    #[test]
    fn big5_rolling_bigrams_over_three_chars() {
        // Three Big5 chars C1 C2 C3 => bigrams (C1,C2) and (C2,C3), plus
        // single chars for C1 and C3 (C2 is internal, suppressed as a
        // single since it's the lead pair of a later bigram or entirely
        // consumed within bigram runs depending on position).
        let c1 = [0xA4, 0xA4];
        let c2 = [0xA4, 0xE5];
        let c3 = [0xA4, 0xA7];
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&c1);
        bytes.extend_from_slice(&c2);
        bytes.extend_from_slice(&c3);

        let map = tokens(&bytes, false);
        assert_eq!(map.get(&Token::Big5 { lead: c1, trail: c2 }), Some(&1));
        assert_eq!(map.get(&Token::Big5 { lead: c2, trail: c3 }), Some(&1));
        assert_eq!(map.get(&Token::Big5 { lead: c1, trail: SINGLE_CHAR_PAD }), Some(&1));
        assert_eq!(map.get(&Token::Big5 { lead: c3, trail: SINGLE_CHAR_PAD }), Some(&1));
    }

    #[test]
    fn query_mode_suppresses_redundant_single_char() {
        let c1 = [0xA4, 0xA4];
        let c2 = [0xA4, 0xE5];
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&c1);
        bytes.extend_from_slice(&c2);

        let doc_map = tokens(&bytes, false);
        let query_map = tokens(&bytes, true);

        // Document mode: bigram plus single-char entries for both endpoints.
        assert_eq!(doc_map.get(&Token::Big5 { lead: c1, trail: SINGLE_CHAR_PAD }), Some(&1));
        assert_eq!(doc_map.get(&Token::Big5 { lead: c2, trail: SINGLE_CHAR_PAD }), Some(&1));
        // Query mode: the trailing char's predecessor (c1) was itself a
        // continuing lead byte, so its redundant single-char is suppressed;
        // the head (c1) has no such predecessor and still emits.
        assert_eq!(query_map.get(&Token::Big5 { lead: c1, trail: SINGLE_CHAR_PAD }), Some(&1));
        assert_eq!(query_map.get(&Token::Big5 { lead: c2, trail: SINGLE_CHAR_PAD }), None);
        assert_eq!(query_map.get(&Token::Big5 { lead: c1, trail: c2 }), Some(&1));
    }

    #[test]
    fn query_marker_becomes_single_char_token() {
        // The chatbot adapter appends 0xA4 0x3F; 0x3F is not > 0xA3 so no
        // bigram forms, but 0xA4 > 0xA3 so it stands alone as a marker.
        let map = tokens(&[0xA4, 0x3F], true);
        assert_eq!(
            map.get(&Token::Big5 { lead: [0xA4, 0x3F], trail: SINGLE_CHAR_PAD }),
            Some(&1)
        );
    }

    #[test]
    fn nul_byte_terminates_scan() {
        let mut bytes = b"hello".to_vec();
        bytes.push(0x00);
        bytes.extend_from_slice(b"world");
        let map = tokens(&bytes, false);
        assert_eq!(map.get(&Token::Latin(b"hello".to_vec())), Some(&1));
        assert!(map.get(&Token::Latin(b"world".to_vec())).is_none());
    }

    #[test]
    fn mixed_big5_and_latin() {
        let mut bytes = b"box".to_vec();
        bytes.extend_from_slice(&[0xA4, 0xA4, 0xA4, 0xE5]);
        bytes.extend_from_slice(b"detect");
        let map = tokens(&bytes, false);
        assert_eq!(map.get(&Token::Latin(b"box".to_vec())), Some(&1));
        assert_eq!(map.get(&Token::Latin(b"detect".to_vec())), Some(&1));
        assert_eq!(
            map.get(&Token::Big5 { lead: [0xA4, 0xA4], trail: [0xA4, 0xE5] }),
            Some(&1)
        );
    }

    #[test]
    fn ordering_is_bytewise_ascending() {
        let map = tokens(b"zz aa", false);
        let keys: Vec<_> = map.keys().cloned().collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn deterministic_for_same_input() {
        let bytes = b"Hello Big5 \xA4\xA4\xA4\xE5 mix";
        assert_eq!(parse(bytes, false), parse(bytes, false));
        assert_eq!(parse(bytes, true), parse(bytes, true));
    }
}
