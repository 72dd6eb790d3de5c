//! Time-ordered row key codec.
//!
//! Row keys embed an *inverse* timestamp: the leading segment encodes
//! `MAX_TS - creation_ms` in fixed-width base-36, so ascending lexicographic
//! order over keys equals descending chronological order. A plain ascending
//! range scan over a partition therefore yields the newest rows first.
//!
//! Key layout (widths are a versioned contract — see [`ROW_KEY_VERSION`]):
//!
//! ```text
//! row key:     invTs(9) || instanceTag(4) || sequence(4)     17 symbols
//! session id:  invTs(9) || SQ || SI || R || R                13 symbols
//! ```
//!
//! `invTs` uses lowercase base-36 digits; the session id suffix uses
//! uppercase letters only, which keeps it unambiguously separable from the
//! timestamp prefix when decoding. The session id prefix is load-bearing:
//! decoding it recovers the session start time even when the session record
//! itself was never durably written.

use rand::Rng;

use crate::error::KeyError;

/// Version tag for the key layout. Symbol widths and the base must not
/// change under the same version; stored keys outlive any one process.
pub const ROW_KEY_VERSION: &str = "v1";

/// Upper bound of the encodable time range, milliseconds since the epoch.
/// `MAX_TS - t` stays positive for any realistic wall clock.
pub const MAX_TS: u64 = 9_999_999_999_999;

/// Fixed width of the inverse-timestamp segment. `MAX_TS` in base-36 is
/// 9 digits, so every value in `[0, MAX_TS]` fits.
const TS_WIDTH: usize = 9;

/// Fixed width of the per-process instance tag.
const TAG_WIDTH: usize = 4;

/// Fixed width of the per-process sequence counter.
const SEQ_WIDTH: usize = 4;

/// Total width of a generated row key.
pub const ROW_KEY_WIDTH: usize = TS_WIDTH + TAG_WIDTH + SEQ_WIDTH;

/// Sequence counter wraps back to 0 past this value.
const SEQ_MAX: u64 = 36_u64.pow(SEQ_WIDTH as u32) - 1;

/// Instance tags are drawn from `[0, 36^TAG_WIDTH)`.
const TAG_SPACE: u64 = 36_u64.pow(TAG_WIDTH as u32);

const UPPERCASE: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

// =============================================================================
// Base-36 encoding
// =============================================================================

/// Encode `value` as fixed-width lowercase base-36, zero-padded on the left.
fn encode_base36(mut value: u64, width: usize) -> String {
    let mut buf = vec![b'0'; width];
    let mut i = width;
    while value > 0 && i > 0 {
        i -= 1;
        buf[i] = BASE36[(value % 36) as usize];
        value /= 36;
    }
    debug_assert_eq!(value, 0, "value does not fit in {width} base-36 symbols");
    buf.into_iter().map(char::from).collect()
}

/// Decode strict lowercase base-36. Rejects uppercase, non-alphanumerics,
/// empty input, and anything that overflows u64.
fn decode_base36(input: &str) -> Result<u64, KeyError> {
    if input.is_empty() {
        return Err(KeyError::Malformed("empty timestamp prefix".to_string()));
    }
    let mut value: u64 = 0;
    for c in input.chars() {
        let digit = match c {
            '0'..='9' => c as u64 - '0' as u64,
            'a'..='z' => c as u64 - 'a' as u64 + 10,
            _ => {
                return Err(KeyError::Malformed(format!(
                    "invalid base-36 symbol {c:?} in {input:?}"
                )));
            }
        };
        value = value
            .checked_mul(36)
            .and_then(|v| v.checked_add(digit))
            .ok_or_else(|| KeyError::Malformed(format!("timestamp prefix overflows: {input:?}")))?;
    }
    Ok(value)
}

fn inverse_timestamp(ts_ms: u64) -> String {
    encode_base36(MAX_TS.saturating_sub(ts_ms), TS_WIDTH)
}

// =============================================================================
// Stateless operations
// =============================================================================

/// Smallest possible key for `ts_ms`: the non-timestamp suffix is padded
/// with the encoding's minimum symbol. Used as the *upper* end of a
/// newest-first range scan (string order inverts time order).
#[must_use]
pub fn lower_bound(ts_ms: u64) -> String {
    let mut key = inverse_timestamp(ts_ms);
    for _ in 0..(TAG_WIDTH + SEQ_WIDTH) {
        key.push('0');
    }
    key
}

/// Largest possible key for `ts_ms`: suffix padded with the maximum symbol.
#[must_use]
pub fn upper_bound(ts_ms: u64) -> String {
    let mut key = inverse_timestamp(ts_ms);
    for _ in 0..(TAG_WIDTH + SEQ_WIDTH) {
        key.push('z');
    }
    key
}

/// Recover the approximate creation time of a key.
///
/// Strips the trailing uppercase suffix (session ids), parses the remaining
/// lowercase base-36 digits, and returns `MAX_TS - parsed`. Fails with
/// [`KeyError::Malformed`] when the prefix is empty, contains symbols
/// outside lowercase base-36, or decodes above `MAX_TS`.
pub fn decode_timestamp(key: &str) -> Result<u64, KeyError> {
    let prefix = key.trim_end_matches(|c: char| c.is_ascii_uppercase());
    let inverse = decode_base36(prefix)?;
    if inverse > MAX_TS {
        return Err(KeyError::Malformed(format!(
            "decoded value {inverse} exceeds the encodable range"
        )));
    }
    Ok(MAX_TS - inverse)
}

// =============================================================================
// KeyFactory
// =============================================================================

/// Per-process key generator.
///
/// Owns the random instance tag (stable for the process lifetime), the
/// wrapping row sequence, and the session id suffix state. All generation
/// goes through `&mut self` — a single mutator path, no shared mutable
/// state across concurrent generators. Callers that share a factory across
/// tasks wrap it in a mutex held only for the synchronous generation step.
#[derive(Debug)]
pub struct KeyFactory {
    /// Fixed-width base-36 tag, random per process.
    instance_tag: String,
    /// Wraps to 0 past `SEQ_MAX` without resetting the tag.
    sequence: u64,
    /// Uppercase letter identifying this process in session id suffixes.
    session_instance: char,
    /// Rotating index into the uppercase alphabet.
    session_sequence: usize,
}

impl KeyFactory {
    /// Create a factory with randomly seeded tag and counters.
    #[must_use]
    pub fn new() -> Self {
        let mut rng = rand::rng();
        let tag = rng.random_range(0..TAG_SPACE);
        let sequence = rng.random_range(0..=SEQ_MAX);
        let session_instance = UPPERCASE[rng.random_range(0..UPPERCASE.len())] as char;
        let session_sequence = rng.random_range(0..UPPERCASE.len());
        Self {
            instance_tag: encode_base36(tag, TAG_WIDTH),
            sequence,
            session_instance,
            session_sequence,
        }
    }

    /// The process instance tag, as stored inside generated keys.
    #[must_use]
    pub fn instance_tag(&self) -> &str {
        &self.instance_tag
    }

    /// Produce a fresh row key for `now_ms`.
    ///
    /// Two keys generated at the same millisecond by the same factory still
    /// sort correctly relative to each other by sequence. Across processes,
    /// collision probability is bounded by the tag space, not eliminated.
    pub fn next_key(&mut self, now_ms: u64) -> String {
        self.sequence = if self.sequence < SEQ_MAX {
            self.sequence + 1
        } else {
            0
        };
        let mut key = inverse_timestamp(now_ms);
        key.push_str(&self.instance_tag);
        key.push_str(&encode_base36(self.sequence, SEQ_WIDTH));
        key
    }

    /// Produce a session id whose prefix encodes `ts_ms`.
    ///
    /// The suffix (rotating sequence letter, process instance letter, two
    /// random letters) exists only to de-collide sessions starting in the
    /// same millisecond; [`decode_timestamp`] ignores it.
    pub fn next_session_id(&mut self, ts_ms: u64) -> String {
        self.session_sequence = (self.session_sequence + 1) % UPPERCASE.len();
        let mut rng = rand::rng();
        let mut id = inverse_timestamp(ts_ms);
        id.push(UPPERCASE[self.session_sequence] as char);
        id.push(self.session_instance);
        id.push(UPPERCASE[rng.random_range(0..UPPERCASE.len())] as char);
        id.push(UPPERCASE[rng.random_range(0..UPPERCASE.len())] as char);
        id
    }
}

impl Default for KeyFactory {
    fn default() -> Self {
        Self::new()
    }
}
