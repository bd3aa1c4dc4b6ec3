//! Word-at-a-time search for the key/value delimiter.
//!
//! Eight bytes are loaded as one `u64` and every lane equal to the delimiter
//! (or to `\n`) is flagged in a single pass, so short keys cost one or two
//! word operations instead of a byte loop. The key hash is folded from the
//! same words as they are read.

use std::hash::Hasher;

use rustc_hash::FxHasher;

const LOW7: u64 = 0x7f7f_7f7f_7f7f_7f7f;
const ONES: u64 = 0x0101_0101_0101_0101;

/// Byte order used to turn eight input bytes into a word. It decides which
/// end of the word holds the first byte, and so how a lane index is derived
/// from a match bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordOrder {
    Little,
    Big,
}

/// Order used by the engine, fixed regardless of the host.
pub const WORD_ORDER: WordOrder = WordOrder::Little;

impl WordOrder {
    #[inline(always)]
    pub fn load(self, bytes: [u8; 8]) -> u64 {
        match self {
            WordOrder::Little => u64::from_le_bytes(bytes),
            WordOrder::Big => u64::from_be_bytes(bytes),
        }
    }

    /// Index of the first (lowest address) flagged lane; 8 if `mask` is zero.
    #[inline(always)]
    pub fn first_lane(self, mask: u64) -> usize {
        match self {
            WordOrder::Little => (mask.trailing_zeros() / 8) as usize,
            WordOrder::Big => (mask.leading_zeros() / 8) as usize,
        }
    }

    /// Keeps the first `lanes` bytes of a word and zeroes the rest.
    #[inline(always)]
    pub fn keep_lanes(self, word: u64, lanes: usize) -> u64 {
        if lanes >= 8 {
            return word;
        }
        let bits = (lanes * 8) as u32;
        match self {
            WordOrder::Little => word & ((1u64 << bits) - 1),
            WordOrder::Big => word & !(u64::MAX >> bits),
        }
    }
}

#[inline(always)]
pub fn broadcast(byte: u8) -> u64 {
    ONES * byte as u64
}

/// Sets the high bit of every zero byte in `word` and nothing else.
/// Exact for every lane: no carry crosses a byte boundary.
#[inline(always)]
pub fn zero_lanes(word: u64) -> u64 {
    !(((word & LOW7) + LOW7) | word | LOW7)
}

/// High bit set in each lane of `word` equal to the broadcast `pattern`.
#[inline(always)]
pub fn matching_lanes(word: u64, pattern: u64) -> u64 {
    zero_lanes(word ^ pattern)
}

/// Outcome of searching one line for its delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// The key is the `key_len` bytes before the delimiter.
    Delimiter { key_len: usize, hash: u64 },
    /// The line ended before any delimiter; `line_len` excludes the `\n`.
    Newline { line_len: usize },
    /// The buffer ended first. The caller has to supply a longer contiguous read.
    NeedMore,
}

/// Scans `buf` from `start` for the delimiter of the line starting there.
///
/// A final partial word (fewer than 8 bytes left) is loaded zero-padded and
/// its padding lanes are masked out of the match, so nothing past `buf` is
/// ever read.
#[inline]
pub fn find_delimiter(buf: &[u8], start: usize, delimiter: u8) -> Probe {
    let delimiters = broadcast(delimiter);
    let newlines = broadcast(b'\n');
    let mut hasher = FxHasher::default();
    let mut pos = start;

    while pos < buf.len() {
        let rest = &buf[pos..];
        let (word, live) = if rest.len() >= 8 {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&rest[..8]);
            (WORD_ORDER.load(bytes), 8)
        } else {
            let mut bytes = [0u8; 8];
            bytes[..rest.len()].copy_from_slice(rest);
            (WORD_ORDER.load(bytes), rest.len())
        };
        let live_mask = WORD_ORDER.keep_lanes(u64::MAX, live);
        let delim_bits = matching_lanes(word, delimiters) & live_mask;
        let newline_bits = matching_lanes(word, newlines) & live_mask;

        if delim_bits | newline_bits != 0 {
            let delim_lane = WORD_ORDER.first_lane(delim_bits);
            let newline_lane = WORD_ORDER.first_lane(newline_bits);
            if delim_lane < newline_lane {
                hasher.write_u64(WORD_ORDER.keep_lanes(word, delim_lane));
                return Probe::Delimiter {
                    key_len: pos - start + delim_lane,
                    hash: hasher.finish(),
                };
            }
            return Probe::Newline {
                line_len: pos - start + newline_lane,
            };
        }

        hasher.write_u64(word);
        pos += 8;
    }
    Probe::NeedMore
}
