use std::io::{Read, Seek, SeekFrom};

use crate::error::{Error, Result};

const MAX_PREALLOCATED: u64 = 1024;

/// Half-open span `[offset, offset + length)` of the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub offset: u64,
    pub length: u64,
}

impl ByteRange {
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Splits `[0, size)` into at most `shards` ranges, each ending just after a
/// `\n` (the last one ends at `size`).
///
/// Target boundaries sit at multiples of `size / shards`. For each target the
/// `max_line_len` bytes before it are read and the boundary is placed right
/// after the last newline in that window. A full window without a newline
/// means some line is longer than `max_line_len`, which is an error.
/// Small inputs can produce fewer ranges than requested (never more than
/// `size`); empty input produces none.
pub fn plan_shards<R: Read + Seek>(
    input: &mut R,
    size: u64,
    shards: usize,
    max_line_len: usize,
) -> Result<Vec<ByteRange>> {
    // every shard holds at least one byte
    let shards = (shards.max(1) as u64).min(size.max(1));
    let stride = size / shards;
    let mut window = vec![0u8; max_line_len];
    let mut ranges = Vec::with_capacity(shards.min(MAX_PREALLOCATED) as usize);
    let mut offset = 0u64;

    for i in 1..shards {
        let target = stride * i;
        if target <= offset || target >= size {
            continue;
        }
        // never look back past the start of the current shard
        let probe_start = target.saturating_sub(max_line_len as u64).max(offset);
        let probe = &mut window[..(target - probe_start) as usize];
        input.seek(SeekFrom::Start(probe_start))?;
        input.read_exact(probe)?;

        match probe.iter().rposition(|b| *b == b'\n') {
            Some(pos) => {
                let boundary = probe_start + pos as u64 + 1;
                ranges.push(ByteRange {
                    offset,
                    length: boundary - offset,
                });
                offset = boundary;
            }
            // a clipped window may just be a short shard; the next target looks further
            None if probe.len() < max_line_len => continue,
            None => {
                return Err(Error::BoundaryNotFound {
                    offset: target,
                    window: max_line_len,
                })
            }
        }
    }

    if offset < size {
        ranges.push(ByteRange {
            offset,
            length: size - offset,
        });
    }
    Ok(ranges)
}
