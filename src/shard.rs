use std::io::{ErrorKind, Read};

use crate::{
    decimal,
    error::{Error, Result},
    plan::ByteRange,
    scan::{find_delimiter, Probe},
    table::{KeyStatsTable, PartialTable},
};

/// Per-shard state: a private table plus the absolute offset of the next
/// byte to be fed, used to locate malformed lines.
pub struct ShardAggregator {
    table: KeyStatsTable,
    delimiter: u8,
    offset: u64,
}

impl ShardAggregator {
    pub fn new(range: ByteRange, table_capacity: usize, delimiter: u8) -> Self {
        Self {
            table: KeyStatsTable::new(table_capacity),
            delimiter,
            offset: range.offset,
        }
    }

    /// Aggregates every line of `block`, which must end with `\n`.
    pub fn feed_lines(&mut self, block: &[u8]) -> Result<()> {
        let mut pos = 0;
        while pos < block.len() {
            match find_delimiter(block, pos, self.delimiter) {
                Probe::Delimiter { key_len, hash } => {
                    let value_start = pos + key_len + 1;
                    let (value, consumed) = decimal::parse_terminated(&block[value_start..])
                        .map_err(|reason| self.malformed(pos, reason))?;
                    self.table.record(&block[pos..pos + key_len], hash, value)?;
                    pos = value_start + consumed;
                }
                Probe::Newline { .. } => return Err(self.malformed(pos, "no delimiter")),
                Probe::NeedMore => return Err(self.malformed(pos, "line has no terminator")),
            }
        }
        self.offset += block.len() as u64;
        Ok(())
    }

    /// Aggregates a trailing line that has no `\n`.
    fn feed_unterminated(&mut self, tail: &[u8], scratch: &mut Vec<u8>) -> Result<()> {
        scratch.clear();
        scratch.extend_from_slice(tail);
        scratch.push(b'\n');
        self.feed_lines(scratch)
    }

    fn malformed(&self, pos: usize, reason: &'static str) -> Error {
        Error::MalformedLine {
            offset: self.offset + pos as u64,
            reason,
        }
    }

    pub fn finish(self) -> PartialTable {
        self.table.freeze()
    }
}

/// Aggregates a shard whose bytes come from `reader` (already limited to
/// the range), through one reused buffer of `buffer_size` bytes.
///
/// After each read the buffer is cut after its last `\n`; the partial line
/// behind it moves to the front before the next read, so a line is never
/// split between two scans.
pub fn aggregate_reader<R: Read>(
    mut reader: R,
    range: ByteRange,
    table_capacity: usize,
    buffer_size: usize,
    delimiter: u8,
) -> Result<PartialTable> {
    let mut aggregator = ShardAggregator::new(range, table_capacity, delimiter);
    let mut buf = vec![0u8; buffer_size];
    let mut carried = 0;

    loop {
        let n = match reader.read(&mut buf[carried..]) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        if n == 0 {
            if carried > 0 {
                let mut scratch = Vec::with_capacity(carried + 1);
                aggregator.feed_unterminated(&buf[..carried], &mut scratch)?;
            }
            break;
        }

        let filled = carried + n;
        match buf[..filled].iter().rposition(|b| *b == b'\n') {
            Some(last) => {
                aggregator.feed_lines(&buf[..=last])?;
                buf.copy_within(last + 1..filled, 0);
                carried = filled - last - 1;
            }
            None if filled == buf.len() => {
                return Err(aggregator.malformed(0, "line longer than the read buffer"));
            }
            None => carried = filled,
        }
    }

    Ok(aggregator.finish())
}

/// Aggregates a shard that is already in memory, such as a slice of a
/// memory-mapped file.
pub fn aggregate_slice(
    bytes: &[u8],
    range: ByteRange,
    table_capacity: usize,
    delimiter: u8,
) -> Result<PartialTable> {
    let mut aggregator = ShardAggregator::new(range, table_capacity, delimiter);
    let tail = match bytes.iter().rposition(|b| *b == b'\n') {
        Some(last) => {
            aggregator.feed_lines(&bytes[..=last])?;
            &bytes[last + 1..]
        }
        None => bytes,
    };
    if !tail.is_empty() {
        let mut scratch = Vec::with_capacity(tail.len() + 1);
        aggregator.feed_unterminated(tail, &mut scratch)?;
    }
    Ok(aggregator.finish())
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;

    use super::{aggregate_reader, aggregate_slice};
    use crate::{error::Error, plan::ByteRange, stats::KeyStats, table::PartialTable};

    fn range_of(input: &str) -> ByteRange {
        ByteRange {
            offset: 0,
            length: input.len() as u64,
        }
    }

    fn collect(partial: &PartialTable) -> BTreeMap<String, KeyStats> {
        partial
            .iter()
            .map(|(k, s)| (String::from_utf8(k.to_vec()).unwrap(), *s))
            .collect()
    }

    #[test]
    fn reader_and_slice_agree() {
        let input = "a;1.1\nabc;12.3\na;-2.2\nverylongname12345;-11.0\naaverylongname1234;0.0\n";
        let from_slice = aggregate_slice(input.as_bytes(), range_of(input), 64, b';').unwrap();
        // tiny buffers force many carry-overs
        for buffer_size in [32, 33, 47, 64, 4096] {
            let from_reader =
                aggregate_reader(input.as_bytes(), range_of(input), 64, buffer_size, b';')
                    .unwrap();
            assert_eq!(
                collect(&from_reader),
                collect(&from_slice),
                "buffer of {buffer_size} bytes"
            );
        }
        let totals = collect(&from_slice);
        assert_eq!(totals.len(), 4);
        assert_eq!(
            totals["a"],
            KeyStats {
                min: -22,
                max: 11,
                sum: -11,
                count: 2
            }
        );
    }

    #[test]
    fn final_line_without_newline() {
        for input in ["a;-1.1", "b;2.0\na;-1.1"] {
            let partial = aggregate_reader(input.as_bytes(), range_of(input), 16, 64, b';').unwrap();
            assert_eq!(collect(&partial)["a"], KeyStats::new(-11), "reader, input {input:?}");
            let partial = aggregate_slice(input.as_bytes(), range_of(input), 16, b';').unwrap();
            assert_eq!(collect(&partial)["a"], KeyStats::new(-11), "slice, input {input:?}");
        }
    }

    #[test]
    fn missing_delimiter_is_reported_with_its_offset() {
        let input = "a;1.0\nbroken line\nc;2.0\n";
        let range = ByteRange {
            offset: 1000,
            length: input.len() as u64,
        };
        for result in [
            aggregate_reader(input.as_bytes(), range, 16, 64, b';').map(|_| ()),
            aggregate_slice(input.as_bytes(), range, 16, b';').map(|_| ()),
        ] {
            match result {
                Err(Error::MalformedLine { offset, reason }) => {
                    assert_eq!(offset, 1006);
                    assert_eq!(reason, "no delimiter");
                }
                other => panic!("expected MalformedLine, got {other:?}"),
            }
        }
    }

    #[test]
    fn bad_values_are_rejected() {
        for input in ["a;1.0\nb;x\n", "a;1.0\nb;1.23\n", "a;\n", "a;12.3;\n", "a;1.0\nb;-"] {
            let result = aggregate_slice(input.as_bytes(), range_of(input), 16, b';');
            assert!(
                matches!(result, Err(Error::MalformedLine { .. })),
                "input {input:?} should be rejected"
            );
        }
    }

    #[test]
    fn line_longer_than_buffer() {
        let input = format!("{};1.0\n", "k".repeat(100));
        let result = aggregate_reader(input.as_bytes(), range_of(&input), 16, 32, b';');
        assert!(matches!(result, Err(Error::MalformedLine { .. })));
    }

    #[test]
    fn table_overflow_aborts_the_shard() {
        let input: String = (0..10).map(|i| format!("key{i};1.0\n")).collect();
        let result = aggregate_slice(input.as_bytes(), range_of(&input), 8, b';');
        assert!(matches!(result, Err(Error::TableFull { capacity: 8, .. })));
    }

    #[test]
    fn empty_shard() {
        let partial = aggregate_reader(&b""[..], range_of(""), 16, 64, b';').unwrap();
        assert!(partial.is_empty());
    }
}
