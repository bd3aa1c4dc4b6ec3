use std::io::{self, Write};

use rustc_hash::FxHashMap;

use crate::{
    stats::{KeyStats, Tenths},
    table::PartialTable,
};

/// Merged statistics of every shard.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Totals {
    map: FxHashMap<Box<[u8]>, KeyStats>,
}

impl Totals {
    /// Folds one shard in. Each partial table is consumed exactly once.
    pub fn absorb(&mut self, partial: PartialTable) {
        self.map.reserve(partial.len());
        for (key, stats) in partial.iter() {
            match self.map.get_mut(key) {
                Some(total) => total.merge(stats),
                None => {
                    self.map.insert(key.into(), *stats);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, key: &[u8]) -> Option<&KeyStats> {
        self.map.get(key)
    }

    /// Entries in ascending byte order of their keys.
    pub fn sorted(&self) -> Vec<(&[u8], &KeyStats)> {
        let mut entries = self
            .map
            .iter()
            .map(|(k, v)| (&**k, v))
            .collect::<Vec<_>>();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
        entries
    }
}

pub fn merge(partials: impl IntoIterator<Item = PartialTable>) -> Totals {
    partials.into_iter().fold(Totals::default(), |mut totals, partial| {
        totals.absorb(partial);
        totals
    })
}

/// Writes `{k1=min/mean/max, k2=min/mean/max, ...}` and a newline, keys in
/// byte order and written as their raw bytes, every number with one
/// fractional digit.
pub fn write_report(totals: &Totals, out: &mut impl Write) -> io::Result<()> {
    write!(out, "{{")?;
    for (i, (key, stats)) in totals.sorted().into_iter().enumerate() {
        if i > 0 {
            write!(out, ", ")?;
        }
        out.write_all(key)?;
        write!(
            out,
            "={}/{}/{}",
            Tenths(stats.min as i64),
            Tenths(stats.mean_tenths()),
            Tenths(stats.max as i64)
        )?;
    }
    writeln!(out, "}}")
}

/// The report as text; key bytes that are not UTF-8 are replaced.
pub fn render(totals: &Totals) -> String {
    let mut out = Vec::with_capacity(totals.len() * 32 + 3);
    // writing into a Vec cannot fail
    let _ = write_report(totals, &mut out);
    String::from_utf8_lossy(&out).into_owned()
}
