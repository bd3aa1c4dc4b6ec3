use crate::{
    error::{Error, Result},
    stats::KeyStats,
};

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    hash: u64,
    key_start: usize,
    key_len: usize,
    stats: KeyStats,
}

impl Slot {
    #[inline(always)]
    fn is_empty(&self) -> bool {
        self.stats.count == 0
    }
}

/// Fixed-capacity open-addressing table from key bytes to [`KeyStats`].
///
/// Collisions are resolved by linear probing. The table never grows: going
/// past half of its capacity is an error, which keeps probe sequences short.
/// There is no removal, so slots are only ever empty or occupied.
///
/// Key bytes are copied once, on first sight, into a single arena owned by
/// the table; lookups compare against the caller's borrowed span.
pub struct KeyStatsTable {
    slots: Box<[Slot]>,
    keys: Vec<u8>,
    len: usize,
    mask: usize,
    shift: u32,
}

impl KeyStatsTable {
    /// `capacity` must be a power of two.
    pub fn new(capacity: usize) -> Self {
        debug_assert!(
            capacity.is_power_of_two() && capacity >= 2,
            "capacity must be a power of two of at least 2"
        );
        Self {
            slots: vec![Slot::default(); capacity].into_boxed_slice(),
            // room for the maximum key count at a typical key length
            keys: Vec::with_capacity(capacity / 2 * 16),
            len: 0,
            mask: capacity - 1,
            shift: 64 - capacity.trailing_zeros(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// First slot probed for `hash`. Taken from the top bits: the low bits of
    /// a multiplicative hash barely change between keys sharing a prefix.
    #[inline(always)]
    fn home_slot(&self, hash: u64) -> usize {
        (hash >> self.shift) as usize
    }

    /// Adds one observation for `key`, whose hash was computed by the scanner.
    #[inline]
    pub fn record(&mut self, key: &[u8], hash: u64, value: i32) -> Result<()> {
        let mut index = self.home_slot(hash);
        loop {
            let slot = &mut self.slots[index];
            if slot.is_empty() {
                return self.insert(index, key, hash, KeyStats::new(value));
            }
            if slot.hash == hash && &self.keys[slot.key_start..slot.key_start + slot.key_len] == key
            {
                slot.stats.record(value);
                return Ok(());
            }
            index = (index + 1) & self.mask;
        }
    }

    #[cold]
    fn insert(&mut self, index: usize, key: &[u8], hash: u64, stats: KeyStats) -> Result<()> {
        if (self.len + 1) * 2 > self.slots.len() {
            return Err(Error::TableFull {
                capacity: self.slots.len(),
                len: self.len + 1,
            });
        }
        let key_start = self.keys.len();
        self.keys.extend_from_slice(key);
        self.slots[index] = Slot {
            hash,
            key_start,
            key_len: key.len(),
            stats,
        };
        self.len += 1;
        Ok(())
    }

    /// Occupied entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &KeyStats)> + '_ {
        self.slots
            .iter()
            .filter(|slot| !slot.is_empty())
            .map(|slot| {
                (
                    &self.keys[slot.key_start..slot.key_start + slot.key_len],
                    &slot.stats,
                )
            })
    }

    /// Hands the finished table off; it can no longer be written.
    pub fn freeze(self) -> PartialTable {
        PartialTable { table: self }
    }
}

/// The read-only result of one shard.
pub struct PartialTable {
    table: KeyStatsTable,
}

impl PartialTable {
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &KeyStats)> + '_ {
        self.table.iter()
    }
}
