use std::{path::PathBuf, thread};

use log::warn;

use crate::error::{Error, Result};

pub const DEFAULT_MAX_LINE_LEN: usize = 100;
pub const DEFAULT_TABLE_CAPACITY: usize = 1 << 17;
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024 * 1024;
pub const MAX_SHARDS: usize = 1 << 16;

/// How a shard gets at its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    /// Each shard opens its own file handle and reads through a reused buffer.
    #[default]
    Buffered,
    /// The file is mapped once and each shard scans its own slice of the map.
    Mapped,
}

/// Everything the engine needs from its caller.
#[derive(Debug, Clone)]
pub struct Config {
    pub path: PathBuf,
    /// Desired number of shards.
    pub shards: usize,
    /// Threads aggregating shards; each takes the next unclaimed shard.
    pub workers: usize,
    /// Longest line the shard planner expects; also the probe window size.
    pub max_line_len: usize,
    /// Slots per shard table. Power of two, more than twice the distinct keys.
    pub table_capacity: usize,
    pub read_buffer_size: usize,
    pub delimiter: u8,
    pub read_mode: ReadMode,
}

impl Config {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let parallelism = available_parallelism();
        Self {
            path: path.into(),
            shards: parallelism,
            workers: parallelism,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            table_capacity: DEFAULT_TABLE_CAPACITY,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            delimiter: b';',
            read_mode: ReadMode::default(),
        }
    }

    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_max_line_len(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len;
        self
    }

    pub fn with_table_capacity(mut self, table_capacity: usize) -> Self {
        self.table_capacity = table_capacity;
        self
    }

    pub fn with_read_buffer_size(mut self, read_buffer_size: usize) -> Self {
        self.read_buffer_size = read_buffer_size;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_read_mode(mut self, read_mode: ReadMode) -> Self {
        self.read_mode = read_mode;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.shards == 0 {
            return Err(Error::InvalidConfig("shard count must be at least 1".into()));
        }
        if self.shards > MAX_SHARDS {
            return Err(Error::InvalidConfig(format!(
                "shard count {} exceeds the maximum of {MAX_SHARDS}",
                self.shards
            )));
        }
        if self.workers == 0 {
            return Err(Error::InvalidConfig("worker count must be at least 1".into()));
        }
        if self.max_line_len == 0 {
            return Err(Error::InvalidConfig("max line length must be at least 1".into()));
        }
        if !self.table_capacity.is_power_of_two() || self.table_capacity < 2 {
            return Err(Error::InvalidConfig(format!(
                "table capacity {} is not a power of two >= 2",
                self.table_capacity
            )));
        }
        if self.read_buffer_size <= self.max_line_len {
            return Err(Error::InvalidConfig(format!(
                "read buffer ({} bytes) must be larger than the max line length ({} bytes)",
                self.read_buffer_size, self.max_line_len
            )));
        }
        if self.delimiter == b'\n' {
            return Err(Error::InvalidConfig("delimiter cannot be a newline".into()));
        }
        Ok(())
    }
}

fn available_parallelism() -> usize {
    if let Ok(n) = thread::available_parallelism() {
        n.get()
    } else {
        warn!("couldn't query the available parallelism, going single-threaded");
        1
    }
}

#[cfg(test)]
mod test {
    use super::Config;

    #[test]
    fn defaults_are_valid() {
        let config = Config::new("measurements.txt");
        assert!(config.shards >= 1);
        assert!(config.workers >= 1);
        assert!(config.validate().is_ok(), "default config should validate");
    }

    #[test]
    fn rejects_bad_settings() {
        for (config, what) in [
            (Config::new("x").with_shards(0), "zero shards"),
            (Config::new("x").with_shards(1 << 40), "absurd shard count"),
            (Config::new("x").with_workers(0), "zero workers"),
            (Config::new("x").with_table_capacity(1000), "non power of two capacity"),
            (Config::new("x").with_table_capacity(1), "capacity of one"),
            (
                Config::new("x").with_read_buffer_size(64).with_max_line_len(64),
                "buffer no larger than a line",
            ),
            (Config::new("x").with_delimiter(b'\n'), "newline delimiter"),
            (Config::new("x").with_max_line_len(0), "zero line length"),
        ] {
            assert!(config.validate().is_err(), "should reject {what}");
        }
    }
}
