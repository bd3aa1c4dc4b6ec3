use std::{
    fs::File,
    io::{Cursor, Read, Seek, SeekFrom},
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    thread,
    time::Instant,
};

use log::{debug, info};
use memmap2::Mmap;

use crate::{
    config::{Config, ReadMode},
    error::{Error, Result},
    plan::{plan_shards, ByteRange},
    report::{self, Totals},
    shard::{aggregate_reader, aggregate_slice},
    table::PartialTable,
};

/// Runs the whole pipeline: plan shards, aggregate them on a bounded set of
/// worker threads, then merge once every shard is done.
pub struct Engine {
    config: Config,
}

impl Engine {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Aggregates the configured file and renders the report.
    pub fn run(&self) -> Result<String> {
        Ok(report::render(&self.aggregate()?))
    }

    pub fn aggregate(&self) -> Result<Totals> {
        let start = Instant::now();
        let path = &self.config.path;
        let mut file = File::open(path).map_err(|e| Error::io(path, e))?;
        let size = file.metadata().map_err(|e| Error::io(path, e))?.len();
        info!(
            "aggregating {} ({size} bytes) with up to {} shards, {:?} reads",
            path.display(),
            self.config.shards,
            self.config.read_mode
        );

        let totals = match self.config.read_mode {
            ReadMode::Buffered => {
                let ranges =
                    plan_shards(&mut file, size, self.config.shards, self.config.max_line_len)?;
                log_plan(&ranges);
                report::merge(fan_out(&ranges, self.config.workers, |range| {
                    self.read_shard(range)
                })?)
            }
            // mapping an empty file fails on some platforms
            ReadMode::Mapped if size == 0 => Totals::default(),
            ReadMode::Mapped => {
                // SAFETY: the input is treated as read-only for the whole run;
                // it must not be truncated while mapped.
                let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::io(path, e))?;
                aggregate_bytes(&mmap, &self.config)?
            }
        };

        info!(
            "aggregated {} keys from {} in {:.2?}",
            totals.len(),
            path.display(),
            start.elapsed()
        );
        Ok(totals)
    }

    /// Opens a private handle positioned at the range, so shards never share
    /// a read cursor.
    fn read_shard(&self, range: ByteRange) -> Result<PartialTable> {
        let path = &self.config.path;
        let mut file = File::open(path).map_err(|e| Error::io(path, e))?;
        file.seek(SeekFrom::Start(range.offset))
            .map_err(|e| Error::io(path, e))?;
        aggregate_reader(
            file.take(range.length),
            range,
            self.config.table_capacity,
            self.config.read_buffer_size,
            self.config.delimiter,
        )
    }
}

/// Aggregates input that is already in memory, sharded as `config` says.
/// `config.path` and `config.read_mode` are ignored.
pub fn aggregate_bytes(input: &[u8], config: &Config) -> Result<Totals> {
    config.validate()?;
    let ranges = plan_shards(
        &mut Cursor::new(input),
        input.len() as u64,
        config.shards,
        config.max_line_len,
    )?;
    log_plan(&ranges);
    let partials = fan_out(&ranges, config.workers, |range| {
        let bytes = &input[range.offset as usize..range.end() as usize];
        aggregate_slice(bytes, range, config.table_capacity, config.delimiter)
    })?;
    Ok(report::merge(partials))
}

fn log_plan(ranges: &[ByteRange]) {
    for (shard, range) in ranges.iter().enumerate() {
        debug!(
            "shard {shard}: bytes {}..{} ({} bytes)",
            range.offset,
            range.end(),
            range.length
        );
    }
}

/// Runs `work` on every range using at most `workers` scoped threads. Each
/// thread claims the next unclaimed shard from a shared counter; once a
/// shard fails no new shard is started. Partials come back in shard order
/// and the first failing shard (in shard order) decides the error.
fn fan_out<F>(ranges: &[ByteRange], workers: usize, work: F) -> Result<Vec<PartialTable>>
where
    F: Fn(ByteRange) -> Result<PartialTable> + Sync,
{
    let next_shard = AtomicUsize::new(0);
    let failed = AtomicBool::new(false);
    let workers = workers.clamp(1, ranges.len().max(1));

    let finished = thread::scope(|s| {
        let mut handles = Vec::with_capacity(workers);
        let mut spawn_error = None;
        for worker in 0..workers {
            let (next_shard, failed, work) = (&next_shard, &failed, &work);
            let spawned = thread::Builder::new()
                .name(format!("shard-worker-{worker}"))
                .spawn_scoped(s, move || {
                    let mut done = Vec::new();
                    while !failed.load(Ordering::Relaxed) {
                        let shard = next_shard.fetch_add(1, Ordering::Relaxed);
                        let Some(&range) = ranges.get(shard) else {
                            break;
                        };
                        let start = Instant::now();
                        let result = work(range);
                        match &result {
                            Ok(partial) => debug!(
                                "shard {shard} done: {} keys in {:.2?}",
                                partial.len(),
                                start.elapsed()
                            ),
                            Err(_) => failed.store(true, Ordering::Relaxed),
                        }
                        done.push((shard, result));
                    }
                    done
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    failed.store(true, Ordering::Relaxed);
                    spawn_error = Some(Error::Spawn(e));
                    break;
                }
            }
        }

        let mut finished = Vec::with_capacity(ranges.len());
        let mut panicked = None;
        for (worker, handle) in handles.into_iter().enumerate() {
            match handle.join() {
                Ok(done) => finished.extend(done),
                Err(_) => {
                    panicked.get_or_insert(Error::WorkerPanicked { worker });
                }
            }
        }
        match spawn_error.or(panicked) {
            Some(e) => Err(e),
            None => Ok(finished),
        }
    })?;

    let mut results = ranges.iter().map(|_| None).collect::<Vec<_>>();
    for (shard, result) in finished {
        results[shard] = Some(result);
    }
    let mut partials = Vec::with_capacity(ranges.len());
    // shards left unclaimed after a failure show up as `None`
    for result in results.into_iter().flatten() {
        partials.push(result?);
    }
    Ok(partials)
}

#[cfg(test)]
mod test {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        thread,
        time::Duration,
    };

    use super::{aggregate_bytes, fan_out};
    use crate::{
        config::Config,
        error::{Error, Result},
        plan::ByteRange,
        report::render,
        table::{KeyStatsTable, PartialTable},
    };

    fn ranges(count: u64) -> Vec<ByteRange> {
        (0..count)
            .map(|i| ByteRange {
                offset: i * 10,
                length: 10,
            })
            .collect()
    }

    /// A partial holding a single key naming the range it came from.
    fn tagged(range: ByteRange) -> Result<PartialTable> {
        let mut table = KeyStatsTable::new(2);
        table.record(range.offset.to_string().as_bytes(), 0, 1)?;
        Ok(table.freeze())
    }

    fn run(input: &str, shards: usize) -> String {
        let config = Config::new("unused")
            .with_shards(shards)
            .with_table_capacity(1024);
        render(&aggregate_bytes(input.as_bytes(), &config).unwrap())
    }

    #[test]
    fn end_to_end_in_memory() {
        assert_eq!(
            run("A;1.0\nB;2.0\nA;3.0\n", 1),
            "{A=1.0/2.0/3.0, B=2.0/2.0/2.0}\n"
        );
    }

    #[test]
    fn sharding_is_aggregation_neutral() {
        let input: String = (0..500)
            .map(|i| {
                let key = ["Oslo", "Abidjan", "A", "AB", "San Francisco de Asís", "Z"][i % 6];
                let value = (i as i32 * 37 % 1999) - 999;
                let sign = if value < 0 { "-" } else { "" };
                format!("{key};{sign}{}.{}\n", value.abs() / 10, value.abs() % 10)
            })
            .collect();
        let expected = run(&input, 1);
        for shards in [2, 3, 7, 16, 64] {
            assert_eq!(run(&input, shards), expected, "{shards} shards");
        }
    }

    #[test]
    fn failing_shard_fails_the_run() {
        let config = Config::new("unused").with_shards(4).with_table_capacity(64);
        let input = "a;1.0\nb;2.0\nc;3.0\nd;4.0\nno delimiter here\ne;5.0\nf;6.0\n";
        assert!(aggregate_bytes(input.as_bytes(), &config).is_err());
    }

    #[test]
    fn workers_are_bounded_and_results_keep_shard_order() {
        let ranges = ranges(24);
        for workers in [1, 3, 8, 100] {
            let active = AtomicUsize::new(0);
            let peak = AtomicUsize::new(0);
            let partials = fan_out(&ranges, workers, |range| {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(2));
                active.fetch_sub(1, Ordering::SeqCst);
                tagged(range)
            })
            .unwrap();

            assert!(
                peak.load(Ordering::SeqCst) <= workers,
                "{workers} workers ran {} shards at once",
                peak.load(Ordering::SeqCst)
            );
            assert_eq!(partials.len(), ranges.len());
            for (partial, range) in partials.iter().zip(&ranges) {
                let (key, _) = partial.iter().next().unwrap();
                assert_eq!(key, range.offset.to_string().as_bytes(), "{workers} workers");
            }
        }
    }

    #[test]
    fn first_failing_shard_decides_the_error() {
        let ranges = ranges(16);
        for workers in [1, 4] {
            let result = fan_out(&ranges, workers, |range| {
                if range.offset == 50 || range.offset == 120 {
                    return Err(Error::MalformedLine {
                        offset: range.offset,
                        reason: "bad",
                    });
                }
                tagged(range)
            });
            match result {
                Err(Error::MalformedLine { offset, .. }) => assert_eq!(offset, 50),
                other => panic!("expected MalformedLine, got {:?}", other.map(|p| p.len())),
            }
        }
    }

    #[test]
    fn panicking_worker_is_an_error() {
        let result = fan_out(&ranges(4), 2, |range| {
            if range.offset == 20 {
                panic!("worker blew up");
            }
            tagged(range)
        });
        assert!(matches!(result, Err(Error::WorkerPanicked { .. })));
    }

    #[test]
    fn no_ranges_no_work() {
        assert!(fan_out(&[], 4, tagged).unwrap().is_empty());
    }

    #[test]
    fn more_shards_than_bytes() {
        let config = Config::new("unused")
            .with_shards(4096)
            .with_workers(4)
            .with_table_capacity(64);
        let totals = aggregate_bytes(b"a;1.0\nb;2.0\na;3.0\n", &config).unwrap();
        assert_eq!(render(&totals), "{a=1.0/2.0/3.0, b=2.0/2.0/2.0}\n");
    }
}
