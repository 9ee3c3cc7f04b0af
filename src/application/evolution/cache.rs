use crate::domain::types::Candle;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tracing::debug;

/// Cache key: the symbol set (sorted, so ordering never splits entries),
/// the benchmark, and the requested range shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetKey {
    symbols: Vec<String>,
    benchmark: String,
    period_days: i64,
    interval: String,
}

impl DatasetKey {
    pub fn new(symbols: &[String], benchmark: &str, period_days: i64, interval: &str) -> Self {
        let mut symbols: Vec<String> = symbols.to_vec();
        symbols.sort();
        Self {
            symbols,
            benchmark: benchmark.to_string(),
            period_days,
            interval: interval.to_string(),
        }
    }
}

/// Aligned price series for a symbol set plus the benchmark.
#[derive(Debug, Clone, Default)]
pub struct CachedDataset {
    pub series: BTreeMap<String, Vec<Candle>>,
    pub benchmark: Vec<Candle>,
}

struct Entry {
    dataset: CachedDataset,
    fetched_at: Instant,
}

/// Time-bounded cache of fetched price data. Owned by the composition
/// root and injected where needed; expired entries read as misses.
pub struct BenchmarkDataCache {
    entries: HashMap<DatasetKey, Entry>,
    ttl: Duration,
}

impl BenchmarkDataCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, key: &DatasetKey) -> Option<&CachedDataset> {
        let entry = self.entries.get(key)?;
        if entry.fetched_at.elapsed() >= self.ttl {
            debug!("cache entry expired for {:?}", key);
            return None;
        }
        Some(&entry.dataset)
    }

    pub fn insert(&mut self, key: DatasetKey, dataset: CachedDataset) {
        self.entries.insert(
            key,
            Entry {
                dataset,
                fetched_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
