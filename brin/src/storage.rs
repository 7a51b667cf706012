use crate::{
    segment::{check_range, Segment},
    Config, Error,
};
use commonware_runtime::Metrics;
use prometheus_client::metrics::{counter::Counter, gauge::Gauge};
use std::{
    collections::BTreeMap,
    fmt::Debug,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, RwLock,
    },
};
use tracing::{debug, trace};

/// Panic message shown when a latched, live segment is not registered under its position.
const MISSING_SEGMENT: &str = "live segment missing from directory";

/// Panic message shown when an empty segment is about to be registered.
const EMPTY_SEGMENT: &str = "cannot register an empty segment";

/// Where a segment sits in the directory: its minimum key when it was last positioned, followed
/// by a creation sequence that orders segments sharing a minimum.
type Position<K> = (K, u64);

/// Live segments ordered by [Position].
type Directory<K, V> = BTreeMap<Position<K>, Arc<Latch<K, V>>>;

/// The mutable part of a registered segment.
struct State<K, V> {
    position: Position<K>,
    segment: Segment<K, V>,

    /// Set once the segment has been replaced (split), emptied (delete), or dropped (clear). A
    /// retired segment is never mutated again and is no longer reachable from the directory.
    retired: bool,
}

/// A segment guarded by its own lock.
///
/// Locks are always taken in the order latch, then directory.
struct Latch<K, V> {
    state: Mutex<State<K, V>>,
}

impl<K, V> Latch<K, V> {
    fn new(position: Position<K>, segment: Segment<K, V>) -> Self {
        Self {
            state: Mutex::new(State {
                position,
                segment,
                retired: false,
            }),
        }
    }
}

/// A copy of a single segment's entries, in internal order.
///
/// Produced by [Index::checkpoint] and consumed by [Index::restore], this is the unit a paging
/// layer persists and reloads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot<K, V> {
    /// Entries in internal order.
    pub entries: Vec<(K, V)>,
}

/// An index over an ordered key space that stores multiple values per key in capacity-bounded
/// segments.
pub struct Index<K, V> {
    capacity: usize,
    directory: RwLock<Directory<K, V>>,
    sequence: AtomicU64,

    segments: Gauge,
    items: Gauge,
    splits: Counter,
    retired: Counter,
}

impl<K: Ord + Clone, V: Clone + PartialEq> Index<K, V> {
    /// Create a new, empty [Index].
    pub fn init(context: impl Metrics, cfg: Config) -> Result<Self, Error> {
        if cfg.capacity == 0 {
            return Err(Error::InvalidCapacity(cfg.capacity));
        }
        let s = Self {
            capacity: cfg.capacity,
            directory: RwLock::new(BTreeMap::new()),
            sequence: AtomicU64::new(0),

            segments: Gauge::default(),
            items: Gauge::default(),
            splits: Counter::default(),
            retired: Counter::default(),
        };
        context.register("segments", "Number of live segments", s.segments.clone());
        context.register("items", "Number of entries in the index", s.items.clone());
        context.register("splits", "Number of segment splits", s.splits.clone());
        context.register(
            "retired",
            "Number of segments retired after being emptied",
            s.retired.clone(),
        );
        Ok(s)
    }

    /// Rebuild an [Index] from snapshots previously returned by [Index::checkpoint].
    ///
    /// Segments are registered in the order provided, so restoring a checkpoint reproduces the
    /// original directory order (including the order of segments sharing a minimum key).
    pub fn restore(
        context: impl Metrics,
        cfg: Config,
        snapshots: Vec<Snapshot<K, V>>,
    ) -> Result<Self, Error> {
        for (i, snapshot) in snapshots.iter().enumerate() {
            if snapshot.entries.is_empty() || snapshot.entries.len() > cfg.capacity {
                return Err(Error::InvalidSnapshot(format!(
                    "segment {i} holds {} entries (capacity {})",
                    snapshot.entries.len(),
                    cfg.capacity
                )));
            }
        }
        let index = Self::init(context, cfg)?;

        let mut items = 0;
        {
            let mut directory = index.directory.write().unwrap();
            for snapshot in snapshots {
                items += snapshot.entries.len();
                index.register(&mut directory, Segment::from_entries(snapshot.entries));
            }
            index.segments.set(directory.len() as i64);
            index.items.set(items as i64);
            debug!(segments = directory.len(), items, "restored index");
        }
        Ok(index)
    }

    /// Allocate the next creation sequence.
    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Insert a new segment into the directory, positioned by its minimum key.
    fn register(&self, directory: &mut Directory<K, V>, segment: Segment<K, V>) {
        let Some((min, _)) = segment.bounds() else {
            unreachable!("{EMPTY_SEGMENT}");
        };
        let position = (min.clone(), self.next_sequence());
        directory.insert(position.clone(), Arc::new(Latch::new(position, segment)));
    }

    /// Remove a latched segment from the directory.
    fn unregister(directory: &mut Directory<K, V>, state: &State<K, V>) -> Arc<Latch<K, V>> {
        let Some(latch) = directory.remove(&state.position) else {
            unreachable!("{MISSING_SEGMENT}");
        };
        latch
    }

    /// All live segments in directory order.
    fn snapshot(&self) -> Vec<Arc<Latch<K, V>>> {
        self.directory.read().unwrap().values().cloned().collect()
    }

    /// Live segments, in directory order, whose minimum key does not exceed `high` (all segments
    /// if `high` is unbounded).
    ///
    /// A segment's position always tracks its minimum once its latch is released, so segments
    /// positioned above `high` cannot hold a match and are never latched.
    fn candidates(&self, high: Option<&K>) -> Vec<Arc<Latch<K, V>>> {
        let Some(high) = high else {
            return self.snapshot();
        };
        self.directory
            .read()
            .unwrap()
            .range(..=(high.clone(), u64::MAX))
            .map(|(_, latch)| latch.clone())
            .collect()
    }

    /// The segment a new entry for `key` should go to: the segment with the greatest minimum
    /// not exceeding `key`, or the first segment if every minimum exceeds `key`.
    fn target(&self, key: &K) -> Option<Arc<Latch<K, V>>> {
        let directory = self.directory.read().unwrap();
        directory
            .range(..=(key.clone(), u64::MAX))
            .next_back()
            .or_else(|| directory.iter().next())
            .map(|(_, latch)| latch.clone())
    }

    /// Move a latched segment if its minimum key no longer matches its position.
    fn reposition(&self, state: &mut State<K, V>) {
        let Some((min, _)) = state.segment.bounds() else {
            unreachable!("{EMPTY_SEGMENT}");
        };
        if *min == state.position.0 {
            return;
        }
        let position = (min.clone(), state.position.1);
        let mut directory = self.directory.write().unwrap();
        let latch = Self::unregister(&mut directory, state);
        directory.insert(position.clone(), latch);
        state.position = position;
    }

    /// Replace an overflowing, latched segment with its two halves in a single directory edit.
    fn split(&self, state: &mut State<K, V>) {
        let (primary, secondary) = state.segment.split();
        let (primary_len, secondary_len) = (primary.len(), secondary.len());
        {
            let mut directory = self.directory.write().unwrap();
            Self::unregister(&mut directory, state);
            self.register(&mut directory, primary);
            self.register(&mut directory, secondary);
        }
        state.retired = true;
        self.segments.inc();
        self.splits.inc();
        debug!(
            sequence = state.position.1,
            primary = primary_len,
            secondary = secondary_len,
            "split segment"
        );
    }

    /// Remove an empty, latched segment from the directory.
    fn retire(&self, state: &mut State<K, V>) {
        {
            let mut directory = self.directory.write().unwrap();
            Self::unregister(&mut directory, state);
        }
        state.retired = true;
        self.segments.dec();
        self.retired.inc();
        debug!(sequence = state.position.1, "retired segment");
    }

    /// Add a value under `key`.
    pub fn put(&self, key: K, value: V) {
        loop {
            let Some(latch) = self.target(&key) else {
                let mut directory = self.directory.write().unwrap();
                if !directory.is_empty() {
                    // Another writer created the first segment
                    continue;
                }
                self.register(&mut directory, Segment::new(key, value));
                self.segments.inc();
                self.items.inc();
                debug!("created first segment");
                return;
            };

            let mut state = latch.state.lock().unwrap();
            if state.retired {
                trace!("target segment retired, retrying");
                continue;
            }
            state.segment.append(key, value);
            self.items.inc();
            if state.segment.len() > self.capacity {
                self.split(&mut state);
            } else {
                self.reposition(&mut state);
            }
            return;
        }
    }

    /// Remove one entry matching both `key` and `value`.
    ///
    /// Returns whether an entry was removed. Segments left empty are retired.
    pub fn delete(&self, key: &K, value: &V) -> bool {
        'retry: loop {
            for latch in self.candidates(Some(key)) {
                let mut state = latch.state.lock().unwrap();
                if state.retired {
                    // Entries may have moved to segments this snapshot does not include
                    continue 'retry;
                }
                if !state.segment.covers(key) || !state.segment.remove_exact(key, value) {
                    continue;
                }
                self.items.dec();
                if state.segment.is_empty() {
                    self.retire(&mut state);
                } else {
                    self.reposition(&mut state);
                }
                return true;
            }
            return false;
        }
    }

    /// Values stored under `key`.
    ///
    /// Segments are visited in directory order and each contributes its matches in internal
    /// order. Since every match shares the same key, ordering by key is already satisfied.
    pub fn search(&self, key: &K) -> Vec<V> {
        let mut values = Vec::new();
        for latch in self.candidates(Some(key)) {
            let state = latch.state.lock().unwrap();
            values.extend(state.segment.find_exact(key));
        }
        trace!(matches = values.len(), "search");
        values
    }

    /// Returns whether any value is stored under `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.candidates(Some(key))
            .iter()
            .any(|latch| latch.state.lock().unwrap().segment.contains_key(key))
    }

    /// Values whose key lies within `[low, high]` (a missing bound is unbounded), in ascending key
    /// order.
    ///
    /// Values sharing a key are returned in the order segments were visited (directory order) and,
    /// within a segment, in internal order.
    pub fn look_up_range(&self, low: Option<&K>, high: Option<&K>) -> Result<Vec<V>, Error> {
        check_range(low, high)?;
        let mut gathered = Vec::new();
        for latch in self.candidates(high) {
            let state = latch.state.lock().unwrap();
            if state.segment.overlaps(low, high) {
                gathered.extend(state.segment.find_range(low, high)?);
            }
        }

        // Stable, so equal keys keep gather order
        gathered.sort_by(|(a, _), (b, _)| a.cmp(b));
        trace!(matches = gathered.len(), "look up range");
        Ok(gathered.into_iter().map(|(_, v)| v).collect())
    }

    /// Copy every live segment, in directory order.
    ///
    /// Each segment is copied under its own lock, so a concurrent writer never leaves a partially
    /// applied mutation in a snapshot.
    pub fn checkpoint(&self) -> Vec<Snapshot<K, V>> {
        'retry: loop {
            let mut snapshots = Vec::new();
            for latch in self.snapshot() {
                let state = latch.state.lock().unwrap();
                if state.retired {
                    continue 'retry;
                }
                snapshots.push(Snapshot {
                    entries: state.segment.entries().to_vec(),
                });
            }
            return snapshots;
        }
    }

    /// Remove every segment that is live when the call begins.
    pub fn clear(&self) {
        let mut cleared = 0;
        for latch in self.snapshot() {
            let mut state = latch.state.lock().unwrap();
            if state.retired {
                continue;
            }
            {
                let mut directory = self.directory.write().unwrap();
                Self::unregister(&mut directory, &state);
            }
            state.retired = true;
            self.segments.dec();
            self.items.dec_by(state.segment.len() as i64);
            cleared += 1;
        }
        debug!(segments = cleared, "cleared index");
    }

    /// Number of live segments.
    pub fn segments(&self) -> usize {
        self.directory.read().unwrap().len()
    }

    /// Number of entries in the index.
    pub fn len(&self) -> usize {
        self.items.get() as usize
    }

    /// Returns whether the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.directory.read().unwrap().is_empty()
    }
}

impl<K: Ord + Clone + Debug, V: Clone + PartialEq + Debug> Index<K, V> {
    /// Render every segment and its entries, for debugging.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for latch in self.snapshot() {
            let state = latch.state.lock().unwrap();
            let Some((min, max)) = state.segment.bounds() else {
                continue;
            };
            out.push_str(&format!(
                "segment {} [{:?}, {:?}] ({} {}{})\n",
                state.position.1,
                min,
                max,
                state.segment.len(),
                if state.segment.len() == 1 { "entry" } else { "entries" },
                if state.retired { ", retired" } else { "" }
            ));
            for (key, value) in state.segment.entries() {
                out.push_str(&format!("  {key:?} => {value:?}\n"));
            }
        }
        debug!(dump = %out, "dumped index");
        out
    }
}
