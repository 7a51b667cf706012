//! A bounded, unordered run of entries with a cached key summary.

use crate::Error;

/// Returns an error if both bounds are present and `low > high`.
pub(crate) fn check_range<K: Ord>(low: Option<&K>, high: Option<&K>) -> Result<(), Error> {
    if let (Some(low), Some(high)) = (low, high) {
        if low > high {
            return Err(Error::InvalidRange);
        }
    }
    Ok(())
}

/// Returns whether `key` lies within the closed bounds (a missing bound is unbounded).
fn within<K: Ord>(key: &K, low: Option<&K>, high: Option<&K>) -> bool {
    low.is_none_or(|low| key >= low) && high.is_none_or(|high| key <= high)
}

/// The smallest and largest key currently stored in a [Segment].
#[derive(Clone, Debug, PartialEq, Eq)]
struct Summary<K> {
    min: K,
    max: K,
}

/// A container of `(key, value)` entries kept in insertion (or split) order.
///
/// Entries are not sorted: every lookup is a scan. The [Summary] is what lets the index skip
/// segments that cannot hold a key.
#[derive(Clone, Debug)]
pub(crate) struct Segment<K, V> {
    entries: Vec<(K, V)>,
    summary: Option<Summary<K>>,
}

impl<K: Ord + Clone, V: Clone + PartialEq> Segment<K, V> {
    /// Create a segment holding a single entry.
    pub(crate) fn new(key: K, value: V) -> Self {
        Self::from_entries(vec![(key, value)])
    }

    /// Create a segment from entries that are already in the desired internal order.
    pub(crate) fn from_entries(entries: Vec<(K, V)>) -> Self {
        let mut segment = Self {
            entries,
            summary: None,
        };
        segment.summarize();
        segment
    }

    /// Recompute the summary from scratch.
    fn summarize(&mut self) {
        let mut keys = self.entries.iter().map(|(k, _)| k);
        self.summary = keys.next().map(|first| {
            let (min, max) = keys.fold((first, first), |(min, max), k| {
                (if k < min { k } else { min }, if k > max { k } else { max })
            });
            Summary {
                min: min.clone(),
                max: max.clone(),
            }
        });
    }

    /// The `(min, max)` keys of the segment, or `None` if it is empty.
    pub(crate) fn bounds(&self) -> Option<(&K, &K)> {
        self.summary.as_ref().map(|s| (&s.min, &s.max))
    }

    /// Returns whether `key` falls within the summary (not whether it is stored).
    pub(crate) fn covers(&self, key: &K) -> bool {
        self.summary
            .as_ref()
            .is_some_and(|s| *key >= s.min && *key <= s.max)
    }

    /// Returns whether the summary intersects the closed bounds.
    pub(crate) fn overlaps(&self, low: Option<&K>, high: Option<&K>) -> bool {
        self.summary.as_ref().is_some_and(|s| {
            low.is_none_or(|low| s.max >= *low) && high.is_none_or(|high| s.min <= *high)
        })
    }

    /// Add an entry at the end of the segment.
    ///
    /// The segment may exceed its capacity after this call; the caller is expected to
    /// [Segment::split] it.
    pub(crate) fn append(&mut self, key: K, value: V) {
        match &mut self.summary {
            Some(summary) => {
                if key < summary.min {
                    summary.min = key.clone();
                } else if key > summary.max {
                    summary.max = key.clone();
                }
            }
            None => {
                self.summary = Some(Summary {
                    min: key.clone(),
                    max: key.clone(),
                });
            }
        }
        self.entries.push((key, value));
    }

    /// Values stored under `key`, in internal order.
    pub(crate) fn find_exact(&self, key: &K) -> Vec<V> {
        if !self.covers(key) {
            return Vec::new();
        }
        self.entries
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// Returns whether any entry is stored under `key`.
    pub(crate) fn contains_key(&self, key: &K) -> bool {
        self.covers(key) && self.entries.iter().any(|(k, _)| k == key)
    }

    /// Entries whose key lies within the closed bounds, in internal order.
    pub(crate) fn find_range(
        &self,
        low: Option<&K>,
        high: Option<&K>,
    ) -> Result<Vec<(K, V)>, Error> {
        check_range(low, high)?;
        if !self.overlaps(low, high) {
            return Ok(Vec::new());
        }
        Ok(self
            .entries
            .iter()
            .filter(|(k, _)| within(k, low, high))
            .cloned()
            .collect())
    }

    /// Remove the first entry matching both `key` and `value`.
    pub(crate) fn remove_exact(&mut self, key: &K, value: &V) -> bool {
        let Some(position) = self
            .entries
            .iter()
            .position(|(k, v)| k == key && v == value)
        else {
            return false;
        };
        self.entries.remove(position);
        self.summarize();
        true
    }

    /// Partition the entries by alternating position.
    ///
    /// Entries at even positions go to the primary segment and entries at odd positions to the
    /// secondary one, each keeping its relative order. Both halves are non-empty as long as the
    /// segment holds at least two entries.
    pub(crate) fn split(&self) -> (Self, Self) {
        let mut primary = Vec::with_capacity(self.entries.len().div_ceil(2));
        let mut secondary = Vec::with_capacity(self.entries.len() / 2);
        for (position, entry) in self.entries.iter().enumerate() {
            if position % 2 == 0 {
                primary.push(entry.clone());
            } else {
                secondary.push(entry.clone());
            }
        }
        (Self::from_entries(primary), Self::from_entries(secondary))
    }

    /// All entries, in internal order.
    pub(crate) fn entries(&self) -> &[(K, V)] {
        &self.entries
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
