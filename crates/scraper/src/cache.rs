// Copyright The HLS Swarm Authors
// SPDX-License-Identifier: Apache-2.0

//! Windowed segment-size cache.
//!
//! One writer (the scrape task), unbounded concurrent readers. The whole
//! map is swapped atomically per update, so a read is one atomic load plus
//! a lookup and never blocks.

use crate::ListingEntry;
use arc_swap::ArcSwap;
use hls_swarm_config::media::segment_number;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Mapping from file name to size in bytes, windowed by segment sequence
/// number. Names that do not parse as a numbered segment (manifests, init
/// segments) are never evicted by the window rule.
pub struct SegmentSizeCache {
    entries: ArcSwap<HashMap<String, u64>>,
    /// Highest observed sequence number plus one; zero until the first
    /// numbered segment is seen.
    highest_plus_one: AtomicU64,
    window: u64,
}

impl SegmentSizeCache {
    /// Creates an empty cache retaining the `window` most recent numbered
    /// segments (at least 1).
    #[must_use]
    pub fn new(window: u64) -> Self {
        Self {
            entries: ArcSwap::from_pointee(HashMap::new()),
            highest_plus_one: AtomicU64::new(0),
            window: window.max(1),
        }
    }

    /// Size in bytes for a file name, if cached. One atomic load.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<u64> {
        self.entries.load().get(name).copied()
    }

    /// Number of cached entries of any kind.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    /// True when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.load().is_empty()
    }

    /// The highest segment sequence number observed so far.
    #[must_use]
    pub fn highest(&self) -> Option<u64> {
        match self.highest_plus_one.load(Ordering::Relaxed) {
            0 => None,
            h => Some(h - 1),
        }
    }

    /// Applies one fetched listing: stores every file entry, advances the
    /// running highest sequence number, and evicts numbered segments that
    /// fell out of the window. Intended for the single scrape task; readers
    /// are unaffected while this runs.
    pub fn apply_listing(&self, listing: &[ListingEntry]) {
        let mut next: HashMap<String, u64> = self.entries.load().as_ref().clone();

        let mut highest_plus_one = self.highest_plus_one.load(Ordering::Relaxed);
        for entry in listing {
            if !entry.is_file() {
                continue;
            }
            let _ = next.insert(entry.name.clone(), entry.size);
            if let Some(n) = segment_number(&entry.name) {
                highest_plus_one = highest_plus_one.max(n + 1);
            }
        }

        if highest_plus_one > 0 {
            let highest = highest_plus_one - 1;
            let floor = highest.saturating_sub(self.window - 1);
            next.retain(|name, _| match segment_number(name) {
                Some(n) => n >= floor,
                None => true,
            });
        }

        self.highest_plus_one
            .store(highest_plus_one, Ordering::Relaxed);
        self.entries.store(Arc::new(next));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, size: u64) -> ListingEntry {
        ListingEntry {
            name: name.to_owned(),
            kind: "file".to_owned(),
            size,
        }
    }

    fn directory(name: &str) -> ListingEntry {
        ListingEntry {
            name: name.to_owned(),
            kind: "directory".to_owned(),
            size: 0,
        }
    }

    #[test]
    fn test_window_keeps_most_recent_segments() {
        let cache = SegmentSizeCache::new(5);
        let listing: Vec<ListingEntry> = (1..=8)
            .map(|n| file(&format!("seg{n:05}.ts"), n * 100))
            .chain(std::iter::once(file("stream.m3u8", 512)))
            .collect();
        cache.apply_listing(&listing);

        assert_eq!(cache.len(), 6);
        assert_eq!(cache.highest(), Some(8));
        for n in 4..=8 {
            assert!(cache.get(&format!("seg{n:05}.ts")).is_some(), "seg {n}");
        }
        for n in 1..=3 {
            assert!(cache.get(&format!("seg{n:05}.ts")).is_none(), "seg {n}");
        }
        assert_eq!(cache.get("stream.m3u8"), Some(512));
    }

    #[test]
    fn test_eviction_is_idempotent() {
        let cache = SegmentSizeCache::new(3);
        let listing: Vec<ListingEntry> =
            (1..=6).map(|n| file(&format!("seg{n}.ts"), 100)).collect();
        cache.apply_listing(&listing);
        let first_len = cache.len();

        // Re-applying an empty listing re-runs the eviction rule only.
        cache.apply_listing(&[]);
        assert_eq!(cache.len(), first_len);
        assert_eq!(cache.highest(), Some(6));
    }

    #[test]
    fn test_unnumbered_entries_survive_every_cycle() {
        let cache = SegmentSizeCache::new(2);
        cache.apply_listing(&[file("stream.m3u8", 100), file("init.mp4", 900)]);
        for round in 0..5u64 {
            let n = 100 + round;
            cache.apply_listing(&[file(&format!("seg{n}.ts"), 100)]);
        }
        assert_eq!(cache.get("stream.m3u8"), Some(100));
        assert_eq!(cache.get("init.mp4"), Some(900));
    }

    #[test]
    fn test_highest_is_a_running_maximum() {
        let cache = SegmentSizeCache::new(10);
        cache.apply_listing(&[file("seg50.ts", 100)]);
        // A listing that momentarily goes backwards must not lower the floor.
        cache.apply_listing(&[file("seg45.ts", 100)]);
        assert_eq!(cache.highest(), Some(50));
        assert!(cache.get("seg45.ts").is_some());
    }

    #[test]
    fn test_directories_are_ignored() {
        let cache = SegmentSizeCache::new(10);
        cache.apply_listing(&[directory("archive"), file("seg1.ts", 77)]);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("seg1.ts"), Some(77));
    }

    #[test]
    fn test_updated_size_overwrites() {
        let cache = SegmentSizeCache::new(10);
        cache.apply_listing(&[file("seg1.ts", 100)]);
        cache.apply_listing(&[file("seg1.ts", 200)]);
        assert_eq!(cache.get("seg1.ts"), Some(200));
    }
}
