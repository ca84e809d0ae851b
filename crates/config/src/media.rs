// Copyright The HLS Swarm Authors
// SPDX-License-Identifier: Apache-2.0

//! Shared HLS URL vocabulary.
//!
//! One definition of "what is a segment" and "what is its sequence number"
//! is shared by the debug-event parser and the segment-size cache so the two
//! never disagree on windowing or sequence tracking.

use serde::{Deserialize, Serialize};

/// Kind of resource an HLS URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UrlKind {
    /// A playlist (`.m3u8`).
    Manifest,
    /// A media segment (`.ts`, or `.m4s` with a trailing sequence number).
    Segment,
    /// A one-time header file (`.mp4`/`.m4s` without a sequence number).
    ///
    /// Origins that number their init segments (`init-01.m4s`) classify
    /// those as `Segment`; there is currently no override for that
    /// convention.
    Init,
    /// Anything else.
    Unknown,
}

impl UrlKind {
    /// Classifies a URL by its path extension, case-insensitively. Query
    /// strings and fragments are ignored.
    #[must_use]
    pub fn classify(url: &str) -> Self {
        let path = strip_query(url);
        let lower = path.to_ascii_lowercase();
        if lower.ends_with(".m3u8") {
            Self::Manifest
        } else if lower.ends_with(".ts") {
            Self::Segment
        } else if lower.ends_with(".m4s") {
            match trailing_number(stem(&lower)) {
                Some(_) => Self::Segment,
                None => Self::Init,
            }
        } else if lower.ends_with(".mp4") {
            match trailing_number(stem(&lower)) {
                Some(_) => Self::Unknown,
                None => Self::Init,
            }
        } else {
            Self::Unknown
        }
    }
}

/// The sequence number of a `.ts` segment file name or URL: the trailing
/// integer of the stem, independent of prefix or zero padding.
/// `seg00042.ts` → 42. Names without a trailing integer return `None`.
#[must_use]
pub fn segment_number(name: &str) -> Option<u64> {
    let path = strip_query(name);
    if !path.to_ascii_lowercase().ends_with(".ts") {
        return None;
    }
    trailing_number(stem(path))
}

/// The sequence number embedded in any segment-like URL (`.ts` or `.m4s`),
/// used by per-variant sequence tracking.
#[must_use]
pub fn sequence_number(url: &str) -> Option<u64> {
    let path = strip_query(url);
    let lower = path.to_ascii_lowercase();
    if lower.ends_with(".ts") || lower.ends_with(".m4s") {
        trailing_number(stem(path))
    } else {
        None
    }
}

/// The per-variant key for sequence tracking: the URL with its trailing
/// sequence digits and extension removed. Two segments of the same rendition
/// share a key; different renditions do not.
#[must_use]
pub fn variant_key(url: &str) -> &str {
    let path = strip_query(url);
    let s = stem(path);
    let digits = s.len() - s.chars().rev().take_while(|c| c.is_ascii_digit()).count();
    &path[..digits]
}

fn strip_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

fn stem(path: &str) -> &str {
    match path.rfind('.') {
        Some(dot) => &path[..dot],
        None => path,
    }
}

fn trailing_number(stem: &str) -> Option<u64> {
    let digits: String = stem
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}
