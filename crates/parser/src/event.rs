// Copyright The HLS Swarm Authors
// SPDX-License-Identifier: Apache-2.0

//! Parsed fetcher output.

use chrono::NaiveDateTime;
use hls_swarm_config::UrlKind;

/// Whether a progress block is an intermediate or the final one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressState {
    /// More blocks will follow.
    #[default]
    Continue,
    /// The fetcher is done; no further blocks.
    End,
}

/// One snapshot parsed from a progress block.
///
/// Keys absent from a block retain the value of the previous block;
/// malformed numerics parse as zero. `total_size` is the child's cumulative
/// byte counter and resets to zero when the child restarts; fleet accounting
/// compensates for that separately.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProgressUpdate {
    /// Frames emitted so far.
    pub frame: u64,
    /// Current output frame rate.
    pub fps: f64,
    /// Current bitrate in kbit/s.
    pub bitrate_kbps: f64,
    /// Cumulative bytes written by this child process.
    pub total_size: u64,
    /// Playback position in microseconds.
    pub out_time_us: i64,
    /// Playback speed relative to realtime (1.0 = realtime).
    pub speed: f64,
    /// Block terminator state.
    pub state: ProgressState,
}

/// One event extracted from the fetcher's timestamped stderr.
///
/// The timestamp is always the fetcher's own, parsed from the log line; it
/// is never the time the parser saw the line.
#[derive(Debug, Clone, PartialEq)]
pub enum DebugEvent {
    /// The fetcher announced a request for an HLS resource.
    HlsRequest {
        /// Requested URL.
        url: String,
        /// Classification of the URL.
        kind: UrlKind,
        /// Fetcher timestamp.
        ts: NaiveDateTime,
    },
    /// A playlist was opened for reading.
    PlaylistOpen {
        /// Playlist URL.
        url: String,
        /// Fetcher timestamp.
        ts: NaiveDateTime,
    },
    /// A media segment was opened for reading.
    SegmentOpen {
        /// Segment URL.
        url: String,
        /// Fetcher timestamp.
        ts: NaiveDateTime,
    },
    /// A media segment finished; carries the matched open-to-close wall time.
    SegmentClose {
        /// Segment URL recorded at open time.
        url: String,
        /// Bytes the fetcher reported reading from this segment.
        bytes_read: u64,
        /// Close timestamp minus open timestamp.
        wall_time: std::time::Duration,
        /// Fetcher timestamp of the close line.
        ts: NaiveDateTime,
    },
    /// An open segment saw no close line within the TTL and was expired.
    SegmentExpired {
        /// Segment URL recorded at open time.
        url: String,
        /// Fetcher timestamp of the line that triggered the expiry sweep.
        ts: NaiveDateTime,
    },
    /// The fetcher started a TCP connection attempt.
    TcpConnectAttempt {
        /// Remote host.
        host: String,
        /// Remote port.
        port: u16,
        /// Fetcher timestamp.
        ts: NaiveDateTime,
    },
    /// A TCP connection was established.
    TcpConnected {
        /// Remote host.
        host: String,
        /// Remote port.
        port: u16,
        /// Fetcher timestamp.
        ts: NaiveDateTime,
    },
    /// A TCP connection attempt failed.
    TcpFailed {
        /// Remote host.
        host: String,
        /// Remote port.
        port: u16,
        /// Failure reason as logged (`refused`, `timed out`, ...).
        reason: String,
        /// Fetcher timestamp.
        ts: NaiveDateTime,
    },
    /// The origin answered with a 4xx/5xx status.
    HttpError {
        /// HTTP status code.
        code: u16,
        /// URL most recently opened on the same connection context, when
        /// known.
        url: Option<String>,
        /// Fetcher timestamp.
        ts: NaiveDateTime,
    },
    /// The fetcher announced a reconnect.
    Reconnect {
        /// Fetcher timestamp.
        ts: NaiveDateTime,
    },
    /// An operation timed out.
    Timeout {
        /// Fetcher timestamp.
        ts: NaiveDateTime,
    },
    /// A gap in the media sequence of one variant.
    SequenceSkip {
        /// The sequence number that was expected next.
        expected: u64,
        /// The sequence number that was observed.
        got: u64,
        /// Fetcher timestamp.
        ts: NaiveDateTime,
    },
}

impl DebugEvent {
    /// The fetcher timestamp carried by this event.
    #[must_use]
    pub const fn timestamp(&self) -> NaiveDateTime {
        match self {
            Self::HlsRequest { ts, .. }
            | Self::PlaylistOpen { ts, .. }
            | Self::SegmentOpen { ts, .. }
            | Self::SegmentClose { ts, .. }
            | Self::SegmentExpired { ts, .. }
            | Self::TcpConnectAttempt { ts, .. }
            | Self::TcpConnected { ts, .. }
            | Self::TcpFailed { ts, .. }
            | Self::HttpError { ts, .. }
            | Self::Reconnect { ts }
            | Self::Timeout { ts }
            | Self::SequenceSkip { ts, .. } => *ts,
        }
    }
}
