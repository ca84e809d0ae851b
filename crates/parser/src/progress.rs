// Copyright The HLS Swarm Authors
// SPDX-License-Identifier: Apache-2.0

//! Progress-stream reader.
//!
//! The child writes `key=value` lines to a dedicated file descriptor; a
//! block is the run of lines ending at `progress=continue` or
//! `progress=end`. The reader carries the previous block's values forward,
//! so every emitted [`ProgressUpdate`] is fully populated.

use crate::error::Error;
use crate::event::{ProgressState, ProgressUpdate};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Receives reader output. Implementations must not block: if the
/// downstream cannot accept an update promptly, the implementation drops it
/// and accounts for the drop itself.
pub trait ProgressSink {
    /// Handles one fully populated update at a block boundary.
    fn on_update(&mut self, update: ProgressUpdate);

    /// Called once per input line, before parsing.
    fn on_line(&mut self) {}
}

/// Reads `key=value` progress blocks from the child's progress pipe.
pub struct ProgressReader<S> {
    sink: S,
    current: ProgressUpdate,
}

impl<S: ProgressSink> ProgressReader<S> {
    /// Creates a reader feeding the given sink.
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            current: ProgressUpdate::default(),
        }
    }

    /// Drains the pipe until EOF, emitting one update per block. Parsing is
    /// lenient: unknown keys are ignored and malformed numerics read as
    /// zero; nothing short of an I/O error fails the stream.
    pub async fn run<R: AsyncRead + Unpin>(mut self, reader: R) -> Result<S, Error> {
        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            self.sink.on_line();
            self.consume_line(&line);
        }
        Ok(self.sink)
    }

    fn consume_line(&mut self, line: &str) {
        let Some((key, value)) = line.split_once('=') else {
            return;
        };
        let key = key.trim();
        let value = value.trim();
        match key {
            "frame" => self.current.frame = parse_u64(value),
            "fps" => self.current.fps = parse_f64(value),
            "bitrate" => self.current.bitrate_kbps = parse_bitrate(value),
            "total_size" => self.current.total_size = parse_u64(value),
            "out_time_us" => self.current.out_time_us = parse_i64(value),
            "speed" => self.current.speed = parse_speed(value),
            "progress" => {
                self.current.state = if value == "end" {
                    ProgressState::End
                } else {
                    ProgressState::Continue
                };
                self.sink.on_update(self.current.clone());
            }
            _ => {}
        }
    }
}

fn parse_u64(value: &str) -> u64 {
    value.parse().unwrap_or(0)
}

fn parse_i64(value: &str) -> i64 {
    value.parse().unwrap_or(0)
}

fn parse_f64(value: &str) -> f64 {
    value.parse().unwrap_or(0.0)
}

/// `bitrate=1234.5kbits/s`, or `N/A` early in a run.
fn parse_bitrate(value: &str) -> f64 {
    let numeric = value.trim_end_matches("kbits/s").trim();
    numeric.parse().unwrap_or(0.0)
}

/// `speed=1.01x`, or `N/A` early in a run.
fn parse_speed(value: &str) -> f64 {
    let numeric = value.trim_end_matches('x').trim();
    numeric.parse().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Capture {
        updates: Vec<ProgressUpdate>,
        lines: u64,
    }

    impl ProgressSink for Capture {
        fn on_update(&mut self, update: ProgressUpdate) {
            self.updates.push(update);
        }

        fn on_line(&mut self) {
            self.lines += 1;
        }
    }

    async fn drain(input: &str) -> Capture {
        ProgressReader::new(Capture::default())
            .run(input.as_bytes())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_single_block() {
        let capture = drain(
            "frame=10\nfps=25.0\nbitrate=1200.5kbits/s\ntotal_size=4096\n\
             out_time_us=400000\nspeed=1.01x\nprogress=continue\n",
        )
        .await;

        assert_eq!(capture.updates.len(), 1);
        let u = &capture.updates[0];
        assert_eq!(u.frame, 10);
        assert_eq!(u.fps, 25.0);
        assert_eq!(u.bitrate_kbps, 1200.5);
        assert_eq!(u.total_size, 4096);
        assert_eq!(u.out_time_us, 400_000);
        assert_eq!(u.speed, 1.01);
        assert_eq!(u.state, ProgressState::Continue);
        assert_eq!(capture.lines, 7);
    }

    #[tokio::test]
    async fn test_unspecified_keys_retain_previous_values() {
        let capture = drain(
            "frame=10\ntotal_size=1000\nprogress=continue\n\
             frame=20\nprogress=continue\n",
        )
        .await;

        assert_eq!(capture.updates.len(), 2);
        assert_eq!(capture.updates[1].frame, 20);
        assert_eq!(capture.updates[1].total_size, 1000);
    }

    #[tokio::test]
    async fn test_malformed_numerics_read_as_zero() {
        let capture = drain("frame=xyz\nspeed=N/A\nbitrate=N/A\nprogress=continue\n").await;

        assert_eq!(capture.updates[0].frame, 0);
        assert_eq!(capture.updates[0].speed, 0.0);
        assert_eq!(capture.updates[0].bitrate_kbps, 0.0);
    }

    #[tokio::test]
    async fn test_unknown_keys_and_garbage_ignored() {
        let capture = drain("stream_0_0_q=29.0\nnot a kv line\nframe=3\nprogress=end\n").await;

        assert_eq!(capture.updates.len(), 1);
        assert_eq!(capture.updates[0].frame, 3);
        assert_eq!(capture.updates[0].state, ProgressState::End);
        assert_eq!(capture.lines, 4);
    }

    #[tokio::test]
    async fn test_partial_block_at_eof_emits_nothing() {
        let capture = drain("frame=10\ntotal_size=55\n").await;
        assert!(capture.updates.is_empty());
        assert_eq!(capture.lines, 2);
    }

    /// A sink that can only accept every other update, the way a full
    /// downstream channel behaves.
    #[derive(Default)]
    struct Saturated {
        emitted: u64,
        dropped: u64,
        lines: u64,
    }

    impl ProgressSink for Saturated {
        fn on_update(&mut self, _update: ProgressUpdate) {
            if (self.emitted + self.dropped) % 2 == 0 {
                self.emitted += 1;
            } else {
                self.dropped += 1;
            }
        }

        fn on_line(&mut self) {
            self.lines += 1;
        }
    }

    #[tokio::test]
    async fn test_lossy_accounting_identity() {
        let input: String = (0..100)
            .map(|i| format!("frame={i}\nprogress=continue\n"))
            .collect();
        let sink = ProgressReader::new(Saturated::default())
            .run(input.as_bytes())
            .await
            .unwrap();

        assert_eq!(sink.emitted + sink.dropped, 100);
        assert!(sink.lines >= sink.dropped + sink.emitted);
    }
}
