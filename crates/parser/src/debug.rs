// Copyright The HLS Swarm Authors
// SPDX-License-Identifier: Apache-2.0

//! Debug-event parser.
//!
//! Classifies the fetcher's timestamped stderr lines into [`DebugEvent`]s.
//! Lines look like:
//!
//! ```text
//! 2026-03-01 12:00:01.250 [debug] [hls @ 0x55d1c0a00] Opening 'http://o/seg00042.ts' for reading
//! ```
//!
//! The `[component @ 0xADDR]` tag identifies the I/O context; a segment's
//! open and close lines share the address, which is how the parser pairs
//! them to measure segment wall time. Opens that never see a close are
//! expired after a TTL so the pending table stays bounded.

use crate::error::Error;
use crate::event::DebugEvent;
use chrono::NaiveDateTime;
use hls_swarm_config::UrlKind;
use hls_swarm_config::media::{sequence_number, variant_key};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Opens with no matching close line are expired after this long.
const SEGMENT_OPEN_TTL: Duration = Duration::from_secs(60);

/// Compiles a pattern known to be valid at build time.
#[allow(clippy::expect_used)]
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static regex pattern")
}

static PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"^(?P<ts>\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}\.\d{3}) \[(?P<level>\w+)\](?: \[(?P<comp>[\w./-]+) @ 0x(?P<addr>[0-9a-fA-F]+)\])? (?P<msg>.*)$",
    )
});

static OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^Opening '(?P<url>[^']+)' for reading"));

static CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^Statistics: (?P<bytes>\d+) bytes read"));

static TCP_ATTEMPT_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^Starting new connection: (?P<host>.+):(?P<port>\d+)$"));

static TCP_CONNECTED_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^Connected to (?P<host>.+):(?P<port>\d+)$"));

static TCP_FAILED_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"^Connection (?P<reason>refused|timed out|reset by peer|reset)(?: while connecting)? to (?P<host>.+):(?P<port>\d+)$",
    )
});

static HTTP_ERROR_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^HTTP error (?P<code>[45]\d{2})"));

static RECONNECT_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"(?i)^will reconnect"));

/// Receives parser output. Implementations must not block: if the
/// downstream cannot accept an event promptly, the implementation drops it
/// and accounts for the drop itself.
pub trait DebugSink {
    /// Handles one recognised event.
    fn on_event(&mut self, event: DebugEvent);

    /// Called once per input line, before parsing.
    fn on_line(&mut self) {}

    /// Called for lines that do not carry the expected timestamp prefix.
    fn on_parse_error(&mut self) {}
}

struct PendingOpen {
    url: String,
    opened_at: NaiveDateTime,
}

/// Line-oriented classifier for fetcher stderr.
pub struct DebugParser<S> {
    sink: S,
    /// In-flight segment opens keyed by I/O context address.
    pending: HashMap<u64, PendingOpen>,
    /// Last media sequence seen, keyed by variant (URL stem).
    last_seq: HashMap<String, u64>,
}

impl<S: DebugSink> DebugParser<S> {
    /// Creates a parser feeding the given sink.
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            pending: HashMap::new(),
            last_seq: HashMap::new(),
        }
    }

    /// Drains the stream until EOF. Only I/O errors fail the task; any line
    /// the classifier does not recognise is dropped and counted.
    pub async fn run<R: AsyncRead + Unpin>(mut self, reader: R) -> Result<S, Error> {
        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            self.parse_line(&line);
        }
        Ok(self.sink)
    }

    /// Parses one stderr line.
    pub fn parse_line(&mut self, line: &str) {
        self.sink.on_line();

        let Some(prefix) = PREFIX_RE.captures(line) else {
            tracing::debug!(line, "unparseable stderr line");
            self.sink.on_parse_error();
            return;
        };
        let Some(ts) = prefix
            .name("ts")
            .and_then(|m| NaiveDateTime::parse_from_str(m.as_str(), "%Y-%m-%d %H:%M:%S%.3f").ok())
        else {
            self.sink.on_parse_error();
            return;
        };
        let addr = prefix
            .name("addr")
            .and_then(|m| u64::from_str_radix(m.as_str(), 16).ok());
        let msg = prefix.name("msg").map_or("", |m| m.as_str());

        self.expire_stale_opens(ts);
        self.classify(msg, addr, ts);
    }

    fn classify(&mut self, msg: &str, addr: Option<u64>, ts: NaiveDateTime) {
        if let Some(c) = OPEN_RE.captures(msg) {
            let url = c["url"].to_owned();
            self.on_open(url, addr, ts);
        } else if let Some(c) = CLOSE_RE.captures(msg) {
            let bytes_read = c["bytes"].parse().unwrap_or(0);
            self.on_close(bytes_read, addr, ts);
        } else if let Some(c) = TCP_ATTEMPT_RE.captures(msg) {
            self.sink.on_event(DebugEvent::TcpConnectAttempt {
                host: c["host"].to_owned(),
                port: c["port"].parse().unwrap_or(0),
                ts,
            });
        } else if let Some(c) = TCP_CONNECTED_RE.captures(msg) {
            self.sink.on_event(DebugEvent::TcpConnected {
                host: c["host"].to_owned(),
                port: c["port"].parse().unwrap_or(0),
                ts,
            });
        } else if let Some(c) = TCP_FAILED_RE.captures(msg) {
            self.sink.on_event(DebugEvent::TcpFailed {
                host: c["host"].to_owned(),
                port: c["port"].parse().unwrap_or(0),
                reason: c["reason"].to_owned(),
                ts,
            });
        } else if let Some(c) = HTTP_ERROR_RE.captures(msg) {
            let url = addr
                .and_then(|a| self.pending.get(&a))
                .map(|p| p.url.clone());
            self.sink.on_event(DebugEvent::HttpError {
                code: c["code"].parse().unwrap_or(0),
                url,
                ts,
            });
        } else if RECONNECT_RE.is_match(msg) {
            self.sink.on_event(DebugEvent::Reconnect { ts });
        } else if msg.contains("timed out") {
            self.sink.on_event(DebugEvent::Timeout { ts });
        }
        // Everything else is ordinary log chatter, not a parse failure.
    }

    fn on_open(&mut self, url: String, addr: Option<u64>, ts: NaiveDateTime) {
        let kind = UrlKind::classify(&url);
        self.sink.on_event(DebugEvent::HlsRequest {
            url: url.clone(),
            kind,
            ts,
        });

        match kind {
            UrlKind::Manifest => {
                self.sink.on_event(DebugEvent::PlaylistOpen { url, ts });
            }
            UrlKind::Segment => {
                self.track_sequence(&url, ts);
                self.sink.on_event(DebugEvent::SegmentOpen {
                    url: url.clone(),
                    ts,
                });
                if let Some(addr) = addr {
                    let _ = self.pending.insert(addr, PendingOpen { url, opened_at: ts });
                }
            }
            UrlKind::Init | UrlKind::Unknown => {}
        }
    }

    fn on_close(&mut self, bytes_read: u64, addr: Option<u64>, ts: NaiveDateTime) {
        let Some(open) = addr.and_then(|a| self.pending.remove(&a)) else {
            return;
        };
        let wall_time = (ts - open.opened_at).to_std().unwrap_or(Duration::ZERO);
        self.sink.on_event(DebugEvent::SegmentClose {
            url: open.url,
            bytes_read,
            wall_time,
            ts,
        });
    }

    fn track_sequence(&mut self, url: &str, ts: NaiveDateTime) {
        let Some(got) = sequence_number(url) else {
            return;
        };
        let variant = variant_key(url).to_owned();
        if let Some(&last) = self.last_seq.get(&variant) {
            if got != last && got != last.wrapping_add(1) {
                self.sink.on_event(DebugEvent::SequenceSkip {
                    expected: last.wrapping_add(1),
                    got,
                    ts,
                });
            }
        }
        let _ = self.last_seq.insert(variant, got);
    }

    fn expire_stale_opens(&mut self, now: NaiveDateTime) {
        if self.pending.is_empty() {
            return;
        }
        let expired: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, open)| {
                (now - open.opened_at)
                    .to_std()
                    .is_ok_and(|age| age > SEGMENT_OPEN_TTL)
            })
            .map(|(addr, _)| *addr)
            .collect();
        for addr in expired {
            if let Some(open) = self.pending.remove(&addr) {
                self.sink
                    .on_event(DebugEvent::SegmentExpired { url: open.url, ts: now });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Capture {
        events: Vec<DebugEvent>,
        lines: u64,
        parse_errors: u64,
    }

    impl DebugSink for Capture {
        fn on_event(&mut self, event: DebugEvent) {
            self.events.push(event);
        }

        fn on_line(&mut self) {
            self.lines += 1;
        }

        fn on_parse_error(&mut self) {
            self.parse_errors += 1;
        }
    }

    fn parse(lines: &[&str]) -> Capture {
        let mut parser = DebugParser::new(Capture::default());
        for line in lines {
            parser.parse_line(line);
        }
        parser.sink
    }

    #[test]
    fn test_playlist_open_at_any_level() {
        for level in ["debug", "verbose", "info"] {
            let capture = parse(&[&format!(
                "2026-03-01 12:00:00.000 [{level}] [hls @ 0xaa] Opening 'http://o/live.m3u8' for reading"
            )]);
            assert!(
                capture
                    .events
                    .iter()
                    .any(|e| matches!(e, DebugEvent::PlaylistOpen { .. })),
                "no playlist open at level {level}"
            );
        }
    }

    #[test]
    fn test_segment_open_close_wall_time() {
        let capture = parse(&[
            "2026-03-01 12:00:00.000 [debug] [https @ 0xbeef] Opening 'http://o/seg00042.ts' for reading",
            "2026-03-01 12:00:00.350 [debug] [https @ 0xbeef] Statistics: 188000 bytes read, 0 seeks",
        ]);

        let close = capture
            .events
            .iter()
            .find_map(|e| match e {
                DebugEvent::SegmentClose {
                    url,
                    bytes_read,
                    wall_time,
                    ..
                } => Some((url.clone(), *bytes_read, *wall_time)),
                _ => None,
            })
            .expect("no close event");
        assert_eq!(close.0, "http://o/seg00042.ts");
        assert_eq!(close.1, 188_000);
        assert_eq!(close.2, Duration::from_millis(350));
    }

    #[test]
    fn test_close_without_open_is_ignored() {
        let capture =
            parse(&["2026-03-01 12:00:00.000 [debug] [https @ 0x1] Statistics: 42 bytes read"]);
        assert!(capture.events.is_empty());
    }

    #[test]
    fn test_sequence_skip_scenario() {
        let lines: Vec<String> = [42u64, 43, 44, 47, 48]
            .iter()
            .map(|n| {
                format!(
                    "2026-03-01 12:00:0{}.000 [debug] [hls @ 0xaa] Opening 'http://o/seg000{n}.ts' for reading",
                    n % 10
                )
            })
            .collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let capture = parse(&refs);

        let skips: Vec<_> = capture
            .events
            .iter()
            .filter_map(|e| match e {
                DebugEvent::SequenceSkip { expected, got, .. } => Some((*expected, *got)),
                _ => None,
            })
            .collect();
        assert_eq!(skips, vec![(45, 47)]);
    }

    #[test]
    fn test_sequence_tracking_is_per_variant() {
        // Two renditions interleave; neither should trip the other's
        // tracker.
        let capture = parse(&[
            "2026-03-01 12:00:00.000 [debug] [hls @ 0xaa] Opening 'http://o/low/seg10.ts' for reading",
            "2026-03-01 12:00:01.000 [debug] [hls @ 0xbb] Opening 'http://o/high/seg500.ts' for reading",
            "2026-03-01 12:00:02.000 [debug] [hls @ 0xaa] Opening 'http://o/low/seg11.ts' for reading",
            "2026-03-01 12:00:03.000 [debug] [hls @ 0xbb] Opening 'http://o/high/seg501.ts' for reading",
        ]);
        assert!(
            !capture
                .events
                .iter()
                .any(|e| matches!(e, DebugEvent::SequenceSkip { .. }))
        );
    }

    #[test]
    fn test_duplicate_sequence_is_not_a_skip() {
        let mut parser = DebugParser::new(Capture::default());
        for n in [7u64, 7, 8] {
            parser.parse_line(&format!(
                "2026-03-01 12:00:00.000 [debug] [hls @ 0xaa] Opening 'http://o/seg{n}.ts' for reading"
            ));
        }
        assert!(
            !parser
                .sink
                .events
                .iter()
                .any(|e| matches!(e, DebugEvent::SequenceSkip { .. }))
        );
    }

    #[test]
    fn test_tcp_lifecycle() {
        let capture = parse(&[
            "2026-03-01 12:00:00.000 [verbose] [tcp @ 0x1] Starting new connection: origin.test:8080",
            "2026-03-01 12:00:00.020 [verbose] [tcp @ 0x1] Connected to origin.test:8080",
            "2026-03-01 12:00:05.000 [error] [tcp @ 0x2] Connection refused to origin.test:8080",
        ]);

        assert!(matches!(
            &capture.events[0],
            DebugEvent::TcpConnectAttempt { host, port: 8080, .. } if host == "origin.test"
        ));
        assert!(matches!(
            &capture.events[1],
            DebugEvent::TcpConnected { port: 8080, .. }
        ));
        assert!(matches!(
            &capture.events[2],
            DebugEvent::TcpFailed { reason, .. } if reason == "refused"
        ));
    }

    #[test]
    fn test_http_error_carries_context_url() {
        let capture = parse(&[
            "2026-03-01 12:00:00.000 [debug] [https @ 0xcc] Opening 'http://o/seg9.ts' for reading",
            "2026-03-01 12:00:00.100 [error] [https @ 0xcc] HTTP error 404 Not Found",
        ]);

        let err = capture
            .events
            .iter()
            .find_map(|e| match e {
                DebugEvent::HttpError { code, url, .. } => Some((*code, url.clone())),
                _ => None,
            })
            .expect("no http error event");
        assert_eq!(err.0, 404);
        assert_eq!(err.1.as_deref(), Some("http://o/seg9.ts"));
    }

    #[test]
    fn test_stale_open_expires() {
        let capture = parse(&[
            "2026-03-01 12:00:00.000 [debug] [https @ 0xdd] Opening 'http://o/seg1.ts' for reading",
            "2026-03-01 12:02:00.000 [debug] [hls @ 0xaa] Opening 'http://o/live.m3u8' for reading",
        ]);

        assert!(
            capture
                .events
                .iter()
                .any(|e| matches!(e, DebugEvent::SegmentExpired { url, .. } if url == "http://o/seg1.ts"))
        );
    }

    #[test]
    fn test_reconnect_and_timeout() {
        let capture = parse(&[
            "2026-03-01 12:00:00.000 [warning] [https @ 0x1] Will reconnect at 188000 in 1 second(s)",
            "2026-03-01 12:00:10.000 [error] [https @ 0x1] Operation timed out",
        ]);
        assert!(matches!(capture.events[0], DebugEvent::Reconnect { .. }));
        assert!(matches!(capture.events[1], DebugEvent::Timeout { .. }));
    }

    #[test]
    fn test_unprefixed_line_counts_as_parse_error() {
        let capture = parse(&["no timestamp here", "  [hls] partial"]);
        assert_eq!(capture.parse_errors, 2);
        assert_eq!(capture.lines, 2);
        assert!(capture.events.is_empty());
    }

    #[test]
    fn test_request_kinds() {
        let capture = parse(&[
            "2026-03-01 12:00:00.000 [debug] [hls @ 0x1] Opening 'http://o/init.mp4' for reading",
            "2026-03-01 12:00:00.000 [debug] [hls @ 0x1] Opening 'http://o/other.bin' for reading",
        ]);
        let kinds: Vec<_> = capture
            .events
            .iter()
            .filter_map(|e| match e {
                DebugEvent::HlsRequest { kind, .. } => Some(*kind),
                _ => None,
            })
            .collect();
        assert_eq!(kinds, vec![UrlKind::Init, UrlKind::Unknown]);
    }
}
