// Copyright The HLS Swarm Authors
// SPDX-License-Identifier: Apache-2.0

//! Throughput of the stderr line classifiers. The parser sits on every
//! child's stderr, so per-line cost bounds how many clients one host can
//! observe.

use criterion::{Criterion, criterion_group, criterion_main};
use hls_swarm_parser::{DebugEvent, DebugParser, DebugSink};

struct Count(u64);

impl DebugSink for Count {
    fn on_event(&mut self, _event: DebugEvent) {
        self.0 += 1;
    }
}

fn typical_stderr(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| match i % 5 {
            0 => format!(
                "2026-03-01 12:00:{:02}.{:03} [debug] [hls @ 0xaa] Opening 'http://origin/seg{:05}.ts' for reading",
                (i / 1000) % 60,
                i % 1000,
                i
            ),
            1 => format!(
                "2026-03-01 12:00:{:02}.{:03} [debug] [https @ 0xaa] Statistics: {} bytes read, 0 seeks",
                (i / 1000) % 60,
                i % 1000,
                i * 188
            ),
            2 => "2026-03-01 12:00:00.000 [verbose] [tcp @ 0xbb] Starting new connection: origin.test:8080"
                .to_owned(),
            3 => "2026-03-01 12:00:00.000 [debug] [hls @ 0xcc] Opening 'http://origin/live.m3u8' for reading"
                .to_owned(),
            _ => "2026-03-01 12:00:00.000 [trace] [hls @ 0xcc] ordinary log chatter with no event"
                .to_owned(),
        })
        .collect()
}

fn bench_classify(c: &mut Criterion) {
    let lines = typical_stderr(1_000);
    let _ = c.bench_function("classify_1k_lines", |b| {
        b.iter(|| {
            let mut parser = DebugParser::new(Count(0));
            for line in &lines {
                parser.parse_line(line);
            }
        });
    });
}

criterion_group!(benches, bench_classify);
criterion_main!(benches);
