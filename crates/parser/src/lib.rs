// Copyright The HLS Swarm Authors
// SPDX-License-Identifier: Apache-2.0

//! Line-oriented ingestion of fetcher output.
//!
//! Two independent pipelines:
//! - [`progress::ProgressReader`] consumes `key=value` blocks from the
//!   child's dedicated progress file descriptor and emits one
//!   [`event::ProgressUpdate`] per block,
//! - [`debug::DebugParser`] classifies timestamped stderr log lines into
//!   [`event::DebugEvent`]s.
//!
//! Both pipelines are lossy by design: sinks must never block, and anything
//! a sink cannot accept promptly is dropped and counted downstream rather
//! than stalling the child's pipes.

pub mod debug;
pub mod error;
pub mod event;
pub mod progress;

pub use debug::{DebugParser, DebugSink};
pub use error::Error;
pub use event::{DebugEvent, ProgressState, ProgressUpdate};
pub use progress::{ProgressReader, ProgressSink};
