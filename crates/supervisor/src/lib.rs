// Copyright The HLS Swarm Authors
// SPDX-License-Identifier: Apache-2.0

//! Child supervision and fleet management.
//!
//! A [`manager::ClientManager`] owns one [`supervisor::Supervisor`] task per
//! client slot. Each supervisor spawns the external fetcher, wires its
//! stderr and progress descriptor into the parsers, applies parsed output
//! to the slot's stats, and restarts the child with capped exponential
//! backoff. A single root cancellation token shuts the whole fleet down.

pub mod child;
pub mod error;
pub mod manager;
pub mod observer;
pub mod supervisor;

pub use child::{CommandBuilder, FetcherCommand};
pub use error::Error;
pub use manager::ClientManager;
pub use observer::{ClientState, NullObserver, SwarmObserver};
pub use supervisor::Supervisor;
