// Copyright The HLS Swarm Authors
// SPDX-License-Identifier: Apache-2.0

//! Child process construction.
//!
//! The supervisor owns two pieces of plumbing per child: a piped stderr for
//! the debug parser, and an anonymous pipe whose write end the child
//! inherits at a fixed descriptor number for the progress stream. Both ends
//! are closed on every exit path, so a dead child always reads as EOF to
//! its parsers.

use crate::error::Error;
use hls_swarm_config::{ClientId, FetcherConfig};
use nix::fcntl::{FcntlArg, OFlag, fcntl};
use std::os::fd::AsRawFd;
use std::process::Stdio;
use tokio::net::unix::pipe;
use tokio::process::{Child, Command};

/// Builds the child command line for one client. Command construction is an
/// external collaborator concern; the supervisor only guarantees the
/// progress-fd wiring, so tests and alternative fetchers plug in here.
pub trait CommandBuilder: Send + Sync {
    /// The program and argument list for one client's child.
    fn build(&self, client_id: ClientId) -> (String, Vec<String>);
}

/// The stock ffmpeg-style command line built from [`FetcherConfig`].
///
/// The child is told to write `key=value` progress blocks to the inherited
/// progress descriptor and timestamped debug logs to stderr, and to
/// identify itself per client through its user agent.
pub struct FetcherCommand {
    config: FetcherConfig,
}

impl FetcherCommand {
    /// Wraps a fetcher configuration.
    #[must_use]
    pub const fn new(config: FetcherConfig) -> Self {
        Self { config }
    }
}

impl CommandBuilder for FetcherCommand {
    fn build(&self, client_id: ClientId) -> (String, Vec<String>) {
        let mut args = vec![
            "-hide_banner".to_owned(),
            "-nostdin".to_owned(),
            "-loglevel".to_owned(),
            format!("level+{}", self.config.log_level),
            "-user_agent".to_owned(),
            self.config.user_agent(client_id),
            "-progress".to_owned(),
            format!("pipe:{}", self.config.progress_fd),
            "-i".to_owned(),
            self.config.origin_url.clone(),
        ];
        args.extend(self.config.extra_args.iter().cloned());
        args.extend(["-f".to_owned(), "null".to_owned(), "-".to_owned()]);
        (self.config.program.clone(), args)
    }
}

/// A spawned child plus the read end of its progress pipe.
pub(crate) struct SpawnedChild {
    pub child: Child,
    pub progress: pipe::Receiver,
}

/// Spawns one child with stderr piped and the progress pipe's write end
/// duplicated onto `progress_fd` in the child.
///
/// The pipe is created close-on-exec so concurrently spawned siblings never
/// inherit each other's write ends; `dup2` in the pre-exec hook clears the
/// flag on the one descriptor the child is meant to keep.
#[allow(unsafe_code)]
pub(crate) fn spawn_child(
    client_id: ClientId,
    program: &str,
    args: &[String],
    progress_fd: i32,
) -> Result<SpawnedChild, Error> {
    let (pipe_read, pipe_write) =
        nix::unistd::pipe2(OFlag::O_CLOEXEC).map_err(|source| Error::Pipe { client_id, source })?;
    let _ = fcntl(&pipe_read, FcntlArg::F_SETFL(OFlag::O_NONBLOCK))
        .map_err(|source| Error::Pipe { client_id, source })?;

    let mut command = Command::new(program);
    let _ = command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let raw_write = pipe_write.as_raw_fd();
    // SAFETY: runs in the forked child before exec; dup2 is
    // async-signal-safe and the captured descriptors outlive the closure
    // because the parent keeps them open until spawn() returns.
    unsafe {
        let _ = command.pre_exec(move || {
            if libc::dup2(raw_write, progress_fd) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let child = command
        .spawn()
        .map_err(|source| Error::Spawn { client_id, source })?;
    // The child holds its duplicate now; closing ours guarantees EOF on the
    // read end once the child is gone.
    drop(pipe_write);

    let progress = pipe::Receiver::from_owned_fd(pipe_read)
        .map_err(|source| Error::PipeRegistration { client_id, source })?;

    Ok(SpawnedChild { child, progress })
}
