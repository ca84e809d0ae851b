// Copyright The HLS Swarm Authors
// SPDX-License-Identifier: Apache-2.0

//! Child fetcher process contract.

use crate::error::Error;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

/// How the supervisor constructs and talks to the child fetcher.
///
/// The child receives two output streams: standard error carries timestamped
/// log lines, and one extra writable file descriptor (`progress_fd`) carries
/// `key=value` progress blocks. Network requests identify the client through
/// a `<product>/<version>/client-<id>` user agent.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FetcherConfig {
    /// Program to execute for each client.
    #[serde(default = "default_program")]
    pub program: String,
    /// Extra arguments appended verbatim to the generated command line.
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Playlist URL the fetcher pulls from.
    #[serde(default = "default_origin_url")]
    pub origin_url: String,
    /// File descriptor number the child sees the progress pipe at.
    #[serde(default = "default_progress_fd")]
    pub progress_fd: i32,
    /// Product name used in the per-client user agent.
    #[serde(default = "default_user_agent_product")]
    pub user_agent_product: String,
    /// Log level requested from the fetcher. Playlist opens are only visible
    /// to the parser at `debug` and below; lowering this underreports
    /// manifest counts.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            extra_args: Vec::new(),
            origin_url: default_origin_url(),
            progress_fd: default_progress_fd(),
            user_agent_product: default_user_agent_product(),
            log_level: default_log_level(),
        }
    }
}

fn default_program() -> String {
    "ffmpeg".to_owned()
}

fn default_origin_url() -> String {
    "http://localhost/hls/stream.m3u8".to_owned()
}

const fn default_progress_fd() -> i32 {
    3
}

fn default_user_agent_product() -> String {
    "hls-swarm".to_owned()
}

fn default_log_level() -> String {
    "debug".to_owned()
}

impl FetcherConfig {
    pub(crate) fn validate(&self, errors: &mut Vec<Error>) {
        if self.program.is_empty() {
            errors.push(Error::InvalidField {
                field: "fetcher.program".to_owned(),
                details: "program must not be empty".to_owned(),
            });
        }
        // stdin/stdout/stderr are reserved.
        if self.progress_fd <= 2 {
            errors.push(Error::InvalidField {
                field: "fetcher.progress_fd".to_owned(),
                details: "progress fd must be greater than 2".to_owned(),
            });
        }
        if let Err(e) = Url::parse(&self.origin_url) {
            errors.push(Error::InvalidUrl {
                field: "fetcher.origin_url".to_owned(),
                details: e.to_string(),
            });
        }
    }

    /// The user agent the child presents for a given client id, in the
    /// `<product>/<version>/client-<id>` form.
    pub fn user_agent(&self, client_id: crate::ClientId) -> String {
        format!(
            "{}/{}/client-{}",
            self.user_agent_product,
            env!("CARGO_PKG_VERSION"),
            client_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_form() {
        let config = FetcherConfig::default();
        let ua = config.user_agent(17);
        assert!(ua.starts_with("hls-swarm/"));
        assert!(ua.ends_with("/client-17"));
    }

    #[test]
    fn test_reserved_fd_rejected() {
        let mut config = FetcherConfig::default();
        config.progress_fd = 2;
        let mut errors = Vec::new();
        config.validate(&mut errors);
        assert_eq!(errors.len(), 1);
    }
}
