// Copyright The HLS Swarm Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors for the config crate.

use miette::Diagnostic;

/// Errors that can occur while loading or validating the swarm configuration.
#[derive(thiserror::Error, Debug, Diagnostic)]
pub enum Error {
    /// A collection of errors that occurred during parsing or validating the configuration.
    #[error("Invalid configuration: {errors:?}")]
    #[diagnostic(code(hls_swarm::invalid_configuration))]
    InvalidConfiguration {
        /// A list of errors that occurred during parsing or validating the configuration.
        #[related]
        errors: Vec<Error>,
    },

    /// An error that occurred while reading a configuration file.
    #[error("File read error for `{path}`: {details}")]
    #[diagnostic(code(hls_swarm::file_read_error))]
    FileReadError {
        /// The path of the file that could not be read.
        path: String,
        /// A description of the error that occurred.
        details: String,
    },

    /// An error that occurred while deserializing a configuration file.
    #[error("{format} deserialization error: {details}")]
    #[diagnostic(code(hls_swarm::deserialization_error))]
    DeserializationError {
        /// The format of the configuration file (e.g. "YAML").
        format: String,
        /// A description of the error that occurred.
        details: String,
    },

    /// A configuration file with an extension this crate does not understand.
    #[error("Unsupported configuration format for `{path}` (expected .yaml, .yml or .json)")]
    #[diagnostic(code(hls_swarm::unsupported_format))]
    UnsupportedFormat {
        /// The path of the offending file.
        path: String,
    },

    /// A field holds a value outside its permitted range.
    #[error("Invalid value for `{field}`: {details}")]
    #[diagnostic(code(hls_swarm::invalid_field))]
    InvalidField {
        /// The dotted path of the offending field.
        field: String,
        /// Why the value is rejected.
        details: String,
    },

    /// A URL field could not be parsed.
    #[error("Invalid URL for `{field}`: {details}")]
    #[diagnostic(code(hls_swarm::invalid_url))]
    InvalidUrl {
        /// The dotted path of the offending field.
        field: String,
        /// The parse failure reported by the URL parser.
        details: String,
    },
}
