// Copyright The MemoryMq Authors
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

/// Errors produced while loading or validating a broker configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read broker configuration `{path}`: {source}")]
    Io {
        /// Path of the file that failed to load.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The configuration document is not valid YAML for this schema.
    #[error("failed to parse broker configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    /// The configuration parsed but violates one or more constraints.
    #[error("invalid broker configuration: {}", errors.join("; "))]
    Validation {
        /// Every violated constraint, prefixed with its field path.
        errors: Vec<String>,
    },
}
