// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error types for APT repository publishing. */

use {std::time::Duration, thiserror::Error};

/// Primary error type for this crate.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed .deb package: {0}")]
    DebFormat(String),

    #[error("error decoding .deb member: {0}")]
    DebDecode(String),

    #[error("object store error on {path}: {source}")]
    Store {
        path: String,
        source: std::io::Error,
    },

    #[error("timed out waiting for repository lock after {0:?}")]
    LockTimeout(Duration),

    #[error("signing key error: {0}")]
    SigningKey(pgp::errors::Error),

    #[error("unsupported storage backend: {0}")]
    UnsupportedBackend(String),
}

impl RepoError {
    /// Wrap a backend failure for a given object key.
    pub(crate) fn store(path: impl ToString, error: impl std::fmt::Display) -> Self {
        Self::Store {
            path: path.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, error.to_string()),
        }
    }
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, RepoError>;
