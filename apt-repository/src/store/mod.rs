// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Remote object storage.

The repository lives entirely in a bucket of a remote object store.
[ObjectStore] abstracts the handful of operations publishing needs so
the rest of the crate never sees a concrete backend. [S3Store] talks
the S3 wire protocol and also covers S3 compatible services addressed
by custom endpoint, which is how Aliyun OSS is supported. [MemoryStore]
backs tests.
*/

use {
    crate::error::{RepoError, Result},
    async_trait::async_trait,
    std::{str::FromStr, sync::Arc},
};

pub mod memory;
#[cfg(feature = "s3")]
pub mod s3;

pub use memory::MemoryStore;
#[cfg(feature = "s3")]
pub use s3::S3Store;

/// Key-value operations against a remote object store.
///
/// Keys are bucket relative paths like `dists/focal/Release`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write an object, replacing any existing content.
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()>;

    /// Read an object. Returns `None` if the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Whether an object exists.
    async fn head(&self, key: &str) -> Result<bool>;

    /// Delete an object. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Server side copy of an object to another key.
    async fn copy(&self, source_key: &str, dest_key: &str) -> Result<()>;
}

/// Supported storage backend families.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StoreBackend {
    /// AWS S3 or any service speaking its protocol.
    S3,
    /// Aliyun OSS, addressed through its S3 compatible endpoint.
    Oss,
}

impl FromStr for StoreBackend {
    type Err = RepoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "s3" | "aws" => Ok(Self::S3),
            "oss" | "aliyun" => Ok(Self::Oss),
            other => Err(RepoError::UnsupportedBackend(other.to_string())),
        }
    }
}

/// Connection settings for constructing a store.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub key_prefix: Option<String>,
}

/// Construct an [ObjectStore] for a backend configuration.
#[cfg(feature = "s3")]
pub fn new_object_store(config: &StoreConfig) -> Result<Arc<dyn ObjectStore>> {
    match config.backend {
        // OSS exposes an S3 compatible API, so both families share a
        // client and differ only in the endpoint they are pointed at.
        StoreBackend::S3 | StoreBackend::Oss => Ok(Arc::new(S3Store::new(config)?)),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn backend_from_str() {
        assert_eq!("s3".parse::<StoreBackend>().unwrap(), StoreBackend::S3);
        assert_eq!("AWS".parse::<StoreBackend>().unwrap(), StoreBackend::S3);
        assert_eq!("oss".parse::<StoreBackend>().unwrap(), StoreBackend::Oss);
        assert_eq!("aliyun".parse::<StoreBackend>().unwrap(), StoreBackend::Oss);

        assert!(matches!(
            "gcs".parse::<StoreBackend>().unwrap_err(),
            RepoError::UnsupportedBackend(_)
        ));
    }
}
