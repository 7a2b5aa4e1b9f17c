// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! S3 protocol object store backend. */

use {
    super::{ObjectStore, StoreConfig},
    crate::error::{RepoError, Result},
    async_trait::async_trait,
    rusoto_core::{credential::StaticProvider, ByteStream, HttpClient, Region, RusotoError},
    rusoto_s3::{
        CopyObjectRequest, DeleteObjectRequest, GetObjectError, GetObjectRequest, HeadObjectError,
        HeadObjectRequest, PutObjectRequest, S3Client, S3,
    },
    tokio::io::AsyncReadExt,
};

/// [ObjectStore] implementation over the S3 wire protocol.
pub struct S3Store {
    client: S3Client,
    bucket: String,
    key_prefix: Option<String>,
}

impl S3Store {
    /// Construct a client against a custom endpoint with static
    /// credentials.
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let region = Region::Custom {
            name: config.region.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        };

        let dispatcher =
            HttpClient::new().map_err(|e| RepoError::store(&config.endpoint, e))?;
        let credentials = StaticProvider::new_minimal(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
        );

        Ok(Self {
            client: S3Client::new_with(dispatcher, credentials, region),
            bucket: config.bucket.clone(),
            key_prefix: config
                .key_prefix
                .as_deref()
                .map(|x| x.trim_matches('/').to_string()),
        })
    }

    /// Compute the bucket key for a repository relative path.
    pub fn path_to_key(&self, path: &str) -> String {
        if let Some(prefix) = &self.key_prefix {
            format!("{}/{}", prefix, path.trim_matches('/'))
        } else {
            path.trim_matches('/').to_string()
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        let req = PutObjectRequest {
            bucket: self.bucket.clone(),
            key: self.path_to_key(key),
            content_length: Some(data.len() as i64),
            body: Some(ByteStream::from(data)),
            ..Default::default()
        };

        self.client
            .put_object(req)
            .await
            .map_err(|e| RepoError::store(key, format!("S3 error: {:?}", e)))?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let req = GetObjectRequest {
            bucket: self.bucket.clone(),
            key: self.path_to_key(key),
            ..Default::default()
        };

        match self.client.get_object(req).await {
            Ok(output) => {
                let mut data = vec![];

                if let Some(body) = output.body {
                    let mut reader = body.into_async_read();
                    reader
                        .read_to_end(&mut data)
                        .await
                        .map_err(|e| RepoError::Store {
                            path: key.to_string(),
                            source: e,
                        })?;
                }

                Ok(Some(data))
            }
            Err(RusotoError::Service(GetObjectError::NoSuchKey(_))) => Ok(None),
            Err(RusotoError::Unknown(response)) if response.status.as_u16() == 404 => Ok(None),
            Err(e) => Err(RepoError::store(key, format!("S3 error: {:?}", e))),
        }
    }

    async fn head(&self, key: &str) -> Result<bool> {
        let req = HeadObjectRequest {
            bucket: self.bucket.clone(),
            key: self.path_to_key(key),
            ..Default::default()
        };

        match self.client.head_object(req).await {
            Ok(_) => Ok(true),
            Err(RusotoError::Service(HeadObjectError::NoSuchKey(_))) => Ok(false),
            // HEAD responses carry no error body, so missing keys often
            // surface as a raw 404 instead of a typed NoSuchKey.
            Err(RusotoError::Unknown(response)) if response.status.as_u16() == 404 => Ok(false),
            Err(e) => Err(RepoError::store(key, format!("S3 error: {:?}", e))),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let req = DeleteObjectRequest {
            bucket: self.bucket.clone(),
            key: self.path_to_key(key),
            ..Default::default()
        };

        self.client
            .delete_object(req)
            .await
            .map_err(|e| RepoError::store(key, format!("S3 error: {:?}", e)))?;

        Ok(())
    }

    async fn copy(&self, source_key: &str, dest_key: &str) -> Result<()> {
        let req = CopyObjectRequest {
            bucket: self.bucket.clone(),
            copy_source: format!("{}/{}", self.bucket, self.path_to_key(source_key)),
            key: self.path_to_key(dest_key),
            ..Default::default()
        };

        self.client
            .copy_object(req)
            .await
            .map_err(|e| RepoError::store(dest_key, format!("S3 error: {:?}", e)))?;

        Ok(())
    }
}
