//! Object store gateway.
//!
//! Wraps any [`object_store::ObjectStore`] so the pipeline can be pointed at an
//! S3-compatible bucket in production and an in-memory store in tests.
//! Core operations (listing, downloading) return errors; housekeeping
//! operations log and report failure as `false` / `None`.

use anyhow::{Context, Result};
use futures::TryStreamExt;
use object_store::{
    aws::AmazonS3Builder, path::Path as ObjectPath, signer::Signer, ObjectMeta, ObjectStore,
    PutPayload,
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::{fs, io::AsyncWriteExt};
use tracing::{error, info, instrument};

use crate::{config::S3Config, history::PARTIAL_SUFFIX};

pub struct ObjectStoreClient {
    bucket: String,
    store: Arc<dyn ObjectStore>,
    signer: Option<Arc<dyn Signer>>,
}

impl ObjectStoreClient {
    /// Wrap an existing store. Presigned URLs are unavailable.
    pub fn new(bucket: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            bucket: bucket.into(),
            store,
            signer: None,
        }
    }

    /// Connect to an S3-compatible endpoint using path-style addressing.
    pub fn s3(cfg: &S3Config, bucket: &str) -> Result<Self> {
        let s3 = AmazonS3Builder::new()
            .with_access_key_id(&cfg.access_key_id)
            .with_secret_access_key(&cfg.secret_access_key)
            .with_endpoint(&cfg.endpoint_url)
            .with_region(&cfg.region)
            .with_bucket_name(bucket)
            .with_virtual_hosted_style_request(false)
            .with_allow_http(cfg.endpoint_url.starts_with("http://"))
            .build()
            .with_context(|| format!("building S3 client for bucket {}", bucket))?;
        let s3 = Arc::new(s3);
        Ok(Self {
            bucket: bucket.to_string(),
            store: s3.clone(),
            signer: Some(s3),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Keys of every object in the bucket.
    #[instrument(level = "debug", skip(self), fields(bucket = %self.bucket))]
    pub async fn list_objects(&self) -> Result<Vec<String>> {
        let metas: Vec<ObjectMeta> = self
            .store
            .list(None)
            .try_collect()
            .await
            .with_context(|| format!("listing objects in {}", self.bucket))?;
        Ok(metas.into_iter().map(|m| m.location.to_string()).collect())
    }

    /// Stream `key` into `target`. Bytes land in a sibling `.part` file that is
    /// renamed on success and removed on failure, so `target` only ever
    /// appears complete.
    #[instrument(level = "debug", skip(self, target), fields(bucket = %self.bucket, target = %target.display()))]
    pub async fn download_object(&self, key: &str, target: &Path) -> Result<u64> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        let partial = partial_path(target);

        let written = match self.stream_to(key, &partial).await {
            Ok(n) => n,
            Err(e) => {
                let _ = fs::remove_file(&partial).await;
                return Err(e);
            }
        };
        fs::rename(&partial, target)
            .await
            .with_context(|| format!("moving download into {}", target.display()))?;
        Ok(written)
    }

    async fn stream_to(&self, key: &str, dest: &Path) -> Result<u64> {
        let location = object_path(key)?;
        let result = self
            .store
            .get(&location)
            .await
            .with_context(|| format!("GET {}/{}", self.bucket, key))?;
        let mut stream = result.into_stream();
        let mut file = fs::File::create(dest)
            .await
            .with_context(|| format!("creating {}", dest.display()))?;
        let mut written = 0u64;
        while let Some(chunk) = stream
            .try_next()
            .await
            .with_context(|| format!("reading body of {}/{}", self.bucket, key))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }

    pub async fn object_metadata(&self, key: &str) -> Option<ObjectMeta> {
        let location = self.location(key)?;
        match self.store.head(&location).await {
            Ok(meta) => Some(meta),
            Err(e) => {
                error!(bucket = %self.bucket, key, error = %e, "failed to get object metadata");
                None
            }
        }
    }

    pub async fn create_object(&self, key: &str, content: &str) -> bool {
        let Some(location) = self.location(key) else {
            return false;
        };
        let payload = PutPayload::from(content.as_bytes().to_vec());
        match self.store.put(&location, payload).await {
            Ok(_) => true,
            Err(e) => {
                error!(bucket = %self.bucket, key, error = %e, "failed to create object");
                false
            }
        }
    }

    /// Upload a local file as `<prefix><file name>`.
    pub async fn upload_file(&self, path: &Path, prefix: &str) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            error!(file = %path.display(), "upload path has no file name");
            return false;
        };
        let key = format!("{}{}", prefix, name);
        let Some(location) = self.location(&key) else {
            return false;
        };
        let bytes = match fs::read(path).await {
            Ok(b) => b,
            Err(e) => {
                error!(file = %path.display(), error = %e, "failed to read upload source");
                return false;
            }
        };
        match self.store.put(&location, bytes.into()).await {
            Ok(_) => {
                info!(bucket = %self.bucket, key = %key, "uploaded");
                true
            }
            Err(e) => {
                error!(bucket = %self.bucket, file = %path.display(), error = %e, "failed to upload file");
                false
            }
        }
    }

    pub async fn copy_object(&self, from: &str, to: &str) -> bool {
        let (Some(src), Some(dst)) = (self.location(from), self.location(to)) else {
            return false;
        };
        match self.store.copy(&src, &dst).await {
            Ok(()) => true,
            Err(e) => {
                error!(bucket = %self.bucket, from, to, error = %e, "failed to copy object");
                false
            }
        }
    }

    pub async fn delete_object(&self, key: &str) -> bool {
        let Some(location) = self.location(key) else {
            return false;
        };
        match self.store.delete(&location).await {
            Ok(()) => true,
            Err(e) => {
                error!(bucket = %self.bucket, key, error = %e, "failed to delete object");
                false
            }
        }
    }

    /// Presigned GET URL, valid for `expires_in`. `None` without a signer.
    pub async fn presigned_url(&self, key: &str, expires_in: Duration) -> Option<String> {
        let signer = self.signer.as_ref()?;
        let location = self.location(key)?;
        match signer
            .signed_url(reqwest::Method::GET, &location, expires_in)
            .await
        {
            Ok(url) => Some(url.to_string()),
            Err(e) => {
                error!(bucket = %self.bucket, key, error = %e, "failed to presign object");
                None
            }
        }
    }

    /// [`object_path`] for the boolean/optional operations: logs and drops the error.
    fn location(&self, key: &str) -> Option<ObjectPath> {
        match ObjectPath::parse(key) {
            Ok(location) => Some(location),
            Err(e) => {
                error!(bucket = %self.bucket, key, error = %e, "invalid object key");
                None
            }
        }
    }
}

/// Keys are taken exactly as listed, never re-encoded.
fn object_path(key: &str) -> Result<ObjectPath> {
    ObjectPath::parse(key).with_context(|| format!("invalid object key {}", key))
}

fn partial_path(target: &Path) -> PathBuf {
    let mut s = target.as_os_str().to_owned();
    s.push(PARTIAL_SUFFIX);
    PathBuf::from(s)
}
