//! Object storage gateway.
//!
//! The application never moves object bytes itself: clients PUT and GET
//! directly against short-lived presigned URLs, and the service only issues
//! those URLs plus best-effort delete/existence checks. Head checks report a
//! three-state outcome; reconciliation acts only on a confirmed "absent",
//! never on an inconclusive signal.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::presigning::PresigningConfig;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectExistence {
    Present,
    /// The store positively confirmed the object does not exist.
    Absent,
    /// The check failed for some other reason (throttling, permissions).
    /// Callers treat this as "assume it exists".
    Unknown,
}

#[derive(Debug, Error)]
pub enum ObjectError {
    #[error("object store call failed: {0}")]
    Upstream(String),
}

pub type ObjectResult<T> = Result<T, ObjectError>;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Presigned URL allowing one client-direct PUT of `key`.
    async fn presign_put(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        expires: Duration,
    ) -> ObjectResult<String>;

    /// Presigned URL allowing one client-direct GET. With
    /// `response_filename`, the response carries an attachment
    /// content-disposition under that name.
    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        response_filename: Option<&str>,
        expires: Duration,
    ) -> ObjectResult<String>;

    /// Existence check. Never fails: an inconclusive probe is reported as
    /// [`ObjectExistence::Unknown`], with the cause logged by the
    /// implementation.
    async fn head(&self, bucket: &str, key: &str) -> ObjectExistence;

    /// Delete `key`. Deleting an already-absent object is not an error.
    async fn delete(&self, bucket: &str, key: &str) -> ObjectResult<()>;
}

// ---------------------------------------------------------------------------
// S3 implementation
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn presign_put(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        expires: Duration,
    ) -> ObjectResult<String> {
        let config = PresigningConfig::expires_in(expires)
            .map_err(|err| ObjectError::Upstream(format!("presigning config: {err}")))?;
        let presigned = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .presigned(config)
            .await
            .map_err(|err| ObjectError::Upstream(format!("presign PutObject: {err}")))?;
        Ok(presigned.uri().to_string())
    }

    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        response_filename: Option<&str>,
        expires: Duration,
    ) -> ObjectResult<String> {
        let config = PresigningConfig::expires_in(expires)
            .map_err(|err| ObjectError::Upstream(format!("presigning config: {err}")))?;
        let mut request = self.client.get_object().bucket(bucket).key(key);
        if let Some(filename) = response_filename {
            // Quotes inside the filename would break the disposition header;
            // sanitized filenames cannot contain them, but strip defensively
            // since this value reaches a header verbatim.
            let safe = filename.replace('"', "");
            request =
                request.response_content_disposition(format!("attachment; filename=\"{safe}\""));
        }
        let presigned = request
            .presigned(config)
            .await
            .map_err(|err| ObjectError::Upstream(format!("presign GetObject: {err}")))?;
        Ok(presigned.uri().to_string())
    }

    async fn head(&self, bucket: &str, key: &str) -> ObjectExistence {
        match self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => ObjectExistence::Present,
            Err(SdkError::ServiceError(service_err)) if service_err.err().is_not_found() => {
                ObjectExistence::Absent
            }
            Err(err) => {
                warn!(bucket, key, error = %err, "HeadObject inconclusive");
                ObjectExistence::Unknown
            }
        }
    }

    async fn delete(&self, bucket: &str, key: &str) -> ObjectResult<()> {
        // S3 DeleteObject succeeds for keys that no longer exist, which is
        // exactly the idempotency the cascade paths rely on.
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| ObjectError::Upstream(format!("DeleteObject: {err}")))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// Object store double for tests and local development. Tracks keys only
/// (payloads never transit the application) and lets tests inject
/// inconclusive head checks and failing deletes.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashSet<(String, String)>>,
    head_unknown: Mutex<HashSet<(String, String)>>,
    delete_failing: Mutex<HashSet<(String, String)>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `key` as uploaded, as if a client had used its presigned URL.
    pub fn put_object(&self, bucket: &str, key: &str) {
        self.objects
            .lock()
            .expect("objects lock")
            .insert((bucket.to_string(), key.to_string()));
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .lock()
            .expect("objects lock")
            .contains(&(bucket.to_string(), key.to_string()))
    }

    /// Make head checks for `key` report [`ObjectExistence::Unknown`].
    pub fn make_head_inconclusive(&self, bucket: &str, key: &str) {
        self.head_unknown
            .lock()
            .expect("head lock")
            .insert((bucket.to_string(), key.to_string()));
    }

    /// Make deletes of `key` fail.
    pub fn make_delete_fail(&self, bucket: &str, key: &str) {
        self.delete_failing
            .lock()
            .expect("delete lock")
            .insert((bucket.to_string(), key.to_string()));
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn presign_put(
        &self,
        bucket: &str,
        key: &str,
        _content_type: &str,
        expires: Duration,
    ) -> ObjectResult<String> {
        Ok(format!(
            "https://{bucket}.objects.invalid/{key}?method=put&expires={}",
            expires.as_secs()
        ))
    }

    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        response_filename: Option<&str>,
        expires: Duration,
    ) -> ObjectResult<String> {
        let disposition = match response_filename {
            Some(name) => format!("&attachment={name}"),
            None => String::new(),
        };
        Ok(format!(
            "https://{bucket}.objects.invalid/{key}?method=get&expires={}{disposition}",
            expires.as_secs()
        ))
    }

    async fn head(&self, bucket: &str, key: &str) -> ObjectExistence {
        let probe = (bucket.to_string(), key.to_string());
        if self.head_unknown.lock().expect("head lock").contains(&probe) {
            return ObjectExistence::Unknown;
        }
        if self.objects.lock().expect("objects lock").contains(&probe) {
            ObjectExistence::Present
        } else {
            ObjectExistence::Absent
        }
    }

    async fn delete(&self, bucket: &str, key: &str) -> ObjectResult<()> {
        let probe = (bucket.to_string(), key.to_string());
        if self
            .delete_failing
            .lock()
            .expect("delete lock")
            .contains(&probe)
        {
            return Err(ObjectError::Upstream("injected delete failure".into()));
        }
        self.objects.lock().expect("objects lock").remove(&probe);
        Ok(())
    }
}
