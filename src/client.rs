//! Defines the global S3 client, and the S3-backed profile store.

use crate::conf::aws_service_config;
use crate::key::KeyPattern;
use crate::profile::UserRecord;
use crate::store::ProfileStore;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use once_cell::sync::OnceCell;

/// Whether a failed download means the object doesn't exist.
fn is_missing_object<R>(error: &SdkError<GetObjectError, R>) -> bool {
    matches!(error, SdkError::ServiceError(e) if e.err().is_no_such_key())
}

/// Downloads a user record from storage. Returns `None` if the object
/// doesn't exist, which is the case after the record is deleted.
pub async fn download_record(
    client: &Client,
    bucket: &str,
    key: &str,
) -> Result<Option<UserRecord>> {
    let output = match client.get_object().bucket(bucket).key(key).send().await {
        Ok(output) => output,
        Err(e) if is_missing_object(&e) => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| {
                format!(
                    "Failed to download object {:?} from bucket {:?}",
                    key, bucket
                )
            })
        }
    };
    let body = output.body.collect().await.with_context(|| {
        format!(
            "Failed to read the contents of object {:?} from bucket {:?}",
            key, bucket
        )
    })?;
    let record = UserRecord::from_slice(&body.into_bytes()).with_context(|| {
        format!(
            "Object {:?} from bucket {:?} is not a valid user record",
            key, bucket
        )
    })?;
    Ok(Some(record))
}

/// Uploads a single JSON object to storage.
pub async fn upload_json(client: &Client, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
    client
        .put_object()
        .bucket(bucket)
        .key(key)
        .content_type("application/json")
        .body(ByteStream::from(body))
        .send()
        .await
        .with_context(|| {
            format!(
                "Failed to upload remote object {:?} in bucket {:?}",
                key, bucket
            )
        })?;
    Ok(())
}

/// Deletes a single object from storage. Deleting an object that
/// doesn't exist succeeds.
pub async fn delete(client: &Client, bucket: &str, key: &str) -> Result<()> {
    client
        .delete_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .with_context(|| {
            format!(
                "Failed to delete remote object {:?} in bucket {:?}",
                key, bucket
            )
        })?;
    Ok(())
}

/// Provider profiles kept as JSON objects in an S3 bucket.
pub struct S3ProfileStore<'a> {
    client: &'a Client,
    bucket: &'a str,
    provider_key: &'a KeyPattern,
}

impl<'a> S3ProfileStore<'a> {
    pub fn new(client: &'a Client, bucket: &'a str, provider_key: &'a KeyPattern) -> Self {
        S3ProfileStore {
            client,
            bucket,
            provider_key,
        }
    }

    /// The key holding the profile of a user.
    fn profile_key(&self, user_id: &str) -> String {
        self.provider_key.render(user_id)
    }
}

#[async_trait]
impl ProfileStore for S3ProfileStore<'_> {
    async fn set(&self, user_id: &str, profile: &UserRecord) -> Result<()> {
        let body = serde_json::to_vec(profile.fields())?;
        upload_json(self.client, self.bucket, &self.profile_key(user_id), body).await
    }

    async fn delete(&self, user_id: &str) -> Result<()> {
        delete(self.client, self.bucket, &self.profile_key(user_id)).await
    }
}

/// Global S3 client instance.
static CURRENT: OnceCell<Client> = OnceCell::new();

/// Initialize the global S3 client.
pub async fn init() -> Result<()> {
    let client = Client::new(&aws_service_config().await);
    CURRENT
        .set(client)
        .map_err(|_| anyhow!("client::CURRENT was already initialized"))
}

/// Get the current S3 client instance, or panic if it hasn't been initialized.
pub fn current() -> &'static Client {
    CURRENT.get().expect("client is not initialized")
}
