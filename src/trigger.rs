//! Defines a _trigger_, the input for the synchronization of a single
//! user. The trigger is built from an S3 event record.

use crate::key::KeyPattern;
use aws_lambda_events::event::s3::S3EventRecord;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

/// A write to a user record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    /// The bucket holding the user record.
    pub bucket: String,

    /// The key of the user record, decoded.
    pub key: String,

    /// The user id, as extracted from the key.
    pub user_id: String,

    /// The S3 event name, e.g. `ObjectCreated:Put`. Absent when the
    /// sync wasn't caused by an event.
    pub event_name: Option<String>,

    /// The time at which the write happened, if known.
    pub event_time: Option<DateTime<Utc>>,
}

impl Trigger {
    /// Builds a trigger from an S3 event record, if the record's key
    /// is that of a user record.
    #[instrument(skip(record, user_key), fields(key = ?record.s3.object.key))]
    pub fn from_record(record: &S3EventRecord, user_key: &KeyPattern) -> Option<Self> {
        let bucket = record.s3.bucket.name.as_ref()?;
        let key = match decode_key(record.s3.object.key.as_ref()?) {
            Some(key) => key,
            None => {
                warn!("Key isn't valid URL-encoded UTF-8; ignored");
                return None;
            }
        };
        let Some(user_id) = user_key.user_id(&key).map(String::from) else {
            debug!("Key doesn't hold a user record; ignored");
            return None;
        };
        Some(Trigger {
            bucket: bucket.clone(),
            key,
            user_id,
            event_name: record.event_name.clone(),
            event_time: Some(record.event_time),
        })
    }
}

/// Decode an object key as found in S3 notifications, which encode
/// spaces as `+` and everything else as `%XX`.
fn decode_key(key: &str) -> Option<String> {
    urlencoding::decode(&key.replace('+', " "))
        .ok()
        .map(|decoded| decoded.into_owned())
}
