//! Defines the read-only application state and hub for utility
//! functions.

use crate::client::{download_record, S3ProfileStore};
use crate::conf::Settings;
use crate::key::KeyPattern;
use crate::store::{on_user_write, SyncOutcome};
use crate::trigger::Trigger;
use anyhow::{anyhow, Context, Result};
use aws_lambda_events::event::s3::S3Event;
use envy::from_env;
use itertools::Itertools;
use once_cell::sync::OnceCell;
use tracing::{info, instrument};

/// An App is an initialized application state, derived from
/// settings. This is only useful to pre-compute stuff that will be
/// used constantly.
#[derive(Debug)]
pub struct App {
    /// The original settings.
    pub settings: Settings,

    /// The pattern of user record keys.
    pub user_key: KeyPattern,

    /// The pattern of provider profile keys.
    pub provider_key: KeyPattern,
}

impl App {
    /// Initialize an App instance given a settings struct. Consumes
    /// the settings struct.
    pub fn new(settings: Settings) -> Result<Self> {
        let user_key = KeyPattern::new(&settings.user_key).context("Invalid USER_KEY")?;
        let provider_key =
            KeyPattern::new(&settings.provider_key).context("Invalid PROVIDER_KEY")?;
        // Profiles written next to user records must not land on user
        // keys, or a sync would overwrite a record and trigger another.
        if settings.target_bucket.is_none() && user_key.overlaps(&provider_key) {
            return Err(anyhow!(
                "provider keys {:?} overlap with user keys {:?}",
                settings.provider_key,
                settings.user_key
            ));
        }
        Ok(App {
            settings,
            user_key,
            provider_key,
        })
    }

    /// Bucket receiving the profiles synced from records in
    /// `source_bucket`.
    pub fn target_bucket<'a>(&'a self, source_bucket: &'a str) -> &'a str {
        self.settings
            .target_bucket
            .as_deref()
            .unwrap_or(source_bucket)
    }

    /// Turn S3 events into triggers, one per user. Every trigger
    /// reads the current state of the record, so several writes to
    /// the same record collapse into the first one seen.
    pub fn batch_events<I>(&self, events: I) -> Vec<Trigger>
    where
        I: IntoIterator<Item = S3Event>,
    {
        events
            .into_iter()
            .flat_map(|event| event.records)
            .filter_map(|record| Trigger::from_record(&record, &self.user_key))
            .unique_by(|trigger| (trigger.bucket.clone(), trigger.user_id.clone()))
            .collect()
    }

    /// Handle an invocation trigger
    #[instrument(skip(self, client), fields(user_id = %trigger.user_id))]
    pub async fn handle(
        &self,
        trigger: &Trigger,
        client: &aws_sdk_s3::Client,
    ) -> Result<SyncOutcome> {
        let record = download_record(client, &trigger.bucket, &trigger.key).await?;
        let store = S3ProfileStore::new(
            client,
            self.target_bucket(&trigger.bucket),
            &self.provider_key,
        );
        let outcome = on_user_write(&trigger.user_id, record, &store).await?;
        info!(
            ?outcome,
            event = trigger.event_name.as_deref().unwrap_or("manual"),
            written_at = ?trigger.event_time,
            "Provider profile synced"
        );
        Ok(outcome)
    }

    /// Handle a batch of triggers, stopping at the first failure.
    pub async fn handle_all(
        &self,
        triggers: &[Trigger],
        client: &aws_sdk_s3::Client,
    ) -> Result<()> {
        for trigger in triggers {
            self.handle(trigger, client)
                .await
                .with_context(|| format!("Failed to handle trigger {:?}", trigger))?;
        }
        Ok(())
    }
}

/// Global App instance.
static CURRENT: OnceCell<App> = OnceCell::new();

/// Initialize the global App instance.
pub fn init() -> Result<()> {
    let settings = from_env()?;
    let app = App::new(settings)?;
    CURRENT
        .set(app)
        .map_err(|_| anyhow!("app::CURRENT was already initialized"))
}

/// Get the current App instance, or panic if it hasn't been
/// initialized.
pub fn current() -> &'static App {
    CURRENT.get().expect("app is not initialized")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::fixtures::s3_event;

    fn settings(vars: &[(&str, &str)]) -> Settings {
        envy::from_iter(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<Vec<_>>(),
        )
        .unwrap()
    }

    #[test]
    fn default_settings_are_valid() {
        let app = App::new(settings(&[])).unwrap();
        assert_eq!(app.user_key.user_id("users/u1.json"), Some("u1"));
        assert_eq!(app.provider_key.render("u1"), "providers/u1.json");
        assert_eq!(app.target_bucket("app-data"), "app-data");
    }

    #[test]
    fn target_bucket_overrides_source() {
        let app = App::new(settings(&[("TARGET_BUCKET", "profiles")])).unwrap();
        assert_eq!(app.target_bucket("app-data"), "profiles");
    }

    #[test]
    fn rejects_invalid_patterns() {
        assert!(App::new(settings(&[("USER_KEY", "users/all.json")])).is_err());
        assert!(App::new(settings(&[("PROVIDER_KEY", "*/*")])).is_err());
    }

    #[test]
    fn rejects_overlapping_patterns() {
        assert!(App::new(settings(&[("PROVIDER_KEY", "users/*.json")])).is_err());
        assert!(App::new(settings(&[("USER_KEY", "*"), ("PROVIDER_KEY", "*")])).is_err());
        assert!(App::new(settings(&[("USER_KEY", "*"), ("PROVIDER_KEY", "p/*")])).is_ok());
    }

    #[test]
    fn rejects_provider_keys_landing_on_user_keys() {
        let result = App::new(settings(&[("USER_KEY", "data/x*"), ("PROVIDER_KEY", "data/*")]));
        assert!(result.is_err());
    }

    #[test]
    fn overlapping_patterns_are_fine_across_buckets() {
        let app = App::new(settings(&[
            ("USER_KEY", "data/x*"),
            ("PROVIDER_KEY", "data/*"),
            ("TARGET_BUCKET", "profiles"),
        ]))
        .unwrap();
        assert_eq!(app.target_bucket("app-data"), "profiles");
    }

    #[test]
    fn batches_decode_keys() {
        let app = App::new(settings(&[])).unwrap();
        let triggers = app.batch_events(vec![s3_event(
            "app-data",
            &[
                ("ObjectCreated:Put", "users/jane+doe.json"),
                ("ObjectCreated:Put", "users/a%3Ab.json"),
            ],
        )]);
        let users: Vec<&str> = triggers.iter().map(|t| t.user_id.as_str()).collect();
        assert_eq!(users, vec!["jane doe", "a:b"]);
        assert_eq!(triggers[0].key, "users/jane doe.json");
    }

    #[test]
    fn batches_deduplicate_users() {
        let app = App::new(settings(&[])).unwrap();
        let triggers = app.batch_events(vec![
            s3_event(
                "app-data",
                &[
                    ("ObjectCreated:Put", "users/u1.json"),
                    ("ObjectCreated:Put", "providers/u1.json"),
                    ("ObjectCreated:Put", "users/u2.json"),
                ],
            ),
            s3_event(
                "app-data",
                &[
                    ("ObjectRemoved:Delete", "users/u1.json"),
                    ("ObjectCreated:Put", "users/u3.json"),
                ],
            ),
            s3_event("other-data", &[("ObjectCreated:Put", "users/u1.json")]),
        ]);
        let users: Vec<(&str, &str)> = triggers
            .iter()
            .map(|t| (t.bucket.as_str(), t.user_id.as_str()))
            .collect();
        assert_eq!(
            users,
            vec![
                ("app-data", "u1"),
                ("app-data", "u2"),
                ("app-data", "u3"),
                ("other-data", "u1"),
            ]
        );
    }
}
