//! Defines configuration as read from the environment.

use aws_config::SdkConfig;
use aws_sdk_s3::config::Region;
use serde::Deserialize;
use std::env;

/// Default `user_key` value.
fn default_user_key() -> String {
    String::from("users/*.json")
}

/// Default `provider_key` value.
fn default_provider_key() -> String {
    String::from("providers/*.json")
}

/// Default `bucket_var` value.
fn default_bucket_var() -> String {
    String::from("BUCKET")
}

/// Default `user_id_var` value.
fn default_user_id_var() -> String {
    String::from("USER_ID")
}

/// The sync is configured to watch user records in S3 and to keep a
/// provider profile in S3 for every qualifying user. The
/// configuration must be given as environment variables.
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Defines the keys holding user records. It must contain exactly
    /// one star (*), standing for the user id, which matches any
    /// number of non-slash characters. Events for keys that don't
    /// match are ignored.
    #[serde(default = "default_user_key")]
    pub user_key: String,

    /// Defines the keys receiving provider profiles. It must contain
    /// exactly one star (*), which is replaced by the user id.
    #[serde(default = "default_provider_key")]
    pub provider_key: String,

    /// Defines a bucket to receive the provider profiles. If omitted,
    /// it will be the same bucket as the one in the triggering event.
    #[serde(default)]
    pub target_bucket: Option<String>,

    /// The environment variable holding the bucket of the user record
    /// to be synced by the one-shot command.
    #[serde(default = "default_bucket_var")]
    pub bucket_var: String,

    /// The environment variable holding the id of the user to be
    /// synced by the one-shot command.
    #[serde(default = "default_user_id_var")]
    pub user_id_var: String,
}

/// Load the AWS configuration from the environment, honoring an
/// `AWS_ENDPOINT_URL` override.
pub async fn aws_service_config() -> SdkConfig {
    if let Ok(endpoint_url) = env::var("AWS_ENDPOINT_URL") {
        aws_config::from_env()
            .endpoint_url(
                if endpoint_url.starts_with("http://") || endpoint_url.starts_with("https://") {
                    endpoint_url
                } else {
                    format!("https://{}", endpoint_url)
                },
            )
            .region(Region::new("us-east-1")) // should be OK since the endpoint was overridden
            .load()
            .await
    } else {
        aws_config::from_env().load().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply() {
        let settings: Settings = envy::from_iter(Vec::<(String, String)>::new()).unwrap();
        assert_eq!(settings.user_key, "users/*.json");
        assert_eq!(settings.provider_key, "providers/*.json");
        assert_eq!(settings.target_bucket, None);
        assert_eq!(settings.bucket_var, "BUCKET");
        assert_eq!(settings.user_id_var, "USER_ID");
    }

    #[test]
    fn variables_override_defaults() {
        let settings: Settings = envy::from_iter(vec![
            (String::from("USER_KEY"), String::from("people/*")),
            (String::from("TARGET_BUCKET"), String::from("profiles")),
        ])
        .unwrap();
        assert_eq!(settings.user_key, "people/*");
        assert_eq!(settings.target_bucket.as_deref(), Some("profiles"));
    }
}
