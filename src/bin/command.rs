use anyhow::{anyhow, Context, Result};
use provider_sync::trigger::Trigger;
use provider_sync::{app, client};
use std::env::var;
use tracing::info;

/// Sync the provider profile of a single user, regardless of any
/// event.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();
    app::init()?;
    client::init().await?;

    let settings = &app::current().settings;
    let bucket = var(&settings.bucket_var).context(settings.bucket_var.clone())?;
    let user_id = var(&settings.user_id_var).context(settings.user_id_var.clone())?;
    let key = app::current().user_key.render(&user_id);
    if app::current().user_key.user_id(&key) != Some(user_id.as_str()) {
        return Err(anyhow!("{:?} is not a valid user id", user_id));
    }
    let trigger = Trigger {
        key,
        bucket,
        user_id,
        event_name: None,
        event_time: None,
    };

    let outcome = app::current()
        .handle(&trigger, client::current())
        .await
        .with_context(|| format!("Failed to handle trigger {:?}", &trigger))?;
    info!(?outcome, "Done");

    Ok(())
}
