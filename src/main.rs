use anyhow::{anyhow, Context, Result};
use aws_lambda_events::event::s3::S3Event;
use lambda_runtime::{run, service_fn, LambdaEvent};
use provider_sync::{app, client};

/// Sync the provider profile of each user whose record was written
async fn function_handler(event: LambdaEvent<S3Event>) -> Result<()> {
    let triggers = app::current().batch_events([event.payload]);
    app::current()
        .handle_all(&triggers, client::current())
        .await
        .with_context(|| format!("Failed to handle batch of {} triggers", triggers.len()))
}

/// Run an AWS Lambda function that listens to S3 events for user
/// records, and keeps the corresponding provider profiles in sync.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();
    app::init()?;
    client::init().await?;

    run(service_fn(function_handler))
        .await
        .map_err(|e| anyhow!("{:?}", e))
}
