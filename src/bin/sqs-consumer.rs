use anyhow::{Context, Result};
use aws_lambda_events::event::s3::S3Event;
use aws_sdk_sqs::{types::DeleteMessageBatchRequestEntry, Client};
use core::time::Duration;
use provider_sync::{app, client, conf};
use std::env::var;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

/// Pause between polls after a clean pass, in milliseconds.
const BASE_LAPSE_TIME: u64 = 300;

/// Growth factor of the pause after consecutive failed passes.
const BACKOFF_BASE: u64 = 2;

/// Longest pause between polls, in milliseconds (20 minutes).
const MAX_SLEEP: u64 = 1200000;

/// Polls a queue of S3 notifications for user records. Each pass syncs
/// the provider profiles of the users it sees, and acknowledges the
/// messages only once every profile is in line.
struct SQSConsumer {
    queue_url: String,
    visibility_timeout: i32,
    max_number_of_messages: i32,
    client: Client,
    backoff: u32,
}

impl SQSConsumer {
    /// Reset the backoff and pause briefly.
    async fn pass(&mut self) {
        self.backoff = 0;
        sleep(Duration::from_millis(BASE_LAPSE_TIME)).await;
    }

    /// Pause for longer after each consecutive failure.
    async fn fail(&mut self) {
        sleep(Duration::from_millis(std::cmp::min(
            BASE_LAPSE_TIME.saturating_mul(BACKOFF_BASE.saturating_pow(self.backoff)),
            MAX_SLEEP,
        )))
        .await;
        self.backoff = self.backoff.saturating_add(1);
    }

    /// Receive a batch of notifications and sync the users they name.
    #[instrument(skip(self), fields(queue = %self.queue_url, backoff = self.backoff))]
    pub async fn tick(&mut self) {
        let receive_result = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .visibility_timeout(self.visibility_timeout)
            .max_number_of_messages(self.max_number_of_messages)
            .wait_time_seconds(20)
            .send()
            .await;
        let result = match receive_result {
            Ok(result) => result,
            Err(e) => {
                warn!("Error while consuming messages from SQS queue: {:?}", e);
                return self.fail().await;
            }
        };
        let messages = result.messages().unwrap_or_default();
        if messages.is_empty() {
            return self.pass().await;
        }

        let triggers = app::current().batch_events(
            messages
                .iter()
                .filter_map(|message| message.body())
                .filter_map(|body| {
                    serde_json::from_str::<S3Event>(body)
                        .map_err(|e| {
                            warn!("SQS message doesn't hold an S3 notification: {:?}", e);
                            e
                        })
                        .ok()
                }),
        );
        if let Err(e) = app::current()
            .handle_all(&triggers, client::current())
            .await
        {
            warn!("Profile sync failed; messages are left for redelivery: {:?}", e);
            return self.fail().await;
        }

        info!(users = triggers.len(), "Profiles synced; acknowledging messages");
        let delete_command_result = self
            .client
            .delete_message_batch()
            .queue_url(&self.queue_url)
            .set_entries(Some(
                messages
                    .iter()
                    .map(|message| {
                        DeleteMessageBatchRequestEntry::builder()
                            .set_id(message.message_id().map(String::from))
                            .set_receipt_handle(message.receipt_handle().map(String::from))
                            .build()
                    })
                    .collect(),
            ))
            .send()
            .await;
        let delete_result = match delete_command_result {
            Ok(result) => result,
            Err(e) => {
                warn!("Couldn't acknowledge SQS messages: {:?}", e);
                return self.fail().await;
            }
        };
        let failed = delete_result.failed().unwrap_or_default().len();
        if failed > 0 {
            warn!(
                "Couldn't acknowledge some SQS messages: {:?} out of {:?} will be redelivered",
                failed,
                messages.len()
            );
        }
        self.pass().await;
    }
}

/// Consume S3 events for user records from an SQS queue, keeping the
/// corresponding provider profiles in sync.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();
    app::init()?;
    client::init().await?;

    let queue_url = var("SQS_QUEUE_URL").context("SQS_QUEUE_URL is required")?;
    let visibility_timeout = var("SQS_VISIBILITY_TIMEOUT")
        .unwrap_or(String::from("30"))
        .parse::<i32>()
        .context("SQS_VISIBILITY_TIMEOUT must be a number")?;
    let max_number_of_messages = var("SQS_MAX_NUMBER_OF_MESSAGES")
        .unwrap_or(String::from("1"))
        .parse::<i32>()
        .context("SQS_MAX_NUMBER_OF_MESSAGES must be a number")?;
    let sqs_client = Client::new(&conf::aws_service_config().await);

    let mut consumer = SQSConsumer {
        queue_url,
        visibility_timeout,
        max_number_of_messages,
        client: sqs_client,
        backoff: 0,
    };

    // Stop polling on CTRL-C
    let (stop_processing, mut should_stop) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("CTRL-C");
        }
        let _ = stop_processing.send(());
    });

    // Continuously receive messages and sync the profiles of the
    // affected users
    loop {
        tokio::select! {
            _ = consumer.tick() => (),
            _ = &mut should_stop => break
        }
    }
    Ok(())
}
