//! Manual test harness for the battle engine command queue
//!
//! Publishes synthetic gift events or end-match commands to a running
//! engine, for exercising the pipeline against a real broker.

use amqprs::channel::{BasicPublishArguments, QueueDeclareArguments};
use amqprs::BasicProperties;
use anyhow::Result;
use clap::{Parser, Subcommand};
use roast_battle::amqp::connection::{AmqpConfig, AmqpConnection};
use roast_battle::amqp::messages::{
    EndMatchCommand, EngineCommand, MessageUtils, ENGINE_COMMAND_QUEUE,
};
use roast_battle::types::GiftEvent;
use roast_battle::utils::current_timestamp;
use tracing::info;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "battle-tester", about = "Publish test commands to the battle engine")]
struct Args {
    /// AMQP broker host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// AMQP broker port
    #[arg(long, default_value_t = 5672)]
    port: u16,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send synthetic gift events to a match
    Gift {
        /// Target match id
        #[arg(long)]
        match_id: Uuid,
        /// Recipient user id
        #[arg(long)]
        recipient: String,
        /// Gift value in öre per event
        #[arg(long, default_value_t = 1000)]
        value_ore: i64,
        /// Weighted score per event
        #[arg(long, default_value_t = 10)]
        score: i64,
        /// Number of events to send
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
    /// Send an end-match command
    End {
        /// Target match id
        #[arg(long)]
        match_id: Uuid,
        /// Acting user (omit for a platform-forced end)
        #[arg(long)]
        requested_by: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let config = AmqpConfig {
        host: args.host.clone(),
        port: args.port,
        ..AmqpConfig::default()
    };
    let connection = AmqpConnection::new(config).await?;
    let channel = connection.open_channel().await?;

    let mut queue_args = QueueDeclareArguments::new(ENGINE_COMMAND_QUEUE);
    queue_args.durable(true);
    channel
        .queue_declare(queue_args)
        .await
        .map_err(|e| anyhow::anyhow!("queue declare failed: {}", e))?;

    let commands: Vec<EngineCommand> = match args.command {
        Command::Gift {
            match_id,
            recipient,
            value_ore,
            score,
            count,
        } => (0..count)
            .map(|_| {
                EngineCommand::Gift(GiftEvent {
                    event_id: Uuid::new_v4(),
                    match_id,
                    sender_id: format!("tester-{}", Uuid::new_v4()),
                    recipient_id: recipient.clone(),
                    value_ore,
                    score,
                    timestamp: current_timestamp(),
                })
            })
            .collect(),
        Command::End {
            match_id,
            requested_by,
        } => vec![EngineCommand::EndMatch(EndMatchCommand {
            match_id,
            requested_by,
        })],
    };

    let total = commands.len();
    for command in commands {
        let payload = MessageUtils::serialize_command(&command)?;
        let publish_args = BasicPublishArguments::new("", ENGINE_COMMAND_QUEUE);
        channel
            .basic_publish(BasicProperties::default(), payload, publish_args)
            .await
            .map_err(|e| anyhow::anyhow!("publish failed: {}", e))?;
    }

    info!("Published {} command(s) to {}", total, ENGINE_COMMAND_QUEUE);
    connection.close().await?;
    Ok(())
}
