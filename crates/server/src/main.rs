mod bootstrap;
mod handlers;

use std::sync::Arc;

use anyhow::Result;

use skipper_agent::{AgentCore, ConversationRuntime, OutputSink, TranscriptWriter};
use skipper_core::config::{AppConfig, LoadOptions};
use skipper_slack::{ChatClient, NoopChatClient, NoopSocketTransport, ReconnectPolicy,
    SocketModeRunner};

use crate::handlers::{AgentEventSink, ChannelPoster, ScheduledSkillTrigger};

fn init_logging(config: &AppConfig) {
    use skipper_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    // Now bootstrap using the same config we already loaded
    let app = bootstrap::bootstrap_with_config(config).await?;

    // The wire implementations plug in behind these seams.
    let client: Arc<dyn ChatClient> = Arc::new(NoopChatClient);
    let identity = client.identity().await?;
    tracing::info!(bot_user_id = %identity.user_id, team = %identity.team, "slack identity resolved");

    let poster = Arc::new(ChannelPoster::new(client.clone()));
    let output: Arc<dyn OutputSink> = Arc::new(TranscriptWriter::new(Some(poster)));
    let runtime = Arc::new(ConversationRuntime::new(
        app.store.clone(),
        app.registry.clone(),
        app.router.clone(),
        None,
        Some(output),
    ));

    let agent = Arc::new(AgentCore::new(
        app.store.clone(),
        app.registry.clone(),
        runtime,
        app.router.clone(),
        identity.user_id,
        Some(app.scheduler.clone()),
    ));

    app.scheduler
        .set_callback(Arc::new(ScheduledSkillTrigger::new(agent.clone(), client.clone())))
        .await;
    tokio::spawn(app.scheduler.clone().run());

    let sink = Arc::new(AgentEventSink::new(agent, client));
    let runner = SocketModeRunner::new(
        Arc::new(NoopSocketTransport),
        sink,
        ReconnectPolicy::default(),
    );
    runner.start().await?;

    tracing::info!("skipper-server started");
    wait_for_shutdown().await?;
    tracing::info!("skipper-server stopping");

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
