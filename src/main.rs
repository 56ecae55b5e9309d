use anyhow::Result;
use clap::Parser;
use meet_coach::audio::ChannelCapture;
use meet_coach::coach::OpenAiChatModel;
use meet_coach::context::StaticContext;
use meet_coach::http::{create_router, AppState};
use meet_coach::pipeline::CoachPipeline;
use meet_coach::realtime::{RtcLinkFactory, SignalingClient};
use meet_coach::Config;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "meet-coach", about = "Realtime meeting coaching service")]
struct Args {
    /// Path to the configuration file, without extension
    #[arg(long, default_value = "config/meet-coach")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;
    cfg.validate()?;

    info!("{} starting", cfg.service.name);

    let signaling = Arc::new(SignalingClient::new(
        &cfg.realtime.base_url,
        &cfg.realtime.api_key,
    )?);
    let model = Arc::new(OpenAiChatModel::new(cfg.chat_model_config())?);
    let context = Arc::new(StaticContext::from_files(
        cfg.context.persona_file.as_deref(),
        cfg.context.playbook_file.as_deref(),
        cfg.context.knowledge_file.as_deref(),
    )?);

    let pipeline = Arc::new(CoachPipeline::new(
        cfg.pipeline_config(),
        cfg.engine_config(),
        signaling,
        Arc::new(RtcLinkFactory),
        model,
        context,
    ));

    // Media packets come from the embedding capture layer; the HTTP API
    // hands out the channel-backed streams.
    let capture = Arc::new(ChannelCapture::new());
    let state = AppState::new(pipeline, capture);
    let router = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP control API listening on {}", addr);

    axum::serve(listener, router).await?;

    Ok(())
}
