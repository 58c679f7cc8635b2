use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use secrecy::ExposeSecret;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use fitness_bot::bot::{Bot, BotSettings};
use fitness_bot::channels::{ChannelManager, CliChannel, TelegramChannel};
use fitness_bot::config::BotConfig;
use fitness_bot::conversation::{ApiState, ConversationEngine, EngineConfig, api_routes};
use fitness_bot::llm::create_provider;
use fitness_bot::planner::{LlmPlanGenerator, PlannerConfig};
use fitness_bot::predictor::{LinearProgressModel, ProgressPredictor};
use fitness_bot::store::{LibSqlBackend, ProfileStore};

/// Stderr logging, plus a daily-rolling file when a log directory is set.
/// The returned guard flushes the file writer on drop.
fn init_tracing(log_dir: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "fitness-bot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // An absent .env file is fine.
    dotenvy::dotenv().ok();

    let config = BotConfig::from_env().context("Invalid configuration")?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("🏋️  Fitness Bot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {} ({:?})", config.llm.model, config.llm.backend);

    // ── LLM ─────────────────────────────────────────────────────────────
    let llm = create_provider(&config.llm)?;
    let planner = Arc::new(LlmPlanGenerator::new(llm, PlannerConfig::default()));

    // ── Database ────────────────────────────────────────────────────────
    let store = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );
    eprintln!("   Database: {}", config.db_path.display());

    // ── Progress model ──────────────────────────────────────────────────
    let predictor: Option<Arc<dyn ProgressPredictor>> = match &config.predictor_path {
        Some(path) => {
            let model = LinearProgressModel::from_path(path).with_context(|| {
                format!("Failed to load progress model from {}", path.display())
            })?;
            eprintln!("   Prediction: enabled ({})", path.display());
            Some(Arc::new(model))
        }
        None => {
            eprintln!("   Prediction: disabled (FITNESS_BOT_PREDICTOR_PATH not set)");
            None
        }
    };

    let engine = Arc::new(ConversationEngine::new(
        Arc::clone(&store) as Arc<dyn ProfileStore>,
        planner,
        predictor,
        EngineConfig {
            call_timeout: config.call_timeout,
        },
    ));

    // ── REST API ────────────────────────────────────────────────────────
    let mut rest_api = None;
    if let Some(port) = config.http_port {
        let app = api_routes(ApiState {
            engine: Arc::clone(&engine),
        });
        let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
            .await
            .with_context(|| format!("Failed to bind REST API port {port}"))?;
        eprintln!("   REST API: http://0.0.0.0:{port}/health");
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            tracing::info!(port, "REST API started");
            let shutdown = async {
                let _ = stop_rx.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::error!(error = %e, "REST API stopped");
            }
        });
        rest_api = Some((stop_tx, handle));
    }

    // ── Channels ────────────────────────────────────────────────────────
    let mut channels = ChannelManager::new();

    if config.cli_enabled {
        channels.add(Box::new(CliChannel::with_engine(Arc::clone(&engine))));
    }

    if let Some(telegram) = &config.telegram {
        eprintln!(
            "   Telegram: enabled (allowed: {})",
            if telegram.allowed_users.iter().any(|u| u == "*") {
                "everyone".to_string()
            } else {
                telegram.allowed_users.join(", ")
            }
        );
        channels.add(Box::new(TelegramChannel::new(
            telegram.bot_token.expose_secret().to_string(),
            telegram.allowed_users.clone(),
        )));
    }

    let active = channels.names().join(", ");
    if active.is_empty() {
        anyhow::bail!("No channels enabled: set TELEGRAM_API_TOKEN or FITNESS_BOT_CLI=true");
    }
    eprintln!("   Channels: {active}\n");

    let bot = Arc::new(Bot::new(
        engine,
        channels,
        BotSettings {
            idle_timeout: config.idle_timeout,
        },
    ));
    bot.run().await?;

    if let Some((stop_tx, handle)) = rest_api {
        let _ = stop_tx.send(());
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "REST API task failed");
        }
        tracing::info!("REST API stopped");
    }

    // Every engine handle is gone by now; the last store handle closes it.
    match Arc::try_unwrap(store) {
        Ok(backend) => {
            drop(backend);
            tracing::info!("Database closed");
        }
        Err(_) => tracing::warn!("Database still referenced at shutdown"),
    }
    Ok(())
}
