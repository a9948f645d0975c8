mod discord;
mod discord_commands;
use anyhow::Context as _;
use poise::{Framework, FrameworkOptions, serenity_prelude as serenity};
use seedbot::a2s::A2sClient;
use seedbot::clock::SystemClock;
use seedbot::config::{Config, MonitorConfig};
use seedbot::create_app;
use seedbot::feed::HttpIdentityFeed;
use seedbot::monitor::{ServerMonitor, ServerSettings, SharedHandles};
use seedbot::notifier::{Notifier, run_dispatcher};
use seedbot::presence::run_presence;
use seedbot::restart::RestartSignal;
use seedbot::status::StatusBoard;
use seedbot_db::Registry;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

type Context<'a> = poise::Context<'a, crate::Data, crate::discord_commands::Error>;

/// Identity feed requests give up after this long
const FEED_TIMEOUT: Duration = Duration::from_secs(3);

pub(crate) struct Data {
    pub(crate) registry: Registry,
    pub(crate) board: StatusBoard,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing for structured logging
    #[cfg(debug_assertions)]
    let log_level = tracing::Level::DEBUG;
    #[cfg(not(debug_assertions))]
    let log_level = tracing::Level::INFO;

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();
    tracing::info!("Starting seedbot...");
    // Load configuration from environment variables or use defaults
    let config = Config::from_env();
    tracing::info!(
        "Configuration: port={}, db_path={}, monitor_config={}, timeout={}s, queue={}, send_interval={}ms",
        config.port,
        config.database_path,
        config.monitor_config,
        config.request_timeout.as_secs(),
        config.queue_capacity,
        config.send_interval.as_millis()
    );
    let monitor_config = MonitorConfig::load(&config.monitor_config)
        .with_context(|| format!("error loading {}", config.monitor_config))?;
    let token = config
        .discord_token
        .clone()
        .context("DISCORD_TOKEN environment variable is required")?;

    let registry = Registry::open(&config.database_path)
        .await
        .context("error opening registry database")?;
    if std::env::args().any(|arg| arg == "--reindex") {
        let written = registry.reindex().await?;
        tracing::info!("Reverse index rebuilt with {} entries", written);
    }

    let restart = RestartSignal::new();
    let (notifier, queue) = Notifier::channel(config.queue_capacity);
    let handles = SharedHandles {
        registry: registry.clone(),
        notifier,
        clock: Arc::new(SystemClock),
        restart: restart.clone(),
    };

    let mut views = Vec::with_capacity(monitor_config.servers.len());
    let mut tasks = Vec::new();
    for server in &monitor_config.servers {
        let settings = ServerSettings::from_config(server, &monitor_config);
        let client = A2sClient::new(server.address.clone(), monitor_config.query_timeout());
        let feed = server
            .id_url
            .as_ref()
            .map(|url| HttpIdentityFeed::new(url.clone(), FEED_TIMEOUT))
            .transpose()
            .context("error building identity feed client")?;
        tracing::info!("Monitoring {} [{}]", server.name, server.address);
        let monitor = ServerMonitor::spawn(settings, client, feed, handles.clone());
        views.push(monitor.view);
        tasks.extend(monitor.tasks);
    }
    // Monitors own the remaining producers
    drop(handles);
    let board = StatusBoard::new(views);
    let templates = monitor_config
        .status_templates()
        .context("error parsing status templates")?;

    let app = create_app(board.clone(), config.request_timeout);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Status server listening on {}", addr);

    let intents = serenity::GatewayIntents::default();

    let framework = Framework::builder()
        .options(FrameworkOptions {
            commands: vec![
                discord_commands::bind(),
                discord_commands::bindu(),
                discord_commands::whois(),
                discord_commands::status(),
            ],
            pre_command: |ctx| {
                Box::pin(async move {
                    tracing::info!(
                        "Executing command '{}' by user '{}'",
                        ctx.command().name,
                        ctx.author().name
                    );
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    tracing::info!(
                        "Finished command '{}' by user '{}'",
                        ctx.command().name,
                        ctx.author().name
                    );
                })
            },
            ..Default::default()
        })
        .setup({
            let registry = registry.clone();
            let board = board.clone();
            let restart = restart.clone();
            let presence_interval = monitor_config.query_interval();
            move |ctx, _ready, framework| {
                Box::pin(async move {
                    poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                    tokio::spawn(run_presence(
                        discord::DiscordPresence::new(ctx.clone()),
                        board.clone(),
                        templates,
                        presence_interval,
                        restart,
                    ));
                    Ok(Data { registry, board })
                })
            }
        })
        .build();

    let mut client = serenity::ClientBuilder::new(&token, intents)
        .framework(framework)
        .await
        .context("Error creating Discord client")?;

    let dispatcher = tokio::spawn(run_dispatcher(
        queue,
        discord::DiscordSink::new(client.http.clone()),
        monitor_config.channel_id,
        config.send_interval,
        restart.clone(),
    ));

    let mut restart_request = restart.clone();
    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                tracing::error!("Axum server error: {}", e);
            }
        }
        result = client.start() => {
            if let Err(e) = result {
                tracing::error!("Discord client error: {:?}", e);
            }
        }
        _ = restart_request.fired() => {
            tracing::info!("Restart requested, stopping");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
        }
    }

    let relaunch = restart.is_fired();
    // Stop every loop at its next select point
    restart.fire();
    for task in tasks {
        if let Err(e) = task.await {
            tracing::warn!("Monitor task failed: {}", e);
        }
    }
    let _ = dispatcher.await;
    client.shard_manager.shutdown_all().await;

    if relaunch {
        relaunch_self()?;
    }
    Ok(())
}

/// Start a fresh copy of this process with the same arguments.
fn relaunch_self() -> anyhow::Result<()> {
    let exe = std::env::current_exe().context("error locating own executable")?;
    let args: Vec<String> = std::env::args()
        .skip(1)
        .filter(|arg| arg != "--reindex")
        .collect();
    tracing::info!("Relaunching {}", exe.display());
    std::process::Command::new(exe)
        .args(args)
        .spawn()
        .context("error relaunching")?;
    Ok(())
}
