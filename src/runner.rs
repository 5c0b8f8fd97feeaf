//! Process entry points: logging setup, server startup, and the `auth`
//! subcommand. `RUST_LOG` takes priority over `-v`/`-q`; diagnostic mode
//! logs to a file with the path echoed to stderr.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::bridge::{CursorBridge, ExecuteOptions};
use crate::cli::{AuthAction, Cli};
use crate::config::AppConfig;
use crate::dispatch::{Dispatcher, ExtensionRegistry};
use crate::error::Result;
use crate::prompt::PromptHandler;
use crate::session::SessionManager;
use crate::slash::{SlashCommand, SlashRegistry};
use crate::tools::{CursorTool, FilesystemTool, ToolCallManager, ToolRegistry};
use crate::transport::Transport;

#[cfg(feature = "otel")]
use opentelemetry::global;
#[cfg(feature = "otel")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "otel")]
use opentelemetry_otlp::WithExportConfig;
#[cfg(feature = "otel")]
use opentelemetry_sdk::trace::SdkTracerProvider;

#[cfg(feature = "otel")]
static OTEL_PROVIDER: std::sync::OnceLock<SdkTracerProvider> = std::sync::OnceLock::new();

#[cfg(feature = "otel")]
pub fn shutdown_otel() {
    if let Some(provider) = OTEL_PROVIDER.get() {
        tracing::info!("shutting down OpenTelemetry provider");
        if let Err(e) = provider.shutdown() {
            eprintln!("failed to shut down OpenTelemetry provider: {e:?}");
        }
    }
}

#[cfg(not(feature = "otel"))]
pub fn shutdown_otel() {}

#[cfg(feature = "otel")]
fn init_otel(endpoint: &str, service_name: &str) -> anyhow::Result<SdkTracerProvider> {
    use opentelemetry_sdk::Resource;

    let exporter = opentelemetry_otlp::SpanExporter::builder().with_tonic().with_endpoint(endpoint).build()?;
    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(Resource::builder().with_service_name(service_name.to_owned()).build())
        .build();
    global::set_tracer_provider(provider.clone());
    Ok(provider)
}

fn build_env_filter(cli: &Cli) -> tracing_subscriber::EnvFilter {
    if let Ok(rust_log) = std::env::var("RUST_LOG") {
        if !rust_log.is_empty() {
            return tracing_subscriber::EnvFilter::new(rust_log);
        }
    }
    tracing_subscriber::EnvFilter::from_default_env().add_directive(cli.log_level().into())
}

fn init_logging_to_file(cli: &Cli) -> anyhow::Result<()> {
    let filter = build_env_filter(cli);
    let log_path = cli.log_path();
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(&log_path)?;
    eprintln!("Diagnostic mode: logging to {}", log_path.display());

    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::sync::Mutex::new(file)).with_ansi(false);

    #[cfg(feature = "otel")]
    {
        if cli.is_otel_enabled() {
            let provider = init_otel(cli.otel_endpoint.as_ref().unwrap(), &cli.otel_service_name)?;
            let tracer = provider.tracer("cursor-agent-acp");
            let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
            let _ = OTEL_PROVIDER.set(provider);
            tracing_subscriber::registry().with(filter).with(fmt_layer).with(otel_layer).init();
            return Ok(());
        }
    }
    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
    Ok(())
}

fn init_logging_to_stderr(cli: &Cli) {
    let filter = build_env_filter(cli);
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_ansi(false);

    #[cfg(feature = "otel")]
    {
        if cli.is_otel_enabled() {
            match init_otel(cli.otel_endpoint.as_ref().unwrap(), &cli.otel_service_name) {
                Ok(provider) => {
                    let tracer = provider.tracer("cursor-agent-acp");
                    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
                    let _ = OTEL_PROVIDER.set(provider);
                    tracing_subscriber::registry().with(filter).with(fmt_layer).with(otel_layer).init();
                    return;
                }
                Err(e) => {
                    eprintln!("failed to initialize OpenTelemetry: {e}");
                }
            }
        }
    }
    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    if cli.is_diagnostic() {
        init_logging_to_file(cli)
    } else {
        init_logging_to_stderr(cli);
        Ok(())
    }
}

/// Used by `--validate`: configuration loads and the session directory is
/// creatable, without starting the server.
pub fn validate_config() -> Result<()> {
    AppConfig::from_env().validate()
}

fn register_builtin_slash_commands(slash: &SlashRegistry) {
    if let Ok(command) = SlashCommand::new("model", "Switch the active model for this session")
        .and_then(|c| c.with_input_hint("<model-id>"))
    {
        slash.register(command);
    }
}

/// Wire every component together and run the stdio dispatch loop until
/// stdin closes.
pub async fn run_stdio_server(cli: &Cli) -> anyhow::Result<()> {
    init_logging(cli)?;
    tracing::info!(version = %env!("CARGO_PKG_VERSION"), pid = %std::process::id(), "cursor-agent-acp starting");

    let config = AppConfig::from_env();
    let sessions = Arc::new(SessionManager::new(config.session_dir.clone(), config.max_sessions, config.session_timeout));
    let _sweep_task = sessions.spawn_sweep_task();

    let bridge = Arc::new(CursorBridge::new(config.cursor_agent_bin.clone()));
    let (transport, rx) = Transport::spawn();

    let slash = Arc::new(SlashRegistry::new());
    register_builtin_slash_commands(&slash);

    let mut tool_registry = ToolRegistry::new();
    for provider in CursorTool::catalog(Arc::clone(&bridge)) {
        tool_registry.register(provider);
    }
    tool_registry.register(FilesystemTool::read(Arc::clone(&transport)));
    tool_registry.register(FilesystemTool::write(Arc::clone(&transport)));
    let tools = Arc::new(tool_registry);

    let tool_calls = Arc::new(ToolCallManager::new(Arc::clone(&transport)));
    let prompts = Arc::new(PromptHandler::new(
        Arc::clone(&sessions),
        Arc::clone(&bridge),
        Arc::clone(&transport),
        Arc::clone(&slash),
        config.cursor_timeout,
        config.cursor_retries,
    ));

    let dispatcher =
        Arc::new(Dispatcher::new(sessions, Arc::clone(&transport), slash, tools, tool_calls, prompts, ExtensionRegistry::new()));

    dispatcher.run(rx).await;
    tracing::info!("stdin closed, shutting down");
    Ok(())
}

/// `cursor-agent-acp auth login|logout|status`.
pub async fn run_auth(cli: &Cli, action: AuthAction) -> anyhow::Result<()> {
    init_logging(cli)?;
    let config = AppConfig::from_env();
    let bridge = CursorBridge::new(config.cursor_agent_bin);

    match action {
        AuthAction::Status => {
            let authenticated = bridge.check_authentication().await?;
            println!("{}", if authenticated { "authenticated" } else { "not authenticated" });
        }
        AuthAction::Login => {
            let opts = ExecuteOptions { cwd: None, timeout: Duration::from_secs(120), retries: 0 };
            let result = bridge.execute_command(&["login".to_string()], &opts).await?;
            print!("{}", result.stdout);
            if !result.success {
                anyhow::bail!("cursor-agent login failed: {}", result.stderr);
            }
        }
        AuthAction::Logout => {
            let opts = ExecuteOptions { cwd: None, timeout: Duration::from_secs(30), retries: 0 };
            let result = bridge.execute_command(&["logout".to_string()], &opts).await?;
            print!("{}", result.stdout);
            if !result.success {
                anyhow::bail!("cursor-agent logout failed: {}", result.stderr);
            }
        }
    }
    Ok(())
}
