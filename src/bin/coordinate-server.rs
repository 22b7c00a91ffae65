use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use env_logger::Env;

use solar_assistant::api::{self, ServerState};
use solar_assistant::backends::build_backend;
use solar_assistant::config::{load_settings, DEFAULT_CONFIG_PATH};
use solar_assistant::fleet::ToolDispatcher;
use solar_assistant::orchestrator::ChatOrchestrator;
use solar_assistant::prompt::{load_tool_definitions, PromptBuilder, DEFAULT_PROMPT_TEMPLATE};
use solar_assistant::store::ConversationStore;

#[derive(Parser, Debug)]
#[command(
    name = "coordinate-server",
    about = "Chat orchestration server for the solar panel maintenance fleet"
)]
struct Args {
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config_path = args
        .config
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let settings = load_settings(&config_path)?;

    let tools = match settings.prompt.tools_file.as_deref() {
        Some(path) => load_tool_definitions(path)?,
        None => Vec::new(),
    };
    let template = settings
        .prompt
        .template
        .clone()
        .unwrap_or_else(|| DEFAULT_PROMPT_TEMPLATE.to_string());
    let system_prompt = PromptBuilder::new(template, tools).build_system_prompt();

    let backend = build_backend(&settings)?;
    let dispatcher = ToolDispatcher::new(&settings.fleet.base_url, settings.fleet.timeout_seconds)?;
    log::info!(
        "provider {} / fleet backend {} / tools: {}",
        settings.provider.name,
        settings.fleet.base_url,
        dispatcher.tool_names().join(", ")
    );

    let store = Arc::new(ConversationStore::new());
    let orchestrator = Arc::new(ChatOrchestrator::new(
        backend,
        dispatcher,
        Arc::clone(&store),
        system_prompt,
    ));

    let app = api::router(ServerState {
        orchestrator,
        store,
    });

    let host = args.host.unwrap_or(settings.server.host);
    let port = args.port.unwrap_or(settings.server.port);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("coordinate server listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
