//! Lease Insight - Server and CLI Entry Point

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lease_insight::{api, AppConfig, AppState, StartRequest};

#[derive(Parser)]
#[command(name = "lease-insight")]
#[command(about = "Streaming lease research server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8000", env = "PORT")]
        port: u16,
    },

    /// Run one full analysis and print the event stream as NDJSON
    Analyze {
        /// tenant, landlord or broker
        #[arg(long, default_value = "tenant")]
        role: String,

        #[arg(long)]
        property: String,

        #[arg(long)]
        address: String,

        /// Leasable area in square feet
        #[arg(long)]
        area: String,

        /// Current base rent per square foot
        #[arg(long)]
        rent: String,

        /// Lease document (.pdf or .docx)
        #[arg(long)]
        document: Option<PathBuf>,

        /// openai or anthropic
        #[arg(long)]
        provider: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr so `analyze` output stays pure NDJSON
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,lease_insight=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("loading configuration")?;
    config.log_summary();
    let state = AppState::from_config(&config).context("opening session store")?;

    match cli.command {
        Commands::Serve { port } => serve(state, port).await,
        Commands::Analyze {
            role,
            property,
            address,
            area,
            rent,
            document,
            provider,
        } => {
            let files = match document {
                Some(path) => {
                    let bytes = std::fs::read(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    vec![(name, bytes)]
                }
                None => Vec::new(),
            };
            let request = StartRequest {
                analyze_as: role,
                property_name: property,
                address,
                leasable_area: area,
                current_base_rent: rent,
                files,
                llm_provider: provider,
                ..Default::default()
            };
            run_analysis(state, request).await
        }
    }
}

async fn serve(state: AppState, port: u16) -> Result<()> {
    let app = api::create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!("Lease Insight listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn run_analysis(state: AppState, request: StartRequest) -> Result<()> {
    let session_id = state.engine.start_session(request).await?;
    tracing::info!("Session {} started", session_id);

    let mut events = state.engine.stream_analysis(&session_id);
    let mut stdout = std::io::stdout();
    while let Some(event) = events.recv().await {
        stdout.write_all(event.to_ndjson_line()?.as_bytes())?;
        stdout.flush()?;
        if event.is_terminal() {
            break;
        }
    }
    Ok(())
}
