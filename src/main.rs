//! API Automate - Main Application
//!
//! Import a request collection, then run it from the command line, serve the
//! control API, or drive it from the terminal dashboard.

use api_automate::{
    automation::create_shared_sequencer,
    config::{AppConfig, SharedConfig},
    executor::HttpExecutor,
    server::start_server,
    transcript::create_shared_transcript,
    tui::TuiApp,
    workspace::{create_shared_workspace, SharedWorkspace},
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// API Automate - collection importer and automation runner
#[derive(Parser)]
#[command(name = "api-automate")]
#[command(about = "Import request collections, send requests and replay them in order")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Control server host
    #[arg(long, env = "API_AUTOMATE_SERVER_HOST")]
    host: Option<String>,

    /// Control server port
    #[arg(short, long, env = "API_AUTOMATE_SERVER_PORT")]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the selectable categories of a collection file
    Categories {
        /// Collection document (JSON)
        file: PathBuf,
    },
    /// Import a collection and print the resulting category tree
    Import {
        file: PathBuf,
        /// Import only these categories (repeatable)
        #[arg(short = 'c', long = "category")]
        categories: Vec<String>,
    },
    /// Import a collection and run methods in order
    Run {
        file: PathBuf,
        #[arg(short = 'c', long = "category")]
        categories: Vec<String>,
        /// Method keys to queue, in order ("Category - Name")
        #[arg(short, long = "method")]
        methods: Vec<String>,
        /// Queue every imported method
        #[arg(long)]
        all: bool,
        /// Write the transcript to this file when the run finishes
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Import a collection and write it back out in normalized form
    Export {
        file: PathBuf,
        #[arg(short = 'c', long = "category")]
        categories: Vec<String>,
        /// Output path
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Start the control server
    Serve {
        /// Collection to import before serving
        file: Option<PathBuf>,
    },
    /// Start the TUI dashboard
    Tui {
        /// Collection to import before starting
        file: Option<PathBuf>,
    },
    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("api_automate={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    let mut config = if std::path::Path::new(&cli.config).exists() {
        AppConfig::load_from_file(&cli.config).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to load config file, using defaults");
            AppConfig::default()
        })
    } else {
        AppConfig::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to load config, using defaults");
            AppConfig::default()
        })
    };

    // Override with CLI args
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let shared_config = SharedConfig::new(config.clone());
    let transcript = create_shared_transcript(config.transcript.max_entries);
    let workspace = create_shared_workspace(&config, transcript.clone());
    let executor = HttpExecutor::new(&config.http)?;
    let sequencer = create_shared_sequencer(workspace.clone(), executor, shared_config.clone());

    match cli.command {
        Some(Commands::Categories { file }) => {
            let contents = std::fs::read_to_string(&file)?;
            let doc = api_automate::collection::CollectionDocument::from_json(&contents)?;
            for category in api_automate::collection::find_categories(&doc) {
                println!("{}", category);
            }
        }
        Some(Commands::Import { file, categories }) => {
            import(&workspace, &file, &categories)?;
            let ws = workspace.read();
            for node in ws.category_tree()? {
                println!("{} ({} methods)", node.name, node.total_methods);
                for (sub, methods) in &node.subcategories {
                    println!("  {}", sub);
                    for method in methods {
                        println!("    - {}", method);
                    }
                }
            }
            let logins = ws.login_requests()?;
            if !logins.is_empty() {
                println!("\nLogin requests:");
                for login in logins {
                    println!("  {} {} ({})", login.method, login.url, login.path);
                }
            }
        }
        Some(Commands::Run {
            file,
            categories,
            methods,
            all,
            export,
        }) => {
            import(&workspace, &file, &categories)?;
            {
                let mut ws = workspace.write();
                if all {
                    ws.enqueue_all()?;
                } else {
                    for raw in &methods {
                        let key = ws.key(raw)?;
                        ws.enqueue(&key)?;
                    }
                }
            }

            // Ctrl-C stops after the in-flight step
            let stopper = sequencer.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    stopper.stop();
                }
            });

            let summary = sequencer.run().await?;

            println!("\n=== Automation Results ===");
            for step in &summary.steps {
                let outcome = match (&step.error, step.status_code) {
                    (Some(error), _) => error.clone(),
                    (None, Some(code)) => format!("HTTP {}", code),
                    (None, None) => "no response".to_string(),
                };
                println!(
                    "{} {}. {} - {} ({:.2} ms)",
                    if step.success { "✅" } else { "❌" },
                    step.index,
                    step.key,
                    outcome,
                    step.latency_ms
                );
            }
            println!("Total steps: {}", summary.total);
            println!("Successful: {}", summary.successful);
            println!("Failed: {}", summary.failed);
            if summary.cancelled {
                println!("Cancelled, skipped: {}", summary.skipped);
            }
            println!("Total duration: {:.2} ms", summary.total_duration_ms);

            if let Some(path) = export {
                transcript.export_file(&path)?;
                tracing::info!(path = %path.display(), "Transcript exported");
            }
        }
        Some(Commands::Export {
            file,
            categories,
            out,
        }) => {
            import(&workspace, &file, &categories)?;
            let doc = workspace.read().export_collection()?;
            std::fs::write(&out, serde_json::to_string_pretty(&doc)?)?;
            tracing::info!(path = %out.display(), "Collection exported");
        }
        Some(Commands::Serve { file }) => {
            if let Some(file) = file {
                import(&workspace, &file, &[])?;
            }
            tracing::info!(
                host = %config.server.host,
                port = %config.server.port,
                "Starting API Automate control server"
            );
            start_server(shared_config, workspace, sequencer, transcript).await?;
        }
        Some(Commands::Tui { file }) => {
            if let Some(file) = file {
                import(&workspace, &file, &[])?;
            }
            let mut app = TuiApp::new(shared_config, workspace, sequencer, transcript);
            app.run().await?;
        }
        Some(Commands::Config) => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        None => {
            tracing::info!(
                host = %config.server.host,
                port = %config.server.port,
                "Starting API Automate control server"
            );
            start_server(shared_config, workspace, sequencer, transcript).await?;
        }
    }

    Ok(())
}

fn import(workspace: &SharedWorkspace, file: &PathBuf, categories: &[String]) -> anyhow::Result<()> {
    let selection = (!categories.is_empty()).then_some(categories);
    let report = workspace.write().import_file(file, selection)?;
    tracing::info!(
        imported = report.imported,
        skipped = report.skipped,
        file = %file.display(),
        "Collection imported"
    );
    for issue in &report.issues {
        tracing::warn!(path = %issue.path, "{}", issue.message);
    }
    Ok(())
}
