use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use orgchart::config::{load_config, LoggingConfig};
use orgchart::error::OrgResult;
use orgchart::server::{run_http_server, AppState};

/// Orgchart: employee supervisor hierarchy service
#[derive(Parser)]
#[command(name = "orgchart")]
#[command(about = "Employee supervisor hierarchy with single-parent, cycle-free edges.")]
#[command(version)]
struct Cli {
    /// Path to a configuration file
    #[arg(short, long, global = true, env = "ORGCHART_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve,
    /// Build a small hierarchy in memory and print it
    Demo,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&config.logging);

    let result = match cli.command {
        Commands::Serve => run_serve(config).await,
        Commands::Demo => run_demo().await,
    };

    if let Err(e) = result {
        eprintln!("orgchart failed: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run_serve(config: orgchart::AppConfig) -> OrgResult<()> {
    info!(backend = ?config.storage.backend, "starting orgchart");
    let state = AppState::from_config(&config).await?;
    run_http_server(&config.server, state).await
}

// ---------------------------------------------------------------------------
// Demo
// ---------------------------------------------------------------------------

async fn run_demo() -> OrgResult<()> {
    const COMPANY: &str = "demo";

    let state = AppState::in_memory();
    for id in 1..=7 {
        state.membership.enroll(COMPANY, id).await?;
    }

    println!("=== Building hierarchy ===");
    for (supervisor, employee) in [(1, 2), (1, 3), (2, 4), (2, 5), (3, 6)] {
        let outcome = state.hierarchy.try_add_edge(supervisor, employee).await?;
        println!("  {} -> {}: {}", supervisor, employee, outcome.code());
    }

    println!("\n=== Rejected edges ===");
    for (supervisor, employee) in [(3, 2), (4, 1), (6, 6)] {
        let outcome = state.hierarchy.try_add_edge(supervisor, employee).await?;
        println!("  {} -> {}: {}", supervisor, employee, outcome.code());
    }

    println!("\n=== Tree rooted at 1 ===");
    let tree = state.hierarchy.build_employee_tree(1).await?;
    println!("{}", serde_json::to_string_pretty(&tree)?);

    println!("\n=== Chain of command for 5 ===");
    println!("  {:?}", state.hierarchy.chain_of_command(5).await?);

    println!("\n=== Detach 2, attach under 7 ===");
    state.hierarchy.remove_employee_supervisor_edge(2).await?;
    state.hierarchy.add_employee_supervisor_edge(7, 2).await?;
    let tree = state.hierarchy.build_employee_tree(7).await?;
    println!("{}", serde_json::to_string_pretty(&tree)?);

    Ok(())
}
