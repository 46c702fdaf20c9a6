use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trajectory_compiler::config::Config;
use trajectory_compiler::session::{BrowserSession, ChromeDriver};
use trajectory_compiler::types::load_trajectories;
use trajectory_compiler::{CompilationResult, Executor, build, scrape};

#[derive(Parser)]
#[command(name = "trajectory-compiler")]
#[command(about = "Compile recorded browser demonstrations into automation plans")]
#[command(version)]
struct Cli {
    /// Attach to this CDP websocket instead of launching Chrome
    #[arg(long, global = true, env = "BROWSER_CDP_URL")]
    cdp_url: Option<String>,

    /// Show the browser window
    #[arg(long, global = true)]
    headed: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile demonstrations to IR and print it as JSON
    Compile {
        input: PathBuf,
        /// Write the IR here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compile demonstrations and execute them in a browser
    Run { input: PathBuf },
    /// Collect menu items from a store page by capturing its network responses
    Scrape { url: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trajectory_compiler=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if cli.cdp_url.is_some() {
        config.browser.cdp_url = cli.cdp_url.clone();
    }
    if cli.headed {
        config.browser.headless = false;
    }

    match cli.command {
        Command::Compile { input, output } => {
            let compiled = compile(&input)?;
            let json = serde_json::to_string_pretty(&compiled)?;
            match output {
                Some(path) => std::fs::write(&path, json)
                    .with_context(|| format!("writing {}", path.display()))?,
                None => println!("{json}"),
            }
        }
        Command::Run { input } => {
            let compiled = compile(&input)?;
            let cancel = CancellationToken::new();
            spawn_ctrl_c(cancel.clone());

            let report = tokio::task::spawn_blocking(move || -> Result<_> {
                let session = BrowserSession::acquire(&config.browser)?;
                let driver = ChromeDriver::new(session, config.browser.resolve_timeout);
                let mut executor = Executor::new(driver, config.execution, cancel);
                Ok(executor.run(&compiled))
            })
            .await
            .context("executor task panicked")??;

            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.all_completed() {
                anyhow::bail!("not every trajectory completed");
            }
        }
        Command::Scrape { url } => {
            let items = tokio::task::spawn_blocking(move || -> Result<_> {
                let session = BrowserSession::acquire(&config.browser)?;
                scrape::scrape_menu(&session, &url, &config.scrape)
            })
            .await
            .context("scraper task panicked")??;

            println!("{}", serde_json::to_string_pretty(&items)?);
        }
    }

    Ok(())
}

fn compile(input: &Path) -> Result<CompilationResult> {
    let trajectories = load_trajectories(input)?;
    let compiled = build(&trajectories);

    for d in &compiled.diagnostics {
        warn!(position = %d.position, raw = %d.raw, "{}", d.reason);
    }
    info!(
        trajectories = trajectories.len(),
        nodes = compiled.nodes.len(),
        diagnostics = compiled.diagnostics.len(),
        "compiled demonstrations"
    );
    Ok(compiled)
}

/// Cancel between nodes on Ctrl-C; the node in flight finishes first.
fn spawn_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current step");
            cancel.cancel();
        }
    });
}
