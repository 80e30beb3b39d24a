use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};
use uptime_guard::{
    App,
    config::Config,
    endpoints::EndpointStore,
};

/// Uptime monitoring for HTTP(S) endpoints with Telegram alerts
#[derive(Debug, Clone, Parser)]
#[command(name = "uptime-guard", version, about)]
struct Args {
    /// Config file (JSON); defaults apply when omitted
    #[arg(short, long)]
    file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run the scheduler until Ctrl-C
    Run,

    /// Probe every endpoint once and print the result
    Check,

    /// Send a test message through the alert transport
    TestAlert,

    /// Purge log lines older than the retention window
    CleanupLogs,

    /// Show alert configuration and notification state
    Status,

    /// Forget notification state for one URL, or for all endpoints
    ClearState {
        url: Option<String>,
    },

    /// Manage the endpoint list
    Sites {
        #[command(subcommand)]
        command: SitesCommand,
    },
}

#[derive(Debug, Clone, Subcommand)]
enum SitesCommand {
    /// List configured endpoints
    List,

    /// Add an endpoint
    Add {
        name: String,
        url: String,

        /// Content keywords (comma-separated); the endpoint is up if any appears in the body
        #[arg(short, long, value_delimiter = ',')]
        keywords: Vec<String>,
    },

    /// Remove the endpoint at the given index
    Remove { index: usize },
}

fn init() {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("uptime_guard", LevelFilter::DEBUG),
        ("uptime_guard::checks", LevelFilter::INFO),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = Config::load(args.file.as_deref())?;
    let app = App::from_config(config)?;
    let console = app.console();

    match args.command {
        Command::Run => {
            let scheduler = app.spawn_scheduler();
            info!(
                "monitoring endpoints from {} every {:?}",
                app.config().sites_file.display(),
                app.config().interval()
            );

            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for Ctrl-C")?;

            info!("shutting down");
            scheduler.shutdown().await;
        }
        Command::Check => {
            let report = app.engine().run_cycle(&CancellationToken::new()).await;
            println!("{}", console.status_table().await);
            println!(
                "{} probed, {} up, {} down, {} alerts sent, {} alert failures",
                report.probed, report.up, report.down, report.alerts_sent, report.alert_failures
            );
        }
        Command::TestAlert => println!("{}", console.test_alert_transport().await),
        Command::CleanupLogs => println!("{}", console.force_log_cleanup()),
        Command::Status => {
            print!("{}", console.status_report().await);
            println!("{}", console.inspect_notification_state());
        }
        Command::ClearState { url } => {
            println!("{}", console.clear_notification_state(url.as_deref()))
        }
        Command::Sites { command } => match command {
            SitesCommand::List => {
                let endpoints = app.store().load().await?;
                if endpoints.is_empty() {
                    println!("no endpoints configured");
                }
                for (index, endpoint) in endpoints.iter().enumerate() {
                    if endpoint.keywords.is_empty() {
                        println!("{index}: {} {}", endpoint.name, endpoint.url);
                    } else {
                        println!(
                            "{index}: {} {} (keywords: {})",
                            endpoint.name,
                            endpoint.url,
                            endpoint.keywords.join(", ")
                        );
                    }
                }
            }
            SitesCommand::Add {
                name,
                url,
                keywords,
            } => {
                let endpoints = app.store().add(&name, &url, keywords).await?;
                println!("added {name} ({} endpoints configured)", endpoints.len());
            }
            SitesCommand::Remove { index } => println!("{}", console.remove_endpoint(index).await),
        },
    }

    Ok(())
}
