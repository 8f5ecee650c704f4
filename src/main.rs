use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;
use url::Url;

use feedbell::commands::{Commands, Reply};
use feedbell::config::Config;
use feedbell::feed::{build_client, CrawlSettings};
use feedbell::notify::{Delivery, LogDelivery, WebhookDelivery};
use feedbell::shutdown::Shutdown;
use feedbell::storage::Database;
use feedbell::util::HostPolicy;
use feedbell::{scheduler, FeedService, ServiceSettings};

/// Get the config directory path (~/.config/feedbell/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feedbell"))
}

#[derive(Parser, Debug)]
#[command(name = "feedbell", about = "Polls feeds and announces new items to subscribed channels")]
struct Args {
    /// Config file (default: ~/.config/feedbell/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run crawl and notify cycles until Ctrl-C, serving command lines
    /// from stdin (e.g. `complete <server> go`)
    Run,
    /// Run one crawl cycle
    Crawl,
    /// Run one notify cycle
    Notify,
    /// Subscribe a collection to a feed
    Subscribe {
        #[arg(long)]
        server: String,
        #[arg(long)]
        channel: String,
        #[arg(long)]
        collection: String,
        /// Feed URL
        link: String,
    },
    /// Remove a collection
    Unsubscribe {
        #[arg(long)]
        server: String,
        collection: String,
    },
    /// Print the newest item of a collection
    Test {
        #[arg(long)]
        server: String,
        collection: String,
    },
    /// Suggest collection names matching a query
    Complete {
        #[arg(long)]
        server: String,
        #[arg(default_value = "")]
        query: String,
    },
    /// List a server's subscriptions
    List {
        #[arg(long)]
        server: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    tracing::debug!(config = ?config, "Effective configuration");

    let db_path = match &config.database_path {
        Some(path) => path.clone(),
        None => {
            std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
            config_dir.join("feedbell.db")
        }
    };
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = Database::open(db_path_str)
        .await
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    let host_policy = HostPolicy::from_allow_private(config.allow_private_hosts);
    let client = build_client(host_policy).context("Failed to build HTTP client")?;
    let delivery = build_delivery(&config, client.clone())?;
    let settings = ServiceSettings {
        crawl: CrawlSettings {
            timeout: config.http_timeout(),
            default_cache_secs: config.default_cache_secs,
        },
        rate_interval: config.rate_interval(),
        autocomplete_ttl: config.autocomplete_ttl(),
        autocomplete_max_results: config.autocomplete_max_results,
    };
    let service = FeedService::new(db, client, delivery, settings);

    let shutdown = Shutdown::new();
    let signal = shutdown.subscribe();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown requested");
                shutdown.trigger();
            }
            Err(e) => tracing::warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    let commands = Commands::new(&service, host_policy);

    match args.command {
        Command::Run => {
            scheduler::run(
                &commands,
                config.crawl_interval(),
                config.notify_interval(),
                BufReader::new(tokio::io::stdin()),
                tokio::io::stdout(),
                signal,
            )
            .await;
        }
        Command::Crawl => {
            let report = service
                .refresh_feeds(Utc::now())
                .await
                .context("Crawl cycle failed")?;
            println!(
                "Crawled {} feeds: {} failed, {} new articles",
                report.ready, report.failed, report.inserted
            );
        }
        Command::Notify => {
            let report = service
                .announce(&signal)
                .await
                .context("Notify cycle failed")?;
            println!(
                "{} pending: {} delivered, {} failed",
                report.pending, report.delivered, report.failed
            );
        }
        Command::Subscribe {
            server,
            channel,
            collection,
            link,
        } => {
            print_reply(commands.subscribe(&server, &channel, &collection, &link).await);
        }
        Command::Unsubscribe { server, collection } => {
            print_reply(commands.unsubscribe(&server, &collection).await);
        }
        Command::Test { server, collection } => {
            print_reply(commands.test(&server, &collection, &signal).await);
        }
        Command::Complete { server, query } => {
            print_reply(commands.complete(&server, &query).await);
        }
        Command::List { server } => {
            print_reply(commands.list(&server).await);
        }
    }

    Ok(())
}

fn build_delivery(config: &Config, client: reqwest::Client) -> Result<Arc<dyn Delivery>> {
    let Some(raw_url) = &config.webhook_url else {
        tracing::info!("No webhook_url configured, notifications are logged only");
        return Ok(Arc::new(LogDelivery));
    };
    let url = Url::parse(raw_url).context("Invalid webhook_url")?;
    Ok(Arc::new(WebhookDelivery::new(
        client,
        url,
        config.webhook_token(),
        config.http_timeout(),
    )))
}

fn print_reply(reply: Reply) {
    if reply.is_error {
        eprintln!("{}", reply.text);
        std::process::exit(1);
    }
    println!("{}", reply.text);
}
