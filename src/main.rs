mod config;
mod decoders;
mod enrich;
mod error;
mod http_client;
mod matcher;
mod models;
mod notify;
mod paginate;
mod reconcile;
mod runner;
mod snapshot;

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;

use config::Config;
use http_client::{Fetch, HttpFetcher};
use notify::{Notifier, PushoverNotifier};
use runner::SubSiteRunner;
use snapshot::SnapshotStore;

#[derive(Parser, Debug)]
#[command(name = "figwatch")]
#[command(about = "Stock monitor for collectible figure sale pages", long_about = None)]
struct Args {
    /// Test URL fetching - fetch and print the body of a URL
    #[arg(long)]
    test_url: Option<String>,

    /// Save HTML to file when using --test-url
    #[arg(long)]
    save_html: Option<String>,

    /// Parse a configured service's entry page and print the figures found
    #[arg(long)]
    test_decoder: Option<String>,

    /// Run a single poll cycle for every sub-site, then exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load or create config first (before logging is initialized)
    let config = if std::path::Path::new("data/config.yaml").exists() {
        Config::load()?
    } else {
        eprintln!("No config file found, creating default data/config.yaml");
        Config::create_default()?;
        eprintln!("Please edit data/config.yaml with your Pushover keys and sites");
        return Ok(());
    };

    // Initialize logging - use RUST_LOG env var if set, otherwise use config
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();
        tracing::info!("Logging level set from RUST_LOG environment variable");
    } else {
        let level = config.tracing_level.to_lowercase();
        let max_level = match level.as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "info" => tracing::Level::INFO,
            "warn" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => {
                eprintln!("Invalid tracing level '{}', using 'info'", level);
                tracing::Level::INFO
            }
        };

        tracing_subscriber::fmt().with_max_level(max_level).init();

        tracing::info!("Logging level set to: {} (from data/config.yaml)", level);
    }

    if let Some(url) = args.test_url {
        return test_url_fetch(&config, &url, args.save_html.as_deref()).await;
    }

    if let Some(service) = args.test_decoder {
        return test_decoder(&config, &service).await;
    }

    tracing::info!("Starting figwatch...");

    if config.pushover_token == "YOUR_PUSHOVER_APP_TOKEN" || config.pushover_user == "YOUR_PUSHOVER_USER_KEY" {
        tracing::error!("Please set your Pushover token and user key in data/config.yaml");
        return Ok(());
    }

    let client = http_client::create_http_client(&config.user_agent)?;
    let fetcher: Arc<dyn Fetch> = Arc::new(HttpFetcher::new(
        client.clone(),
        config.fetch_retries,
        config.fetch_backoff_ms,
    ));
    let notifier: Arc<dyn Notifier> = Arc::new(PushoverNotifier::new(
        client,
        config.pushover_token.clone(),
        config.pushover_user.clone(),
    ));
    let snapshots = SnapshotStore::new("data/snapshots");

    let mut runners = Vec::new();
    for site in &config.sites {
        for sub_index in 0..site.sub_sites.len() {
            runners.push(SubSiteRunner::build(
                site,
                sub_index,
                config.page_concurrency,
                config.detail_concurrency,
                &snapshots,
            )?);
        }
    }
    tracing::info!("Monitoring {} sub-sites", runners.len());

    if args.once {
        runner::run_all_once(&mut runners, &fetcher, notifier.as_ref(), &snapshots).await
    } else {
        runner::run_loop(runners, fetcher, notifier, snapshots).await
    }
}

/// Test URL fetching - downloads and prints the response body
async fn test_url_fetch(config: &Config, url: &str, save_path: Option<&str>) -> Result<()> {
    println!("Testing URL fetch: {}", url);
    println!("User-Agent: {}", config.user_agent);
    println!("{}", "=".repeat(80));

    let client = http_client::create_http_client(&config.user_agent)?;

    let response = client.get(url).send().await?;
    println!("Status: {}", response.status());
    println!("{}", "=".repeat(80));

    let body = response.text().await?;

    if let Some(path) = save_path {
        std::fs::write(path, &body)?;
        println!("HTML saved to: {}", path);
    } else {
        println!("{}", body);
        println!("{}", "=".repeat(80));
    }

    println!("Total length: {} bytes", body.len());
    Ok(())
}

/// Fetch and parse one configured service's entry page, printing each figure
async fn test_decoder(config: &Config, service_name: &str) -> Result<()> {
    let Some(site) = config
        .sites
        .iter()
        .find(|site| site.service.as_str() == service_name.to_lowercase())
    else {
        eprintln!("No configured site for service '{}'", service_name);
        eprintln!(
            "Configured services: {:?}",
            config.sites.iter().map(|s| s.service.as_str()).collect::<Vec<_>>()
        );
        return Ok(());
    };

    let decoder = decoders::decoder_for(site.service);
    let client = http_client::create_http_client(&config.user_agent)?;
    let fetcher = HttpFetcher::new(client, config.fetch_retries, config.fetch_backoff_ms);

    for sub_site in &site.sub_sites {
        let url = format!("{}{}", site.base_url, sub_site.url);
        println!("Fetching {}", url);

        let html = match &sub_site.local_file {
            Some(path) => std::fs::read_to_string(path)?,
            None => fetcher.fetch(&url).await?,
        };

        let page = decoder.parse_page(&html, &url)?;
        println!("Found {} figures (pagination: {:?})", page.figures.len(), page.pagination);
        println!("{}", "=".repeat(80));

        for (index, figure) in page.figures.iter().enumerate() {
            println!("\nFigure #{}", index + 1);
            println!("Name: {}", figure.name);
            println!("Price: {}", figure.price);
            println!("Condition: {:?}", figure.condition());
            println!("Link: {}", figure.link);
            println!("Picture: {}", figure.pic_link);
            println!("{}", "-".repeat(80));
        }
    }

    Ok(())
}
