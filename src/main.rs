mod config;
mod contacts;
mod detail;
mod error;
mod export;
mod extract;
mod http_client;
mod list_page;
mod models;
mod orchestrator;
mod pacing;
mod sheets;
mod tracker;

use anyhow::Result;
use clap::Parser;
use config::Config;
use orchestrator::{Orchestrator, RunRequest};

#[derive(Parser, Debug)]
#[command(name = "carfinder")]
#[command(about = "Collects car listings from OLX Pakistan by area", long_about = None)]
struct Args {
    /// Comma-separated location keys to scrape (default: all enabled)
    #[arg(long)]
    locations: Option<String>,

    /// Maximum result pages per location
    #[arg(long)]
    max_pages: Option<u32>,

    /// Target number of listings per location
    #[arg(long)]
    target: Option<usize>,

    /// Fetch seller contact info (requires browser-exported cookies)
    #[arg(long)]
    contacts: bool,

    /// Output directory for TSV/JSON exports
    #[arg(long)]
    out_dir: Option<String>,

    /// Print configured locations and exit
    #[arg(long)]
    list_locations: bool,

    /// Test URL fetching - fetch and print HTML from a URL
    #[arg(long)]
    test_url: Option<String>,

    /// Save HTML to file when using --test-url
    #[arg(long)]
    save_html: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle test-url command
    if let Some(url) = args.test_url {
        return test_url_fetch(&url, args.save_html.as_deref()).await;
    }

    // Load or create config first (before logging is initialized)
    if !std::path::Path::new("data/config.yaml").exists() {
        eprintln!("No config file found, creating default data/config.yaml");
        Config::create_default()?;
    }
    let mut config = Config::load()?;

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

    if args.list_locations {
        println!("Configured locations:");
        for location in &config.locations {
            let flag = if location.enabled { " " } else { "x" };
            println!("  [{}] {:20} {:24} {}", flag, location.key, location.name, location.url);
        }
        return Ok(());
    }

    let location_keys = match &args.locations {
        Some(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => config.enabled_location_keys(),
    };

    if let Some(out_dir) = args.out_dir {
        config.out_dir = out_dir;
    }

    let request = RunRequest {
        location_keys,
        max_pages: args.max_pages.unwrap_or(config.max_pages),
        target_per_location: args.target.unwrap_or(config.target_per_location),
        fetch_contacts: args.contacts,
    };

    tracing::info!(
        "Starting carfinder: {} locations, target {}, max {} pages",
        request.location_keys.len(),
        request.target_per_location,
        request.max_pages
    );

    let orchestrator = Orchestrator::new(config);
    let outcome = orchestrator.run(request).await?;

    // Final summary
    let state = orchestrator.tracker().snapshot().await;
    println!();
    println!("Run complete: {} records collected", state.records_collected);
    for summary in &state.locations {
        println!(
            "  {:20} {:3}/{} collected ({} degraded)",
            summary.name, summary.collected, summary.requested, summary.degraded
        );
    }
    if !state.warnings.is_empty() {
        println!("  {} warnings (see log above)", state.warnings.len());
    }
    if let Some(path) = &outcome.tsv_path {
        println!("  TSV:   {}", path.display());
    }
    if let Some(path) = &outcome.json_path {
        println!("  JSON:  {}", path.display());
    }
    if let Some(url) = &outcome.sheet_url {
        println!("  Sheet: {}", url);
    }

    Ok(())
}

/// Test URL fetching - downloads and prints the HTML response
async fn test_url_fetch(url: &str, save_path: Option<&str>) -> Result<()> {
    println!("Testing URL fetch: {}", url);
    println!("{}", "=".repeat(80));

    // Try to load config for user agent, otherwise use defaults
    let config = Config::load().unwrap_or_default();
    println!("User-Agent: {}", config.user_agent);

    let client = http_client::create_http_client(&config.user_agent, config.request_timeout_secs)?;

    println!("Sending request...");
    let response = client.get(url).send().await?;

    println!("Status: {}", response.status());
    println!("\nResponse Headers:");
    for (name, value) in response.headers() {
        println!("  {}: {:?}", name, value);
    }

    println!("{}", "=".repeat(80));

    let body = response.text().await?;

    if let Some(path) = save_path {
        std::fs::write(path, &body)?;
        println!("HTML saved to: {}", path);
    } else {
        println!("{}", body);
    }

    println!("{}", "=".repeat(80));
    println!("Total length: {} bytes", body.len());

    // Check for common CAPTCHA indicators
    let lower_body = body.to_lowercase();
    if lower_body.contains("captcha") || lower_body.contains("cloudflare") {
        println!("\nWARNING: Response may contain CAPTCHA or anti-bot protection!");
        println!("Consider:");
        println!("  - Increasing min_delay_ms/max_delay_ms in config");
        println!("  - Changing user_agent in config");
        println!("  - Using a different IP/proxy");
    }

    Ok(())
}
