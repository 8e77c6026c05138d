use crate::models::Location;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_locations")]
    pub locations: Vec<Location>,
    #[serde(default = "default_tracing_level")]
    pub tracing_level: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_target_per_location")]
    pub target_per_location: usize,
    #[serde(default = "default_detail_workers")]
    pub detail_workers: usize,
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Every N-th paced request takes a longer pause.
    #[serde(default = "default_long_pause_every")]
    pub long_pause_every: usize,
    #[serde(default = "default_long_pause_ms")]
    pub long_pause_ms: u64,
    #[serde(default = "default_out_dir")]
    pub out_dir: String,
    /// Browser-exported cookie file for the authenticated contact session.
    #[serde(default = "default_cookies_file")]
    pub cookies_file: String,
    #[serde(default)]
    pub sheets: Option<SheetsConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    #[serde(default = "default_sheets_token_file")]
    pub token_file: String,
}

fn default_tracing_level() -> String {
    "info".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36".to_string()
}

fn default_max_pages() -> u32 {
    5
}

fn default_target_per_location() -> usize {
    50
}

fn default_detail_workers() -> usize {
    3
}

fn default_fetch_retries() -> u32 {
    3
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_min_delay_ms() -> u64 {
    300
}

fn default_max_delay_ms() -> u64 {
    800
}

fn default_long_pause_every() -> usize {
    10
}

fn default_long_pause_ms() -> u64 {
    2500
}

fn default_out_dir() -> String {
    "output".to_string()
}

fn default_cookies_file() -> String {
    "data/cookies.json".to_string()
}

fn default_sheets_token_file() -> String {
    "data/google_token.json".to_string()
}

fn olx_location(key: &str, name: &str, slug: &str) -> Location {
    Location {
        key: key.to_string(),
        name: name.to_string(),
        url: format!("https://www.olx.com.pk/{}/cars_c84", slug),
        enabled: true,
    }
}

fn default_locations() -> Vec<Location> {
    vec![
        olx_location("johar_town", "Johar Town", "johar-town_g4060704"),
        olx_location("model_town", "Model Town", "model-town_g4060717"),
        olx_location("dha_defence", "DHA Defence", "dha-defence_g4060688"),
        olx_location("gulberg", "Gulberg", "gulberg_g4060697"),
        olx_location("bahria_town", "Bahria Town", "bahria-town_g4060672"),
        olx_location("clifton", "Clifton", "clifton_g4060773"),
        olx_location("gulshan_e_iqbal", "Gulshan-e-Iqbal", "gulshan-e-iqbal_g4060781"),
    ]
}

const CONFIG_PATH: &str = "data/config.yaml";

impl Config {
    pub fn load() -> Result<Self> {
        let mut config: Config = if let Ok(config_str) = fs::read_to_string(CONFIG_PATH) {
            serde_yaml::from_str(&config_str)
                .with_context(|| format!("failed to parse {}", CONFIG_PATH))?
        } else {
            Config::default()
        };

        // Override with environment variables if present
        if let Ok(level) = env::var("TRACING_LEVEL") {
            config.tracing_level = level;
        }

        if let Ok(user_agent) = env::var("USER_AGENT") {
            config.user_agent = user_agent;
        }

        if let Ok(max_pages) = env::var("MAX_PAGES") {
            config.max_pages = max_pages
                .parse()
                .context("Failed to parse MAX_PAGES environment variable")?;
        }

        if let Ok(target) = env::var("TARGET_PER_LOCATION") {
            config.target_per_location = target
                .parse()
                .context("Failed to parse TARGET_PER_LOCATION environment variable")?;
        }

        if let Ok(workers) = env::var("DETAIL_WORKERS") {
            config.detail_workers = workers
                .parse()
                .context("Failed to parse DETAIL_WORKERS environment variable")?;
        }

        if let Ok(out_dir) = env::var("OUT_DIR") {
            config.out_dir = out_dir;
        }

        if let Ok(cookies_file) = env::var("COOKIES_FILE") {
            config.cookies_file = cookies_file;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn create_default() -> Result<()> {
        fs::create_dir_all("data")?;
        let config_str = serde_yaml::to_string(&Config::default())?;
        fs::write(CONFIG_PATH, config_str)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.locations.is_empty() {
            anyhow::bail!("at least one location must be configured");
        }

        let mut seen = std::collections::HashSet::new();
        for location in &self.locations {
            if location.key.trim().is_empty() {
                anyhow::bail!("location with empty key in config");
            }
            if !seen.insert(location.key.as_str()) {
                anyhow::bail!("duplicate location key '{}' in config", location.key);
            }
            if location.url.trim().is_empty() {
                anyhow::bail!("location '{}' has an empty URL", location.key);
            }
        }

        if self.max_pages == 0 {
            anyhow::bail!("max_pages must be at least 1");
        }

        if self.target_per_location == 0 {
            anyhow::bail!("target_per_location must be at least 1");
        }

        if self.detail_workers == 0 {
            anyhow::bail!("detail_workers must be at least 1");
        }

        if self.min_delay_ms > self.max_delay_ms {
            anyhow::bail!(
                "min_delay_ms ({}) must not exceed max_delay_ms ({})",
                self.min_delay_ms,
                self.max_delay_ms
            );
        }

        Ok(())
    }

    /// Look up a configured location by key.
    pub fn location(&self, key: &str) -> Option<&Location> {
        self.locations.iter().find(|l| l.key == key)
    }

    /// Keys of all enabled locations, in config order.
    pub fn enabled_location_keys(&self) -> Vec<String> {
        self.locations
            .iter()
            .filter(|l| l.enabled)
            .map(|l| l.key.clone())
            .collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            locations: default_locations(),
            tracing_level: default_tracing_level(),
            user_agent: default_user_agent(),
            max_pages: default_max_pages(),
            target_per_location: default_target_per_location(),
            detail_workers: default_detail_workers(),
            fetch_retries: default_fetch_retries(),
            request_timeout_secs: default_request_timeout_secs(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            long_pause_every: default_long_pause_every(),
            long_pause_ms: default_long_pause_ms(),
            out_dir: default_out_dir(),
            cookies_file: default_cookies_file(),
            sheets: None,
        }
    }
}
