use serde::Deserialize;
use std::fs;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite database holding observations and derived records.
    pub db_path: String,
    /// Upper bound on products recomputed concurrently per region.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    /// Regions to recompute; empty means every region known to the store.
    #[serde(default)]
    pub regions: Vec<String>,
}

fn default_max_parallel() -> usize {
    8
}

pub fn load_config(path: &str) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    Ok(config)
}
