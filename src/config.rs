use anyhow::Result;
use dotenvy::dotenv;
use serde::Deserialize;

// 10 MB in bytes
const DEFAULT_MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub max_file_size: usize,
    pub openai_key: String,
}

pub fn load_config() -> Result<Config> {
    // Load .env file first
    dotenv().ok();

    let openai_key = std::env::var("OPENAI_API_KEY")
        .map_err(|e| anyhow::anyhow!("Failed to load OPENAI_API_KEY: {}", e))?;

    let max_file_size = std::env::var("MAX_FILE_SIZE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_MAX_FILE_SIZE);

    Ok(Config {
        max_file_size,
        openai_key,
    })
}
