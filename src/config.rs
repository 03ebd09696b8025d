use std::env;

use crate::worker::WorkerConfig;

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub short_sleep_ms: u64,
    pub medium_sleep_ms: u64,
    pub settle_sleep_ms: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_path: String,
    pub db_path: String,
    pub blob_path: String,
    pub concurrency: usize,
    pub batch_delay_ms: u64,
    pub max_attempts: i64,
    pub backoff_base_ms: i64,
    pub poll: PollConfig,
    pub upload_token: String,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let data_path = env::var("EMOJI_VAULT_DATA_PATH").unwrap_or_else(|_| "./data".to_string());
        let db_path = env::var("EMOJI_VAULT_DB_PATH")
            .unwrap_or_else(|_| format!("{data_path}/database/emoji-vault.db"));
        let blob_path = env::var("EMOJI_VAULT_BLOB_PATH")
            .unwrap_or_else(|_| format!("{data_path}/images"));

        Ok(Config {
            port: env::var("EMOJI_VAULT_PORT")
                .unwrap_or_else(|_| "18473".to_string())
                .parse()?,
            data_path,
            db_path,
            blob_path,
            concurrency: env::var("EMOJI_VAULT_CONCURRENCY")
                .unwrap_or_else(|_| "2".to_string())
                .parse()?,
            batch_delay_ms: env::var("EMOJI_VAULT_BATCH_DELAY_MS")
                .unwrap_or_else(|_| "250".to_string())
                .parse()?,
            max_attempts: env::var("EMOJI_VAULT_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
            backoff_base_ms: env::var("EMOJI_VAULT_BACKOFF_BASE_MS")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()?,
            poll: PollConfig {
                short_sleep_ms: env::var("EMOJI_VAULT_POLL_SHORT_SLEEP_MS")
                    .unwrap_or_else(|_| "500".to_string())
                    .parse()?,
                medium_sleep_ms: env::var("EMOJI_VAULT_POLL_MEDIUM_SLEEP_MS")
                    .unwrap_or_else(|_| "2000".to_string())
                    .parse()?,
                settle_sleep_ms: env::var("EMOJI_VAULT_POLL_SETTLE_SLEEP_MS")
                    .unwrap_or_else(|_| "200".to_string())
                    .parse()?,
            },
            upload_token: env::var("EMOJI_VAULT_UPLOAD_TOKEN").unwrap_or_default(),
        })
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            concurrency: self.concurrency,
            batch_delay_ms: self.batch_delay_ms,
            max_attempts: self.max_attempts,
            backoff_base_ms: self.backoff_base_ms,
            poll_short_sleep_ms: self.poll.short_sleep_ms,
            poll_medium_sleep_ms: self.poll.medium_sleep_ms,
            poll_settle_sleep_ms: self.poll.settle_sleep_ms,
        }
    }
}
