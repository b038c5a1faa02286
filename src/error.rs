use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("no identifiers to process")]
    EmptyInput,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,
    #[error("jitter range is inverted: min {min}ms > max {max}ms")]
    InvertedJitter { min: u64, max: u64 },
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
}
