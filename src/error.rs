//! Failure taxonomy shared across the registry client and local operations

/// Errors returned by registry operations.
///
/// Components that batch over many items absorb these at their boundary and
/// degrade to "no result for this item"; only the CLI surfaces them.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Timeout, connection failure, or non-2xx response
    #[error("registry request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// Response body did not match the expected shape
    #[error("unexpected registry response: {0}")]
    Data(#[from] serde_json::Error),

    /// Non-2xx status with the body already consumed
    #[error("registry returned status {status} for {endpoint}")]
    Status {
        status: reqwest::StatusCode,
        endpoint: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// No download directory has been configured or supplied
    #[error("no download directory configured; set one with `modrover config --download-dir <path>`")]
    NotConfigured,
}
