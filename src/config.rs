use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub node: NodeConfig,
    pub storage: StorageConfig,
    pub limits: UploadLimits,
    /// Base URL that group links are built from
    pub public_base_url: String,
    /// Applied when an upload does not specify an expiration
    pub default_expiration_days: i64,
    /// Enables dangerous operations like purge. Must never be true in production.
    pub test_mode: bool,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_address: String,
    pub data_dir: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding encrypted artifacts
    pub storage_path: String,
}

#[derive(Debug, Clone)]
pub struct UploadLimits {
    /// Maximum plaintext size per file in bytes
    pub max_file_size: u64,
    /// Maximum number of files per upload batch
    pub max_files: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_path: "./files".to_string(),
        }
    }
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_file_size: 1024 * 1024 * 1024, // 1 GiB
            max_files: 2000,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());

        let storage_path =
            std::env::var("STORAGE_PATH").unwrap_or_else(|_| "./files".to_string());

        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        let default_expiration_days = std::env::var("DEFAULT_EXPIRATION_DAYS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(7);

        let max_file_size = std::env::var("MAX_FILE_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1024 * 1024 * 1024); // 1 GiB

        let max_files = std::env::var("MAX_FILES_PER_UPLOAD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(2000);

        let test_mode = std::env::var("TEST_MODE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let config = Config {
            node: NodeConfig {
                bind_address,
                data_dir,
            },
            storage: StorageConfig { storage_path },
            limits: UploadLimits {
                max_file_size,
                max_files,
            },
            public_base_url,
            default_expiration_days,
            test_mode,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.public_base_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "PUBLIC_BASE_URL cannot be empty".to_string(),
            ));
        }

        if self.default_expiration_days <= 0 {
            return Err(ConfigError::ValidationError(
                "DEFAULT_EXPIRATION_DAYS must be positive".to_string(),
            ));
        }

        if self.limits.max_files == 0 {
            return Err(ConfigError::ValidationError(
                "MAX_FILES_PER_UPLOAD must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// The shareable link for a group.
    pub fn group_link(&self, group_id: &str) -> String {
        format!("{}/group/{group_id}", self.public_base_url.trim_end_matches('/'))
    }
}
