use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Export envelope parameters.
///
/// Rotating either value invalidates every envelope exported before the change.
#[derive(Deserialize, Clone)]
pub struct ExportConfig {
    /// Keys both the envelope HMAC and (via SHA-256) the envelope cipher
    pub system_secret: String,
    /// Domain separator placed before the private key inside the envelope
    #[serde(default = "default_padding")]
    pub padding: String,
}

fn default_padding() -> String {
    "wallet-vault-export".to_string()
}

fn default_pool_key() -> String {
    "wallet_pool".to_string()
}

impl std::fmt::Debug for ExportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportConfig")
            .field("system_secret", &"<redacted>")
            .field("padding", &self.padding)
            .finish()
    }
}

/// Root wallet configuration
#[derive(Debug, Deserialize, Clone)]
pub struct WalletConfig {
    /// Key under which the serialized wallet pool is persisted
    #[serde(default = "default_pool_key")]
    pub pool_key: String,
    pub export: ExportConfig,
}

impl WalletConfig {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g. WALLET_VAULT_EXPORT__SYSTEM_SECRET, WALLET_VAULT_POOL_KEY
            .add_source(
                Environment::with_prefix("WALLET_VAULT")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Build a configuration around an explicit export secret, keeping every default.
    pub fn with_secret(system_secret: impl Into<String>) -> Self {
        WalletConfig {
            pool_key: default_pool_key(),
            export: ExportConfig {
                system_secret: system_secret.into(),
                padding: default_padding(),
            },
        }
    }
}
