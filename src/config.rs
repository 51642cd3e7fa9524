use serde::Deserialize;
use std::collections::HashSet;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub sink: SinkConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    pub endpoints: Vec<EndpointConfig>,
    pub chains: Vec<ChainConfig>,
}

// ============================================================
// Sink Config
// ============================================================

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Postgres,
    Csv,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SinkConfig {
    pub kind: SinkKind,
    pub url: Option<String>,
    pub path: Option<String>,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_table() -> String {
    "oracle_price_history".to_string()
}

fn default_max_connections() -> u32 {
    5
}

// ============================================================
// Fetch Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// How many times a rejected fallback window may be halved. 0 keeps
    /// window failures fatal.
    #[serde(default)]
    pub max_split_depth: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
            max_split_depth: 0,
        }
    }
}

fn default_batch_size() -> u64 {
    300_000
}

fn default_timeout_secs() -> u64 {
    30
}

// ============================================================
// Endpoint & Chain Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct EndpointConfig {
    pub name: String,
    pub rpc_http: String,
    /// First block worth scanning when the full-range query is rejected.
    #[serde(default)]
    pub deployment_floor: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    pub name: String,
    pub assets: Vec<AssetConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AssetConfig {
    pub ticker: String,
    pub endpoint: String,
    pub address: String,
    #[serde(default)]
    pub threshold: f64,
    pub base: String,
    pub heartbeat: f64,
}

impl Config {
    pub fn load(path: &str) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("Failed to read config file '{}': {}", path, e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| eyre::eyre!("Failed to parse config file '{}': {}", path, e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> eyre::Result<()> {
        if self.chains.is_empty() {
            return Err(eyre::eyre!("At least one chain must be configured"));
        }
        if self.fetch.batch_size == 0 {
            return Err(eyre::eyre!("fetch.batch_size must be greater than zero"));
        }
        if !is_identifier(&self.sink.table) {
            return Err(eyre::eyre!("Invalid sink table name '{}'", self.sink.table));
        }
        match self.sink.kind {
            SinkKind::Postgres if self.sink.url.is_none() => {
                return Err(eyre::eyre!("Postgres sink requires sink.url"));
            }
            SinkKind::Csv if self.sink.path.is_none() => {
                return Err(eyre::eyre!("CSV sink requires sink.path"));
            }
            _ => {}
        }

        let endpoints: HashSet<&str> = self.endpoints.iter().map(|e| e.name.as_str()).collect();
        for chain in &self.chains {
            if chain.assets.is_empty() {
                return Err(eyre::eyre!(
                    "Chain '{}' must have at least one asset configured",
                    chain.name
                ));
            }
            for asset in &chain.assets {
                if !is_address(&asset.address) {
                    return Err(eyre::eyre!(
                        "Invalid feed address '{}' for {} on chain '{}'",
                        asset.address,
                        asset.ticker,
                        chain.name
                    ));
                }
                if !endpoints.contains(asset.endpoint.as_str()) {
                    return Err(eyre::eyre!(
                        "Asset {} on chain '{}' references unknown endpoint '{}'",
                        asset.ticker,
                        chain.name,
                        asset.endpoint
                    ));
                }
            }
        }
        Ok(())
    }
}

fn is_address(s: &str) -> bool {
    s.len() == 42
        && s.starts_with("0x")
        && s[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Plain SQL identifier: letters, digits and underscores, not starting with a digit.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
