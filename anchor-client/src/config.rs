//! Client configuration.
//!
//! Loaded once from environment variables at startup and immutable
//! afterwards.

use alloy_primitives::Address;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use anchor_connectors::query_api::DEFAULT_TIMEOUT_SECS;
use anchor_domain::{AssetDescriptor, AssetRegistry, LiquidationThreshold, STABLECOIN_DECIMALS};
use anchor_exec::executor::{DEFAULT_POLL_INTERVAL, DEFAULT_READ_TIMEOUT};

use crate::error::{ClientError, ClientResult};

/// Stablecoin ticker.
pub const STABLECOIN_SYMBOL: &str = "AUSD";

/// Stablecoin display name.
pub const STABLECOIN_NAME: &str = "Anchor USD";

// =============================================================================
// Configuration
// =============================================================================

/// Client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Contracts and assets
    pub chain: ChainConfig,

    /// Query API
    pub query_api: QueryApiConfig,

    /// Orchestrator timing
    pub orchestrator: OrchestratorConfig,

    /// Health-factor projector
    pub projector: ProjectorConfig,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// Contract addresses and the asset table.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Collateral engine
    pub engine_address: Address,
    /// Wallet holder; optional for read-only use
    pub account: Option<Address>,
    /// Stablecoin token
    pub stablecoin: AssetDescriptor,
    /// Collateral tokens
    pub collateral: Vec<AssetDescriptor>,
}

/// Query API configuration.
#[derive(Debug, Clone)]
pub struct QueryApiConfig {
    /// Base URL
    pub url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

/// Orchestrator timing.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Delay between receipt lookups
    pub receipt_poll_interval: Duration,
    /// Upper bound on a confirmation wait; `None` waits indefinitely
    pub confirmation_timeout: Option<Duration>,
    /// Upper bound on each allowance read, simulation and receipt lookup
    pub rpc_timeout: Duration,
    /// How long `confirmed`/`failed` stay visible before resetting to `idle`
    pub completion_grace: Duration,
}

/// Projector configuration.
#[derive(Debug, Clone)]
pub struct ProjectorConfig {
    /// Quiet period after the last input change
    pub debounce: Duration,
    /// Threshold for locally derived health factors
    pub liquidation_threshold: LiquidationThreshold,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment (uses stubs)
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> ClientResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup` (variable name → value).
    pub fn from_lookup<F>(lookup: F) -> ClientResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = Self::load_environment(&lookup)?;
        let chain = Self::load_chain_config(&lookup)?;
        let query_api = Self::load_query_api_config(&lookup)?;
        let orchestrator = Self::load_orchestrator_config(&lookup)?;
        let projector = Self::load_projector_config(&lookup)?;

        Ok(Self { chain, query_api, orchestrator, projector, environment })
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            chain: ChainConfig {
                engine_address: Address::repeat_byte(0xee),
                account: Some(Address::repeat_byte(0xac)),
                stablecoin: AssetDescriptor::new(
                    STABLECOIN_SYMBOL,
                    STABLECOIN_NAME,
                    Address::repeat_byte(0xaa),
                    STABLECOIN_DECIMALS,
                ),
                collateral: vec![
                    AssetDescriptor::new("WETH", "Wrapped Ethereum", Address::repeat_byte(0x11), 18),
                    AssetDescriptor::new("WBTC", "Wrapped Bitcoin", Address::repeat_byte(0x22), 8),
                ],
            },
            query_api: QueryApiConfig {
                url: "http://127.0.0.1:0".to_string(),
                timeout: Duration::from_secs(1),
            },
            orchestrator: OrchestratorConfig {
                receipt_poll_interval: Duration::from_millis(10),
                confirmation_timeout: None,
                rpc_timeout: Duration::from_secs(5),
                completion_grace: Duration::from_millis(2000),
            },
            projector: ProjectorConfig {
                debounce: Duration::from_millis(500),
                liquidation_threshold: LiquidationThreshold::default(),
            },
            environment: Environment::Test,
        }
    }

    /// Build the immutable asset registry.
    pub fn asset_registry(&self) -> ClientResult<AssetRegistry> {
        AssetRegistry::new(self.chain.stablecoin.clone(), self.chain.collateral.clone())
            .map_err(|e| ClientError::Config(e.to_string()))
    }

    /// The wallet account, required for anything that signs or projects.
    pub fn require_account(&self) -> ClientResult<Address> {
        self.chain
            .account
            .ok_or_else(|| ClientError::Config("ANCHOR_ACCOUNT_ADDRESS is not set".to_string()))
    }

    fn load_environment<F: Fn(&str) -> Option<String>>(lookup: &F) -> ClientResult<Environment> {
        let env_str = lookup("ANCHOR_ENV").unwrap_or_else(|| "development".to_string());

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(ClientError::Config(format!(
                "Invalid ANCHOR_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }

    fn load_chain_config<F: Fn(&str) -> Option<String>>(lookup: &F) -> ClientResult<ChainConfig> {
        let engine_address = Self::require_address(lookup, "ANCHOR_ENGINE_ADDRESS")?;
        let stablecoin_address = Self::require_address(lookup, "ANCHOR_STABLECOIN_ADDRESS")?;
        let account = match lookup("ANCHOR_ACCOUNT_ADDRESS") {
            Some(value) => Some(parse_address("ANCHOR_ACCOUNT_ADDRESS", &value)?),
            None => None,
        };

        let symbols = split_list(lookup("ANCHOR_COLLATERAL_SYMBOLS"));
        let addresses = split_list(lookup("ANCHOR_COLLATERAL_ADDRESSES"));
        let names = split_list(lookup("ANCHOR_COLLATERAL_NAMES"));
        let decimals = split_list(lookup("ANCHOR_COLLATERAL_DECIMALS"));

        if symbols.len() != addresses.len() {
            return Err(ClientError::Config(format!(
                "ANCHOR_COLLATERAL_SYMBOLS has {} entries but ANCHOR_COLLATERAL_ADDRESSES has {}",
                symbols.len(),
                addresses.len()
            )));
        }
        for (key, list) in [("ANCHOR_COLLATERAL_NAMES", &names), ("ANCHOR_COLLATERAL_DECIMALS", &decimals)] {
            if !list.is_empty() && list.len() != symbols.len() {
                return Err(ClientError::Config(format!(
                    "{} has {} entries, expected {}",
                    key,
                    list.len(),
                    symbols.len()
                )));
            }
        }

        let mut collateral = Vec::with_capacity(symbols.len());
        for (i, symbol) in symbols.iter().enumerate() {
            let address = parse_address("ANCHOR_COLLATERAL_ADDRESSES", &addresses[i])?;
            let name = names.get(i).cloned().unwrap_or_else(|| symbol.clone());
            let precision = match decimals.get(i) {
                Some(raw) => raw.parse::<u8>().map_err(|_| {
                    ClientError::Config(format!("Invalid ANCHOR_COLLATERAL_DECIMALS value: {}", raw))
                })?,
                None => 18,
            };
            collateral.push(AssetDescriptor::new(symbol.clone(), name, address, precision));
        }

        Ok(ChainConfig {
            engine_address,
            account,
            stablecoin: AssetDescriptor::new(
                STABLECOIN_SYMBOL,
                STABLECOIN_NAME,
                stablecoin_address,
                STABLECOIN_DECIMALS,
            ),
            collateral,
        })
    }

    fn load_query_api_config<F: Fn(&str) -> Option<String>>(
        lookup: &F,
    ) -> ClientResult<QueryApiConfig> {
        let url = lookup("ANCHOR_QUERY_API_URL").unwrap_or_else(|| "http://localhost:8080".to_string());
        let timeout = Self::load_u64(lookup, "ANCHOR_QUERY_API_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;

        Ok(QueryApiConfig { url, timeout: Duration::from_secs(timeout) })
    }

    fn load_orchestrator_config<F: Fn(&str) -> Option<String>>(
        lookup: &F,
    ) -> ClientResult<OrchestratorConfig> {
        let poll_ms = Self::load_u64(
            lookup,
            "ANCHOR_RECEIPT_POLL_MS",
            DEFAULT_POLL_INTERVAL.as_millis() as u64,
        )?;
        let grace_ms = Self::load_u64(lookup, "ANCHOR_COMPLETION_GRACE_MS", 2000)?;
        let rpc_timeout_secs = Self::load_u64(
            lookup,
            "ANCHOR_RPC_TIMEOUT_SECS",
            DEFAULT_READ_TIMEOUT.as_secs(),
        )?;
        let confirmation_timeout = match lookup("ANCHOR_CONFIRMATION_TIMEOUT_SECS") {
            Some(raw) => Some(Duration::from_secs(raw.parse::<u64>().map_err(|_| {
                ClientError::Config(format!("Invalid ANCHOR_CONFIRMATION_TIMEOUT_SECS value: {}", raw))
            })?)),
            None => None,
        };

        if poll_ms == 0 {
            return Err(ClientError::Config("ANCHOR_RECEIPT_POLL_MS must be positive".to_string()));
        }
        if rpc_timeout_secs == 0 {
            return Err(ClientError::Config("ANCHOR_RPC_TIMEOUT_SECS must be positive".to_string()));
        }

        Ok(OrchestratorConfig {
            receipt_poll_interval: Duration::from_millis(poll_ms),
            confirmation_timeout,
            rpc_timeout: Duration::from_secs(rpc_timeout_secs),
            completion_grace: Duration::from_millis(grace_ms),
        })
    }

    fn load_projector_config<F: Fn(&str) -> Option<String>>(
        lookup: &F,
    ) -> ClientResult<ProjectorConfig> {
        let debounce_ms = Self::load_u64(lookup, "ANCHOR_PROJECTION_DEBOUNCE_MS", 500)?;
        let threshold = Self::load_u64(lookup, "ANCHOR_LIQUIDATION_THRESHOLD", 50)?;
        let liquidation_threshold = LiquidationThreshold::from_percent(threshold)
            .map_err(|e| ClientError::Config(format!("ANCHOR_LIQUIDATION_THRESHOLD: {}", e)))?;

        Ok(ProjectorConfig { debounce: Duration::from_millis(debounce_ms), liquidation_threshold })
    }

    fn require_address<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str) -> ClientResult<Address> {
        let value = lookup(key).ok_or_else(|| ClientError::Config(format!("{} is not set", key)))?;
        parse_address(key, &value)
    }

    fn load_u64<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: u64) -> ClientResult<u64> {
        match lookup(key) {
            Some(val) => val
                .trim()
                .parse::<u64>()
                .map_err(|_| ClientError::Config(format!("Invalid {} value: {}", key, val))),
            None => Ok(default),
        }
    }
}

fn parse_address(key: &str, value: &str) -> ClientResult<Address> {
    Address::from_str(value.trim())
        .map_err(|_| ClientError::Config(format!("Invalid {} value: {}", key, value)))
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .map(|raw| {
            raw.split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chain: ChainConfig {
                engine_address: Address::ZERO,
                account: None,
                stablecoin: AssetDescriptor::new(
                    STABLECOIN_SYMBOL,
                    STABLECOIN_NAME,
                    Address::ZERO,
                    STABLECOIN_DECIMALS,
                ),
                collateral: Vec::new(),
            },
            query_api: QueryApiConfig {
                url: "http://localhost:8080".to_string(),
                timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            },
            orchestrator: OrchestratorConfig {
                receipt_poll_interval: DEFAULT_POLL_INTERVAL,
                confirmation_timeout: None,
                rpc_timeout: DEFAULT_READ_TIMEOUT,
                completion_grace: Duration::from_millis(2000),
            },
            projector: ProjectorConfig {
                debounce: Duration::from_millis(500),
                liquidation_threshold: LiquidationThreshold::default(),
            },
            environment: Environment::Development,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
