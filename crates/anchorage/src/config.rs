//! Service configuration.
//!
//! Loaded from JSON or from the process environment, then resolved into
//! typed settings. Resolution is where every startup check happens; a
//! [`ConfigError`] means the service must not start.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use anchorage_core::Address;
use anchorage_ledger::{
    AccountKey, AnchorSettings, ContractInterface, DEFAULT_GAS_LIMIT, DEFAULT_POLL_INTERVAL,
    DEFAULT_RECEIPT_TIMEOUT,
};
use anchorage_store::DEFAULT_CONTENT_TIMEOUT;

pub const ENV_RPC_URL: &str = "BLOCKCHAIN_RPC_URL";
pub const ENV_CONTRACT_ADDRESS: &str = "CONTRACT_ADDRESS";
pub const ENV_PRIVATE_KEY: &str = "PRIVATE_KEY";
pub const ENV_ACCOUNT_ADDRESS: &str = "ACCOUNT_ADDRESS";
pub const ENV_CONTRACT_ABI_PATH: &str = "CONTRACT_ABI_PATH";
pub const ENV_CHAIN_ID: &str = "CHAIN_ID";
pub const ENV_IPFS_API_URL: &str = "IPFS_API_URL";
pub const ENV_REGISTRY_PATH: &str = "REGISTRY_DB_PATH";

/// Errors detected while loading or resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid {field} {value:?}: expected an http or https url with a host")]
    InvalidUrl { field: &'static str, value: String },

    #[error("invalid {field}: {value:?} is not a 20-byte hex address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("invalid private key")]
    InvalidPrivateKey,

    #[error("account address {configured} does not match private key address {derived}")]
    AccountMismatch { configured: Address, derived: Address },

    #[error("contract interface: {0}")]
    ContractInterface(String),

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed configuration: {0}")]
    Parse(String),

    #[error("invalid {field}: {value:?}")]
    InvalidValue { field: &'static str, value: String },

    #[error("ledger node unreachable: {0}")]
    Unreachable(String),

    #[error("ledger node is on chain {actual}, configured for {expected}")]
    ChainMismatch { expected: u64, actual: u64 },

    #[error("device registry: {0}")]
    Registry(String),

    #[error("content store: {0}")]
    ContentStore(String),
}

/// A string that never appears in `Debug` output.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnchorageConfig {
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub provider_url: String,
    pub contract_address: String,
    pub private_key: Secret,
    #[serde(default)]
    pub account_address: Option<String>,
    pub contract_abi_path: PathBuf,
    /// Expected chain; checked against the node when set.
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContentConfig {
    #[serde(default = "default_ipfs_api_url")]
    pub api_url: String,
    #[serde(default = "default_content_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            api_url: default_ipfs_api_url(),
            timeout_secs: default_content_timeout_secs(),
        }
    }
}

impl ContentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The content API endpoint, checked like the provider url.
    pub fn endpoint(&self) -> Result<Url, ConfigError> {
        parse_http_url("api_url", &self.api_url)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// SQLite file; an in-memory database when unset.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Category recorded with every commitment.
    #[serde(default = "default_data_type")]
    pub data_type: String,
    /// Required device identifier prefix at registration, e.g. `IOT-`.
    #[serde(default)]
    pub device_id_prefix: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_type: default_data_type(),
            device_id_prefix: None,
        }
    }
}

fn default_gas_limit() -> u64 {
    DEFAULT_GAS_LIMIT
}

fn default_receipt_timeout_secs() -> u64 {
    DEFAULT_RECEIPT_TIMEOUT.as_secs()
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

fn default_rpc_timeout_secs() -> u64 {
    30
}

fn default_ipfs_api_url() -> String {
    "http://127.0.0.1:5001".to_string()
}

fn default_content_timeout_secs() -> u64 {
    DEFAULT_CONTENT_TIMEOUT.as_secs()
}

fn default_data_type() -> String {
    "sensor".to_string()
}

impl AnchorageConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = read_file(path)?;
        Self::from_json(&json)
    }

    /// Build from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any name-to-value lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &'static str| lookup(name).filter(|v| !v.trim().is_empty());
        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let chain_id = get(ENV_CHAIN_ID)
            .map(|v| {
                v.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                    field: ENV_CHAIN_ID,
                    value: v,
                })
            })
            .transpose()?;

        Ok(Self {
            ledger: LedgerConfig {
                provider_url: require(ENV_RPC_URL)?,
                contract_address: require(ENV_CONTRACT_ADDRESS)?,
                private_key: Secret::new(require(ENV_PRIVATE_KEY)?),
                account_address: get(ENV_ACCOUNT_ADDRESS),
                contract_abi_path: PathBuf::from(require(ENV_CONTRACT_ABI_PATH)?),
                chain_id,
                gas_limit: default_gas_limit(),
                receipt_timeout_secs: default_receipt_timeout_secs(),
                poll_interval_ms: default_poll_interval_ms(),
                rpc_timeout_secs: default_rpc_timeout_secs(),
            },
            content: ContentConfig {
                api_url: get(ENV_IPFS_API_URL).unwrap_or_else(default_ipfs_api_url),
                ..ContentConfig::default()
            },
            registry: RegistryConfig {
                database_path: get(ENV_REGISTRY_PATH).map(PathBuf::from),
            },
            pipeline: PipelineConfig::default(),
        })
    }
}

/// Ledger settings after every offline check has passed.
#[derive(Debug)]
pub struct ResolvedLedger {
    pub provider_url: Url,
    pub contract: Address,
    pub key: AccountKey,
    pub chain_id: Option<u64>,
    pub interface: ContractInterface,
    pub anchor: AnchorSettings,
    pub rpc_timeout: Duration,
}

impl LedgerConfig {
    /// Validate everything that can be checked without the network.
    pub fn resolve(&self) -> Result<ResolvedLedger, ConfigError> {
        let provider_url = parse_http_url("provider_url", &self.provider_url)?;
        let contract = parse_address("contract_address", &self.contract_address)?;
        let key = AccountKey::from_hex(self.private_key.expose())
            .map_err(|_| ConfigError::InvalidPrivateKey)?;

        if let Some(configured) = &self.account_address {
            let configured = parse_address("account_address", configured)?;
            if configured != key.address() {
                return Err(ConfigError::AccountMismatch {
                    configured,
                    derived: key.address(),
                });
            }
        }

        let abi = read_file(&self.contract_abi_path)?;
        let interface = ContractInterface::parse(&abi)
            .map_err(|e| ConfigError::ContractInterface(e.to_string()))?;
        interface
            .validate()
            .map_err(|e| ConfigError::ContractInterface(e.to_string()))?;

        if self.receipt_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "receipt_timeout_secs",
                value: "0".into(),
            });
        }

        Ok(ResolvedLedger {
            provider_url,
            contract,
            key,
            chain_id: self.chain_id,
            interface,
            anchor: AnchorSettings {
                gas_limit: self.gas_limit,
                receipt_timeout: Duration::from_secs(self.receipt_timeout_secs),
                poll_interval: Duration::from_millis(self.poll_interval_ms),
            },
            rpc_timeout: Duration::from_secs(self.rpc_timeout_secs),
        })
    }
}

fn parse_http_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    let invalid = || ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
    };
    let url = Url::parse(value.trim()).map_err(|_| invalid())?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some_and(|host| !host.is_empty()) => Ok(url),
        _ => Err(invalid()),
    }
}

fn parse_address(field: &'static str, value: &str) -> Result<Address, ConfigError> {
    Address::from_hex(value.trim()).map_err(|_| ConfigError::InvalidAddress {
        field,
        value: value.to_string(),
    })
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
