use config::{Config, ConfigError};
use serde::{Deserialize, Serialize};

/// Scan-span ceiling for a single create pass; bounds runaway scanning when
/// every slot is already funded or erroring.
pub const DEFAULT_SCAN_SPAN: u64 = 1_000;

pub const DEFAULT_FUNDING_AMOUNT: f64 = 2_000.0;
pub const DEFAULT_FEE_MARGIN: f64 = 0.01;

pub const DEFAULT_CREATE_BATCH: u32 = 10;
pub const DEFAULT_TRANSFER_BATCH: u32 = 500;
pub const DEFAULT_LOCK_RETRY_CEILING: u32 = 1_200;
pub const DEFAULT_CREATE_CEILING: u64 = 200_000;
pub const DEFAULT_TRANSFER_CEILING: u64 = 200_100;
pub const DEFAULT_TRANSFER_LEAD_MARGIN: u64 = 0;
pub const DEFAULT_CREATE_ONLY_BATCH: u32 = 10;
pub const DEFAULT_SWEEP_ONLY_BATCH: u32 = 200;
pub const DEFAULT_SWEEP_SCAN_CEILING: u32 = 120;
pub const DEFAULT_PACE_SECS: u64 = 1;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_SETTLE_WAIT_ATTEMPTS: usize = 600;

/// Top-level configuration, loaded from `votemill.toml` (optional) with
/// `VOTEMILL_`-prefixed environment overrides layered on top.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub node: NodeSettings,
    pub accounts: AccountSettings,
    #[serde(default)]
    pub driver: DriverSettings,
    #[serde(default)]
    pub cycle: CyclePolicy,
}

/// Node endpoint and signing configuration shared by every RPC call.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NodeSettings {
    pub rpc_url: String,
    pub passphrase: String,
    #[serde(default)]
    pub fork: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

/// Fixed account triple the slot derivation is keyed on, plus the faucet
/// account funding transfers are drawn from.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AccountSettings {
    pub source_address: String,
    pub owner_address: String,
    pub delegate_id: String,
    #[serde(default)]
    pub reward_mode: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverSettings {
    #[serde(default = "default_funding_amount")]
    pub funding_amount: f64,
    #[serde(default = "default_fee_margin")]
    pub fee_margin: f64,
    #[serde(default = "default_scan_span")]
    pub scan_span: u64,
    #[serde(default = "default_remove_after_sweep")]
    pub remove_after_sweep: bool,
    #[serde(default = "default_settle_wait_attempts")]
    pub settle_wait_attempts: usize,
}

fn default_funding_amount() -> f64 {
    DEFAULT_FUNDING_AMOUNT
}

fn default_fee_margin() -> f64 {
    DEFAULT_FEE_MARGIN
}

fn default_scan_span() -> u64 {
    DEFAULT_SCAN_SPAN
}

fn default_remove_after_sweep() -> bool {
    true
}

fn default_settle_wait_attempts() -> usize {
    DEFAULT_SETTLE_WAIT_ATTEMPTS
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            funding_amount: DEFAULT_FUNDING_AMOUNT,
            fee_margin: DEFAULT_FEE_MARGIN,
            scan_span: DEFAULT_SCAN_SPAN,
            remove_after_sweep: true,
            settle_wait_attempts: DEFAULT_SETTLE_WAIT_ATTEMPTS,
        }
    }
}

/// Scheduler policy. Every knob is tunable; the defaults are the values
/// the long-running workload is normally operated with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CyclePolicy {
    #[serde(default = "default_create_batch")]
    pub create_batch: u32,
    #[serde(default = "default_transfer_batch")]
    pub transfer_batch: u32,
    #[serde(default = "default_lock_retry_ceiling")]
    pub lock_retry_ceiling: u32,
    #[serde(default = "default_create_ceiling")]
    pub create_ceiling: u64,
    #[serde(default = "default_transfer_ceiling")]
    pub transfer_ceiling: u64,
    #[serde(default = "default_transfer_lead_margin")]
    pub transfer_lead_margin: u64,
    #[serde(default = "default_create_only_batch")]
    pub create_only_batch: u32,
    #[serde(default = "default_sweep_only_batch")]
    pub sweep_only_batch: u32,
    #[serde(default = "default_sweep_scan_ceiling")]
    pub sweep_scan_ceiling: u32,
    #[serde(default = "default_pace_secs")]
    pub pace_secs: u64,
}

fn default_create_batch() -> u32 {
    DEFAULT_CREATE_BATCH
}

fn default_transfer_batch() -> u32 {
    DEFAULT_TRANSFER_BATCH
}

fn default_lock_retry_ceiling() -> u32 {
    DEFAULT_LOCK_RETRY_CEILING
}

fn default_create_ceiling() -> u64 {
    DEFAULT_CREATE_CEILING
}

fn default_transfer_ceiling() -> u64 {
    DEFAULT_TRANSFER_CEILING
}

fn default_transfer_lead_margin() -> u64 {
    DEFAULT_TRANSFER_LEAD_MARGIN
}

fn default_create_only_batch() -> u32 {
    DEFAULT_CREATE_ONLY_BATCH
}

fn default_sweep_only_batch() -> u32 {
    DEFAULT_SWEEP_ONLY_BATCH
}

fn default_sweep_scan_ceiling() -> u32 {
    DEFAULT_SWEEP_SCAN_CEILING
}

fn default_pace_secs() -> u64 {
    DEFAULT_PACE_SECS
}

impl Default for CyclePolicy {
    fn default() -> Self {
        Self {
            create_batch: DEFAULT_CREATE_BATCH,
            transfer_batch: DEFAULT_TRANSFER_BATCH,
            lock_retry_ceiling: DEFAULT_LOCK_RETRY_CEILING,
            create_ceiling: DEFAULT_CREATE_CEILING,
            transfer_ceiling: DEFAULT_TRANSFER_CEILING,
            transfer_lead_margin: DEFAULT_TRANSFER_LEAD_MARGIN,
            create_only_batch: DEFAULT_CREATE_ONLY_BATCH,
            sweep_only_batch: DEFAULT_SWEEP_ONLY_BATCH,
            sweep_scan_ceiling: DEFAULT_SWEEP_SCAN_CEILING,
            pace_secs: DEFAULT_PACE_SECS,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(config::File::with_name("votemill").required(false))
            .add_source(config::Environment::with_prefix("VOTEMILL").separator("__"))
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.rpc_url.is_empty() {
            return Err(ConfigError::Message("node.rpc_url is required".to_string()));
        }
        if self.node.passphrase.is_empty() {
            return Err(ConfigError::Message(
                "node.passphrase is required".to_string(),
            ));
        }
        if self.accounts.source_address.is_empty() {
            return Err(ConfigError::Message(
                "accounts.source_address is required".to_string(),
            ));
        }
        if self.accounts.owner_address.is_empty() {
            return Err(ConfigError::Message(
                "accounts.owner_address is required".to_string(),
            ));
        }
        if self.accounts.delegate_id.is_empty() {
            return Err(ConfigError::Message(
                "accounts.delegate_id is required".to_string(),
            ));
        }
        if self.driver.funding_amount <= self.driver.fee_margin {
            return Err(ConfigError::Message(
                "driver.funding_amount must exceed driver.fee_margin".to_string(),
            ));
        }
        Ok(())
    }
}
