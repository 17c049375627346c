//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! The tariff policy is carried as an explicit immutable value handed to the
//! fee calculator; there is no module-level tariff state.

use anyhow::Context;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Unique site identifier (e.g., "lot-central")
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "spotwatch".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_bind")]
    pub bind: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { bind: default_http_bind(), port: default_http_port() }
    }
}

fn default_http_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Deserialize)]
pub struct TariffConfig {
    #[serde(default = "default_hourly_rate")]
    pub default_hourly_rate: Decimal,
    #[serde(default = "default_minimum_fee")]
    pub minimum_fee: Decimal,
    /// Multiplier applied to the base rate for sessions starting in the
    /// night window (1.00 = neutral)
    #[serde(default = "default_multiplier")]
    pub night_multiplier: Decimal,
    /// Multiplier applied to the base rate for sessions starting on
    /// Saturday or Sunday (1.00 = neutral)
    #[serde(default = "default_multiplier")]
    pub weekend_multiplier: Decimal,
    /// Night window start hour, inclusive (wraps past midnight)
    #[serde(default = "default_night_start_hour")]
    pub night_start_hour: u32,
    /// Night window end hour, exclusive
    #[serde(default = "default_night_end_hour")]
    pub night_end_hour: u32,
}

impl Default for TariffConfig {
    fn default() -> Self {
        Self {
            default_hourly_rate: default_hourly_rate(),
            minimum_fee: default_minimum_fee(),
            night_multiplier: default_multiplier(),
            weekend_multiplier: default_multiplier(),
            night_start_hour: default_night_start_hour(),
            night_end_hour: default_night_end_hour(),
        }
    }
}

fn default_hourly_rate() -> Decimal {
    Decimal::new(1000, 2) // 10.00
}

fn default_minimum_fee() -> Decimal {
    Decimal::new(500, 2) // 5.00
}

fn default_multiplier() -> Decimal {
    Decimal::ONE
}

fn default_night_start_hour() -> u32 {
    20
}

fn default_night_end_hour() -> u32 {
    8
}

/// Immutable tariff policy passed into the fee calculator
#[derive(Debug, Clone, PartialEq)]
pub struct TariffPolicy {
    pub default_hourly_rate: Decimal,
    pub minimum_fee: Decimal,
    pub night_multiplier: Decimal,
    pub weekend_multiplier: Decimal,
    pub night_start_hour: u32,
    pub night_end_hour: u32,
}

impl Default for TariffPolicy {
    fn default() -> Self {
        TariffConfig::default().into()
    }
}

impl From<TariffConfig> for TariffPolicy {
    fn from(cfg: TariffConfig) -> Self {
        Self {
            default_hourly_rate: cfg.default_hourly_rate,
            minimum_fee: cfg.minimum_fee,
            night_multiplier: cfg.night_multiplier,
            weekend_multiplier: cfg.weekend_multiplier,
            night_start_hour: cfg.night_start_hour % 24,
            night_end_hour: cfg.night_end_hour % 24,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Interval for the periodic metrics summary log (0 to disable)
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Interval between consistency sweeps (0 to disable the periodic task)
    #[serde(default = "default_audit_interval")]
    pub interval_secs: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { interval_secs: default_audit_interval() }
    }
}

fn default_audit_interval() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    /// Webhook endpoint for detection outcomes (unset = no webhook sink)
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Bounded notify channel capacity; overflow is dropped, not awaited
    #[serde(default = "default_notify_capacity")]
    pub capacity: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self { webhook_url: None, capacity: default_notify_capacity() }
    }
}

fn default_notify_capacity() -> usize {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct EgressConfig {
    /// File path for the detections log (JSONL format)
    #[serde(default = "default_egress_file")]
    pub file: String,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self { file: default_egress_file() }
    }
}

fn default_egress_file() -> String {
    "detections.jsonl".to_string()
}

/// Zone provisioning entry
#[derive(Debug, Clone, Deserialize)]
pub struct ZoneSeed {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub hourly_rate: Option<Decimal>,
}

/// Spot provisioning entry
#[derive(Debug, Clone, Deserialize)]
pub struct SpotSeed {
    pub id: i64,
    pub number: String,
    pub sensor_id: String,
    pub zone_id: i64,
    /// Per-spot hourly rate override
    #[serde(default)]
    pub hourly_rate: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub tariff: TariffConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub egress: EgressConfig,
    #[serde(default, rename = "zone")]
    pub zones: Vec<ZoneSeed>,
    #[serde(default, rename = "spot")]
    pub spots: Vec<SpotSeed>,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    http_bind: String,
    http_port: u16,
    tariff: TariffPolicy,
    metrics_interval_secs: u64,
    audit_interval_secs: u64,
    notify_webhook_url: Option<String>,
    notify_capacity: usize,
    egress_file: String,
    zones: Vec<ZoneSeed>,
    spots: Vec<SpotSeed>,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_id: default_site_id(),
            http_bind: default_http_bind(),
            http_port: default_http_port(),
            tariff: TariffPolicy::default(),
            metrics_interval_secs: default_metrics_interval(),
            audit_interval_secs: default_audit_interval(),
            notify_webhook_url: None,
            notify_capacity: default_notify_capacity(),
            egress_file: default_egress_file(),
            zones: Self::default_zones(),
            spots: Self::default_spots(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    fn default_zones() -> Vec<ZoneSeed> {
        vec![
            ZoneSeed { id: 1, name: "Zone A".to_string(), hourly_rate: Some(Decimal::new(800, 2)) },
            ZoneSeed { id: 2, name: "Zone B".to_string(), hourly_rate: None },
        ]
    }

    fn default_spots() -> Vec<SpotSeed> {
        vec![
            SpotSeed {
                id: 101,
                number: "A-01".to_string(),
                sensor_id: "sensor_001".to_string(),
                zone_id: 1,
                hourly_rate: None,
            },
            SpotSeed {
                id: 102,
                number: "A-02".to_string(),
                sensor_id: "sensor_002".to_string(),
                zone_id: 1,
                hourly_rate: None,
            },
            SpotSeed {
                id: 201,
                number: "B-01".to_string(),
                sensor_id: "sensor_003".to_string(),
                zone_id: 2,
                hourly_rate: None,
            },
        ]
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        // Check for --config argument
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        // Check CONFIG_FILE environment variable
        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        // Default to dev.toml
        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self {
            site_id: toml_config.site.id,
            http_bind: toml_config.http.bind,
            http_port: toml_config.http.port,
            tariff: toml_config.tariff.into(),
            metrics_interval_secs: toml_config.metrics.interval_secs,
            audit_interval_secs: toml_config.audit.interval_secs,
            notify_webhook_url: toml_config.notify.webhook_url,
            notify_capacity: toml_config.notify.capacity,
            egress_file: toml_config.egress.file,
            zones: toml_config.zones,
            spots: toml_config.spots,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(args: &[String]) -> Self {
        let config_path = Self::resolve_config_path(args);

        match Self::from_file(&config_path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Load from an explicit path, falling back to defaults on failure
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn http_bind(&self) -> &str {
        &self.http_bind
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn tariff(&self) -> &TariffPolicy {
        &self.tariff
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn audit_interval_secs(&self) -> u64 {
        self.audit_interval_secs
    }

    pub fn notify_webhook_url(&self) -> Option<&str> {
        self.notify_webhook_url.as_deref()
    }

    pub fn notify_capacity(&self) -> usize {
        self.notify_capacity
    }

    pub fn egress_file(&self) -> &str {
        &self.egress_file
    }

    pub fn zones(&self) -> &[ZoneSeed] {
        &self.zones
    }

    pub fn spots(&self) -> &[SpotSeed] {
        &self.spots
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}
