//! Runtime settings: optional TOML files layered under `PARCEL_QUOTE__*`
//! environment variables.

use std::time::Duration;

use serde::Deserialize;

use crate::domain::{allocation::MAX_DECIMAL_PLACES, BoxDims, Carrier};
use crate::infra::{fx, tenso};
use crate::quote_engine::DEFAULT_COUNTRY_ID;

pub const ENV_PREFIX: &str = "PARCEL_QUOTE";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub carrier_api: CarrierApiSettings,
    #[serde(default)]
    pub rates: RateSettings,
    #[serde(default)]
    pub quote: QuoteSettings,
    #[serde(default)]
    pub package: PackageSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CarrierApiSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_estimate_path")]
    pub estimate_path: String,
    /// Destination country id sent with every estimate.
    #[serde(default = "default_country_id")]
    pub country_id: String,
}

impl Default for CarrierApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            estimate_path: default_estimate_path(),
            country_id: default_country_id(),
        }
    }
}

fn default_base_url() -> String {
    tenso::DEFAULT_BASE_URL.to_string()
}

fn default_estimate_path() -> String {
    tenso::DEFAULT_ESTIMATE_PATH.to_string()
}

fn default_country_id() -> String {
    DEFAULT_COUNTRY_ID.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateSettings {
    #[serde(default = "default_rates_url")]
    pub url: String,
    #[serde(default = "default_source_currency")]
    pub source_currency: String,
    #[serde(default = "default_target_currency")]
    pub target_currency: String,
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
    /// Keep the last good rate on disk between runs.
    #[serde(default = "default_true")]
    pub persist: bool,
}

impl RateSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours.saturating_mul(60 * 60))
    }
}

impl Default for RateSettings {
    fn default() -> Self {
        Self {
            url: default_rates_url(),
            source_currency: default_source_currency(),
            target_currency: default_target_currency(),
            ttl_hours: default_ttl_hours(),
            persist: true,
        }
    }
}

fn default_rates_url() -> String {
    fx::DEFAULT_RATES_URL.to_string()
}

fn default_source_currency() -> String {
    "JPY".to_string()
}

fn default_target_currency() -> String {
    fx::DEFAULT_TARGET_CURRENCY.to_string()
}

fn default_ttl_hours() -> u64 {
    12
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteSettings {
    #[serde(default)]
    pub carrier: Carrier,
    #[serde(default = "default_true")]
    pub include_service_fee: bool,
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    /// Money precision for the breakdown, at most `MAX_DECIMAL_PLACES`.
    #[serde(default = "default_decimal_places")]
    pub decimal_places: u32,
}

impl QuoteSettings {
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }
}

impl Default for QuoteSettings {
    fn default() -> Self {
        Self {
            carrier: Carrier::default(),
            include_service_fee: true,
            min_delay_ms: default_min_delay_ms(),
            decimal_places: default_decimal_places(),
        }
    }
}

fn default_min_delay_ms() -> u64 {
    400
}

fn default_decimal_places() -> u32 {
    2
}

#[derive(Debug, Clone, Deserialize)]
pub struct PackageSettings {
    #[serde(default = "default_divisor")]
    pub volumetric_divisor: f64,
    #[serde(default = "default_overhead_pct")]
    pub overhead_pct: f64,
    #[serde(default)]
    pub default_box: BoxDims,
}

impl Default for PackageSettings {
    fn default() -> Self {
        Self {
            volumetric_divisor: default_divisor(),
            overhead_pct: default_overhead_pct(),
            default_box: BoxDims::default(),
        }
    }
}

fn default_divisor() -> f64 {
    crate::domain::weight::DEFAULT_VOLUMETRIC_DIVISOR
}

fn default_overhead_pct() -> f64 {
    crate::domain::weight::DEFAULT_OVERHEAD_PCT
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// Loads `config/default`, then `config/{RUN_MODE}`, then the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a present source cannot be parsed or a value is
    /// out of range.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize::<Self>()?
            .validated()
    }

    /// Parse settings from a TOML document, with defaults for anything left out.
    pub fn from_toml(source: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize::<Self>()?
            .validated()
    }

    fn validated(self) -> Result<Self, config::ConfigError> {
        if self.quote.decimal_places > MAX_DECIMAL_PLACES {
            return Err(config::ConfigError::Message(format!(
                "quote.decimal_places must be at most {MAX_DECIMAL_PLACES}, got {}",
                self.quote.decimal_places
            )));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_yields_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings.carrier_api.country_id, "231");
        assert_eq!(settings.carrier_api.base_url, tenso::DEFAULT_BASE_URL);
        assert_eq!(settings.rates.target_currency, "USD");
        assert_eq!(settings.rates.ttl(), Duration::from_secs(12 * 60 * 60));
        assert!(settings.rates.persist);
        assert_eq!(settings.quote.carrier, Carrier::Ecms);
        assert!(settings.quote.include_service_fee);
        assert_eq!(settings.quote.min_delay(), Duration::from_millis(400));
        assert_eq!(settings.quote.decimal_places, 2);
        assert_eq!(settings.package.volumetric_divisor, 5000.0);
        assert_eq!(settings.package.overhead_pct, 6.0);
        assert_eq!(settings.package.default_box, BoxDims::default());
        assert_eq!(settings.logging.format, LogFormat::Compact);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let settings = Settings::from_toml(
            r#"
            [quote]
            carrier = "dhl"
            include_service_fee = false

            [package.default_box]
            length = 40.0
            width = 30.0
            height = 20.0

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(settings.quote.carrier, Carrier::Dhl);
        assert!(!settings.quote.include_service_fee);
        assert_eq!(settings.quote.decimal_places, 2);
        assert_eq!(settings.package.default_box, BoxDims::new(40.0, 30.0, 20.0));
        assert_eq!(settings.package.overhead_pct, 6.0);
        assert_eq!(settings.logging.format, LogFormat::Json);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn decimal_places_above_cap_are_rejected() {
        let err = Settings::from_toml("[quote]\ndecimal_places = 13").unwrap_err();
        assert!(err.to_string().contains("decimal_places"));
        assert_eq!(
            Settings::from_toml("[quote]\ndecimal_places = 12")
                .unwrap()
                .quote
                .decimal_places,
            12
        );
    }

    #[test]
    fn unknown_carrier_is_rejected() {
        assert!(Settings::from_toml("[quote]\ncarrier = \"pigeon\"").is_err());
    }
}
