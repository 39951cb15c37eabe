//! Composition root: owns the item, package and selection state and wires
//! the quote engine to its collaborators.

use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    config::Settings,
    domain::{
        cost_breakdown, Carrier, CostBreakdown, ItemList, PackageConfig, PersistedState,
        QuoteInputs, QuoteResult, QuoteStatus, WeightResult,
    },
    infra::{
        cache::{FileRateStore, MemoryRateStore, RateCache, RateStore},
        fx::ExchangeRateClient,
        tenso::TensoClient,
        ClientError, QuoteTransport, RateSource,
    },
    quote_engine::QuoteEngine,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] ClientError),
}

pub struct App {
    pub items: ItemList,
    pub package: PackageConfig,
    pub carrier: Carrier,
    pub include_service_fee: bool,
    decimal_places: u32,
    engine: QuoteEngine,
}

impl App {
    /// Build the app with real HTTP clients. The rate cache lives on disk
    /// unless `rates.persist` is off.
    pub fn from_settings(settings: &Settings) -> Result<Self, AppError> {
        let transport = TensoClient::with_base_url(
            &settings.carrier_api.base_url,
            &settings.carrier_api.estimate_path,
        )?;
        let rates = ExchangeRateClient::with_url(&settings.rates.url)?;
        let store: Arc<dyn RateStore> = if settings.rates.persist {
            let store = FileRateStore::default_location();
            debug!(?store, "using on-disk rate cache");
            Arc::new(store)
        } else {
            Arc::new(MemoryRateStore::default())
        };
        Ok(Self::with_parts(
            settings,
            Arc::new(transport),
            Arc::new(rates),
            store,
        ))
    }

    pub fn with_parts(
        settings: &Settings,
        transport: Arc<dyn QuoteTransport>,
        rate_source: Arc<dyn RateSource>,
        rate_store: Arc<dyn RateStore>,
    ) -> Self {
        let rates = RateCache::new(rate_source, rate_store, settings.rates.target_currency.clone())
            .with_ttl(settings.rates.ttl());
        let engine = QuoteEngine::new(transport, Arc::new(rates))
            .with_country_id(settings.carrier_api.country_id.clone())
            .with_min_delay(settings.quote.min_delay());

        let mut package = PackageConfig {
            dims: settings.package.default_box,
            ..PackageConfig::default()
        };
        package.set_volumetric_divisor(settings.package.volumetric_divisor);
        package.set_overhead_pct(settings.package.overhead_pct);

        Self {
            items: ItemList::default(),
            package,
            carrier: settings.quote.carrier,
            include_service_fee: settings.quote.include_service_fee,
            decimal_places: settings.quote.decimal_places,
            engine,
        }
    }

    pub fn engine(&self) -> &QuoteEngine {
        &self.engine
    }

    pub fn rates(&self) -> &Arc<RateCache> {
        self.engine.rates()
    }

    pub fn decimal_places(&self) -> u32 {
        self.decimal_places
    }

    pub fn weight(&self) -> WeightResult {
        self.package.compute(self.items.items())
    }

    /// Live inputs as a calculation would capture them now.
    pub fn inputs(&self) -> QuoteInputs {
        QuoteInputs {
            carrier: self.carrier,
            weight: self.weight(),
            dims: self.package.dims,
            item_count: self.items.len(),
        }
    }

    pub async fn calculate(&self) -> Option<QuoteResult> {
        self.engine.calculate(self.inputs()).await
    }

    pub async fn result(&self) -> Option<QuoteResult> {
        self.engine.last().await
    }

    pub async fn status(&self) -> QuoteStatus {
        self.engine.status().await
    }

    /// Whether the stored result no longer matches the live inputs.
    pub async fn is_stale(&self) -> bool {
        self.engine.is_stale(&self.inputs()).await
    }

    /// Quoted amount to spread over the items, in the service's currency.
    pub async fn allocation_base(&self) -> Option<Decimal> {
        self.result()
            .await?
            .picked()?
            .allocation_base(self.include_service_fee)
    }

    pub async fn allocation_base_converted(&self) -> Option<Decimal> {
        let base = self.allocation_base().await;
        self.rates().convert(base).await
    }

    /// Per-item costs with the converted base split by line weight.
    pub async fn breakdown(&self) -> CostBreakdown {
        let base = self.allocation_base_converted().await;
        cost_breakdown(&self.items, base, self.decimal_places)
    }

    pub async fn reset_results(&self) {
        self.engine.reset().await;
    }

    pub fn set_carrier(&mut self, carrier: Carrier) {
        self.carrier = carrier;
    }

    pub fn set_include_service_fee(&mut self, include: bool) {
        self.include_service_fee = include;
    }

    pub fn apply_persisted(&mut self, state: PersistedState) {
        info!(items = state.items.len(), carrier = %state.carrier, "restoring saved state");
        self.items = state.items;
        self.package = state.package;
        self.carrier = state.carrier;
        self.include_service_fee = state.include_service_fee;
    }

    pub fn to_persisted(&self) -> PersistedState {
        PersistedState {
            items: self.items.clone(),
            package: self.package.clone(),
            carrier: self.carrier,
            include_service_fee: self.include_service_fee,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BoxDims, BoxPatch, Item, ItemDraft};
    use crate::infra::cache::StoredRate;
    use crate::infra::HttpReply;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use time::OffsetDateTime;

    struct FixedTransport(HttpReply);

    #[async_trait]
    impl QuoteTransport for FixedTransport {
        async fn estimate(
            &self,
            _request: &crate::domain::EstimateRequest,
        ) -> Result<HttpReply, ClientError> {
            Ok(self.0.clone())
        }
    }

    struct DownRates;

    #[async_trait]
    impl RateSource for DownRates {
        async fn latest(&self) -> Result<HttpReply, ClientError> {
            Ok(HttpReply::new(503, ""))
        }
    }

    const ESTIMATE: &str = r#"[
        {"shipping_method_id": 12, "name": "eCommerce Mail", "is_ecms": true, "can_use": true,
         "delivery_days": "7-14", "shipping_fee": "2,600", "service_fee": "400", "total_fee": "3,000"}
    ]"#;

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.quote.min_delay_ms = 0;
        settings
    }

    fn app_with_rate(rate: Option<Decimal>) -> App {
        let store = match rate {
            Some(rate) => MemoryRateStore::with(StoredRate {
                rate,
                fetched_at_ms: i64::try_from(
                    OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000,
                )
                .unwrap(),
            }),
            None => MemoryRateStore::default(),
        };
        let mut app = App::with_parts(
            &settings(),
            Arc::new(FixedTransport(HttpReply::new(200, ESTIMATE))),
            Arc::new(DownRates),
            Arc::new(store),
        );
        app.items = ItemList::empty();
        app.items.add(ItemDraft {
            name: "Figure".to_string(),
            weight_g: 1000.0,
            price_origin: dec!(40),
            price_local: dec!(70),
            quantity: 1,
        });
        app.items.add(ItemDraft {
            name: "Artbook".to_string(),
            weight_g: 500.0,
            price_origin: dec!(20),
            price_local: dec!(25),
            quantity: 2,
        });
        app
    }

    #[test]
    fn settings_seed_package_and_selection() {
        let app = app_with_rate(None);
        assert_eq!(app.carrier, Carrier::Ecms);
        assert!(app.include_service_fee);
        assert_eq!(app.package.dims, BoxDims::default());
        assert_eq!(app.decimal_places(), 2);

        let weight = app.weight();
        assert_eq!(weight.actual_raw_kg, 2.0);
        assert!((weight.chargeable_kg - 2.12).abs() < 1e-9);
        assert_eq!(app.inputs().item_count, 2);
    }

    #[tokio::test]
    async fn converted_base_is_split_across_items() {
        let app = app_with_rate(Some(dec!(0.01)));
        app.calculate().await.unwrap();

        assert_eq!(app.allocation_base().await, Some(dec!(3000)));
        assert_eq!(app.allocation_base_converted().await, Some(dec!(30.00)));

        let breakdown = app.breakdown().await;
        let shares: Vec<_> = breakdown.lines.iter().map(|l| l.shipping_share).collect();
        assert_eq!(shares, vec![Some(dec!(15.00)), Some(dec!(15.00))]);
        assert_eq!(breakdown.shipping_total, Some(dec!(30.00)));
        assert_eq!(breakdown.lines[0].landed_subtotal, Some(dec!(55.00)));
        assert_eq!(breakdown.lines[1].savings, Some(dec!(-5.00)));
    }

    #[tokio::test]
    async fn service_fee_toggle_changes_base() {
        let mut app = app_with_rate(Some(dec!(0.01)));
        app.calculate().await.unwrap();
        app.set_include_service_fee(false);
        assert_eq!(app.allocation_base().await, Some(dec!(2600)));
        assert_eq!(app.allocation_base_converted().await, Some(dec!(26.00)));
    }

    #[tokio::test]
    async fn missing_rate_leaves_shares_empty() {
        let app = app_with_rate(None);
        let result = app.calculate().await.unwrap();
        assert!(result.is_success());

        assert_eq!(app.allocation_base().await, Some(dec!(3000)));
        assert_eq!(app.allocation_base_converted().await, None);
        let breakdown = app.breakdown().await;
        assert!(breakdown.lines.iter().all(|l| l.shipping_share.is_none()));
        assert_eq!(breakdown.origin_total, dec!(80));
        assert_eq!(breakdown.shipping_total, None);
    }

    #[tokio::test]
    async fn edits_mark_result_stale_until_recalculated() {
        let mut app = app_with_rate(Some(dec!(0.01)));
        assert!(!app.is_stale().await);

        app.calculate().await.unwrap();
        assert!(!app.is_stale().await);
        assert_eq!(app.status().await, QuoteStatus::Success);

        app.package.set_box(BoxPatch {
            length: Some(60.0),
            ..BoxPatch::default()
        });
        assert!(app.is_stale().await);

        app.calculate().await.unwrap();
        assert!(!app.is_stale().await);

        app.set_carrier(Carrier::Dhl);
        assert!(app.is_stale().await);

        app.reset_results().await;
        assert!(!app.is_stale().await);
        assert_eq!(app.status().await, QuoteStatus::Idle);
        assert_eq!(app.allocation_base().await, None);
    }

    #[test]
    fn persisted_state_round_trips_through_app() {
        let mut app = app_with_rate(None);
        app.set_carrier(Carrier::Ems);
        app.set_include_service_fee(false);
        let saved = app.to_persisted();

        let mut fresh = app_with_rate(None);
        fresh.items = ItemList::from_items(Vec::<Item>::new());
        fresh.apply_persisted(saved.clone());
        assert_eq!(fresh.carrier, Carrier::Ems);
        assert!(!fresh.include_service_fee);
        assert_eq!(fresh.items, app.items);
        assert_eq!(fresh.to_persisted(), saved);
    }
}
