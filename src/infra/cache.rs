//! Exchange-rate cache with a TTL, lazy refresh and an on-disk copy.

use std::{
    collections::HashMap,
    fs,
    path::PathBuf,
    str::FromStr,
    sync::{atomic::AtomicBool, atomic::Ordering, Arc, Mutex as StdMutex},
    time::Duration,
};

use rust_decimal::Decimal;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::fx::{parse_rate, RateFetchError};
use super::RateSource;
use crate::util::{persistence::PersistSaveError, InFlightGuard};

const CACHE_DIR: &str = "parcel-quote";
const CACHE_FILENAME: &str = "fx_cache.json";
const KEY_RATE: &str = "fx:rate";
const KEY_FETCHED_AT: &str = "fx:fetched_at_ms";

/// Rate TTL: 12 hours.
pub const RATE_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// A rate and the moment it was fetched, as kept outside the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoredRate {
    pub rate: Decimal,
    pub fetched_at_ms: i64,
}

/// Durable home for the last good rate.
pub trait RateStore: Send + Sync {
    /// `None` when nothing usable is stored.
    fn load(&self) -> Option<StoredRate>;
    fn save(&self, stored: &StoredRate) -> Result<(), PersistSaveError>;
}

/// JSON file under the platform data directory.
#[derive(Clone, Debug)]
pub struct FileRateStore {
    path: PathBuf,
}

impl FileRateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_location() -> Self {
        let base = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CACHE_DIR);
        Self::new(base.join(CACHE_FILENAME))
    }
}

impl RateStore for FileRateStore {
    fn load(&self) -> Option<StoredRate> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %self.path.display(), "no rate cache on disk: {e}");
                return None;
            }
        };
        let entries: HashMap<String, Value> = match serde_json::from_str(&content) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %self.path.display(), "failed to parse rate cache: {e}");
                return None;
            }
        };

        let rate = entries.get(KEY_RATE).and_then(decimal_scalar)?;
        let fetched_at_ms = entries
            .get(KEY_FETCHED_AT)
            .and_then(decimal_scalar)
            .and_then(|ts| i64::try_from(ts.trunc().mantissa()).ok())?;
        Some(StoredRate {
            rate,
            fetched_at_ms,
        })
    }

    fn save(&self, stored: &StoredRate) -> Result<(), PersistSaveError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut entries = serde_json::Map::new();
        entries.insert(KEY_RATE.to_string(), Value::String(stored.rate.to_string()));
        entries.insert(KEY_FETCHED_AT.to_string(), Value::from(stored.fetched_at_ms));
        fs::write(&self.path, serde_json::to_string_pretty(&entries)?)?;
        debug!(path = %self.path.display(), rate = %stored.rate, "saved rate cache");
        Ok(())
    }
}

/// Process-local store, for runs with persistence turned off.
#[derive(Debug, Default)]
pub struct MemoryRateStore {
    slot: StdMutex<Option<StoredRate>>,
}

impl MemoryRateStore {
    pub fn with(stored: StoredRate) -> Self {
        Self {
            slot: StdMutex::new(Some(stored)),
        }
    }
}

impl RateStore for MemoryRateStore {
    fn load(&self) -> Option<StoredRate> {
        self.slot.lock().ok().and_then(|slot| *slot)
    }

    fn save(&self, stored: &StoredRate) -> Result<(), PersistSaveError> {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(*stored);
        }
        Ok(())
    }
}

/// Point-in-time view of the cache.
#[derive(Clone, Debug, PartialEq)]
pub struct RateSnapshot {
    pub rate: Option<Decimal>,
    pub fetched_at: Option<OffsetDateTime>,
    pub ttl: Duration,
}

impl RateSnapshot {
    pub fn is_fresh(&self) -> bool {
        match (self.rate, self.fetched_at) {
            (Some(_), Some(fetched_at)) => {
                let age_ms = (OffsetDateTime::now_utc() - fetched_at).whole_milliseconds();
                age_ms < i128::try_from(self.ttl.as_millis()).unwrap_or(i128::MAX)
            }
            _ => false,
        }
    }
}

#[derive(Default)]
struct RateState {
    rate: Option<Decimal>,
    fetched_at: Option<OffsetDateTime>,
    last_error: Option<String>,
    loaded: bool,
}

pub struct RateCache {
    source: Arc<dyn RateSource>,
    store: Arc<dyn RateStore>,
    target: String,
    ttl: Duration,
    state: Mutex<RateState>,
    in_flight: AtomicBool,
}

impl RateCache {
    pub fn new(
        source: Arc<dyn RateSource>,
        store: Arc<dyn RateStore>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            source,
            store,
            target: target.into(),
            ttl: RATE_TTL,
            state: Mutex::new(RateState::default()),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Make sure a fresh rate is held, fetching when it is missing or older
    /// than the TTL, and return whatever rate is held afterwards.
    ///
    /// While a fetch is running, other callers get the current (possibly
    /// stale or missing) rate straight away. A failed fetch keeps the old
    /// rate and records the error.
    pub async fn ensure_fresh(&self) -> Option<Decimal> {
        let snapshot = self.snapshot().await;
        if snapshot.is_fresh() {
            debug!(rate = ?snapshot.rate, "rate cache hit");
            return snapshot.rate;
        }

        let Some(_guard) = InFlightGuard::try_acquire(&self.in_flight) else {
            debug!("rate fetch already running; serving cached rate");
            return snapshot.rate;
        };

        self.state.lock().await.last_error = None;
        let fetched = self.fetch().await;

        let mut state = self.state.lock().await;
        match fetched {
            Ok(rate) => {
                let fetched_at = OffsetDateTime::now_utc();
                state.rate = Some(rate);
                state.fetched_at = Some(fetched_at);
                info!(%rate, target = %self.target, "refreshed exchange rate");

                let stored = StoredRate {
                    rate,
                    fetched_at_ms: unix_ms(fetched_at),
                };
                if let Err(e) = self.store.save(&stored) {
                    warn!("failed to persist exchange rate: {e}");
                }
            }
            Err(e) => {
                warn!(stale_rate = ?state.rate, "exchange rate refresh failed: {e}");
                state.last_error = Some(e.to_string());
            }
        }
        state.rate
    }

    /// Return the held rate now; if it is stale, start a refresh in the
    /// background.
    pub async fn get_rate(self: &Arc<Self>) -> Option<Decimal> {
        let snapshot = self.snapshot().await;
        if !snapshot.is_fresh() && !self.is_loading() {
            let cache = Arc::clone(self);
            tokio::spawn(async move {
                cache.ensure_fresh().await;
            });
        }
        snapshot.rate
    }

    pub async fn current_rate(&self) -> Option<Decimal> {
        self.snapshot().await.rate
    }

    pub async fn last_error(&self) -> Option<String> {
        self.state.lock().await.last_error.clone()
    }

    pub async fn snapshot(&self) -> RateSnapshot {
        let mut state = self.state.lock().await;
        self.load_stored(&mut state);
        RateSnapshot {
            rate: state.rate,
            fetched_at: state.fetched_at,
            ttl: self.ttl,
        }
    }

    /// Convert with the held rate; `None` when either side is missing.
    pub async fn convert(&self, amount: Option<Decimal>) -> Option<Decimal> {
        convert(amount, self.current_rate().await)
    }

    async fn fetch(&self) -> Result<Decimal, RateFetchError> {
        let reply = self.source.latest().await?;
        parse_rate(&reply, &self.target)
    }

    fn load_stored(&self, state: &mut RateState) {
        if state.loaded {
            return;
        }
        state.loaded = true;
        if state.rate.is_some() {
            return;
        }
        if let Some(stored) = self.store.load() {
            match from_unix_ms(stored.fetched_at_ms) {
                Some(fetched_at) => {
                    debug!(rate = %stored.rate, "loaded exchange rate from disk");
                    state.rate = Some(stored.rate);
                    state.fetched_at = Some(fetched_at);
                }
                None => warn!(ts = stored.fetched_at_ms, "ignoring stored rate with bad timestamp"),
            }
        }
    }
}

/// Plain multiplication that never turns a missing value into zero.
pub fn convert(amount: Option<Decimal>, rate: Option<Decimal>) -> Option<Decimal> {
    Some(amount? * rate?)
}

fn decimal_scalar(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(number) => Decimal::from_str(&number.to_string()).ok(),
        Value::String(text) => Decimal::from_str(text.trim()).ok(),
        _ => None,
    }
}

fn unix_ms(at: OffsetDateTime) -> i64 {
    i64::try_from(at.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

fn from_unix_ms(ms: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).ok()
}
