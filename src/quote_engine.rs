//! Runs one carrier estimate per calculation and keeps the latest result.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::{
    pick_method, EstimateRequest, QuoteInputs, QuoteOutcome, QuoteResult, QuoteStatus,
};
use crate::infra::{cache::RateCache, ClientError, HttpReply, QuoteTransport};
use crate::util::InFlightGuard;

/// Default destination: United States.
pub const DEFAULT_COUNTRY_ID: &str = "231";

/// Floor on how long a calculation appears to take.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(400);

const HTTP_ERROR_FALLBACK: &str = "HTTP error";

pub struct QuoteEngine {
    transport: Arc<dyn QuoteTransport>,
    rates: Arc<RateCache>,
    country_id: String,
    min_delay: Duration,
    last: Mutex<Option<QuoteResult>>,
    loading: AtomicBool,
}

impl QuoteEngine {
    pub fn new(transport: Arc<dyn QuoteTransport>, rates: Arc<RateCache>) -> Self {
        Self {
            transport,
            rates,
            country_id: DEFAULT_COUNTRY_ID.to_string(),
            min_delay: DEFAULT_MIN_DELAY,
            last: Mutex::new(None),
            loading: AtomicBool::new(false),
        }
    }

    pub fn with_country_id(mut self, country_id: impl Into<String>) -> Self {
        self.country_id = country_id.into();
        self
    }

    pub fn with_min_delay(mut self, min_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self
    }

    pub fn rates(&self) -> &Arc<RateCache> {
        &self.rates
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    /// Request an estimate for `inputs` and store the outcome as the latest
    /// result, replacing the previous one.
    ///
    /// The rate cache is refreshed alongside the request; a rate failure does
    /// not affect the quote. A call made while another calculation is running
    /// sends nothing and returns the currently stored result (cleared while a
    /// calculation is in progress).
    pub async fn calculate(&self, inputs: QuoteInputs) -> Option<QuoteResult> {
        let Some(_guard) = InFlightGuard::try_acquire(&self.loading) else {
            debug!(carrier = %inputs.carrier, "calculation already running; ignoring request");
            return self.last().await;
        };

        *self.last.lock().await = None;

        let fingerprint = inputs.fingerprint();
        let request = EstimateRequest::new(&inputs.weight, &inputs.dims, &self.country_id);
        info!(
            carrier = %inputs.carrier,
            grams = request.grams(),
            length = %request.length,
            width = %request.width,
            height = %request.height,
            "requesting shipping estimate"
        );

        let (reply, rate, ()) = tokio::join!(
            self.transport.estimate(&request),
            self.rates.ensure_fresh(),
            tokio::time::sleep(self.min_delay),
        );
        if rate.is_none() {
            warn!("no exchange rate available; converted amounts will be empty");
        }

        let outcome = outcome_from_reply(reply, &inputs);
        match &outcome {
            QuoteOutcome::Success { picked, .. } => info!(
                carrier = %inputs.carrier,
                picked = picked.is_some(),
                total_fee = ?picked.as_ref().and_then(|p| p.total_fee),
                "estimate received"
            ),
            QuoteOutcome::Failure {
                http_status,
                message,
            } => warn!(carrier = %inputs.carrier, ?http_status, %message, "estimate failed"),
        }

        let result = QuoteResult {
            inputs,
            fingerprint,
            outcome,
        };
        *self.last.lock().await = Some(result.clone());
        Some(result)
    }

    pub async fn last(&self) -> Option<QuoteResult> {
        self.last.lock().await.clone()
    }

    /// Drop the stored result.
    pub async fn reset(&self) {
        *self.last.lock().await = None;
    }

    pub async fn status(&self) -> QuoteStatus {
        if self.is_loading() {
            return QuoteStatus::Loading;
        }
        match self.last.lock().await.as_ref() {
            None => QuoteStatus::Idle,
            Some(result) if result.is_success() => QuoteStatus::Success,
            Some(_) => QuoteStatus::Failure,
        }
    }

    /// True when a stored result exists and was produced from inputs that
    /// fingerprint differently from `current`.
    pub async fn is_stale(&self, current: &QuoteInputs) -> bool {
        self.last
            .lock()
            .await
            .as_ref()
            .map(|result| result.fingerprint != current.fingerprint())
            .unwrap_or(false)
    }
}

fn outcome_from_reply(reply: Result<HttpReply, ClientError>, inputs: &QuoteInputs) -> QuoteOutcome {
    let reply = match reply {
        Ok(reply) => reply,
        Err(e) => {
            return QuoteOutcome::Failure {
                http_status: None,
                message: e.to_string(),
            }
        }
    };

    if !reply.is_success() {
        let message = if reply.body.is_empty() {
            HTTP_ERROR_FALLBACK.to_string()
        } else {
            reply.body
        };
        return QuoteOutcome::Failure {
            http_status: Some(reply.status),
            message,
        };
    }

    match serde_json::from_str::<serde_json::Value>(&reply.body) {
        Ok(data) => {
            let picked = pick_method(&data, inputs.carrier);
            QuoteOutcome::Success { data, picked }
        }
        Err(e) => QuoteOutcome::Failure {
            http_status: Some(reply.status),
            message: format!("invalid estimate payload: {e}"),
        },
    }
}
