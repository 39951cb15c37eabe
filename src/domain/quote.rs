//! Quote inputs, fingerprints and parsing of the carrier estimate payload.

use std::{fmt, str::FromStr};

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::entities::{BoxDims, Carrier};
use super::weight::WeightResult;

/// Everything a calculation is run against, captured when it starts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuoteInputs {
    pub carrier: Carrier,
    pub weight: WeightResult,
    pub dims: BoxDims,
    pub item_count: usize,
}

impl QuoteInputs {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self.carrier, &self.dims, self.weight.chargeable_g())
    }
}

/// Digest of the rounded inputs that produced a result.
///
/// Dimensions round to whole centimetres and the chargeable weight to whole
/// grams, so inputs that differ only below that resolution share a fingerprint.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

#[derive(Serialize)]
struct FingerprintKey {
    s: &'static str,
    l: i64,
    w: i64,
    h: i64,
    g: i64,
}

impl Fingerprint {
    pub fn of(carrier: Carrier, dims: &BoxDims, chargeable_g: f64) -> Self {
        let key = FingerprintKey {
            s: carrier.key(),
            l: round_whole(dims.length),
            w: round_whole(dims.width),
            h: round_whole(dims.height),
            g: round_whole(chargeable_g),
        };
        // Integers and a static str always serialise.
        Self(serde_json::to_string(&key).unwrap_or_default())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Body of the estimate request. All values travel as strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EstimateRequest {
    pub weight: String,
    pub length: String,
    pub width: String,
    pub height: String,
    pub country_id: String,
}

impl EstimateRequest {
    /// Weight in grams and dimensions are rounded up, with a floor of 1.
    pub fn new(weight: &WeightResult, dims: &BoxDims, country_id: &str) -> Self {
        Self {
            weight: ceil_at_least_one(weight.chargeable_g()).to_string(),
            length: ceil_at_least_one(dims.length).to_string(),
            width: ceil_at_least_one(dims.width).to_string(),
            height: ceil_at_least_one(dims.height).to_string(),
            country_id: country_id.to_string(),
        }
    }

    pub fn grams(&self) -> u64 {
        self.weight.parse().unwrap_or(1)
    }
}

/// The estimate entry chosen for the requested carrier. Fees are in the
/// service's currency; `None` when the service left them out or sent "--".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PickedMethod {
    pub method_id: i64,
    pub name: String,
    pub can_use: bool,
    pub delivery_days: String,
    pub shipping_fee: Option<Decimal>,
    pub service_fee: Option<Decimal>,
    pub total_fee: Option<Decimal>,
}

impl PickedMethod {
    /// Amount spread across the items: the total fee, or the shipping fee
    /// alone when the service fee is left out.
    pub fn allocation_base(&self, include_service_fee: bool) -> Option<Decimal> {
        if include_service_fee {
            self.total_fee
        } else {
            self.shipping_fee
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum QuoteOutcome {
    Success {
        /// Parsed estimate payload as received.
        data: Value,
        picked: Option<PickedMethod>,
    },
    Failure {
        http_status: Option<u16>,
        message: String,
    },
}

/// Immutable snapshot of one calculation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuoteResult {
    pub inputs: QuoteInputs,
    pub fingerprint: Fingerprint,
    pub outcome: QuoteOutcome,
}

impl QuoteResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, QuoteOutcome::Success { .. })
    }

    pub fn picked(&self) -> Option<&PickedMethod> {
        match &self.outcome {
            QuoteOutcome::Success { picked, .. } => picked.as_ref(),
            QuoteOutcome::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            QuoteOutcome::Failure { message, .. } => Some(message),
            QuoteOutcome::Success { .. } => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuoteStatus {
    Idle,
    Loading,
    Success,
    Failure,
}

/// First entry of the estimate list that belongs to `carrier`.
///
/// Entries match on `name` alone, except ECMS entries which may be flagged
/// with a truthy `is_ecms` instead. The remaining fields are read leniently:
/// a mistyped field falls back to its default rather than hiding the entry.
/// Anything other than a JSON array yields `None`.
pub fn pick_method(data: &Value, carrier: Carrier) -> Option<PickedMethod> {
    data.as_array()?
        .iter()
        .find(|entry| entry_matches(entry, carrier))
        .map(picked_from_entry)
}

fn entry_matches(entry: &Value, carrier: Carrier) -> bool {
    let by_name = entry.get("name").and_then(Value::as_str) == Some(carrier.service_name());
    match carrier {
        Carrier::Ecms => truthy(entry.get("is_ecms")) || by_name,
        Carrier::Dhl | Carrier::Ems => by_name,
    }
}

fn picked_from_entry(entry: &Value) -> PickedMethod {
    let fee = |key: &str| {
        parse_fee(prefer_original(
            entry.get(format!("original_{key}").as_str()),
            entry.get(key),
        ))
    };
    PickedMethod {
        method_id: entry
            .get("shipping_method_id")
            .and_then(integer_of)
            .unwrap_or(-1),
        name: entry.get("name").map(text_of).unwrap_or_default(),
        can_use: truthy(entry.get("can_use")),
        delivery_days: entry.get("delivery_days").map(text_of).unwrap_or_default(),
        shipping_fee: fee("shipping_fee"),
        service_fee: fee("service_fee"),
        total_fee: fee("total_fee"),
    }
}

/// Parse a fee that may be a number, a numeric string with thousands
/// separators, an empty string or the `--` placeholder.
pub fn parse_fee(value: Option<&Value>) -> Option<Decimal> {
    match value? {
        Value::Number(number) => decimal_from_number(number),
        Value::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed == "--" {
                return None;
            }
            let cleaned = trimmed.replace(',', "");
            Decimal::from_str(&cleaned)
                .ok()
                .or_else(|| cleaned.parse::<f64>().ok().and_then(finite_decimal))
        }
        _ => None,
    }
}

/// Exact decimal for a JSON number, going through its textual form.
pub(crate) fn decimal_from_number(number: &serde_json::Number) -> Option<Decimal> {
    Decimal::from_str(&number.to_string())
        .ok()
        .or_else(|| number.as_f64().and_then(finite_decimal))
}

fn prefer_original<'a>(original: Option<&'a Value>, plain: Option<&'a Value>) -> Option<&'a Value> {
    original.filter(|value| !value.is_null()).or(plain)
}

fn finite_decimal(value: f64) -> Option<Decimal> {
    if value.is_finite() {
        Decimal::from_f64(value)
    } else {
        None
    }
}

/// Integer id from a number or a numeric string.
fn integer_of(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|v| v.is_finite() && v.fract() == 0.0)
                .map(|v| v as i64)
        }),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Loose truthiness: `true`, non-zero numbers and non-empty strings count.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number.as_f64().is_some_and(|v| v != 0.0),
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Array(_) | Value::Object(_)) => true,
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn round_whole(value: f64) -> i64 {
    if value.is_finite() {
        value.round() as i64
    } else {
        0
    }
}

fn ceil_at_least_one(value: f64) -> u64 {
    if value.is_finite() && value > 1.0 {
        value.ceil() as u64
    } else {
        1
    }
}
