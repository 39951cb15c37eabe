//! Pure shipping math and data types; no I/O lives here.

pub mod allocation;
pub mod app_state;
pub mod breakdown;
pub mod entities;
pub mod quote;
pub mod weight;

pub use allocation::{allocate_exact, round_money};
pub use app_state::PersistedState;
pub use breakdown::{cost_breakdown, CostBreakdown, LineCost};
pub use entities::{BoxDims, BoxPatch, Carrier, Item, ItemDraft, ItemList, ItemPatch};
pub use quote::{
    parse_fee, pick_method, EstimateRequest, Fingerprint, PickedMethod, QuoteInputs, QuoteOutcome,
    QuoteResult, QuoteStatus,
};
pub use weight::{PackageConfig, WeightModel, WeightResult};
