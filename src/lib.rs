//! Parcel shipping quotes: chargeable weight, carrier estimate, currency
//! conversion and an exact per-item split of the shipping cost.

pub mod app;
pub mod config;
pub mod domain;
pub mod infra;
pub mod quote_engine;
pub mod util;
