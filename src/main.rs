use std::error::Error;

use parcel_quote::{
    app::App,
    config::{LogFormat, LoggingSettings, Settings},
    domain::{QuoteOutcome, QuoteResult},
    util::{
        persistence::{load_persisted_state, save_persisted_state},
        version::version_label,
    },
};
use time::format_description::well_known::Rfc3339;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    let settings = Settings::load()?;
    init_tracing(&settings.logging);
    info!(version = %version_label(), "starting");

    let mut app = App::from_settings(&settings)?;
    if let Some(saved) = load_persisted_state() {
        app.apply_persisted(saved);
    }

    let weight = app.weight();
    println!("{}", version_label());
    println!(
        "Items: {} ({} pcs), box {}x{}x{} cm",
        app.items.len(),
        app.items.total_quantity(),
        app.package.dims.length,
        app.package.dims.width,
        app.package.dims.height
    );
    println!(
        "Weight: actual {:.3} kg (+{}% = {:.3} kg), volumetric {:.3} kg, chargeable {:.3} kg",
        weight.actual_raw_kg,
        weight.overhead_pct,
        weight.actual_plus_overhead_kg,
        weight.volumetric_kg,
        weight.chargeable_kg
    );

    match app.calculate().await {
        Some(result) => print_outcome(&result),
        None => println!("No result."),
    }

    let snapshot = app.rates().snapshot().await;
    let target = app.rates().target().to_string();
    match snapshot.rate {
        Some(rate) => {
            let fetched = snapshot
                .fetched_at
                .and_then(|at| at.format(&Rfc3339).ok())
                .unwrap_or_else(|| "unknown".to_string());
            println!(
                "Rate: 1 {} = {} {} (fetched {}{})",
                settings.rates.source_currency,
                rate,
                target,
                fetched,
                if snapshot.is_fresh() { "" } else { ", stale" }
            );
        }
        None => {
            let reason = app.rates().last_error().await.unwrap_or_default();
            println!("Rate: unavailable {reason}");
        }
    }

    match app.allocation_base_converted().await {
        Some(base) => println!("Shipping to allocate: {base} {target}"),
        None => println!("Shipping to allocate: n/a"),
    }

    let breakdown = app.breakdown().await;
    for line in &breakdown.lines {
        println!(
            "  {:<24} x{:<3} {:>9.1} g  origin {:>10}  shipping {:>10}  landed {:>10}  savings {:>10}",
            display_name(&line.name),
            line.quantity,
            line.line_weight_g,
            line.origin_subtotal,
            money(line.shipping_share),
            money(line.landed_subtotal),
            money(line.savings)
        );
    }
    println!(
        "  {:<24}      {:>9.1} g  origin {:>10}  shipping {:>10}  landed {:>10}  savings {:>10}",
        "Total",
        breakdown.total_weight_g,
        breakdown.origin_total,
        money(breakdown.shipping_total),
        money(breakdown.landed_total),
        money(breakdown.savings_total)
    );

    if let Err(err) = save_persisted_state(&app.to_persisted()) {
        warn!("failed to persist user state: {err}");
    }
    Ok(())
}

fn print_outcome(result: &QuoteResult) {
    match &result.outcome {
        QuoteOutcome::Success {
            picked: Some(picked),
            ..
        } => {
            println!(
                "Quote [{}]: {} (method {}, {}), {} days, shipping {} + service {} = {}",
                result.inputs.carrier,
                display_name(&picked.name),
                picked.method_id,
                if picked.can_use { "available" } else { "unavailable" },
                if picked.delivery_days.is_empty() { "?" } else { picked.delivery_days.as_str() },
                money(picked.shipping_fee),
                money(picked.service_fee),
                money(picked.total_fee)
            );
        }
        QuoteOutcome::Success { picked: None, .. } => {
            println!(
                "Quote [{}]: carrier not offered for this parcel",
                result.inputs.carrier
            );
        }
        QuoteOutcome::Failure {
            http_status,
            message,
        } => match http_status {
            Some(status) => println!("Quote failed (HTTP {status}): {message}"),
            None => println!("Quote failed: {message}"),
        },
    }
}

fn money(value: Option<rust_decimal::Decimal>) -> String {
    value.map_or_else(|| "--".to_string(), |v| v.to_string())
}

fn display_name(name: &str) -> &str {
    if name.is_empty() {
        "(unnamed)"
    } else {
        name
    }
}

fn init_tracing(logging: &LoggingSettings) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let result = match logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .try_init(),
        LogFormat::Compact => tracing_subscriber::fmt()
            .compact()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };
    if let Err(err) = result {
        eprintln!("tracing already initialised: {err}");
    }
}
