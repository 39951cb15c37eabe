//! Per-item landed cost: the shipping total split by line weight.

use rust_decimal::Decimal;
use serde::Serialize;

use super::allocation::{allocate_exact, round_money};
use super::entities::ItemList;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LineCost {
    pub item_id: String,
    pub name: String,
    pub quantity: u32,
    pub line_weight_g: f64,
    pub origin_subtotal: Decimal,
    pub local_subtotal: Decimal,
    pub shipping_share: Option<Decimal>,
    /// Origin subtotal plus the shipping share.
    pub landed_subtotal: Option<Decimal>,
    /// Local subtotal minus landed subtotal; positive means shipping in is cheaper.
    pub savings: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CostBreakdown {
    pub lines: Vec<LineCost>,
    pub total_weight_g: f64,
    pub origin_total: Decimal,
    pub local_total: Decimal,
    pub shipping_total: Option<Decimal>,
    pub landed_total: Option<Decimal>,
    pub savings_total: Option<Decimal>,
}

/// Split `shipping_total` across the items by line weight. Without a total
/// the shipping-dependent fields stay `None`.
pub fn cost_breakdown(
    items: &ItemList,
    shipping_total: Option<Decimal>,
    decimal_places: u32,
) -> CostBreakdown {
    let shares: Vec<Option<Decimal>> = match shipping_total {
        Some(total) => allocate_exact(&items.line_weights_g(), total, decimal_places)
            .into_iter()
            .map(Some)
            .collect(),
        None => vec![None; items.len()],
    };

    let lines: Vec<LineCost> = items
        .items()
        .iter()
        .zip(shares)
        .map(|(item, share)| {
            let origin_subtotal = item.origin_subtotal();
            let local_subtotal = item.local_subtotal();
            let landed_subtotal = share.map(|s| origin_subtotal + s);
            LineCost {
                item_id: item.id.clone(),
                name: item.name.clone(),
                quantity: item.quantity,
                line_weight_g: item.line_weight_g(),
                origin_subtotal,
                local_subtotal,
                shipping_share: share,
                landed_subtotal,
                savings: landed_subtotal.map(|landed| local_subtotal - landed),
            }
        })
        .collect();

    let origin_total = items.total_origin_price();
    let local_total = items.total_local_price();
    let shipping_total = shipping_total.map(|total| {
        if items.total_weight_g() > 0.0 {
            round_money(total, decimal_places)
        } else {
            Decimal::ZERO
        }
    });
    let landed_total = shipping_total.map(|s| origin_total + s);

    CostBreakdown {
        lines,
        total_weight_g: items.total_weight_g(),
        origin_total,
        local_total,
        shipping_total,
        landed_total,
        savings_total: landed_total.map(|landed| local_total - landed),
    }
}
