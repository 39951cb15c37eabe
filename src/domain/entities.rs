use std::{fmt, str::FromStr};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::util::generate_id;

/// A line in the parcel. Weights are per unit, in grams.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub weight_g: f64,
    /// Per-unit price when bought through the origin market (shipped in).
    pub price_origin: Decimal,
    /// Per-unit price in the local market, used for the savings comparison.
    pub price_local: Decimal,
    pub quantity: u32,
}

impl Item {
    /// Unit weight with negative / non-finite values treated as zero.
    pub fn unit_weight_g(&self) -> f64 {
        sanitize_non_negative(self.weight_g)
    }

    /// Weight of the whole line (unit weight × quantity).
    pub fn line_weight_g(&self) -> f64 {
        self.unit_weight_g() * f64::from(self.quantity)
    }

    pub fn origin_subtotal(&self) -> Decimal {
        self.price_origin * Decimal::from(self.quantity)
    }

    pub fn local_subtotal(&self) -> Decimal {
        self.price_local * Decimal::from(self.quantity)
    }

    /// Apply the same clamps as [`ItemList::add`]: weight and prices at
    /// least zero, quantity at least one.
    pub fn sanitized(self) -> Self {
        Self {
            weight_g: sanitize_non_negative(self.weight_g),
            price_origin: self.price_origin.max(Decimal::ZERO),
            price_local: self.price_local.max(Decimal::ZERO),
            quantity: self.quantity.max(1),
            ..self
        }
    }
}

/// Fields for a new item. Values go through the same clamping as [`ItemPatch`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ItemDraft {
    pub name: String,
    pub weight_g: f64,
    pub price_origin: Decimal,
    pub price_local: Decimal,
    pub quantity: u32,
}

/// Partial update for an existing item; `None` leaves the field untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub weight_g: Option<f64>,
    pub price_origin: Option<Decimal>,
    pub price_local: Option<Decimal>,
    pub quantity: Option<u32>,
}

/// Ordered item set, mutated only through its methods. Items loaded from
/// outside go through the same clamps as added ones.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Item>", into = "Vec<Item>")]
pub struct ItemList {
    items: Vec<Item>,
}

impl Default for ItemList {
    fn default() -> Self {
        let mut list = Self { items: Vec::new() };
        list.add(ItemDraft {
            name: "Sample".to_string(),
            weight_g: 500.0,
            price_origin: Decimal::from(12),
            price_local: Decimal::from(15),
            quantity: 1,
        });
        list
    }
}

impl From<Vec<Item>> for ItemList {
    fn from(items: Vec<Item>) -> Self {
        Self::from_items(items)
    }
}

impl From<ItemList> for Vec<Item> {
    fn from(list: ItemList) -> Self {
        list.items
    }
}

impl ItemList {
    pub fn empty() -> Self {
        Self { items: Vec::new() }
    }

    pub fn from_items(items: Vec<Item>) -> Self {
        Self {
            items: items.into_iter().map(Item::sanitized).collect(),
        }
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Append an empty row and return its id.
    pub fn add_blank(&mut self) -> String {
        self.add(ItemDraft {
            quantity: 1,
            ..ItemDraft::default()
        })
    }

    pub fn add(&mut self, draft: ItemDraft) -> String {
        let id = generate_id("item");
        let item = Item {
            id: id.clone(),
            name: draft.name,
            weight_g: draft.weight_g,
            price_origin: draft.price_origin,
            price_local: draft.price_local,
            quantity: draft.quantity,
        };
        self.items.push(item.sanitized());
        id
    }

    /// Apply `patch` to the item with `id`. Returns false when no such item exists.
    pub fn update(&mut self, id: &str, patch: ItemPatch) -> bool {
        let Some(item) = self.items.iter_mut().find(|item| item.id == id) else {
            return false;
        };

        if let Some(name) = patch.name {
            item.name = name;
        }
        if let Some(weight) = patch.weight_g {
            item.weight_g = sanitize_non_negative(weight);
        }
        if let Some(price) = patch.price_origin {
            item.price_origin = price.max(Decimal::ZERO);
        }
        if let Some(price) = patch.price_local {
            item.price_local = price.max(Decimal::ZERO);
        }
        if let Some(quantity) = patch.quantity {
            item.quantity = quantity.max(1);
        }
        true
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id != id);
        self.items.len() != before
    }

    pub fn total_weight_g(&self) -> f64 {
        self.items.iter().map(Item::line_weight_g).sum()
    }

    pub fn total_origin_price(&self) -> Decimal {
        self.items.iter().map(Item::origin_subtotal).sum()
    }

    pub fn total_local_price(&self) -> Decimal {
        self.items.iter().map(Item::local_subtotal).sum()
    }

    pub fn total_quantity(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }

    /// Per-line weights in input order, the allocation weights for shipping cost.
    pub fn line_weights_g(&self) -> Vec<f64> {
        self.items.iter().map(Item::line_weight_g).collect()
    }
}

/// Outer box dimensions in centimetres.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoxDims {
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

impl Default for BoxDims {
    fn default() -> Self {
        Self {
            length: 30.0,
            width: 20.0,
            height: 15.0,
        }
    }
}

impl BoxDims {
    pub fn new(length: f64, width: f64, height: f64) -> Self {
        Self {
            length,
            width,
            height,
        }
    }

    /// True when every side is a positive finite number.
    pub fn is_valid(&self) -> bool {
        [self.length, self.width, self.height]
            .iter()
            .all(|side| side.is_finite() && *side > 0.0)
    }

    /// Volume in cubic centimetres; zero for a degenerate box.
    pub fn volume(&self) -> f64 {
        if self.is_valid() {
            self.length * self.width * self.height
        } else {
            0.0
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoxPatch {
    pub length: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

/// Shipping carriers the estimate service can price.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Carrier {
    #[default]
    Ecms,
    Dhl,
    Ems,
}

impl Carrier {
    pub const ALL: [Carrier; 3] = [Carrier::Ecms, Carrier::Dhl, Carrier::Ems];

    /// Short key used in config and fingerprints.
    pub fn key(&self) -> &'static str {
        match self {
            Carrier::Ecms => "ecms",
            Carrier::Dhl => "dhl",
            Carrier::Ems => "ems",
        }
    }

    /// Method name the estimate service uses for this carrier.
    pub fn service_name(&self) -> &'static str {
        match self {
            Carrier::Ecms => "ECMS",
            Carrier::Dhl => "DHL",
            Carrier::Ems => "EMS",
        }
    }
}

impl fmt::Display for Carrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service_name())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown carrier: {0}")]
pub struct UnknownCarrier(String);

impl FromStr for Carrier {
    type Err = UnknownCarrier;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Carrier::ALL
            .into_iter()
            .find(|carrier| {
                carrier.key().eq_ignore_ascii_case(value.trim())
                    || carrier.service_name().eq_ignore_ascii_case(value.trim())
            })
            .ok_or_else(|| UnknownCarrier(value.to_string()))
    }
}

pub(crate) fn sanitize_non_negative(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn draft(name: &str, weight_g: f64, quantity: u32) -> ItemDraft {
        ItemDraft {
            name: name.to_string(),
            weight_g,
            price_origin: dec!(10),
            price_local: dec!(14.5),
            quantity,
        }
    }

    #[test]
    fn totals_are_quantity_weighted() {
        let mut list = ItemList::empty();
        list.add(draft("mug", 350.0, 2));
        list.add(draft("book", 600.0, 1));

        assert_eq!(list.total_weight_g(), 1300.0);
        assert_eq!(list.total_quantity(), 3);
        assert_eq!(list.total_origin_price(), dec!(30));
        assert_eq!(list.total_local_price(), dec!(43.5));
        assert_eq!(list.line_weights_g(), vec![700.0, 600.0]);
    }

    #[test]
    fn update_and_remove_by_id() {
        let mut list = ItemList::empty();
        let id = list.add_blank();
        assert_eq!(list.get(&id).map(|item| item.quantity), Some(1));

        let updated = list.update(
            &id,
            ItemPatch {
                name: Some("lamp".to_string()),
                weight_g: Some(-20.0),
                quantity: Some(0),
                ..ItemPatch::default()
            },
        );
        assert!(updated);
        let item = list.get(&id).cloned().unwrap();
        assert_eq!(item.name, "lamp");
        assert_eq!(item.weight_g, 0.0);
        assert_eq!(item.quantity, 1);

        assert!(!list.update("missing", ItemPatch::default()));
        assert!(list.remove(&id));
        assert!(list.is_empty());
        assert!(!list.remove(&id));
    }

    #[test]
    fn non_finite_weight_counts_as_zero() {
        let list = ItemList::from_items(vec![Item {
            id: "a".to_string(),
            name: "broken".to_string(),
            weight_g: f64::NAN,
            price_origin: dec!(1),
            price_local: dec!(1),
            quantity: 3,
        }]);
        assert_eq!(list.total_weight_g(), 0.0);
    }

    #[test]
    fn loaded_items_are_clamped() {
        let list: ItemList = serde_json::from_str(
            r#"[{"id":"a","name":"bent","weight_g":-20.0,"price_origin":"-3","price_local":"5","quantity":0}]"#,
        )
        .unwrap();
        let item = &list.items()[0];
        assert_eq!(item.weight_g, 0.0);
        assert_eq!(item.price_origin, dec!(0));
        assert_eq!(item.price_local, dec!(5));
        assert_eq!(item.quantity, 1);

        let json = serde_json::to_value(&list).unwrap();
        assert!(json.is_array());
    }

    #[test]
    fn default_list_has_sample_row() {
        let list = ItemList::default();
        assert_eq!(list.len(), 1);
        assert_eq!(list.items()[0].name, "Sample");
        assert_eq!(list.total_weight_g(), 500.0);
    }

    #[test]
    fn carrier_parses_key_or_service_name() {
        assert_eq!("ecms".parse::<Carrier>().unwrap(), Carrier::Ecms);
        assert_eq!("DHL".parse::<Carrier>().unwrap(), Carrier::Dhl);
        assert_eq!(" ems ".parse::<Carrier>().unwrap(), Carrier::Ems);
        assert!("fedex".parse::<Carrier>().is_err());
    }

    #[test]
    fn degenerate_box_has_no_volume() {
        assert_eq!(BoxDims::new(10.0, 10.0, 10.0).volume(), 1000.0);
        assert_eq!(BoxDims::new(10.0, 0.0, 10.0).volume(), 0.0);
        assert_eq!(BoxDims::new(10.0, f64::INFINITY, 10.0).volume(), 0.0);
    }
}
