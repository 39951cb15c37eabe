//! Chargeable weight: actual weight plus packing overhead versus volumetric weight.

use serde::{Deserialize, Serialize};

use super::entities::{sanitize_non_negative, BoxDims, BoxPatch, Item};

pub const GRAMS_PER_KG: f64 = 1000.0;

/// cm³ per kg of volumetric weight.
pub const DEFAULT_VOLUMETRIC_DIVISOR: f64 = 5000.0;

pub const DEFAULT_OVERHEAD_PCT: f64 = 6.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightResult {
    /// Sum of item weights, kg.
    pub actual_raw_kg: f64,
    pub overhead_pct: f64,
    pub actual_plus_overhead_kg: f64,
    pub volumetric_kg: f64,
    /// `max(actual_plus_overhead_kg, volumetric_kg)`.
    pub chargeable_kg: f64,
}

impl WeightResult {
    pub fn chargeable_g(&self) -> f64 {
        self.chargeable_kg * GRAMS_PER_KG
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeightModel {
    volumetric_divisor: f64,
}

impl Default for WeightModel {
    fn default() -> Self {
        Self {
            volumetric_divisor: DEFAULT_VOLUMETRIC_DIVISOR,
        }
    }
}

impl WeightModel {
    /// Non-positive or non-finite divisors fall back to the default.
    pub fn new(volumetric_divisor: f64) -> Self {
        Self {
            volumetric_divisor: valid_divisor(volumetric_divisor)
                .unwrap_or(DEFAULT_VOLUMETRIC_DIVISOR),
        }
    }

    pub fn volumetric_divisor(&self) -> f64 {
        self.volumetric_divisor
    }

    pub fn volumetric_kg(&self, dims: &BoxDims) -> f64 {
        dims.volume() / self.volumetric_divisor
    }

    pub fn chargeable_weight(
        &self,
        items: &[Item],
        dims: &BoxDims,
        overhead_pct: f64,
    ) -> WeightResult {
        let overhead_pct = sanitize_non_negative(overhead_pct);
        let actual_raw_kg =
            items.iter().map(Item::line_weight_g).sum::<f64>() / GRAMS_PER_KG;
        let actual_plus_overhead_kg = actual_raw_kg * (1.0 + overhead_pct / 100.0);
        let volumetric_kg = self.volumetric_kg(dims);

        WeightResult {
            actual_raw_kg,
            overhead_pct,
            actual_plus_overhead_kg,
            volumetric_kg,
            chargeable_kg: actual_plus_overhead_kg.max(volumetric_kg),
        }
    }
}

/// The box and margin settings that feed the weight model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PackageConfig {
    pub dims: BoxDims,
    pub volumetric_divisor: f64,
    pub overhead_pct: f64,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            dims: BoxDims::default(),
            volumetric_divisor: DEFAULT_VOLUMETRIC_DIVISOR,
            overhead_pct: DEFAULT_OVERHEAD_PCT,
        }
    }
}

impl PackageConfig {
    pub fn set_box(&mut self, patch: BoxPatch) {
        if let Some(length) = patch.length {
            self.dims.length = length;
        }
        if let Some(width) = patch.width {
            self.dims.width = width;
        }
        if let Some(height) = patch.height {
            self.dims.height = height;
        }
    }

    pub fn set_overhead_pct(&mut self, pct: f64) {
        self.overhead_pct = sanitize_non_negative(pct);
    }

    /// Ignores non-positive or non-finite divisors.
    pub fn set_volumetric_divisor(&mut self, divisor: f64) {
        if let Some(divisor) = valid_divisor(divisor) {
            self.volumetric_divisor = divisor;
        }
    }

    pub fn model(&self) -> WeightModel {
        WeightModel::new(self.volumetric_divisor)
    }

    pub fn compute(&self, items: &[Item]) -> WeightResult {
        self.model()
            .chargeable_weight(items, &self.dims, self.overhead_pct)
    }
}

fn valid_divisor(divisor: f64) -> Option<f64> {
    (divisor.is_finite() && divisor > 0.0).then_some(divisor)
}
