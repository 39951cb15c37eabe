use serde::{Deserialize, Serialize};

use super::entities::{Carrier, ItemList};
use super::weight::PackageConfig;

/// User state that survives restarts. Quote results are never saved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub items: ItemList,
    #[serde(default)]
    pub package: PackageConfig,
    #[serde(default)]
    pub carrier: Carrier,
    #[serde(default = "default_include_service_fee")]
    pub include_service_fee: bool,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            items: ItemList::default(),
            package: PackageConfig::default(),
            carrier: Carrier::default(),
            include_service_fee: default_include_service_fee(),
        }
    }
}

fn default_include_service_fee() -> bool {
    true
}
