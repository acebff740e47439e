//! Primitive type declarations.
//!
//! Primitives are non-product tokens (pallets, carriers, tools) that are
//! co-held or consumed by product processing and are routed between stores
//! and resources like products. The number of live instances of a type is
//! conserved unless the type is consumable.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimitiveData {
    /// Doubles as the primitive type name.
    pub id: String,
    #[serde(default)]
    pub description: String,
    /// Transport process used to move instances between stores and
    /// resources.
    pub transport_process: String,
    /// Stores that hold instances of this type.
    pub storages: Vec<String>,
    /// Initial stock per store, parallel to `storages`.
    pub quantity_in_storages: Vec<u32>,
    /// Consumable instances are destroyed on release instead of returned.
    #[serde(default)]
    pub becomes_consumable: bool,
}

impl PrimitiveData {
    pub fn total_initial_stock(&self) -> u32 {
        self.quantity_in_storages.iter().sum()
    }
}
