//! Portable JSON document of a warehouse's full layout tree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::configuration::LayoutConfiguration;
use crate::layout::Layout;
use crate::occupancy::OccupancyStats;
use crate::warehouse::{Warehouse, WarehouseId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutExport {
    pub warehouse_id: WarehouseId,
    pub name: String,
    pub description: String,
    pub configuration: Option<LayoutConfiguration>,
    pub total_slots: u32,
    pub occupied_slots: u32,
    pub layout: Layout,
    pub occupancy: OccupancyStats,
    pub generated_at: DateTime<Utc>,
}

impl LayoutExport {
    pub fn from_warehouse(warehouse: &Warehouse, generated_at: DateTime<Utc>) -> Self {
        let occupancy = warehouse.occupancy_stats();
        Self {
            warehouse_id: warehouse.id_typed(),
            name: warehouse.name().to_string(),
            description: warehouse.description().to_string(),
            configuration: warehouse.configuration(),
            total_slots: occupancy.total,
            occupied_slots: occupancy.occupied,
            layout: warehouse.layout().clone(),
            occupancy,
            generated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::DEFAULT_SLOT_CAPACITY;
    use crate::pricing::Pricing;
    use crate::warehouse::{CreateWarehouse, WarehouseCommand};
    use granary_core::{Aggregate, AggregateId, OwnerId};

    fn warehouse() -> Warehouse {
        let id = WarehouseId::new(AggregateId::new());
        let mut warehouse = Warehouse::empty(id);
        let events = warehouse
            .handle(&WarehouseCommand::CreateWarehouse(CreateWarehouse {
                warehouse_id: id,
                owner_id: OwnerId::new(),
                name: "Depot".to_string(),
                description: "Riverside".to_string(),
                configuration: LayoutConfiguration::new(1, 2, 1, 2),
                pricing: Pricing::default(),
                slot_capacity: DEFAULT_SLOT_CAPACITY,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        for event in &events {
            warehouse.apply(event);
        }
        warehouse
    }

    #[test]
    fn export_serializes_the_whole_tree() {
        let warehouse = warehouse();
        let export = LayoutExport::from_warehouse(&warehouse, Utc::now());
        assert_eq!(export.total_slots, 4);
        assert_eq!(export.occupied_slots, 0);

        let json = serde_json::to_value(&export).unwrap();
        assert_eq!(json["name"], "Depot");
        assert_eq!(json["configuration"]["blocks_per_building"], 2);
        assert_eq!(json["layout"][0]["label"], "Building 1");
        assert_eq!(json["layout"][0]["blocks"][1]["label"], "B");
        assert_eq!(json["layout"][0]["blocks"][1]["slots"][1]["label"], "B2");
        assert_eq!(json["layout"][0]["blocks"][0]["slots"][0]["status"], "empty");

        let back: LayoutExport = serde_json::from_value(json).unwrap();
        assert_eq!(back, export);
    }
}
