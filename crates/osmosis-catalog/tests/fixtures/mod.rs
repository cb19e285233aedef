//! Warehouse tables shared by the adapter integration tests

use osmosis_catalog::{WarehouseColumn, WarehouseTable};

pub const EMAIL_TAG: &str = "projects/example-project/locations/us/taxonomies/123456/policyTags/789";

/// Customers table with a tagged email column
pub fn customers_table() -> WarehouseTable {
    WarehouseTable::new("dataform", "customers")
        .with_column(WarehouseColumn::new("id").with_description("Customer identifier"))
        .with_column(
            WarehouseColumn::new("email")
                .with_description("Primary email address")
                .with_policy_tags([EMAIL_TAG]),
        )
        .with_column(WarehouseColumn::new("created_at"))
}

/// Orders table without any descriptions
pub fn orders_table() -> WarehouseTable {
    WarehouseTable::new("dataform", "orders")
        .with_column(WarehouseColumn::new("id"))
        .with_column(WarehouseColumn::new("customer_id"))
        .with_column(WarehouseColumn::new("total_amount"))
}

/// Raw events table in a separate dataset
pub fn events_table() -> WarehouseTable {
    WarehouseTable::new("raw", "events")
        .with_column(WarehouseColumn::new("event_id").with_description("Event identifier"))
        .with_column(WarehouseColumn::new("payload"))
}
