//! Shared test utilities for planner module tests

use crate::catalog::{
    AccessPattern, BasicCapabilitiesFinder, Catalog, ColumnDef, DataType, GroupDef, ModelDef,
    SourceBinding, SourceCapabilities,
};

/// Catalog with:
/// - `pm.parts` (id, name, qty) on single-source model `pm`
/// - `pm.lookup` (colx, coly) requiring access pattern {colx}
/// - `ms.items` (id, name, SOURCE_NAME) on multi-source model `ms` with sources a, b, c
/// - `legacy.orders` (order_id, customer) on model `legacy`
pub fn test_catalog() -> Catalog {
    let mut catalog = Catalog::new();
    catalog.create_model(ModelDef::new("pm", "mem")).unwrap();
    catalog
        .create_model(ModelDef::multi_source(
            "ms",
            vec![
                SourceBinding::new("a", "mem"),
                SourceBinding::new("b", "mem"),
                SourceBinding::new("c", "mem"),
            ],
        ))
        .unwrap();
    catalog.create_model(ModelDef::new("legacy", "mem")).unwrap();

    catalog
        .create_group(
            GroupDef::new("pm.parts", "pm")
                .column(ColumnDef::new("id", DataType::Int).nullable(false))
                .column(ColumnDef::new("name", DataType::Text))
                .column(ColumnDef::new("qty", DataType::Int)),
        )
        .unwrap();
    catalog
        .create_group(
            GroupDef::new("pm.lookup", "pm")
                .column(ColumnDef::new("colx", DataType::Int))
                .column(ColumnDef::new("coly", DataType::Int))
                .access_pattern(AccessPattern::new(["colx"])),
        )
        .unwrap();
    catalog
        .create_group(
            GroupDef::new("ms.items", "ms")
                .column(ColumnDef::new("id", DataType::Int))
                .column(ColumnDef::new("name", DataType::Text))
                .column(ColumnDef::new("SOURCE_NAME", DataType::Text)),
        )
        .unwrap();
    catalog
        .create_group(
            GroupDef::new("legacy.orders", "legacy")
                .column(ColumnDef::new("order_id", DataType::Int))
                .column(ColumnDef::new("customer", DataType::Text)),
        )
        .unwrap();
    catalog
}

/// Every model has full pushdown except `legacy`
pub fn test_capabilities() -> BasicCapabilitiesFinder {
    BasicCapabilitiesFinder::default().with_model("legacy", SourceCapabilities::minimal())
}
