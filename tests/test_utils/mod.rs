//! Shared fixtures for integration tests
//!
//! `Federation` wires a catalog to in-memory connectors:
//! - `pm.parts` (id, name, qty) and `pm.lookup` (colx, coly; pattern {colx})
//!   on single-source model `pm`, connector `pm`
//! - `ms.items` (id, name, SOURCE_NAME) on multi-source model `ms`, with
//!   sources a, b, c each on its own connector
//! - `legacy.orders` (order_id, customer) on model `legacy`, which only
//!   accepts plain commands

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use fedql::catalog::{
    AccessPattern, BasicCapabilitiesFinder, Catalog, ColumnDef, DataType, GroupDef, ModelDef,
    SourceBinding, SourceCapabilities,
};
use fedql::config::EngineConfig;
use fedql::datamgr::{ConnectorDataManager, MemoryConnector};
use fedql::executor::{
    drive, CommandContext, Datum, ExecutorResult, ProcessorPlan, QueryProcessor, Row, TupleBuffer,
};
use fedql::planner::{LogicalCommand, Optimizer};
use tokio::runtime::Handle;

/// Install a subscriber honouring RUST_LOG; safe to call from every test
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct Federation {
    pub catalog: Catalog,
    pub capabilities: BasicCapabilitiesFinder,
    pub pm: Arc<MemoryConnector>,
    /// Connectors of sources a, b and c
    pub sources: Vec<Arc<MemoryConnector>>,
    pub legacy: Arc<MemoryConnector>,
    data_manager: Arc<ConnectorDataManager>,
}

impl Federation {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Fixture whose `pm` connector answers only after `latency`
    pub fn with_latency(latency: Duration) -> Self {
        Self::build(Some(latency))
    }

    fn build(latency: Option<Duration>) -> Self {
        init_tracing();

        let mut pm = MemoryConnector::new("pm").with_table(
            "pm.parts",
            ["id", "name", "qty"],
            vec![
                part(1, "bolt", 10),
                part(2, "nut", 0),
                part(3, "gear", 5),
            ],
        );
        if let Some(latency) = latency {
            pm = pm.with_latency(latency);
        }
        let pm = Arc::new(pm);

        let items: [(&str, Vec<Row>); 3] = [
            ("ms_a", vec![item(1, "apple"), item(2, "avocado")]),
            ("ms_b", vec![item(3, "banana")]),
            ("ms_c", vec![item(4, "cherry")]),
        ];
        let sources: Vec<Arc<MemoryConnector>> = items
            .into_iter()
            .map(|(name, rows)| {
                Arc::new(MemoryConnector::new(name).with_table("ms.items", ["id", "name"], rows))
            })
            .collect();

        let legacy = Arc::new(MemoryConnector::new("legacy").with_table(
            "legacy.orders",
            ["order_id", "customer"],
            vec![
                Row::new(vec![Datum::Int(100), Datum::from("acme")]),
                Row::new(vec![Datum::Int(101), Datum::from("globex")]),
            ],
        ));

        let mut data_manager = ConnectorDataManager::new(Handle::current())
            .with_connector(pm.clone())
            .with_connector(legacy.clone());
        for source in &sources {
            data_manager = data_manager.with_connector(source.clone());
        }

        Self {
            catalog: catalog(),
            capabilities: BasicCapabilitiesFinder::default()
                .with_model("legacy", SourceCapabilities::minimal()),
            pm,
            sources,
            legacy,
            data_manager: Arc::new(data_manager),
        }
    }

    pub fn context(&self, config: EngineConfig) -> Arc<CommandContext> {
        Arc::new(
            CommandContext::new("it-request", "tester", self.data_manager.clone())
                .with_config(config),
        )
    }

    /// Plan `command` against this federation
    pub fn plan(
        &self,
        command: LogicalCommand,
        ctx: &CommandContext,
    ) -> ExecutorResult<Box<dyn ProcessorPlan>> {
        Ok(Optimizer::new().optimize(command, &self.catalog, &self.capabilities, ctx)?)
    }

    pub fn processor(
        &self,
        command: LogicalCommand,
        config: EngineConfig,
    ) -> ExecutorResult<QueryProcessor> {
        let ctx = self.context(config);
        let plan = self.plan(command, &ctx)?;
        Ok(QueryProcessor::new(plan, ctx))
    }

    /// Plan and run `command` to completion with default settings
    pub async fn run(&self, command: LogicalCommand) -> ExecutorResult<TupleBuffer> {
        self.run_with(command, EngineConfig::default()).await
    }

    pub async fn run_with(
        &self,
        command: LogicalCommand,
        config: EngineConfig,
    ) -> ExecutorResult<TupleBuffer> {
        let mut processor = self.processor(command, config)?;
        drive(&mut processor).await?;
        Ok(processor.into_results())
    }

    /// Connector of multi-source binding `a`, `b` or `c`
    pub fn source(&self, name: &str) -> &Arc<MemoryConnector> {
        let idx = match name {
            "a" => 0,
            "b" => 1,
            _ => 2,
        };
        &self.sources[idx]
    }
}

fn catalog() -> Catalog {
    let mut catalog = Catalog::new();
    catalog.create_model(ModelDef::new("pm", "pm")).unwrap();
    catalog
        .create_model(ModelDef::multi_source(
            "ms",
            vec![
                SourceBinding::new("a", "ms_a"),
                SourceBinding::new("b", "ms_b"),
                SourceBinding::new("c", "ms_c"),
            ],
        ))
        .unwrap();
    catalog
        .create_model(ModelDef::new("legacy", "legacy"))
        .unwrap();

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

fn part(id: i64, name: &str, qty: i64) -> Row {
    Row::new(vec![Datum::Int(id), Datum::from(name), Datum::Int(qty)])
}

fn item(id: i64, name: &str) -> Row {
    Row::new(vec![Datum::Int(id), Datum::from(name)])
}

/// Result rows as plain values
pub fn values(buffer: &TupleBuffer) -> Vec<Vec<Datum>> {
    buffer.rows().map(|r| r.values().to_vec()).collect()
}

/// First column of every row as an integer
pub fn first_ints(buffer: &TupleBuffer) -> Vec<i64> {
    buffer
        .rows()
        .map(|r| r.values()[0].as_int().unwrap())
        .collect()
}
