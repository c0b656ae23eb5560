//! Connector-backed data manager
//!
//! Each registered request runs as a tokio task: the connector executes the
//! command, and the results are streamed back to the access node in chunks
//! through a bounded channel.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::executor::{CommandContext, ExecutorError, ExecutorResult, Row};

use super::{source_channel, DataManager, SourceBatch, SourceHandle, SourceRequest, SourceSender};

/// Executes commands against one kind of physical source
#[async_trait]
pub trait Connector: Send + Sync {
    /// Name that source bindings refer to
    fn name(&self) -> &str;

    /// Execute `request.command`
    ///
    /// Queries return their result rows; updates return one row holding the
    /// update count; a batched command returns one count row per command.
    async fn execute(&self, request: &SourceRequest) -> ExecutorResult<Vec<Row>>;
}

/// `DataManager` that runs connectors on a tokio runtime
pub struct ConnectorDataManager {
    runtime: Handle,
    connectors: HashMap<String, Arc<dyn Connector>>,
    fetch_size: usize,
}

impl ConnectorDataManager {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            connectors: HashMap::new(),
            fetch_size: crate::config::DEFAULT_PROCESSOR_BATCH_SIZE,
        }
    }

    #[must_use]
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connectors
            .insert(connector.name().to_lowercase(), connector);
        self
    }

    /// Rows per chunk sent back to the access node
    #[must_use]
    pub fn with_fetch_size(mut self, fetch_size: usize) -> Self {
        self.fetch_size = fetch_size.max(1);
        self
    }

    pub fn connector(&self, name: &str) -> Option<&Arc<dyn Connector>> {
        self.connectors.get(&name.to_lowercase())
    }
}

impl DataManager for ConnectorDataManager {
    fn register_request(
        &self,
        request: SourceRequest,
        ctx: &CommandContext,
    ) -> ExecutorResult<SourceHandle> {
        let connector = self.connector(&request.connector).cloned().ok_or_else(|| {
            ExecutorError::Source {
                source_name: request.source.clone(),
                message: format!("no connector named '{}'", request.connector),
            }
        })?;

        let (sender, handle) = source_channel(
            ctx.config().source_channel_capacity,
            request.request_id.clone(),
            request.node_id,
            Some(ctx.work_notifier()),
        );
        debug!(
            request_id = %request.request_id,
            node_id = request.node_id,
            source = %request.source,
            command = %request.command,
            "registered source request"
        );
        self.runtime
            .spawn(run_request(connector, request, sender, self.fetch_size));
        Ok(handle)
    }
}

async fn run_request(
    connector: Arc<dyn Connector>,
    request: SourceRequest,
    sender: SourceSender,
    fetch_size: usize,
) {
    if sender.is_cancelled() {
        return;
    }
    match connector.execute(&request).await {
        Ok(rows) => {
            let total = rows.len();
            let mut rows = rows.into_iter().peekable();
            loop {
                let chunk: Vec<Row> = rows.by_ref().take(fetch_size).collect();
                let last = rows.peek().is_none();
                if !sender.send(Ok(SourceBatch::new(chunk, last))).await {
                    debug!(
                        request_id = %request.request_id,
                        node_id = request.node_id,
                        "source request cancelled"
                    );
                    return;
                }
                if last {
                    break;
                }
            }
            debug!(
                request_id = %request.request_id,
                node_id = request.node_id,
                rows = total,
                "source request complete"
            );
        }
        Err(e) => {
            warn!(
                request_id = %request.request_id,
                node_id = request.node_id,
                source = %request.source,
                error = %e,
                "source request failed"
            );
            let error = match e {
                e @ ExecutorError::Source { .. } => e,
                other => ExecutorError::Source {
                    source_name: request.source.clone(),
                    message: other.to_string(),
                },
            };
            sender.send(Err(error)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datamgr::SourcePoll;
    use crate::executor::Datum;
    use crate::sql::{Command, Query};

    struct Rows(usize);

    #[async_trait]
    impl Connector for Rows {
        fn name(&self) -> &str {
            "rows"
        }

        async fn execute(&self, _request: &SourceRequest) -> ExecutorResult<Vec<Row>> {
            Ok((0..self.0)
                .map(|i| Row::single(Datum::Int(i as i64)))
                .collect())
        }
    }

    fn request(connector: &str) -> SourceRequest {
        SourceRequest {
            request_id: "r1".to_string(),
            node_id: 1,
            model: "m".to_string(),
            source: "m".to_string(),
            connector: connector.to_string(),
            command: Command::Query(Query::new("g", ["a"])),
        }
    }

    async fn drain(handle: &mut SourceHandle) -> ExecutorResult<Vec<SourceBatch>> {
        let mut batches = Vec::new();
        loop {
            match handle.poll()? {
                SourcePoll::Batch(b) => {
                    let last = b.last;
                    batches.push(b);
                    if last {
                        return Ok(batches);
                    }
                }
                SourcePoll::Blocked => tokio::task::yield_now().await,
            }
        }
    }

    #[tokio::test]
    async fn test_rows_chunked_by_fetch_size() {
        let dm = Arc::new(
            ConnectorDataManager::new(Handle::current())
                .with_connector(Arc::new(Rows(5)))
                .with_fetch_size(2),
        );
        let ctx = CommandContext::new("r1", "test", dm.clone());
        let mut handle = dm.register_request(request("rows"), &ctx).unwrap();

        let batches = drain(&mut handle).await.unwrap();
        let sizes: Vec<usize> = batches.iter().map(|b| b.rows.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_empty_result_sends_single_last_batch() {
        let dm = Arc::new(
            ConnectorDataManager::new(Handle::current()).with_connector(Arc::new(Rows(0))),
        );
        let ctx = CommandContext::new("r1", "test", dm.clone());
        let mut handle = dm.register_request(request("rows"), &ctx).unwrap();

        let batches = drain(&mut handle).await.unwrap();
        assert_eq!(batches, vec![SourceBatch::new(Vec::new(), true)]);
    }

    #[tokio::test]
    async fn test_unknown_connector() {
        let dm = Arc::new(ConnectorDataManager::new(Handle::current()));
        let ctx = CommandContext::new("r1", "test", dm.clone());
        let err = dm.register_request(request("missing"), &ctx).unwrap_err();
        assert!(err.is_processing());
    }
}
