//! Shared test utilities for executor module tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::EngineConfig;
use crate::datamgr::{source_channel, DataManager, SourceBatch, SourceHandle, SourceRequest, SourceSender};

use super::batch::{BatchBuilder, TupleBatch};
use super::context::CommandContext;
use super::datum::Datum;
use super::error::ExecutorResult;
use super::row::Row;
use super::{BatchProducer, BatchStatus, NodeId, RelationalNode};

/// Producer that replays a fixed list of statuses, then reports Done
pub struct ScriptedProducer {
    script: VecDeque<BatchStatus>,
}

impl ScriptedProducer {
    pub fn new(script: Vec<BatchStatus>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

impl BatchProducer for ScriptedProducer {
    fn next_batch(&mut self) -> ExecutorResult<BatchStatus> {
        Ok(self.script.pop_front().unwrap_or(BatchStatus::Done))
    }
}

#[derive(Default)]
struct ScriptedState {
    scripts: VecDeque<Vec<SourceBatch>>,
    senders: Vec<SourceSender>,
    requests: Vec<SourceRequest>,
}

/// Data manager whose sources answer from canned scripts
///
/// Each registration consumes the next script. A `pending()` manager sends
/// nothing until the test calls `deliver`.
pub struct ScriptedDataManager {
    state: Mutex<ScriptedState>,
    pending: bool,
}

impl ScriptedDataManager {
    pub fn new(scripts: Vec<Vec<SourceBatch>>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ScriptedState {
                scripts: scripts.into(),
                ..Default::default()
            }),
            pending: false,
        })
    }

    pub fn pending() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ScriptedState::default()),
            pending: true,
        })
    }

    /// Send a batch on the `index`-th registered request
    pub fn deliver(&self, index: usize, batch: SourceBatch) {
        let state = self.state.lock();
        if let Some(sender) = state.senders.get(index) {
            let _ = sender.try_send(Ok(batch));
        }
    }

    pub fn requests(&self) -> Vec<SourceRequest> {
        self.state.lock().requests.clone()
    }
}

impl DataManager for ScriptedDataManager {
    fn register_request(
        &self,
        request: SourceRequest,
        _ctx: &CommandContext,
    ) -> ExecutorResult<SourceHandle> {
        let (sender, handle) = source_channel(64, request.request_id.clone(), request.node_id, None);
        let mut state = self.state.lock();
        if !self.pending {
            if let Some(script) = state.scripts.pop_front() {
                for batch in script {
                    sender.try_send(Ok(batch))?;
                }
            }
        }
        state.senders.push(sender);
        state.requests.push(request);
        Ok(handle)
    }
}

/// Context over `dm` with the given processor batch size
pub fn context_with(dm: Arc<ScriptedDataManager>, batch_size: usize) -> Arc<CommandContext> {
    Arc::new(
        CommandContext::new("test-request", "tester", dm)
            .with_config(EngineConfig::default().with_processor_batch_size(batch_size)),
    )
}

/// Context with no sources
pub fn empty_context(batch_size: usize) -> Arc<CommandContext> {
    context_with(ScriptedDataManager::new(Vec::new()), batch_size)
}

/// Pull a node until its terminal batch, retrying through Blocked
pub fn drain<N>(node: &mut N) -> ExecutorResult<Vec<TupleBatch>>
where
    N: RelationalNode + ?Sized,
{
    let mut batches = Vec::new();
    let mut blocked = 0;
    loop {
        match node.next_batch_direct()? {
            BatchStatus::Ready(batch) => {
                let terminal = batch.is_terminal();
                batches.push(batch);
                if terminal {
                    return Ok(batches);
                }
            }
            BatchStatus::Blocked => {
                blocked += 1;
                assert!(blocked < 10_000, "node never unblocked");
            }
            BatchStatus::Done => return Ok(batches),
        }
    }
}

/// All rows of a node's output
pub fn drain_rows<N>(node: &mut N) -> ExecutorResult<Vec<Row>>
where
    N: RelationalNode + ?Sized,
{
    Ok(drain(node)?
        .into_iter()
        .flat_map(|b| b.into_rows())
        .collect())
}

pub fn int_rows(values: &[i64]) -> Vec<Row> {
    values.iter().map(|v| Row::single(Datum::Int(*v))).collect()
}

pub fn ints(rows: &[Row]) -> Vec<i64> {
    rows.iter()
        .map(|r| r.get(0).ok().and_then(|d| d.as_int()).unwrap_or(-1))
        .collect()
}

/// Leaf node over fixed rows; optionally reports Blocked before every batch
pub struct ValuesNode {
    id: NodeId,
    columns: Vec<String>,
    rows: Vec<Row>,
    position: usize,
    output: BatchBuilder,
    blocking: bool,
    block_next: bool,
    closed: Arc<AtomicUsize>,
}

impl ValuesNode {
    pub fn new(columns: &[&str], rows: Vec<Row>) -> Self {
        Self {
            id: 100,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
            position: 0,
            output: BatchBuilder::new(2),
            blocking: false,
            block_next: false,
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Counter of `close()` calls, readable after the node is moved
    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        self.closed.clone()
    }

    pub fn blocking(mut self) -> Self {
        self.blocking = true;
        self.block_next = true;
        self
    }
}

impl RelationalNode for ValuesNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &'static str {
        "Values"
    }

    fn output_columns(&self) -> &[String] {
        &self.columns
    }

    fn initialize(&mut self, ctx: Arc<CommandContext>) {
        self.output.set_batch_size(ctx.batch_size());
    }

    fn open(&mut self) -> ExecutorResult<()> {
        Ok(())
    }

    fn next_batch_direct(&mut self) -> ExecutorResult<BatchStatus> {
        if self.output.is_terminated() {
            return Ok(BatchStatus::Done);
        }
        if self.block_next {
            self.block_next = false;
            return Ok(BatchStatus::Blocked);
        }
        self.block_next = self.blocking;
        while !self.output.is_full() && self.position < self.rows.len() {
            self.output.add_row(self.rows[self.position].clone());
            self.position += 1;
        }
        let terminal = self.position >= self.rows.len();
        Ok(BatchStatus::Ready(self.output.take_batch(terminal)?))
    }

    fn close(&mut self) -> ExecutorResult<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn cancel(&mut self) {}

    fn reset(&mut self) {
        self.position = 0;
        self.output.reset();
        self.block_next = self.blocking;
    }

    fn clone_node(&self) -> Box<dyn RelationalNode> {
        let mut copy = ValuesNode::new(&[], self.rows.clone());
        copy.columns = self.columns.clone();
        copy.blocking = self.blocking;
        copy.block_next = self.blocking;
        Box::new(copy)
    }
}
