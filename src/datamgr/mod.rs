//! Data manager
//!
//! Access nodes hand source commands to a `DataManager` and poll the
//! returned `SourceHandle` for results. Work happens elsewhere (a tokio task
//! for `ConnectorDataManager`); a poll never waits, it reports Blocked when
//! nothing has arrived yet.

pub mod connector;
pub mod memory;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tokio::sync::Notify;

use crate::executor::{CommandContext, ExecutorError, ExecutorResult, NodeId, Row};
use crate::sql::Command;

pub use connector::{Connector, ConnectorDataManager};
pub use memory::MemoryConnector;

/// One command for one physical source
#[derive(Debug, Clone)]
pub struct SourceRequest {
    pub request_id: String,
    pub node_id: NodeId,
    pub model: String,
    /// Source binding name
    pub source: String,
    /// Connector servicing the binding
    pub connector: String,
    pub command: Command,
}

/// Rows delivered by a source; `last` marks the end of its results
#[derive(Debug, Clone, PartialEq)]
pub struct SourceBatch {
    pub rows: Vec<Row>,
    pub last: bool,
}

impl SourceBatch {
    pub fn new(rows: Vec<Row>, last: bool) -> Self {
        Self { rows, last }
    }
}

/// Result of polling a source handle
#[derive(Debug, Clone, PartialEq)]
pub enum SourcePoll {
    Batch(SourceBatch),
    Blocked,
}

/// Accepts source requests for execution
pub trait DataManager: Send + Sync {
    fn register_request(
        &self,
        request: SourceRequest,
        ctx: &CommandContext,
    ) -> ExecutorResult<SourceHandle>;
}

/// Node-side end of an outstanding source request
#[derive(Debug)]
pub struct SourceHandle {
    receiver: mpsc::Receiver<ExecutorResult<SourceBatch>>,
    cancelled: Arc<AtomicBool>,
    request_id: String,
    node_id: NodeId,
    done: bool,
    closed: bool,
}

/// Producer-side end of a source request
#[derive(Debug, Clone)]
pub struct SourceSender {
    sender: mpsc::Sender<ExecutorResult<SourceBatch>>,
    cancelled: Arc<AtomicBool>,
    notify: Option<Arc<Notify>>,
}

/// Create a connected sender/handle pair
pub fn source_channel(
    capacity: usize,
    request_id: impl Into<String>,
    node_id: NodeId,
    notify: Option<Arc<Notify>>,
) -> (SourceSender, SourceHandle) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let cancelled = Arc::new(AtomicBool::new(false));
    (
        SourceSender {
            sender,
            cancelled: cancelled.clone(),
            notify,
        },
        SourceHandle {
            receiver,
            cancelled,
            request_id: request_id.into(),
            node_id,
            done: false,
            closed: false,
        },
    )
}

impl SourceHandle {
    /// Take whatever the source has delivered, without waiting
    pub fn poll(&mut self) -> ExecutorResult<SourcePoll> {
        if self.done {
            return Ok(SourcePoll::Batch(SourceBatch::new(Vec::new(), true)));
        }
        match self.receiver.try_recv() {
            Ok(Ok(batch)) => {
                self.done = batch.last;
                Ok(SourcePoll::Batch(batch))
            }
            Ok(Err(e)) => {
                self.done = true;
                Err(e)
            }
            Err(TryRecvError::Empty) => Ok(SourcePoll::Blocked),
            Err(TryRecvError::Disconnected) => {
                self.done = true;
                Err(ExecutorError::component(
                    self.request_id.clone(),
                    Some(self.node_id),
                    "source closed before its final batch",
                ))
            }
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Ask the producer to stop; further results are dropped
    pub fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::Release);
        self.receiver.close();
    }

    /// Release the request; returns false if it was already released
    pub fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        if !self.done {
            self.cancelled.store(true, Ordering::Release);
        }
        self.receiver.close();
        true
    }
}

impl SourceSender {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire) || self.sender.is_closed()
    }

    /// Deliver a batch, waiting for channel capacity
    ///
    /// Returns false once the receiving node has gone away.
    pub async fn send(&self, item: ExecutorResult<SourceBatch>) -> bool {
        if self.is_cancelled() {
            return false;
        }
        let sent = self.sender.send(item).await.is_ok();
        self.wake();
        sent
    }

    /// Deliver without waiting; fails if the channel is full or closed
    pub fn try_send(&self, item: ExecutorResult<SourceBatch>) -> ExecutorResult<()> {
        match self.sender.try_send(item) {
            Ok(()) => {
                self.wake();
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                Err(ExecutorError::Buffer("source channel full".to_string()))
            }
            Err(TrySendError::Closed(_)) => {
                Err(ExecutorError::Buffer("source channel closed".to_string()))
            }
        }
    }

    fn wake(&self) {
        if let Some(notify) = &self.notify {
            notify.notify_one();
        }
    }
}
