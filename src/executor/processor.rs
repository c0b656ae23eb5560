//! Query processor
//!
//! Drives one `ProcessorPlan` to completion in cooperative time slices,
//! collecting its output into a `TupleBuffer`. `process()` never waits on a
//! source: when the plan is blocked it returns `ProcessStatus::Blocked` and
//! the caller decides when to try again. `drive()` is the async loop that
//! waits for source progress between slices.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::buffer::TupleBuffer;
use super::collector::{BatchCollector, CollectStep};
use super::context::CommandContext;
use super::error::{ErrorCategory, ExecutorError, ExecutorResult};
use super::plan::ProcessorPlan;

/// Upper bound on a single wait for source progress in `drive`
const BLOCKED_WAIT: Duration = Duration::from_millis(50);

/// Outcome of one `process()` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// The result buffer is complete
    Done,
    /// Waiting on a source; call again once it made progress
    Blocked,
    /// The timeslice ran out with work remaining
    MoreWork,
}

/// Lifecycle of a processor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Created,
    Open,
    Done,
    Cancelled,
    Failed,
    /// Closed before the plan finished
    Closed,
}

/// Executes a plan and buffers its results
pub struct QueryProcessor {
    plan: Box<dyn ProcessorPlan>,
    ctx: Arc<CommandContext>,
    collector: BatchCollector,
    state: ProcessorState,
    plan_closed: bool,
}

impl QueryProcessor {
    pub fn new(mut plan: Box<dyn ProcessorPlan>, ctx: Arc<CommandContext>) -> Self {
        plan.initialize(ctx.clone());
        let buffer = TupleBuffer::new(plan.output_columns());
        Self {
            plan,
            ctx,
            collector: BatchCollector::new(buffer),
            state: ProcessorState::Created,
            plan_closed: false,
        }
    }

    pub fn state(&self) -> ProcessorState {
        self.state
    }

    pub fn context(&self) -> &Arc<CommandContext> {
        &self.ctx
    }

    /// Open the plan; sources start working immediately
    pub fn open(&mut self) -> ExecutorResult<()> {
        if self.state != ProcessorState::Created {
            return Err(self.misuse("open called twice"));
        }
        debug!(request_id = self.ctx.request_id(), "opening plan");
        match self.plan.open() {
            Ok(()) => {
                self.state = ProcessorState::Open;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Pull batches for at most `timeslice`
    pub fn process(&mut self, timeslice: Duration) -> ExecutorResult<ProcessStatus> {
        match self.state {
            ProcessorState::Created => self.open()?,
            ProcessorState::Open => {}
            ProcessorState::Done => return Ok(ProcessStatus::Done),
            ProcessorState::Cancelled => {
                self.collector.buffer_mut().close();
                self.close_plan()?;
                return Ok(ProcessStatus::Done);
            }
            ProcessorState::Failed => return Err(self.misuse("process called after failure")),
            ProcessorState::Closed => return Err(self.misuse("process called after close")),
        }

        let deadline = Instant::now() + timeslice;
        loop {
            let step = match self.collector.collect_batch(self.plan.as_mut()) {
                Ok(step) => step,
                Err(e) => return Err(self.fail(e)),
            };
            match step {
                CollectStep::Appended(_) => {
                    if Instant::now() >= deadline {
                        return Ok(ProcessStatus::MoreWork);
                    }
                }
                CollectStep::Blocked => return Ok(ProcessStatus::Blocked),
                CollectStep::Complete => {
                    self.state = ProcessorState::Done;
                    debug!(
                        request_id = self.ctx.request_id(),
                        rows = self.collector.buffer().row_count(),
                        "plan complete"
                    );
                    self.close_plan()?;
                    return Ok(ProcessStatus::Done);
                }
            }
        }
    }

    /// Request cooperative cancellation; idempotent
    pub fn cancel(&mut self) {
        if matches!(self.state, ProcessorState::Created | ProcessorState::Open) {
            debug!(request_id = self.ctx.request_id(), "cancelling plan");
            self.plan.cancel();
            self.state = ProcessorState::Cancelled;
        }
    }

    /// Release the plan; idempotent
    pub fn close(&mut self) -> ExecutorResult<()> {
        if matches!(self.state, ProcessorState::Created | ProcessorState::Open) {
            self.state = ProcessorState::Closed;
        }
        self.close_plan()
    }

    pub fn results(&self) -> &TupleBuffer {
        self.collector.buffer()
    }

    pub fn into_results(self) -> TupleBuffer {
        self.collector.into_buffer()
    }

    fn close_plan(&mut self) -> ExecutorResult<()> {
        if self.plan_closed {
            return Ok(());
        }
        self.plan_closed = true;
        debug!(request_id = self.ctx.request_id(), "closing plan");
        self.plan.close()
    }

    fn fail(&mut self, err: ExecutorError) -> ExecutorError {
        self.state = ProcessorState::Failed;
        match err.category() {
            ErrorCategory::Component => {
                warn!(request_id = self.ctx.request_id(), error = %err, "plan failed")
            }
            ErrorCategory::Processing => {
                debug!(request_id = self.ctx.request_id(), error = %err, "plan failed")
            }
        }
        if let Err(close_err) = self.close_plan() {
            debug!(
                request_id = self.ctx.request_id(),
                error = %close_err,
                "close after failure also failed"
            );
        }
        err
    }

    fn misuse(&self, message: &str) -> ExecutorError {
        ExecutorError::component(self.ctx.request_id(), None, message)
    }
}

/// Run a processor to completion, yielding between slices and waiting for
/// source progress while blocked
pub async fn drive(processor: &mut QueryProcessor) -> ExecutorResult<()> {
    let timeslice = processor.ctx.config().timeslice;
    let notifier = processor.ctx.work_notifier();
    loop {
        match processor.process(timeslice)? {
            ProcessStatus::Done => return Ok(()),
            ProcessStatus::MoreWork => tokio::task::yield_now().await,
            ProcessStatus::Blocked => {
                // A missed wakeup only costs one interval
                let _ = tokio::time::timeout(BLOCKED_WAIT, notifier.notified()).await;
            }
        }
    }
}
