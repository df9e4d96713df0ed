//! Submission pipeline.
//!
//! Three request kinds arrive over one channel: blocks, transactions, and
//! queries. A feed task applies scheduling policy (deadline expiry, query
//! fast-path) and forwards work onto a bounded work queue; a worker task
//! drains it, runs the state-database operation, and fulfills the
//! submission's future. Submissions for the same parent are processed in
//! submission order.

use std::sync::Arc;

use arbor_common::{decode_canonical, decode_versioned, Block, BlockHeader, Multihash, Transaction};
use arbor_statedb::{ObjectSpace, StateDb};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::context::ExecutionContext;
use crate::error::ChainError;
use crate::frame::StackFrame;
use crate::host;
use crate::privilege::{Intent, Privilege};
use crate::receipt::Receipt;
use crate::thunk::system::{ApplyBlockArgs, ApplyTransactionArgs};
use crate::thunk::{ids, ThunkDispatcher};
use crate::vm::VmBackend;

/// Capacity of the input and work queues.
pub const MAX_QUEUE_SIZE: usize = 1024;

#[derive(Debug, Clone)]
pub struct BlockSubmission {
    /// Version-tagged canonical encoding of the block header.
    pub block_header_bytes: Vec<u8>,
    /// Canonical encodings of the transactions.
    pub transactions: Vec<Vec<u8>>,
    pub passives: Vec<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct TransactionSubmission {
    /// Canonical encoding of the transaction.
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum QuerySubmission {
    HeadInfo,
    ForkHeads,
    Object { space: Vec<u8>, key: Vec<u8> },
}

#[derive(Debug, Clone)]
pub enum Submission {
    Block(BlockSubmission),
    Transaction(TransactionSubmission),
    Query(QuerySubmission),
}

#[derive(Debug)]
pub enum QueryResult {
    HeadInfo {
        id: Multihash,
        previous: Option<Multihash>,
        height: u64,
    },
    ForkHeads(Vec<Multihash>),
    Object(Option<Vec<u8>>),
}

#[derive(Debug)]
pub enum SubmissionOutcome {
    Block {
        id: Multihash,
        height: u64,
        receipt: Receipt,
    },
    Transaction {
        id: Multihash,
    },
    Query(QueryResult),
    Error {
        text: String,
    },
}

struct WorkItem {
    submission: Submission,
    deadline: Option<Instant>,
    done: oneshot::Sender<SubmissionOutcome>,
}

pub struct Controller {
    processor: Arc<Processor>,
    input: mpsc::Sender<WorkItem>,
    cancel: CancellationToken,
}

impl Controller {
    pub fn new(state_db: Arc<StateDb>, vm: Arc<dyn VmBackend>) -> Self {
        Self::with_dispatcher(state_db, vm, ThunkDispatcher::shared())
    }

    pub fn with_dispatcher(
        state_db: Arc<StateDb>,
        vm: Arc<dyn VmBackend>,
        dispatcher: Arc<ThunkDispatcher>,
    ) -> Self {
        let processor = Arc::new(Processor {
            state_db,
            vm,
            dispatcher,
        });
        let (input_tx, input_rx) = mpsc::channel(MAX_QUEUE_SIZE);
        let (work_tx, work_rx) = mpsc::channel(MAX_QUEUE_SIZE);
        let cancel = CancellationToken::new();

        tokio::spawn(feed_task(
            input_rx,
            work_tx,
            Arc::clone(&processor),
            cancel.clone(),
        ));
        tokio::spawn(work_task(work_rx, Arc::clone(&processor), cancel.clone()));

        Self {
            processor,
            input: input_tx,
            cancel,
        }
    }

    pub fn state_db(&self) -> &Arc<StateDb> {
        &self.processor.state_db
    }

    pub fn dispatcher(&self) -> &Arc<ThunkDispatcher> {
        &self.processor.dispatcher
    }

    /// Enqueue a submission; the returned future resolves to its outcome.
    ///
    /// After shutdown the future resolves to an explicit shutdown error.
    pub async fn submit(
        &self,
        submission: Submission,
        deadline: Option<Instant>,
    ) -> oneshot::Receiver<SubmissionOutcome> {
        let (done, rx) = oneshot::channel();
        let item = WorkItem {
            submission,
            deadline,
            done,
        };
        if let Err(mpsc::error::SendError(item)) = self.input.send(item).await {
            let _ = item.done.send(SubmissionOutcome::Error {
                text: ChainError::Shutdown.to_string(),
            });
        }
        rx
    }

    /// Close the queues. In-flight work completes; queued submissions
    /// resolve to a shutdown error.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

async fn feed_task(
    mut input: mpsc::Receiver<WorkItem>,
    work: mpsc::Sender<WorkItem>,
    processor: Arc<Processor>,
    cancel: CancellationToken,
) {
    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => break,
            item = input.recv() => match item {
                Some(item) => item,
                None => break,
            },
        };

        if let Some(deadline) = item.deadline {
            if Instant::now() >= deadline {
                let _ = item.done.send(SubmissionOutcome::Error {
                    text: ChainError::TimedOut.to_string(),
                });
                continue;
            }
        }

        // Read-only queries target the head, which is finalized and immune
        // to in-flight writes, so they may jump ahead of queued work.
        if let Submission::Query(query) = &item.submission {
            let _ = item.done.send(processor.run_query(query));
            continue;
        }

        if work.send(item).await.is_err() {
            break;
        }
    }
}

async fn work_task(
    mut work: mpsc::Receiver<WorkItem>,
    processor: Arc<Processor>,
    cancel: CancellationToken,
) {
    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => break,
            item = work.recv() => match item {
                Some(item) => item,
                None => break,
            },
        };
        let _ = item.done.send(processor.process(item.submission));
    }

    // Anything still queued resolves to the shutdown error.
    while let Ok(item) = work.try_recv() {
        let _ = item.done.send(SubmissionOutcome::Error {
            text: ChainError::Shutdown.to_string(),
        });
    }
}

struct Processor {
    state_db: Arc<StateDb>,
    vm: Arc<dyn VmBackend>,
    dispatcher: Arc<ThunkDispatcher>,
}

impl Processor {
    fn process(&self, submission: Submission) -> SubmissionOutcome {
        let result = match submission {
            Submission::Block(block) => self.process_block(block),
            Submission::Transaction(transaction) => self.process_transaction(transaction),
            Submission::Query(query) => Ok(self.run_query(&query)),
        };
        result.unwrap_or_else(|e| SubmissionOutcome::Error {
            text: e.to_string(),
        })
    }

    /// Decode, link-check, and apply one block.
    fn process_block(&self, sub: BlockSubmission) -> Result<SubmissionOutcome, ChainError> {
        let header: BlockHeader = decode_versioned(&sub.block_header_bytes)?;
        let mut transactions = Vec::with_capacity(sub.transactions.len());
        for raw in &sub.transactions {
            transactions.push(decode_canonical::<Transaction>(raw)?);
        }
        let block = Block {
            header: header.clone(),
            transactions,
            passives: sub.passives,
        };
        let block_id = block.id();

        if header.previous.is_zero() {
            if header.height != 1 {
                return Err(ChainError::RootHeightMismatch);
            }
        } else {
            let previous = self
                .state_db
                .get_node(&header.previous)
                .ok_or_else(|| ChainError::UnknownPreviousBlock(header.previous.clone()))?;
            if header.height != previous.revision() + 1 {
                return Err(ChainError::BlockHeightMismatch {
                    expected: previous.revision() + 1,
                    actual: header.height,
                });
            }
            if previous.id() != header.previous {
                return Err(ChainError::PreviousIdMismatch);
            }
        }
        if self.state_db.get_node(&block_id).is_some() {
            return Err(ChainError::DuplicateBlock(block_id));
        }

        let node = self
            .state_db
            .create_writable_node(&header.previous, &block_id)
            .ok_or_else(|| ChainError::UnknownPreviousBlock(header.previous.clone()))?;

        let mut ctx = ExecutionContext::new(
            Arc::clone(&self.vm),
            Arc::clone(&self.dispatcher),
            Intent::ApplyBlock,
        );
        ctx.set_state_node(Some(node), None);
        let apply = ApplyBlockArgs {
            block: block.clone(),
        };
        let result = ctx.with_frame(StackFrame::system(Privilege::KernelMode), |ctx| {
            host::system_call::<_, ()>(ctx, ids::APPLY_BLOCK, &apply)
        });

        match result {
            Ok(()) => {
                self.state_db.finalize_node(&block_id)?;
                info!(block = %block_id, height = header.height, "block accepted");
                Ok(SubmissionOutcome::Block {
                    id: block_id,
                    height: header.height,
                    receipt: ctx.into_receipt(),
                })
            }
            Err(e) => {
                warn!(block = %block_id, error = %e, "block rejected");
                let _ = self.state_db.discard_node(&block_id);
                Err(e)
            }
        }
    }

    /// Apply a pending transaction speculatively against the head.
    fn process_transaction(
        &self,
        sub: TransactionSubmission,
    ) -> Result<SubmissionOutcome, ChainError> {
        let transaction: Transaction = decode_canonical(&sub.payload)?;
        let id = transaction.id();

        let head = self.state_db.get_head();
        let scratch = head.create_anonymous_node();
        let mut ctx = ExecutionContext::new(
            Arc::clone(&self.vm),
            Arc::clone(&self.dispatcher),
            Intent::ApplyTransaction,
        );
        ctx.set_state_node(Some(scratch), Some(head));
        let apply = ApplyTransactionArgs { transaction };
        ctx.with_frame(StackFrame::system(Privilege::KernelMode), |ctx| {
            host::system_call::<_, ()>(ctx, ids::APPLY_TRANSACTION, &apply)
        })?;

        Ok(SubmissionOutcome::Transaction { id })
    }

    fn run_query(&self, query: &QuerySubmission) -> SubmissionOutcome {
        let head = self.state_db.get_head();
        let result = match query {
            QuerySubmission::HeadInfo => Ok(QueryResult::HeadInfo {
                id: head.id(),
                previous: head.parent_id(),
                height: head.revision(),
            }),
            QuerySubmission::ForkHeads => Ok(QueryResult::ForkHeads(
                self.state_db
                    .get_fork_heads()
                    .iter()
                    .map(|node| node.id())
                    .collect(),
            )),
            QuerySubmission::Object { space, key } => head
                .get_object(&ObjectSpace::new(space.clone()), key)
                .map(QueryResult::Object)
                .map_err(ChainError::from),
        };
        match result {
            Ok(result) => SubmissionOutcome::Query(result),
            Err(e) => SubmissionOutcome::Error {
                text: e.to_string(),
            },
        }
    }
}
