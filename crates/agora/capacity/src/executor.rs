//! Capacity executor - bounded worker pool with owner-scoped results
//!
//! Asynchronous invocations run on a dedicated blocking pool. Each one is
//! recorded under a fresh [`CapacityTaskId`] together with the address of
//! the player that submitted it; only that player can retrieve, complete or
//! cancel it, and retrieving a finished result consumes it.

use crate::context::{CancelFlag, CapacityContext, Invocation};
use crate::error::{CapacityError, CapacityResult};
use crate::implementation::CapacityImplementation;
use agora_types::{CapacityId, CapacityTaskId, PlayerAddress};
use parking_lot::Mutex;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{oneshot, watch, Semaphore};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

/// Worker pool sizing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Upper bound on concurrently running capacity tasks
    pub max_workers: usize,
    /// Idle workers are reclaimed after this long
    pub idle_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_workers: 50,
            idle_timeout: Duration::from_secs(60),
        }
    }
}

/// A submitted invocation waiting to be consumed
struct PendingCall {
    owner: PlayerAddress,
    /// Snapshot taken at submission, used to build forced outcomes
    template: CapacityContext,
    cancel: CancelFlag,
    receiver: oneshot::Receiver<CapacityContext>,
    abort: AbortHandle,
    completed: Arc<AtomicBool>,
    forced: Option<CapacityContext>,
}

impl PendingCall {
    fn is_ready(&self) -> bool {
        self.forced.is_some() || self.completed.load(Ordering::SeqCst)
    }

    fn force(&mut self, outcome: CapacityContext) {
        self.abort.abort();
        self.cancel.cancel();
        self.forced = Some(outcome);
    }

    fn interrupted(&self) -> CapacityContext {
        let mut ctx = self.template.clone();
        ctx.mark_failed(CapacityError::Interrupted);
        ctx
    }
}

enum WaitOutcome {
    Finished(CapacityContext),
    Interrupted,
    TimedOut,
}

/// Executes capacity invocations inline or on the worker pool
pub struct CapacityExecutor {
    config: ExecutorConfig,
    pool: Mutex<Option<Runtime>>,
    handle: Handle,
    workers: Arc<Semaphore>,
    pending: Mutex<HashMap<CapacityTaskId, PendingCall>>,
    shutdown_tx: watch::Sender<bool>,
    stopped: AtomicBool,
}

impl CapacityExecutor {
    pub fn new(config: ExecutorConfig) -> CapacityResult<Self> {
        let max_workers = config.max_workers.max(1);
        let pool = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(max_workers)
            .thread_keep_alive(config.idle_timeout)
            .thread_name("agora-capacity")
            .enable_time()
            .build()
            .map_err(|e| CapacityError::Pool(e.to_string()))?;
        let handle = pool.handle().clone();
        let (shutdown_tx, _) = watch::channel(false);

        info!(
            max_workers,
            idle_timeout_secs = config.idle_timeout.as_secs(),
            "Capacity executor started"
        );

        Ok(Self {
            config,
            pool: Mutex::new(Some(pool)),
            handle,
            workers: Arc::new(Semaphore::new(max_workers)),
            pending: Mutex::new(HashMap::new()),
            shutdown_tx,
            stopped: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn is_shutdown(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Number of invocations not yet consumed
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Run an invocation on the caller's thread and return its context.
    ///
    /// Structural problems (wrong implementation, bad inputs) are errors;
    /// a failing call yields a context in the failed state.
    pub fn execute_immediately(
        &self,
        capacity: &CapacityId,
        implementation: &dyn CapacityImplementation,
        invocation: Invocation,
    ) -> CapacityResult<CapacityContext> {
        let ctx = prepare(capacity, implementation, invocation)?;
        debug!(task = %ctx.id(), capacity = %capacity, "Executing capacity inline");
        Ok(run_invocation(implementation, ctx))
    }

    /// Queue an invocation on the pool. Waits for a free worker when all
    /// of them are busy.
    pub async fn submit(
        &self,
        capacity: &CapacityId,
        implementation: Arc<dyn CapacityImplementation>,
        invocation: Invocation,
    ) -> CapacityResult<CapacityTaskId> {
        self.ensure_running()?;
        let ctx = prepare(capacity, implementation.as_ref(), invocation)?;
        let permit = self
            .workers
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| CapacityError::ExecutorShutdown)?;
        self.ensure_running()?;

        let id = ctx.id();
        let owner = ctx.caller().clone();
        let template = ctx.clone();
        let cancel = ctx.cancel_flag();
        let (tx, rx) = oneshot::channel();
        let completed = Arc::new(AtomicBool::new(false));
        let completed_flag = Arc::clone(&completed);

        let task = self.handle.spawn_blocking(move || {
            let _permit = permit;
            let finished = run_invocation(implementation.as_ref(), ctx);
            let _ = tx.send(finished);
            completed_flag.store(true, Ordering::SeqCst);
        });

        self.pending.lock().insert(
            id,
            PendingCall {
                owner,
                template,
                cancel,
                receiver: rx,
                abort: task.abort_handle(),
                completed,
                forced: None,
            },
        );
        debug!(task = %id, capacity = %capacity, "Capacity task submitted");
        Ok(id)
    }

    /// Wait for and consume the result of `id`.
    ///
    /// Returns `None` if `invoker` did not submit the task, if it is unknown
    /// or already consumed, or if `timeout` elapses. In the first and last
    /// case the task stays pending for its owner, as it does when the returned
    /// future is dropped before completing.
    pub async fn wait_result(
        &self,
        invoker: &PlayerAddress,
        id: CapacityTaskId,
        timeout: Option<Duration>,
    ) -> Option<CapacityContext> {
        let mut claim = ClaimedCall {
            executor: self,
            id,
            entry: Some(self.take_owned(invoker, id)?),
        };
        let entry = claim.entry.as_mut()?;
        if let Some(forced) = entry.forced.take() {
            claim.entry = None;
            return Some(forced);
        }

        let mut shutdown = self.shutdown_tx.subscribe();
        let outcome = match timeout {
            Some(limit) => tokio::time::timeout(
                limit,
                await_completion(&mut entry.receiver, &mut shutdown),
            )
            .await
            .unwrap_or(WaitOutcome::TimedOut),
            None => await_completion(&mut entry.receiver, &mut shutdown).await,
        };

        match outcome {
            WaitOutcome::Finished(ctx) => {
                claim.entry = None;
                Some(ctx)
            }
            WaitOutcome::Interrupted => {
                let entry = claim.entry.take()?;
                entry.abort.abort();
                entry.cancel.cancel();
                Some(entry.interrupted())
            }
            WaitOutcome::TimedOut => {
                debug!(task = %id, "Capacity result not ready before timeout");
                None
            }
        }
    }

    /// Whether the result of `id` is ready for `invoker`
    pub fn has_result(&self, invoker: &PlayerAddress, id: CapacityTaskId) -> bool {
        self.pending
            .lock()
            .get(&id)
            .map(|entry| &entry.owner == invoker && entry.is_ready())
            .unwrap_or(false)
    }

    /// Consume the result of `id` if it is ready, without waiting
    pub fn instant_result(
        &self,
        invoker: &PlayerAddress,
        id: CapacityTaskId,
    ) -> Option<CapacityContext> {
        let mut entry = self.take_owned(invoker, id)?;
        if let Some(forced) = entry.forced.take() {
            return Some(forced);
        }
        match entry.receiver.try_recv() {
            Ok(ctx) => Some(ctx),
            Err(TryRecvError::Empty) => {
                self.pending.lock().insert(id, entry);
                None
            }
            Err(TryRecvError::Closed) => Some(entry.interrupted()),
        }
    }

    /// Force `id` to succeed with `outputs`, stopping the running task.
    pub fn done(
        &self,
        terminator: &PlayerAddress,
        id: CapacityTaskId,
        outputs: Vec<Value>,
    ) -> bool {
        let mut pending = self.pending.lock();
        let Some(entry) = owned_entry(&mut pending, terminator, id) else {
            return false;
        };
        let mut ctx = entry.template.clone();
        ctx.set_outputs(outputs);
        ctx.mark_succeeded();
        entry.force(ctx);
        info!(task = %id, "Capacity task completed by owner");
        true
    }

    /// Cancel `id`; its context ends in the cancelled state.
    pub fn cancel(
        &self,
        terminator: &PlayerAddress,
        id: CapacityTaskId,
        reason: Option<CapacityError>,
    ) -> bool {
        let mut pending = self.pending.lock();
        let Some(entry) = owned_entry(&mut pending, terminator, id) else {
            return false;
        };
        let mut ctx = entry.template.clone();
        let reason = reason
            .unwrap_or_else(|| CapacityError::Cancelled(format!("cancelled by {}", terminator)));
        ctx.mark_cancelled(reason);
        entry.force(ctx);
        info!(task = %id, "Capacity task cancelled by owner");
        true
    }

    /// Cancel and drop every task owned by `owner`. Returns how many.
    pub fn clear(&self, owner: &PlayerAddress) -> usize {
        let mut pending = self.pending.lock();
        let ids: Vec<CapacityTaskId> = pending
            .iter()
            .filter(|(_, entry)| &entry.owner == owner)
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            if let Some(entry) = pending.remove(id) {
                entry.abort.abort();
                entry.cancel.cancel();
            }
        }
        if !ids.is_empty() {
            debug!(owner = %owner, count = ids.len(), "Cleared pending capacity tasks");
        }
        ids.len()
    }

    /// Stop the pool and fail every outstanding invocation.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down capacity executor");
        self.workers.close();
        self.shutdown_tx.send_replace(true);
        if let Some(pool) = self.pool.lock().take() {
            pool.shutdown_background();
        }

        let mut pending = self.pending.lock();
        for entry in pending.values_mut() {
            if entry.forced.is_none() {
                let interrupted = entry.interrupted();
                entry.force(interrupted);
            }
        }
        info!(interrupted = pending.len(), "Capacity executor stopped");
    }

    fn ensure_running(&self) -> CapacityResult<()> {
        if self.is_shutdown() {
            return Err(CapacityError::ExecutorShutdown);
        }
        Ok(())
    }

    /// Remove the entry if `invoker` owns it; otherwise leave it untouched.
    fn take_owned(&self, invoker: &PlayerAddress, id: CapacityTaskId) -> Option<PendingCall> {
        let mut pending = self.pending.lock();
        let entry = pending.remove(&id)?;
        if &entry.owner != invoker {
            warn!(task = %id, invoker = %invoker, "Capacity result requested by non-owner");
            pending.insert(id, entry);
            return None;
        }
        Some(entry)
    }
}

/// A pending call taken out of the table while its owner waits on it.
/// Unless consumed, it goes back on drop, so a waiter that times out or is
/// itself dropped leaves the task retrievable.
struct ClaimedCall<'a> {
    executor: &'a CapacityExecutor,
    id: CapacityTaskId,
    entry: Option<PendingCall>,
}

impl Drop for ClaimedCall<'_> {
    fn drop(&mut self) {
        let Some(mut entry) = self.entry.take() else {
            return;
        };
        if self.executor.is_shutdown() && entry.forced.is_none() {
            let interrupted = entry.interrupted();
            entry.force(interrupted);
        }
        self.executor.pending.lock().insert(self.id, entry);
    }
}

impl Drop for CapacityExecutor {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.get_mut().take() {
            pool.shutdown_background();
        }
    }
}

fn owned_entry<'a>(
    pending: &'a mut HashMap<CapacityTaskId, PendingCall>,
    caller: &PlayerAddress,
    id: CapacityTaskId,
) -> Option<&'a mut PendingCall> {
    let entry = pending.get_mut(&id)?;
    if &entry.owner != caller {
        warn!(task = %id, caller = %caller, "Capacity task control refused for non-owner");
        return None;
    }
    Some(entry)
}

fn prepare(
    capacity: &CapacityId,
    implementation: &dyn CapacityImplementation,
    invocation: Invocation,
) -> CapacityResult<CapacityContext> {
    if implementation.capacity() != capacity {
        return Err(CapacityError::ImplementationMismatch {
            expected: capacity.clone(),
            provided: implementation.capacity().clone(),
        });
    }
    implementation.prototype().validate_inputs(&invocation.inputs)?;
    Ok(CapacityContext::new(
        capacity.clone(),
        implementation.kind(),
        invocation,
    ))
}

/// Run one invocation to completion. Never panics: failures and panics
/// of the implementation end up in the returned context.
fn run_invocation(
    implementation: &dyn CapacityImplementation,
    mut ctx: CapacityContext,
) -> CapacityContext {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| implementation.call(&mut ctx)));
    match outcome {
        Ok(Ok(())) => {
            if ctx.is_cancellation_requested() {
                ctx.mark_cancelled(CapacityError::Cancelled("stopped while running".into()));
            } else {
                match implementation.prototype().validate_outputs(ctx.outputs()) {
                    Ok(()) => ctx.mark_succeeded(),
                    Err(err) => ctx.mark_failed(err),
                }
            }
        }
        Ok(Err(err)) => {
            warn!(
                task = %ctx.id(),
                capacity = %ctx.capacity(),
                error = %err,
                "Capacity call failed"
            );
            ctx.mark_failed(err);
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(
                task = %ctx.id(),
                capacity = %ctx.capacity(),
                panic = %message,
                "Capacity implementation panicked"
            );
            ctx.mark_failed(CapacityError::Panicked(message));
        }
    }
    ctx
}

async fn await_completion(
    receiver: &mut oneshot::Receiver<CapacityContext>,
    shutdown: &mut watch::Receiver<bool>,
) -> WaitOutcome {
    tokio::select! {
        biased;
        received = receiver => match received {
            Ok(ctx) => WaitOutcome::Finished(ctx),
            Err(_) => WaitOutcome::Interrupted,
        },
        _ = shutdown.wait_for(|stopped| *stopped) => WaitOutcome::Interrupted,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
