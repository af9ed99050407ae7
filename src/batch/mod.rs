//! Fan-out of one generation request into `count` concurrent calls.
//!
//! A batch moves `Idle -> Running -> Finished -> Idle`. Every index in
//! `0..count` resolves exactly once (success, failure, timeout or
//! cancellation) and the last resolution emits a single `Finished`.
//! State changes and the events describing them happen under one lock, so
//! a receiver sees progress values in non-decreasing order.

pub mod events;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::{
    client::{GenerationClient, ImageGenerator},
    config::{AppConfig, DEFAULT_MAX_PARALLEL, DEFAULT_TIMEOUT_SECS},
    error::{ImageGenError, Result},
    models::{BatchPhase, BatchState, GenerationRequest, GenerationResult},
    validation,
};

pub use events::{BatchEvent, BatchHandle, BatchObserver, BatchSummary};

/// Builds the generator a batch will use from the submitted request
/// (credentials and URL travel with the request).
pub type GeneratorFactory =
    Arc<dyn Fn(&GenerationRequest) -> Result<Arc<dyn ImageGenerator>> + Send + Sync>;

struct Shared {
    state: BatchState,
    phase: BatchPhase,
    events: Option<UnboundedSender<BatchEvent>>,
    cancelled: Arc<AtomicBool>,
    slots: Option<Arc<Semaphore>>,
}

impl Shared {
    fn emit(&self, event: BatchEvent) {
        if let Some(tx) = &self.events {
            // receiver gone just means nobody is watching any more
            let _ = tx.send(event);
        }
    }
}

pub struct BatchCoordinator {
    runtime: Handle,
    factory: GeneratorFactory,
    max_parallel: usize,
    call_timeout: Duration,
    shared: Arc<Mutex<Shared>>,
}

impl BatchCoordinator {
    pub fn new(runtime: Handle, factory: GeneratorFactory) -> Self {
        Self {
            runtime,
            factory,
            max_parallel: DEFAULT_MAX_PARALLEL,
            call_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            shared: Arc::new(Mutex::new(Shared {
                state: BatchState::default(),
                phase: BatchPhase::Idle,
                events: None,
                cancelled: Arc::new(AtomicBool::new(false)),
                slots: None,
            })),
        }
    }

    /// Every batch goes to the same generator, whatever credentials the
    /// request carries.
    pub fn with_generator(runtime: Handle, generator: Arc<dyn ImageGenerator>) -> Self {
        Self::new(runtime, Arc::new(move |_: &GenerationRequest| Ok(generator.clone())))
    }

    /// Real HTTP calls, one `GenerationClient` per batch built from the
    /// request's key and URL.
    pub fn http(runtime: Handle, config: &AppConfig) -> Self {
        let timeout = config.timeout;
        let factory: GeneratorFactory = Arc::new(move |request: &GenerationRequest| {
            let client = GenerationClient::from_request(request, timeout)?;
            Ok(Arc::new(client) as Arc<dyn ImageGenerator>)
        });
        Self::new(runtime, factory)
            .with_max_parallel(config.max_parallel)
            .with_call_timeout(timeout)
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    /// Ceiling applied around each generator call, on top of whatever the
    /// generator enforces itself.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn phase(&self) -> BatchPhase {
        self.lock().phase
    }

    pub fn is_running(&self) -> bool {
        self.phase() == BatchPhase::Running
    }

    /// Snapshot of the current (or most recently finished) batch.
    pub fn state(&self) -> BatchState {
        self.lock().state.clone()
    }

    pub fn start(&self, request: GenerationRequest) -> Result<BatchHandle> {
        validation::validate_count(request.count)?;

        let mut shared = self.lock();
        if shared.phase == BatchPhase::Running {
            log::warn!("Rejecting new batch: {} is still running", shared.state.batch_id);
            return Err(ImageGenError::BatchInProgress);
        }

        let generator = (self.factory)(&request)?;

        let total = request.count;
        let batch_id = Uuid::new_v4().to_string();
        let parallel = total.min(self.max_parallel);
        let slots = Arc::new(Semaphore::new(parallel));
        let cancelled = Arc::new(AtomicBool::new(false));
        let (tx, rx) = unbounded_channel();

        shared.state = BatchState::begin(batch_id.clone(), total);
        shared.phase = BatchPhase::Running;
        shared.events = Some(tx);
        shared.cancelled = cancelled.clone();
        shared.slots = Some(slots.clone());
        drop(shared);

        log::info!(
            "🚀 Batch {} started: {} image(s), model={}, size={}, parallel={}",
            batch_id,
            total,
            request.model,
            request.size,
            parallel
        );

        let request = Arc::new(request);
        let mut workers = Vec::with_capacity(total);
        for index in 0..total {
            let task = SlotTask {
                index,
                batch_id: batch_id.clone(),
                request: request.clone(),
                generator: generator.clone(),
                slots: slots.clone(),
                cancelled: cancelled.clone(),
                call_timeout: self.call_timeout,
                shared: self.shared.clone(),
            };
            workers.push(self.runtime.spawn(task.run()));
        }

        // A worker that panics never reports; resolve its slot here so the
        // batch still finishes.
        let shared = self.shared.clone();
        let supervised_id = batch_id.clone();
        self.runtime.spawn(async move {
            for (index, joined) in join_all(workers).await.into_iter().enumerate() {
                if let Err(err) = joined {
                    log::error!("Worker for image {} aborted: {}", index + 1, err);
                    let message = format!("generation failed for image {}: worker aborted", index + 1);
                    resolve(&shared, &supervised_id, GenerationResult::failure(index, message));
                }
            }
        });

        Ok(BatchHandle::new(batch_id, total, rx))
    }

    /// Stops handing out worker slots. Calls already in flight finish
    /// normally; every slot not yet dispatched resolves as cancelled.
    pub fn cancel(&self) {
        let shared = self.lock();
        if shared.phase != BatchPhase::Running {
            return;
        }
        log::warn!("Cancelling batch {}", shared.state.batch_id);
        shared.cancelled.store(true, Ordering::SeqCst);
        if let Some(slots) = &shared.slots {
            slots.close();
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct SlotTask {
    index: usize,
    batch_id: String,
    request: Arc<GenerationRequest>,
    generator: Arc<dyn ImageGenerator>,
    slots: Arc<Semaphore>,
    cancelled: Arc<AtomicBool>,
    call_timeout: Duration,
    shared: Arc<Mutex<Shared>>,
}

impl SlotTask {
    async fn run(self) {
        let outcome = match self.slots.clone().acquire_owned().await {
            Ok(_permit) if !self.cancelled.load(Ordering::SeqCst) => {
                let call = self.generator.generate_slot(
                    self.index,
                    &self.request.prompt,
                    self.request.size,
                    self.request.model,
                );
                match tokio::time::timeout(self.call_timeout, call).await {
                    Ok(result) => result,
                    Err(_) => Err(ImageGenError::Timeout(self.call_timeout)),
                }
            }
            _ => Err(ImageGenError::Cancelled),
        };

        let result = match outcome {
            Ok(payload) => GenerationResult::success(self.index, payload),
            Err(err) => {
                if err.is_per_call() {
                    log::warn!("Image {} failed: {}", self.index + 1, err);
                } else {
                    log::error!("Image {} failed unexpectedly: {}", self.index + 1, err);
                }
                GenerationResult::failure(
                    self.index,
                    format!("generation failed for image {}: {}", self.index + 1, err),
                )
            }
        };
        resolve(&self.shared, &self.batch_id, result);
    }
}

/// Applies one resolution and emits its events. Stale or duplicate
/// resolutions are dropped.
fn resolve(shared: &Mutex<Shared>, batch_id: &str, result: GenerationResult) {
    let mut shared = shared.lock().unwrap_or_else(PoisonError::into_inner);
    if shared.state.batch_id != batch_id || shared.phase != BatchPhase::Running {
        return;
    }

    let index = result.index;
    let event = match (&result.payload, &result.error_message) {
        (Some(payload), _) => BatchEvent::Image {
            index,
            payload: payload.clone(),
        },
        (None, message) => BatchEvent::Error {
            index,
            message: message.clone().unwrap_or_default(),
        },
    };
    if !shared.state.record(result) {
        log::debug!("Ignoring duplicate resolution for image {}", index + 1);
        return;
    }

    shared.emit(event);
    let fraction = shared.state.progress();
    shared.emit(BatchEvent::Progress { fraction });
    log::debug!(
        "Batch {} progress: {}/{}",
        batch_id,
        shared.state.completed,
        shared.state.total
    );

    if !shared.state.in_progress {
        shared.phase = BatchPhase::Finished;
        let succeeded = shared.state.succeeded();
        let failed = shared.state.failed();
        shared.emit(BatchEvent::Finished { succeeded, failed });
        log::info!(
            "✅ Batch {} finished: {} succeeded, {} failed",
            batch_id,
            succeeded,
            failed
        );

        // closing the sender ends the receiver's stream after Finished
        shared.events = None;
        shared.slots = None;
        shared.phase = BatchPhase::Idle;
    }
}
