//! Background decode worker
//!
//! A dedicated thread owns one decoder instance and serves decode requests
//! one at a time. Every request carries an id from a local counter; the
//! worker tags its progress and completion messages with that id and a
//! router thread hands each message to the channel registered for it, so
//! concurrent callers only ever see their own progress.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};

use anyhow::anyhow;
use parking_lot::Mutex;

use crate::data::ConvertData;
use crate::plugin::{Decoder, DecoderDescriptor, Factory, Phase};

enum WorkerRequest {
    Decode {
        id: u64,
        shape: String,
        input: Vec<u8>,
    },
    Shutdown,
}

/// Message from the worker, addressed by request id.
enum WorkerMessage {
    Progress { id: u64, value: f64 },
    Done { id: u64, result: anyhow::Result<ConvertData> },
}

/// What a single caller receives.
pub enum WorkerEvent {
    Progress(f64),
    Done(anyhow::Result<ConvertData>),
}

type Pending = Arc<Mutex<HashMap<u64, mpsc::Sender<WorkerEvent>>>>;

pub struct DecodeWorker {
    name: String,
    requests: mpsc::Sender<WorkerRequest>,
    pending: Pending,
    next_id: AtomicU64,
    running: Arc<AtomicBool>,
}

impl DecodeWorker {
    /// Start the worker and router threads for decoders built by `factory`.
    pub fn spawn(name: &str, factory: Factory<dyn Decoder>) -> std::io::Result<Self> {
        let (request_tx, request_rx) = mpsc::channel::<WorkerRequest>();
        let (message_tx, message_rx) = mpsc::channel::<WorkerMessage>();
        let pending: Pending = Arc::default();
        let running = Arc::new(AtomicBool::new(true));

        std::thread::Builder::new()
            .name(format!("ifcx_decode_{name}"))
            .spawn(move || {
                let mut decoder = factory();
                while let Ok(WorkerRequest::Decode { id, shape, input }) = request_rx.recv() {
                    let progress_tx = message_tx.clone();
                    let mut report = move |value: f64| {
                        let _ = progress_tx.send(WorkerMessage::Progress { id, value });
                    };
                    let mut phase = Phase::new(&shape, &mut report);
                    let result = decoder.decode(input, &mut phase);
                    if message_tx.send(WorkerMessage::Done { id, result }).is_err() {
                        break;
                    }
                }
            })?;

        let router_pending = Arc::clone(&pending);
        let router_running = Arc::clone(&running);
        let router_name = name.to_string();
        std::thread::Builder::new()
            .name(format!("ifcx_decode_{name}_router"))
            .spawn(move || {
                for message in message_rx {
                    match message {
                        WorkerMessage::Progress { id, value } => {
                            match router_pending.lock().get(&id) {
                                Some(tx) => {
                                    let _ = tx.send(WorkerEvent::Progress(value));
                                }
                                None => tracing::warn!(worker = %router_name, id, "progress for unknown request"),
                            }
                        }
                        WorkerMessage::Done { id, result } => {
                            match router_pending.lock().remove(&id) {
                                Some(tx) => {
                                    let _ = tx.send(WorkerEvent::Done(result));
                                }
                                None => tracing::warn!(worker = %router_name, id, "result for unknown request"),
                            }
                        }
                    }
                }
                // Worker gone (shut down or panicked): dropping the senders
                // wakes every waiter.
                router_running.store(false, Ordering::Release);
                router_pending.lock().clear();
                tracing::debug!(worker = %router_name, "decode worker stopped");
            })?;

        tracing::debug!(worker = name, "decode worker started");
        Ok(Self {
            name: name.to_string(),
            requests: request_tx,
            pending,
            next_id: AtomicU64::new(0),
            running,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a decode and return the handle that receives its events.
    pub fn submit(&self, input: Vec<u8>, shape: &str) -> anyhow::Result<PendingDecode> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel();
        self.pending.lock().insert(id, tx);

        let request = WorkerRequest::Decode {
            id,
            shape: shape.to_string(),
            input,
        };
        if self.requests.send(request).is_err() {
            self.pending.lock().remove(&id);
            return Err(anyhow!("decode worker `{}` is not running", self.name));
        }
        Ok(PendingDecode {
            id,
            worker: self.name.clone(),
            events: rx,
        })
    }

    /// False once the worker thread has exited.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Number of requests still waiting for a result.
    pub fn in_flight(&self) -> usize {
        self.pending.lock().len()
    }
}

impl Drop for DecodeWorker {
    fn drop(&mut self) {
        let _ = self.requests.send(WorkerRequest::Shutdown);
    }
}

/// One submitted request.
pub struct PendingDecode {
    id: u64,
    worker: String,
    events: mpsc::Receiver<WorkerEvent>,
}

impl PendingDecode {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Block until the result arrives, forwarding this request's progress.
    pub fn wait(self, progress: &mut dyn FnMut(f64)) -> anyhow::Result<ConvertData> {
        for event in self.events.iter() {
            match event {
                WorkerEvent::Progress(value) => progress(value),
                WorkerEvent::Done(result) => return result,
            }
        }
        Err(anyhow!(
            "decode worker `{}` stopped before answering request {}",
            self.worker,
            self.id
        ))
    }
}

// ============================================================================
// Decoder adapter
// ============================================================================

/// Lazily started worker shared by every instance a descriptor creates.
/// A worker whose thread has died is replaced on the next request.
struct SharedWorker {
    name: String,
    factory: Factory<dyn Decoder>,
    worker: Mutex<Option<Arc<DecodeWorker>>>,
}

impl SharedWorker {
    fn get(&self) -> anyhow::Result<Arc<DecodeWorker>> {
        let mut slot = self.worker.lock();
        if let Some(worker) = slot.as_ref() {
            if worker.is_running() {
                return Ok(Arc::clone(worker));
            }
            tracing::warn!(worker = %self.name, "decode worker stopped; restarting");
        }
        let worker = Arc::new(DecodeWorker::spawn(&self.name, Arc::clone(&self.factory))?);
        *slot = Some(Arc::clone(&worker));
        Ok(worker)
    }
}

/// [`Decoder`] that forwards to a background worker.
pub struct WorkerDecoder {
    shared: Arc<SharedWorker>,
}

impl Decoder for WorkerDecoder {
    fn decode(&mut self, input: Vec<u8>, phase: &mut Phase<'_>) -> anyhow::Result<ConvertData> {
        let shape = phase.shape().to_string();
        let pending = self.shared.get()?.submit(input, &shape)?;
        pending.wait(&mut |p| phase.report(p))
    }

    fn emits_progress(&self, shape: &str) -> bool {
        (self.shared.factory)().emits_progress(shape)
    }
}

/// Worker-backed flavour of `inner`: same capabilities, one step higher
/// priority, and a single shared background thread.
pub fn worker_descriptor(inner: &DecoderDescriptor) -> DecoderDescriptor {
    let shared = Arc::new(SharedWorker {
        name: inner.name.clone(),
        factory: inner.factory(),
        worker: Mutex::new(None),
    });

    let mut descriptor = DecoderDescriptor::new(format!("{}-worker", inner.name), move || {
        Box::new(WorkerDecoder {
            shared: Arc::clone(&shared),
        })
    })
    .priority(inner.priority + 1);
    descriptor.environments = inner.environments.clone();
    descriptor.formats = inner.formats.clone();
    descriptor.shapes = inner.shapes.clone();
    descriptor
}
