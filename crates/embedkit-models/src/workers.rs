//! Data-parallel worker pool for local sentence encoders.
//!
//! One thread per encoder replica pulls batches from a shared queue. The pool
//! lives until [`WorkerPool::stop`] or drop; stopping waits for in-flight calls
//! to finish and runs at most once.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;

use embedkit_core::shutdown::ShutdownHook;
use embedkit_core::{batched, Embeddings, Error, Result};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::sentence::{encode_checked, SentenceEncoder};

struct Job {
    index: usize,
    texts: Vec<String>,
    reply: mpsc::Sender<(usize, Result<Embeddings>)>,
}

struct PoolState {
    sender: RwLock<Option<mpsc::Sender<Job>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl PoolState {
    fn shutdown(&self) {
        // Blocks until every in-flight call has released its read guard.
        let sender = self.sender.write().take();
        drop(sender);
        let handles = std::mem::take(&mut *self.handles.lock());
        let workers = handles.len();
        for handle in handles {
            if handle.join().is_err() {
                warn!("embedding worker exited with a panic");
            }
        }
        info!(workers, "embedding worker pool stopped");
    }
}

pub struct WorkerPool {
    state: Arc<PoolState>,
    hook: ShutdownHook,
    size: usize,
}

impl WorkerPool {
    /// Start one worker per encoder.
    pub fn start(encoders: Vec<Arc<dyn SentenceEncoder>>) -> Result<Self> {
        if encoders.is_empty() {
            return Err(Error::InvalidConfig("worker pool needs at least one device".to_string()));
        }
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let state = Arc::new(PoolState { sender: RwLock::new(Some(sender)), handles: Mutex::new(Vec::new()) });
        // Registered before spawning so a failed spawn still tears down the started workers.
        let hook_state = state.clone();
        let hook = ShutdownHook::new(move || hook_state.shutdown());

        let size = encoders.len();
        for (id, encoder) in encoders.into_iter().enumerate() {
            let receiver = receiver.clone();
            let handle = std::thread::Builder::new()
                .name(format!("embed-worker-{id}"))
                .spawn(move || worker_loop(id, encoder, receiver))
                .map_err(|e| Error::Backend(format!("Failed to spawn embedding worker: {e}")))?;
            state.handles.lock().push(handle);
        }
        info!(workers = size, "embedding worker pool started");
        Ok(Self { state, hook, size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_running(&self) -> bool {
        self.state.sender.read().is_some()
    }

    /// Split `texts` into batches, fan them out to the workers and reassemble
    /// the results in input order.
    pub fn encode(&self, texts: &[String], batch_size: usize) -> Result<Embeddings> {
        let guard = self.state.sender.read();
        let sender = guard.as_ref().ok_or_else(|| Error::Backend("embedding worker pool has been stopped".to_string()))?;

        let (reply, replies) = mpsc::channel();
        let mut jobs = 0usize;
        for (index, batch) in batched(texts.iter().cloned(), batch_size)?.enumerate() {
            sender
                .send(Job { index, texts: batch, reply: reply.clone() })
                .map_err(|_| Error::Backend("embedding worker pool is not accepting work".to_string()))?;
            jobs += 1;
        }
        drop(reply);
        debug!(jobs, workers = self.size, "dispatched batches to worker pool");

        let mut slots: Vec<Option<Embeddings>> = (0..jobs).map(|_| None).collect();
        for _ in 0..jobs {
            let (index, result) = replies
                .recv()
                .map_err(|_| Error::Backend("embedding worker exited before finishing its batch".to_string()))?;
            slots[index] = Some(result?);
        }
        Ok(slots.into_iter().flatten().flatten().collect())
    }

    /// Stop the workers. Returns `false` if the pool was already stopped.
    pub fn stop(&self) -> bool {
        self.hook.run()
    }
}

fn worker_loop(id: usize, encoder: Arc<dyn SentenceEncoder>, receiver: Arc<Mutex<mpsc::Receiver<Job>>>) {
    loop {
        let job = receiver.lock().recv();
        let Ok(job) = job else { break };
        let result = catch_unwind(AssertUnwindSafe(|| encode_checked(encoder.as_ref(), &job.texts)))
            .unwrap_or_else(|_| Err(Error::Backend(format!("embedding worker {id} panicked"))));
        // The caller may have given up after another batch failed.
        let _ = job.reply.send((job.index, result));
    }
    debug!(worker = id, "embedding worker exiting");
}
