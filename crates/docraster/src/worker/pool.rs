use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{select, unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};

use crate::config::Settings;
use crate::error::WorkerError;
use crate::pipeline::{Pipeline, PipelineContext};
use crate::task::{Task, TaskTable};

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub worker_count: usize,
    /// Pause after each task before claiming the next one.
    pub pause: Duration,
    /// How long shutdown waits for each worker.
    pub shutdown_timeout: Duration,
}

impl PoolConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            worker_count: settings.max_worker_threads,
            pause: settings.worker_pause(),
            shutdown_timeout: settings.shutdown_timeout(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Fixed set of worker threads draining one FIFO queue of task ids.
///
/// The pool is the only writer of task state. Dropping the pool shuts it down.
pub struct WorkerPool {
    task_sender: Sender<String>,
    /// Dropped on shutdown; workers watch for the disconnect.
    stop_sender: Mutex<Option<Sender<()>>>,
    done_receiver: Receiver<usize>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    running: Arc<AtomicBool>,
    table: Arc<TaskTable>,
    config: PoolConfig,
}

impl WorkerPool {
    pub fn start(
        pipeline: Arc<Pipeline>,
        table: Arc<TaskTable>,
        config: PoolConfig,
    ) -> Result<Self, WorkerError> {
        if config.worker_count == 0 {
            return Err(WorkerError::SpawnFailed(
                "worker_count must be > 0".to_string(),
            ));
        }

        let (task_sender, task_receiver) = unbounded::<String>();
        let (stop_sender, stop_receiver) = unbounded::<()>();
        let (done_sender, done_receiver) = unbounded::<usize>();
        let running = Arc::new(AtomicBool::new(true));

        let mut workers = Vec::with_capacity(config.worker_count);
        for worker_id in 0..config.worker_count {
            let worker = Worker {
                id: worker_id,
                tasks: task_receiver.clone(),
                stop: stop_receiver.clone(),
                running: Arc::clone(&running),
                pipeline: Arc::clone(&pipeline),
                table: Arc::clone(&table),
                pause: config.pause,
            };
            let done = DoneSignal {
                sender: done_sender.clone(),
                worker_id,
            };

            let handle = thread::Builder::new()
                .name(format!("docraster-worker-{}", worker_id))
                .spawn(move || {
                    let _done = done;
                    worker.run();
                });

            match handle {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    running.store(false, Ordering::SeqCst);
                    drop(stop_sender);
                    return Err(WorkerError::SpawnFailed(e.to_string()));
                }
            }
        }

        info!("Started {} workers", config.worker_count);

        Ok(Self {
            task_sender,
            stop_sender: Mutex::new(Some(stop_sender)),
            done_receiver,
            workers: Mutex::new(workers),
            running,
            table,
            config,
        })
    }

    /// Records `task` as pending and queues it. Returns the task id.
    pub fn submit(&self, task: Task) -> Result<String, WorkerError> {
        if !self.is_running() {
            return Err(WorkerError::ChannelClosed);
        }

        let task_id = task.id.clone();
        self.table.insert(task);

        if self.task_sender.send(task_id.clone()).is_err() {
            self.table.remove(&task_id);
            return Err(WorkerError::ChannelClosed);
        }

        debug!("Queued task {}", task_id);
        Ok(task_id)
    }

    pub fn table(&self) -> &Arc<TaskTable> {
        &self.table
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Tasks waiting for a worker.
    pub fn queued(&self) -> usize {
        self.task_sender.len()
    }

    pub fn worker_count(&self) -> usize {
        self.config.worker_count
    }

    /// Stops the workers and waits, bounded per worker, for them to exit.
    ///
    /// A worker in the middle of a task finishes it first. Tasks still queued
    /// stay `pending`. Calling this more than once is harmless.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down worker pool...");

        drop(
            self.stop_sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );

        let handles = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );

        let mut stopped = 0;
        for _ in 0..handles.len() {
            match self.done_receiver.recv_timeout(self.config.shutdown_timeout) {
                Ok(worker_id) => {
                    stopped += 1;
                    debug!("Worker {} finished", worker_id);
                }
                Err(_) => break,
            }
        }

        if stopped < handles.len() {
            warn!(
                "{} worker(s) did not stop within {:?}; leaving them detached",
                handles.len() - stopped,
                self.config.shutdown_timeout
            );
        }

        for (i, handle) in handles.into_iter().enumerate() {
            if !handle.is_finished() {
                continue;
            }
            if let Err(e) = handle.join() {
                error!("Worker {} panicked: {}", i, panic_message(e.as_ref()));
            }
        }

        let pending = self.queued();
        if pending > 0 {
            warn!("{} queued task(s) were not started", pending);
        }
        info!("All workers have stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Tells the pool owner a worker has exited, even on unwinding.
struct DoneSignal {
    sender: Sender<usize>,
    worker_id: usize,
}

impl Drop for DoneSignal {
    fn drop(&mut self) {
        let _ = self.sender.send(self.worker_id);
    }
}

struct Worker {
    id: usize,
    tasks: Receiver<String>,
    stop: Receiver<()>,
    running: Arc<AtomicBool>,
    pipeline: Arc<Pipeline>,
    table: Arc<TaskTable>,
    pause: Duration,
}

impl Worker {
    fn run(&self) {
        debug!("Worker {} started", self.id);

        loop {
            select! {
                recv(self.stop) -> _ => {
                    debug!("Worker {} received shutdown signal", self.id);
                    break;
                }
                recv(self.tasks) -> msg => {
                    let Ok(task_id) = msg else {
                        debug!("Worker {} task channel disconnected", self.id);
                        break;
                    };
                    // select! picks randomly when both channels are ready.
                    if !self.running.load(Ordering::SeqCst) {
                        debug!("Worker {} dropping task {} after shutdown", self.id, task_id);
                        break;
                    }

                    self.process(&task_id);

                    match self.stop.recv_timeout(self.pause) {
                        Err(RecvTimeoutError::Timeout) => {}
                        _ => break,
                    }
                }
            }
        }

        debug!("Worker {} stopped", self.id);
    }

    fn process(&self, task_id: &str) {
        if let Err(e) = self.table.mark_processing(task_id) {
            error!("Worker {} cannot start task {}: {}", self.id, task_id, e);
            return;
        }
        let Some(task) = self.table.get(task_id) else {
            error!("Worker {} lost task {}", self.id, task_id);
            return;
        };

        info!("Worker {} processing task {} ({})", self.id, task_id, task.source_name);
        let mut ctx = PipelineContext::new(task);
        let outcome = catch_unwind(AssertUnwindSafe(|| self.pipeline.run(&mut ctx)));

        let recorded = match outcome {
            Ok(Ok(output)) => {
                info!(
                    "Task {} completed: {} page(s), expires {}",
                    task_id,
                    output.page_count,
                    output.expires_at.to_rfc3339()
                );
                self.table.mark_completed(task_id, output)
            }
            Ok(Err(e)) => {
                error!("Task {} failed: {}", task_id, e);
                self.table.mark_failed(task_id, e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Task {} panicked: {}", task_id, message);
                self.table
                    .mark_failed(task_id, format!("Internal error: {}", message))
            }
        };

        if let Err(e) = recorded {
            error!("Worker {} could not record result of {}: {}", self.id, task_id, e);
        }
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
