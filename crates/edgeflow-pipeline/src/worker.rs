//! One thread per stage, bounded queues in between.
//!
//! Each stage is moved onto its own worker thread, so a device runner is only
//! ever called from that thread. Frames flow through bounded
//! `crossbeam-channel` queues; a full queue blocks the producer. Everything
//! the last stage emits, and every per-frame drop or fatal stage failure, is
//! reported on the event channel.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use edgeflow_core::{EdgeError, FramePayload, Payload, Result, Stage};

use crate::config::PipelineConfig;
use crate::pipeline::Pipeline;
use crate::priority;

#[derive(Debug)]
pub enum StageEvent {
    /// Output of the final stage.
    Output(Payload),
    /// A stage returned `Ok(None)` for this frame.
    Dropped { stage: String, frame_id: u64 },
    /// A stage failed fatally; its worker has stopped.
    Failed { stage: String, error: EdgeError },
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    pub queue_depth: usize,
    /// Request SCHED_FIFO for every worker thread.
    pub realtime_threads: bool,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            queue_depth: 8,
            realtime_threads: false,
        }
    }
}

impl From<&PipelineConfig> for WorkerOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            queue_depth: config.queue_depth,
            realtime_threads: config.priority.realtime_thread,
        }
    }
}

pub struct ThreadedPipeline {
    input: Option<Sender<Arc<Payload>>>,
    events: Receiver<StageEvent>,
    workers: Vec<(String, JoinHandle<()>)>,
}

impl ThreadedPipeline {
    pub fn spawn(pipeline: Pipeline, options: WorkerOptions) -> Result<Self> {
        if pipeline.is_empty() {
            return Err(EdgeError::Pipeline("cannot spawn an empty pipeline".into()));
        }
        let depth = options.queue_depth.max(1);
        let (event_tx, events) = unbounded();
        let (input, mut upstream) = bounded::<Arc<Payload>>(depth);

        let stages = pipeline.into_stages();
        let count = stages.len();
        let mut workers = Vec::with_capacity(count);
        for (i, stage) in stages.into_iter().enumerate() {
            let name = stage.name().to_string();
            let (next_tx, next_rx) = if i + 1 < count {
                let (tx, rx) = bounded(depth);
                (Some(tx), Some(rx))
            } else {
                (None, None)
            };

            let rx = upstream;
            let events = event_tx.clone();
            let realtime = options.realtime_threads;
            let handle = thread::Builder::new()
                .name(format!("edgeflow-{name}"))
                .spawn(move || {
                    if realtime {
                        if let Err(e) = priority::set_thread_realtime() {
                            tracing::warn!(error = %e, "could not raise worker priority");
                        }
                    }
                    run_stage(stage, rx, next_tx, events);
                })?;
            workers.push((name, handle));

            match next_rx {
                Some(rx) => upstream = rx,
                None => break,
            }
        }

        tracing::info!(workers = workers.len(), queue_depth = depth, "threaded pipeline started");
        Ok(Self {
            input: Some(input),
            events,
            workers,
        })
    }

    /// Queue a frame for the first stage. Blocks while the queue is full.
    pub fn submit(&self, frame: FramePayload) -> Result<()> {
        let input = self
            .input
            .as_ref()
            .ok_or_else(|| EdgeError::Pipeline("pipeline is shut down".into()))?;
        input
            .send(Arc::new(Payload::Frame(frame)))
            .map_err(|_| EdgeError::Pipeline("first stage has stopped".into()))
    }

    /// Outputs, drops and failures, in the order the workers produced them.
    pub fn results(&self) -> &Receiver<StageEvent> {
        &self.events
    }

    /// Close the input, let in-flight frames drain and join every worker.
    pub fn shutdown(mut self) -> Result<()> {
        self.join()
    }

    fn join(&mut self) -> Result<()> {
        self.input.take();
        let mut panicked = Vec::new();
        for (name, handle) in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!(stage = %name, "stage worker panicked");
                panicked.push(name);
            }
        }
        if panicked.is_empty() {
            Ok(())
        } else {
            Err(EdgeError::Pipeline(format!(
                "stage workers panicked: {}",
                panicked.join(", ")
            )))
        }
    }
}

impl Drop for ThreadedPipeline {
    fn drop(&mut self) {
        let _ = self.join();
    }
}

fn run_stage(
    mut stage: Box<dyn Stage>,
    rx: Receiver<Arc<Payload>>,
    next: Option<Sender<Arc<Payload>>>,
    events: Sender<StageEvent>,
) {
    let name = stage.name().to_string();
    tracing::debug!(stage = %name, "stage worker running");

    for payload in rx.iter() {
        let frame_id = payload.frame_id();
        match stage.process(std::slice::from_ref(&payload)) {
            Ok(Some(out)) => {
                let delivered = match &next {
                    Some(tx) => tx.send(Arc::new(out)).is_ok(),
                    None => events.send(StageEvent::Output(out)).is_ok(),
                };
                if !delivered {
                    tracing::debug!(stage = %name, "downstream closed");
                    break;
                }
            }
            Err(error) if error.is_recoverable() => {
                tracing::warn!(stage = %name, frame = frame_id, error = %error, "frame rejected");
                let _ = events.send(StageEvent::Dropped {
                    stage: name.clone(),
                    frame_id,
                });
            }
            Ok(None) => {
                let _ = events.send(StageEvent::Dropped {
                    stage: name.clone(),
                    frame_id,
                });
            }
            Err(error) => {
                tracing::error!(stage = %name, frame = frame_id, error = %error, "stage failed");
                let _ = events.send(StageEvent::Failed {
                    stage: name.clone(),
                    error,
                });
                break;
            }
        }
    }

    // Release stage resources on the worker thread.
    drop(stage);
    tracing::debug!(stage = %name, "stage worker stopped");
}
