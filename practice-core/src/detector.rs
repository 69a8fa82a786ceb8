//! # Detection Loop
//!
//! [`Detector`] owns the lifecycle of one running pipeline:
//!
//! ```text
//! Idle --start()--> Capturing --stop()--> Idle
//! ```
//!
//! `start()` spawns a dedicated worker thread. The worker opens the capture
//! device itself and reports back whether that worked, so `start()` can fail
//! synchronously while the device handle never leaves the worker. Each cycle
//! the worker reads one frame, runs the pipeline, sends the result down the
//! session's channel and then rests for the pipeline's cycle delay.
//!
//! Stopping is cooperative. The running flag is checked at the top of every
//! cycle and the rest period wakes early on shutdown, but a cycle that has
//! started always finishes. The worker closes the device on its way out and
//! `stop()` joins it, so by the time `stop()` returns the device is released.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, info, warn};

use crate::audio::CaptureBackend;
use crate::config::{ChordConfig, TunerConfig};
use crate::error::{EngineError, Result};
use crate::pipeline::{ChordPipeline, Pipeline, TargetFrequency, TunerPipeline};

/// Start/stop controller for one pipeline.
pub struct Detector<P: Pipeline> {
    pipeline: P,
    backend: Arc<dyn CaptureBackend>,
    worker: Option<Worker>,
}

/// Handle to a running worker thread.
struct Worker {
    running: Arc<AtomicBool>,
    shutdown_tx: Sender<()>,
    thread_handle: Option<JoinHandle<()>>,
}

impl Detector<TunerPipeline> {
    /// A tuner detector with its own target frequency cell.
    pub fn tuner(config: TunerConfig, backend: Arc<dyn CaptureBackend>) -> Result<Self> {
        Ok(Self::new(TunerPipeline::new(config)?, backend))
    }

    /// Handle for changing the tuner's target from any thread.
    pub fn target(&self) -> TargetFrequency {
        self.pipeline.target()
    }

    /// Switches between "nearest note" (`None`) and "deviation from target" mode.
    /// Applies from the next cycle on.
    pub fn set_target_frequency(&self, target: Option<f64>) {
        self.pipeline.target().set(target);
    }
}

impl Detector<ChordPipeline> {
    pub fn chords(config: ChordConfig, backend: Arc<dyn CaptureBackend>) -> Result<Self> {
        Ok(Self::new(ChordPipeline::new(config)?, backend))
    }
}

impl<P: Pipeline> Detector<P> {
    pub fn new(pipeline: P, backend: Arc<dyn CaptureBackend>) -> Self {
        Self {
            pipeline,
            backend,
            worker: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Opens the capture device and starts the analysis loop.
    ///
    /// If the device cannot be opened the detector stays idle and no loop runs.
    ///
    /// # Returns
    /// * `Ok(receiver)` - This session's result channel, one result per cycle
    /// * `Err(EngineError::AlreadyRunning)` - A session is already active
    /// * `Err(EngineError::DeviceUnavailable | UnsupportedFormat)` - The
    ///   backend could not open a matching device
    pub fn start(&mut self) -> Result<Receiver<P::Output>> {
        if self.worker.is_some() {
            return Err(EngineError::AlreadyRunning);
        }

        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<()>>(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let running = Arc::new(AtomicBool::new(true));

        let session = WorkerSession {
            pipeline: self.pipeline.clone(),
            backend: Arc::clone(&self.backend),
            running: Arc::clone(&running),
            shutdown_rx,
            ready_tx,
            result_tx,
        };

        let thread_handle = thread::Builder::new()
            .name(format!("{}-detector", P::NAME))
            .spawn(move || session.run())
            .map_err(|e| EngineError::DeviceUnavailable(format!("failed to spawn worker: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!(pipeline = P::NAME, "detector started");
                self.worker = Some(Worker {
                    running,
                    shutdown_tx,
                    thread_handle: Some(thread_handle),
                });
                Ok(result_rx)
            }
            Ok(Err(e)) => {
                warn!(pipeline = P::NAME, error = %e, "detector failed to start");
                let _ = thread_handle.join();
                Err(e)
            }
            Err(_) => {
                error!(pipeline = P::NAME, "detector worker died during start-up");
                let _ = thread_handle.join();
                Err(EngineError::WorkerPanicked)
            }
        }
    }

    /// Stops the loop and releases the device.
    ///
    /// Waits for the in-flight cycle to finish. Calling it while idle, or
    /// twice, does nothing. Teardown failures are logged, never returned.
    pub fn stop(&mut self) {
        let Some(mut worker) = self.worker.take() else {
            return;
        };
        info!(pipeline = P::NAME, "stopping detector");
        worker.running.store(false, Ordering::Release);
        let _ = worker.shutdown_tx.try_send(());
        if let Some(handle) = worker.thread_handle.take() {
            if handle.join().is_err() {
                warn!(pipeline = P::NAME, "detector worker panicked while shutting down");
            }
        }
        info!(pipeline = P::NAME, "detector stopped");
    }
}

impl<P: Pipeline> Drop for Detector<P> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything the worker thread owns for one session.
struct WorkerSession<P: Pipeline> {
    pipeline: P,
    backend: Arc<dyn CaptureBackend>,
    running: Arc<AtomicBool>,
    shutdown_rx: Receiver<()>,
    ready_tx: Sender<Result<()>>,
    result_tx: Sender<P::Output>,
}

impl<P: Pipeline> WorkerSession<P> {
    fn run(mut self) {
        let capture = self.pipeline.capture_config();
        let mut device = match self.backend.open(&capture) {
            Ok(device) => {
                let _ = self.ready_tx.send(Ok(()));
                device
            }
            Err(e) => {
                let _ = self.ready_tx.send(Err(e));
                return;
            }
        };

        let delay = self.pipeline.cycle_delay();
        let mut frame = vec![0i16; capture.frame_size];
        let mut cycle: u64 = 0;

        while self.running.load(Ordering::Acquire) {
            cycle += 1;
            let read = device.read_frame(&mut frame);

            let output = if read == frame.len() {
                let pipeline = &mut self.pipeline;
                match panic::catch_unwind(AssertUnwindSafe(|| pipeline.analyze(&frame))) {
                    Ok(output) => Some(output),
                    Err(_) => {
                        error!(pipeline = P::NAME, cycle, "analysis panicked, skipping cycle");
                        None
                    }
                }
            } else {
                debug!(pipeline = P::NAME, cycle, read, expected = frame.len(), "short read, frame discarded");
                self.pipeline.on_short_read()
            };

            if let Some(output) = output {
                // Fire-and-forget: a consumer that went away is not our problem.
                let _ = self.result_tx.send(output);
            }

            match self.shutdown_rx.recv_timeout(delay) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if let Err(e) = device.close() {
            warn!(pipeline = P::NAME, error = %e, "error releasing capture device");
        }
        debug!(pipeline = P::NAME, cycles = cycle, "detector worker finished");
    }
}
