//! Runs a [`Simulation`] on its own thread.
//!
//! The handle and the worker share nothing but two channels and a
//! cancellation flag. Every outbound message carries the epoch of the run that
//! produced it; [`SimulationHandle::drain`] drops anything from an older run.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::protocol::{Envelope, Inbound, LinkInput, NodeInput, Outbound};
use super::{BatchKind, ConfigPatch, Simulation, SimulationStatus, TickOutcome};
use crate::error::SimulationError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerOptions {
    /// Minimum time between automatic ticks; zero runs flat out.
    pub tick_interval: Duration,
}

enum Command {
    Message(Envelope<Inbound>),
    Shutdown,
}

/// Caller-owned connection to one simulation worker. Dropping it terminates
/// the worker.
pub struct SimulationHandle {
    commands: Sender<Command>,
    events: Receiver<Envelope<Outbound>>,
    thread: Option<JoinHandle<()>>,
    cancel: Arc<AtomicBool>,
    epoch: u64,
    discarded: u64,
}

impl SimulationHandle {
    pub fn spawn(options: WorkerOptions) -> Result<Self, SimulationError> {
        let (command_tx, command_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let worker_cancel = Arc::clone(&cancel);

        let thread = thread::Builder::new()
            .name("graphlens-simulation".to_owned())
            .spawn(move || run_worker(command_rx, event_tx, worker_cancel, options))
            .map_err(|error| SimulationError::Spawn(error.to_string()))?;

        Ok(Self {
            commands: command_tx,
            events: event_rx,
            thread: Some(thread),
            cancel,
            epoch: 0,
            discarded: 0,
        })
    }

    /// Epoch accepted by [`drain`](Self::drain).
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Stale messages dropped so far.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    pub fn is_alive(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }

    /// Sends `message` tagged with the current epoch. `init` and `stop` open a
    /// new epoch first, so nothing queued by the previous run gets through.
    pub fn post(&mut self, message: Inbound) -> Result<(), SimulationError> {
        if self.thread.is_none() {
            return Err(SimulationError::Disconnected);
        }
        if matches!(message, Inbound::Init { .. } | Inbound::Stop) {
            self.epoch += 1;
        }
        tracing::trace!(epoch = self.epoch, kind = message.kind(), "posting simulation message");
        self.commands
            .send(Command::Message(Envelope::new(self.epoch, message)))
            .map_err(|_| SimulationError::Disconnected)
    }

    /// Starts a new run and returns its epoch.
    pub fn init(
        &mut self,
        nodes: Vec<NodeInput>,
        edges: Vec<LinkInput>,
        config: ConfigPatch,
    ) -> Result<u64, SimulationError> {
        self.post(Inbound::Init {
            nodes: Some(nodes),
            edges: Some(edges),
            config: Some(config),
        })?;
        Ok(self.epoch)
    }

    pub fn update(&mut self, nodes: Vec<NodeInput>) -> Result<(), SimulationError> {
        self.post(Inbound::Update { nodes: Some(nodes) })
    }

    pub fn tick(&mut self) -> Result<(), SimulationError> {
        self.post(Inbound::Tick)
    }

    pub fn pause(&mut self) -> Result<(), SimulationError> {
        self.post(Inbound::Pause)
    }

    pub fn resume(&mut self) -> Result<(), SimulationError> {
        self.post(Inbound::Resume)
    }

    pub fn stop(&mut self) -> Result<(), SimulationError> {
        self.post(Inbound::Stop)
    }

    pub fn configure(&mut self, patch: ConfigPatch) -> Result<(), SimulationError> {
        self.post(Inbound::Configure {
            config: Some(patch),
        })
    }

    pub fn reheat(&mut self, alpha: Option<f32>) -> Result<(), SimulationError> {
        self.post(Inbound::Reheat { alpha })
    }

    /// Everything received from the current epoch, oldest first. Never blocks.
    pub fn drain(&mut self) -> Vec<Outbound> {
        let mut accepted = Vec::new();
        for envelope in self.events.try_iter() {
            if envelope.epoch == self.epoch {
                accepted.push(envelope.message);
            } else {
                self.discarded += 1;
                tracing::debug!(
                    epoch = envelope.epoch,
                    current = self.epoch,
                    kind = envelope.message.kind(),
                    "discarding stale simulation message"
                );
            }
        }
        accepted
    }

    /// Blocks until a current-epoch message arrives or `timeout` elapses.
    pub fn next_message(&mut self, timeout: Duration) -> Result<Option<Outbound>, SimulationError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(envelope) if envelope.epoch == self.epoch => return Ok(Some(envelope.message)),
                Ok(_) => self.discarded += 1,
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => return Err(SimulationError::Disconnected),
            }
        }
    }

    /// Cancels the run, joins the worker and drops anything still queued.
    /// Safe to call more than once.
    pub fn terminate(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.cancel.store(true, Ordering::Release);
        let _ = self.commands.send(Command::Shutdown);
        if thread.join().is_err() {
            tracing::warn!("simulation worker panicked during shutdown");
        }
        let stale = self.events.try_iter().count() as u64;
        self.discarded += stale;
        self.epoch += 1;
        tracing::debug!(stale, "simulation worker terminated");
    }
}

impl Drop for SimulationHandle {
    fn drop(&mut self) {
        self.terminate();
    }
}

struct Worker {
    simulation: Simulation,
    epoch: u64,
    events: Sender<Envelope<Outbound>>,
}

impl Worker {
    /// False once nobody is listening.
    fn emit(&self, message: Outbound) -> bool {
        self.events.send(Envelope::new(self.epoch, message)).is_ok()
    }

    fn dispatch(&mut self, envelope: Envelope<Inbound>) -> bool {
        self.epoch = self.epoch.max(envelope.epoch);
        let simulation = &mut self.simulation;
        let replies = match catch_unwind(AssertUnwindSafe(|| simulation.handle(envelope.message))) {
            Ok(replies) => replies,
            Err(payload) => {
                let error = SimulationError::Panicked(panic_message(payload.as_ref()));
                self.simulation.fail(&error);
                vec![self.simulation.error_message(&error)]
            }
        };
        replies.into_iter().all(|reply| self.emit(reply))
    }

    fn tick(&mut self) -> bool {
        let simulation = &mut self.simulation;
        let outcome = catch_unwind(AssertUnwindSafe(|| simulation.tick()));
        let message = match outcome {
            Ok(Ok(TickOutcome::Quiet)) => return true,
            Ok(Ok(TickOutcome::Broadcast)) => self.simulation.batch(BatchKind::Tick),
            Ok(Ok(TickOutcome::Ended)) => self.simulation.batch(BatchKind::End),
            Ok(Err(error)) => self.simulation.error_message(&error),
            Err(payload) => {
                let error = SimulationError::Panicked(panic_message(payload.as_ref()));
                self.simulation.fail(&error);
                self.simulation.error_message(&error)
            }
        };
        tracing::trace!(
            kind = message.kind(),
            iterations = message.state().iterations,
            "simulation broadcast"
        );
        self.emit(message)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}

fn run_worker(
    commands: Receiver<Command>,
    events: Sender<Envelope<Outbound>>,
    cancel: Arc<AtomicBool>,
    options: WorkerOptions,
) {
    let mut worker = Worker {
        simulation: Simulation::new(),
        epoch: 0,
        events,
    };
    let mut next_tick = Instant::now();

    loop {
        if cancel.load(Ordering::Acquire) {
            break;
        }

        let command = if worker.simulation.status() == SimulationStatus::Running {
            match commands.recv_timeout(next_tick.saturating_duration_since(Instant::now())) {
                Ok(command) => Some(command),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        } else {
            match commands.recv() {
                Ok(command) => Some(command),
                Err(_) => break,
            }
        };

        match command {
            Some(Command::Shutdown) => break,
            Some(Command::Message(envelope)) => {
                if !worker.dispatch(envelope) {
                    break;
                }
                continue;
            }
            None => {}
        }

        if cancel.load(Ordering::Acquire) {
            break;
        }
        if !worker.tick() {
            break;
        }
        next_tick = Instant::now() + options.tick_interval;
    }

    tracing::debug!(epoch = worker.epoch, "simulation worker exiting");
}
