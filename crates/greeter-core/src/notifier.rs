//! Spoken welcomes.
//!
//! The [`Notifier`] owns a single background worker with room for one queued
//! request. Dispatching closes the [`Gate`]; the worker reopens it by dropping
//! the permit once the [`Speaker`] returns, so the capture loop never waits on
//! audio and never starts a second batch while one is playing.

use crate::gate::{Gate, GatePermit};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug)]
pub enum SpeakerError {
    #[error("speech backend unavailable: {0}")]
    Unavailable(String),
    #[error("speech failed: {0}")]
    Failed(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Text-to-speech output. `say` blocks until the audio has finished.
pub trait Speaker: Send {
    fn say(&mut self, text: &str) -> Result<(), SpeakerError>;
}

/// Build the greeting for a batch of identities.
///
/// Duplicates are dropped, keeping first-seen order.
pub fn welcome_message<S: AsRef<str>>(identities: &[S]) -> String {
    let mut names: Vec<&str> = Vec::with_capacity(identities.len());
    for id in identities {
        let id = id.as_ref();
        if !names.contains(&id) {
            names.push(id);
        }
    }

    match names.as_slice() {
        [] => "Welcome, have a nice day.".to_string(),
        [only] => format!("Welcome {only}, have a nice day."),
        [rest @ .., last] => {
            let mut message = String::from("Welcome ");
            for name in rest {
                message.push_str(name);
                message.push_str(", ");
            }
            message.push_str(&format!("and {last}, have a nice day!"));
            message
        }
    }
}

/// Requests handled by the notifier worker.
enum NotifierRequest {
    Welcome {
        identities: Vec<String>,
        permit: GatePermit,
    },
    Announce {
        text: String,
        permit: GatePermit,
    },
}

pub struct Notifier {
    gate: Arc<Gate>,
    tx: mpsc::Sender<NotifierRequest>,
    worker: JoinHandle<()>,
}

impl Notifier {
    /// Spawn the notifier worker on a dedicated OS thread.
    pub fn spawn(speaker: Box<dyn Speaker>, gate: Arc<Gate>) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel::<NotifierRequest>(1);

        let worker = std::thread::Builder::new()
            .name("greeter-notifier".into())
            .spawn(move || run_worker(speaker, rx))?;

        Ok(Self { gate, tx, worker })
    }

    pub fn gate(&self) -> &Arc<Gate> {
        &self.gate
    }

    /// Greet `identities` in the background.
    ///
    /// Returns `false`, without side effects, when the list is empty or a
    /// greeting is already in flight.
    pub fn dispatch(&self, identities: &[String]) -> bool {
        if identities.is_empty() {
            return false;
        }
        let Some(permit) = self.gate.try_close() else {
            return false;
        };

        let batch = permit.batch();
        self.submit(
            NotifierRequest::Welcome {
                identities: identities.to_vec(),
                permit,
            },
            batch,
        )
    }

    /// Speak arbitrary text through the same gate as welcomes.
    pub fn announce(&self, text: impl Into<String>) -> bool {
        let Some(permit) = self.gate.try_close() else {
            return false;
        };

        let batch = permit.batch();
        self.submit(
            NotifierRequest::Announce {
                text: text.into(),
                permit,
            },
            batch,
        )
    }

    fn submit(&self, request: NotifierRequest, batch: u64) -> bool {
        match self.tx.try_send(request) {
            Ok(()) => {
                tracing::info!(batch, "notification dispatched");
                true
            }
            // The rejected request owns the permit; dropping it reopens the gate.
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(batch, "notifier queue full; dropping batch");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::error!(batch, "notifier worker has exited; dropping batch");
                false
            }
        }
    }

    /// Stop accepting work and wait for an in-flight greeting to finish.
    pub fn shutdown(self) {
        let Self { tx, worker, .. } = self;
        drop(tx);
        if worker.join().is_err() {
            tracing::error!("notifier worker panicked");
        }
    }
}

fn run_worker(mut speaker: Box<dyn Speaker>, mut rx: mpsc::Receiver<NotifierRequest>) {
    tracing::info!("notifier worker started");
    while let Some(request) = rx.blocking_recv() {
        let (text, permit) = match request {
            NotifierRequest::Welcome { identities, permit } => (welcome_message(&identities), permit),
            NotifierRequest::Announce { text, permit } => (text, permit),
        };

        let started = Instant::now();
        match speaker.say(&text) {
            Ok(()) => tracing::info!(
                batch = permit.batch(),
                text = %text,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "spoke"
            ),
            Err(e) => tracing::warn!(batch = permit.batch(), text = %text, error = %e, "speech failed"),
        }

        drop(permit);
    }
    tracing::info!("notifier worker exiting");
}
