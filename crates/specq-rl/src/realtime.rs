//! Real-time sampling overlay
//!
//! Wraps any [`SpectrumProvider`] with a background producer that samples
//! continuously into a bounded queue while the engine consumes at its own
//! pace. The queue is the only shared resource; a full queue blocks the
//! producer (backpressure) instead of growing unbounded. Dropping the
//! consumer closes the queue and the producer thread exits.

use std::thread::JoinHandle;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use specq_core::Result;

use crate::spectrum::{Observation, SpectrumProvider};

enum Sample {
    Observation(Observation),
    SourceError(specq_core::SpecqError),
}

/// Bounded-queue consumer side of the real-time overlay.
pub struct QueuedProvider {
    rx: mpsc::Receiver<Sample>,
    producer: Option<JoinHandle<()>>,
    name: String,
}

impl QueuedProvider {
    /// Spawn the producer thread over `inner` with a queue of `depth` slots.
    pub fn spawn(mut inner: Box<dyn SpectrumProvider>, depth: usize) -> Self {
        let name = format!("{}+realtime", inner.name());
        let (tx, rx) = mpsc::channel(depth);

        let producer = std::thread::spawn(move || {
            loop {
                let sample = match inner.next_observation() {
                    Ok(Some(obs)) => Sample::Observation(obs),
                    Ok(None) => break, // source exhausted, close the queue
                    Err(e) => Sample::SourceError(e),
                };
                let stop_after = matches!(sample, Sample::SourceError(_));
                // blocking_send parks the producer while the queue is full
                if tx.blocking_send(sample).is_err() {
                    debug!("real-time consumer dropped, stopping producer");
                    break;
                }
                if stop_after {
                    break;
                }
            }
        });

        Self {
            rx,
            producer: Some(producer),
            name,
        }
    }
}

impl SpectrumProvider for QueuedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_observation(&mut self) -> Result<Option<Observation>> {
        match self.rx.blocking_recv() {
            Some(Sample::Observation(obs)) => Ok(Some(obs)),
            Some(Sample::SourceError(e)) => Err(e),
            None => Ok(None), // producer finished
        }
    }
}

impl Drop for QueuedProvider {
    fn drop(&mut self) {
        // Close the queue first so a parked producer wakes up and exits.
        self.rx.close();
        if let Some(handle) = self.producer.take() {
            if handle.join().is_err() {
                warn!("real-time producer thread panicked");
            }
        }
    }
}
