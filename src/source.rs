//! Event channel between the producer and the ingestor
//!
//! The ingestor only needs one blocking primitive: wait up to a timeout for
//! the next line. [`EventSource`] captures that. [`ChannelSource`] is the
//! crossbeam-backed implementation: the producer side holds the `Sender`
//! and signals end-of-stream explicitly with [`ProducerMessage::End`] or by
//! dropping every sender, so ingestion does not have to rely on liveness
//! polling alone.

use crate::error::{Error, Result};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error};

/// Result of waiting for the next line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Polled {
    Line(String),
    /// Nothing arrived within the timeout
    Timeout,
    /// The producer terminated the stream
    Closed,
}

/// Source of raw protocol lines
pub trait EventSource {
    /// Wait up to `timeout` for the next line
    ///
    /// Any error is a channel failure and aborts ingestion.
    fn poll(&mut self, timeout: Duration) -> Result<Polled>;
}

/// What a producer can put on the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProducerMessage {
    Line(String),
    /// Terminates the stream immediately
    End,
    /// The producer hit an unrecoverable transport error
    Failed(String),
}

/// Receiving half of an in-process event channel
#[derive(Debug, Clone)]
pub struct ChannelSource {
    rx: Receiver<ProducerMessage>,
}

impl ChannelSource {
    pub fn new(rx: Receiver<ProducerMessage>) -> Self {
        Self { rx }
    }
}

/// Create an unbounded event channel
pub fn event_channel() -> (Sender<ProducerMessage>, ChannelSource) {
    let (tx, rx) = channel::unbounded();
    (tx, ChannelSource::new(rx))
}

impl EventSource for ChannelSource {
    fn poll(&mut self, timeout: Duration) -> Result<Polled> {
        match self.rx.recv_timeout(timeout) {
            Ok(ProducerMessage::Line(line)) => Ok(Polled::Line(line)),
            Ok(ProducerMessage::End) => Ok(Polled::Closed),
            Ok(ProducerMessage::Failed(reason)) => Err(Error::Channel(reason)),
            Err(RecvTimeoutError::Timeout) => Ok(Polled::Timeout),
            Err(RecvTimeoutError::Disconnected) => Ok(Polled::Closed),
        }
    }
}

/// Producer thread that forwards lines from a reader into a channel
#[derive(Debug)]
pub struct LineReader {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl LineReader {
    /// Flag that stays true until the reader hits EOF or an error
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Wait for the reader thread to finish
    pub fn join(self) -> Result<()> {
        self.handle
            .join()
            .map_err(|_| Error::Channel("line reader thread panicked".to_string()))
    }
}

/// Spawn a thread that reads `reader` line by line into a new channel
///
/// EOF ends the stream; a read error (including invalid UTF-8) is delivered
/// to the ingestor as a channel failure.
pub fn spawn_line_reader<R>(mut reader: R) -> Result<(ChannelSource, LineReader)>
where
    R: BufRead + Send + 'static,
{
    let (tx, source) = event_channel();
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);

    let handle = thread::Builder::new()
        .name("line-reader".to_string())
        .spawn(move || {
            let mut buf = String::new();
            let mut lines = 0u64;
            loop {
                buf.clear();
                match reader.read_line(&mut buf) {
                    Ok(0) => break,
                    Ok(_) => {
                        lines += 1;
                        let line = buf.trim_end_matches(['\n', '\r']).to_string();
                        if tx.send(ProducerMessage::Line(line)).is_err() {
                            // Consumer is gone
                            break;
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "event stream read failed");
                        let _ = tx.send(ProducerMessage::Failed(format!(
                            "read failed after {} lines: {}",
                            lines, e
                        )));
                        break;
                    }
                }
            }
            debug!(lines, "event stream reader finished");
            flag.store(false, Ordering::Release);
        })
        .map_err(|e| Error::Channel(format!("could not spawn line reader: {}", e)))?;

    Ok((source, LineReader { running, handle }))
}
