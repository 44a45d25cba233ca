//! Start-up configuration handshake
//!
//! Before any event is ingested, a named request is sent over the channel
//! and exactly one string reply is expected back. The only request in use
//! selects which API surface the producer instruments.

use crate::error::{Error, Result};
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Name of the request selecting the instrumented API surface
pub const API_MODE_REQUEST: &str = "cuda_api_type";

/// API surface the producer instruments
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ApiMode {
    Runtime,
    Driver,
    Both,
}

impl ApiMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ApiMode::Runtime => "runtime",
            ApiMode::Driver => "driver",
            ApiMode::Both => "both",
        }
    }

    pub fn includes_runtime(self) -> bool {
        matches!(self, ApiMode::Runtime | ApiMode::Both)
    }

    pub fn includes_driver(self) -> bool {
        matches!(self, ApiMode::Driver | ApiMode::Both)
    }
}

impl fmt::Display for ApiMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "runtime" => Ok(ApiMode::Runtime),
            "driver" => Ok(ApiMode::Driver),
            "both" => Ok(ApiMode::Both),
            other => Err(Error::InvalidApiMode {
                request: API_MODE_REQUEST,
                reply: other.to_string(),
            }),
        }
    }
}

/// Transport for the request/reply exchange
pub trait HandshakeChannel {
    fn send_request(&mut self, name: &str) -> Result<()>;

    fn receive_reply(&mut self) -> Result<String>;
}

/// Send the API mode request and validate the reply
pub fn request_api_mode<C: HandshakeChannel + ?Sized>(channel: &mut C) -> Result<ApiMode> {
    channel.send_request(API_MODE_REQUEST)?;
    let reply = channel.receive_reply()?;
    let mode: ApiMode = reply.trim().parse()?;
    info!(mode = %mode, "configuration handshake complete");
    Ok(mode)
}

/// Handshake over a pair of crossbeam channels
#[derive(Debug)]
pub struct ChannelHandshake {
    requests: Sender<String>,
    replies: Receiver<String>,
    timeout: Duration,
}

impl ChannelHandshake {
    pub fn new(requests: Sender<String>, replies: Receiver<String>, timeout: Duration) -> Self {
        Self {
            requests,
            replies,
            timeout,
        }
    }
}

impl HandshakeChannel for ChannelHandshake {
    fn send_request(&mut self, name: &str) -> Result<()> {
        self.requests.send(name.to_string()).map_err(|_| {
            Error::Handshake(format!("could not send \"{}\" request", name))
        })
    }

    fn receive_reply(&mut self) -> Result<String> {
        self.replies.recv_timeout(self.timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => Error::Handshake(format!(
                "no reply received within {} ms",
                self.timeout.as_millis()
            )),
            RecvTimeoutError::Disconnected => {
                Error::Handshake("reply channel closed before a reply arrived".to_string())
            }
        })
    }
}

/// Handshake that answers every request with a preconfigured reply
#[derive(Debug, Clone)]
pub struct FixedReply {
    reply: String,
    sent: Vec<String>,
}

impl FixedReply {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            sent: Vec::new(),
        }
    }

    /// Requests sent so far
    pub fn requests(&self) -> &[String] {
        &self.sent
    }
}

impl HandshakeChannel for FixedReply {
    fn send_request(&mut self, name: &str) -> Result<()> {
        self.sent.push(name.to_string());
        Ok(())
    }

    fn receive_reply(&mut self) -> Result<String> {
        if self.sent.is_empty() {
            return Err(Error::Handshake("reply requested before any request".to_string()));
        }
        Ok(self.reply.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;
    use std::thread;

    #[test]
    fn test_api_mode_parse() {
        assert_eq!("runtime".parse::<ApiMode>().unwrap(), ApiMode::Runtime);
        assert_eq!("driver".parse::<ApiMode>().unwrap(), ApiMode::Driver);
        assert_eq!("both".parse::<ApiMode>().unwrap(), ApiMode::Both);
        assert!(matches!(
            "Runtime".parse::<ApiMode>(),
            Err(Error::InvalidApiMode { .. })
        ));
    }

    #[test]
    fn test_api_mode_surfaces() {
        assert!(ApiMode::Runtime.includes_runtime());
        assert!(!ApiMode::Runtime.includes_driver());
        assert!(ApiMode::Both.includes_runtime() && ApiMode::Both.includes_driver());
    }

    #[test]
    fn test_fixed_reply_handshake() {
        let mut channel = FixedReply::new("driver\n");
        assert_eq!(request_api_mode(&mut channel).unwrap(), ApiMode::Driver);
        assert_eq!(channel.requests().to_vec(), vec!["cuda_api_type".to_string()]);
    }

    #[test]
    fn test_invalid_reply_is_fatal() {
        let mut channel = FixedReply::new("opencl");
        let err = request_api_mode(&mut channel).unwrap_err();
        assert!(err.to_string().contains("opencl"));
    }

    #[test]
    fn test_channel_handshake_round_trip() {
        let (req_tx, req_rx) = channel::unbounded::<String>();
        let (rep_tx, rep_rx) = channel::unbounded::<String>();

        let responder = thread::spawn(move || {
            let request = req_rx.recv().unwrap();
            assert_eq!(request, API_MODE_REQUEST);
            rep_tx.send("both".to_string()).unwrap();
        });

        let mut handshake = ChannelHandshake::new(req_tx, rep_rx, Duration::from_secs(5));
        assert_eq!(request_api_mode(&mut handshake).unwrap(), ApiMode::Both);
        responder.join().unwrap();
    }

    #[test]
    fn test_channel_handshake_without_reply() {
        let (req_tx, _req_rx) = channel::unbounded::<String>();
        let (rep_tx, rep_rx) = channel::unbounded::<String>();
        drop(rep_tx);

        let mut handshake = ChannelHandshake::new(req_tx, rep_rx, Duration::from_millis(10));
        assert!(matches!(
            request_api_mode(&mut handshake),
            Err(Error::Handshake(_))
        ));
    }

    #[test]
    fn test_channel_handshake_send_failure() {
        let (req_tx, req_rx) = channel::unbounded::<String>();
        let (_rep_tx, rep_rx) = channel::unbounded::<String>();
        drop(req_rx);

        let mut handshake = ChannelHandshake::new(req_tx, rep_rx, Duration::from_millis(10));
        let err = request_api_mode(&mut handshake).unwrap_err();
        assert!(err.to_string().contains("cuda_api_type"));
    }
}
