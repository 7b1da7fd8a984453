//! Scripted in-memory transport for channel and synchronizer tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::{Frame, Socket, Transport};
use crate::error::TransportError;

/// The server side of a scripted socket
pub struct ServerEnd {
    pub url: String,
    frames: mpsc::UnboundedSender<Frame>,
    sent: mpsc::UnboundedReceiver<String>,
}

impl ServerEnd {
    pub fn push_text(&self, text: impl Into<String>) {
        let _ = self.frames.send(Frame::Text(text.into()));
    }

    pub fn close(&self, code: Option<u16>) {
        let _ = self.frames.send(Frame::Close(code));
    }

    /// Next text the client wrote; close calls show up as `close:<code>`
    pub async fn next_sent(&mut self) -> Option<String> {
        self.sent.recv().await
    }

    pub fn try_next_sent(&mut self) -> Option<String> {
        self.sent.try_recv().ok()
    }
}

struct ScriptedSocket {
    frames: mpsc::UnboundedReceiver<Frame>,
    sent: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Socket for ScriptedSocket {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.sent
            .send(text)
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        self.frames.recv().await.map(Ok)
    }

    async fn close(&mut self, code: u16, _reason: &str) -> Result<(), TransportError> {
        let _ = self.sent.send(format!("close:{code}"));
        Ok(())
    }
}

#[derive(Default)]
struct Script {
    /// `true` accepts the next open, `false` refuses it
    outcomes: VecDeque<bool>,
    accept_by_default: bool,
    opened: Vec<String>,
}

/// Transport whose open results are scripted by the test.
///
/// Accepted sockets are handed to the test as [`ServerEnd`]s.
#[derive(Clone)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
    accepted_tx: mpsc::UnboundedSender<ServerEnd>,
}

impl ScriptedTransport {
    /// Refuse every open unless scripted otherwise
    pub fn refusing() -> (Self, mpsc::UnboundedReceiver<ServerEnd>) {
        Self::with_default(false)
    }

    /// Accept every open unless scripted otherwise
    pub fn accepting() -> (Self, mpsc::UnboundedReceiver<ServerEnd>) {
        Self::with_default(true)
    }

    fn with_default(accept_by_default: bool) -> (Self, mpsc::UnboundedReceiver<ServerEnd>) {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        let transport = Self {
            script: Arc::new(Mutex::new(Script {
                accept_by_default,
                ..Script::default()
            })),
            accepted_tx,
        };
        (transport, accepted_rx)
    }

    pub fn push_outcome(&self, accept: bool) {
        self.script.lock().unwrap().outcomes.push_back(accept);
    }

    pub fn open_count(&self) -> usize {
        self.script.lock().unwrap().opened.len()
    }

    pub fn opened_urls(&self) -> Vec<String> {
        self.script.lock().unwrap().opened.clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, url: &str) -> Result<Box<dyn Socket>, TransportError> {
        let accept = {
            let mut script = self.script.lock().unwrap();
            script.opened.push(url.to_string());
            let default = script.accept_by_default;
            script.outcomes.pop_front().unwrap_or(default)
        };
        if !accept {
            return Err(TransportError::Connect("connection refused".to_string()));
        }

        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let _ = self.accepted_tx.send(ServerEnd {
            url: url.to_string(),
            frames: frames_tx,
            sent: sent_rx,
        });
        Ok(Box::new(ScriptedSocket {
            frames: frames_rx,
            sent: sent_tx,
        }))
    }
}
