//! In-memory gateway transport driven by a test script.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use super::connection::GatewayConnection;
use super::error::{GatewayError, GatewayResult};
use super::proxy::ProxyConfig;

pub struct ScriptedConnection {
    inbound: mpsc::UnboundedReceiver<Option<String>>,
    sent: Arc<Mutex<Vec<String>>>,
    sent_tx: mpsc::UnboundedSender<String>,
    proxy: Arc<Mutex<Option<ProxyConfig>>>,
    reject_sends: Arc<AtomicBool>,
    connected: bool,
}

/// The gateway side of a [`ScriptedConnection`].
pub struct GatewayScript {
    inbound: mpsc::UnboundedSender<Option<String>>,
    sent: Arc<Mutex<Vec<String>>>,
    sent_rx: mpsc::UnboundedReceiver<String>,
    proxy: Arc<Mutex<Option<ProxyConfig>>>,
    reject_sends: Arc<AtomicBool>,
}

impl ScriptedConnection {
    pub fn new() -> (Self, GatewayScript) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let proxy = Arc::new(Mutex::new(None));
        let reject_sends = Arc::new(AtomicBool::new(false));

        let connection = Self {
            inbound: inbound_rx,
            sent: sent.clone(),
            sent_tx,
            proxy: proxy.clone(),
            reject_sends: reject_sends.clone(),
            connected: false,
        };
        let script = GatewayScript {
            inbound: inbound_tx,
            sent,
            sent_rx,
            proxy,
            reject_sends,
        };
        (connection, script)
    }
}

#[async_trait]
impl GatewayConnection for ScriptedConnection {
    async fn connect(
        &mut self,
        _url: &str,
        _user_agent: Option<&str>,
        proxy: Option<&ProxyConfig>,
    ) -> GatewayResult<()> {
        *self.proxy.lock() = proxy.cloned();
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> GatewayResult<()> {
        self.connected = false;
        Ok(())
    }

    async fn send(&mut self, text: &str) -> GatewayResult<()> {
        if !self.connected {
            return Err(GatewayError::NotConnected);
        }
        if self.reject_sends.load(Ordering::SeqCst) {
            return Err(GatewayError::websocket("broken pipe"));
        }
        self.sent.lock().push(text.to_string());
        let _ = self.sent_tx.send(text.to_string());
        Ok(())
    }

    async fn receive(&mut self) -> GatewayResult<String> {
        match self.inbound.recv().await {
            Some(Some(text)) => Ok(text),
            Some(None) | None => {
                self.connected = false;
                Err(GatewayError::ConnectionClosed {
                    code: 1000,
                    reason: "script closed".to_string(),
                })
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

impl GatewayScript {
    /// Queues an inbound frame.
    pub fn push(&self, frame: String) {
        let _ = self.inbound.send(Some(frame));
    }

    /// Closes the inbound side after the frames already queued.
    pub fn close(&self) {
        let _ = self.inbound.send(None);
    }

    /// Makes every later write fail at the transport.
    pub fn reject_sends(&self) {
        self.reject_sends.store(true, Ordering::SeqCst);
    }

    /// Proxy the client passed to `connect`.
    pub fn proxy(&self) -> Option<ProxyConfig> {
        self.proxy.lock().clone()
    }

    /// Opcodes of every frame the client wrote so far.
    pub fn sent_ops(&self) -> Vec<u64> {
        self.sent
            .lock()
            .iter()
            .filter_map(|text| serde_json::from_str::<Value>(text).ok())
            .filter_map(|value| value["op"].as_u64())
            .collect()
    }

    /// Waits for the next written frame with opcode `op`, skipping others.
    pub async fn next_with_op(&mut self, op: u64) -> Value {
        loop {
            let text = self.sent_rx.recv().await.expect("connection dropped");
            let value: Value = serde_json::from_str(&text).expect("client wrote invalid JSON");
            if value["op"].as_u64() == Some(op) {
                return value;
            }
        }
    }
}
