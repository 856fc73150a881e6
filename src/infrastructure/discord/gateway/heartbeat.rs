use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::connection::OutboundSender;
use super::payloads::GatewayPayload;
use super::session::SessionShared;

/// Periodic heartbeat bound to one session.
///
/// Cloning yields another handle to the same keeper.
#[derive(Clone)]
pub struct HeartbeatKeeper {
    inner: Arc<KeeperInner>,
}

struct KeeperInner {
    shared: Arc<SessionShared>,
    outbound: OutboundSender,
    running: AtomicBool,
    started: AtomicBool,
    // Held across check-and-send so `stop` can wait out an in-flight beat.
    gate: Mutex<()>,
    wake: Notify,
}

impl HeartbeatKeeper {
    #[must_use]
    pub fn new(shared: Arc<SessionShared>, outbound: OutboundSender) -> Self {
        Self {
            inner: Arc::new(KeeperInner {
                shared,
                outbound,
                running: AtomicBool::new(false),
                started: AtomicBool::new(false),
                gate: Mutex::new(()),
                wake: Notify::new(),
            }),
        }
    }

    /// Spawns the heartbeat task: one beat right away, then one per
    /// `interval`. A keeper starts at most once; later calls return `false`.
    pub fn start(&self, interval: Duration) -> bool {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            warn!("Heartbeat already started, ignoring new interval");
            return false;
        }
        self.inner.running.store(true, Ordering::SeqCst);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            loop {
                {
                    let _gate = inner.gate.lock().await;
                    if !inner.running.load(Ordering::SeqCst) {
                        break;
                    }
                    if !inner.beat().await {
                        break;
                    }
                }

                tokio::select! {
                    () = sleep(interval) => {}
                    () = inner.wake.notified() => {}
                }
            }

            inner.running.store(false, Ordering::SeqCst);
            debug!("Heartbeat loop stopped");
        });

        true
    }

    /// Stops the task. No heartbeat is queued after this returns. Safe to
    /// call on a keeper that never started.
    pub async fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.wake.notify_one();
        let _gate = self.inner.gate.lock().await;
    }
}

impl KeeperInner {
    async fn beat(&self) -> bool {
        let sequence = self.shared.heartbeat_sequence();

        let result = match GatewayPayload::heartbeat(sequence).encode() {
            Ok(text) => self.outbound.send(text).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                debug!(sequence = ?sequence, "Sent heartbeat");
                true
            }
            Err(e) => {
                self.shared.fail(format!("heartbeat failed: {e}"));
                false
            }
        }
    }
}
