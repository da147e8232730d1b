//! Local-network advertisement and browsing of sender sessions.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use kernel::runtime::TaskSpawner;
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::AppResult;
use crate::locks::{lock_mutex, read_lock, write_lock};
use crate::models::SessionInfo;

pub const DISCOVERY_SERVICE: &str = "mediashare";
const RECV_BUFFER_BYTES: usize = 4096;
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(300);

pub trait Discovery: Send + Sync {
    /// Starts advertising a listening sender session.
    fn register(&self, port: u16, session_token: &str, device_name: &str) -> AppResult<()>;

    /// Withdraws the advertisement. Safe to call when nothing is registered.
    fn unregister(&self);

    /// Starts browsing. Each reachable session is yielded once.
    fn discover(&self) -> AppResult<DiscoveryStream>;
}

/// One UDP datagram advertising a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryAnnouncement {
    pub service: String,
    pub device_name: String,
    pub port: u16,
    pub session_token: String,
    pub app_version: String,
    pub ts: i64,
}

impl DiscoveryAnnouncement {
    pub fn new(port: u16, session_token: &str, device_name: &str) -> Self {
        Self {
            service: DISCOVERY_SERVICE.to_string(),
            device_name: device_name.to_string(),
            port,
            session_token: session_token.to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            ts: now_millis(),
        }
    }

    pub fn session_at(&self, host: IpAddr) -> SessionInfo {
        SessionInfo {
            host: host.to_string(),
            port: self.port,
            session_token: self.session_token.clone(),
            device_name: self.device_name.clone(),
        }
    }
}

/// Decodes a datagram. Foreign services, zero ports and the local session's own
/// announcements yield `None`.
pub fn parse_announcement(
    payload: &[u8],
    from: SocketAddr,
    local_token: Option<&str>,
) -> Option<SessionInfo> {
    let announcement = serde_json::from_slice::<DiscoveryAnnouncement>(payload).ok()?;
    if announcement.service != DISCOVERY_SERVICE || announcement.port == 0 {
        return None;
    }
    if local_token.is_some_and(|token| token == announcement.session_token) {
        return None;
    }
    Some(announcement.session_at(from.ip()))
}

/// Sessions already yielded, keyed by host, port and token.
#[derive(Debug, Default)]
pub struct SeenSessions {
    seen: HashSet<(String, u16, String)>,
}

impl SeenSessions {
    /// `true` the first time a session is seen.
    pub fn insert(&mut self, session: &SessionInfo) -> bool {
        self.seen.insert((
            session.host.clone(),
            session.port,
            session.session_token.clone(),
        ))
    }
}

/// Browsing handle. Dropping it or calling [`DiscoveryStream::cancel`] stops the
/// background listener.
#[derive(Debug)]
pub struct DiscoveryStream {
    receiver: mpsc::UnboundedReceiver<SessionInfo>,
    stop: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl DiscoveryStream {
    pub fn new(
        receiver: mpsc::UnboundedReceiver<SessionInfo>,
        stop: Arc<AtomicBool>,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            receiver,
            stop,
            task,
        }
    }

    /// Next newly seen session, `None` once browsing has stopped.
    pub async fn next(&mut self) -> Option<SessionInfo> {
        self.receiver.recv().await
    }

    pub fn cancel(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        self.receiver.close();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for DiscoveryStream {
    fn drop(&mut self) {
        self.cancel();
    }
}

struct Registration {
    stop: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// UDP broadcast discovery: announcements go to the broadcast address on the discovery
/// port, browsing listens on the same port.
pub struct LanDiscovery {
    task_spawner: Arc<dyn TaskSpawner>,
    port: u16,
    interval: Duration,
    broadcast_target: SocketAddr,
    registration: Mutex<Option<Registration>>,
    local_token: Arc<RwLock<Option<String>>>,
}

impl LanDiscovery {
    pub fn new(task_spawner: Arc<dyn TaskSpawner>, port: u16, interval: Duration) -> Self {
        Self {
            task_spawner,
            port,
            interval,
            broadcast_target: SocketAddr::from((Ipv4Addr::BROADCAST, port)),
            registration: Mutex::new(None),
            local_token: Arc::new(RwLock::new(None)),
        }
    }

    /// Sends announcements somewhere other than the broadcast address.
    pub fn with_broadcast_target(mut self, target: SocketAddr) -> Self {
        self.broadcast_target = target;
        self
    }

    pub fn is_registered(&self) -> bool {
        lock_mutex(&self.registration, "discovery_registration").is_some()
    }
}

impl Discovery for LanDiscovery {
    fn register(&self, port: u16, session_token: &str, device_name: &str) -> AppResult<()> {
        self.unregister();

        let stop = Arc::new(AtomicBool::new(false));
        let announcement = DiscoveryAnnouncement::new(port, session_token, device_name);
        let task = self.task_spawner.spawn(
            "transfer_discovery_broadcast",
            Box::pin(run_broadcast_loop(
                stop.clone(),
                announcement,
                self.broadcast_target,
                self.interval,
            )),
        )?;

        *write_lock(&self.local_token, "discovery_local_token") = Some(session_token.to_string());
        *lock_mutex(&self.registration, "discovery_registration") =
            Some(Registration { stop, task });
        tracing::info!(
            event = "transfer_discovery_registered",
            port,
            discovery_port = self.broadcast_target.port(),
            device_name
        );
        Ok(())
    }

    fn unregister(&self) {
        let registration = lock_mutex(&self.registration, "discovery_registration").take();
        write_lock(&self.local_token, "discovery_local_token").take();
        if let Some(registration) = registration {
            registration.stop.store(true, Ordering::Relaxed);
            registration.task.abort();
            tracing::info!(event = "transfer_discovery_unregistered");
        }
    }

    fn discover(&self) -> AppResult<DiscoveryStream> {
        let stop = Arc::new(AtomicBool::new(false));
        let (sender, receiver) = mpsc::unbounded_channel();
        let task = self.task_spawner.spawn(
            "transfer_discovery_listen",
            Box::pin(run_listen_loop(
                stop.clone(),
                self.port,
                self.local_token.clone(),
                sender,
            )),
        )?;
        Ok(DiscoveryStream::new(receiver, stop, Some(task)))
    }
}

impl Drop for LanDiscovery {
    fn drop(&mut self) {
        self.unregister();
    }
}

async fn run_broadcast_loop(
    stop: Arc<AtomicBool>,
    announcement: DiscoveryAnnouncement,
    target: SocketAddr,
    interval: Duration,
) {
    let socket = match UdpSocket::bind("0.0.0.0:0").await {
        Ok(value) => value,
        Err(error) => {
            tracing::error!(
                event = "transfer_discovery_broadcast_bind_failed",
                error = error.to_string()
            );
            return;
        }
    };

    if let Err(error) = socket.set_broadcast(true) {
        tracing::error!(
            event = "transfer_discovery_broadcast_enable_failed",
            error = error.to_string()
        );
        return;
    }

    while !stop.load(Ordering::Relaxed) {
        let mut payload = announcement.clone();
        payload.ts = now_millis();

        match serde_json::to_vec(&payload) {
            Ok(bytes) => {
                if let Err(error) = socket.send_to(bytes.as_slice(), target).await {
                    tracing::warn!(
                        event = "transfer_discovery_broadcast_send_failed",
                        error = error.to_string()
                    );
                }
            }
            Err(error) => {
                tracing::warn!(
                    event = "transfer_discovery_broadcast_serialize_failed",
                    error = error.to_string()
                );
            }
        }

        sleep(interval).await;
    }
}

async fn run_listen_loop(
    stop: Arc<AtomicBool>,
    port: u16,
    local_token: Arc<RwLock<Option<String>>>,
    sessions: mpsc::UnboundedSender<SessionInfo>,
) {
    let socket = match UdpSocket::bind(("0.0.0.0", port)).await {
        Ok(value) => value,
        Err(error) => {
            tracing::error!(
                event = "transfer_discovery_listen_bind_failed",
                port,
                error = error.to_string()
            );
            return;
        }
    };

    let mut buffer = vec![0u8; RECV_BUFFER_BYTES];
    let mut seen = SeenSessions::default();

    while !stop.load(Ordering::Relaxed) && !sessions.is_closed() {
        tokio::select! {
            recv = socket.recv_from(buffer.as_mut_slice()) => {
                let Ok((size, addr)) = recv else {
                    continue;
                };
                if size == 0 {
                    continue;
                }

                let token = read_lock(&local_token, "discovery_local_token").clone();
                let parsed = parse_announcement(&buffer[..size], addr, token.as_deref());
                let Some(session) = parsed else {
                    continue;
                };
                if !seen.insert(&session) {
                    continue;
                }

                tracing::debug!(
                    event = "transfer_discovery_peer_found",
                    peer = session.address(),
                    device_name = session.device_name.as_str()
                );
                if sessions.send(session).is_err() {
                    break;
                }
            }
            _ = sleep(STOP_POLL_INTERVAL) => {}
        }
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "../tests/transfer/discovery_tests.rs"]
mod tests;
