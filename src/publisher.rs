//! Pub/sub side of the bridge: WebSocket broadcast of subject data.

use crate::types::{FrameSample, StaticDescriptor, SubjectName};
use crate::Result;
use serde::Serialize;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tungstenite::{Message, WebSocket};

/// Upper bound on one client write.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(2);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);
const ACCEPT_POLL: Duration = Duration::from_millis(20);

/// Delivery of subject data to subscribers. All publishing is best effort.
pub trait Publisher {
    /// Whether at least one subscriber is attached. Never blocks.
    fn has_connection(&self) -> bool;
    fn publish_static(&mut self, subject: &SubjectName, descriptor: &StaticDescriptor);
    fn publish_frame(&mut self, subject: &SubjectName, sample: &FrameSample);
}

/// Role tag attached to static data.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectRole {
    Camera,
}

/// JSON messages sent to subscribers.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage<'a> {
    Hello {
        provider: &'a str,
    },
    Static {
        subject: &'a SubjectName,
        role: SubjectRole,
        data: &'a StaticDescriptor,
    },
    Frame {
        subject: &'a SubjectName,
        data: &'a FrameSample,
    },
}

impl WireMessage<'_> {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

type WsClient = WebSocket<TcpStream>;

struct Shared {
    /// Last static message per subject, replayed to late subscribers.
    static_cache: Mutex<Vec<(SubjectName, String)>>,
    clients: Mutex<Vec<WsClient>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// WebSocket server broadcasting subject data to every connected browser or
/// engine plugin.
pub struct WsProvider {
    name: String,
    local_addr: SocketAddr,
    shared: Arc<Shared>,
    stop_flag: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl WsProvider {
    /// Listen on `addr` and start accepting subscribers in the background.
    pub fn bind(addr: &str, provider_name: &str) -> Result<WsProvider> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let shared = Arc::new(Shared {
            static_cache: Mutex::new(Vec::new()),
            clients: Mutex::new(Vec::new()),
        });
        let stop_flag = Arc::new(AtomicBool::new(false));
        let hello = WireMessage::Hello {
            provider: provider_name,
        }
        .to_json()?;

        let thread = {
            let shared = shared.clone();
            let stop = stop_flag.clone();
            std::thread::Builder::new()
                .name("ws-accept".into())
                .spawn(move || accept_loop(listener, shared, hello, stop))?
        };

        log::info!("Provider '{}' listening on ws://{}", provider_name, local_addr);

        Ok(WsProvider {
            name: provider_name.to_string(),
            local_addr,
            shared,
            stop_flag,
            thread: Some(thread),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn client_count(&self) -> usize {
        lock(&self.shared.clients).len()
    }

    fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        for mut ws in lock(&self.shared.clients).drain(..) {
            let _ = ws.close(None);
            let _ = ws.flush();
        }
    }
}

impl Drop for WsProvider {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Send to every client, dropping the ones whose write fails.
fn broadcast(clients: &mut Vec<WsClient>, json: &str) {
    let msg = Message::Text(json.to_string());
    let before = clients.len();
    clients.retain_mut(|ws| ws.send(msg.clone()).is_ok());
    let dropped = before - clients.len();
    if dropped > 0 {
        log::info!("[WS] {} client(s) removed ({} remaining)", dropped, clients.len());
    }
}

impl Publisher for WsProvider {
    fn has_connection(&self) -> bool {
        !lock(&self.shared.clients).is_empty()
    }

    fn publish_static(&mut self, subject: &SubjectName, descriptor: &StaticDescriptor) {
        let json = match (WireMessage::Static {
            subject,
            role: SubjectRole::Camera,
            data: descriptor,
        })
        .to_json()
        {
            Ok(json) => json,
            Err(e) => {
                log::warn!("Static data for {} not encoded: {}", subject, e);
                return;
            }
        };

        // Cache before clients so a subscriber joining now sees it exactly once.
        let mut cache = lock(&self.shared.static_cache);
        match cache.iter_mut().find(|(s, _)| s == subject) {
            Some(entry) => entry.1 = json.clone(),
            None => cache.push((subject.clone(), json.clone())),
        }
        broadcast(&mut lock(&self.shared.clients), &json);
    }

    fn publish_frame(&mut self, subject: &SubjectName, sample: &FrameSample) {
        match (WireMessage::Frame {
            subject,
            data: sample,
        })
        .to_json()
        {
            Ok(json) => broadcast(&mut lock(&self.shared.clients), &json),
            Err(e) => log::warn!("Frame for {} not encoded: {}", subject, e),
        }
    }
}

fn accept_loop(listener: TcpListener, shared: Arc<Shared>, hello: String, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, peer)) => {
                let shared = shared.clone();
                let hello = hello.clone();
                let spawned = std::thread::Builder::new()
                    .name("ws-handshake".into())
                    .spawn(move || handle_client(stream, peer, &shared, &hello));
                if let Err(e) = spawned {
                    log::warn!("[WS] could not spawn handshake thread: {}", e);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
            }
            Err(e) => {
                log::warn!("[WS] accept error: {}", e);
                std::thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

/// Upgrade a TCP connection, greet it and replay cached static data.
fn handle_client(stream: TcpStream, peer: SocketAddr, shared: &Shared, hello: &str) {
    stream.set_nonblocking(false).ok();
    stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT)).ok();
    // Write timeout keeps a slow client from stalling the publisher.
    stream.set_write_timeout(Some(SEND_TIMEOUT)).ok();
    stream.set_nodelay(true).ok();

    let mut ws = match tungstenite::accept(stream) {
        Ok(ws) => ws,
        Err(e) => {
            log::warn!("[WS] handshake with {} failed: {}", peer, e);
            return;
        }
    };

    let cache = lock(&shared.static_cache);
    let greeted = std::iter::once(hello)
        .chain(cache.iter().map(|(_, json)| json.as_str()))
        .all(|json| ws.send(Message::Text(json.to_string())).is_ok());
    if !greeted {
        log::warn!("[WS] {} dropped during greeting", peer);
        return;
    }

    let mut clients = lock(&shared.clients);
    clients.push(ws);
    log::info!("[WS] {} connected ({} total)", peer, clients.len());
}
