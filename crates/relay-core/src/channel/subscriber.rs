//! Channel subscriber held by the first instance.
//!
//! Listens on `127.0.0.1:0` (OS-assigned port), records the port in the
//! channel's endpoint record, and hands every received payload to a single
//! registered handler. A connection is only served after the peer has named
//! the channel in its `Hello`; the subscriber itself never reveals the name.
//!
//! # Thread Safety
//!
//! The accept loop and each connection run as tokio tasks. All connections feed
//! one dispatcher task through a bounded queue, so the handler is never invoked
//! concurrently with itself and sees messages in the order the transport
//! received them.

use super::endpoint::{self, EndpointRecord};
use super::protocol::{read_frame, write_frame, Hello};
use crate::config::ChannelConfig;
use crate::{RelayError, Result};
use std::any::Any;
use std::net::SocketAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Receives raw message payloads from a subscription.
///
/// Runs on a tokio worker, never on the thread that subscribed.
pub trait MessageHandler: Send + Sync + 'static {
    fn on_message(&self, payload: Vec<u8>);
}

impl<F> MessageHandler for F
where
    F: Fn(Vec<u8>) + Send + Sync + 'static,
{
    fn on_message(&self, payload: Vec<u8>) {
        self(payload)
    }
}

type SharedHandler = Arc<RwLock<Arc<dyn MessageHandler>>>;

/// Handle to a running subscriber. Dropping disposes it.
pub struct Subscription {
    channel: String,
    addr: SocketAddr,
    endpoint_path: PathBuf,
    handler: SharedHandler,
    active: Arc<AtomicBool>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    conn_shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("addr", &self.addr)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl Subscription {
    /// Bind the listener, publish the endpoint record, and start delivering.
    pub(crate) async fn start(
        channel: &str,
        endpoint_path: PathBuf,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Self> {
        let create_failed = |message: String, source: Option<std::io::Error>| {
            RelayError::ChannelCreateFailed {
                channel: channel.to_string(),
                message,
                source,
            }
        };

        let listener = TcpListener::bind(ChannelConfig::BIND_ADDR)
            .await
            .map_err(|e| create_failed("failed to bind listener".to_string(), Some(e)))?;
        let addr = listener
            .local_addr()
            .map_err(|e| create_failed("failed to read listener address".to_string(), Some(e)))?;

        endpoint::write_record(&endpoint_path, &EndpointRecord::new(channel, addr.port()))
            .map_err(|e| create_failed(format!("failed to write endpoint record: {}", e), None))?;

        info!("Channel {} listening on {}", channel, addr);

        let handler: SharedHandler = Arc::new(RwLock::new(handler));
        let active = Arc::new(AtomicBool::new(true));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (conn_shutdown_tx, conn_shutdown_rx) = watch::channel(false);
        let (queue_tx, queue_rx) = mpsc::channel(ChannelConfig::DISPATCH_QUEUE_CAPACITY);

        let dispatcher = tokio::spawn(Self::dispatch_loop(
            queue_rx,
            handler.clone(),
            active.clone(),
        ));
        let acceptor = tokio::spawn(Self::accept_loop(
            listener,
            channel.to_string(),
            queue_tx,
            shutdown_rx,
            conn_shutdown_rx,
            Arc::new(AtomicUsize::new(0)),
        ));

        Ok(Self {
            channel: channel.to_string(),
            addr,
            endpoint_path,
            handler,
            active,
            shutdown_tx: Some(shutdown_tx),
            conn_shutdown_tx,
            tasks: vec![acceptor, dispatcher],
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Get the address the subscriber is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Replace the message handler. There is only ever one.
    pub fn set_handler(&self, handler: impl MessageHandler) {
        let mut slot = self
            .handler
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Arc::new(handler);
    }

    /// Stop delivering and release the listener and endpoint record.
    ///
    /// Calling this more than once is a no-op.
    pub fn dispose(&mut self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.conn_shutdown_tx.send(true);
        for task in self.tasks.drain(..) {
            task.abort();
        }

        endpoint::remove_record_if_owned(&self.endpoint_path, self.addr.port());
        info!("Channel {} closed", self.channel);
    }

    async fn dispatch_loop(
        mut queue_rx: mpsc::Receiver<Vec<u8>>,
        handler: SharedHandler,
        active: Arc<AtomicBool>,
    ) {
        while let Some(payload) = queue_rx.recv().await {
            if !active.load(Ordering::SeqCst) {
                break;
            }
            let current = handler
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone();
            // A panicking handler loses its own message, never later ones
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| current.on_message(payload))) {
                error!("Message handler panicked: {}", panic_message(&*panic));
            }
        }
    }

    async fn accept_loop(
        listener: TcpListener,
        channel: String,
        queue_tx: mpsc::Sender<Vec<u8>>,
        mut shutdown_rx: oneshot::Receiver<()>,
        conn_shutdown_rx: watch::Receiver<bool>,
        active_connections: Arc<AtomicUsize>,
    ) {
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    debug!("Channel {} accept loop stopping", channel);
                    break;
                }
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            let current = active_connections.load(Ordering::Relaxed);
                            if current >= ChannelConfig::MAX_CONNECTIONS {
                                warn!(
                                    "Rejecting channel connection from {}: at max capacity ({})",
                                    peer_addr,
                                    ChannelConfig::MAX_CONNECTIONS
                                );
                                continue;
                            }

                            active_connections.fetch_add(1, Ordering::Relaxed);
                            let channel = channel.clone();
                            let queue_tx = queue_tx.clone();
                            let conns = active_connections.clone();
                            let mut conn_shutdown = conn_shutdown_rx.clone();

                            tokio::spawn(async move {
                                debug!("Channel connection from {}", peer_addr);
                                if let Err(e) = Self::handle_connection(stream, &channel, &queue_tx, &mut conn_shutdown).await {
                                    debug!("Channel connection {} ended: {}", peer_addr, e);
                                }
                                conns.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            error!("Channel accept error: {}", e);
                        }
                    }
                }
            }
        }
    }

    async fn handle_connection(
        mut stream: TcpStream,
        channel: &str,
        queue_tx: &mpsc::Sender<Vec<u8>>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let (mut reader, mut writer) = stream.split();

        // Nothing is sent, and nothing queued, until the peer names the channel.
        let hello = tokio::time::timeout(ChannelConfig::HANDSHAKE_TIMEOUT, read_frame(&mut reader))
            .await
            .map_err(|_| RelayError::Validation {
                field: "hello".to_string(),
                message: "peer did not name the channel in time".to_string(),
            })?;
        let accepted = match hello? {
            Some(frame) => serde_json::from_slice::<Hello>(&frame)
                .map(|hello| hello.channel == channel)
                .unwrap_or(false),
            None => return Ok(()),
        };
        if !accepted {
            warn!("Rejected a connection that did not name channel {}", channel);
            return Err(RelayError::Validation {
                field: "hello".to_string(),
                message: "peer did not name this channel".to_string(),
            });
        }
        write_frame(&mut writer, &[]).await?;

        loop {
            let frame = tokio::select! {
                result = read_frame(&mut reader) => {
                    match result? {
                        Some(f) => f,
                        None => return Ok(()), // Clean disconnect
                    }
                }
                _ = shutdown_rx.changed() => {
                    return Ok(());
                }
            };

            queue_tx
                .send(frame)
                .await
                .map_err(|_| RelayError::Other("Channel dispatcher stopped".to_string()))?;

            write_frame(&mut writer, &[]).await?;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}
