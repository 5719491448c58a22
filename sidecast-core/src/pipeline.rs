//! Ingress pipeline: UDP socket → queue → single consumer.
//!
//! ```text
//!   UdpSocket ──recv──▶ producer task ──mpsc (unbounded)──▶ consumer
//!                                                            │
//!                              Reassembler (dedup, buffer, FEC)
//!                                   │                │
//!                              FrameSink        ControlSink
//! ```
//!
//! The producer copies each datagram out of its receive buffer and
//! queues it without looking at it, so slow frame handling never backs
//! up the socket. The consumer owns all reassembly state and runs the
//! sinks inline. Stopping the pipeline ends the producer; the consumer
//! drains whatever is still queued and then returns the final stats.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::CastError;
use crate::fec::RepairSizing;
use crate::reassembler::{Event, Reassembler};
use crate::sink::{ControlSink, FrameSink};
use crate::stats::ReceiverStats;

// ── Constants ────────────────────────────────────────────────────

/// Port the host streams to.
pub const DEFAULT_PORT: u16 = 5004;

/// Largest datagram the host sends, header included.
pub const MAX_DATAGRAM_SIZE: usize = 1500;

/// How long a receive waits before the producer re-checks for shutdown.
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Requested kernel receive buffer size.
pub const DEFAULT_RECV_BUFFER: usize = 1024 * 1024;

// ── PipelineConfig ───────────────────────────────────────────────

/// Socket and reassembly settings for an [`IngressPipeline`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub bind_addr: SocketAddr,
    /// Receive buffer length; longer datagrams are truncated by the OS.
    pub max_datagram_size: usize,
    pub recv_timeout: Duration,
    /// `SO_RCVBUF` request. The OS may grant less.
    pub recv_buffer_size: usize,
    pub reuse_address: bool,
    pub repair_sizing: RepairSizing,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            max_datagram_size: MAX_DATAGRAM_SIZE,
            recv_timeout: DEFAULT_RECV_TIMEOUT,
            recv_buffer_size: DEFAULT_RECV_BUFFER,
            reuse_address: true,
            repair_sizing: RepairSizing::default(),
        }
    }
}

// ── Datagram ─────────────────────────────────────────────────────

/// One received datagram as queued for the consumer.
#[derive(Debug, Clone)]
pub struct Datagram {
    pub data: Bytes,
    pub source: SocketAddr,
}

// ── ShutdownHandle ───────────────────────────────────────────────

/// Cloneable stop signal for a running pipeline.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Ask the producer to stop. Already-queued datagrams are still processed.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

// ── IngressPipeline ──────────────────────────────────────────────

/// Owns the receive socket until [`run`](Self::run) consumes it.
pub struct IngressPipeline {
    socket: UdpSocket,
    config: PipelineConfig,
    shutdown_tx: Arc<watch::Sender<bool>>,
    stats_tx: watch::Sender<ReceiverStats>,
    stats_rx: watch::Receiver<ReceiverStats>,
}

impl IngressPipeline {
    /// Bind a socket according to `config`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bind(config: PipelineConfig) -> Result<Self, CastError> {
        let socket = UdpSocket::from_std(create_recv_socket(&config)?)?;
        info!(addr = %socket.local_addr()?, "receiver socket bound");
        Ok(Self::from_socket(socket, config))
    }

    /// Wrap an already-bound socket. `config.bind_addr` and the socket
    /// options in `config` are ignored.
    pub fn from_socket(socket: UdpSocket, config: PipelineConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let (stats_tx, stats_rx) = watch::channel(ReceiverStats::default());
        Self {
            socket,
            config,
            shutdown_tx: Arc::new(shutdown_tx),
            stats_tx,
            stats_rx,
        }
    }

    /// Address the socket actually bound to (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, CastError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Obtain a `watch::Receiver` that always holds the latest counters.
    pub fn stats_receiver(&self) -> watch::Receiver<ReceiverStats> {
        self.stats_rx.clone()
    }

    /// A cloneable stop handle.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Run until stopped, returning the final counters.
    ///
    /// Receive errors never end the pipeline: the producer logs them,
    /// backs off briefly and keeps reading.
    pub async fn run<F, C>(self, frames: F, control: C) -> Result<ReceiverStats, CastError>
    where
        F: FrameSink,
        C: ControlSink,
    {
        let Self {
            socket,
            config,
            shutdown_tx,
            stats_tx,
            ..
        } = self;

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let producer = tokio::spawn(produce(
            socket,
            config.max_datagram_size,
            config.recv_timeout,
            queue_tx,
            shutdown_tx.subscribe(),
        ));

        let reassembler = Reassembler::with_repair_sizing(config.repair_sizing);
        let stats = consume(reassembler, queue_rx, frames, control, &stats_tx).await;
        info!(%stats, "receiver stopped");

        let received = producer
            .await
            .map_err(|e| CastError::Other(format!("producer task failed: {e}")))?;
        debug!(received, "producer joined");
        Ok(stats)
    }

    /// Spawn [`run`](Self::run) onto the runtime.
    pub fn spawn<F, C>(self, frames: F, control: C) -> JoinHandle<Result<ReceiverStats, CastError>>
    where
        F: FrameSink,
        C: ControlSink,
    {
        tokio::spawn(self.run(frames, control))
    }
}

// ── Producer ─────────────────────────────────────────────────────

/// Pause after a receive error that is not simply a timeout.
pub const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// How the producer reacts to a failed receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecvErrorAction {
    /// Receive again straight away.
    Retry,
    /// Log, wait [`RECV_ERROR_BACKOFF`], then receive again.
    Backoff,
}

async fn produce(
    socket: UdpSocket,
    max_datagram_size: usize,
    recv_timeout: Duration,
    queue: mpsc::UnboundedSender<Datagram>,
    mut shutdown: watch::Receiver<bool>,
) -> u64 {
    let mut buf = vec![0u8; max_datagram_size];
    let mut received: u64 = 0;

    loop {
        if *shutdown.borrow_and_update() {
            break;
        }

        let failed = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                None
            }
            result = tokio::time::timeout(recv_timeout, socket.recv_from(&mut buf)) => match result {
                Err(_) => {
                    trace!("receive timed out");
                    None
                }
                Ok(Ok((len, source))) => {
                    received += 1;
                    let datagram = Datagram {
                        data: Bytes::copy_from_slice(&buf[..len]),
                        source,
                    };
                    if queue.send(datagram).is_err() {
                        break;
                    }
                    None
                }
                Ok(Err(e)) => Some(e),
            }
        };

        let Some(e) = failed else { continue };
        match recv_error_action(&e) {
            RecvErrorAction::Retry => debug!(error = %e, "transient receive error"),
            RecvErrorAction::Backoff => {
                warn!(error = %e, "receive failed, retrying");
                if backoff(&mut shutdown).await {
                    break;
                }
            }
        }
    }

    received
}

/// Errors a UDP receive can report without anything being wrong with
/// the socket.
///
/// Windows surfaces ICMP port-unreachable from an earlier send as
/// `ConnectionReset` on the next receive.
fn recv_error_action(e: &io::Error) -> RecvErrorAction {
    match e.kind() {
        io::ErrorKind::WouldBlock
        | io::ErrorKind::TimedOut
        | io::ErrorKind::Interrupted
        | io::ErrorKind::ConnectionReset => RecvErrorAction::Retry,
        _ => RecvErrorAction::Backoff,
    }
}

/// Sleep for [`RECV_ERROR_BACKOFF`]. Returns `true` if a stop arrived first.
async fn backoff(shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
        _ = tokio::time::sleep(RECV_ERROR_BACKOFF) => false,
    }
}

// ── Consumer ─────────────────────────────────────────────────────

async fn consume<F, C>(
    mut reassembler: Reassembler,
    mut queue: mpsc::UnboundedReceiver<Datagram>,
    mut frames: F,
    mut control: C,
    stats_tx: &watch::Sender<ReceiverStats>,
) -> ReceiverStats
where
    F: FrameSink,
    C: ControlSink,
{
    while let Some(Datagram { data, source }) = queue.recv().await {
        match reassembler.process(&data) {
            Event::Control(message) => control.apply(message, source),
            Event::Buffered {
                keyframe,
                ready: Some(frame),
                ..
            } => {
                let frame_id = frame.frame_id;
                if let Err(e) = frames.decode(frame.data, keyframe) {
                    warn!(frame_id, error = %e, "decoder rejected frame");
                    reassembler.record_decoder_error();
                }
            }
            Event::Buffered { ready: None, .. } | Event::Dropped(_) => {}
        }
        stats_tx.send_replace(reassembler.stats().clone());
    }

    reassembler.stats().clone()
}

// ── Socket setup ─────────────────────────────────────────────────

/// Create a non-blocking UDP socket with the configured options.
fn create_recv_socket(config: &PipelineConfig) -> io::Result<std::net::UdpSocket> {
    use socket2::{Domain, Protocol, Socket, Type};

    let socket = Socket::new(
        Domain::for_address(config.bind_addr),
        Type::DGRAM,
        Some(Protocol::UDP),
    )?;
    if config.reuse_address {
        socket.set_reuse_address(true)?;
    }
    if let Err(e) = socket.set_recv_buffer_size(config.recv_buffer_size) {
        warn!(error = %e, size = config.recv_buffer_size, "could not set receive buffer size");
    }
    socket.set_nonblocking(true)?;
    socket.bind(&config.bind_addr.into())?;

    Ok(socket.into())
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlMessage;
    use crate::packetizer::{Packetizer, send_datagrams};

    fn loopback_config() -> PipelineConfig {
        PipelineConfig {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            recv_timeout: Duration::from_millis(50),
            ..Default::default()
        }
    }

    #[test]
    fn default_config_matches_host() {
        let config = PipelineConfig::default();
        assert_eq!(config.bind_addr.port(), 5004);
        assert_eq!(config.max_datagram_size, 1500);
        assert_eq!(config.recv_timeout, Duration::from_secs(5));
        assert!(config.reuse_address);
    }

    #[test]
    fn transient_errors_retry_at_once() {
        for kind in [io::ErrorKind::WouldBlock, io::ErrorKind::ConnectionReset] {
            assert_eq!(recv_error_action(&io::Error::from(kind)), RecvErrorAction::Retry);
        }
    }

    #[test]
    fn other_errors_back_off_and_keep_reading() {
        for kind in [io::ErrorKind::PermissionDenied, io::ErrorKind::Other] {
            assert_eq!(recv_error_action(&io::Error::from(kind)), RecvErrorAction::Backoff);
        }
    }

    #[tokio::test]
    async fn backoff_elapses_without_stop() {
        let (_tx, mut rx) = watch::channel(false);
        let started = tokio::time::Instant::now();
        assert!(!backoff(&mut rx).await);
        assert!(started.elapsed() >= RECV_ERROR_BACKOFF);
    }

    #[tokio::test]
    async fn stop_interrupts_backoff() {
        let (tx, mut rx) = watch::channel(false);
        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            tx.send_replace(true);
            tx
        });
        let stopped = tokio::time::timeout(RECV_ERROR_BACKOFF / 2, backoff(&mut rx))
            .await
            .unwrap();
        assert!(stopped);
        drop(stopper.await.unwrap());
    }

    #[tokio::test]
    async fn stop_before_traffic_returns_empty_stats() {
        let pipeline = IngressPipeline::bind(loopback_config()).unwrap();
        let shutdown = pipeline.shutdown_handle();
        let handle = pipeline.spawn(
            |_: Bytes, _: bool| -> Result<(), CastError> { Ok(()) },
            |_: ControlMessage, _: SocketAddr| {},
        );

        shutdown.stop();
        assert!(shutdown.is_stopped());
        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats, ReceiverStats::default());
    }

    #[tokio::test]
    async fn decoder_errors_are_counted_not_fatal() {
        let pipeline = IngressPipeline::bind(loopback_config()).unwrap();
        let addr = pipeline.local_addr().unwrap();
        let shutdown = pipeline.shutdown_handle();
        let mut stats_rx = pipeline.stats_receiver();
        let handle = pipeline.spawn(
            |_: Bytes, _: bool| -> Result<(), CastError> { Err(CastError::Decoder("codec busy".into())) },
            |_: ControlMessage, _: SocketAddr| {},
        );

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut packetizer = Packetizer::new();
        for _ in 0..2 {
            let datagrams = packetizer.packetize(b"frame", false).unwrap();
            send_datagrams(&sender, addr, &datagrams).await.unwrap();
        }

        stats_rx
            .wait_for(|s| s.decoder_errors == 2)
            .await
            .unwrap();
        shutdown.stop();
        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.frames_delivered, 2);
        assert_eq!(stats.decoder_errors, 2);
    }
}
