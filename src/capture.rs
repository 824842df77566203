//! This module contains all the capture logic
//!
//! The capture worker does one thing: pull frames off the NIC as fast as it
//! can, hand each one to the realtime handler and then to the cache. Anything
//! heavier belongs on the other side of a [`frame_channel`].

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{bounded, Receiver};
use tracing::{debug, error, info, trace, warn};

use crate::{
    cache::{packet_ceiling, AppendOutcome, CacheSnapshot, CacheStats, CaptureCache},
    error::{CaptureError, Error, Result},
    lock, NOMINAL_FRAME_BYTES, PACKET_FLOOR,
};

/// Called on the worker thread with every received frame
pub type FrameCallback = Box<dyn FnMut(&[u8]) + Send + 'static>;

/// Called once at stop with the drained cache
pub type CompletionCallback = Box<dyn FnOnce(CacheSnapshot) + Send + 'static>;

/// A live link-layer capture handle
///
/// Dropping the handle closes it, which also releases promiscuous reception.
pub trait LinkSource: Send {
    /// Wait for the next frame; `Ok(None)` when the read timed out
    fn next_frame(&mut self) -> std::result::Result<Option<&[u8]>, CaptureError>;
}

/// Opens [`LinkSource`]s on named interfaces
pub trait LinkOpener: Send + Sync {
    fn open(
        &self,
        interface: &str,
        config: &EngineConfig,
    ) -> std::result::Result<Box<dyn LinkSource>, CaptureError>;
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on one blocking receive, and so on stop latency
    pub read_timeout: Duration,
    /// Back-off after an empty or failed read
    pub idle_backoff: Duration,
    pub snaplen: i32,
    /// Kernel buffer size requested from libpcap
    pub kernel_buffer_bytes: i32,
    pub promiscuous: bool,
    /// Frame size used to derive a cache's packet ceiling
    pub nominal_frame_bytes: usize,
    /// Minimum packet ceiling regardless of cache size
    pub packet_floor: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(100),
            idle_backoff: Duration::from_millis(1),
            snaplen: 65535,
            kernel_buffer_bytes: 16 * 1024 * 1024,
            promiscuous: true,
            nominal_frame_bytes: NOMINAL_FRAME_BYTES,
            packet_floor: PACKET_FLOOR,
        }
    }
}

/// Opens captures through libpcap
#[derive(Debug, Default, Clone, Copy)]
pub struct PcapOpener;

struct PcapSource {
    cap: pcap::Capture<pcap::Active>,
}

impl LinkOpener for PcapOpener {
    fn open(
        &self,
        interface: &str,
        config: &EngineConfig,
    ) -> std::result::Result<Box<dyn LinkSource>, CaptureError> {
        let timeout_ms = i32::try_from(config.read_timeout.as_millis()).unwrap_or(i32::MAX);
        let cap = pcap::Capture::from_device(interface)?
            .promisc(config.promiscuous)
            .snaplen(config.snaplen)
            .buffer_size(config.kernel_buffer_bytes)
            .timeout(timeout_ms.max(1))
            .open()?;
        debug!(interface, timeout_ms, "Opened pcap capture");
        Ok(Box::new(PcapSource { cap }))
    }
}

impl LinkSource for PcapSource {
    fn next_frame(&mut self) -> std::result::Result<Option<&[u8]>, CaptureError> {
        match self.cap.next_packet() {
            Ok(packet) => Ok(Some(packet.data)),
            Err(pcap::Error::TimeoutExpired) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The worker was joined; `delivered` says whether the completion handler ran
    Stopped { delivered: bool },
    NotRunning,
}

/// The cache shared between the worker and the engine's callers
#[derive(Default)]
struct CacheSlot {
    live: Option<CaptureCache>,
    /// Final stats of the last cache that was drained
    retired: CacheStats,
}

struct CaptureSession {
    interface: String,
    running: Arc<AtomicBool>,
    worker: JoinHandle<WorkerExit>,
    completion: Option<CompletionCallback>,
    started_at: Instant,
}

struct Worker {
    source: Box<dyn LinkSource>,
    running: Arc<AtomicBool>,
    realtime: Option<FrameCallback>,
    cache: Option<Arc<Mutex<CacheSlot>>>,
    idle_backoff: Duration,
}

struct WorkerExit {
    source: Box<dyn LinkSource>,
    frames: u64,
    read_errors: u64,
}

impl Worker {
    fn run(mut self) -> WorkerExit {
        let mut frames = 0u64;
        let mut read_errors = 0u64;
        while self.running.load(Ordering::Acquire) {
            match self.source.next_frame() {
                Ok(Some(frame)) if !frame.is_empty() => {
                    frames += 1;
                    if let Some(handler) = self.realtime.as_mut() {
                        handler(frame);
                    }
                    if let Some(slot) = &self.cache {
                        if let Some(cache) = lock(slot).live.as_mut() {
                            if let AppendOutcome::Dropped(reason) = cache.append(frame) {
                                trace!(?reason, len = frame.len(), "Cache full, frame dropped");
                            }
                        }
                    }
                }
                Ok(_) => thread::sleep(self.idle_backoff),
                Err(e) => {
                    read_errors += 1;
                    debug!("Receive failed: {}", e);
                    thread::sleep(self.idle_backoff);
                }
            }
        }
        WorkerExit {
            source: self.source,
            frames,
            read_errors,
        }
    }
}

/// Owns at most one running capture and its optional cache
pub struct PacketCaptureEngine<O: LinkOpener = PcapOpener> {
    opener: O,
    config: EngineConfig,
    /// Serializes start and stop; `session` itself is only locked briefly
    lifecycle: Mutex<()>,
    session: Mutex<Option<CaptureSession>>,
    cache: Arc<Mutex<CacheSlot>>,
}

impl PacketCaptureEngine<PcapOpener> {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_opener(PcapOpener, config)
    }
}

impl<O: LinkOpener> PacketCaptureEngine<O> {
    pub fn with_opener(opener: O, config: EngineConfig) -> Self {
        Self {
            opener,
            config,
            lifecycle: Mutex::new(()),
            session: Mutex::new(None),
            cache: Arc::new(Mutex::new(CacheSlot::default())),
        }
    }

    pub fn opener(&self) -> &O {
        &self.opener
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start capturing on `interface`, forwarding frames to `realtime`
    pub fn start(&self, interface: &str, realtime: Option<FrameCallback>) -> Result<StartOutcome> {
        self.launch(interface, realtime, None)
    }

    /// Like [`start`](Self::start), also keeping every frame in a cache of
    /// `capacity_bytes` that is handed to `completion` on stop
    pub fn start_with_cache(
        &self,
        interface: &str,
        realtime: Option<FrameCallback>,
        completion: CompletionCallback,
        capacity_bytes: usize,
    ) -> Result<StartOutcome> {
        self.launch(interface, realtime, Some((completion, capacity_bytes)))
    }

    fn launch(
        &self,
        interface: &str,
        realtime: Option<FrameCallback>,
        cache: Option<(CompletionCallback, usize)>,
    ) -> Result<StartOutcome> {
        // Held for the whole start so two callers can't both spawn a worker
        let _lifecycle = lock(&self.lifecycle);
        if let Some(running) = self.interface() {
            if running != interface {
                warn!(
                    %running,
                    requested = interface,
                    "Capture already running on another interface"
                );
            }
            return Ok(StartOutcome::AlreadyRunning);
        }
        let failed = |source| Error::EngineStart {
            interface: interface.to_owned(),
            source,
        };

        // Allocate before opening anything so a failure leaves nothing behind
        let completion = match cache {
            Some((completion, capacity)) => {
                let ceiling = packet_ceiling(
                    capacity,
                    self.config.nominal_frame_bytes,
                    self.config.packet_floor,
                );
                let cache = CaptureCache::new(capacity, ceiling).map_err(failed)?;
                debug!(capacity, ceiling, "Allocated capture cache");
                lock(&self.cache).live = Some(cache);
                Some(completion)
            }
            None => None,
        };
        let caching = completion.is_some();

        let source = match self.opener.open(interface, &self.config) {
            Ok(source) => source,
            Err(e) => {
                self.discard_cache(caching);
                return Err(failed(e));
            }
        };

        let running = Arc::new(AtomicBool::new(true));
        let worker = Worker {
            source,
            running: running.clone(),
            realtime,
            cache: caching.then(|| self.cache.clone()),
            idle_backoff: self.config.idle_backoff,
        };
        // If the spawn fails the closure, and the source inside it, is dropped
        let spawned = thread::Builder::new()
            .name(format!("cap-{interface}"))
            .spawn(move || worker.run());
        let worker = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.discard_cache(caching);
                return Err(failed(CaptureError::Spawn(e)));
            }
        };

        info!(interface, caching, "Capture started");
        *lock(&self.session) = Some(CaptureSession {
            interface: interface.to_owned(),
            running,
            worker,
            completion,
            started_at: Instant::now(),
        });
        Ok(StartOutcome::Started)
    }

    fn discard_cache(&self, caching: bool) {
        if caching {
            lock(&self.cache).live = None;
        }
    }

    /// Stop the capture, join the worker, close the link and flush the cache
    ///
    /// The completion handler runs on the calling thread once the engine
    /// already reports idle. It may query the engine but must not call back
    /// into `start` or `stop`.
    pub fn stop(&self, interface: &str) -> StopOutcome {
        let _lifecycle = lock(&self.lifecycle);
        let Some(active) = lock(&self.session).take() else {
            return StopOutcome::NotRunning;
        };
        if active.interface != interface {
            warn!(
                running = %active.interface,
                requested = interface,
                "Stopping capture started on a different interface"
            );
        }

        active.running.store(false, Ordering::Release);
        match active.worker.join() {
            Ok(exit) => {
                // Closing the handle drops promiscuous reception
                drop(exit.source);
                info!(
                    interface = %active.interface,
                    frames = exit.frames,
                    read_errors = exit.read_errors,
                    elapsed = ?active.started_at.elapsed(),
                    "Capture stopped"
                );
            }
            Err(_) => error!(interface = %active.interface, "Capture worker panicked"),
        }

        let snapshot = {
            let mut slot = lock(&self.cache);
            match slot.live.take() {
                Some(mut cache) => {
                    slot.retired = cache.stats();
                    Some(cache.drain())
                }
                None => None,
            }
        };
        let delivered = match (active.completion, snapshot) {
            (Some(complete), Some(snapshot)) if snapshot.total_packets() > 0 => {
                debug!(
                    packets = snapshot.total_packets(),
                    bytes = snapshot.total_bytes(),
                    "Delivering capture cache"
                );
                complete(snapshot);
                true
            }
            _ => false,
        };
        StopOutcome::Stopped { delivered }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.session).is_some()
    }

    /// Interface of the running capture, if any
    pub fn interface(&self) -> Option<String> {
        lock(&self.session).as_ref().map(|s| s.interface.clone())
    }

    /// Stats of the live cache, or of the last one drained
    pub fn cache_stats(&self) -> CacheStats {
        let slot = lock(&self.cache);
        slot.live
            .as_ref()
            .map(CaptureCache::stats)
            .unwrap_or(slot.retired)
    }

    /// Reset the cache counters; a running worker keeps appending afterwards
    pub fn clear_cache(&self) {
        let mut slot = lock(&self.cache);
        if let Some(cache) = slot.live.as_mut() {
            cache.clear();
        }
        slot.retired = CacheStats::default();
    }
}

impl<O: LinkOpener> Drop for PacketCaptureEngine<O> {
    fn drop(&mut self) {
        if let Some(interface) = self.interface() {
            self.stop(&interface);
        }
    }
}

/// A realtime handler that forwards owned copies of each frame to a bounded channel
///
/// Frames arrive in capture order; when the receiver falls behind by `bound`
/// frames, new ones are dropped rather than blocking the capture worker.
pub fn frame_channel(bound: usize) -> (FrameCallback, Receiver<Vec<u8>>) {
    let (tx, rx) = bounded(bound);
    let handler = Box::new(move |frame: &[u8]| {
        if tx.try_send(frame.to_vec()).is_err() {
            trace!("Frame channel full, dropping frame");
        }
    });
    (handler, rx)
}
