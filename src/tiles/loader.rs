use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use fxhash::FxHashSet;
use log::{debug, error, warn};

use crate::core::config::FetchConfig;
use crate::core::constants::SHUTDOWN_GRACE;
use crate::core::geo::TileCoord;
use crate::tiles::cache::CacheSlot;
use crate::tiles::source::TileSource;
use crate::tiles::tile::Tile;
use crate::Result;

/// Notification sent when a background fetch settles
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileEvent {
    /// A fresh tile is in the cache; the host should redraw
    Loaded(TileCoord),
    /// The download or decode failed; the tile stays absent
    Failed { coord: TileCoord, error: String },
}

#[derive(Debug, Default)]
struct FetchQueue {
    pending: VecDeque<TileCoord>,
    /// Keys of `pending`
    queued: FxHashSet<u64>,
    in_flight: FxHashSet<u64>,
}

struct Shared {
    queue: Mutex<FetchQueue>,
    available: Condvar,
    shutdown: AtomicBool,
    dispatched: AtomicU64,
    source: Arc<dyn TileSource>,
    slot: CacheSlot,
    events: Sender<TileEvent>,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, FetchQueue> {
        match self.queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn emit(&self, event: TileEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => debug!("Event queue full, dropping {:?}", event),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Blocks until there is work or the pipeline stops
    fn next_job(&self) -> Option<TileCoord> {
        let mut queue = self.queue();
        loop {
            if self.is_shutdown() {
                return None;
            }
            if let Some(coord) = queue.pending.pop_front() {
                let key = coord.key();
                queue.queued.remove(&key);
                queue.in_flight.insert(key);
                self.dispatched.fetch_add(1, Ordering::Relaxed);
                return Some(coord);
            }
            queue = match self.available.wait(queue) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    fn fetch(&self, coord: TileCoord) -> Result<bool> {
        let data = self.source.download(coord)?;
        if self.is_shutdown() {
            debug!("Discarding tile {:?} downloaded after shutdown", coord);
            return Ok(false);
        }

        let tile = Tile::decode(coord, &data)?;
        if let Err(e) = self.source.store(coord, &data) {
            error!("Failed to persist tile {:?}: {}", coord, e);
        }
        self.slot.current().put(tile);
        Ok(true)
    }

    fn run_worker(&self) {
        while let Some(coord) = self.next_job() {
            let result = self.fetch(coord);
            self.queue().in_flight.remove(&coord.key());

            if self.is_shutdown() {
                continue;
            }
            match result {
                Ok(true) => self.emit(TileEvent::Loaded(coord)),
                Ok(false) => {}
                Err(e) => {
                    warn!("Failed to fetch tile {:?}: {}", coord, e);
                    self.emit(TileEvent::Failed {
                        coord,
                        error: e.to_string(),
                    });
                }
            }
        }
    }
}

/// Worker pool that resolves cache misses of a remote source in the
/// background.
///
/// Requests are deduplicated against both the pending queue and the
/// downloads in flight, so one address is never fetched twice at once.
pub struct FetchPipeline {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    events: Receiver<TileEvent>,
}

impl FetchPipeline {
    /// Starts `source.worker_count()` workers, capped by `config.max_workers`
    pub fn new(source: Arc<dyn TileSource>, slot: CacheSlot, config: &FetchConfig) -> Self {
        let (events_tx, events_rx) = bounded(config.event_capacity.max(1));
        let worker_count = source.worker_count().min(config.max_workers);
        let name = source.name();

        let shared = Arc::new(Shared {
            queue: Mutex::new(FetchQueue::default()),
            available: Condvar::new(),
            shutdown: AtomicBool::new(false),
            dispatched: AtomicU64::new(0),
            source,
            slot,
            events: events_tx,
        });

        let workers = (0..worker_count)
            .filter_map(|i| {
                let shared = Arc::clone(&shared);
                thread::Builder::new()
                    .name(format!("tile-fetch-{}", i))
                    .spawn(move || shared.run_worker())
                    .map_err(|e| error!("Failed to spawn fetch worker {}: {}", i, e))
                    .ok()
            })
            .collect::<Vec<_>>();

        debug!("Started {} fetch workers for {}", workers.len(), name);

        Self {
            shared,
            workers: Mutex::new(workers),
            events: events_rx,
        }
    }

    /// Queues a download. Returns `false` when the address is already
    /// pending or in flight, or the pipeline has stopped.
    pub fn request(&self, coord: TileCoord) -> bool {
        if self.shared.is_shutdown() {
            return false;
        }
        let key = coord.key();
        {
            let mut queue = self.shared.queue();
            if queue.queued.contains(&key) || queue.in_flight.contains(&key) {
                return false;
            }
            queue.queued.insert(key);
            queue.pending.push_back(coord);
        }
        self.shared.available.notify_one();
        true
    }

    /// Drops every pending request; downloads already running complete
    pub fn reset(&self) {
        let mut queue = self.shared.queue();
        let dropped = queue.pending.len();
        queue.pending.clear();
        queue.queued.clear();
        if dropped > 0 {
            debug!("Fetch queue reset, {} requests dropped", dropped);
        }
    }

    /// Stops the workers without waiting on the network.
    ///
    /// Idle workers are joined; a worker still inside a download after a
    /// short grace period is detached and its result is discarded.
    pub fn shutdown(&self) {
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        self.reset();
        self.shared.available.notify_all();

        let workers = match self.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        let mut detached = 0;
        for worker in workers {
            while !worker.is_finished() && Instant::now() < deadline {
                thread::sleep(SHUTDOWN_GRACE / 10);
            }
            if !worker.is_finished() {
                detached += 1;
                continue;
            }
            if worker.join().is_err() {
                error!("Fetch worker panicked");
            }
        }
        debug!("Fetch pipeline stopped, {} workers left to finish downloads", detached);
    }

    pub fn is_running(&self) -> bool {
        !self.shared.is_shutdown()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.queue().pending.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.shared.queue().in_flight.len()
    }

    /// Downloads started since the pipeline was created
    pub fn dispatched_count(&self) -> u64 {
        self.shared.dispatched.load(Ordering::Relaxed)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.lock().map(|w| w.len()).unwrap_or(0)
    }

    /// Tile arrival notifications
    pub fn events(&self) -> Receiver<TileEvent> {
        self.events.clone()
    }
}

impl Drop for FetchPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}
