//! TileCache - Owner-thread tile map with bounded background fetches
//!
//! The cache map is only touched by the thread that owns the cache. Background fetch tasks
//! share nothing with it except the [`FetchInbox`], which the owner drains once per frame.

use crate::{ColoredSegment, Config, TileError, TileFetcher, TileKey, mvt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Extra time granted to in-flight fetches at teardown beyond the request timeout
const JOIN_GRACE: Duration = Duration::from_millis(500);

/// Poll interval while waiting for in-flight fetches at teardown
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Lifecycle of a tile in the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    /// Never requested, or evicted. Never stored in the map.
    Empty,
    Fetching,
    Ready,
    Failed,
}

/// A cached tile
#[derive(Debug, Clone)]
pub struct TileEntry {
    state: TileState,
    lines: Vec<ColoredSegment>,
    last_used_frame: u64,
}

impl TileEntry {
    fn fetching(frame: u64) -> Self {
        Self {
            state: TileState::Fetching,
            lines: Vec::new(),
            last_used_frame: frame,
        }
    }

    #[inline]
    pub fn state(&self) -> TileState {
        self.state
    }

    /// Decoded segments, empty unless the tile is ready
    #[inline]
    pub fn lines(&self) -> &[ColoredSegment] {
        &self.lines
    }

    /// Frame of the last request for this tile
    #[inline]
    pub fn last_used_frame(&self) -> u64 {
        self.last_used_frame
    }
}

/// Outcome of one background fetch
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub key: TileKey,
    pub lines: Vec<ColoredSegment>,
    pub success: bool,
}

impl FetchResult {
    pub fn success(key: TileKey, lines: Vec<ColoredSegment>) -> Self {
        Self {
            key,
            lines,
            success: true,
        }
    }

    pub fn failure(key: TileKey) -> Self {
        Self {
            key,
            lines: Vec::new(),
            success: false,
        }
    }
}

/// Lock-protected queue of completed fetches, shared by the owner and fetch tasks
#[derive(Debug, Clone, Default)]
pub struct FetchInbox(Arc<Mutex<Vec<FetchResult>>>);

impl FetchInbox {
    fn lock(&self) -> MutexGuard<'_, Vec<FetchResult>> {
        self.0.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
            tracing::warn!("Fetch inbox mutex poisoned; recovering");
            poisoned.into_inner()
        })
    }

    /// Append a result; called by fetch tasks
    pub fn push(&self, result: FetchResult) {
        self.lock().push(result);
    }

    /// Swap out every queued result, holding the lock only for the swap
    pub fn take_all(&self) -> Vec<FetchResult> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Tile map, fetch admission and recency-based eviction.
///
/// `request_tile`, `process_completed_fetches` and `evict_old_tiles` must be called from a
/// single owner thread. None of them blocks on the network.
pub struct TileCache<F: TileFetcher> {
    tiles: HashMap<TileKey, TileEntry>,
    frame: u64,
    inbox: FetchInbox,
    in_flight: Vec<JoinHandle<()>>,
    fetcher: Arc<F>,
    runtime: Handle,
    max_concurrent_fetches: usize,
    request_timeout: Duration,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<F: TileFetcher> TileCache<F> {
    /// Create an empty cache whose fetches are spawned on `runtime`.
    ///
    /// `runtime` must drive its tasks on its own worker threads, e.g. a multi-thread runtime.
    /// The owner thread never polls fetch tasks, and dropping the cache sleeps until they
    /// finish, so with an idle current-thread runtime every drop waits out the full
    /// request timeout.
    pub fn new(fetcher: F, config: &Config, runtime: Handle) -> Self {
        Self {
            tiles: HashMap::new(),
            frame: 0,
            inbox: FetchInbox::default(),
            in_flight: Vec::new(),
            fetcher: Arc::new(fetcher),
            runtime,
            max_concurrent_fetches: config.max_concurrent_fetches,
            request_timeout: config.request_timeout,
        }
    }

    /// Request a tile for this frame.
    ///
    /// Returns the tile's segments if it is ready. Known tiles have their recency bumped
    /// whatever their state. Unknown tiles start a background fetch if fewer than
    /// `max_concurrent_fetches` are in flight, otherwise they are left for a later frame.
    pub fn request_tile(&mut self, key: TileKey) -> Option<&[ColoredSegment]> {
        let frame = self.frame;
        if self.tiles.contains_key(&key) {
            let entry = self.tiles.get_mut(&key)?;
            entry.last_used_frame = frame;
            return (entry.state == TileState::Ready).then_some(entry.lines.as_slice());
        }

        if self.pending_count() < self.max_concurrent_fetches {
            self.dispatch(key);
        }
        None
    }

    /// Start the background fetch for `key`
    fn dispatch(&mut self, key: TileKey) {
        self.in_flight.retain(|handle| !handle.is_finished());
        self.tiles.insert(key, TileEntry::fetching(self.frame));

        tracing::debug!("Fetching tile {}", key);
        let task = fetch_and_decode(
            Arc::clone(&self.fetcher),
            key,
            self.inbox.clone(),
            self.request_timeout,
        );
        self.in_flight.push(self.runtime.spawn(task));
    }

    /// Apply completed fetches and advance the frame counter. Call once per frame.
    pub fn process_completed_fetches(&mut self) {
        #[cfg(feature = "profiling")]
        profiling::scope!("TileCache::process_completed_fetches");

        self.frame += 1;
        let frame = self.frame;

        for result in self.inbox.take_all() {
            let entry = self
                .tiles
                .entry(result.key)
                .or_insert_with(|| TileEntry::fetching(frame));

            if entry.state != TileState::Fetching {
                tracing::debug!("Dropping stale result for tile {}", result.key);
                continue;
            }

            if result.success {
                tracing::debug!("Tile {} ready ({} segments)", result.key, result.lines.len());
                entry.lines = result.lines;
                entry.state = TileState::Ready;
                entry.last_used_frame = frame;
            } else {
                entry.state = TileState::Failed;
            }
        }
    }

    /// Evict the least recently requested ready tiles until at most `max_tiles` remain.
    ///
    /// Fetching and failed tiles are never evicted; keeping failed tiles stops them from
    /// being fetched again every frame.
    pub fn evict_old_tiles(&mut self, max_tiles: usize) {
        #[cfg(feature = "profiling")]
        profiling::scope!("TileCache::evict_old_tiles");

        let mut candidates: Vec<(TileKey, u64)> = self
            .tiles
            .iter()
            .filter(|(_, entry)| entry.state == TileState::Ready)
            .map(|(key, entry)| (*key, entry.last_used_frame))
            .collect();

        if candidates.len() <= max_tiles {
            return;
        }

        candidates.sort_by_key(|&(_, last_used)| last_used);
        let excess = candidates.len() - max_tiles;
        for (key, _) in candidates.into_iter().take(excess) {
            self.tiles.remove(&key);
        }
        tracing::debug!("Evicted {} tiles", excess);
    }

    /// Number of ready tiles
    pub fn cached_count(&self) -> usize {
        self.count_in(TileState::Ready)
    }

    /// Number of tiles being fetched
    pub fn pending_count(&self) -> usize {
        self.count_in(TileState::Fetching)
    }

    /// Number of tiles whose fetch failed
    pub fn failed_count(&self) -> usize {
        self.count_in(TileState::Failed)
    }

    fn count_in(&self, state: TileState) -> usize {
        self.tiles.values().filter(|e| e.state == state).count()
    }

    /// State of a tile, [`TileState::Empty`] if it is not in the cache
    pub fn state(&self, key: &TileKey) -> TileState {
        self.tiles
            .get(key)
            .map_or(TileState::Empty, |entry| entry.state)
    }

    pub fn entry(&self, key: &TileKey) -> Option<&TileEntry> {
        self.tiles.get(key)
    }

    /// Current frame, advanced by every [`Self::process_completed_fetches`] call
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Handle to the completion inbox, e.g. to feed results from another source
    pub fn inbox(&self) -> FetchInbox {
        self.inbox.clone()
    }
}

impl<F: TileFetcher> Drop for TileCache<F> {
    /// Wait for in-flight fetches, bounded by the request timeout
    fn drop(&mut self) {
        let deadline = Instant::now() + self.request_timeout + JOIN_GRACE;
        for handle in self.in_flight.drain(..) {
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(JOIN_POLL_INTERVAL);
            }
            if !handle.is_finished() {
                tracing::warn!("Abandoning unfinished tile fetch at teardown");
                handle.abort();
            }
        }
    }
}

/// Background task body: fetch, decode, post the result, exit
async fn fetch_and_decode<F: TileFetcher>(
    fetcher: Arc<F>,
    key: TileKey,
    inbox: FetchInbox,
    timeout: Duration,
) {
    let result = match tokio::time::timeout(timeout, fetcher.fetch(key)).await {
        Ok(Ok(bytes)) => FetchResult::success(key, mvt::decode(&bytes, key)),
        Ok(Err(e)) => {
            tracing::warn!("Failed to fetch tile {}: {}", key, e);
            FetchResult::failure(key)
        }
        Err(_) => {
            tracing::warn!("Failed to fetch tile {}: {}", key, TileError::Timeout(timeout));
            FetchResult::failure(key)
        }
    };
    inbox.push(result);
}
