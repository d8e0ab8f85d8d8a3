//! Broadcast engine
//!
//! A single producer task walks the play queue one track at a time:
//! resolve the bitrate, open the file, pace it, and fan every chunk out
//! to the registered sinks. Track advance is a plain loop; stopping is
//! either a flag the loop checks between tracks (graceful) or a
//! cancellation that drops the in-flight read or sleep (immediate).
//!
//! ```text
//!            start()              queue empty, no loop
//!   Idle ───────────────► Playing ─────────────────────► Stopped
//!                            │  ▲                          ▲  │
//!              stop(true)    │  └── next track / refill    │  │ start()
//!                            ▼                             │  │
//!                     StoppingGraceful ── track ends ──────┘  │
//!                            │                                │
//!                            └──── stop(false) ───────────────┘ (from either)
//! ```

pub mod state;

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bitrate::{BitrateResolver, FfprobeProbe};
use crate::catalog::{DirectoryCatalog, Track, TrackCatalog};
use crate::config::StationConfig;
use crate::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_SINK_BUFFER};
use crate::error::{CatalogError, EngineError, Result};
use crate::events::{EngineEvent, EngineObserver, NoopObserver, StopReason};
use crate::playback::Pacer;
use crate::sinks::{ListenerStream, SinkId, SinkRegistry};

pub use state::{EngineState, NowPlaying};

/// Engine tuning
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Re-list the catalog when the queue runs out
    pub loop_playlist: bool,
    /// Bytes per paced chunk
    pub chunk_size: usize,
    /// Chunks a listener may have queued
    pub sink_buffer: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            loop_playlist: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            sink_buffer: DEFAULT_SINK_BUFFER,
        }
    }
}

impl From<&StationConfig> for EngineOptions {
    fn from(config: &StationConfig) -> Self {
        Self {
            loop_playlist: config.loop_playlist,
            chunk_size: config.chunk_size,
            sink_buffer: config.sink_buffer,
        }
    }
}

/// What the producer does next
enum Advance {
    Play(Track),
    Stop(StopReason),
}

struct Inner {
    catalog: Arc<dyn TrackCatalog>,
    resolver: BitrateResolver,
    sinks: SinkRegistry,
    observer: Arc<dyn EngineObserver>,
    options: EngineOptions,
    /// Written only while `queue` is locked
    state: watch::Sender<EngineState>,
    queue: Mutex<VecDeque<Track>>,
    now_playing: Mutex<Option<NowPlaying>>,
    cancel: Mutex<CancellationToken>,
}

/// Live broadcast of a playlist to any number of listeners
pub struct BroadcastEngine {
    inner: Arc<Inner>,
    /// Serializes start/stop and owns the producer task
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl BroadcastEngine {
    pub fn new(
        catalog: Arc<dyn TrackCatalog>,
        resolver: BitrateResolver,
        options: EngineOptions,
    ) -> Self {
        Self::with_observer(catalog, resolver, options, Arc::new(NoopObserver))
    }

    pub fn with_observer(
        catalog: Arc<dyn TrackCatalog>,
        resolver: BitrateResolver,
        options: EngineOptions,
        observer: Arc<dyn EngineObserver>,
    ) -> Self {
        let (state, _) = watch::channel(EngineState::Idle);
        let inner = Inner {
            catalog,
            resolver,
            sinks: SinkRegistry::with_observer(options.sink_buffer, observer.clone()),
            observer,
            options,
            state,
            queue: Mutex::new(VecDeque::new()),
            now_playing: Mutex::new(None),
            cancel: Mutex::new(CancellationToken::new()),
        };

        Self {
            inner: Arc::new(inner),
            task: tokio::sync::Mutex::new(None),
        }
    }

    /// Engine over a music directory, probing bitrates with ffprobe
    pub fn from_config(config: &StationConfig, observer: Arc<dyn EngineObserver>) -> Self {
        let catalog = Arc::new(DirectoryCatalog::from_config(config));
        let resolver =
            BitrateResolver::new(config.bitrate, Arc::new(FfprobeProbe::new(&config.ffprobe_path)));
        Self::with_observer(catalog, resolver, EngineOptions::from(config), observer)
    }

    /// Fill the play queue and start the producer.
    ///
    /// Fails without changing state if already playing, if the catalog
    /// cannot be read, or if it lists no tracks.
    pub async fn start(&self) -> Result<()> {
        let mut task = self.task.lock().await;
        if self.state().is_playing() {
            return Err(EngineError::AlreadyPlaying.into());
        }

        // A previous cycle has already reached Stopped; reap its task
        if let Some(previous) = task.take() {
            if let Err(e) = previous.await {
                tracing::warn!("Previous playback task ended abnormally: {}", e);
            }
        }

        let tracks = self.inner.catalog.list_tracks().await?;
        if tracks.is_empty() {
            return Err(CatalogError::Empty.into());
        }
        self.inner.observer.on_event(&EngineEvent::CatalogLoaded {
            tracks: tracks.len(),
        });

        let cancel = CancellationToken::new();
        *self.inner.cancel.lock() = cancel.clone();
        {
            let mut queue = self.inner.queue.lock();
            *queue = tracks.into();
            self.inner.state.send_replace(EngineState::Playing);
        }

        *task = Some(tokio::spawn(self.inner.clone().run(cancel)));
        Ok(())
    }

    /// Stop playback.
    ///
    /// Graceful lets the current track play out and returns at once.
    /// Otherwise the current track is cut off and every listener stream
    /// has ended by the time this returns.
    pub async fn stop(&self, graceful: bool) -> Result<()> {
        let mut task = self.task.lock().await;
        {
            let mut queue = self.inner.queue.lock();
            let current = *self.inner.state.borrow();
            if !current.is_playing() {
                return Err(EngineError::NotPlaying.into());
            }
            queue.clear();
            if graceful && current == EngineState::Playing {
                self.inner.state.send_replace(EngineState::StoppingGraceful);
            }
        }

        if graceful {
            tracing::debug!("Graceful stop requested");
            return Ok(());
        }

        self.inner.cancel.lock().cancel();
        if let Some(handle) = task.take() {
            if let Err(e) = handle.await {
                tracing::warn!("Playback task ended abnormally: {}", e);
            }
        }
        Ok(())
    }

    pub fn state(&self) -> EngineState {
        *self.inner.state.borrow()
    }

    /// Whether a track is active; listeners should be refused otherwise
    pub fn is_playing(&self) -> bool {
        self.state().is_playing()
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        self.inner.state.subscribe()
    }

    pub fn now_playing(&self) -> Option<NowPlaying> {
        self.inner.now_playing.lock().clone()
    }

    /// Add a listener to the live feed
    pub fn register_sink(&self) -> (SinkId, ListenerStream) {
        self.inner.sinks.register()
    }

    /// Add a listener only if a track is active.
    ///
    /// The check and the registration happen under the queue lock, so a
    /// listener either joins before the producer ends every stream or is
    /// refused.
    pub fn join_live(&self) -> Option<(SinkId, ListenerStream)> {
        let _queue = self.inner.queue.lock();
        if !self.inner.state.borrow().is_playing() {
            return None;
        }
        Some(self.inner.sinks.register())
    }

    pub fn unregister_sink(&self, id: SinkId) {
        self.inner.sinks.remove(id);
    }

    pub fn sinks(&self) -> &SinkRegistry {
        &self.inner.sinks
    }

    pub fn listener_count(&self) -> usize {
        self.inner.sinks.len()
    }
}

impl Drop for BroadcastEngine {
    fn drop(&mut self) {
        self.inner.cancel.lock().cancel();
    }
}

impl Inner {
    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let reason = tokio::select! {
            biased;
            _ = cancel.cancelled() => StopReason::Immediate,
            reason = self.play_queue() => reason,
        };
        self.finish(reason);
    }

    async fn play_queue(&self) -> StopReason {
        let mut played_since_refill = 0usize;
        loop {
            let track = match self.next_track(&mut played_since_refill).await {
                Advance::Play(track) => track,
                Advance::Stop(reason) => return reason,
            };

            match self.play_track(&track).await {
                Ok(bytes) => {
                    if bytes > 0 {
                        played_since_refill += 1;
                    }
                    self.observer
                        .on_event(&EngineEvent::TrackFinished { track, bytes });
                }
                Err(e) => {
                    self.observer.on_event(&EngineEvent::Error {
                        message: format!("failed to play {}: {}", track.name, e),
                    });
                }
            }
            *self.now_playing.lock() = None;
        }
    }

    /// Pop the next track, refilling from the catalog when looping
    async fn next_track(&self, played_since_refill: &mut usize) -> Advance {
        loop {
            {
                let mut queue = self.queue.lock();
                if *self.state.borrow() != EngineState::Playing {
                    return Advance::Stop(StopReason::Graceful);
                }
                if let Some(track) = queue.pop_front() {
                    return Advance::Play(track);
                }
                if !self.options.loop_playlist {
                    return Advance::Stop(StopReason::Exhausted);
                }
            }

            if *played_since_refill == 0 {
                self.observer.on_event(&EngineEvent::Error {
                    message: "no track of the last cycle could be played".to_string(),
                });
                return Advance::Stop(StopReason::CatalogFailure);
            }

            let tracks = match self.catalog.list_tracks().await {
                Ok(tracks) if !tracks.is_empty() => tracks,
                Ok(_) => {
                    self.observer.on_event(&EngineEvent::Error {
                        message: CatalogError::Empty.to_string(),
                    });
                    return Advance::Stop(StopReason::CatalogFailure);
                }
                Err(e) => {
                    self.observer.on_event(&EngineEvent::Error {
                        message: e.to_string(),
                    });
                    return Advance::Stop(StopReason::CatalogFailure);
                }
            };
            self.observer.on_event(&EngineEvent::CatalogLoaded {
                tracks: tracks.len(),
            });
            *played_since_refill = 0;

            {
                let mut queue = self.queue.lock();
                if *self.state.borrow() != EngineState::Playing {
                    return Advance::Stop(StopReason::Graceful);
                }
                queue.extend(tracks);
            }
        }
    }

    /// Pace one track out to every sink; returns the bytes sent
    async fn play_track(&self, track: &Track) -> std::io::Result<u64> {
        let bitrate = self.resolver.resolve(track).await;
        let source = self.catalog.open(track).await?;

        *self.now_playing.lock() = Some(NowPlaying {
            track: track.clone(),
            bitrate,
            started_at: Utc::now(),
        });
        self.observer.on_event(&EngineEvent::TrackStarted {
            track: track.clone(),
            bitrate,
        });

        let mut pacer = Pacer::new(source, bitrate, self.options.chunk_size);
        while let Some(chunk) = pacer.next_chunk().await? {
            let delivered = self.sinks.broadcast(&chunk);
            tracing::trace!("{}: {} bytes to {} sinks", track.name, chunk.len(), delivered);
        }
        Ok(pacer.emitted())
    }

    fn finish(&self, reason: StopReason) {
        *self.now_playing.lock() = None;
        {
            let mut queue = self.queue.lock();
            queue.clear();
            self.state.send_replace(EngineState::Stopped);
        }
        // No sink can join once Stopped is visible
        self.sinks.end_all();
        self.observer.on_event(&EngineEvent::Stopped { reason });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TrackReader;
    use crate::events::tests::RecordingObserver;
    use crate::events::CloseReason;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// 8 kbps = 1000 bytes per second, 250 byte chunks every 250 ms
    const BITRATE: u32 = 8_000;
    const CHUNK: usize = 250;

    #[derive(Clone, Copy)]
    enum Listing {
        Unavailable,
        Empty,
    }

    struct MemoryCatalog {
        order: Vec<String>,
        files: HashMap<String, Vec<u8>>,
        /// Listings from this index on fail the given way
        broken: Option<(usize, Listing)>,
        listings: AtomicUsize,
    }

    impl MemoryCatalog {
        fn new(files: &[(&str, Vec<u8>)]) -> Self {
            Self {
                order: files.iter().map(|(n, _)| n.to_string()).collect(),
                files: files
                    .iter()
                    .map(|(n, data)| (n.to_string(), data.clone()))
                    .collect(),
                broken: None,
                listings: AtomicUsize::new(0),
            }
        }

        /// Lists `name` without any bytes behind it
        fn with_missing(mut self, name: &str, position: usize) -> Self {
            self.order.insert(position, name.to_string());
            self
        }

        fn breaks_after(mut self, listings: usize, how: Listing) -> Self {
            self.broken = Some((listings, how));
            self
        }

        fn unavailable() -> Self {
            Self::new(&[]).breaks_after(0, Listing::Unavailable)
        }
    }

    #[async_trait]
    impl TrackCatalog for MemoryCatalog {
        async fn list_tracks(&self) -> std::result::Result<Vec<Track>, CatalogError> {
            let listing = self.listings.fetch_add(1, Ordering::SeqCst);
            match self.broken {
                Some((from, Listing::Unavailable)) if listing >= from => {
                    return Err(CatalogError::Unavailable {
                        path: "/music".into(),
                        source: std::io::Error::from(std::io::ErrorKind::NotFound),
                    });
                }
                Some((from, Listing::Empty)) if listing >= from => return Ok(Vec::new()),
                _ => {}
            }
            Ok(self
                .order
                .iter()
                .map(|n| Track::new(n.clone(), format!("/music/{n}")))
                .collect())
        }

        async fn open(&self, track: &Track) -> std::io::Result<TrackReader> {
            let data = self
                .files
                .get(&track.name)
                .cloned()
                .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound))?;
            Ok(Box::new(std::io::Cursor::new(data)))
        }
    }

    fn bytes(fill: u8, len: usize) -> Vec<u8> {
        vec![fill; len]
    }

    fn engine(
        catalog: Arc<MemoryCatalog>,
        loop_playlist: bool,
    ) -> (BroadcastEngine, Arc<RecordingObserver>) {
        let observer = Arc::new(RecordingObserver::default());
        let engine = BroadcastEngine::with_observer(
            catalog,
            BitrateResolver::fixed(BITRATE),
            EngineOptions {
                loop_playlist,
                chunk_size: CHUNK,
                sink_buffer: 256,
            },
            observer.clone(),
        );
        (engine, observer)
    }

    async fn wait_stopped(engine: &BroadcastEngine) {
        let mut rx = engine.subscribe_state();
        rx.wait_for(|s| *s == EngineState::Stopped).await.unwrap();
    }

    async fn drain(stream: &mut ListenerStream) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = stream.recv().await {
            out.extend_from_slice(&chunk);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_plays_playlist_once_then_stops() {
        let a = bytes(b'a', 1000);
        let b = bytes(b'b', 500);
        let catalog = Arc::new(MemoryCatalog::new(&[("a.mp3", a.clone()), ("b.mp3", b.clone())]));
        let (engine, observer) = engine(catalog, false);

        let (_, mut first) = engine.register_sink();
        let (_, mut second) = engine.register_sink();
        let started = tokio::time::Instant::now();
        engine.start().await.unwrap();
        assert_eq!(engine.state(), EngineState::Playing);

        wait_stopped(&engine).await;
        // 1500 bytes at 1000 bytes per second
        assert!(started.elapsed() >= Duration::from_millis(1500));

        let expected = [a, b].concat();
        assert_eq!(drain(&mut first).await, expected);
        assert_eq!(drain(&mut second).await, expected);
        assert_eq!(engine.listener_count(), 0);
        assert!(engine.now_playing().is_none());
        assert!(!engine.is_playing());

        let events = observer.events();
        assert!(events.contains(&EngineEvent::Stopped {
            reason: StopReason::Exhausted
        }));
        let started_names: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::TrackStarted { track, bitrate } => {
                    assert_eq!(*bitrate, BITRATE);
                    Some(track.name.clone())
                }
                _ => None,
            })
            .collect();
        assert_eq!(started_names, vec!["a.mp3", "b.mp3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_replays_until_hard_stop() {
        let track = bytes(b'x', 500);
        let catalog = Arc::new(MemoryCatalog::new(&[("only.mp3", track.clone())]));
        let (engine, observer) = engine(catalog.clone(), true);
        let (_, mut listener) = engine.register_sink();

        engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2_200)).await;
        assert!(engine.is_playing());
        assert!(catalog.listings.load(Ordering::SeqCst) >= 4);

        engine.stop(false).await.unwrap();
        assert_eq!(engine.state(), EngineState::Stopped);

        let received = drain(&mut listener).await;
        assert!(received.len() >= 2 * track.len());
        assert_eq!(received.len() % CHUNK, 0);
        assert!(received.iter().all(|&b| b == b'x'));

        // Nothing more after the stop
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(listener.recv().await.is_none());
        assert_eq!(
            observer.events().last(),
            Some(&EngineEvent::Stopped {
                reason: StopReason::Immediate
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_graceful_stop_finishes_current_track() {
        let a = bytes(b'a', 1000);
        let b = bytes(b'b', 1000);
        let catalog = Arc::new(MemoryCatalog::new(&[("a.mp3", a.clone()), ("b.mp3", b)]));
        let (engine, observer) = engine(catalog, true);
        let (id, mut listener) = engine.register_sink();

        engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        engine.stop(true).await.unwrap();
        assert_eq!(engine.state(), EngineState::StoppingGraceful);
        assert!(engine.is_playing());

        wait_stopped(&engine).await;
        assert_eq!(drain(&mut listener).await, a);

        let finished = observer
            .position(|e| matches!(e, EngineEvent::TrackFinished { track, .. } if track.name == "a.mp3"))
            .unwrap();
        let ended = observer
            .position(|e| {
                *e == EngineEvent::SinkClosed {
                    id,
                    reason: CloseReason::StreamEnded,
                }
            })
            .unwrap();
        assert!(finished < ended);
        assert!(!observer
            .events()
            .iter()
            .any(|e| matches!(e, EngineEvent::TrackStarted { track, .. } if track.name == "b.mp3")));
        assert_eq!(
            observer.events().last(),
            Some(&EngineEvent::Stopped {
                reason: StopReason::Graceful
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_stop_cuts_track_short() {
        let catalog = Arc::new(MemoryCatalog::new(&[("a.mp3", bytes(b'a', 1000))]));
        let (engine, observer) = engine(catalog, false);
        let (_, mut listener) = engine.register_sink();

        engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        engine.stop(false).await.unwrap();

        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(drain(&mut listener).await, bytes(b'a', CHUNK));
        assert!(!observer
            .events()
            .iter()
            .any(|e| matches!(e, EngineEvent::TrackFinished { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_stop_while_stopping_gracefully() {
        let catalog = Arc::new(MemoryCatalog::new(&[("a.mp3", bytes(b'a', 1000))]));
        let (engine, _) = engine(catalog, false);
        let (_, mut listener) = engine.register_sink();

        engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        engine.stop(true).await.unwrap();
        engine.stop(false).await.unwrap();

        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(drain(&mut listener).await.len(), CHUNK);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_listener_joins_live_feed() {
        let a: Vec<u8> = (0..1000u32).map(|i| (i / 250) as u8).collect();
        let catalog = Arc::new(MemoryCatalog::new(&[("a.mp3", a.clone())]));
        let (engine, _) = engine(catalog, false);

        engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        let (_, mut late) = engine.register_sink();

        wait_stopped(&engine).await;
        // Chunks at 250 and 500 ms went out before it joined
        assert_eq!(drain(&mut late).await, a[2 * CHUNK..].to_vec());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_is_rejected() {
        let catalog = Arc::new(MemoryCatalog::new(&[("a.mp3", bytes(b'a', 1000))]));
        let (engine, _) = engine(catalog, false);

        engine.start().await.unwrap();
        let err = engine.start().await.unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Engine(EngineError::AlreadyPlaying)
        ));
        assert_eq!(engine.state(), EngineState::Playing);

        engine.stop(true).await.unwrap();
        let err = engine.start().await.unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Engine(EngineError::AlreadyPlaying)
        ));
        assert_eq!(engine.state(), EngineState::StoppingGraceful);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_when_not_playing_is_rejected() {
        let catalog = Arc::new(MemoryCatalog::new(&[("a.mp3", bytes(b'a', 250))]));
        let (engine, _) = engine(catalog, false);

        let err = engine.stop(true).await.unwrap_err();
        assert!(matches!(err, crate::Error::Engine(EngineError::NotPlaying)));
        assert_eq!(engine.state(), EngineState::Idle);

        engine.start().await.unwrap();
        wait_stopped(&engine).await;
        let err = engine.stop(false).await.unwrap_err();
        assert!(matches!(err, crate::Error::Engine(EngineError::NotPlaying)));
        assert_eq!(engine.state(), EngineState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop() {
        let catalog = Arc::new(MemoryCatalog::new(&[("a.mp3", bytes(b'a', 500))]));
        let (engine, _) = engine(catalog, false);

        engine.start().await.unwrap();
        wait_stopped(&engine).await;

        let (_, mut listener) = engine.register_sink();
        engine.start().await.unwrap();
        assert_eq!(engine.state(), EngineState::Playing);
        wait_stopped(&engine).await;
        assert_eq!(drain(&mut listener).await, bytes(b'a', 500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_catalog_fails_start() {
        let catalog = Arc::new(MemoryCatalog::new(&[]));
        let (engine, _) = engine(catalog, true);

        let err = engine.start().await.unwrap_err();
        assert!(matches!(err, crate::Error::Catalog(CatalogError::Empty)));
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_catalog_fails_start() {
        let (engine, _) = engine(Arc::new(MemoryCatalog::unavailable()), true);

        let err = engine.start().await.unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Catalog(CatalogError::Unavailable { .. })
        ));
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unopenable_track_is_skipped() {
        let a = bytes(b'a', 500);
        let c = bytes(b'c', 500);
        let catalog = Arc::new(
            MemoryCatalog::new(&[("a.mp3", a.clone()), ("c.mp3", c.clone())])
                .with_missing("b.mp3", 1),
        );
        let (engine, observer) = engine(catalog, false);
        let (_, mut listener) = engine.register_sink();

        engine.start().await.unwrap();
        wait_stopped(&engine).await;

        assert_eq!(drain(&mut listener).await, [a, c].concat());
        assert!(observer
            .events()
            .iter()
            .any(|e| matches!(e, EngineEvent::Error { message } if message.contains("b.mp3"))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unplayable_loop_stops_instead_of_spinning() {
        let catalog = Arc::new(MemoryCatalog::new(&[]).with_missing("ghost.mp3", 0));
        let (engine, observer) = engine(catalog.clone(), true);

        engine.start().await.unwrap();
        wait_stopped(&engine).await;

        assert_eq!(catalog.listings.load(Ordering::SeqCst), 1);
        assert_eq!(
            observer.events().last(),
            Some(&EngineEvent::Stopped {
                reason: StopReason::CatalogFailure
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_loop_stops_instead_of_spinning() {
        let catalog = Arc::new(MemoryCatalog::new(&[("silent.mp3", Vec::new())]));
        let (engine, observer) = engine(catalog.clone(), true);
        let (_, mut listener) = engine.register_sink();

        engine.start().await.unwrap();
        wait_stopped(&engine).await;

        assert_eq!(catalog.listings.load(Ordering::SeqCst), 1);
        assert!(drain(&mut listener).await.is_empty());
        assert_eq!(
            observer.events().last(),
            Some(&EngineEvent::Stopped {
                reason: StopReason::CatalogFailure
            })
        );
    }

    async fn assert_failed_refill_stops(how: Listing, message: &str) {
        let track = bytes(b'x', 500);
        let catalog = Arc::new(
            MemoryCatalog::new(&[("only.mp3", track.clone())]).breaks_after(1, how),
        );
        let (engine, observer) = engine(catalog.clone(), true);
        let (id, mut listener) = engine.register_sink();

        engine.start().await.unwrap();
        wait_stopped(&engine).await;

        assert_eq!(catalog.listings.load(Ordering::SeqCst), 2);
        assert_eq!(drain(&mut listener).await, track);
        assert_eq!(engine.listener_count(), 0);

        let events = observer.events();
        assert!(events.contains(&EngineEvent::SinkClosed {
            id,
            reason: CloseReason::StreamEnded,
        }));
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::Error { message: m } if m.contains(message))));
        assert_eq!(
            events.last(),
            Some(&EngineEvent::Stopped {
                reason: StopReason::CatalogFailure
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_stops_when_refill_is_unavailable() {
        assert_failed_refill_stops(Listing::Unavailable, "unavailable").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_stops_when_refill_is_empty() {
        assert_failed_refill_stops(Listing::Empty, "No playable tracks").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_live_only_while_playing() {
        let a = bytes(b'a', 500);
        let catalog = Arc::new(MemoryCatalog::new(&[("a.mp3", a.clone())]));
        let (engine, _) = engine(catalog, false);
        assert!(engine.join_live().is_none());

        engine.start().await.unwrap();
        let (_, mut listener) = engine.join_live().unwrap();
        assert_eq!(engine.listener_count(), 1);

        let mut rx = engine.subscribe_state();
        rx.wait_for(|s| *s == EngineState::Stopped).await.unwrap();
        assert!(engine.join_live().is_none());

        assert_eq!(drain(&mut listener).await, a);
        assert_eq!(engine.listener_count(), 0);
    }
}
