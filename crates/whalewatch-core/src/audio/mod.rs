//! Audio alerts.
//!
//! [`AudioNotifier`] owns one worker thread that drains a bounded priority
//! queue and plays tones strictly one at a time. Callers never block on
//! playback: `enqueue` only takes the queue lock briefly.

mod device;
mod queue;
mod synth;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use crate::config::AudioConfig;

pub use device::{CpalSink, ToneSink};
pub use queue::{SoundQueue, SoundRequest};
pub use synth::{MAX_DURATION_MS, Waveform, synthesize, validate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioErrorKind {
    /// No usable output device.
    Device,
    /// Tone could not be synthesized.
    Synthesis,
    /// A single playback failed; the device is still usable.
    Playback,
}

impl fmt::Display for AudioErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Device => "device",
            Self::Synthesis => "synthesis",
            Self::Playback => "playback",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioError {
    pub kind: AudioErrorKind,
    pub message: String,
}

impl AudioError {
    pub fn new(kind: AudioErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn device(message: impl Into<String>) -> Self {
        Self::new(AudioErrorKind::Device, message)
    }

    pub fn synthesis(message: impl Into<String>) -> Self {
        Self::new(AudioErrorKind::Synthesis, message)
    }

    pub fn playback(message: impl Into<String>) -> Self {
        Self::new(AudioErrorKind::Playback, message)
    }

    /// Whether this error should switch audio off for the process.
    pub fn is_fatal(&self) -> bool {
        !matches!(self.kind, AudioErrorKind::Playback)
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "audio {}: {}", self.kind, self.message)
    }
}

impl std::error::Error for AudioError {}

/// Outcome of [`AudioNotifier::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Queued,
    /// Queue was full.
    Dropped,
    /// Parameters can never be synthesized.
    Rejected,
    /// Audio is off or the device is unusable.
    Disabled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioStats {
    pub queued: u64,
    pub dropped: u64,
    pub played: u64,
    pub synthesized: u64,
    pub cache_hits: u64,
}

/// Opens the output device on the worker thread.
pub type SinkOpener = Box<dyn FnOnce() -> Result<Box<dyn ToneSink>, AudioError> + Send>;

/// Cache key: frequency, duration, volume bits.
type ToneKey = (u32, u32, u32);

struct AudioState {
    queue: SoundQueue,
    cache: HashMap<ToneKey, Arc<Waveform>>,
    running: bool,
    stats: AudioStats,
}

struct Shared {
    state: Mutex<AudioState>,
    wake: Condvar,
    supported: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, AudioState> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks audio unusable for the rest of the process.
    fn disable(&self, err: &AudioError) {
        warn!(error = %err, "disabling audio alerts");
        self.supported.store(false, Ordering::SeqCst);
        let mut state = self.lock();
        state.queue.clear();
        state.cache.clear();
    }
}

pub struct AudioNotifier {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl AudioNotifier {
    /// Starts the notifier on the default output device, or a disabled one
    /// when `config.enabled` is false.
    pub fn start(config: &AudioConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }
        Self::with_sink(
            config.queue_capacity,
            Box::new(|| CpalSink::open_default().map(|sink| Box::new(sink) as Box<dyn ToneSink>)),
        )
    }

    /// Starts the worker with a custom sink.
    ///
    /// `open` runs on the worker thread. If it fails, or the worker thread
    /// cannot be spawned, the notifier comes up disabled.
    pub fn with_sink(capacity: usize, open: SinkOpener) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(AudioState {
                queue: SoundQueue::new(capacity),
                cache: HashMap::new(),
                running: true,
                stats: AudioStats::default(),
            }),
            wake: Condvar::new(),
            supported: AtomicBool::new(true),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("whalewatch-audio".to_string())
            .spawn(move || run_worker(&worker_shared, open));

        match worker {
            Ok(handle) => Self {
                shared,
                worker: Some(handle),
            },
            Err(err) => {
                shared.disable(&AudioError::device(format!("spawn audio worker: {err}")));
                Self {
                    shared,
                    worker: None,
                }
            }
        }
    }

    /// A notifier that never plays anything.
    pub fn disabled() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(AudioState {
                    queue: SoundQueue::new(0),
                    cache: HashMap::new(),
                    running: false,
                    stats: AudioStats::default(),
                }),
                wake: Condvar::new(),
                supported: AtomicBool::new(false),
            }),
            worker: None,
        }
    }

    /// Queues a tone without waiting for playback.
    pub fn enqueue(&self, frequency: u32, duration_ms: u32, volume: f32, priority: u8) -> Enqueued {
        if !self.is_supported() {
            return Enqueued::Disabled;
        }
        if let Err(err) = validate(frequency, duration_ms, volume) {
            debug!(error = %err, "rejecting sound request");
            return Enqueued::Rejected;
        }

        let mut state = self.shared.lock();
        if !state.running {
            return Enqueued::Disabled;
        }
        if !state.queue.push(frequency, duration_ms, volume, priority) {
            state.stats.dropped += 1;
            debug!(frequency, priority, "sound queue full, dropping request");
            return Enqueued::Dropped;
        }
        state.stats.queued += 1;
        drop(state);
        self.shared.wake.notify_one();
        Enqueued::Queued
    }

    pub fn is_supported(&self) -> bool {
        self.shared.supported.load(Ordering::SeqCst)
    }

    /// Requests waiting to be played.
    pub fn pending(&self) -> usize {
        self.shared.lock().queue.len()
    }

    pub fn stats(&self) -> AudioStats {
        self.shared.lock().stats
    }

    /// Stops the worker, waits for it, and drops cached waveforms.
    ///
    /// A tone already playing finishes first; queued ones are discarded.
    pub fn shutdown(&mut self) {
        {
            let mut state = self.shared.lock();
            state.running = false;
            state.queue.clear();
        }
        self.shared.wake.notify_all();
        if let Some(handle) = self.worker.take()
            && handle.join().is_err()
        {
            warn!("audio worker panicked");
        }
        self.shared.lock().cache.clear();
    }
}

impl Drop for AudioNotifier {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(shared: &Shared, open: SinkOpener) {
    let mut sink = match open() {
        Ok(sink) => sink,
        Err(err) => {
            shared.disable(&err);
            return;
        }
    };
    let sample_rate = sink.sample_rate();
    info!(sample_rate, "audio worker started");

    while let Some(request) = next_request(shared) {
        let wave = match waveform_for(shared, &request, sample_rate) {
            Ok(wave) => wave,
            Err(err) => {
                shared.disable(&err);
                return;
            }
        };
        match sink.play(wave) {
            Ok(()) => shared.lock().stats.played += 1,
            Err(err) if err.is_fatal() => {
                shared.disable(&err);
                return;
            }
            Err(err) => debug!(error = %err, "tone playback failed"),
        }
    }
    debug!("audio worker stopped");
}

/// Blocks until a request is available or the notifier shuts down.
fn next_request(shared: &Shared) -> Option<SoundRequest> {
    let mut state = shared.lock();
    loop {
        if !state.running {
            return None;
        }
        if let Some(request) = state.queue.pop() {
            return Some(request);
        }
        state = shared
            .wake
            .wait(state)
            .unwrap_or_else(PoisonError::into_inner);
    }
}

/// Looks up the cache, synthesizing outside the lock on a miss.
fn waveform_for(
    shared: &Shared,
    request: &SoundRequest,
    sample_rate: u32,
) -> Result<Arc<Waveform>, AudioError> {
    let key = (request.frequency, request.duration_ms, request.volume.to_bits());
    {
        let mut state = shared.lock();
        if let Some(wave) = state.cache.get(&key).cloned() {
            state.stats.cache_hits += 1;
            return Ok(wave);
        }
    }

    let wave = Arc::new(synthesize(
        request.frequency,
        request.duration_ms,
        request.volume,
        sample_rate,
    )?);
    let mut state = shared.lock();
    state.stats.synthesized += 1;
    state.cache.insert(key, Arc::clone(&wave));
    Ok(wave)
}
