//! Output sinks for synthesized tones.

use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use tracing::{debug, warn};

use super::{AudioError, Waveform};

/// Extra time allowed past the tone length before playback counts as stuck.
const PLAYBACK_GRACE: Duration = Duration::from_millis(500);

/// Something that can play a waveform to completion.
///
/// Sinks live on the audio worker thread and are never shared, so they do
/// not need to be `Send`.
pub trait ToneSink {
    fn sample_rate(&self) -> u32;

    /// Plays `wave` and blocks until it has finished.
    ///
    /// # Errors
    /// Returns an error if the device rejects playback. Errors of kind
    /// [`super::AudioErrorKind::Playback`] are transient; anything else
    /// disables audio.
    fn play(&mut self, wave: Arc<Waveform>) -> Result<(), AudioError>;
}

/// Tone currently being fed to the device callback.
struct Playback {
    wave: Arc<Waveform>,
    cursor: usize,
    done: Option<SyncSender<()>>,
}

type SharedPlayback = Arc<Mutex<Option<Playback>>>;

/// First error reported by the stream callback, if any.
type StreamFault = Arc<Mutex<Option<String>>>;

/// The default output device via cpal.
///
/// One stream is kept open for the life of the sink. It outputs silence
/// until [`ToneSink::play`] hands it a waveform.
pub struct CpalSink {
    _stream: Stream,
    current: SharedPlayback,
    fault: StreamFault,
    sample_rate: u32,
}

impl CpalSink {
    /// Opens the host's default output device.
    ///
    /// # Errors
    /// Returns a device error if there is no output device, its config
    /// cannot be queried, its sample format is unsupported, or the stream
    /// fails to start.
    pub fn open_default() -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| AudioError::device("no default output device"))?;
        let supported = device
            .default_output_config()
            .map_err(|e| AudioError::device(format!("output config: {e}")))?;
        let format = supported.sample_format();
        let config: StreamConfig = supported.into();
        let current: SharedPlayback = Arc::new(Mutex::new(None));
        let fault: StreamFault = Arc::new(Mutex::new(None));

        let stream = match format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, &current, &fault),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, &current, &fault),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, &current, &fault),
            other => Err(AudioError::device(format!(
                "unsupported sample format {other:?}"
            ))),
        }?;
        stream
            .play()
            .map_err(|e| AudioError::device(format!("start stream: {e}")))?;

        if let Ok(name) = device.name() {
            debug!(device = %name, sample_rate = config.sample_rate.0, "audio output opened");
        }

        Ok(Self {
            _stream: stream,
            current,
            fault,
            sample_rate: config.sample_rate.0,
        })
    }
}

impl ToneSink for CpalSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn play(&mut self, wave: Arc<Waveform>) -> Result<(), AudioError> {
        check_fault(&self.fault)?;
        let timeout = wave.duration() + PLAYBACK_GRACE;
        let (done_tx, done_rx): (SyncSender<()>, Receiver<()>) = mpsc::sync_channel(1);
        {
            let mut current = self
                .current
                .lock()
                .map_err(|_| AudioError::device("playback state poisoned"))?;
            *current = Some(Playback {
                wave,
                cursor: 0,
                done: Some(done_tx),
            });
        }

        let finished = done_rx.recv_timeout(timeout).is_ok();
        if let Ok(mut current) = self.current.lock() {
            *current = None;
        }
        check_fault(&self.fault)?;
        if finished {
            Ok(())
        } else {
            Err(AudioError::playback("tone did not finish in time"))
        }
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    current: &SharedPlayback,
    fault: &StreamFault,
) -> Result<Stream, AudioError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = usize::from(config.channels.max(1));
    let data_current = Arc::clone(current);
    let err_current = Arc::clone(current);
    let fault = Arc::clone(fault);
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                fill_frames(data, channels, &data_current);
            },
            move |err| {
                warn!(error = %err, "audio stream error");
                record_fault(&fault, &err_current, err.to_string());
            },
            None,
        )
        .map_err(|e| AudioError::device(format!("build stream: {e}")))
}

/// Remembers the first stream error and wakes a pending [`ToneSink::play`].
fn record_fault(fault: &StreamFault, current: &SharedPlayback, message: String) {
    if let Ok(mut slot) = fault.lock()
        && slot.is_none()
    {
        *slot = Some(message);
    }
    if let Ok(mut guard) = current.lock()
        && let Some(done) = guard.as_mut().and_then(|p| p.done.take())
    {
        let _ = done.try_send(());
    }
}

/// A stream that reported an error is treated as a lost device.
fn check_fault(fault: &StreamFault) -> Result<(), AudioError> {
    let slot = fault.lock().unwrap_or_else(PoisonError::into_inner);
    match slot.as_deref() {
        Some(message) => Err(AudioError::device(format!("output stream failed: {message}"))),
        None => Ok(()),
    }
}

/// Copies the next samples of the current tone into `data`, duplicated
/// across channels, and signals completion once the tone runs out.
fn fill_frames<T>(data: &mut [T], channels: usize, current: &SharedPlayback)
where
    T: SizedSample + FromSample<f32>,
{
    let silence = T::from_sample(0.0_f32);
    let Ok(mut guard) = current.lock() else {
        data.fill(silence);
        return;
    };
    let Some(playback) = guard.as_mut() else {
        data.fill(silence);
        return;
    };

    let samples = playback.wave.samples();
    for frame in data.chunks_mut(channels) {
        let value = samples
            .get(playback.cursor)
            .map_or(silence, |s| T::from_sample(*s));
        frame.fill(value);
        playback.cursor = playback.cursor.saturating_add(1);
    }
    if playback.cursor >= samples.len()
        && let Some(done) = playback.done.take()
    {
        let _ = done.try_send(());
    }
}
