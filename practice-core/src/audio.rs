//! # Audio Capture Module
//!
//! The detection loop reads fixed-size frames of mono 16-bit samples through
//! the [`CaptureBackend`] / [`CaptureDevice`] pair. Two backends ship with the
//! crate:
//!
//! - [`CpalBackend`]: the default input device via CPAL. The stream callback
//!   converts to `i16`, averages the channels down to mono and queues chunks
//!   on a bounded channel; `read_frame` drains that queue.
//! - [`SyntheticBackend`]: generated sine mixtures or silence, used by the
//!   tests and by the CLI's simulate mode.
//!
//! Devices are opened on the detection thread and never leave it (CPAL
//! streams are not `Send` on every platform), which is why only the backend
//! has to be `Send + Sync`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample, SupportedStreamConfigRange};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{EngineError, Result};

/// How long a CPAL read waits for a full frame before giving up.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 500;

/// What the engine asks of a capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Fixed sample rate in Hz.
    pub sample_rate: u32,
    /// Channels delivered to the engine; always 1 (mono).
    pub channels: u16,
    /// Samples per analysis frame.
    pub frame_size: usize,
    /// Upper bound on a single blocking frame read.
    pub read_timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 1,
            frame_size: 4096,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
        }
    }
}

impl CaptureConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(EngineError::InvalidConfig("sample rate must be positive".into()));
        }
        if self.channels != 1 {
            return Err(EngineError::InvalidConfig(format!(
                "the engine analyzes mono audio, got {} channels",
                self.channels
            )));
        }
        if self.frame_size == 0 {
            return Err(EngineError::InvalidConfig("frame size must be positive".into()));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// A partially specified [`CaptureConfig`], as found in settings files.
///
/// Each pipeline captures at its own rate, so a partial `capture` section must
/// be laid over that pipeline's defaults rather than over
/// [`CaptureConfig::default`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CaptureOverrides {
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub frame_size: Option<usize>,
    pub read_timeout_ms: Option<u64>,
}

impl CaptureOverrides {
    /// Fills every unset field from `base`.
    pub fn apply_to(self, base: CaptureConfig) -> CaptureConfig {
        CaptureConfig {
            sample_rate: self.sample_rate.unwrap_or(base.sample_rate),
            channels: self.channels.unwrap_or(base.channels),
            frame_size: self.frame_size.unwrap_or(base.frame_size),
            read_timeout_ms: self.read_timeout_ms.unwrap_or(base.read_timeout_ms),
        }
    }
}

/// Opens capture devices. Shared with the detection thread.
pub trait CaptureBackend: Send + Sync {
    /// Opens a device delivering mono `i16` frames at `config.sample_rate`.
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn CaptureDevice>>;
}

/// An open capture device, owned by exactly one detection thread.
pub trait CaptureDevice {
    /// Fills `buffer` with the next samples and returns how many were written.
    ///
    /// Anything short of `buffer.len()` means "no data this cycle"; the caller
    /// discards the partial frame.
    fn read_frame(&mut self, buffer: &mut [i16]) -> usize;

    /// Releases the device. Called once, after the last read.
    fn close(&mut self) -> Result<()>;
}

// --- CPAL -----------------------------------------------------------------

/// Captures from the system's default input device.
#[derive(Debug, Clone, Default)]
pub struct CpalBackend;

impl CaptureBackend for CpalBackend {
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn CaptureDevice>> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| EngineError::DeviceUnavailable("no input device available".into()))?;

        info!(
            device = %device.name().unwrap_or_else(|_| "unknown".into()),
            sample_rate = config.sample_rate,
            "opening audio input device"
        );

        let configs = device
            .supported_input_configs()
            .map_err(|e| EngineError::DeviceUnavailable(e.to_string()))?
            .collect::<Vec<_>>();
        let supported = find_supported_config(configs, config.sample_rate).ok_or_else(|| {
            EngineError::UnsupportedFormat(format!(
                "no input format supports {} Hz",
                config.sample_rate
            ))
        })?;

        if let cpal::SupportedBufferSize::Range { min, max } = supported.buffer_size() {
            if *min > *max || *min == 0 {
                return Err(EngineError::DeviceUnavailable(format!(
                    "device reported an invalid buffer size range {min}..{max}"
                )));
            }
        }

        let sample_format = supported.sample_format();
        let stream_config: cpal::StreamConfig = supported
            .with_sample_rate(cpal::SampleRate(config.sample_rate))
            .into();
        let channels = stream_config.channels as usize;
        debug!(?sample_format, channels, "selected input stream config");

        // A few frames of slack; older chunks are dropped when the loop lags.
        let chunk_capacity = 64;
        let (sender, receiver) = crossbeam_channel::bounded::<Vec<i16>>(chunk_capacity);

        let stream = match sample_format {
            cpal::SampleFormat::F32 => build_input_stream::<f32>(&device, &stream_config, channels, sender),
            cpal::SampleFormat::I16 => build_input_stream::<i16>(&device, &stream_config, channels, sender),
            cpal::SampleFormat::U16 => build_input_stream::<u16>(&device, &stream_config, channels, sender),
            other => {
                return Err(EngineError::UnsupportedFormat(format!("{other:?}")));
            }
        }?;

        stream
            .play()
            .map_err(|e| EngineError::DeviceUnavailable(e.to_string()))?;

        Ok(Box::new(CpalDevice {
            stream: Some(stream),
            receiver,
            pending: VecDeque::new(),
            read_timeout: config.read_timeout(),
        }))
    }
}

/// Finds an input configuration whose rate range contains `target_rate`.
///
/// Mono is preferred over multichannel, and formats are ranked
/// f32 > i16 > u16. Formats the engine cannot convert are skipped.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    let format_rank = |format: cpal::SampleFormat| match format {
        cpal::SampleFormat::F32 => Some(0),
        cpal::SampleFormat::I16 => Some(1),
        cpal::SampleFormat::U16 => Some(2),
        _ => None,
    };
    configs
        .into_iter()
        .filter(|c| c.min_sample_rate().0 <= target_rate && target_rate <= c.max_sample_rate().0)
        .filter_map(|c| format_rank(c.sample_format()).map(|rank| (c, rank)))
        .min_by_key(|(c, rank)| (c.channels() != 1, c.channels(), *rank))
        .map(|(c, _)| c)
}

fn build_input_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    sender: Sender<Vec<i16>>,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    i16: FromSample<T>,
{
    let err_fn = |err| error!("an error occurred on the audio input stream: {err}");
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let mono = downmix_to_mono(data, channels);
                // Drop the chunk if the detection loop has fallen behind.
                let _ = sender.try_send(mono);
            },
            err_fn,
            None,
        )
        .map_err(|e| EngineError::DeviceUnavailable(e.to_string()))
}

/// Averages each interleaved frame of `channels` samples into one `i16`.
fn downmix_to_mono<T>(data: &[T], channels: usize) -> Vec<i16>
where
    T: Sample,
    i16: FromSample<T>,
{
    data.chunks(channels.max(1))
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s.to_sample::<i16>() as i32).sum();
            (sum / frame.len() as i32) as i16
        })
        .collect()
}

struct CpalDevice {
    stream: Option<cpal::Stream>,
    receiver: Receiver<Vec<i16>>,
    /// Samples received beyond the last full frame.
    pending: VecDeque<i16>,
    read_timeout: Duration,
}

impl CaptureDevice for CpalDevice {
    fn read_frame(&mut self, buffer: &mut [i16]) -> usize {
        let deadline = Instant::now() + self.read_timeout;
        while self.pending.len() < buffer.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(chunk) => self.pending.extend(chunk),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    let got = self.pending.len();
                    self.pending.clear();
                    return got;
                }
            }
        }
        let frame_len = buffer.len();
        for (slot, sample) in buffer.iter_mut().zip(self.pending.drain(..frame_len)) {
            *slot = sample;
        }
        // Only keep up to one frame of backlog so results stay close to real time.
        if self.pending.len() > buffer.len() {
            let stale = self.pending.len() - buffer.len();
            self.pending.drain(..stale);
        }
        buffer.len()
    }

    fn close(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            stream
                .pause()
                .map_err(|e| EngineError::DeviceUnavailable(format!("error pausing stream: {e}")))?;
            drop(stream);
        }
        Ok(())
    }
}

// --- Synthetic --------------------------------------------------------------

/// One sine component of a synthetic signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tone {
    pub frequency: f64,
    /// Peak amplitude relative to full scale.
    pub amplitude: f64,
}

/// Generates sine mixtures instead of recording.
///
/// Every opened device starts at sample 0, so two sessions produce the same
/// frames. Open/close counts are shared between clones.
#[derive(Debug, Clone, Default)]
pub struct SyntheticBackend {
    tones: Vec<Tone>,
    fail_open: bool,
    /// Every n-th read returns half a frame.
    short_read_every: Option<usize>,
    opens: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl SyntheticBackend {
    /// A device that only ever records silence.
    pub fn silence() -> Self {
        Self::default()
    }

    /// A mixture of sines, each `(frequency_hz, amplitude)`.
    pub fn tones(tones: &[(f64, f64)]) -> Self {
        Self {
            tones: tones
                .iter()
                .map(|&(frequency, amplitude)| Tone { frequency, amplitude })
                .collect(),
            ..Self::default()
        }
    }

    /// Makes every `open` fail as if no microphone were present.
    pub fn failing(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Every `n`-th read comes back short.
    pub fn with_short_reads(mut self, n: usize) -> Self {
        self.short_read_every = Some(n.max(1));
        self
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl CaptureBackend for SyntheticBackend {
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn CaptureDevice>> {
        if self.fail_open {
            return Err(EngineError::DeviceUnavailable("synthetic device refused to open".into()));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SyntheticDevice {
            tones: self.tones.clone(),
            sample_rate: config.sample_rate as f64,
            position: 0,
            reads: 0,
            short_read_every: self.short_read_every,
            closes: Arc::clone(&self.closes),
            closed: false,
        }))
    }
}

struct SyntheticDevice {
    tones: Vec<Tone>,
    sample_rate: f64,
    position: u64,
    reads: usize,
    short_read_every: Option<usize>,
    closes: Arc<AtomicUsize>,
    closed: bool,
}

impl CaptureDevice for SyntheticDevice {
    fn read_frame(&mut self, buffer: &mut [i16]) -> usize {
        self.reads += 1;
        let len = match self.short_read_every {
            Some(n) if self.reads % n == 0 => buffer.len() / 2,
            _ => buffer.len(),
        };
        for slot in buffer.iter_mut().take(len) {
            let t = self.position as f64 / self.sample_rate;
            let value: f64 = self
                .tones
                .iter()
                .map(|tone| tone.amplitude * (2.0 * std::f64::consts::PI * tone.frequency * t).sin())
                .sum();
            *slot = (value.clamp(-1.0, 1.0) * i16::MAX as f64).round() as i16;
            self.position += 1;
        }
        len
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            warn!("synthetic device closed twice");
            return Ok(());
        }
        self.closed = true;
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
