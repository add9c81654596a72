// The playback engine: one cpal output stream over a table of decoded
// tracks. The coordinator decides which track plays; the engine just mixes
// whichever one is flagged and reports media events back to the UI loop.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{Context as _, Result, bail};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use log::{debug, info, warn};

use crate::audio::decoder::TrackDecoder;
use crate::playback::Media;

/// Most recent mono samples heard on the output, for the analyser.
pub type SampleTap = Arc<Mutex<Vec<f32>>>;

pub const TAP_LEN: usize = 4096;

/// Decode progress is reported at most this often (in decoded seconds).
const PROGRESS_STRIDE_SECS: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub enum MediaEventKind {
    /// Duration is known; the track has become playable.
    LoadedMetadata,
    /// Buffered-range update, `[start, end]` seconds.
    Progress(Vec<(f64, f64)>),
    Ended,
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaEvent {
    pub track: usize,
    pub kind: MediaEventKind,
}

#[derive(Default)]
struct TrackState {
    /// Interleaved PCM at `sample_rate`, growing while the decode runs.
    pcm: Vec<f32>,
    channels: usize,
    sample_rate: u32,
    /// Seconds. Set at probe time when the container declares its length,
    /// otherwise when the decode finishes. `None` forever on load failure.
    duration: Option<f64>,
    decoded_frames: usize,
    decode_done: bool,
    /// Fractional frame index of the play head.
    cursor: f64,
    playing: bool,
}

struct EngineShared {
    tracks: Vec<TrackState>,
}

pub struct AudioEngine {
    shared: Arc<Mutex<EngineShared>>,
    tap: SampleTap,
    events_tx: Sender<MediaEvent>,
    events_rx: Receiver<MediaEvent>,
    _stream: Stream,
}

impl AudioEngine {
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .context("no audio output device available")?;
        info!("audio output: {}", device.description()?);

        let supported = device
            .default_output_config()
            .context("failed to get default output config")?;

        let shared = Arc::new(Mutex::new(EngineShared { tracks: Vec::new() }));
        let tap: SampleTap = Arc::new(Mutex::new(Vec::new()));
        let (events_tx, events_rx) = mpsc::channel();

        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => Self::build_stream::<f32>(
                &device,
                &supported.into(),
                shared.clone(),
                tap.clone(),
                events_tx.clone(),
            )?,
            cpal::SampleFormat::I16 => Self::build_stream::<i16>(
                &device,
                &supported.into(),
                shared.clone(),
                tap.clone(),
                events_tx.clone(),
            )?,
            cpal::SampleFormat::U16 => Self::build_stream::<u16>(
                &device,
                &supported.into(),
                shared.clone(),
                tap.clone(),
                events_tx.clone(),
            )?,
            format => bail!("unsupported output sample format: {format:?}"),
        };
        stream.play().context("failed to start output stream")?;

        Ok(Self {
            shared,
            tap,
            events_tx,
            events_rx,
            _stream: stream,
        })
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
        device: &cpal::Device,
        config: &StreamConfig,
        shared: Arc<Mutex<EngineShared>>,
        tap: SampleTap,
        events: Sender<MediaEvent>,
    ) -> Result<Stream> {
        let out_channels = config.channels as usize;
        let out_rate = config.sample_rate;
        let mut scratch: Vec<f32> = Vec::new();
        let mut mono: Vec<f32> = Vec::new();

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    scratch.clear();
                    scratch.resize(data.len(), 0.0);
                    mono.clear();

                    let ended = {
                        let mut shared = shared.lock().unwrap();
                        mix(&mut shared, &mut scratch, out_channels, out_rate, &mut mono)
                    };

                    for (out, &sample) in data.iter_mut().zip(scratch.iter()) {
                        *out = T::from_sample(sample);
                    }

                    let mut samples = tap.lock().unwrap();
                    samples.extend_from_slice(&mono);
                    if samples.len() > TAP_LEN {
                        let keep = samples.len() - TAP_LEN;
                        samples.drain(0..keep);
                    }
                    drop(samples);

                    if let Some(track) = ended {
                        let _ = events.send(MediaEvent {
                            track,
                            kind: MediaEventKind::Ended,
                        });
                    }
                },
                move |err| {
                    warn!("audio output error: {}", err);
                },
                None,
            )
            .context("failed to build output stream")?;
        Ok(stream)
    }

    /// Register a track and start decoding it in the background. Handles are
    /// issued in registration order, matching the bead collection order.
    pub fn add_track(&self, path: &Path) -> TrackHandle {
        let index = {
            let mut shared = self.shared.lock().unwrap();
            shared.tracks.push(TrackState::default());
            shared.tracks.len() - 1
        };
        let shared = Arc::clone(&self.shared);
        let events = self.events_tx.clone();
        let path = path.to_path_buf();
        thread::spawn(move || decode_worker(index, path, shared, events));
        TrackHandle {
            shared: Arc::clone(&self.shared),
            index,
        }
    }

    /// Drain every media event produced since the last call.
    pub fn poll_events(&self) -> Vec<MediaEvent> {
        self.events_rx.try_iter().collect()
    }

    pub fn tap(&self) -> SampleTap {
        Arc::clone(&self.tap)
    }
}

/// Mix the playing track (if any) into `out`, pushing a mono copy of every
/// written frame into `mono`. Returns the index of a track that just ended.
///
/// Frames past the decoded span stall as silence while the decode is still
/// running; once it is done the cursor passing that span ends the track.
fn mix(
    shared: &mut EngineShared,
    out: &mut [f32],
    out_channels: usize,
    out_rate: u32,
    mono: &mut Vec<f32>,
) -> Option<usize> {
    let frames = out.len() / out_channels.max(1);
    let mut ended = None;

    if let Some((index, track)) = shared
        .tracks
        .iter_mut()
        .enumerate()
        .find(|(_, t)| t.playing)
    {
        let step = track.sample_rate as f64 / out_rate as f64;
        let channels = track.channels.max(1);
        for frame in out.chunks_mut(out_channels.max(1)) {
            let at = track.cursor as usize;
            if at >= track.decoded_frames {
                if track.decode_done {
                    track.cursor = track.decoded_frames as f64;
                    track.playing = false;
                    ended = Some(index);
                }
                break;
            }
            let base = at * channels;
            let left = track.pcm[base];
            let right = if channels > 1 { track.pcm[base + 1] } else { left };
            frame[0] = left;
            if frame.len() > 1 {
                frame[1] = right;
            }
            mono.push((left + right) * 0.5);
            track.cursor += step;
        }
    }

    // pad so a paused or idle engine decays the tap to silence
    mono.resize(frames, 0.0);
    ended
}

fn decode_worker(
    index: usize,
    path: PathBuf,
    shared: Arc<Mutex<EngineShared>>,
    events: Sender<MediaEvent>,
) {
    let mut decoder = match TrackDecoder::open(&path) {
        Ok(d) => d,
        Err(e) => {
            // Duration stays unknown, so the coordinator treats every play
            // request on this track as a no-op.
            warn!("bead source {} failed to load: {}", path.display(), e);
            let _ = events.send(MediaEvent {
                track: index,
                kind: MediaEventKind::Error(e.to_string()),
            });
            return;
        }
    };

    let sample_rate = decoder.sample_rate();
    let channels = decoder.channels().max(1);
    let declared = decoder.total_frames();
    {
        let mut shared = shared.lock().unwrap();
        let track = &mut shared.tracks[index];
        track.sample_rate = sample_rate;
        track.channels = channels;
        track.duration = declared.map(|frames| frames as f64 / sample_rate as f64);
    }
    if declared.is_some() {
        let _ = events.send(MediaEvent {
            track: index,
            kind: MediaEventKind::LoadedMetadata,
        });
    }
    debug!(
        "decoding {}: {} Hz, {} ch",
        path.display(),
        sample_rate,
        channels
    );

    let mut reported_secs = 0.0f64;
    loop {
        match decoder.decode_next() {
            Ok(Some(samples)) => {
                let decoded_secs = {
                    let mut shared = shared.lock().unwrap();
                    let track = &mut shared.tracks[index];
                    track.pcm.extend_from_slice(&samples);
                    track.decoded_frames = track.pcm.len() / channels;
                    track.decoded_frames as f64 / sample_rate as f64
                };
                if decoded_secs - reported_secs >= PROGRESS_STRIDE_SECS {
                    reported_secs = decoded_secs;
                    let _ = events.send(MediaEvent {
                        track: index,
                        kind: MediaEventKind::Progress(vec![(0.0, decoded_secs)]),
                    });
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("decode aborted for {}: {}", path.display(), e);
                let _ = events.send(MediaEvent {
                    track: index,
                    kind: MediaEventKind::Error(e.to_string()),
                });
                break;
            }
        }
    }

    // End of stream (or an aborted decode): what we have is the track.
    let (decoded_secs, had_duration) = {
        let mut shared = shared.lock().unwrap();
        let track = &mut shared.tracks[index];
        track.decode_done = true;
        let secs = track.decoded_frames as f64 / sample_rate as f64;
        let had = track.duration.is_some();
        track.duration = Some(secs);
        (secs, had)
    };
    if !had_duration {
        let _ = events.send(MediaEvent {
            track: index,
            kind: MediaEventKind::LoadedMetadata,
        });
    }
    let _ = events.send(MediaEvent {
        track: index,
        kind: MediaEventKind::Progress(vec![(0.0, decoded_secs)]),
    });
}

/// Per-track media handle, the production implementation of the
/// coordinator's `Media` seam.
pub struct TrackHandle {
    shared: Arc<Mutex<EngineShared>>,
    index: usize,
}

impl TrackHandle {
    fn with_track<R>(&self, f: impl FnOnce(&mut TrackState) -> R) -> R {
        let mut shared = self.shared.lock().unwrap();
        f(&mut shared.tracks[self.index])
    }
}

impl Media for TrackHandle {
    fn play(&mut self) {
        self.with_track(|t| t.playing = true);
    }

    fn pause(&mut self) {
        self.with_track(|t| t.playing = false);
    }

    fn duration(&self) -> Option<f64> {
        self.with_track(|t| t.duration)
    }

    fn position(&self) -> f64 {
        self.with_track(|t| {
            if t.sample_rate == 0 {
                0.0
            } else {
                t.cursor / t.sample_rate as f64
            }
        })
    }

    fn set_position(&mut self, seconds: f64) {
        self.with_track(|t| {
            if t.sample_rate == 0 {
                return;
            }
            let rate = t.sample_rate as f64;
            let end_frame = t
                .duration
                .map(|d| d * rate)
                .unwrap_or(t.decoded_frames as f64);
            t.cursor = (seconds * rate).clamp(0.0, end_frame);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(rate: u32, channels: usize, frames: usize, done: bool) -> TrackState {
        let mut pcm = Vec::with_capacity(frames * channels);
        for frame in 0..frames {
            for ch in 0..channels {
                // left channel counts up, right channel counts down
                let value = if ch == 0 { frame as f32 } else { -(frame as f32) };
                pcm.push(value);
            }
        }
        TrackState {
            pcm,
            channels,
            sample_rate: rate,
            duration: Some(frames as f64 / rate as f64),
            decoded_frames: frames,
            decode_done: done,
            cursor: 0.0,
            playing: true,
        }
    }

    #[test]
    fn mix_copies_stereo_frames_and_advances_the_cursor() {
        let mut shared = EngineShared {
            tracks: vec![track(48000, 2, 100, true)],
        };
        let mut out = vec![0.0f32; 8];
        let mut mono = Vec::new();
        let ended = mix(&mut shared, &mut out, 2, 48000, &mut mono);

        assert_eq!(ended, None);
        assert_eq!(out, vec![0.0, 0.0, 1.0, -1.0, 2.0, -2.0, 3.0, -3.0]);
        assert_eq!(mono, vec![0.0; 4]);
        assert_eq!(shared.tracks[0].cursor, 4.0);
    }

    #[test]
    fn mix_duplicates_mono_sources_across_both_channels() {
        let mut shared = EngineShared {
            tracks: vec![track(48000, 1, 10, true)],
        };
        let mut out = vec![0.0f32; 4];
        let mut mono = Vec::new();
        mix(&mut shared, &mut out, 2, 48000, &mut mono);
        assert_eq!(out, vec![0.0, 0.0, 1.0, 1.0]);
        assert_eq!(mono, vec![0.0, 1.0]);
    }

    #[test]
    fn mix_steps_by_the_rate_ratio() {
        let mut shared = EngineShared {
            tracks: vec![track(22050, 1, 100, true)],
        };
        let mut out = vec![0.0f32; 8];
        let mut mono = Vec::new();
        mix(&mut shared, &mut out, 2, 44100, &mut mono);
        // half-rate source: every input frame is emitted twice
        assert_eq!(shared.tracks[0].cursor, 2.0);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[2], 0.0);
        assert_eq!(out[4], 1.0);
    }

    #[test]
    fn mix_stalls_on_underrun_while_decode_is_running() {
        let mut shared = EngineShared {
            tracks: vec![track(48000, 1, 2, false)],
        };
        let mut out = vec![1.0f32; 8];
        let mut mono = Vec::new();
        let ended = mix(&mut shared, &mut out, 2, 48000, &mut mono);

        assert_eq!(ended, None);
        assert!(shared.tracks[0].playing);
        assert_eq!(shared.tracks[0].cursor, 2.0);
        // frames past the decoded span come out as silence
        assert_eq!(&out[4..], &[0.0, 0.0, 0.0, 0.0]);
        // and the tap is padded so the spectrum decays
        assert_eq!(mono.len(), 4);
    }

    #[test]
    fn mix_flags_ended_exactly_once_when_the_track_runs_out() {
        let mut shared = EngineShared {
            tracks: vec![track(48000, 1, 2, true)],
        };
        let mut out = vec![0.0f32; 8];
        let mut mono = Vec::new();
        let ended = mix(&mut shared, &mut out, 2, 48000, &mut mono);
        assert_eq!(ended, Some(0));
        assert!(!shared.tracks[0].playing);

        mono.clear();
        let again = mix(&mut shared, &mut out, 2, 48000, &mut mono);
        assert_eq!(again, None);
    }

    #[test]
    fn mix_is_silent_with_no_playing_track() {
        let mut idle = track(48000, 2, 10, true);
        idle.playing = false;
        let mut shared = EngineShared { tracks: vec![idle] };
        let mut out = vec![1.0f32; 4];
        let mut mono = Vec::new();
        mix(&mut shared, &mut out, 2, 48000, &mut mono);
        assert_eq!(out, vec![1.0; 4]); // untouched; caller pre-fills silence
        assert_eq!(mono, vec![0.0, 0.0]);
    }
}
