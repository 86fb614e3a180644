use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::scheduler::{Scheduler, SchedulerError, SourceHandle};
use crate::song::AudioBuffer;

struct Voice {
    buffer: Arc<AudioBuffer>,
    start_frame: u64,
    offset_frames: u64,
    gain: f32,
    target_gain: f32,
    ramp_step: f32,
    stopped: bool,
}

impl Voice {
    /// Advances the gain ramp by one frame and returns the gain to apply.
    fn next_gain(&mut self) -> f32 {
        if self.gain != self.target_gain {
            let remaining = self.target_gain - self.gain;
            if remaining.abs() <= self.ramp_step {
                self.gain = self.target_gain;
            } else {
                self.gain += self.ramp_step.copysign(remaining);
            }
        }
        self.gain
    }

    fn mix_into(&mut self, acc: &mut [f32], channels: usize, block_start: u64) {
        if self.stopped {
            return;
        }

        let frames = acc.len() / channels;
        for n in 0..frames {
            let t = block_start + n as u64;
            if t < self.start_frame {
                continue;
            }

            let index = (t - self.start_frame + self.offset_frames) as usize;
            if index >= self.buffer.frames() {
                // Ran past the end of the stem. The song keeps going as
                // long as its longest stem; this voice just goes quiet.
                self.stopped = true;
                return;
            }

            let gain = self.next_gain();
            if gain == 0.0 && self.target_gain == 0.0 {
                continue;
            }

            let frame = &mut acc[n * channels..(n + 1) * channels];
            for (c, out) in frame.iter_mut().enumerate() {
                *out += self.buffer.sample_mapped(c, index) * gain;
            }
        }
    }
}

#[derive(Default)]
struct MixerState {
    voices: HashMap<u64, Voice>,
    next_id: u64,
}

fn lock_state(state: &Mutex<MixerState>) -> MutexGuard<'_, MixerState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_block<T>(
    output: &mut [T],
    channels: usize,
    state: &Mutex<MixerState>,
    frames_written: &AtomicU64,
) where
    T: cpal::Sample + cpal::FromSample<f32>,
{
    let frames = (output.len() / channels) as u64;
    let block_start = frames_written.load(Ordering::Relaxed);

    let mut acc = vec![0.0f32; output.len()];
    {
        let mut state = lock_state(state);
        for voice in state.voices.values_mut() {
            voice.mix_into(&mut acc, channels, block_start);
        }
        state.voices.retain(|_, v| !v.stopped);
    }

    for (out, &sample) in output.iter_mut().zip(&acc) {
        *out = T::from_sample(sample.clamp(-1.0, 1.0));
    }

    frames_written.store(block_start + frames, Ordering::Relaxed);
}

/// Default-device output backend. Every spawned voice is mixed in the
/// stream callback against a single frame counter, so voices scheduled
/// for the same `at` begin on exactly the same device frame.
pub struct CpalOutput {
    _stream: cpal::Stream,
    state: Arc<Mutex<MixerState>>,
    frames_written: Arc<AtomicU64>,
    sample_rate: u32,
    channels: usize,
}

impl CpalOutput {
    pub fn new() -> Result<Self, SchedulerError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| SchedulerError::Stream("no default output device".to_string()))?;
        let supported = device
            .default_output_config()
            .map_err(|e| SchedulerError::Stream(e.to_string()))?;

        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();

        match sample_format {
            cpal::SampleFormat::F32 => Self::build::<f32>(&device, &config),
            cpal::SampleFormat::I16 => Self::build::<i16>(&device, &config),
            cpal::SampleFormat::U16 => Self::build::<u16>(&device, &config),
            other => Err(SchedulerError::Stream(format!(
                "unsupported output sample format {other:?}"
            ))),
        }
    }

    fn build<T>(device: &cpal::Device, config: &cpal::StreamConfig) -> Result<Self, SchedulerError>
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        let state = Arc::new(Mutex::new(MixerState::default()));
        let frames_written = Arc::new(AtomicU64::new(0));
        let channels = config.channels as usize;
        let sample_rate = config.sample_rate.0;

        let callback_state = state.clone();
        let callback_frames = frames_written.clone();
        let stream = device
            .build_output_stream(
                config,
                move |output: &mut [T], _: &cpal::OutputCallbackInfo| {
                    write_block(output, channels, &callback_state, &callback_frames);
                },
                |err| log::error!("output stream error: {err}"),
                None,
            )
            .map_err(|e| SchedulerError::Stream(e.to_string()))?;

        stream.play().map_err(|e| SchedulerError::Stream(e.to_string()))?;

        log::info!("output stream open: {sample_rate} Hz, {channels} channels");

        Ok(CpalOutput {
            _stream: stream,
            state,
            frames_written,
            sample_rate,
            channels,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels
    }
}

impl Scheduler for CpalOutput {
    fn now(&self) -> f64 {
        self.frames_written.load(Ordering::Relaxed) as f64 / self.sample_rate as f64
    }

    fn spawn(
        &mut self,
        buffer: Arc<AudioBuffer>,
        at: f64,
        offset_seconds: f64,
        gain: f32,
    ) -> Result<Box<dyn SourceHandle>, SchedulerError> {
        if buffer.frames() == 0 {
            return Err(SchedulerError::EmptyBuffer);
        }

        let duration = buffer.duration_seconds();
        if offset_seconds < 0.0 || offset_seconds >= duration {
            return Err(SchedulerError::InvalidOffset {
                offset: offset_seconds,
                duration,
            });
        }

        if buffer.sample_rate() != self.sample_rate {
            log::warn!(
                "buffer rate {} Hz does not match output rate {} Hz; playback speed will be off",
                buffer.sample_rate(),
                self.sample_rate
            );
        }

        let start_frame = (at.max(0.0) * self.sample_rate as f64).round() as u64;
        let offset_frames = (offset_seconds * buffer.sample_rate() as f64).round() as u64;

        let mut state = lock_state(&self.state);
        let id = state.next_id;
        state.next_id += 1;
        state.voices.insert(
            id,
            Voice {
                buffer,
                start_frame,
                offset_frames,
                gain,
                target_gain: gain,
                ramp_step: 0.0,
                stopped: false,
            },
        );

        Ok(Box::new(CpalHandle {
            id,
            state: self.state.clone(),
            sample_rate: self.sample_rate,
        }))
    }
}

struct CpalHandle {
    id: u64,
    state: Arc<Mutex<MixerState>>,
    sample_rate: u32,
}

impl SourceHandle for CpalHandle {
    fn set_gain(&mut self, target: f32, ramp_seconds: f64) {
        let mut state = lock_state(&self.state);
        // A voice that already ran to its end has been reaped; nothing
        // left to ramp.
        if let Some(voice) = state.voices.get_mut(&self.id) {
            if ramp_seconds <= 0.0 {
                voice.gain = target;
                voice.target_gain = target;
                voice.ramp_step = 0.0;
                return;
            }
            let ramp_frames = (ramp_seconds * self.sample_rate as f64).max(1.0) as f32;
            voice.ramp_step = (target - voice.gain).abs() / ramp_frames;
            voice.target_gain = target;
        }
    }

    fn stop(&mut self) {
        let mut state = lock_state(&self.state);
        if let Some(voice) = state.voices.get_mut(&self.id) {
            voice.stopped = true;
        }
    }
}
