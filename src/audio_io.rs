use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam::channel::{bounded, Receiver, Sender};

use crate::clock::{AudioClock, ClockState, RenderTarget};
use crate::error::EngineError;

/// Clock backed by the default cpal output device. Resuming opens a stream
/// on a dedicated thread whose callback renders the context.
pub struct CpalClock {
    state: ClockState,
    sample_rate: u32,
    stop: Option<Sender<()>>,
}

impl CpalClock {
    pub fn new() -> Result<Self, EngineError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| EngineError::Device("no output device available".into()))?;
        let config = device
            .default_output_config()
            .map_err(|e| EngineError::Device(e.to_string()))?;
        Ok(Self {
            state: ClockState::Suspended,
            sample_rate: config.sample_rate().0,
            stop: None,
        })
    }
}

impl AudioClock for CpalClock {
    fn state(&self) -> ClockState {
        self.state
    }

    fn resume(&mut self, target: &RenderTarget) -> Result<ClockState, EngineError> {
        if self.state == ClockState::Running {
            return Ok(self.state);
        }
        let (ready_tx, ready_rx) = bounded(1);
        let (stop_tx, stop_rx) = bounded(1);
        let target = target.clone();
        std::thread::spawn(move || run_output_stream(target, ready_tx, stop_rx));
        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.stop = Some(stop_tx);
                self.state = ClockState::Running;
                tracing::info!("output stream running at {} Hz", self.sample_rate);
                Ok(self.state)
            }
            Ok(Err(err)) => {
                self.state = ClockState::Suspended;
                Err(EngineError::audio_unavailable(self.state, err.to_string()))
            }
            Err(_) => {
                self.state = ClockState::Suspended;
                Err(EngineError::audio_unavailable(
                    self.state,
                    "output thread exited before the stream started",
                ))
            }
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn close(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.state = ClockState::Closed;
    }
}

impl Drop for CpalClock {
    fn drop(&mut self) {
        self.close();
    }
}

/// Open the stream, report the outcome on `ready`, then keep the stream
/// alive until `stop` fires or its sender is dropped.
pub fn run_output_stream(
    target: RenderTarget,
    ready: Sender<Result<(), EngineError>>,
    stop: Receiver<()>,
) {
    match open_stream(target) {
        Ok(stream) => {
            let _ = ready.send(Ok(()));
            let _ = stop.recv();
            drop(stream);
            tracing::debug!("output stream closed");
        }
        Err(err) => {
            let _ = ready.send(Err(err));
        }
    }
}

fn open_stream(target: RenderTarget) -> Result<cpal::Stream, EngineError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| EngineError::Device("no output device available".into()))?;
    let supported = device
        .default_output_config()
        .map_err(|e| EngineError::Device(e.to_string()))?;
    if supported.sample_format() != SampleFormat::F32 {
        return Err(EngineError::Device(format!(
            "unsupported sample format {:?}",
            supported.sample_format()
        )));
    }
    let config: StreamConfig = supported.into();
    let channels = config.channels as usize;

    let mut stereo = Vec::new();
    let audio_callback = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        stereo.resize(data.len() / channels * 2, 0.0);
        match target.upgrade() {
            Some(ctx) => ctx.render(&mut stereo),
            None => stereo.fill(0.0),
        }
        write_frames(data, &stereo, channels);
    };
    let err_fn = |err: cpal::StreamError| tracing::warn!("stream error: {err}");

    let stream = device
        .build_output_stream(&config, audio_callback, err_fn, None)
        .map_err(|e| EngineError::Device(e.to_string()))?;
    stream.play().map_err(|e| EngineError::Device(e.to_string()))?;
    Ok(stream)
}

/// Spread interleaved stereo over a device with `channels` outputs. Mono
/// devices get the average; extra channels stay silent.
pub fn write_frames(out: &mut [f32], stereo: &[f32], channels: usize) {
    for (frame, lr) in out.chunks_exact_mut(channels).zip(stereo.chunks_exact(2)) {
        if channels == 1 {
            frame[0] = 0.5 * (lr[0] + lr[1]);
        } else {
            frame[0] = lr[0];
            frame[1] = lr[1];
            frame[2..].fill(0.0);
        }
    }
}
