//! SDL2 音频后端.
//!
//! SDL 在自己的音频线程上按设备缓冲周期拉取 16 位交错采样.

use log::info;
use retro_audio::{AudioBackend, DeviceSpec, OutputDevice, StreamCallback};
use retro_core::{RetroError, RetroResult};
use sdl2::AudioSubsystem;
use sdl2::audio::{AudioCallback, AudioDevice, AudioSpecDesired};

/// 把播放器回调适配为 SDL 回调
pub struct SdlCallback(StreamCallback);

impl AudioCallback for SdlCallback {
    type Channel = i16;

    fn callback(&mut self, out: &mut [i16]) {
        self.0.fill(out);
    }
}

/// SDL2 音频后端
#[derive(Clone)]
pub struct SdlBackend {
    audio: AudioSubsystem,
}

impl SdlBackend {
    pub fn new(audio: AudioSubsystem) -> Self {
        Self { audio }
    }
}

impl AudioBackend for SdlBackend {
    type Device = SdlDevice;

    fn open_playback(
        &mut self,
        desired: &DeviceSpec,
        callback: StreamCallback,
    ) -> RetroResult<SdlDevice> {
        let freq = i32::try_from(desired.freq)
            .map_err(|_| RetroError::InvalidArgument(format!("采样率越界: {}", desired.freq)))?;
        let channels = u8::try_from(desired.channels).map_err(|_| {
            RetroError::InvalidArgument(format!("声道数越界: {}", desired.channels))
        })?;
        let spec = AudioSpecDesired {
            freq: Some(freq),
            channels: Some(channels),
            samples: Some(desired.buffer_frames),
        };
        let device = self
            .audio
            .open_playback(None, &spec, |_| SdlCallback(callback))
            .map_err(RetroError::Device)?;
        let obtained = device.spec();
        info!(
            "SDL 音频设备已打开: {} Hz, {} 声道, {} 帧",
            obtained.freq, obtained.channels, obtained.samples
        );
        Ok(SdlDevice { device })
    }
}

/// SDL 播放设备, 释放时关闭设备
pub struct SdlDevice {
    device: AudioDevice<SdlCallback>,
}

impl OutputDevice for SdlDevice {
    fn spec(&self) -> DeviceSpec {
        let spec = self.device.spec();
        DeviceSpec {
            freq: u32::try_from(spec.freq).unwrap_or(0),
            channels: u16::from(spec.channels),
            buffer_frames: spec.samples,
        }
    }

    fn pause(&mut self) {
        self.device.pause();
    }

    fn resume(&mut self) {
        self.device.resume();
    }
}
