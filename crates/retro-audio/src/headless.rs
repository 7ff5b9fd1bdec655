//! 无设备后端.
//!
//! 不接触任何硬件, 由调用方主动驱动回调; 用于测试、基准与 `--headless` 播放.

use log::debug;
use retro_core::{RetroError, RetroResult};

use crate::backend::{AudioBackend, DeviceSpec, OutputDevice};
use crate::callback::StreamCallback;

/// 无设备后端
///
/// 默认完全接受请求的参数; 可强制设备采样率或声道数以模拟协商结果.
#[derive(Debug, Clone, Default)]
pub struct HeadlessBackend {
    forced_freq: Option<u32>,
    forced_channels: Option<u16>,
    unavailable: bool,
}

impl HeadlessBackend {
    /// 强制设备采样率
    pub fn with_freq(mut self, freq: u32) -> Self {
        self.forced_freq = Some(freq);
        self
    }

    /// 强制设备声道数
    pub fn with_channels(mut self, channels: u16) -> Self {
        self.forced_channels = Some(channels);
        self
    }

    /// 模拟无可用设备
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }
}

impl AudioBackend for HeadlessBackend {
    type Device = HeadlessDevice;

    fn open_playback(
        &mut self,
        desired: &DeviceSpec,
        callback: StreamCallback,
    ) -> RetroResult<HeadlessDevice> {
        if self.unavailable {
            return Err(RetroError::Device("无可用的音频输出设备".into()));
        }
        let spec = DeviceSpec {
            freq: self.forced_freq.unwrap_or(desired.freq),
            channels: self.forced_channels.unwrap_or(desired.channels),
            buffer_frames: desired.buffer_frames,
        };
        debug!(
            "打开无设备输出: {} Hz, {} 声道, {} 帧",
            spec.freq, spec.channels, spec.buffer_frames
        );
        Ok(HeadlessDevice {
            spec,
            callback,
            paused: true,
        })
    }
}

/// 由调用方驱动的输出设备
pub struct HeadlessDevice {
    spec: DeviceSpec,
    callback: StreamCallback,
    paused: bool,
}

impl HeadlessDevice {
    /// 请求 `frames` 个采样帧, 返回交错 PCM
    pub fn render(&mut self, frames: usize) -> Vec<i16> {
        let mut out = vec![0; frames * usize::from(self.spec.channels)];
        self.render_into(&mut out);
        out
    }

    /// 以一次回调填满 out; 设备暂停时输出静音且不调用回调
    pub fn render_into(&mut self, out: &mut [i16]) {
        if self.paused {
            out.fill(0);
        } else {
            self.callback.fill(out);
        }
    }

    /// 一个设备缓冲周期的交错采样数
    pub fn period_samples(&self) -> usize {
        usize::from(self.spec.buffer_frames) * usize::from(self.spec.channels)
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

impl OutputDevice for HeadlessDevice {
    fn spec(&self) -> DeviceSpec {
        self.spec
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn resume(&mut self) {
        self.paused = false;
    }
}
