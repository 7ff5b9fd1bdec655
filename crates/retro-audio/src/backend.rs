//! 宿主音频子系统接缝.

use retro_core::RetroResult;

use crate::callback::StreamCallback;

/// 输出设备参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSpec {
    /// 采样率 (Hz)
    pub freq: u32,
    /// 声道数
    pub channels: u16,
    /// 每次回调的采样帧数
    pub buffer_frames: u16,
}

/// 已打开的输出设备
///
/// 采样格式固定为本机字节序的 16 位有符号整数.
pub trait OutputDevice {
    /// 设备实际采用的参数
    fn spec(&self) -> DeviceSpec;

    /// 静音设备; 返回后回调保证不再并发执行
    fn pause(&mut self);

    /// 恢复回调
    fn resume(&mut self);
}

/// 音频后端
pub trait AudioBackend {
    type Device: OutputDevice;

    /// 以 `desired` 参数打开播放设备并注册回调
    ///
    /// 新设备处于静音状态, 实际参数可能与请求不同, 由调用方通过 [`OutputDevice::spec`] 协商.
    fn open_playback(
        &mut self,
        desired: &DeviceSpec,
        callback: StreamCallback,
    ) -> RetroResult<Self::Device>;
}
