//! Layer III 帧头解析.

use super::error::StreamErrorKind;
use super::tables::{BASE_SAMPLE_RATES, BITRATES};

/// 帧头字节数
pub const HEADER_LEN: usize = 4;

/// MPEG 版本
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpegVersion {
    Mpeg1,
    Mpeg2,
    Mpeg25,
}

impl MpegVersion {
    /// 是否为低采样率扩展 (MPEG-2 / MPEG-2.5)
    pub fn is_lsf(self) -> bool {
        self != Self::Mpeg1
    }
}

/// 声道模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Stereo,
    JointStereo,
    DualChannel,
    Mono,
}

/// 已解析的帧头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: MpegVersion,
    /// 是否携带 CRC
    pub protected: bool,
    /// 码率 (bps)
    pub bitrate: u32,
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 采样率序号 (0..9), 对应比例因子带表
    pub sample_rate_index: usize,
    pub padding: bool,
    pub mode: ChannelMode,
    pub mode_extension: u8,
    pub emphasis: u8,
}

impl FrameHeader {
    /// 解析帧头
    ///
    /// 仅接受 Layer III; 自由格式码率与保留值均视为可恢复错误.
    pub fn parse(bytes: &[u8]) -> Result<Self, StreamErrorKind> {
        let [b0, b1, b2, b3] = match bytes.get(..HEADER_LEN) {
            Some(&[b0, b1, b2, b3]) => [b0, b1, b2, b3],
            _ => return Err(StreamErrorKind::LostSync),
        };
        if b0 != 0xFF || b1 & 0xE0 != 0xE0 {
            return Err(StreamErrorKind::LostSync);
        }

        let version = match (b1 >> 3) & 0x03 {
            0 => MpegVersion::Mpeg25,
            2 => MpegVersion::Mpeg2,
            3 => MpegVersion::Mpeg1,
            _ => return Err(StreamErrorKind::LostSync),
        };
        if (b1 >> 1) & 0x03 != 0x01 {
            return Err(StreamErrorKind::BadLayer);
        }
        let protected = b1 & 0x01 == 0;

        let bitrate_index = usize::from(b2 >> 4);
        if bitrate_index == 0 || bitrate_index == 15 {
            return Err(StreamErrorKind::BadBitrate);
        }
        let sr_index = usize::from((b2 >> 2) & 0x03);
        if sr_index == 3 {
            return Err(StreamErrorKind::BadSampleRate);
        }
        let emphasis = b3 & 0x03;
        if emphasis == 2 {
            return Err(StreamErrorKind::BadEmphasis);
        }

        let (bitrate_row, rate_shift, index_base) = match version {
            MpegVersion::Mpeg1 => (0, 0, 0),
            MpegVersion::Mpeg2 => (1, 1, 3),
            MpegVersion::Mpeg25 => (1, 2, 6),
        };

        let mode = match b3 >> 6 {
            0 => ChannelMode::Stereo,
            1 => ChannelMode::JointStereo,
            2 => ChannelMode::DualChannel,
            _ => ChannelMode::Mono,
        };

        Ok(Self {
            version,
            protected,
            bitrate: BITRATES[bitrate_row][bitrate_index] * 1000,
            sample_rate: BASE_SAMPLE_RATES[sr_index] >> rate_shift,
            sample_rate_index: index_base + sr_index,
            padding: (b2 >> 1) & 0x01 == 1,
            mode,
            mode_extension: (b3 >> 4) & 0x03,
            emphasis,
        })
    }

    /// 声道数
    pub fn channels(&self) -> usize {
        if self.mode == ChannelMode::Mono { 1 } else { 2 }
    }

    /// 每帧颗粒数
    pub fn granules(&self) -> usize {
        if self.version.is_lsf() { 1 } else { 2 }
    }

    /// 每声道采样数
    pub fn samples_per_frame(&self) -> usize {
        self.granules() * 576
    }

    /// 帧总字节数 (含帧头)
    pub fn frame_len(&self) -> usize {
        let coeff = if self.version.is_lsf() { 72 } else { 144 };
        (coeff * self.bitrate / self.sample_rate) as usize + usize::from(self.padding)
    }

    /// 边信息字节数
    pub fn side_info_len(&self) -> usize {
        match (self.version.is_lsf(), self.channels()) {
            (false, 1) => 17,
            (false, _) => 32,
            (true, 1) => 9,
            (true, _) => 17,
        }
    }

    /// 主数据在帧内的起始偏移
    pub fn main_data_offset(&self) -> usize {
        HEADER_LEN + if self.protected { 2 } else { 0 } + self.side_info_len()
    }

    /// 是否启用 MS 立体声
    pub fn ms_stereo(&self) -> bool {
        self.mode == ChannelMode::JointStereo && self.mode_extension & 0x02 != 0
    }

    /// 是否启用强度立体声
    pub fn intensity_stereo(&self) -> bool {
        self.mode == ChannelMode::JointStereo && self.mode_extension & 0x01 != 0
    }

    /// 判断另一帧头能否作为同一流的后继帧
    pub fn is_compatible(&self, other: &FrameHeader) -> bool {
        self.version == other.version && self.sample_rate == other.sample_rate
    }
}
