//! 合成 MP3 流构造器.
//!
//! 生成合法的 MPEG-1 / MPEG-2 LSF Layer III 帧, 用于测试、基准与演示音源.
//! 每帧的主数据都自包含 (main_data_begin = 0), 不使用比特储备库.
//! 可选联合立体声 (MS / 强度) 与短块、混合块, 覆盖解码器的各条路径.

use retro_core::bitwriter::BitWriter;
use retro_core::crc::mpeg_audio_crc;
use retro_core::{RetroError, RetroResult};

use super::side_info::BLOCK_SHORT;
use super::tables::{BASE_SAMPLE_RATES, BITRATES};

/// 单个颗粒声道的频谱内容
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Content {
    Silence,
    /// 在指定频点放置一个量化值 1
    Tone { line: usize, global_gain: u8 },
}

/// 颗粒的块划分
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlockLayout {
    /// 长块
    #[default]
    Long,
    /// 纯短块, 子块增益依次为 0 / 1 / 2
    Short,
    /// 混合块: 低两个子带为长块, 其余为短块
    Mixed,
}

/// 立体声编码方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StereoCoding {
    /// 普通立体声, 两声道内容相同
    #[default]
    Plain,
    /// 联合立体声
    ///
    /// 开启强度立体声时, 右声道单音放在 `line / 4`, 其上的比例因子带全部按强度编码.
    Joint { ms: bool, intensity: bool },
}

/// Layer III 合成流构造器
#[derive(Debug, Clone)]
pub struct StreamBuilder {
    lsf: bool,
    sample_rate_index: u8,
    bitrate_index: u8,
    stereo: bool,
    coding: StereoCoding,
    layout: BlockLayout,
    crc: bool,
    out: Vec<u8>,
}

impl StreamBuilder {
    /// 创建构造器
    ///
    /// 44100 / 48000 / 32000 生成 MPEG-1 帧, 22050 / 24000 / 16000 生成 MPEG-2 LSF 帧.
    pub fn new(sample_rate: u32, stereo: bool) -> RetroResult<Self> {
        let (lsf, index) = match BASE_SAMPLE_RATES.iter().position(|&r| r == sample_rate) {
            Some(index) => (false, index),
            None => BASE_SAMPLE_RATES
                .iter()
                .position(|&r| r / 2 == sample_rate)
                .map(|index| (true, index))
                .ok_or_else(|| {
                    RetroError::InvalidArgument(format!("不支持的采样率: {sample_rate}"))
                })?,
        };
        Ok(Self {
            lsf,
            sample_rate_index: index as u8,
            bitrate_index: 9,
            stereo,
            coding: StereoCoding::Plain,
            layout: BlockLayout::Long,
            crc: false,
            out: Vec::new(),
        })
    }

    /// 设置码率索引 (1..=14, 默认 9: MPEG-1 为 128 kbps, LSF 为 80 kbps)
    pub fn bitrate_index(mut self, index: u8) -> RetroResult<Self> {
        if !(1..=14).contains(&index) {
            return Err(RetroError::InvalidArgument(format!("无效的码率索引: {index}")));
        }
        self.bitrate_index = index;
        Ok(self)
    }

    /// 是否写入 CRC 校验字
    pub fn with_crc(mut self, crc: bool) -> Self {
        self.crc = crc;
        self
    }

    /// 设置立体声编码方式, 单声道流不接受联合立体声
    pub fn stereo_coding(mut self, coding: StereoCoding) -> RetroResult<Self> {
        if !self.stereo && coding != StereoCoding::Plain {
            return Err(RetroError::InvalidArgument(
                "单声道流不能使用联合立体声".to_string(),
            ));
        }
        self.coding = coding;
        Ok(self)
    }

    /// 设置块划分
    pub fn block_layout(mut self, layout: BlockLayout) -> Self {
        self.layout = layout;
        self
    }

    /// 采样率
    pub fn sample_rate(&self) -> u32 {
        let base = BASE_SAMPLE_RATES[usize::from(self.sample_rate_index)];
        if self.lsf { base / 2 } else { base }
    }

    /// 单帧字节数
    pub fn frame_len(&self) -> usize {
        let row = usize::from(self.lsf);
        let bitrate = BITRATES[row][usize::from(self.bitrate_index)] * 1000;
        let coeff = if self.lsf { 72 } else { 144 };
        (coeff * bitrate / self.sample_rate()) as usize
    }

    /// 已写入字节数
    pub fn len(&self) -> usize {
        self.out.len()
    }

    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    /// 追加 `frames` 个静音帧
    pub fn push_silence(&mut self, frames: usize) -> &mut Self {
        for _ in 0..frames {
            self.push_frame(Content::Silence);
        }
        self
    }

    /// 追加 `frames` 个单音帧
    ///
    /// `line` 为 0..576 的频点下标, 长块时对应频率约为 `line * fs / 1152`.
    /// `global_gain` 为 210 时量化值 1 反量化为 1.0, 每减 4 衰减一半.
    /// 频点过高而主数据放不下时, 会被压到帧容量允许的最大值.
    pub fn push_tone(&mut self, frames: usize, line: usize, global_gain: u8) -> &mut Self {
        let line = line.min(575).min(self.max_tone_line());
        for _ in 0..frames {
            self.push_frame(Content::Tone { line, global_gain });
        }
        self
    }

    /// 追加任意字节 (用于构造损坏数据)
    pub fn push_garbage(&mut self, bytes: &[u8]) -> &mut Self {
        self.out.extend_from_slice(bytes);
        self
    }

    /// 取出构造结果
    pub fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.out)
    }

    fn channels(&self) -> usize {
        if self.stereo { 2 } else { 1 }
    }

    fn granules(&self) -> usize {
        if self.lsf { 1 } else { 2 }
    }

    fn side_info_len(&self) -> usize {
        match (self.lsf, self.stereo) {
            (false, false) => 17,
            (false, true) => 32,
            (true, false) => 9,
            (true, true) => 17,
        }
    }

    /// 主数据容量允许的最高单音频点
    fn max_tone_line(&self) -> usize {
        let overhead = 4 + self.side_info_len() + if self.crc { 2 } else { 0 };
        let budget = (self.frame_len() - overhead) * 8 / (self.granules() * self.channels());
        // 每个颗粒声道占 line / 2 + 4 比特
        2 * budget.saturating_sub(4)
    }

    /// 各声道的频谱内容
    fn channel_contents(&self, content: Content) -> [Content; 2] {
        match (self.coding, content) {
            (StereoCoding::Joint { intensity: true, .. }, Content::Tone { line, global_gain }) => [
                content,
                Content::Tone {
                    line: line / 4,
                    global_gain,
                },
            ],
            _ => [content; 2],
        }
    }

    fn mode_byte(&self) -> u8 {
        match self.coding {
            _ if !self.stereo => 0xC0,
            StereoCoding::Plain => 0x00,
            StereoCoding::Joint { ms, intensity } => {
                0x40 | (u8::from(ms) << 5) | (u8::from(intensity) << 4)
            }
        }
    }

    fn push_frame(&mut self, content: Content) {
        let nch = self.channels();
        let frame_len = self.frame_len();
        let contents = self.channel_contents(content);

        let version_bits = if self.lsf { 0xF2 } else { 0xFA };
        let header = [
            0xFF,
            version_bits | u8::from(!self.crc),
            (self.bitrate_index << 4) | (self.sample_rate_index << 2),
            self.mode_byte(),
        ];

        let mut main = BitWriter::new();
        let mut part2_3_length = [0; 2];
        for _ in 0..self.granules() {
            for ch in 0..nch {
                part2_3_length[ch] = write_main_data(&mut main, contents[ch]);
            }
        }
        let main = main.finish();

        let mut si = BitWriter::new();
        if self.lsf {
            si.write_bits(0, 8);
            si.write_bits(0, if nch == 1 { 1 } else { 2 });
        } else {
            si.write_bits(0, 9);
            si.write_bits(0, if nch == 1 { 5 } else { 3 });
            si.write_bits(0, 4 * nch as u32);
        }
        for _ in 0..self.granules() {
            for ch in 0..nch {
                self.write_granule_side_info(&mut si, contents[ch], part2_3_length[ch]);
            }
        }
        let si = si.finish();

        let start = self.out.len();
        self.out.extend_from_slice(&header);
        if self.crc {
            let crc = mpeg_audio_crc(&header, &si);
            self.out.extend_from_slice(&crc.to_be_bytes());
        }
        self.out.extend_from_slice(&si);
        self.out.extend_from_slice(&main);
        self.out.resize(start + frame_len, 0);
    }

    fn write_granule_side_info(&self, bw: &mut BitWriter, content: Content, part2_3_length: usize) {
        let (big_values, global_gain, table) = match content {
            Content::Silence => (0, 0, 0),
            Content::Tone { line, global_gain } => (line / 2 + 1, u32::from(global_gain), 1),
        };
        bw.write_bits(part2_3_length as u32, 12);
        bw.write_bits(big_values as u32, 9);
        bw.write_bits(global_gain, 8);
        // scalefac_compress = 0: 比例因子不占比特
        bw.write_bits(0, if self.lsf { 9 } else { 4 });
        match self.layout {
            BlockLayout::Long => {
                bw.write_bit(false);
                for _ in 0..3 {
                    bw.write_bits(table, 5);
                }
                // region0_count = 15, region1_count = 7: 全部落在 region0/1
                bw.write_bits(15, 4);
                bw.write_bits(7, 3);
            }
            BlockLayout::Short | BlockLayout::Mixed => {
                bw.write_bit(true);
                bw.write_bits(u32::from(BLOCK_SHORT), 2);
                bw.write_bit(self.layout == BlockLayout::Mixed);
                for _ in 0..2 {
                    bw.write_bits(table, 5);
                }
                for gain in 0..3 {
                    bw.write_bits(gain, 3);
                }
            }
        }
        // preflag (LSF 由 scalefac_compress 隐含)
        if !self.lsf {
            bw.write_bit(false);
        }
        // scalefac_scale, count1table_select
        bw.write_bit(false);
        bw.write_bit(false);
    }
}

/// 写入一个颗粒声道的 Huffman 数据, 返回 part2_3_length
fn write_main_data(bw: &mut BitWriter, content: Content) -> usize {
    let begin = bw.bits_written();
    match content {
        Content::Silence => 0,
        Content::Tone { line, .. } => {
            // 码表 1: (0,0)=1, (1,0)=01, (0,1)=001
            for _ in 0..line / 2 {
                bw.write_bit(true);
            }
            if line % 2 == 0 {
                bw.write_bits(0b01, 2);
            } else {
                bw.write_bits(0b001, 3);
            }
            // 符号位: 正
            bw.write_bit(false);
            bw.bits_written() - begin
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp3::header::{ChannelMode, FrameHeader, MpegVersion};
    use crate::mp3::side_info::SideInfo;

    #[test]
    fn test_frame_len_matches_header() {
        let mut builder = StreamBuilder::new(44100, false).unwrap();
        builder.push_silence(3);
        let bytes = builder.finish();
        assert_eq!(bytes.len(), 3 * 417);
        let header = FrameHeader::parse(&bytes).unwrap();
        assert_eq!(header.frame_len(), 417);
        assert_eq!(header.channels(), 1);
        assert!(!header.protected);
    }

    #[test]
    fn test_stereo_crc_header() {
        let mut builder = StreamBuilder::new(48000, true)
            .unwrap()
            .bitrate_index(5)
            .unwrap()
            .with_crc(true);
        builder.push_tone(1, 40, 200);
        let bytes = builder.finish();
        let header = FrameHeader::parse(&bytes).unwrap();
        assert_eq!(header.sample_rate, 48000);
        assert_eq!(header.bitrate, 64000);
        assert_eq!(header.channels(), 2);
        assert!(header.protected);
        assert_eq!(bytes.len(), header.frame_len());
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        assert!(StreamBuilder::new(11025, false).is_err());
        assert!(StreamBuilder::new(8000, true).is_err());
        let builder = StreamBuilder::new(32000, false).unwrap();
        assert!(builder.clone().bitrate_index(0).is_err());
        assert!(builder.clone().bitrate_index(15).is_err());
        let joint = StereoCoding::Joint {
            ms: true,
            intensity: false,
        };
        assert!(builder.stereo_coding(joint).is_err());
    }

    #[test]
    fn test_lsf_frames() {
        let mut builder = StreamBuilder::new(22050, true).unwrap().with_crc(true);
        assert_eq!(builder.sample_rate(), 22050);
        builder.push_tone(2, 30, 200);
        let bytes = builder.finish();
        let header = FrameHeader::parse(&bytes).unwrap();
        assert_eq!(header.version, MpegVersion::Mpeg2);
        assert_eq!(header.sample_rate, 22050);
        assert_eq!(header.bitrate, 80000);
        assert_eq!(header.granules(), 1);
        assert_eq!(header.side_info_len(), 17);
        assert!(header.protected);
        // 72 * 80000 / 22050 = 261
        assert_eq!(header.frame_len(), 261);
        assert_eq!(bytes.len(), 2 * 261);
    }

    #[test]
    fn test_joint_stereo_header_and_blocks() {
        let mut builder = StreamBuilder::new(44100, true)
            .unwrap()
            .stereo_coding(StereoCoding::Joint {
                ms: true,
                intensity: true,
            })
            .unwrap()
            .block_layout(BlockLayout::Mixed);
        builder.push_tone(1, 64, 200);
        let bytes = builder.finish();
        let header = FrameHeader::parse(&bytes).unwrap();
        assert_eq!(header.mode, ChannelMode::JointStereo);
        assert!(header.ms_stereo());
        assert!(header.intensity_stereo());

        let si_start = header.main_data_offset() - header.side_info_len();
        let si = SideInfo::parse(&bytes[si_start..], &header).unwrap();
        let left = &si.granules[0][0];
        let right = &si.granules[0][1];
        assert!(left.is_short() && left.mixed_block);
        assert_eq!(left.subblock_gain, [0, 1, 2]);
        assert_eq!(left.big_values, 33);
        assert_eq!(right.big_values, 9);
        assert_eq!(si.granules[1][0], *left);
    }
}
