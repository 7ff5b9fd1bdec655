//! 帧解码器 (Frame Decoder).
//!
//! 从输入缓冲中定位并解析下一帧, 输出两颗粒两声道的定点子带采样.

use log::trace;
use retro_core::crc::mpeg_audio_crc;
use retro_core::fixed::Fixed;

use super::bitreader::BitReader;
use super::error::{StreamError, StreamErrorKind};
use super::header::{ChannelMode, FrameHeader, HEADER_LEN, MpegVersion};
use super::huffman::decode_spectrum;
use super::hybrid::{self, HybridSynth, SBLIMIT, SLOTS};
use super::input::InputBuffer;
use super::requantize::requantize;
use super::reservoir::BitReservoir;
use super::scalefactor::{self, ScaleFactors};
use super::side_info::{GranuleChannel, SideInfo};
use super::stereo;
use super::tables::SFB_BANDS;

/// 每帧最大时间槽数 (MPEG-1: 2 颗粒 x 18)
pub const MAX_SLOTS: usize = 2 * SLOTS;

/// 一帧解码结果
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FrameHeader,
    /// 子带采样 [声道][时间槽][子带]
    pub sbsample: [[[Fixed; SBLIMIT]; MAX_SLOTS]; 2],
}

impl Frame {
    pub fn new(header: FrameHeader) -> Self {
        Self {
            header,
            sbsample: [[[0; SBLIMIT]; MAX_SLOTS]; 2],
        }
    }

    /// 本帧时间槽数
    pub fn slots(&self) -> usize {
        self.header.granules() * SLOTS
    }
}

/// 频谱阶段的工作区
struct Scratch {
    quantized: [[i32; 576]; 2],
    xr: [[Fixed; 576]; 2],
    slots: [[Fixed; SBLIMIT]; SLOTS],
}

/// 帧解码器
///
/// 帧之间保留比特储备库、比例因子 (scfsi 复用) 与 IMDCT 重叠缓冲.
pub struct FrameDecoder {
    frame: Frame,
    reservoir: BitReservoir,
    hybrid: HybridSynth,
    scalefactors: [ScaleFactors; 2],
    scratch: Box<Scratch>,
    /// 是否已与流同步 (连续两个帧头确认)
    synced: bool,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        let placeholder = FrameHeader {
            version: MpegVersion::Mpeg1,
            protected: false,
            bitrate: 0,
            sample_rate: 44100,
            sample_rate_index: 0,
            padding: false,
            mode: ChannelMode::Mono,
            mode_extension: 0,
            emphasis: 0,
        };
        Self {
            frame: Frame::new(placeholder),
            reservoir: BitReservoir::new(),
            hybrid: HybridSynth::new(),
            scalefactors: [ScaleFactors::default(); 2],
            scratch: Box::new(Scratch {
                quantized: [[0; 576]; 2],
                xr: [[0; 576]; 2],
                slots: [[0; SBLIMIT]; SLOTS],
            }),
            synced: false,
        }
    }

    /// 清空帧间状态, 用于从头重新解码
    pub fn reset(&mut self) {
        self.reservoir.clear();
        self.hybrid.reset();
        self.scalefactors = [ScaleFactors::default(); 2];
        self.synced = false;
    }

    /// 是否已与流同步
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// 解码下一帧
    ///
    /// - `Err(BufLen)`: 需要补充输入后以同样方式重试
    /// - `Err(Recoverable)`: 已跳过出错数据, 直接重试即可
    pub fn decode_next_frame(&mut self, input: &mut InputBuffer) -> Result<&Frame, StreamError> {
        let data = input.data();
        let available = data.len();
        if available < HEADER_LEN {
            return Err(StreamError::BufLen);
        }

        if !is_sync(data) {
            self.synced = false;
            return match data[1..].windows(2).position(is_sync) {
                Some(p) => {
                    input.consume(p + 1);
                    Err(StreamError::Recoverable(StreamErrorKind::LostSync))
                }
                None => {
                    // 保留最后一个字节, 它可能是下一个同步字的开头
                    input.consume(available - 1);
                    Err(StreamError::BufLen)
                }
            };
        }

        let header = match FrameHeader::parse(data) {
            Ok(h) => h,
            Err(kind) => {
                self.synced = false;
                input.consume(1);
                return Err(StreamError::Recoverable(kind));
            }
        };
        let frame_len = header.frame_len();
        if available < frame_len {
            return Err(StreamError::BufLen);
        }

        if !self.synced {
            let next = &data[frame_len..];
            let confirmed = if next.len() < HEADER_LEN {
                if !input.is_eof() {
                    return Err(StreamError::BufLen);
                }
                true
            } else {
                match FrameHeader::parse(next) {
                    Ok(h) => header.is_compatible(&h),
                    // 末帧之后只剩保护区
                    Err(_) => input.is_eof() && frame_len >= input.payload_len(),
                }
            };
            if !confirmed {
                input.consume(1);
                return Err(StreamError::Recoverable(StreamErrorKind::LostSync));
            }
            self.synced = true;
        }

        let result = self.decode_frame_body(&header, &data[..frame_len]);
        input.consume(frame_len);
        match result {
            Ok(()) => {
                trace!(
                    "解码帧: {} Hz, {} 声道, {} bps",
                    header.sample_rate,
                    header.channels(),
                    header.bitrate
                );
                Ok(&self.frame)
            }
            Err(kind) => Err(StreamError::Recoverable(kind)),
        }
    }

    fn decode_frame_body(
        &mut self,
        header: &FrameHeader,
        bytes: &[u8],
    ) -> Result<(), StreamErrorKind> {
        let si_start = HEADER_LEN + if header.protected { 2 } else { 0 };
        let si_bytes = &bytes[si_start..si_start + header.side_info_len()];

        if header.protected {
            let expected = u16::from_be_bytes([bytes[4], bytes[5]]);
            let head = [bytes[0], bytes[1], bytes[2], bytes[3]];
            if mpeg_audio_crc(&head, si_bytes) != expected {
                return Err(StreamErrorKind::BadCrc);
            }
        }

        let si = SideInfo::parse(si_bytes, header)?;
        let main_data = &bytes[header.main_data_offset()..];
        let data = self.reservoir.assemble(si.main_data_begin, main_data)?;

        let frame = &mut self.frame;
        let hybrid = &mut self.hybrid;
        let scalefactors = &mut self.scalefactors;
        let Scratch {
            quantized,
            xr,
            slots,
        } = &mut *self.scratch;

        let bands = &SFB_BANDS[header.sample_rate_index];
        let lsf = header.version.is_lsf();
        let nch = header.channels();
        let total_bits = data.len() * 8;
        let mut br = BitReader::new(data);

        frame.header = *header;
        for gr in 0..header.granules() {
            let mut granule = [GranuleChannel::default(); 2];
            let mut lens = [0usize; 2];
            for ch in 0..nch {
                let mut gc = si.granules[gr][ch];
                let end = br.position() + gc.part2_3_length;
                if end > total_bits {
                    return Err(StreamErrorKind::BadPart3Len);
                }
                if lsf {
                    let intensity_right = header.intensity_stereo() && ch == 1;
                    gc.preflag =
                        scalefactor::read_lsf(&mut br, &gc, intensity_right, &mut scalefactors[ch]);
                } else {
                    scalefactor::read_mpeg1(&mut br, &gc, &si.scfsi[ch], gr, &mut scalefactors[ch]);
                }
                if br.position() > end {
                    return Err(StreamErrorKind::BadPart3Len);
                }
                lens[ch] = decode_spectrum(&mut br, &gc, end, &mut quantized[ch])?;
                requantize(
                    &quantized[ch],
                    lens[ch],
                    &gc,
                    &scalefactors[ch],
                    bands,
                    lsf,
                    &mut xr[ch],
                );
                granule[ch] = gc;
            }

            if nch == 2 {
                stereo::process(header, &granule, &scalefactors[1], bands, xr, &mut lens)?;
            }

            for ch in 0..nch {
                hybrid::reorder(&mut xr[ch], &granule[ch], bands);
                hybrid::alias_reduce(&mut xr[ch], &granule[ch]);
                hybrid.process(ch, &xr[ch], &granule[ch], slots);
                frame.sbsample[ch][gr * SLOTS..(gr + 1) * SLOTS].copy_from_slice(&slots[..]);
            }
        }
        Ok(())
    }
}

fn is_sync(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] & 0xE0 == 0xE0
}
