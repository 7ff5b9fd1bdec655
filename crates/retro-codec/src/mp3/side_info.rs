//! 边信息 (Side Information) 解析.

use super::bitreader::BitReader;
use super::error::StreamErrorKind;
use super::header::FrameHeader;
use super::tables::SFB_BANDS;

/// 长块
pub const BLOCK_NORMAL: u8 = 0;
/// 起始块
pub const BLOCK_START: u8 = 1;
/// 短块
pub const BLOCK_SHORT: u8 = 2;
/// 结束块
pub const BLOCK_STOP: u8 = 3;

/// 单个颗粒内单个声道的编码参数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GranuleChannel {
    pub part2_3_length: usize,
    pub big_values: usize,
    pub global_gain: u32,
    pub scalefac_compress: u32,
    pub window_switching: bool,
    pub block_type: u8,
    pub mixed_block: bool,
    pub table_select: [u8; 3],
    pub subblock_gain: [u8; 3],
    /// region1 的起始频点
    pub region1_start: usize,
    /// region2 的起始频点
    pub region2_start: usize,
    pub preflag: bool,
    pub scalefac_scale: bool,
    pub count1table_select: bool,
}

impl GranuleChannel {
    /// 是否为纯短块或混合块中的短块部分
    pub fn is_short(&self) -> bool {
        self.window_switching && self.block_type == BLOCK_SHORT
    }
}

/// 一帧的边信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SideInfo {
    pub main_data_begin: usize,
    /// [声道][组], 仅 MPEG-1
    pub scfsi: [[bool; 4]; 2],
    /// [颗粒][声道]
    pub granules: [[GranuleChannel; 2]; 2],
}

impl SideInfo {
    /// 从帧内边信息字节解析
    pub fn parse(data: &[u8], header: &FrameHeader) -> Result<Self, StreamErrorKind> {
        let lsf = header.version.is_lsf();
        let nch = header.channels();
        let bands = &SFB_BANDS[header.sample_rate_index];
        let mut br = BitReader::new(data);
        let mut si = SideInfo::default();

        if lsf {
            si.main_data_begin = br.read_bits(8) as usize;
            br.read_bits(if nch == 1 { 1 } else { 2 });
        } else {
            si.main_data_begin = br.read_bits(9) as usize;
            br.read_bits(if nch == 1 { 5 } else { 3 });
            for ch in 0..nch {
                for band in 0..4 {
                    si.scfsi[ch][band] = br.read_bit();
                }
            }
        }

        for gr in 0..header.granules() {
            for ch in 0..nch {
                let gc = &mut si.granules[gr][ch];
                gc.part2_3_length = br.read_bits(12) as usize;
                gc.big_values = br.read_bits(9) as usize;
                if gc.big_values > 288 {
                    return Err(StreamErrorKind::BadBigValues);
                }
                gc.global_gain = br.read_bits(8);
                gc.scalefac_compress = br.read_bits(if lsf { 9 } else { 4 });
                gc.window_switching = br.read_bit();

                if gc.window_switching {
                    gc.block_type = br.read_bits(2) as u8;
                    if gc.block_type == BLOCK_NORMAL {
                        return Err(StreamErrorKind::BadBlockType);
                    }
                    gc.mixed_block = br.read_bit();
                    gc.table_select[0] = br.read_bits(5) as u8;
                    gc.table_select[1] = br.read_bits(5) as u8;
                    for gain in gc.subblock_gain.iter_mut() {
                        *gain = br.read_bits(3) as u8;
                    }
                    // 窗口切换时 region 边界为隐式值, region2 为空
                    gc.region1_start = if gc.block_type == BLOCK_SHORT && !gc.mixed_block {
                        usize::from(bands.short[3]) * 3
                    } else {
                        usize::from(bands.long[8])
                    };
                    gc.region2_start = 576;
                } else {
                    for sel in gc.table_select.iter_mut() {
                        *sel = br.read_bits(5) as u8;
                    }
                    let region0_count = br.read_bits(4) as usize;
                    let region1_count = br.read_bits(3) as usize;
                    gc.region1_start = usize::from(bands.long[(region0_count + 1).min(22)]);
                    gc.region2_start =
                        usize::from(bands.long[(region0_count + region1_count + 2).min(22)]);
                }

                gc.preflag = if lsf {
                    gc.scalefac_compress >= 500
                } else {
                    br.read_bit()
                };
                gc.scalefac_scale = br.read_bit();
                gc.count1table_select = br.read_bit();
            }
        }

        Ok(si)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retro_core::bitwriter::BitWriter;

    fn mono_header() -> FrameHeader {
        FrameHeader::parse(&[0xFF, 0xFB, 0x90, 0xC0]).unwrap()
    }

    fn write_long_granule(bw: &mut BitWriter, big_values: u32) {
        bw.write_bits(100, 12);
        bw.write_bits(big_values, 9);
        bw.write_bits(180, 8);
        bw.write_bits(5, 4);
        bw.write_bit(false);
        bw.write_bits(1, 5);
        bw.write_bits(2, 5);
        bw.write_bits(3, 5);
        bw.write_bits(3, 4);
        bw.write_bits(2, 3);
        bw.write_bit(true);
        bw.write_bit(false);
        bw.write_bit(true);
    }

    #[test]
    fn test_parse_mpeg1_mono_long_blocks() {
        let mut bw = BitWriter::new();
        bw.write_bits(0x1AB, 9);
        bw.write_bits(0, 5);
        bw.write_bits(0b1010, 4);
        write_long_granule(&mut bw, 10);
        write_long_granule(&mut bw, 20);
        let data = bw.finish();
        assert_eq!(data.len(), 17);

        let si = SideInfo::parse(&data, &mono_header()).unwrap();
        assert_eq!(si.main_data_begin, 0x1AB);
        assert_eq!(si.scfsi[0], [true, false, true, false]);
        let gc = &si.granules[1][0];
        assert_eq!(gc.part2_3_length, 100);
        assert_eq!(gc.big_values, 20);
        assert_eq!(gc.global_gain, 180);
        assert_eq!(gc.table_select, [1, 2, 3]);
        // 44100 Hz: region0_count=3 -> long[4]=16, region0+region1+2=7 -> long[7]=30
        assert_eq!(gc.region1_start, 16);
        assert_eq!(gc.region2_start, 30);
        assert!(gc.preflag);
        assert!(gc.count1table_select);
    }

    #[test]
    fn test_reject_big_values_overflow() {
        let mut bw = BitWriter::new();
        bw.write_bits(0, 18);
        write_long_granule(&mut bw, 289);
        write_long_granule(&mut bw, 0);
        let data = bw.finish();
        assert_eq!(
            SideInfo::parse(&data, &mono_header()),
            Err(StreamErrorKind::BadBigValues)
        );
    }

    #[test]
    fn test_short_block_implicit_regions() {
        let mut bw = BitWriter::new();
        bw.write_bits(0, 18);
        for _ in 0..2 {
            bw.write_bits(0, 12 + 9 + 8);
            bw.write_bits(0, 4);
            bw.write_bit(true);
            bw.write_bits(u32::from(BLOCK_SHORT), 2);
            bw.write_bit(false);
            bw.write_bits(0, 10 + 9);
            bw.write_bits(0, 3);
        }
        let data = bw.finish();
        let si = SideInfo::parse(&data, &mono_header()).unwrap();
        let gc = &si.granules[0][0];
        assert!(gc.is_short());
        assert_eq!(gc.region1_start, 36);
        assert_eq!(gc.region2_start, 576);
    }

    #[test]
    fn test_reject_switching_with_normal_block() {
        let mut bw = BitWriter::new();
        bw.write_bits(0, 18);
        bw.write_bits(0, 12 + 9 + 8);
        bw.write_bits(0, 4);
        bw.write_bit(true);
        bw.write_bits(0, 2);
        bw.write_bits(0, 20);
        bw.write_bits(0, 20);
        let data = bw.finish();
        assert_eq!(
            SideInfo::parse(&data, &mono_header()),
            Err(StreamErrorKind::BadBlockType)
        );
    }
}
