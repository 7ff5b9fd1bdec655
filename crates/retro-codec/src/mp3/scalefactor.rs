//! 比例因子解码 (MPEG-1 与 MPEG-2 LSF).

use super::bitreader::BitReader;
use super::side_info::GranuleChannel;
use super::tables::{NR_OF_SFB, SLEN};

/// 单声道的比例因子
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScaleFactors {
    /// 长块比例因子 (22 带, 末带恒为 0)
    pub long: [u8; 22],
    /// 短块比例因子 [带][窗口]
    pub short: [[u8; 3]; 13],
    /// 各长块带的位宽, 用于判定 LSF 强度立体声的非法位置
    pub long_slen: [u8; 22],
    /// 各短块带的位宽
    pub short_slen: [u8; 13],
    /// LSF 强度立体声比例 (scalefac_compress 最低位)
    pub intensity_scale: u8,
}

impl ScaleFactors {
    /// 长块带 sfb 的强度立体声位置是否为非法值 (表示该带不做强度处理)
    pub fn long_is_illegal(&self, sfb: usize, lsf: bool) -> bool {
        illegal(self.long[sfb], self.long_slen[sfb], lsf)
    }

    /// 短块带 sfb 窗口 w 的强度立体声位置是否为非法值
    pub fn short_is_illegal(&self, sfb: usize, w: usize, lsf: bool) -> bool {
        illegal(self.short[sfb][w], self.short_slen[sfb], lsf)
    }
}

fn illegal(value: u8, slen: u8, lsf: bool) -> bool {
    if lsf {
        value == ((1u16 << slen) - 1) as u8
    } else {
        value == 7
    }
}

/// 读取 MPEG-1 比例因子
///
/// `sf` 保存上一颗粒的值, scfsi 置位的组在第二颗粒中直接复用.
pub fn read_mpeg1(
    br: &mut BitReader<'_>,
    gc: &GranuleChannel,
    scfsi: &[bool; 4],
    granule: usize,
    sf: &mut ScaleFactors,
) {
    let (slen1, slen2) = SLEN[gc.scalefac_compress as usize & 0x0F];
    let (slen1, slen2) = (u32::from(slen1), u32::from(slen2));

    if gc.is_short() {
        let first_short = if gc.mixed_block {
            for sfb in 0..8 {
                sf.long[sfb] = br.read_bits(slen1) as u8;
            }
            3
        } else {
            0
        };
        for sfb in first_short..12 {
            let slen = if sfb < 6 { slen1 } else { slen2 };
            for w in 0..3 {
                sf.short[sfb][w] = br.read_bits(slen) as u8;
            }
        }
        sf.short[12] = [0; 3];
        return;
    }

    const GROUPS: [(usize, usize); 4] = [(0, 6), (6, 11), (11, 16), (16, 21)];
    for (group, &(start, end)) in GROUPS.iter().enumerate() {
        if granule == 1 && scfsi[group] {
            continue;
        }
        let slen = if group < 2 { slen1 } else { slen2 };
        for sfb in start..end {
            sf.long[sfb] = br.read_bits(slen) as u8;
        }
    }
    sf.long[21] = 0;
}

/// 读取 MPEG-2 LSF 比例因子, 返回该声道实际的 preflag
///
/// `intensity_right` 为强度立体声帧的右声道, 使用独立的位宽划分.
pub fn read_lsf(
    br: &mut BitReader<'_>,
    gc: &GranuleChannel,
    intensity_right: bool,
    sf: &mut ScaleFactors,
) -> bool {
    let sfc = gc.scalefac_compress;
    let mut preflag = false;
    let (slen, table): ([u32; 4], usize) = if intensity_right {
        let isc = sfc >> 1;
        sf.intensity_scale = (sfc & 1) as u8;
        if isc < 180 {
            ([isc / 36, (isc % 36) / 6, (isc % 36) % 6, 0], 3)
        } else if isc < 244 {
            let isc = isc - 180;
            ([(isc % 64) >> 4, (isc % 16) >> 2, isc % 4, 0], 4)
        } else {
            let isc = isc - 244;
            ([isc / 3, isc % 3, 0, 0], 5)
        }
    } else {
        sf.intensity_scale = 0;
        if sfc < 400 {
            ([(sfc >> 4) / 5, (sfc >> 4) % 5, (sfc % 16) >> 2, sfc % 4], 0)
        } else if sfc < 500 {
            let sfc = sfc - 400;
            ([(sfc >> 2) / 5, (sfc >> 2) % 5, sfc % 4, 0], 1)
        } else {
            preflag = true;
            let sfc = sfc - 500;
            ([sfc / 3, sfc % 3, 0, 0], 2)
        }
    };

    let column = match (gc.is_short(), gc.mixed_block) {
        (false, _) => 0,
        (true, false) => 1,
        (true, true) => 2,
    };
    let counts = NR_OF_SFB[table][column];

    // 按传输顺序逐个读取, 再按块类型分配到带/窗口
    let mut values = [(0u8, 0u8); 39];
    let mut n = 0;
    for (group, &count) in counts.iter().enumerate() {
        for _ in 0..count {
            values[n] = (br.read_bits(slen[group]) as u8, slen[group] as u8);
            n += 1;
        }
    }

    *sf = ScaleFactors {
        intensity_scale: sf.intensity_scale,
        ..ScaleFactors::default()
    };
    match column {
        0 => {
            for (sfb, &(value, bits)) in values[..n.min(21)].iter().enumerate() {
                sf.long[sfb] = value;
                sf.long_slen[sfb] = bits;
            }
        }
        1 => {
            for (i, &(value, bits)) in values[..n.min(36)].iter().enumerate() {
                sf.short[i / 3][i % 3] = value;
                sf.short_slen[i / 3] = bits;
            }
        }
        _ => {
            let long_count = usize::from(counts[0]);
            for (sfb, &(value, bits)) in values[..long_count].iter().enumerate() {
                sf.long[sfb] = value;
                sf.long_slen[sfb] = bits;
            }
            for (i, &(value, bits)) in values[long_count..n.min(long_count + 27)]
                .iter()
                .enumerate()
            {
                sf.short[3 + i / 3][i % 3] = value;
                sf.short_slen[3 + i / 3] = bits;
            }
        }
    }
    // 最后一个带不传输, 强度立体声位置沿用前一带
    sf.long_slen[21] = sf.long_slen[20];
    sf.short_slen[12] = sf.short_slen[11];

    preflag
}
