//! 联合立体声处理 (MS 与强度立体声).
//!
//! 在频点重排之前执行, 此时短块数据仍按 (带, 窗口, 频点) 顺序排列.

use retro_core::fixed::{self, FRAC_BITS, Fixed, ONE};

use super::error::StreamErrorKind;
use super::header::FrameHeader;
use super::requantize::mixed_long_bands;
use super::scalefactor::ScaleFactors;
use super::side_info::GranuleChannel;
use super::tables::SfbBands;

/// 1/sqrt(2), Q28
const FRAC_1_SQRT_2: Fixed = 189_812_531;

/// LSF 强度立体声底数 2^(-1/4), Q28 (intensity_scale = 0)
const LSF_IS_BASE: Fixed = 225_726_413;

/// MPEG-1 强度立体声左右增益 tan(p*pi/12) / (1 + tan) 与 1 / (1 + tan), p = 0..6, Q28
const IS_LEFT: [Fixed; 6] = [0, 56_727_087, 98_254_196, 134_217_728, 170_181_260, 211_708_369];
const IS_RIGHT: [Fixed; 6] = [
    268_435_456,
    211_708_369,
    170_181_260,
    134_217_728,
    98_254_196,
    56_727_087,
];

/// 一个频点区间的处理方式
#[derive(Debug, Clone, Copy, PartialEq)]
enum BandMode {
    /// 普通左右声道或 MS
    Normal,
    /// 强度立体声, 左右声道增益 (Q28)
    Intensity(Fixed, Fixed),
}

/// 对一个颗粒的两个声道执行联合立体声处理
///
/// `lens` 为两个声道最后一个非零值之后的下标, 处理后更新为两者的并集.
pub fn process(
    header: &FrameHeader,
    gc: &[GranuleChannel; 2],
    right_sf: &ScaleFactors,
    bands: &SfbBands,
    xr: &mut [[Fixed; 576]; 2],
    lens: &mut [usize; 2],
) -> Result<(), StreamErrorKind> {
    let ms = header.ms_stereo();
    let intensity = header.intensity_stereo();
    if !ms && !intensity {
        return Ok(());
    }
    if gc[0].is_short() != gc[1].is_short() || gc[0].mixed_block != gc[1].mixed_block {
        return Err(StreamErrorKind::BadBlockType);
    }

    let lsf = header.version.is_lsf();
    let full_len = lens[0].max(lens[1]);

    if !intensity {
        apply_ms(xr, 0, full_len);
        *lens = [full_len; 2];
        return Ok(());
    }

    let right = &gc[1];
    let right_len = lens[1];
    let mut processed_len = full_len;

    let long_bands = if !right.is_short() {
        22
    } else if right.mixed_block {
        mixed_long_bands(lsf)
    } else {
        0
    };

    // 右声道短块部分是否还有非零值; 若有, 混合块的长块部分不做强度处理
    let short_has_data =
        right.is_short() && long_bands > 0 && right_len > usize::from(bands.long[long_bands]);

    for sfb in 0..long_bands {
        let start = usize::from(bands.long[sfb]);
        let end = usize::from(bands.long[sfb + 1]);
        let mode = if start >= right_len && !short_has_data {
            let pos_band = sfb.min(20);
            if right_sf.long_is_illegal(pos_band, lsf) {
                BandMode::Normal
            } else {
                intensity_mode(right_sf.long[pos_band], right_sf.intensity_scale, lsf)
            }
        } else {
            BandMode::Normal
        };
        apply_band(xr, start, end, mode, ms);
        if let BandMode::Intensity(..) = mode {
            processed_len = processed_len.max(end);
        }
    }

    if right.is_short() {
        let first_short = if right.mixed_block { 3 } else { 0 };
        for w in 0..3 {
            // 窗口 w 中右声道最后一个含非零值的带
            let mut last_nonzero: Option<usize> = None;
            for sfb in first_short..13 {
                let width = usize::from(bands.short[sfb + 1] - bands.short[sfb]);
                let start = usize::from(bands.short[sfb]) * 3 + w * width;
                if xr[1][start..start + width].iter().any(|&v| v != 0) {
                    last_nonzero = Some(sfb);
                }
            }
            for sfb in first_short..13 {
                let width = usize::from(bands.short[sfb + 1] - bands.short[sfb]);
                let start = usize::from(bands.short[sfb]) * 3 + w * width;
                let above = last_nonzero.is_none_or(|last| sfb > last);
                let mode = if above {
                    let pos_band = sfb.min(11);
                    if right_sf.short_is_illegal(pos_band, w, lsf) {
                        BandMode::Normal
                    } else {
                        intensity_mode(
                            right_sf.short[pos_band][w],
                            right_sf.intensity_scale,
                            lsf,
                        )
                    }
                } else {
                    BandMode::Normal
                };
                apply_band(xr, start, start + width, mode, ms);
                if let BandMode::Intensity(..) = mode {
                    processed_len = processed_len.max(start + width);
                }
            }
        }
    }

    *lens = [processed_len.min(576); 2];
    Ok(())
}

fn intensity_mode(position: u8, scale: u8, lsf: bool) -> BandMode {
    if lsf {
        let base = if scale == 1 { FRAC_1_SQRT_2 } else { LSF_IS_BASE };
        let power = |k: u8| (0..k).fold(ONE, |acc, _| fixed::mul(acc, base));
        if position == 0 {
            BandMode::Intensity(ONE, ONE)
        } else if position % 2 == 1 {
            BandMode::Intensity(power(position.div_ceil(2)), ONE)
        } else {
            BandMode::Intensity(ONE, power(position / 2))
        }
    } else if position >= 6 {
        BandMode::Intensity(ONE, 0)
    } else {
        let p = usize::from(position);
        BandMode::Intensity(IS_LEFT[p], IS_RIGHT[p])
    }
}

fn apply_band(xr: &mut [[Fixed; 576]; 2], start: usize, end: usize, mode: BandMode, ms: bool) {
    match mode {
        BandMode::Intensity(kl, kr) => {
            for i in start..end {
                let v = xr[0][i];
                xr[0][i] = fixed::mul(v, kl);
                xr[1][i] = fixed::mul(v, kr);
            }
        }
        BandMode::Normal if ms => apply_ms(xr, start, end),
        BandMode::Normal => {}
    }
}

fn apply_ms(xr: &mut [[Fixed; 576]; 2], start: usize, end: usize) {
    let scale = i64::from(FRAC_1_SQRT_2);
    for i in start..end {
        let m = i64::from(xr[0][i]);
        let s = i64::from(xr[1][i]);
        xr[0][i] = fixed::saturate(((m + s) * scale) >> FRAC_BITS);
        xr[1][i] = fixed::saturate(((m - s) * scale) >> FRAC_BITS);
    }
}
