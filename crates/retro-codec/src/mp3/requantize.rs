//! 反量化.
//!
//! xr = sign(is) * |is|^(4/3) * 2^(0.25 * (global_gain - 210 - 8 * subblock_gain))
//!      * 2^(-(scalefac_multiplier * (scalefac + preflag * pretab)))
//!
//! 结果为 Q4.28 定点数, 超出 [-8.0, 8.0) 时饱和. 指数以 1/4 为单位拆成
//! 整数移位与 2^(r/4) 尾数两部分, 运算全部在整数域完成.

use std::sync::OnceLock;

use retro_core::fixed::{self, FRAC_BITS, Fixed};

use super::scalefactor::ScaleFactors;
use super::side_info::GranuleChannel;
use super::tables::{PRETAB, SfbBands};

/// |is| 的最大值: 15 + (2^13 - 1)
const POW43_TABLE_LEN: usize = 8207;

/// 2^(r/4), r = 0..4, Q28
const QUARTER_ROOTS: [i64; 4] = [268_435_456, 319_225_354, 379_625_062, 451_452_825];

/// |is|^(4/3), Q28 (以 i64 存放, 可超出 8.0)
fn pow43_table() -> &'static [i64] {
    static TABLE: OnceLock<Vec<i64>> = OnceLock::new();
    TABLE.get_or_init(|| {
        (0..POW43_TABLE_LEN)
            .map(|i| ((i as f64).powf(4.0 / 3.0) * f64::from(fixed::ONE)).round() as i64)
            .collect()
    })
}

/// 一个缩放因子带的增益: 2^(exponent / 4)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Gain {
    /// 2^(r/4) 尾数, Q28
    mantissa: i64,
    /// 2 的整数次幂
    shift: i32,
}

impl Gain {
    /// `quarters` 为以 1/4 为单位的指数
    fn new(quarters: i32) -> Self {
        Self {
            mantissa: QUARTER_ROOTS[quarters.rem_euclid(4) as usize],
            shift: quarters.div_euclid(4),
        }
    }

    fn apply(self, value: i32) -> Fixed {
        if value == 0 {
            return 0;
        }
        let table = pow43_table();
        let magnitude = table[(value.unsigned_abs() as usize).min(table.len() - 1)];
        let scaled = (i128::from(magnitude) * i128::from(self.mantissa)) >> FRAC_BITS;
        let scaled = if self.shift >= 32 {
            // 非零值左移 32 位以上必然超出 Q4.28
            i128::from(fixed::MAX)
        } else if self.shift >= 0 {
            scaled << self.shift
        } else {
            scaled >> (-self.shift).min(127)
        };
        let magnitude = scaled.min(i128::from(fixed::MAX)) as Fixed;
        if value < 0 { -magnitude } else { magnitude }
    }
}

/// 混合块中长块部分的带数
pub fn mixed_long_bands(lsf: bool) -> usize {
    if lsf { 6 } else { 8 }
}

/// 反量化一个颗粒声道
///
/// `len` 为最后一个非零值之后的下标, 之后的频点直接置 0.
pub fn requantize(
    is: &[i32; 576],
    len: usize,
    gc: &GranuleChannel,
    sf: &ScaleFactors,
    bands: &SfbBands,
    lsf: bool,
    xr: &mut [Fixed; 576],
) {
    xr.fill(0);
    // global_gain 只有 8 位
    let base = gc.global_gain as i32 - 210;
    // scalefac_multiplier 0.5 或 1.0, 换算为 1/4 单位
    let multiplier = if gc.scalefac_scale { 4 } else { 2 };

    let long_bands = if !gc.is_short() {
        22
    } else if gc.mixed_block {
        mixed_long_bands(lsf)
    } else {
        0
    };

    for sfb in 0..long_bands {
        let start = usize::from(bands.long[sfb]);
        let end = usize::from(bands.long[sfb + 1]).min(len);
        if start >= end {
            break;
        }
        let pre = if gc.preflag { PRETAB[sfb] } else { 0 };
        let gain = Gain::new(base - multiplier * i32::from(sf.long[sfb] + pre));
        for i in start..end {
            xr[i] = gain.apply(is[i]);
        }
    }

    if !gc.is_short() {
        return;
    }
    let first_short = if gc.mixed_block { 3 } else { 0 };
    for sfb in first_short..13 {
        let start = usize::from(bands.short[sfb]) * 3;
        if start >= len {
            break;
        }
        let width = usize::from(bands.short[sfb + 1] - bands.short[sfb]);
        for w in 0..3 {
            let gain = Gain::new(
                base - 8 * i32::from(gc.subblock_gain[w])
                    - multiplier * i32::from(sf.short[sfb][w]),
            );
            let win_start = start + w * width;
            for i in win_start..(win_start + width).min(len) {
                xr[i] = gain.apply(is[i]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp3::tables::SFB_BANDS;
    use retro_core::fixed::ONE;

    fn close(actual: Fixed, expected: f64) -> bool {
        (fixed::to_f64(actual) - expected).abs() < 1e-6
    }

    #[test]
    fn test_pow43_table() {
        let table = pow43_table();
        assert_eq!(table[0], 0);
        assert_eq!(table[1], i64::from(ONE));
        assert_eq!(table[8], 16 * i64::from(ONE));
        assert_eq!(table.len(), 15 + (1 << 13));
    }

    #[test]
    fn test_quarter_step_gains() {
        assert_eq!(Gain::new(0).apply(1), ONE);
        assert_eq!(Gain::new(-4).apply(1), ONE / 2);
        assert_eq!(Gain::new(-8).apply(-1), -ONE / 4);
        assert!(close(Gain::new(1).apply(1), 2f64.powf(0.25)));
        assert!(close(Gain::new(-3).apply(1), 2f64.powf(-0.75)));
        // 极小增益衰减为 0, 不会出现负移位溢出
        assert_eq!(Gain::new(-1000).apply(8206), 0);
    }

    #[test]
    fn test_out_of_range_saturates() {
        assert_eq!(Gain::new(40).apply(1), fixed::MAX);
        assert_eq!(Gain::new(40).apply(-1), -fixed::MAX);
        assert_eq!(Gain::new(400).apply(8206), fixed::MAX);
        assert_eq!(Gain::new(400).apply(0), 0);
    }

    #[test]
    fn test_long_block_gain() {
        let mut is = [0i32; 576];
        is[0] = 1;
        is[5] = -2;
        let gc = GranuleChannel {
            global_gain: 210,
            ..GranuleChannel::default()
        };
        let mut sf = ScaleFactors::default();
        sf.long[1] = 2;
        let mut xr = [0 as Fixed; 576];
        requantize(&is, 6, &gc, &sf, &SFB_BANDS[0], false, &mut xr);
        assert_eq!(xr[0], ONE);
        // 带 1 (4..8): 2^(-0.5*2) = 0.5
        assert!(close(xr[5], -0.5 * 2f64.powf(4.0 / 3.0)));
    }

    #[test]
    fn test_short_block_subblock_gain() {
        let mut is = [0i32; 576];
        // 44100 Hz 短块带 0 宽 4: 窗口 1 从下标 4 开始
        is[4] = 1;
        let gc = GranuleChannel {
            global_gain: 210,
            window_switching: true,
            block_type: 2,
            subblock_gain: [0, 1, 0],
            ..GranuleChannel::default()
        };
        let sf = ScaleFactors::default();
        let mut xr = [0 as Fixed; 576];
        requantize(&is, 5, &gc, &sf, &SFB_BANDS[0], false, &mut xr);
        assert_eq!(xr[4], ONE / 4);
    }
}
