//! 混合滤波器组: 短块重排、混叠消除、IMDCT 与重叠相加.
//!
//! 输出 18 个时间槽 x 32 个子带的子带采样, 已做频率反转.
//! 系数表为 Q28 定点数, 乘加在 i64 中完成并饱和回 Q4.28.

use std::f64::consts::PI;
use std::sync::OnceLock;

use retro_core::fixed::{self, FRAC_BITS, Fixed};

use super::side_info::{BLOCK_NORMAL, BLOCK_SHORT, BLOCK_START, BLOCK_STOP, GranuleChannel};
use super::tables::{ALIAS_COEFFS, SfbBands};

/// 子带数
pub const SBLIMIT: usize = 32;

/// 每颗粒每子带的时间槽数
pub const SLOTS: usize = 18;

struct Tables {
    /// 36 点 IMDCT 余弦表 [n][k]
    cos36: [[Fixed; 18]; 36],
    /// 12 点 IMDCT 余弦表 [n][k]
    cos12: [[Fixed; 6]; 12],
    /// 长块窗 [block_type][n]
    windows: [[Fixed; 36]; 4],
    /// 短块窗
    short_window: [Fixed; 12],
    /// 混叠消除系数 cs
    cs: [Fixed; 8],
    /// 混叠消除系数 ca
    ca: [Fixed; 8],
}

fn tables() -> &'static Tables {
    static TABLES: OnceLock<Tables> = OnceLock::new();
    TABLES.get_or_init(|| {
        let mut t = Tables {
            cos36: [[0; 18]; 36],
            cos12: [[0; 6]; 12],
            windows: [[0; 36]; 4],
            short_window: [0; 12],
            cs: [0; 8],
            ca: [0; 8],
        };
        for n in 0..36 {
            for k in 0..18 {
                let arg = PI / 72.0 * (2 * n + 1 + 18) as f64 * (2 * k + 1) as f64;
                t.cos36[n][k] = fixed::from_f64(arg.cos());
            }
        }
        for n in 0..12 {
            for k in 0..6 {
                let arg = PI / 24.0 * (2 * n + 1 + 6) as f64 * (2 * k + 1) as f64;
                t.cos12[n][k] = fixed::from_f64(arg.cos());
            }
            t.short_window[n] = fixed::from_f64((PI / 12.0 * (n as f64 + 0.5)).sin());
        }

        let long = |n: usize| fixed::from_f64((PI / 36.0 * (n as f64 + 0.5)).sin());
        let short = |n: usize| fixed::from_f64((PI / 12.0 * (n as f64 + 0.5)).sin());
        for n in 0..36 {
            t.windows[usize::from(BLOCK_NORMAL)][n] = long(n);
            t.windows[usize::from(BLOCK_START)][n] = match n {
                0..18 => long(n),
                18..24 => fixed::ONE,
                24..30 => short(n - 18),
                _ => 0,
            };
            t.windows[usize::from(BLOCK_STOP)][n] = match n {
                0..6 => 0,
                6..12 => short(n - 6),
                12..18 => fixed::ONE,
                _ => long(n),
            };
        }

        for (i, &c) in ALIAS_COEFFS.iter().enumerate() {
            let norm = (1.0 + c * c).sqrt();
            t.cs[i] = fixed::from_f64(1.0 / norm);
            t.ca[i] = fixed::from_f64(c / norm);
        }
        t
    })
}

/// 短块重排: (带, 窗口, 频点) 顺序 -> 每子带 [窗口][6 个频点]
///
/// 重排后 xr[18 * sb + 6 * w + k] 为窗口 w 中频点 6 * sb + k.
pub fn reorder(xr: &mut [Fixed; 576], gc: &GranuleChannel, bands: &SfbBands) {
    if !gc.is_short() {
        return;
    }
    let first_short = if gc.mixed_block { 3 } else { 0 };
    let first_line = usize::from(bands.short[first_short]) * 3;
    let mut tmp = [0 as Fixed; 576];
    for sfb in first_short..13 {
        let start = usize::from(bands.short[sfb]);
        let width = usize::from(bands.short[sfb + 1]) - start;
        for w in 0..3 {
            for k in 0..width {
                let freq = start + k;
                let src = start * 3 + w * width + k;
                let dst = 18 * (freq / 6) + 6 * w + freq % 6;
                tmp[dst] = xr[src];
            }
        }
    }
    xr[first_line..].copy_from_slice(&tmp[first_line..]);
}

/// 混叠消除, 仅作用于长块子带之间的边界
pub fn alias_reduce(xr: &mut [Fixed; 576], gc: &GranuleChannel) {
    let boundaries = if !gc.is_short() {
        SBLIMIT
    } else if gc.mixed_block {
        2
    } else {
        return;
    };
    let t = tables();
    for sb in 1..boundaries {
        let edge = sb * 18;
        for i in 0..8 {
            let lo = i64::from(xr[edge - 1 - i]);
            let hi = i64::from(xr[edge + i]);
            let (cs, ca) = (i64::from(t.cs[i]), i64::from(t.ca[i]));
            xr[edge - 1 - i] = fixed::saturate((lo * cs - hi * ca) >> FRAC_BITS);
            xr[edge + i] = fixed::saturate((hi * cs + lo * ca) >> FRAC_BITS);
        }
    }
}

/// IMDCT 与重叠相加状态 (每声道一份)
#[derive(Debug, Clone)]
pub struct HybridSynth {
    overlap: [[[Fixed; SLOTS]; SBLIMIT]; 2],
}

impl Default for HybridSynth {
    fn default() -> Self {
        Self::new()
    }
}

impl HybridSynth {
    pub fn new() -> Self {
        Self {
            overlap: [[[0; SLOTS]; SBLIMIT]; 2],
        }
    }

    /// 清空重叠缓冲
    pub fn reset(&mut self) {
        self.overlap = [[[0; SLOTS]; SBLIMIT]; 2];
    }

    /// 对一个颗粒声道执行 IMDCT、加窗、重叠相加与频率反转
    pub fn process(
        &mut self,
        ch: usize,
        xr: &[Fixed; 576],
        gc: &GranuleChannel,
        out: &mut [[Fixed; SBLIMIT]; SLOTS],
    ) {
        let t = tables();
        for sb in 0..SBLIMIT {
            let input = &xr[sb * 18..sb * 18 + 18];
            let block_type = if !gc.window_switching || (gc.mixed_block && sb < 2) {
                BLOCK_NORMAL
            } else {
                gc.block_type
            };

            let mut z = [0 as Fixed; 36];
            if block_type == BLOCK_SHORT {
                for w in 0..3 {
                    for n in 0..12 {
                        let acc = dot(&input[6 * w..6 * w + 6], &t.cos12[n]);
                        let idx = 6 + 6 * w + n;
                        z[idx] = z[idx].saturating_add(fixed::mul(acc, t.short_window[n]));
                    }
                }
            } else if input.iter().any(|&v| v != 0) {
                let window = &t.windows[usize::from(block_type)];
                for n in 0..36 {
                    z[n] = fixed::mul(dot(input, &t.cos36[n]), window[n]);
                }
            }

            let overlap = &mut self.overlap[ch][sb];
            for n in 0..SLOTS {
                let mut sample = z[n].saturating_add(overlap[n]);
                if sb % 2 == 1 && n % 2 == 1 {
                    sample = sample.saturating_neg();
                }
                out[n][sb] = sample;
                overlap[n] = z[n + SLOTS];
            }
        }
    }
}

/// 定点点积
///
/// 每个乘积先右移 4 位再累加, 18 项饱和输入也不会溢出 i64.
fn dot(input: &[Fixed], coeffs: &[Fixed]) -> Fixed {
    let acc: i64 = input
        .iter()
        .zip(coeffs)
        .map(|(&x, &c)| (i64::from(x) * i64::from(c)) >> 4)
        .sum();
    fixed::saturate(acc >> (FRAC_BITS - 4))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp3::tables::SFB_BANDS;
    use retro_core::fixed::ONE;

    fn short_granule(mixed: bool) -> GranuleChannel {
        GranuleChannel {
            window_switching: true,
            block_type: BLOCK_SHORT,
            mixed_block: mixed,
            ..GranuleChannel::default()
        }
    }

    #[test]
    fn test_window_shapes() {
        let t = tables();
        let start = &t.windows[usize::from(BLOCK_START)];
        assert_eq!(start[20], ONE);
        assert_eq!(start[33], 0);
        let stop = &t.windows[usize::from(BLOCK_STOP)];
        assert_eq!(stop[2], 0);
        assert_eq!(stop[15], ONE);
        // 长块窗满足 Princen-Bradley 条件
        let normal = &t.windows[0];
        for n in 0..18 {
            let sum = fixed::mul(normal[n], normal[n]) + fixed::mul(normal[n + 18], normal[n + 18]);
            assert!((sum - ONE).abs() < 4);
        }
    }

    #[test]
    fn test_dot_saturates_without_overflow() {
        let input = [fixed::MAX; 18];
        let coeffs = [ONE; 18];
        assert_eq!(dot(&input, &coeffs), fixed::MAX);
        assert_eq!(dot(&[fixed::MIN; 18], &coeffs), fixed::MIN);
        assert_eq!(dot(&[ONE / 2, ONE / 4], &[ONE, ONE]), 3 * ONE / 4);
    }

    #[test]
    fn test_reorder_pure_short() {
        let bands = &SFB_BANDS[0];
        let mut xr = [0 as Fixed; 576];
        // 带 0 (宽 4) 窗口 2 的第 1 个频点位于 2*4 + 1 = 9
        xr[9] = 1;
        // 带 1 (起点 4, 宽 4) 窗口 1 的第 2 个频点: 3*4 + 1*4 + 2 = 18, 频率 6
        xr[18] = 2;
        reorder(&mut xr, &short_granule(false), bands);
        assert_eq!(xr[6 * 2 + 1], 1);
        assert_eq!(xr[18 + 6], 2);
        assert_eq!(xr.iter().filter(|&&v| v != 0).count(), 2);
    }

    #[test]
    fn test_reorder_mixed_keeps_long_part() {
        let bands = &SFB_BANDS[0];
        let mut xr = [0 as Fixed; 576];
        xr[5] = 3;
        xr[36] = 4;
        reorder(&mut xr, &short_granule(true), bands);
        assert_eq!(xr[5], 3);
        // 带 3 起点频率 12, 窗口 0 的第一个频点 -> 子带 2, 窗口 0, k=0
        assert_eq!(xr[36], 4);
    }

    #[test]
    fn test_alias_reduction_is_rotation() {
        let mut xr = [0 as Fixed; 576];
        xr[17] = ONE / 2;
        xr[18] = ONE / 2;
        let gc = GranuleChannel::default();
        alias_reduce(&mut xr, &gc);
        let energy: f64 = xr.iter().map(|&v| fixed::to_f64(v).powi(2)).sum();
        assert!((energy - 0.5).abs() < 1e-6);
        assert_ne!(xr[17], ONE / 2);

        let mut xr2 = [0 as Fixed; 576];
        xr2[17] = ONE;
        alias_reduce(&mut xr2, &short_granule(false));
        assert_eq!(xr2[17], ONE);
    }

    #[test]
    fn test_overlap_carries_to_next_granule() {
        let mut hybrid = HybridSynth::new();
        let mut xr = [0 as Fixed; 576];
        xr[0] = ONE / 2;
        let gc = GranuleChannel::default();
        let mut out = [[0 as Fixed; SBLIMIT]; SLOTS];
        hybrid.process(0, &xr, &gc, &mut out);
        assert!(out.iter().any(|slot| slot[0] != 0));

        let silent = [0 as Fixed; 576];
        let mut tail = [[0 as Fixed; SBLIMIT]; SLOTS];
        hybrid.process(0, &silent, &gc, &mut tail);
        assert!(tail.iter().any(|slot| slot[0] != 0));

        hybrid.reset();
        hybrid.process(0, &silent, &gc, &mut tail);
        assert!(tail.iter().all(|slot| slot.iter().all(|&v| v == 0)));
    }

    #[test]
    fn test_imdct_is_deterministic_and_saturating() {
        let mut xr = [0 as Fixed; 576];
        for (i, v) in xr.iter_mut().enumerate() {
            *v = if i % 3 == 0 { fixed::MAX } else { fixed::MIN };
        }
        let gc = GranuleChannel::default();
        let mut first = [[0 as Fixed; SBLIMIT]; SLOTS];
        let mut second = [[0 as Fixed; SBLIMIT]; SLOTS];
        HybridSynth::new().process(1, &xr, &gc, &mut first);
        HybridSynth::new().process(1, &xr, &gc, &mut second);
        assert_eq!(first, second);
    }
}
