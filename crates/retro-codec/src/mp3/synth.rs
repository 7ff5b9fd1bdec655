//! 定点多相合成滤波器组.
//!
//! 每个时间槽把 32 个子带采样矩阵化为 64 点 V 向量, 存入 1024 点环形历史,
//! 再经 512 点合成窗加权求和得到 32 个 PCM 采样. 全程使用 Q4.28 定点数与 i64 累加.

use std::f64::consts::PI;
use std::sync::OnceLock;

use retro_core::fixed::{self, Fixed};

use super::frame::{Frame, MAX_SLOTS};
use super::hybrid::SBLIMIT;
use super::tables::SYNTH_WINDOW_HALF;

/// 系数表小数位数
const COEF_BITS: u32 = 24;

/// 每帧每声道最大采样数
pub const MAX_SAMPLES: usize = MAX_SLOTS * SBLIMIT;

struct SynthTables {
    /// 矩阵化系数 cos((16 + i)(2k + 1)π / 64), Q24
    matrix: [[i32; SBLIMIT]; 64],
    /// 合成窗 D[0..512], Q24
    window: [i32; 512],
}

fn synth_tables() -> &'static SynthTables {
    static TABLES: OnceLock<SynthTables> = OnceLock::new();
    TABLES.get_or_init(|| {
        let scale = f64::from(1u32 << COEF_BITS);
        let mut matrix = [[0i32; SBLIMIT]; 64];
        for (i, row) in matrix.iter_mut().enumerate() {
            for (k, coef) in row.iter_mut().enumerate() {
                let arg = (16 + i) as f64 * (2 * k + 1) as f64 * PI / 64.0;
                *coef = (arg.cos() * scale).round() as i32;
            }
        }
        // 窗系数以 65536 为单位给出前半部分, 后半部分按对称关系展开
        let mut window = [0i32; 512];
        for (i, &d) in SYNTH_WINDOW_HALF.iter().enumerate() {
            window[i] = d << (COEF_BITS - 16);
        }
        for i in 1..256 {
            window[512 - i] = if i % 64 == 0 { window[i] } else { -window[i] };
        }
        SynthTables { matrix, window }
    })
}

/// 合成引擎
///
/// 每声道的滤波器历史在帧间延续, 仅在会话重启时清空.
#[derive(Debug, Clone)]
pub struct Synthesizer {
    /// V 向量环形历史 [声道][1024]
    history: [[Fixed; 1024]; 2],
    /// 环形历史写入偏移
    offset: [usize; 2],
    /// 最近一帧的定点 PCM [声道][采样]
    pcm: [[Fixed; MAX_SAMPLES]; 2],
    /// 最近一帧每声道采样数
    length: usize,
    /// 最近一帧声道数
    channels: usize,
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Synthesizer {
    pub fn new() -> Self {
        Self {
            history: [[0; 1024]; 2],
            offset: [0; 2],
            pcm: [[0; MAX_SAMPLES]; 2],
            length: 0,
            channels: 0,
        }
    }

    /// 清空滤波器历史与最近一帧输出
    pub fn reset(&mut self) {
        for ch in 0..2 {
            self.history[ch].fill(0);
            self.pcm[ch].fill(0);
        }
        self.offset = [0; 2];
        self.length = 0;
        self.channels = 0;
    }

    /// 最近一帧每声道采样数
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// 最近一帧声道数
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// 最近一帧指定声道的定点 PCM
    pub fn channel_pcm(&self, ch: usize) -> &[Fixed] {
        &self.pcm[ch.min(1)][..self.length]
    }

    /// 对一帧子带采样执行合成
    pub fn synth_frame(&mut self, frame: &Frame) {
        let slots = frame.slots();
        self.channels = frame.header.channels();
        self.length = slots * SBLIMIT;
        for ch in 0..self.channels {
            for slot in 0..slots {
                let mut out = [0 as Fixed; SBLIMIT];
                self.synth_slot(ch, &frame.sbsample[ch][slot], &mut out);
                self.pcm[ch][slot * SBLIMIT..(slot + 1) * SBLIMIT].copy_from_slice(&out);
            }
        }
    }

    fn synth_slot(&mut self, ch: usize, subbands: &[Fixed; SBLIMIT], out: &mut [Fixed; SBLIMIT]) {
        let t = synth_tables();
        let offset = (self.offset[ch] + 1024 - 64) & 1023;
        self.offset[ch] = offset;
        let v = &mut self.history[ch];

        for (i, row) in t.matrix.iter().enumerate() {
            let acc: i64 = row
                .iter()
                .zip(subbands)
                .map(|(&c, &s)| i64::from(c) * i64::from(s))
                .sum();
            v[(offset + i) & 1023] = fixed::saturate(acc >> COEF_BITS);
        }

        for (j, sample) in out.iter_mut().enumerate() {
            let mut acc = 0i64;
            for i in 0..8 {
                acc += i64::from(v[(offset + 128 * i + j) & 1023])
                    * i64::from(t.window[64 * i + j]);
                acc += i64::from(v[(offset + 128 * i + 96 + j) & 1023])
                    * i64::from(t.window[64 * i + 32 + j]);
            }
            *sample = fixed::saturate(acc >> COEF_BITS);
        }
    }

    /// 将最近一帧输出为交错的 16 位 PCM
    ///
    /// 单声道源在多声道输出中复制到各声道; 立体声源输出到单声道时取平均.
    /// 返回写入的采样数 (每声道采样数 x 输出声道数).
    pub fn render_interleaved(&self, out_channels: usize, dst: &mut [i16]) -> usize {
        let out_channels = out_channels.max(1);
        let total = (self.length * out_channels).min(dst.len());
        let frames = total / out_channels;
        for n in 0..frames {
            let frame = &mut dst[n * out_channels..(n + 1) * out_channels];
            for (c, sample) in frame.iter_mut().enumerate() {
                *sample = fixed::to_pcm16(self.mixed_sample(n, c, out_channels));
            }
        }
        frames * out_channels
    }

    fn mixed_sample(&self, n: usize, out_ch: usize, out_channels: usize) -> Fixed {
        match (self.channels, out_channels) {
            (0, _) => 0,
            (1, _) => self.pcm[0][n],
            (_, 1) => ((i64::from(self.pcm[0][n]) + i64::from(self.pcm[1][n])) / 2) as Fixed,
            _ if out_ch < 2 => self.pcm[out_ch][n],
            _ => 0,
        }
    }
}
