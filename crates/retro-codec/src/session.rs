//! 流式解码会话.
//!
//! 会话独占输入缓冲、帧解码器、合成引擎与一块只增不减的交错 PCM 数组,
//! 对外提供逐帧拉取接口. 会话不会自动循环, 循环由播放层调用 [`Mp3Session::restart`] 完成.

use std::path::Path;

use log::{debug, warn};
use retro_core::{RetroError, RetroResult};

use crate::mp3::{
    FrameDecoder, InputBuffer, MediaSource, StreamError, StreamErrorKind, Synthesizer,
};

/// 单次拉取允许的连续可恢复错误数
pub const MAX_RECOVERABLE_ERRORS: usize = 4096;

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// 未打开或已关闭
    Uninitialized,
    /// 可继续拉取
    Streaming,
    /// 流已结束 (EOF 或致命错误), 再次拉取始终返回 None
    Exhausted,
}

/// 一帧解码后的交错 PCM
///
/// 借用自会话内部数组, 下一次拉取会覆盖其内容.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmBuffer<'a> {
    /// 交错采样, 长度为 `length * channels`
    pub samples: &'a [i16],
    /// 每声道采样数
    pub length: usize,
    /// 声道数
    pub channels: u16,
    /// 采样率
    pub sample_rate: u32,
}

impl PcmBuffer<'_> {
    /// 交错采样总数
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// MP3 流式解码会话
pub struct Mp3Session {
    input: Option<InputBuffer>,
    decoder: FrameDecoder,
    synth: Box<Synthesizer>,
    /// 交错 PCM, 容量只增不减
    samples: Vec<i16>,
    /// 当前缓冲每声道采样数
    length: usize,
    /// 首帧锁定的采样率
    sample_rate: Option<u32>,
    /// 输出声道数 (首帧锁定或由播放层指定)
    out_channels: Option<usize>,
    state: SessionState,
    frames_decoded: u64,
}

impl Default for Mp3Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Mp3Session {
    pub fn new() -> Self {
        Self {
            input: None,
            decoder: FrameDecoder::new(),
            synth: Box::new(Synthesizer::new()),
            samples: Vec::new(),
            length: 0,
            sample_rate: None,
            out_channels: None,
            state: SessionState::Uninitialized,
            frames_decoded: 0,
        }
    }

    /// 打开文件开始新的解码会话
    pub fn open(&mut self, path: impl AsRef<Path>) -> RetroResult<()> {
        let input = InputBuffer::open(path)?;
        self.start(input);
        Ok(())
    }

    /// 从任意字节源开始新的解码会话
    pub fn open_source(&mut self, source: Box<dyn MediaSource>) -> RetroResult<()> {
        let input = InputBuffer::from_source(source)?;
        self.start(input);
        Ok(())
    }

    fn start(&mut self, input: InputBuffer) {
        self.input = Some(input);
        self.decoder.reset();
        self.synth.reset();
        self.length = 0;
        self.sample_rate = None;
        self.out_channels = None;
        self.frames_decoded = 0;
        self.state = SessionState::Streaming;
        debug!("MP3 会话已打开");
    }

    /// 当前状态
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// 首帧锁定的采样率
    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    /// 输出声道数
    pub fn output_channels(&self) -> Option<usize> {
        self.out_channels
    }

    /// 最近一帧的源声道数
    pub fn source_channels(&self) -> usize {
        self.synth.channels()
    }

    /// 自打开或重启以来成功解码的帧数
    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// 指定输出声道数, 并按新声道数重新渲染当前缓冲
    pub fn set_output_channels(&mut self, channels: usize) {
        let channels = channels.max(1);
        self.out_channels = Some(channels);
        if self.length > 0 {
            self.render(channels);
        }
    }

    /// 解码下一帧并返回其 PCM; 流结束后返回 None
    ///
    /// 缓冲不足时内部补充输入并重试同一帧, 可恢复错误跳过后重试,
    /// 只有补充输入读不到任何字节或发生致命错误时才结束.
    pub fn pull(&mut self) -> Option<PcmBuffer<'_>> {
        if self.state != SessionState::Streaming {
            return None;
        }
        match self.decode_one() {
            Ok(true) => {}
            Ok(false) => {
                debug!("MP3 流结束, 共 {} 帧", self.frames_decoded);
                self.finish();
                return None;
            }
            Err(kind) => {
                warn!("MP3 会话因错误结束: {kind}");
                self.finish();
                return None;
            }
        }
        let channels = *self.out_channels.get_or_insert(self.synth.channels().max(1));
        self.render(channels);
        self.frames_decoded += 1;
        self.current()
    }

    /// 最近一次拉取得到的缓冲
    pub fn current(&self) -> Option<PcmBuffer<'_>> {
        if self.state != SessionState::Streaming || self.length == 0 {
            return None;
        }
        let channels = self.out_channels?;
        Some(PcmBuffer {
            samples: &self.samples[..self.length * channels],
            length: self.length,
            channels: channels as u16,
            sample_rate: self.sample_rate?,
        })
    }

    /// 回到流开头重新解码, 清空储备库、重叠缓冲与滤波器历史
    ///
    /// 保留已锁定的采样率与输出声道数, 使输出设备配置保持不变.
    pub fn restart(&mut self) -> RetroResult<()> {
        let input = self.input.as_mut().ok_or(RetroError::NotLoaded)?;
        input.rewind()?;
        self.decoder.reset();
        self.synth.reset();
        self.length = 0;
        self.frames_decoded = 0;
        self.state = SessionState::Streaming;
        debug!("MP3 会话已重启");
        Ok(())
    }

    /// 关闭会话, 释放输入与解码状态
    pub fn close(&mut self) {
        if self.input.take().is_some() {
            debug!("MP3 会话已关闭");
        }
        self.decoder.reset();
        self.synth.reset();
        self.length = 0;
        self.sample_rate = None;
        self.out_channels = None;
        self.state = SessionState::Uninitialized;
    }

    fn finish(&mut self) {
        self.length = 0;
        self.state = SessionState::Exhausted;
    }

    /// 解码并合成一帧, 合成结果留在 synth 中; 返回 false 表示流正常结束
    fn decode_one(&mut self) -> Result<bool, StreamErrorKind> {
        let Some(input) = self.input.as_mut() else {
            return Ok(false);
        };
        let mut errors = 0;
        loop {
            match self.decoder.decode_next_frame(input) {
                Ok(frame) => {
                    let rate = frame.header.sample_rate;
                    match self.sample_rate {
                        Some(locked) if locked != rate => {
                            warn!("丢弃采样率改变的帧: {} Hz -> {} Hz", locked, rate);
                        }
                        _ => {
                            self.sample_rate = Some(rate);
                            self.synth.synth_frame(frame);
                            return Ok(true);
                        }
                    }
                }
                Err(StreamError::BufLen) => match input.refill() {
                    Ok(0) => return Ok(false),
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("读取输入失败: {e}");
                        return Err(StreamErrorKind::Io);
                    }
                },
                Err(StreamError::Recoverable(kind)) => {
                    debug!("跳过损坏数据: {kind}");
                }
                Err(StreamError::Fatal(kind)) => return Err(kind),
            }
            errors += 1;
            if errors >= MAX_RECOVERABLE_ERRORS {
                return Err(StreamErrorKind::TooManyErrors);
            }
        }
    }

    fn render(&mut self, channels: usize) {
        let needed = self.synth.len() * channels;
        if self.samples.len() < needed {
            self.samples.resize(needed, 0);
        }
        let written = self.synth.render_interleaved(channels, &mut self.samples[..needed]);
        self.length = written / channels;
    }
}
