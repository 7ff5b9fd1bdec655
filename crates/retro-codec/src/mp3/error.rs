//! 码流错误分类.
//!
//! 解码循环的正确性依赖三类错误的严格区分:
//! - `BufLen`: 缓冲区数据不足, 调用方补充输入后重试同一帧
//! - `Recoverable`: 局部损坏, 跳过并重新同步, 不向上层暴露
//! - `Fatal`: 无法继续, 会话以流结束告终

use thiserror::Error;

/// 具体错误原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StreamErrorKind {
    #[error("同步丢失")]
    LostSync,
    #[error("不支持的 Layer")]
    BadLayer,
    #[error("非法或自由格式码率")]
    BadBitrate,
    #[error("非法采样率")]
    BadSampleRate,
    #[error("非法加重标志")]
    BadEmphasis,
    #[error("CRC 校验失败")]
    BadCrc,
    #[error("非法块类型")]
    BadBlockType,
    #[error("big_values 越界")]
    BadBigValues,
    #[error("part2_3_length 越界")]
    BadPart3Len,
    #[error("非法 Huffman 表")]
    BadHuffTable,
    #[error("比特储备不足 (main_data_begin 越界)")]
    BadDataPtr,
    #[error("采样率在流中途改变")]
    RateChange,
    #[error("读取输入失败")]
    Io,
    #[error("连续可恢复错误过多")]
    TooManyErrors,
}

/// 帧解码结果中的错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StreamError {
    /// 缓冲区不足以解析当前帧
    #[error("缓冲区数据不足")]
    BufLen,
    /// 可恢复错误, 已跳过出错数据
    #[error("可恢复码流错误: {0}")]
    Recoverable(StreamErrorKind),
    /// 致命错误
    #[error("致命码流错误: {0}")]
    Fatal(StreamErrorKind),
}

impl StreamError {
    /// 是否可以通过跳过重试恢复
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Recoverable(_))
    }
}
