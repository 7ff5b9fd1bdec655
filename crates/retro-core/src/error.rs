//! 统一错误类型定义.
//!
//! 所有 Retro crate 共用的错误类型, 支持跨模块传播.

use thiserror::Error;

/// Retro 引擎统一错误类型
#[derive(Debug, Error)]
pub enum RetroError {
    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 无效数据 (损坏的码流等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 尚未加载音频
    #[error("尚未加载音频")]
    NotLoaded,

    /// 音频设备错误
    #[error("音频设备错误: {0}")]
    Device(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),
}

/// Retro 引擎统一 Result 类型
pub type RetroResult<T> = Result<T, RetroError>;
