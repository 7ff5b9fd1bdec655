//! # retro-core
//!
//! Retro 引擎核心库, 提供统一错误类型、定点采样运算与位级工具.
//!
//! 本 crate 为解码与播放两层提供底层基础设施, 不依赖任何宿主音频库.

pub mod bitwriter;
pub mod crc;
pub mod error;
pub mod fixed;

// 重导出常用类型
pub use error::{RetroError, RetroResult};
pub use fixed::Fixed;
