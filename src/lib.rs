//! # Retro
//!
//! 复古风格游戏引擎的音乐子系统: 自研 MPEG Layer III 流式解码器,
//! 经定点合成滤波器组输出 16 位 PCM, 由拉取式实时回调送入宿主音频设备.
//!
//! # 快速开始
//!
//! ```rust
//! use retro::audio::{HeadlessBackend, MusicPlayer, PlaybackConfig};
//! use retro::codec::mp3::StreamBuilder;
//! use std::io::Cursor;
//!
//! let mut builder = StreamBuilder::new(44100, true).unwrap();
//! builder.push_tone(8, 24, 200);
//!
//! let mut player = MusicPlayer::new(HeadlessBackend::default(), PlaybackConfig::default());
//! player.load_source(Box::new(Cursor::new(builder.finish()))).unwrap();
//! player.play(true).unwrap();
//! let pcm = player.device_mut().unwrap().render(1024);
//! assert_eq!(pcm.len(), 2048);
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `retro-core` | 统一错误、定点采样、位写入器、CRC-16 |
//! | `retro-codec` | 输入缓冲、帧解码、合成引擎、流式会话 |
//! | `retro-audio` | 实时回调、播放器状态机、音频上下文 |

/// 核心类型与工具
pub use retro_core as core;

/// MP3 解码与流式会话
pub use retro_codec as codec;

/// 实时播放
pub use retro_audio as audio;

/// 获取 Retro 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
