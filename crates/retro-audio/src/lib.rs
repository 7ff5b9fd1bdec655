//! # retro-audio
//!
//! Retro 引擎的实时音乐播放: 把 [`retro_codec::Mp3Session`] 的逐帧 PCM
//! 送入宿主音频子系统的拉取式回调.
//!
//! - [`MusicPlayer`]: 单条音乐的控制面 (load / play / pause / stop / fadeout)
//! - [`StreamCallback`]: 交给音频后端在实时线程上调用的填充器
//! - [`AudioBackend`] / [`OutputDevice`]: 宿主音频子系统的接缝
//! - [`AudioContext`]: 有界音轨表, 拥有全部播放器的生命周期
//!
//! ## 使用示例
//!
//! ```rust
//! use retro_audio::{HeadlessBackend, MusicPlayer, PlaybackConfig};
//! use retro_codec::mp3::StreamBuilder;
//! use std::io::Cursor;
//!
//! let mut builder = StreamBuilder::new(44100, false).unwrap();
//! builder.push_tone(4, 24, 200);
//!
//! let mut player = MusicPlayer::new(HeadlessBackend::default(), PlaybackConfig::default());
//! player.load_source(Box::new(Cursor::new(builder.finish()))).unwrap();
//! player.play(false).unwrap();
//! let pcm = player.device_mut().unwrap().render(512);
//! assert_eq!(pcm.len(), 512);
//! ```

pub mod backend;
pub mod callback;
pub mod config;
pub mod context;
pub mod headless;
pub mod player;

pub use backend::{AudioBackend, DeviceSpec, OutputDevice};
pub use callback::{PlaybackFlags, PlaybackState, StreamCallback};
pub use config::PlaybackConfig;
pub use context::{AudioContext, TrackId};
pub use headless::{HeadlessBackend, HeadlessDevice};
pub use player::MusicPlayer;
