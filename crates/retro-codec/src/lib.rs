//! # retro-codec
//!
//! 复古引擎的音频解码库: 自研 MPEG Layer III 解码器与流式解码会话.
//!
//! ## 使用示例
//!
//! ```rust
//! use retro_codec::Mp3Session;
//! use retro_codec::mp3::StreamBuilder;
//! use std::io::Cursor;
//!
//! let mut builder = StreamBuilder::new(44100, false).unwrap();
//! builder.push_silence(2);
//!
//! let mut session = Mp3Session::new();
//! session.open_source(Box::new(Cursor::new(builder.finish()))).unwrap();
//! while let Some(pcm) = session.pull() {
//!     assert_eq!(pcm.sample_rate, 44100);
//! }
//! ```

pub mod mp3;
pub mod session;

pub use session::{MAX_RECOVERABLE_ERRORS, Mp3Session, PcmBuffer, SessionState};
