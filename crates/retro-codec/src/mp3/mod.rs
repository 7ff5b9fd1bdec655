//! MPEG-1/2/2.5 Layer III 解码器
//!
//! 数据流: [`InputBuffer`] → [`FrameDecoder`] → [`Synthesizer`] → [`crate::Mp3Session`].

mod bitreader;
mod builder;
mod error;
mod frame;
mod header;
mod huffman;
mod hybrid;
mod input;
mod requantize;
mod reservoir;
mod scalefactor;
mod side_info;
mod stereo;
mod synth;
mod tables;

pub use builder::{BlockLayout, StereoCoding, StreamBuilder};
pub use error::{StreamError, StreamErrorKind};
pub use frame::{Frame, FrameDecoder, MAX_SLOTS};
pub use header::{ChannelMode, FrameHeader, MpegVersion};
pub use input::{BUFFER_GUARD, INPUT_BUFFER_SIZE, InputBuffer, MediaSource};
pub use synth::{MAX_SAMPLES, Synthesizer};
