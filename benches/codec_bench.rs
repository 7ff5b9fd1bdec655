//! Retro 音频管线性能基准测试.
//!
//! 覆盖帧解码、子带合成以及实时回调填充等核心路径.

use std::io::Cursor;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use retro::audio::{HeadlessBackend, MusicPlayer, PlaybackConfig};
use retro::codec::Mp3Session;
use retro::codec::mp3::{FrameDecoder, InputBuffer, StreamBuilder, StreamError, Synthesizer};

/// 生成立体声单音测试流
fn make_tone_stream(frames: usize) -> Vec<u8> {
    let mut builder = StreamBuilder::new(44100, true).unwrap();
    builder.push_tone(frames, 11, 196);
    builder.finish()
}

fn bench_frame_decode(c: &mut Criterion) {
    let stream = make_tone_stream(64);
    c.bench_function("mp3_decode_64_frames", |b| {
        b.iter(|| {
            let mut input = InputBuffer::from_source(Box::new(Cursor::new(stream.clone()))).unwrap();
            let mut decoder = FrameDecoder::new();
            let mut frames = 0;
            loop {
                match decoder.decode_next_frame(&mut input) {
                    Ok(frame) => {
                        black_box(frame);
                        frames += 1;
                    }
                    Err(StreamError::BufLen) => {
                        if input.refill().unwrap() == 0 {
                            break;
                        }
                    }
                    Err(StreamError::Recoverable(_)) => {}
                    Err(StreamError::Fatal(_)) => break,
                }
            }
            black_box(frames)
        });
    });
}

fn bench_synth_frame(c: &mut Criterion) {
    let stream = make_tone_stream(4);
    let mut input = InputBuffer::from_source(Box::new(Cursor::new(stream))).unwrap();
    let mut decoder = FrameDecoder::new();
    let frame = loop {
        match decoder.decode_next_frame(&mut input) {
            Ok(frame) => break frame.clone(),
            Err(StreamError::BufLen) => {
                assert!(input.refill().unwrap() > 0, "测试流中没有可解码的帧");
            }
            Err(_) => {}
        }
    };
    c.bench_function("mp3_synth_stereo_frame", |b| {
        let mut synth = Synthesizer::new();
        let mut pcm = vec![0i16; 1152 * 2];
        b.iter(|| {
            synth.synth_frame(black_box(&frame));
            black_box(synth.render_interleaved(2, &mut pcm));
        });
    });
}

fn bench_session_pull(c: &mut Criterion) {
    let stream = make_tone_stream(64);
    c.bench_function("mp3_session_pull_64_frames", |b| {
        b.iter(|| {
            let mut session = Mp3Session::new();
            session
                .open_source(Box::new(Cursor::new(stream.clone())))
                .unwrap();
            let mut total = 0;
            while let Some(pcm) = session.pull() {
                total += pcm.len();
            }
            black_box(total)
        });
    });
}

fn bench_callback_fill(c: &mut Criterion) {
    let stream = make_tone_stream(64);
    c.bench_function("playback_callback_fill_512", |b| {
        let mut player = MusicPlayer::new(HeadlessBackend::default(), PlaybackConfig::default());
        player
            .load_source(Box::new(Cursor::new(stream.clone())))
            .unwrap();
        player.play(true).unwrap();
        let mut callback = player.callback();
        let mut out = vec![0i16; 512 * 2];
        b.iter(|| {
            callback.fill(black_box(&mut out));
        });
    });
}

criterion_group!(
    benches,
    bench_frame_decode,
    bench_synth_frame,
    bench_session_pull,
    bench_callback_fill
);
criterion_main!(benches);
