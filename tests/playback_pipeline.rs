//! 端到端集成测试: 实时播放管线.
//!
//! 测试流程: 合成 MP3 → 播放器加载 (预取首帧, 按首帧格式打开设备) → 无设备后端驱动回调 → 验证输出

use std::io::Cursor;

use retro::audio::{
    AudioContext, HeadlessBackend, MusicPlayer, OutputDevice, PlaybackConfig, PlaybackState,
    StreamCallback,
};
use retro::codec::mp3::StreamBuilder;
use retro::core::RetroError;
use std::sync::{Arc, Mutex};

/// 每帧每声道采样数
const FRAME_SAMPLES: usize = 1152;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn fixture(frames: usize, stereo: bool) -> Vec<u8> {
    let mut builder = StreamBuilder::new(44100, stereo).unwrap();
    builder.push_tone(frames, 24, 200);
    builder.finish()
}

fn player_with(backend: HeadlessBackend, bytes: Vec<u8>) -> MusicPlayer<HeadlessBackend> {
    let mut player = MusicPlayer::new(backend, PlaybackConfig::default());
    player.load_source(Box::new(Cursor::new(bytes))).unwrap();
    player
}

#[test]
fn test_callback_silent_before_load() {
    init_logger();
    let player = MusicPlayer::new(HeadlessBackend::default(), PlaybackConfig::default());
    let mut callback = player.callback();
    for frames in [1usize, 512, 4096] {
        let mut out = vec![i16::MAX; frames * 2];
        callback.fill(&mut out);
        assert!(out.iter().all(|&s| s == 0), "{frames} 帧应全部静音");
    }

    let mut detached = StreamCallback::new(Arc::new(Mutex::new(PlaybackState::new(8))));
    let mut out = vec![1i16; 64];
    detached.fill(&mut out);
    assert!(out.iter().all(|&s| s == 0));
}

#[test]
fn test_callback_silent_when_loaded_but_not_playing() {
    let player = player_with(HeadlessBackend::default(), fixture(2, false));
    let mut callback = player.callback();
    let mut out = vec![7i16; 512];
    callback.fill(&mut out);
    assert!(out.iter().all(|&s| s == 0));
}

#[test]
fn test_loop_round_trip_is_seamless() {
    init_logger();
    let mut player = player_with(HeadlessBackend::default(), fixture(2, false));
    player.play(true).unwrap();

    let cycle = 2 * FRAME_SAMPLES;
    let device = player.device_mut().unwrap();
    let period = device.period_samples();
    let mut output = Vec::new();
    while output.len() < 5 * cycle {
        output.extend(device.render(period / device.spec().channels as usize));
    }

    // 每次循环都从第 1 帧的同一位置重新开始
    for k in 0..4 * cycle {
        assert_eq!(output[k], output[k + cycle], "采样 {k} 处循环不连续");
    }
    // 首帧之后不出现整段缓冲的静音
    for window in output[FRAME_SAMPLES..].chunks(period) {
        assert!(window.iter().any(|&s| s != 0));
    }
    assert!(player.is_playing());
}

#[test]
fn test_stop_then_play_without_load() {
    let mut player = player_with(HeadlessBackend::default(), fixture(3, true));
    player.play(false).unwrap();
    player.device_mut().unwrap().render(256);
    let mut callback = player.callback();

    player.stop();
    assert!(matches!(player.play(false), Err(RetroError::NotLoaded)));
    assert!(!player.is_playing());

    let mut out = vec![3i16; 1024];
    callback.fill(&mut out);
    assert!(out.iter().all(|&s| s == 0));

    // 重新加载后可以再次播放
    player.load_source(Box::new(Cursor::new(fixture(3, true)))).unwrap();
    player.play(false).unwrap();
    assert!(player.is_playing());
}

#[test]
fn test_mono_source_fills_both_channels() {
    let mut player = player_with(HeadlessBackend::default().with_channels(2), fixture(3, false));
    player.play(false).unwrap();
    let out = player.device_mut().unwrap().render(3 * FRAME_SAMPLES);
    assert!(out.iter().any(|&s| s != 0));
    for frame in out.chunks_exact(2) {
        assert_eq!(frame[0], frame[1]);
    }
}

#[test]
fn test_stereo_source_on_mono_device() {
    let mut player = player_with(HeadlessBackend::default().with_channels(1), fixture(2, true));
    assert_eq!(player.device().unwrap().spec().channels, 1);
    player.play(false).unwrap();
    let out = player.device_mut().unwrap().render(2 * FRAME_SAMPLES);
    assert_eq!(out.len(), 2 * FRAME_SAMPLES);
    assert!(out.iter().any(|&s| s != 0));
}

#[test]
fn test_context_plays_tracks_concurrently() {
    init_logger();
    let config = PlaybackConfig {
        max_tracks: 2,
        ..PlaybackConfig::default()
    };
    let mut ctx = AudioContext::init(HeadlessBackend::default(), config).unwrap();
    let music = ctx
        .load_track_source(Box::new(Cursor::new(fixture(4, true))))
        .unwrap();
    let jingle = ctx
        .load_track_source(Box::new(Cursor::new(fixture(1, false))))
        .unwrap();

    ctx.track_mut(music).unwrap().play(true).unwrap();
    ctx.track_mut(jingle).unwrap().play(false).unwrap();

    for _ in 0..8 {
        for id in [music, jingle] {
            if let Some(device) = ctx.track_mut(id).and_then(|t| t.device_mut()) {
                device.render(512);
            }
        }
    }
    assert!(ctx.track(music).unwrap().is_playing());
    assert!(!ctx.track(jingle).unwrap().is_playing());

    ctx.shutdown();
    assert_eq!(ctx.active_tracks(), 0);
}
