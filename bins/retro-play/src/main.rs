//! # retro-play
//!
//! Retro 引擎 MP3 音乐播放器.
//!
//! 支持:
//! - SDL2 实时播放, 或 `--headless` 由本进程驱动回调 (不需要声卡)
//! - 循环播放、限定时长与淡出
//! - `--probe`: 完整解码一遍并输出 JSON 摘要
//! - `--tone N`: 先把 N 帧测试单音写入输入路径, 再播放

mod logging;
mod sdl;

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use clap::{ArgAction, Parser};
use log::info;
use retro_audio::{AudioBackend, HeadlessBackend, MusicPlayer, OutputDevice, PlaybackConfig};
use retro_codec::Mp3Session;
use retro_codec::mp3::StreamBuilder;
use serde::Serialize;

use crate::sdl::SdlBackend;

/// Retro 引擎 MP3 音乐播放器
#[derive(Parser, Debug)]
#[command(name = "retro-play", version, about = "Retro 引擎 MP3 音乐播放器")]
struct Args {
    /// 输入 MP3 文件路径
    input: PathBuf,

    /// 循环播放
    #[arg(long = "loop")]
    looping: bool,

    /// 不打开声卡, 由本进程驱动回调并统计输出
    #[arg(long)]
    headless: bool,

    /// 播放时长上限 (秒), 到达后停止或淡出
    #[arg(long, value_parser = parse_seconds)]
    seconds: Option<Duration>,

    /// 到达时长上限时的淡出时长 (毫秒, 0 为立即停止)
    #[arg(long, default_value_t = 0)]
    fadeout_ms: u32,

    /// 设备缓冲帧数, 覆盖配置文件
    #[arg(long)]
    buffer_frames: Option<u16>,

    /// JSON 格式的播放配置文件
    #[arg(long)]
    config: Option<PathBuf>,

    /// 只探测并输出 JSON 摘要
    #[arg(long)]
    probe: bool,

    /// 生成指定帧数的 44100 Hz 测试单音并写入输入路径
    #[arg(long, value_name = "FRAMES")]
    tone: Option<usize>,

    /// 日志详细程度 (-v debug, -vv trace retro, -vvv trace 全部)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// 解析 `--seconds`: 只接受有限的非负秒数
fn parse_seconds(value: &str) -> std::result::Result<Duration, String> {
    let secs: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("无效的秒数 `{value}`: {e}"))?;
    Duration::try_from_secs_f64(secs).map_err(|_| format!("秒数必须是有限的非负数: `{value}`"))
}

/// 会话仍在且未停止 (暂停中也继续等待)
fn still_active<B: AudioBackend>(player: &MusicPlayer<B>) -> bool {
    player.is_loaded() && (player.is_playing() || player.is_paused())
}

/// 探测结果
#[derive(Serialize)]
struct ProbeOutput {
    filename: String,
    sample_rate: u32,
    channels: usize,
    frames: u64,
    samples_per_channel: u64,
    duration: f64,
    peak: i16,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init("retro-play", args.verbose)?;

    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
            PlaybackConfig::from_json(&text)?
        }
        None => PlaybackConfig::default(),
    };
    if let Some(frames) = args.buffer_frames {
        config.buffer_frames = frames;
        config.validate()?;
    }

    if let Some(frames) = args.tone {
        write_tone(&args.input, frames)?;
    }

    if args.probe {
        let output = probe(&args.input)?;
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if args.headless {
        play_headless(&args, config)
    } else {
        play_sdl(&args, config)
    }
}

/// 写入 440 Hz 附近的测试单音
fn write_tone(path: &Path, frames: usize) -> Result<()> {
    let mut builder = StreamBuilder::new(44100, false)?;
    // 频点 11: 11 * 44100 / 1152 ≈ 421 Hz
    builder.push_tone(frames, 11, 196);
    std::fs::write(path, builder.finish())
        .with_context(|| format!("写入测试单音失败: {}", path.display()))?;
    info!("已写入 {} 帧测试单音: {}", frames, path.display());
    Ok(())
}

/// 完整解码一遍, 统计帧数与峰值
fn probe(path: &Path) -> Result<ProbeOutput> {
    let mut session = Mp3Session::new();
    session
        .open(path)
        .with_context(|| format!("打开失败: {}", path.display()))?;

    let mut channels = 0;
    let mut samples_per_channel = 0u64;
    let mut peak = 0i16;
    while let Some(pcm) = session.pull() {
        channels = usize::from(pcm.channels);
        samples_per_channel += pcm.length as u64;
        if let Some(max) = pcm.samples.iter().map(|s| s.saturating_abs()).max() {
            peak = peak.max(max);
        }
    }
    let sample_rate = session
        .sample_rate()
        .ok_or_else(|| anyhow!("没有可解码的帧: {}", path.display()))?;

    Ok(ProbeOutput {
        filename: path.display().to_string(),
        sample_rate,
        channels,
        frames: session.frames_decoded(),
        samples_per_channel,
        duration: samples_per_channel as f64 / f64::from(sample_rate),
        peak,
    })
}

/// 无设备播放: 按设备周期驱动回调直到播放结束或到达时长上限
fn play_headless(args: &Args, config: PlaybackConfig) -> Result<()> {
    let mut player = MusicPlayer::new(HeadlessBackend::default(), config);
    player
        .load(&args.input)
        .with_context(|| format!("加载失败: {}", args.input.display()))?;
    player.play(args.looping)?;

    let device = player
        .device_mut()
        .ok_or_else(|| anyhow!("播放设备未打开"))?;
    let spec = device.spec();
    let mut period = vec![0i16; device.period_samples()];
    let limit = args
        .seconds
        .map(|d| (d.as_secs_f64() * f64::from(spec.freq)) as u64)
        .unwrap_or(u64::MAX);

    let mut rendered = 0u64;
    let mut peak = 0i16;
    let mut fading = false;
    while still_active(&player) {
        if rendered >= limit && !fading {
            if args.fadeout_ms == 0 {
                player.stop();
                break;
            }
            player.fadeout(args.fadeout_ms);
            fading = true;
        }
        let Some(device) = player.device_mut() else {
            break;
        };
        device.render_into(&mut period);
        if let Some(max) = period.iter().map(|s| s.saturating_abs()).max() {
            peak = peak.max(max);
        }
        rendered += u64::from(spec.buffer_frames);
    }

    info!(
        "无设备播放结束: {} 帧 ({:.2} 秒), 峰值 {}",
        rendered,
        rendered as f64 / f64::from(spec.freq),
        peak
    );
    Ok(())
}

/// 通过 SDL2 播放, 主线程只轮询播放状态
fn play_sdl(args: &Args, config: PlaybackConfig) -> Result<()> {
    let sdl = sdl2::init().map_err(|e| anyhow!("SDL 初始化失败: {e}"))?;
    let audio = sdl.audio().map_err(|e| anyhow!("SDL 音频子系统初始化失败: {e}"))?;

    let mut player = MusicPlayer::new(SdlBackend::new(audio), config);
    player
        .load(&args.input)
        .with_context(|| format!("加载失败: {}", args.input.display()))?;
    player.play(args.looping)?;
    info!("开始播放: {}", args.input.display());

    let started = Instant::now();
    let limit = args.seconds;
    let mut fading = false;
    while still_active(&player) {
        if limit.is_some_and(|l| started.elapsed() >= l) && !fading {
            if args.fadeout_ms == 0 {
                player.stop();
                break;
            }
            player.fadeout(args.fadeout_ms);
            fading = true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    player.stop();
    info!("播放结束, 用时 {:.2} 秒", started.elapsed().as_secs_f64());
    Ok(())
}
