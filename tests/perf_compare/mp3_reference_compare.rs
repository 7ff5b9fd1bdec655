//! MP3 解码精度对比测试 (对照 symphonia).
//!
//! 手动执行示例:
//! 1) cargo test --test mp3_reference_compare -- --nocapture --ignored test_mp3_compare -- data/1.mp3
//! 2) RETRO_MP3_COMPARE_INPUT=data/1.mp3 cargo test --test mp3_reference_compare -- --nocapture --ignored test_mp3_compare
//!
//! 未指定输入时, 对比 `data/samples/audio/*.mp3` (可用 RETRO_DATA_DIR 改变根目录)
//! 以及覆盖 MS/强度立体声、短块/混合块与 MPEG-2 LSF 的合成流.

use std::path::{Path, PathBuf};

use retro::codec::Mp3Session;
use retro::codec::mp3::{BlockLayout, StereoCoding, StreamBuilder};

/// 对比统计
struct CompareResult {
    samples: usize,
    max_abs_error: i32,
    psnr_db: f64,
}

fn compare_i16(ours: &[i16], reference: &[i16]) -> CompareResult {
    let len = ours.len().min(reference.len());
    let mut max_abs_error = 0;
    let mut sq_err = 0.0f64;
    for (&a, &b) in ours[..len].iter().zip(&reference[..len]) {
        let diff = (i32::from(a) - i32::from(b)).abs();
        max_abs_error = max_abs_error.max(diff);
        sq_err += f64::from(diff) * f64::from(diff);
    }
    let mse = if len == 0 { 0.0 } else { sq_err / len as f64 };
    let peak = f64::from(i16::MAX);
    let psnr_db = if mse == 0.0 {
        f64::INFINITY
    } else {
        10.0 * (peak * peak / mse).log10()
    };
    CompareResult {
        samples: len,
        max_abs_error,
        psnr_db,
    }
}

/// 使用本库解码, 返回 (采样率, 声道数, 交错 PCM)
fn decode_with_retro(path: &Path) -> (u32, u16, Vec<i16>) {
    let mut session = Mp3Session::new();
    session.open(path).unwrap();
    let mut pcm = Vec::new();
    let mut channels = 0;
    while let Some(buffer) = session.pull() {
        channels = buffer.channels;
        pcm.extend_from_slice(buffer.samples);
    }
    (session.sample_rate().unwrap_or(0), channels, pcm)
}

/// 使用 symphonia 解码, 返回 (采样率, 声道数, 交错 PCM)
fn decode_with_symphonia(path: &Path) -> (u32, u16, Vec<i16>) {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::DecoderOptions;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let file = std::fs::File::open(path).unwrap();
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    hint.with_extension("mp3");
    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .unwrap();

    let mut format = probed.format;
    let track = format.default_track().unwrap().clone();
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .unwrap();

    let mut sample_rate = 0;
    let mut channels = 0;
    let mut pcm = Vec::new();
    while let Ok(packet) = format.next_packet() {
        if packet.track_id() != track.id {
            continue;
        }
        let Ok(decoded) = decoder.decode(&packet) else {
            continue;
        };
        let spec = *decoded.spec();
        sample_rate = spec.rate;
        channels = spec.channels.count() as u16;
        let mut buf = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        pcm.extend_from_slice(buf.samples());
    }
    (sample_rate, channels, pcm)
}

/// 音频样本目录: `$RETRO_DATA_DIR/samples/audio`, 默认 `data/samples/audio`
fn audio_samples_dir() -> PathBuf {
    let base = std::env::var("RETRO_DATA_DIR").unwrap_or_else(|_| "data".to_string());
    PathBuf::from(base).join("samples").join("audio")
}

/// 合成流变体, 覆盖联合立体声、短块/混合块与 LSF
fn write_synthetic_variants(dir: &Path) -> Vec<PathBuf> {
    let joint = |ms, intensity| StereoCoding::Joint { ms, intensity };
    let variants = [
        ("tone_44100_stereo", 44100, StereoCoding::Plain, BlockLayout::Long),
        ("ms_48000", 48000, joint(true, false), BlockLayout::Long),
        ("ms_is_44100", 44100, joint(true, true), BlockLayout::Long),
        ("is_short_32000", 32000, joint(false, true), BlockLayout::Short),
        ("mixed_44100", 44100, StereoCoding::Plain, BlockLayout::Mixed),
        ("lsf_22050_ms", 22050, joint(true, false), BlockLayout::Long),
        ("lsf_24000_short", 24000, StereoCoding::Plain, BlockLayout::Short),
        ("lsf_16000_is", 16000, joint(false, true), BlockLayout::Mixed),
    ];
    variants
        .into_iter()
        .map(|(name, rate, coding, layout)| {
            let mut builder = StreamBuilder::new(rate, true)
                .unwrap()
                .stereo_coding(coding)
                .unwrap()
                .block_layout(layout);
            builder.push_tone(40, 11, 196);
            builder.push_tone(20, 90, 200);
            builder.push_silence(2);
            let path = dir.join(format!("{name}.mp3"));
            std::fs::write(&path, builder.finish()).unwrap();
            path
        })
        .collect()
}

/// 命令行 `--` 之后的参数或环境变量指定单个文件;
/// 否则对比样本目录中的全部 mp3 与合成变体.
fn resolve_inputs(dir: &Path) -> Vec<PathBuf> {
    let mut after_dd = std::env::args().skip_while(|v| v != "--").skip(1);
    if let Some(arg) = after_dd.next() {
        return vec![PathBuf::from(arg)];
    }
    if let Ok(env) = std::env::var("RETRO_MP3_COMPARE_INPUT") {
        if !env.trim().is_empty() {
            return vec![PathBuf::from(env)];
        }
    }
    let mut inputs: Vec<PathBuf> = std::fs::read_dir(audio_samples_dir())
        .map(|entries| {
            entries
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("mp3")))
                .collect()
        })
        .unwrap_or_default();
    inputs.sort();
    inputs.extend(write_synthetic_variants(dir));
    inputs
}

fn run_compare(path: &Path) -> CompareResult {
    let (ours_rate, ours_ch, ours) = decode_with_retro(path);
    let (ref_rate, ref_ch, reference) = decode_with_symphonia(path);
    assert_eq!(ours_rate, ref_rate, "{}: 采样率不一致", path.display());
    assert_eq!(ours_ch, ref_ch, "{}: 声道数不一致", path.display());

    let result = compare_i16(&ours, &reference);
    println!(
        "[{}] retro={} 采样, symphonia={} 采样, 对比 {} 采样, 最大误差 {}, PSNR {:.1} dB",
        path.display(),
        ours.len(),
        reference.len(),
        result.samples,
        result.max_abs_error,
        result.psnr_db
    );
    result
}

#[test]
#[ignore]
fn test_mp3_compare() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    let mut failed = Vec::new();
    for path in resolve_inputs(dir.path()) {
        let result = run_compare(&path);
        if result.samples == 0 || result.psnr_db < 60.0 {
            failed.push(format!("{} ({:.1} dB)", path.display(), result.psnr_db));
        }
    }
    assert!(failed.is_empty(), "PSNR 过低: {failed:?}");
}
