//! 音乐播放器控制面.
//!
//! 状态机: Stopped → Playing ⇄ Paused → Stopped. 加载时同步预取首帧,
//! 以首帧格式打开输出设备; 停止时先静音设备再释放会话.

use std::path::Path;
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use retro_codec::mp3::MediaSource;
use retro_codec::{Mp3Session, SessionState};
use retro_core::{RetroError, RetroResult};

use crate::backend::{AudioBackend, DeviceSpec, OutputDevice};
use crate::callback::{PlaybackFlags, PlaybackState, StreamCallback, lock_state};
use crate::config::PlaybackConfig;

/// 单条音乐的播放器
pub struct MusicPlayer<B: AudioBackend> {
    backend: B,
    config: PlaybackConfig,
    state: Arc<Mutex<PlaybackState>>,
    device: Option<B::Device>,
}

impl<B: AudioBackend> MusicPlayer<B> {
    pub fn new(backend: B, config: PlaybackConfig) -> Self {
        let state = PlaybackState::new(config.loop_restart_limit);
        Self {
            backend,
            config,
            state: Arc::new(Mutex::new(state)),
            device: None,
        }
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// 绑定到本播放器共享状态的实时回调
    pub fn callback(&self) -> StreamCallback {
        StreamCallback::new(Arc::clone(&self.state))
    }

    /// 加载 MP3 文件: 打开会话、预取首帧并按首帧格式打开输出设备
    pub fn load(&mut self, path: impl AsRef<Path>) -> RetroResult<()> {
        let path = path.as_ref();
        // 无论新文件能否打开, 上一首都先停止并释放
        self.stop();
        let mut session = Mp3Session::new();
        if let Err(e) = session.open(path) {
            warn!("打开音乐文件失败 {}: {}", path.display(), e);
            return Err(e);
        }
        self.load_session(session)?;
        info!("已加载音乐: {}", path.display());
        Ok(())
    }

    /// 从任意字节源加载
    pub fn load_source(&mut self, source: Box<dyn MediaSource>) -> RetroResult<()> {
        self.stop();
        let mut session = Mp3Session::new();
        session.open_source(source)?;
        self.load_session(session)
    }

    fn load_session(&mut self, mut session: Mp3Session) -> RetroResult<()> {
        self.stop();

        let (freq, channels) = match session.pull() {
            Some(pcm) => (pcm.sample_rate, pcm.channels),
            None => return Err(RetroError::InvalidData("无法解码首帧".into())),
        };
        let desired = DeviceSpec {
            freq,
            channels,
            buffer_frames: self.config.buffer_frames,
        };
        let callback = self.callback();
        let device = self.backend.open_playback(&desired, callback)?;

        let obtained = device.spec();
        if obtained.freq != freq {
            return Err(RetroError::Device(format!(
                "设备采样率 {} Hz 与音乐采样率 {} Hz 不一致",
                obtained.freq, freq
            )));
        }
        if obtained.channels != channels {
            debug!("设备声道数 {} 与音乐声道数 {} 不一致, 按设备输出", obtained.channels, channels);
            session.set_output_channels(usize::from(obtained.channels));
        }

        let previous = lock_state(&self.state).install(session);
        drop(previous);
        self.device = Some(device);
        debug!(
            "音乐已就绪: {} Hz, {} 声道, 缓冲 {} 帧",
            obtained.freq, obtained.channels, obtained.buffer_frames
        );
        Ok(())
    }

    /// 开始播放; 游标归零, 上一次已播完时从头重新解码
    pub fn play(&mut self, looping: bool) -> RetroResult<()> {
        {
            let mut state = lock_state(&self.state);
            let session = state.session_mut().ok_or(RetroError::NotLoaded)?;
            if session.state() == SessionState::Exhausted {
                session.restart()?;
                if session.pull().is_none() {
                    return Err(RetroError::InvalidData("重新解码首帧失败".into()));
                }
            }
            state.start(looping);
        }
        if let Some(device) = self.device.as_mut() {
            device.resume();
        }
        debug!("开始播放 (循环: {})", looping);
        Ok(())
    }

    /// 切换暂停; 不重置游标与会话
    pub fn pause(&mut self) {
        let paused = {
            let mut state = lock_state(&self.state);
            if !state.flags().contains(PlaybackFlags::PLAYING) {
                return;
            }
            state.toggle_pause()
        };
        if let Some(device) = self.device.as_mut() {
            if paused {
                device.pause();
            } else {
                device.resume();
            }
        }
        debug!("{}", if paused { "已暂停" } else { "已恢复" });
    }

    /// 停止播放并释放会话与设备
    ///
    /// 先静音设备, 返回时回调保证不再访问已释放的会话.
    pub fn stop(&mut self) {
        if let Some(device) = self.device.as_mut() {
            device.pause();
        }
        let session = lock_state(&self.state).take_session();
        self.device = None;
        if session.is_some() {
            debug!("音乐已停止, 会话已释放");
        }
    }

    /// 淡出: 0 为立即停止, 否则在 `ms` 毫秒内线性衰减后停止
    pub fn fadeout(&mut self, ms: u32) {
        if ms == 0 {
            self.stop();
            return;
        }
        let mut state = lock_state(&self.state);
        if !state.flags().contains(PlaybackFlags::PLAYING) {
            return;
        }
        let rate = state.session().and_then(Mp3Session::sample_rate).unwrap_or(0);
        state.begin_fade(u64::from(ms) * u64::from(rate) / 1000);
        debug!("开始淡出: {} ms", ms);
    }

    /// 是否正在发声; 暂停中返回 false
    pub fn is_playing(&self) -> bool {
        let flags = lock_state(&self.state).flags();
        flags.contains(PlaybackFlags::PLAYING) && !flags.contains(PlaybackFlags::PAUSED)
    }

    pub fn is_paused(&self) -> bool {
        lock_state(&self.state)
            .flags()
            .contains(PlaybackFlags::PAUSED)
    }

    /// 是否持有可播放的会话
    pub fn is_loaded(&self) -> bool {
        lock_state(&self.state).session().is_some()
    }

    pub fn device(&self) -> Option<&B::Device> {
        self.device.as_ref()
    }

    pub fn device_mut(&mut self) -> Option<&mut B::Device> {
        self.device.as_mut()
    }
}

impl<B: AudioBackend> Drop for MusicPlayer<B> {
    fn drop(&mut self) {
        self.stop();
    }
}
