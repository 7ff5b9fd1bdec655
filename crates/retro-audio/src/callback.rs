//! 实时回调与共享播放状态.
//!
//! 控制线程与音频线程共享 {标志, 游标, 会话} 三元组, 由同一把互斥锁保护.
//! 回调永不阻塞在控制线程之外的资源上, 也永不失败: 锁中毒时直接取回内部数据.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bitflags::bitflags;
use log::{debug, warn};
use retro_codec::{Mp3Session, SessionState};

bitflags! {
    /// 播放标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PlaybackFlags: u8 {
        /// 正在播放 (含暂停中)
        const PLAYING = 1 << 0;
        /// 已暂停, 回调输出静音但保留游标与会话
        const PAUSED  = 1 << 1;
        /// 流结束后从头重新解码
        const LOOPING = 1 << 2;
    }
}

/// 线性淡出进度 (以采样帧计)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fade {
    total: u64,
    remaining: u64,
}

/// 控制线程与音频线程共享的播放状态
#[derive(Default)]
pub struct PlaybackState {
    flags: PlaybackFlags,
    /// 当前 PCM 缓冲内的交错采样偏移
    cursor: usize,
    session: Option<Mp3Session>,
    fade: Option<Fade>,
    loop_restart_limit: u32,
}

impl PlaybackState {
    pub fn new(loop_restart_limit: u32) -> Self {
        Self {
            loop_restart_limit,
            ..Self::default()
        }
    }

    pub fn flags(&self) -> PlaybackFlags {
        self.flags
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// 已加载且未被关闭的会话
    pub fn session(&self) -> Option<&Mp3Session> {
        self.session
            .as_ref()
            .filter(|s| s.state() != SessionState::Uninitialized)
    }

    pub(crate) fn session_mut(&mut self) -> Option<&mut Mp3Session> {
        self.session
            .as_mut()
            .filter(|s| s.state() != SessionState::Uninitialized)
    }

    /// 装入新会话, 清空标志与游标
    pub(crate) fn install(&mut self, session: Mp3Session) -> Option<Mp3Session> {
        self.flags = PlaybackFlags::empty();
        self.cursor = 0;
        self.fade = None;
        self.session.replace(session)
    }

    /// 停止并取出会话, 由调用方在锁外释放
    pub(crate) fn take_session(&mut self) -> Option<Mp3Session> {
        self.flags = PlaybackFlags::empty();
        self.cursor = 0;
        self.fade = None;
        self.session.take()
    }

    pub(crate) fn start(&mut self, looping: bool) {
        self.flags = PlaybackFlags::PLAYING;
        self.flags.set(PlaybackFlags::LOOPING, looping);
        self.cursor = 0;
        self.fade = None;
    }

    pub(crate) fn toggle_pause(&mut self) -> bool {
        self.flags.toggle(PlaybackFlags::PAUSED);
        self.flags.contains(PlaybackFlags::PAUSED)
    }

    pub(crate) fn begin_fade(&mut self, frames: u64) {
        let frames = frames.max(1);
        self.fade = Some(Fade {
            total: frames,
            remaining: frames,
        });
    }

    pub fn is_fading(&self) -> bool {
        self.fade.is_some()
    }

    fn is_audible(&self) -> bool {
        self.flags.contains(PlaybackFlags::PLAYING)
            && !self.flags.contains(PlaybackFlags::PAUSED)
            && self.session().is_some()
    }

    fn stop_playing(&mut self) {
        self.flags.remove(PlaybackFlags::PLAYING | PlaybackFlags::PAUSED);
        self.cursor = 0;
    }

    /// 从会话拉取 PCM 填入 out, 返回写入的采样数
    fn drain_into(&mut self, out: &mut [i16]) -> usize {
        if !self.is_audible() {
            return 0;
        }
        let Some(session) = self.session.as_mut() else {
            return 0;
        };

        let mut written = 0;
        let mut idle_restarts = 0;
        while written < out.len() {
            let cursor = self.cursor;
            if let Some(pcm) = session.current().filter(|pcm| cursor < pcm.len()) {
                let n = (pcm.len() - cursor).min(out.len() - written);
                out[written..written + n].copy_from_slice(&pcm.samples[cursor..cursor + n]);
                self.cursor += n;
                written += n;
                continue;
            }

            if session.pull().is_some() {
                self.cursor = 0;
                idle_restarts = 0;
                continue;
            }

            if self.flags.contains(PlaybackFlags::LOOPING)
                && idle_restarts < self.loop_restart_limit
            {
                idle_restarts += 1;
                match session.restart() {
                    Ok(()) => {
                        self.cursor = 0;
                        debug!("循环播放: 从头重新解码");
                        continue;
                    }
                    Err(e) => warn!("循环重启失败: {e}"),
                }
            }

            debug!("音乐播放结束");
            self.flags.remove(PlaybackFlags::PLAYING | PlaybackFlags::PAUSED);
            self.cursor = 0;
            self.fade = None;
            break;
        }
        written
    }

    /// 对已写入的采样施加淡出增益, 淡出结束时停止播放并关闭会话
    fn apply_fade(&mut self, out: &mut [i16]) {
        let Some(fade) = self.fade.as_mut() else {
            return;
        };
        let channels = self
            .session
            .as_ref()
            .and_then(Mp3Session::output_channels)
            .unwrap_or(1);

        for frame in out.chunks_mut(channels) {
            if fade.remaining == 0 {
                frame.fill(0);
                continue;
            }
            let gain = (fade.remaining << 16) / fade.total;
            for sample in frame.iter_mut() {
                *sample = ((i64::from(*sample) * gain as i64) >> 16) as i16;
            }
            fade.remaining -= 1;
        }

        if fade.remaining == 0 {
            debug!("淡出结束, 停止播放");
            self.fade = None;
            self.stop_playing();
            if let Some(session) = self.session.as_mut() {
                session.close();
            }
        }
    }
}

/// 获取共享状态; 锁中毒时取回内部数据, 保证回调不会失败
pub(crate) fn lock_state(state: &Mutex<PlaybackState>) -> MutexGuard<'_, PlaybackState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 实时填充回调
///
/// 由音频后端在其线程上按固定周期调用. 未播放、已暂停或未加载时整段输出静音.
pub struct StreamCallback {
    state: Arc<Mutex<PlaybackState>>,
}

impl StreamCallback {
    pub fn new(state: Arc<Mutex<PlaybackState>>) -> Self {
        Self { state }
    }

    /// 以交错 16 位 PCM 填满 out
    pub fn fill(&mut self, out: &mut [i16]) {
        let mut state = lock_state(&self.state);
        let written = state.drain_into(out);
        out[written..].fill(0);
        state.apply_fade(&mut out[..written]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retro_codec::mp3::StreamBuilder;
    use std::io::Cursor;

    /// 2 帧 44100 Hz 单声道单音流, 已完成首帧预取
    fn primed_state(frames: usize, looping: bool) -> Arc<Mutex<PlaybackState>> {
        let mut builder = StreamBuilder::new(44100, false).unwrap();
        builder.push_tone(frames, 24, 200);
        let mut session = Mp3Session::new();
        session
            .open_source(Box::new(Cursor::new(builder.finish())))
            .unwrap();
        assert!(session.pull().is_some());

        let mut state = PlaybackState::new(8);
        state.install(session);
        state.start(looping);
        Arc::new(Mutex::new(state))
    }

    #[test]
    fn test_idle_callback_outputs_silence() {
        let state = Arc::new(Mutex::new(PlaybackState::new(8)));
        let mut callback = StreamCallback::new(state);
        for frames in [1usize, 512, 4096] {
            let mut out = vec![0x55i16; frames * 2];
            callback.fill(&mut out);
            assert!(out.iter().all(|&s| s == 0));
        }
    }

    #[test]
    fn test_fill_spans_multiple_buffers_then_stops() {
        let state = primed_state(2, false);
        let mut callback = StreamCallback::new(Arc::clone(&state));

        // 2 帧共 2304 个采样, 请求 3000 个
        let mut out = vec![0x55i16; 3000];
        callback.fill(&mut out);
        assert!(out[..2304].iter().any(|&s| s != 0));
        assert!(out[2304..].iter().all(|&s| s == 0));

        let guard = lock_state(&state);
        assert!(!guard.flags().contains(PlaybackFlags::PLAYING));
        assert_eq!(guard.cursor(), 0);
    }

    #[test]
    fn test_cursor_tracks_partial_buffer() {
        let state = primed_state(2, false);
        let mut callback = StreamCallback::new(Arc::clone(&state));
        let mut out = vec![0i16; 1000];
        callback.fill(&mut out);
        assert_eq!(lock_state(&state).cursor(), 1000);
        callback.fill(&mut out);
        assert_eq!(lock_state(&state).cursor(), 2000 - 1152);
    }

    #[test]
    fn test_loop_replays_identical_audio() {
        let state = primed_state(2, true);
        let mut callback = StreamCallback::new(Arc::clone(&state));
        let mut out = vec![0i16; 2304 * 2];
        callback.fill(&mut out);
        assert_eq!(out[..2304], out[2304..]);
        assert!(lock_state(&state).flags().contains(PlaybackFlags::PLAYING));
    }

    #[test]
    fn test_paused_outputs_silence_and_keeps_cursor() {
        let state = primed_state(2, false);
        let mut callback = StreamCallback::new(Arc::clone(&state));
        let mut out = vec![0i16; 100];
        callback.fill(&mut out);
        assert!(lock_state(&state).toggle_pause());

        let mut paused = vec![0x55i16; 100];
        callback.fill(&mut paused);
        assert!(paused.iter().all(|&s| s == 0));
        assert_eq!(lock_state(&state).cursor(), 100);
    }

    #[test]
    fn test_fade_ramps_down_and_closes_session() {
        let state = primed_state(4, false);
        lock_state(&state).begin_fade(1000);
        let mut callback = StreamCallback::new(Arc::clone(&state));
        let mut out = vec![0i16; 1500];
        callback.fill(&mut out);
        assert!(out[1000..].iter().all(|&s| s == 0));

        let guard = lock_state(&state);
        assert!(!guard.flags().contains(PlaybackFlags::PLAYING));
        assert!(!guard.is_fading());
        assert!(guard.session().is_none());
    }

    #[test]
    fn test_empty_stream_loop_gives_up() {
        let mut session = Mp3Session::new();
        session
            .open_source(Box::new(Cursor::new(vec![0u8; 64])))
            .unwrap();
        let mut state = PlaybackState::new(3);
        state.install(session);
        state.start(true);
        let state = Arc::new(Mutex::new(state));

        let mut callback = StreamCallback::new(Arc::clone(&state));
        let mut out = vec![0x55i16; 256];
        callback.fill(&mut out);
        assert!(out.iter().all(|&s| s == 0));
        assert!(!lock_state(&state).flags().contains(PlaybackFlags::PLAYING));
    }
}
