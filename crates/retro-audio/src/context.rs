//! 音频上下文: 有界音轨表.
//!
//! 每条音轨是独立的 [`MusicPlayer`], 拥有各自的会话与采样数组,
//! 多条音轨同时播放互不干扰.

use std::fmt;
use std::path::Path;

use log::{debug, info};
use retro_codec::mp3::MediaSource;
use retro_core::{RetroError, RetroResult};

use crate::backend::AudioBackend;
use crate::config::PlaybackConfig;
use crate::player::MusicPlayer;

/// 音轨句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackId(usize);

impl TrackId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "track#{}", self.0)
    }
}

/// 音频上下文
pub struct AudioContext<B: AudioBackend + Clone> {
    backend: B,
    config: PlaybackConfig,
    tracks: Vec<Option<MusicPlayer<B>>>,
}

impl<B: AudioBackend + Clone> AudioContext<B> {
    /// 初始化上下文
    pub fn init(backend: B, config: PlaybackConfig) -> RetroResult<Self> {
        config.validate()?;
        let tracks = (0..config.max_tracks).map(|_| None).collect();
        info!("音频上下文已初始化: 最多 {} 条音轨", config.max_tracks);
        Ok(Self {
            backend,
            config,
            tracks,
        })
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// 在空闲槽位加载音乐文件
    pub fn load_track(&mut self, path: impl AsRef<Path>) -> RetroResult<TrackId> {
        let path = path.as_ref();
        self.insert_with(|player| player.load(path))
    }

    /// 在空闲槽位从字节源加载音乐
    pub fn load_track_source(&mut self, source: Box<dyn MediaSource>) -> RetroResult<TrackId> {
        self.insert_with(|player| player.load_source(source))
    }

    fn insert_with(
        &mut self,
        load: impl FnOnce(&mut MusicPlayer<B>) -> RetroResult<()>,
    ) -> RetroResult<TrackId> {
        let slot = self
            .tracks
            .iter()
            .position(Option::is_none)
            .ok_or_else(|| {
                RetroError::InvalidArgument(format!("音轨表已满 ({} 条)", self.tracks.len()))
            })?;
        let mut player = MusicPlayer::new(self.backend.clone(), self.config.clone());
        load(&mut player)?;
        self.tracks[slot] = Some(player);
        let id = TrackId(slot);
        debug!("{} 已加载", id);
        Ok(id)
    }

    pub fn track(&self, id: TrackId) -> Option<&MusicPlayer<B>> {
        self.tracks.get(id.0).and_then(Option::as_ref)
    }

    pub fn track_mut(&mut self, id: TrackId) -> Option<&mut MusicPlayer<B>> {
        self.tracks.get_mut(id.0).and_then(Option::as_mut)
    }

    /// 停止并释放音轨, 返回该槽位是否被占用
    pub fn release_track(&mut self, id: TrackId) -> bool {
        match self.tracks.get_mut(id.0).and_then(Option::take) {
            Some(mut player) => {
                player.stop();
                debug!("{} 已释放", id);
                true
            }
            None => false,
        }
    }

    /// 已占用的槽位数
    pub fn active_tracks(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_some()).count()
    }

    /// 停止并释放全部音轨
    pub fn shutdown(&mut self) {
        let mut released = 0;
        for track in self.tracks.iter_mut() {
            if let Some(mut player) = track.take() {
                player.stop();
                released += 1;
            }
        }
        if released > 0 {
            info!("音频上下文已关闭, 释放 {} 条音轨", released);
        }
    }
}

impl<B: AudioBackend + Clone> Drop for AudioContext<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
