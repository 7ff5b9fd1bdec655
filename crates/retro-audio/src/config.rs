//! 播放配置.

use retro_core::{RetroError, RetroResult};
use serde::{Deserialize, Serialize};

/// 播放配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PlaybackConfig {
    /// 设备每次回调的采样帧数
    #[serde(default = "default_buffer_frames")]
    pub buffer_frames: u16,
    /// 音轨表容量
    #[serde(default = "default_max_tracks")]
    pub max_tracks: usize,
    /// 单次回调内连续空循环重启的上限, 超过后停止播放
    #[serde(default = "default_loop_restart_limit")]
    pub loop_restart_limit: u32,
}

fn default_buffer_frames() -> u16 {
    512
}

fn default_max_tracks() -> usize {
    4
}

fn default_loop_restart_limit() -> u32 {
    8
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            buffer_frames: default_buffer_frames(),
            max_tracks: default_max_tracks(),
            loop_restart_limit: default_loop_restart_limit(),
        }
    }
}

impl PlaybackConfig {
    /// 从 JSON 文本解析并校验
    pub fn from_json(text: &str) -> RetroResult<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| RetroError::InvalidArgument(format!("播放配置解析失败: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// 校验取值范围
    pub fn validate(&self) -> RetroResult<()> {
        if self.buffer_frames == 0 {
            return Err(RetroError::InvalidArgument("buffer_frames 不能为 0".into()));
        }
        if self.max_tracks == 0 {
            return Err(RetroError::InvalidArgument("max_tracks 不能为 0".into()));
        }
        Ok(())
    }
}
