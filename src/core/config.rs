use crate::core::{PlayerError, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 队列默认容量（包）
pub const DEFAULT_QUEUE_CAPACITY: usize = 50;

/// 流水线配置
///
/// 所有字段都有默认值，JSON 文件里只需写要覆盖的字段：
///
/// ```json
/// { "video_queue_capacity": 80, "audio_sample_rate": 48000 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 视频包队列容量
    pub video_queue_capacity: usize,
    /// 音频包队列容量
    pub audio_queue_capacity: usize,
    /// 排空阶段打印剩余队列深度的间隔（毫秒）
    pub drain_log_interval_ms: u64,
    /// 音频输出声道数
    pub audio_channels: u16,
    /// 音频输出采样率，None 表示沿用编码器采样率
    pub audio_sample_rate: Option<u32>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            video_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            audio_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            drain_log_interval_ms: 1000,
            audio_channels: 2,
            audio_sample_rate: None,
        }
    }
}

impl PipelineConfig {
    /// 从 JSON 文件加载配置
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("📄 加载配置文件: {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.video_queue_capacity == 0 || self.audio_queue_capacity == 0 {
            return Err(PlayerError::ConfigError("队列容量必须大于 0".to_string()));
        }
        if self.drain_log_interval_ms == 0 {
            return Err(PlayerError::ConfigError("排空日志间隔必须大于 0".to_string()));
        }
        if !(1..=8).contains(&self.audio_channels) {
            return Err(PlayerError::ConfigError(format!(
                "不支持的声道数: {}",
                self.audio_channels
            )));
        }
        if self.audio_sample_rate == Some(0) {
            return Err(PlayerError::ConfigError("采样率必须大于 0".to_string()));
        }
        Ok(())
    }

    pub fn drain_log_interval(&self) -> Duration {
        Duration::from_millis(self.drain_log_interval_ms)
    }
}
