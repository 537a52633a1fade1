use serde::{Deserialize, Serialize};

/// 流水线中的媒体流角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Video => "video",
            StreamKind::Audio => "audio",
        }
    }

    /// 日志用的中文标签
    pub fn label(&self) -> &'static str {
        match self {
            StreamKind::Video => "🎬 视频",
            StreamKind::Audio => "🔊 音频",
        }
    }
}

/// 像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    RGBA,
    NV12,
}

/// 视频帧数据（已转换，紧密排列）
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub pts: i64,           // 显示时间戳（毫秒）
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,      // CPU 内存数据
}

/// 音频帧数据（交错排列的 f32 PCM）
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub pts: i64,           // 显示时间戳（毫秒）
    pub sample_rate: u32,
    pub channels: u16,
    pub data: Vec<f32>,
}

/// 音频输出实际使用的参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSpec {
    pub sample_rate: u32,
    pub channels: u16,
}

/// 媒体信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaInfo {
    pub duration: i64,          // 总时长（毫秒）
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub video_codec: String,
    pub audio_codec: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// 单个消费线程的统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerStats {
    /// 从队列取出的包数
    pub packets: u64,
    /// 成功渲染的帧数
    pub frames_rendered: u64,
    /// 解码失败（已跳过）的次数
    pub decode_errors: u64,
    /// 渲染失败（已跳过）的次数
    pub render_errors: u64,
}

/// 生产线程的统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerStats {
    pub packets_read: u64,
    pub video_packets: u64,
    pub audio_packets: u64,
    /// 不属于任何队列、直接释放的包
    pub discarded: u64,
    /// 排空阶段因队列已满被丢弃的包
    pub dropped: u64,
}

/// 会话结束方式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionOutcome {
    /// 正常读到文件末尾
    Completed,
    /// 读包出错后提前结束
    ReadFailed { reason: String },
    /// 宿主主动停止
    Cancelled,
}

/// 会话最终报告
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    pub outcome: SessionOutcome,
    pub producer: ProducerStats,
    pub video: Option<ConsumerStats>,
    pub audio: Option<ConsumerStats>,
    /// 销毁队列时仍留在队列中的包（只有取消时才可能非零）
    pub leftover_packets: usize,
}

/// 会话状态事件（回传给宿主）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Started { video: bool, audio: bool },
    Prepared { stream: StreamKind },
    PrepareFailed { stream: StreamKind, reason: String },
    InputEnded { packets: u64 },
    ReadFailed { reason: String },
    StreamDrained { stream: StreamKind, stats: ConsumerStats },
    Finished(SessionReport),
}
