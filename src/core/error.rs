use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("FFmpeg 错误: {0}")]
    FFmpegError(#[from] ffmpeg_next::Error),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("配置解析错误: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("无效配置: {0}")]
    ConfigError(String),

    #[error("无法打开文件: {0}")]
    OpenError(String),

    #[error("无法找到视频流")]
    NoVideoStream,

    #[error("无法找到音频流")]
    NoAudioStream,

    #[error("没有可播放的媒体流")]
    NoPlayableStream,

    #[error("解码错误: {0}")]
    DecodeError(String),

    #[error("渲染错误: {0}")]
    RenderError(String),

    #[error("音频输出错误: {0}")]
    AudioError(String),

    #[error("其他错误: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, PlayerError>;
