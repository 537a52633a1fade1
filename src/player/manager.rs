use crate::core::{log_ctx, AudioSpec, MediaInfo, PipelineConfig, PlayerError, Result};
use crate::pipeline::{PlaybackSession, StreamPipeline};
use crate::player::audio_output::{AudioSink, AudioStage};
use crate::player::demuxer::Demuxer;
use crate::player::demuxer_source::DemuxerSource;
use crate::player::video_output::{VideoSink, VideoStage};
use ffmpeg_next as ffmpeg;
use log::{info, warn};

/// 播放目标：提供哪个就播放哪个流
#[derive(Default)]
pub struct MediaTargets {
    pub video: Option<Box<dyn VideoSink>>,
    pub audio: Option<Box<dyn AudioSink>>,
}

impl MediaTargets {
    pub fn new(video: impl VideoSink + 'static, audio: impl AudioSink + 'static) -> Self {
        Self {
            video: Some(Box::new(video)),
            audio: Some(Box::new(audio)),
        }
    }

    pub fn video_only(video: impl VideoSink + 'static) -> Self {
        Self {
            video: Some(Box::new(video)),
            audio: None,
        }
    }

    pub fn audio_only(audio: impl AudioSink + 'static) -> Self {
        Self {
            video: None,
            audio: Some(Box::new(audio)),
        }
    }
}

/// 打开媒体文件并启动播放会话（立即返回）
///
/// 文件中缺少某个目标对应的流时只播放另一个；一个都播放不了时返回错误。
pub fn play(path: &str, targets: MediaTargets, config: &PipelineConfig) -> Result<PlaybackSession> {
    config.validate()?;
    let demuxer = Demuxer::open(path)?;
    let (session, _) = start_with(demuxer, targets, config)?;
    Ok(session)
}

/// 与 [`play`] 相同，同时返回文件的媒体信息
pub fn play_with_info(
    path: &str,
    targets: MediaTargets,
    config: &PipelineConfig,
) -> Result<(PlaybackSession, MediaInfo)> {
    config.validate()?;
    let demuxer = Demuxer::open(path)?;
    start_with(demuxer, targets, config)
}

fn start_with(
    demuxer: Demuxer,
    targets: MediaTargets,
    config: &PipelineConfig,
) -> Result<(PlaybackSession, MediaInfo)> {
    let media_info = demuxer.media_info().clone();
    let MediaTargets { video, audio } = targets;

    let video = match video {
        Some(sink) if demuxer.video_stream_index().is_some() => {
            let decoder = demuxer.video_decoder()?;
            let stage = VideoStage::new(&decoder, sink);
            Some(StreamPipeline::new(decoder, stage))
        }
        Some(_) => {
            warn!("{} ⚠️  文件中没有视频流，只播放音频", log_ctx());
            None
        }
        None => None,
    };

    let audio = match audio {
        Some(sink) if demuxer.audio_stream_index().is_some() => {
            let decoder = demuxer.audio_decoder()?;
            let requested = AudioSpec {
                sample_rate: config.audio_sample_rate.unwrap_or_else(|| decoder.rate()),
                channels: config.audio_channels,
            };
            let stage = AudioStage::new(&decoder, sink, requested);
            Some(StreamPipeline::new(decoder, stage))
        }
        Some(_) => {
            warn!("{} ⚠️  文件中没有音频流，只播放视频", log_ctx());
            None
        }
        None => None,
    };

    if video.is_none() && audio.is_none() {
        return Err(PlayerError::NoPlayableStream);
    }

    info!(
        "{} 🎮 开始播放（视频: {}，音频: {}）",
        log_ctx(),
        video.is_some(),
        audio.is_some()
    );
    let session = PlaybackSession::start::<_, ffmpeg::frame::Video, ffmpeg::frame::Audio>(
        demuxer, video, audio, config,
    )?;
    Ok((session, media_info))
}
