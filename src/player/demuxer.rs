use crate::core::{log_ctx, MediaInfo, PlayerError, Result};
use crate::player::decoder::{AudioDecoder, VideoDecoder};
use crate::player::demuxer_source::{DemuxerSource, MediaPacket};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{format, media};
use log::{debug, info};

/// 解封装器 - 负责读取媒体文件，把各个流的包交给生产线程
pub struct Demuxer {
    input_ctx: format::context::Input,
    video_stream_index: Option<usize>,
    audio_stream_index: Option<usize>,
    media_info: MediaInfo,  // 缓存媒体信息
    source_path: String,    // 媒体源路径（用于描述）
}

// format::context::Input 只在生产线程中使用
unsafe impl Send for Demuxer {}

impl Demuxer {
    /// 打开媒体文件
    pub fn open(path: &str) -> Result<Self> {
        info!("{} 正在打开文件: {}", log_ctx(), path);
        ffmpeg::init().map_err(|e| PlayerError::OpenError(format!("FFmpeg 初始化失败: {}", e)))?;

        let input_ctx = format::input(&path)
            .map_err(|e| PlayerError::OpenError(format!("无法打开文件: {}", e)))?;

        // 查找视频流和音频流
        let video_stream_index = input_ctx
            .streams()
            .best(media::Type::Video)
            .map(|s| s.index());

        let audio_stream_index = input_ctx
            .streams()
            .best(media::Type::Audio)
            .map(|s| s.index());

        debug!("视频流索引: {:?}", video_stream_index);
        debug!("音频流索引: {:?}", audio_stream_index);

        if video_stream_index.is_none() && audio_stream_index.is_none() {
            return Err(PlayerError::NoPlayableStream);
        }

        let mut demuxer = Self {
            input_ctx,
            video_stream_index,
            audio_stream_index,
            media_info: MediaInfo::default(),  // 临时默认值
            source_path: path.to_string(),
        };

        // 获取并缓存媒体信息
        demuxer.media_info = demuxer.extract_media_info()?;
        info!(
            "{} ✅ 文件已打开: {}x{} @ {:.2} fps, 视频 {}, 音频 {} ({} Hz, {} 声道), 时长 {} ms",
            log_ctx(),
            demuxer.media_info.width,
            demuxer.media_info.height,
            demuxer.media_info.fps,
            demuxer.media_info.video_codec,
            demuxer.media_info.audio_codec,
            demuxer.media_info.sample_rate,
            demuxer.media_info.channels,
            demuxer.media_info.duration
        );

        Ok(demuxer)
    }

    /// 提取媒体信息（内部使用），缺少的流对应字段保持默认值
    fn extract_media_info(&self) -> Result<MediaInfo> {
        let mut info = MediaInfo {
            duration: self.input_ctx.duration().max(0) / 1000, // 微秒转毫秒
            video_codec: "none".to_string(),
            audio_codec: "none".to_string(),
            ..MediaInfo::default()
        };

        if let Some(video_stream) = self.video_stream_index.and_then(|idx| self.input_ctx.stream(idx)) {
            let parameters = video_stream.parameters();
            info.video_codec = parameters.id().name().to_string();

            let decoder = ffmpeg::codec::context::Context::from_parameters(parameters)?
                .decoder()
                .video()?;
            info.width = decoder.width();
            info.height = decoder.height();

            let fps = video_stream.avg_frame_rate();
            if fps.denominator() != 0 {
                info.fps = fps.numerator() as f64 / fps.denominator() as f64;
            }
        }

        if let Some(audio_stream) = self.audio_stream_index.and_then(|idx| self.input_ctx.stream(idx)) {
            let parameters = audio_stream.parameters();
            info.audio_codec = parameters.id().name().to_string();

            let decoder = ffmpeg::codec::context::Context::from_parameters(parameters)?
                .decoder()
                .audio()?;
            info.sample_rate = decoder.rate();
            info.channels = decoder.channels();
        }

        Ok(info)
    }

    /// 为视频流创建解码器
    pub fn video_decoder(&self) -> Result<VideoDecoder> {
        let stream = self
            .video_stream_index
            .and_then(|idx| self.input_ctx.stream(idx))
            .ok_or(PlayerError::NoVideoStream)?;
        VideoDecoder::from_stream(stream)
    }

    /// 为音频流创建解码器
    pub fn audio_decoder(&self) -> Result<AudioDecoder> {
        let stream = self
            .audio_stream_index
            .and_then(|idx| self.input_ctx.stream(idx))
            .ok_or(PlayerError::NoAudioStream)?;
        AudioDecoder::from_stream(stream)
    }

    /// 获取媒体信息
    pub fn media_info(&self) -> &MediaInfo {
        &self.media_info
    }
}

impl DemuxerSource for Demuxer {
    type Packet = ffmpeg::Packet;

    /// 读取下一个包（任意流），路由由生产线程负责
    fn read_packet(&mut self) -> Result<Option<MediaPacket<ffmpeg::Packet>>> {
        loop {
            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input_ctx) {
                Ok(()) => {
                    return Ok(Some(MediaPacket {
                        stream_index: packet.stream(),
                        packet,
                    }));
                }
                Err(ffmpeg::Error::Eof) => return Ok(None),
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::util::error::EAGAIN => {
                    debug!("{} 读取暂不可用（EAGAIN），重试", log_ctx());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn video_stream_index(&self) -> Option<usize> {
        self.video_stream_index
    }

    fn audio_stream_index(&self) -> Option<usize> {
        self.audio_stream_index
    }

    fn description(&self) -> String {
        format!("FFmpeg Demuxer: {}", self.source_path)
    }
}
