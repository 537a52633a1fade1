use crate::core::Result;
use crate::pipeline::{DecodeStatus, StreamDecoder};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, format, util};
use log::debug;

/// 把 send_packet / receive_frame 的流控错误映射为状态
fn map_status<T>(result: std::result::Result<(), ffmpeg::Error>, ready: T) -> Result<DecodeStatus<T>> {
    match result {
        Ok(()) => Ok(DecodeStatus::Ready(ready)),
        Err(ffmpeg::Error::Other { errno }) if errno == util::error::EAGAIN => {
            Ok(DecodeStatus::NeedMoreInput)
        }
        Err(ffmpeg::Error::Eof) => Ok(DecodeStatus::EndOfStream),
        Err(e) => Err(e.into()),
    }
}

fn seconds(time_base: ffmpeg::Rational) -> f64 {
    if time_base.denominator() == 0 {
        return 0.0;
    }
    time_base.numerator() as f64 / time_base.denominator() as f64
}

/// 视频解码器（软件解码），输出 FFmpeg 原始帧，格式转换在渲染通道中进行
pub struct VideoDecoder {
    decoder: codec::decoder::Video,
    time_base: f64,
}

impl VideoDecoder {
    /// 从视频流创建解码器
    pub fn from_stream(stream: format::stream::Stream) -> Result<Self> {
        let context = codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = context.decoder().video()?;
        let time_base = seconds(stream.time_base());

        debug!(
            "视频解码器: {}x{}, 格式: {:?}",
            decoder.width(),
            decoder.height(),
            decoder.format()
        );

        Ok(Self { decoder, time_base })
    }

    pub fn width(&self) -> u32 {
        self.decoder.width()
    }

    pub fn height(&self) -> u32 {
        self.decoder.height()
    }

    pub fn format(&self) -> util::format::Pixel {
        self.decoder.format()
    }

    /// 流时间基（秒），用于把时间戳换算成毫秒
    pub fn time_base(&self) -> f64 {
        self.time_base
    }
}

impl StreamDecoder<ffmpeg::Packet> for VideoDecoder {
    type Frame = util::frame::Video;

    fn send(&mut self, packet: &ffmpeg::Packet) -> Result<DecodeStatus<()>> {
        map_status(self.decoder.send_packet(packet), ())
    }

    fn receive(&mut self) -> Result<DecodeStatus<util::frame::Video>> {
        let mut frame = util::frame::Video::empty();
        let result = self.decoder.receive_frame(&mut frame);
        map_status(result, frame)
    }
}

/// 音频解码器，输出 FFmpeg 原始帧，重采样在渲染通道中进行
pub struct AudioDecoder {
    decoder: codec::decoder::Audio,
    time_base: f64,
}

impl AudioDecoder {
    /// 从音频流创建解码器
    pub fn from_stream(stream: format::stream::Stream) -> Result<Self> {
        let context = codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = context.decoder().audio()?;
        let time_base = seconds(stream.time_base());

        debug!(
            "音频解码器: {} Hz, {} 声道, 格式: {:?}",
            decoder.rate(),
            decoder.channels(),
            decoder.format()
        );

        Ok(Self { decoder, time_base })
    }

    pub fn rate(&self) -> u32 {
        self.decoder.rate()
    }

    pub fn channels(&self) -> u16 {
        self.decoder.channels()
    }

    pub fn format(&self) -> util::format::Sample {
        self.decoder.format()
    }

    pub fn channel_layout(&self) -> util::channel_layout::ChannelLayout {
        self.decoder.channel_layout()
    }

    pub fn time_base(&self) -> f64 {
        self.time_base
    }
}

impl StreamDecoder<ffmpeg::Packet> for AudioDecoder {
    type Frame = util::frame::Audio;

    fn send(&mut self, packet: &ffmpeg::Packet) -> Result<DecodeStatus<()>> {
        map_status(self.decoder.send_packet(packet), ())
    }

    fn receive(&mut self) -> Result<DecodeStatus<util::frame::Audio>> {
        let mut frame = util::frame::Audio::empty();
        let result = self.decoder.receive_frame(&mut frame);
        map_status(result, frame)
    }
}
