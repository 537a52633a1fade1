use crate::core::{log_ctx, AudioFrame, AudioSpec, PlayerError, Result};
use crate::pipeline::FrameRenderer;
use crate::player::decoder::AudioDecoder;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig, SupportedStreamConfigRange};
use crossbeam::queue::SegQueue;
use ffmpeg_next::{software, util};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// 设备缓冲中最多积压的时长，超过后 `write` 阻塞
const MAX_BUFFERED: Duration = Duration::from_millis(500);
/// 缓冲长时间不减少视为设备已停止消费
const STALL_TIMEOUT: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// 音频播放目标
pub trait AudioSink: Send {
    /// 打开输出，返回实际使用的参数（可能与请求不同）
    fn configure(&mut self, sample_rate: u32, channels: u16) -> Result<AudioSpec>;

    /// 写入交错排列的 f32 PCM；缓冲已满时阻塞
    fn write(&mut self, frame: &AudioFrame) -> Result<()>;

    fn release(&mut self) {}
}

/// 音频输出 - 使用 cpal 播放音频
pub struct AudioOutput {
    device: Device,
    config: Option<StreamConfig>,
    stream: Option<Stream>,
    buffer: Arc<SegQueue<f32>>,
}

// cpal::Stream 本身不是 Send，它在音频消费线程中创建和使用，
// 消费线程结束后才由生产线程释放，不会被并发访问
unsafe impl Send for AudioOutput {}

impl AudioOutput {
    /// 打开默认输出设备，参数在 `configure` 时协商
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlayerError::AudioError("无法找到音频输出设备".to_string()))?;

        debug!("使用音频设备: {}", device.name().unwrap_or_default());

        Ok(Self {
            device,
            config: None,
            stream: None,
            buffer: Arc::new(SegQueue::new()),
        })
    }

    /// 选择设备支持的配置（支持非标准配置自动回退）
    fn negotiate(&self, sample_rate: u32, channels: u16) -> Result<StreamConfig> {
        let requested = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        if self.is_supported(&requested)? {
            return Ok(requested);
        }

        warn!("⚠️  音频设备不支持 {} Hz, {} 声道配置，回退到标准配置", sample_rate, channels);

        let fallback_configs = [
            (48000, 2),  // 最常见
            (44100, 2),  // CD 音质
            (48000, 1),
            (44100, 1),
        ];

        for (fb_rate, fb_channels) in fallback_configs {
            let fb_config = StreamConfig {
                channels: fb_channels,
                sample_rate: cpal::SampleRate(fb_rate),
                buffer_size: cpal::BufferSize::Default,
            };
            if self.is_supported(&fb_config)? {
                info!("✅ 使用回退配置: {} Hz, {} 声道", fb_rate, fb_channels);
                return Ok(fb_config);
            }
        }

        Err(PlayerError::AudioError(format!(
            "音频设备不支持任何标准配置 (原请求: {} Hz, {} 声道)",
            sample_rate, channels
        )))
    }

    fn is_supported(&self, config: &StreamConfig) -> Result<bool> {
        let supported_configs = self
            .device
            .supported_output_configs()
            .map_err(|e| PlayerError::AudioError(format!("无法获取支持的音频配置: {}", e)))?;

        Ok(supported_configs
            .into_iter()
            .any(|supported| Self::is_config_compatible(config, &supported)))
    }

    /// 检查配置是否兼容
    fn is_config_compatible(config: &StreamConfig, supported: &SupportedStreamConfigRange) -> bool {
        let rate_in_range = config.sample_rate.0 >= supported.min_sample_rate().0
            && config.sample_rate.0 <= supported.max_sample_rate().0;

        let channels_match = config.channels == supported.channels();

        rate_in_range && channels_match
    }

    /// 开始播放
    fn start(&mut self, config: &StreamConfig) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let buffer = self.buffer.clone();

        let stream = self
            .device
            .build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for sample in data.iter_mut() {
                        *sample = buffer.pop().unwrap_or(0.0);
                    }
                },
                move |err| {
                    error!("音频流错误: {}", err);
                },
                None,
            )
            .map_err(|e| PlayerError::AudioError(format!("创建音频流失败: {}", e)))?;

        stream
            .play()
            .map_err(|e| PlayerError::AudioError(format!("启动音频流失败: {}", e)))?;

        self.stream = Some(stream);
        info!("{} 音频输出已启动", log_ctx());

        Ok(())
    }

    /// 停止播放
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            self.clear_buffer();
            info!("{} 音频输出已停止", log_ctx());
        }
    }

    /// 清空缓冲区
    pub fn clear_buffer(&self) {
        while self.buffer.pop().is_some() {}
    }
}

impl AudioSink for AudioOutput {
    fn configure(&mut self, sample_rate: u32, channels: u16) -> Result<AudioSpec> {
        info!("初始化音频输出: {} Hz, {} 声道", sample_rate, channels);
        let config = self.negotiate(sample_rate, channels)?;
        self.start(&config)?;
        let spec = AudioSpec {
            sample_rate: config.sample_rate.0,
            channels: config.channels,
        };
        self.config = Some(config);
        Ok(spec)
    }

    fn write(&mut self, frame: &AudioFrame) -> Result<()> {
        let config = match (&self.config, &self.stream) {
            (Some(config), Some(_)) => config,
            _ => return Err(PlayerError::AudioError("音频输出未启动".to_string())),
        };

        for sample in &frame.data {
            self.buffer.push(*sample);
        }

        let limit = buffered_limit(config.sample_rate.0, config.channels);
        if let Err(e) = wait_for_room(&self.buffer, limit, STALL_TIMEOUT) {
            self.clear_buffer();
            return Err(e);
        }
        Ok(())
    }

    fn release(&mut self) {
        self.stop();
        self.config = None;
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

fn buffered_limit(sample_rate: u32, channels: u16) -> usize {
    (sample_rate as u128 * channels as u128 * MAX_BUFFERED.as_millis() / 1000) as usize
}

/// 阻塞直到缓冲回落到 `limit` 以下；缓冲在 `stall_timeout` 内没有减少则报错
fn wait_for_room(buffer: &SegQueue<f32>, limit: usize, stall_timeout: Duration) -> Result<()> {
    let mut last_len = buffer.len();
    let mut last_progress = Instant::now();

    while buffer.len() > limit {
        thread::sleep(POLL_INTERVAL);
        let len = buffer.len();
        if len < last_len {
            last_len = len;
            last_progress = Instant::now();
        } else if last_progress.elapsed() >= stall_timeout {
            return Err(PlayerError::AudioError(format!(
                "音频设备无响应（缓冲 {} 个采样）",
                len
            )));
        }
    }
    Ok(())
}

fn output_layout(channels: u16) -> util::channel_layout::ChannelLayout {
    match channels {
        1 => util::channel_layout::ChannelLayout::MONO,
        2 => util::channel_layout::ChannelLayout::STEREO,
        6 => util::channel_layout::ChannelLayout::_5POINT1,
        n => util::channel_layout::ChannelLayout::default(n as i32),
    }
}

/// packed f32 字节 → 采样（只取前 `count` 个）
fn samples_from_bytes(bytes: &[u8], count: usize) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .take(count)
        .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// 音频渲染通道：重采样为设备参数的交错 f32 + 写入音频输出
pub struct AudioStage {
    sink: Box<dyn AudioSink>,
    resampler: Option<software::resampling::Context>,
    source_format: util::format::Sample,
    source_layout: util::channel_layout::ChannelLayout,
    source_rate: u32,
    requested: AudioSpec,
    output: Option<AudioSpec>,
    time_base: f64,
}

// SwrContext 同样只在音频消费线程中使用
unsafe impl Send for AudioStage {}

impl AudioStage {
    pub fn new(decoder: &AudioDecoder, sink: Box<dyn AudioSink>, requested: AudioSpec) -> Self {
        let mut source_layout = decoder.channel_layout();
        if source_layout.is_empty() {
            source_layout = util::channel_layout::ChannelLayout::default(decoder.channels() as i32);
        }

        Self {
            sink,
            resampler: None,
            source_format: decoder.format(),
            source_layout,
            source_rate: decoder.rate(),
            requested,
            output: None,
            time_base: decoder.time_base(),
        }
    }
}

impl FrameRenderer<util::frame::Audio> for AudioStage {
    fn prepare(&mut self) -> Result<()> {
        let spec = self
            .sink
            .configure(self.requested.sample_rate, self.requested.channels)?;

        debug!(
            "🔧 初始化音频重采样器: {}Hz/{:?} → {}Hz/{}ch",
            self.source_rate, self.source_format, spec.sample_rate, spec.channels
        );

        self.resampler = Some(software::resampling::Context::get(
            self.source_format,
            self.source_layout,
            self.source_rate,
            util::format::Sample::F32(util::format::sample::Type::Packed),
            output_layout(spec.channels),
            spec.sample_rate,
        )?);
        self.output = Some(spec);

        info!(
            "{} 音频输出就绪: {} Hz, {} 声道",
            log_ctx(),
            spec.sample_rate,
            spec.channels
        );
        Ok(())
    }

    fn render(&mut self, mut frame: util::frame::Audio) -> Result<()> {
        let (Some(resampler), Some(spec)) = (self.resampler.as_mut(), self.output) else {
            return Err(PlayerError::RenderError("音频输出未就绪".to_string()));
        };

        if frame.channel_layout().is_empty() {
            frame.set_channel_layout(self.source_layout);
        }

        let mut resampled = util::frame::Audio::empty();
        resampler.run(&frame, &mut resampled)?;

        // 计算 PTS（毫秒）
        let pts = frame
            .timestamp()
            .map_or(0, |timestamp| (timestamp as f64 * self.time_base * 1000.0) as i64);

        let count = resampled.samples() * spec.channels as usize;
        let data = samples_from_bytes(resampled.data(0), count);
        if data.is_empty() {
            return Ok(());
        }

        self.sink.write(&AudioFrame {
            pts,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            data,
        })
    }

    fn release(&mut self) {
        self.resampler = None;
        self.output = None;
        self.sink.release();
        debug!("{} 音频输出已释放", log_ctx());
    }
}
