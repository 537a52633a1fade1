use crate::core::{log_ctx, PixelFormat, PlayerError, Result, VideoFrame};
use crate::pipeline::FrameRenderer;
use crate::player::decoder::VideoDecoder;
use ffmpeg_next::{software, util};
use log::{debug, info};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 视频显示目标（窗口纹理、离屏缓冲等）
pub trait VideoSink: Send {
    /// 准备显示表面，之后 `present` 的帧都是这个尺寸和格式
    fn configure(&mut self, width: u32, height: u32, format: PixelFormat) -> Result<()>;

    /// 提交一帧（紧密排列，无行填充）
    fn present(&mut self, frame: VideoFrame) -> Result<()>;

    fn release(&mut self) {}
}

/// 视频渲染通道：YUV → RGBA 转换 + 提交到显示目标
pub struct VideoStage {
    sink: Box<dyn VideoSink>,
    scaler: Option<software::scaling::Context>,
    source_format: util::format::Pixel,
    width: u32,
    height: u32,
    time_base: f64,
}

// SwsContext 本身不是 Send，但我们确保只在单个线程中使用它
// 准备和渲染都在视频消费线程中进行，释放由生产线程在消费线程结束后执行
unsafe impl Send for VideoStage {}

impl VideoStage {
    pub fn new(decoder: &VideoDecoder, sink: Box<dyn VideoSink>) -> Self {
        Self::with_geometry(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            decoder.time_base(),
            sink,
        )
    }

    pub(crate) fn with_geometry(
        source_format: util::format::Pixel,
        width: u32,
        height: u32,
        time_base: f64,
        sink: Box<dyn VideoSink>,
    ) -> Self {
        Self {
            sink,
            scaler: None,
            source_format,
            width,
            height,
            time_base,
        }
    }

    fn build_scaler(&mut self) -> Result<()> {
        self.scaler = Some(software::scaling::Context::get(
            self.source_format,
            self.width,
            self.height,
            util::format::Pixel::RGBA,
            self.width,
            self.height,
            software::scaling::Flags::BICUBIC,
        )?);
        Ok(())
    }

    /// 解码中途分辨率或像素格式变化时重建 scaler 并重新配置显示目标
    fn follow_frame_geometry(&mut self, frame: &util::frame::Video) -> Result<()> {
        let (format, width, height) = (frame.format(), frame.width(), frame.height());
        if format == self.source_format && width == self.width && height == self.height {
            return Ok(());
        }

        info!(
            "{} 🔄 视频参数变化: {}x{} {:?} → {}x{} {:?}",
            log_ctx(),
            self.width,
            self.height,
            self.source_format,
            width,
            height,
            format
        );
        self.source_format = format;
        self.width = width;
        self.height = height;
        self.sink.configure(width, height, PixelFormat::RGBA)?;
        self.build_scaler()
    }
}

impl FrameRenderer<util::frame::Video> for VideoStage {
    fn prepare(&mut self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(PlayerError::RenderError(format!(
                "无效的视频尺寸: {}x{}",
                self.width, self.height
            )));
        }

        self.sink.configure(self.width, self.height, PixelFormat::RGBA)?;

        // 初始化 scaler（YUV -> RGBA）
        self.build_scaler()?;

        info!(
            "{} 视频输出就绪: {}x{} {:?} → RGBA",
            log_ctx(),
            self.width,
            self.height,
            self.source_format
        );
        Ok(())
    }

    fn render(&mut self, frame: util::frame::Video) -> Result<()> {
        if self.scaler.is_none() {
            return Err(PlayerError::RenderError("视频输出未就绪".to_string()));
        }
        self.follow_frame_geometry(&frame)?;

        let scaler = self
            .scaler
            .as_mut()
            .ok_or_else(|| PlayerError::RenderError("视频输出未就绪".to_string()))?;

        let mut rgba_frame = util::frame::Video::empty();
        scaler.run(&frame, &mut rgba_frame)?;

        // 计算 PTS（毫秒）
        let pts = frame
            .timestamp()
            .map_or(0, |timestamp| (timestamp as f64 * self.time_base * 1000.0) as i64);

        // 复制数据到连续内存
        let width = self.width as usize;
        let height = self.height as usize;
        let row_size = width * 4;
        let mut data = vec![0u8; row_size * height];

        let stride = rgba_frame.stride(0);
        let frame_data = rgba_frame.data(0);

        for y in 0..height {
            let src_offset = y * stride;
            let dst_offset = y * row_size;
            data[dst_offset..dst_offset + row_size]
                .copy_from_slice(&frame_data[src_offset..src_offset + row_size]);
        }

        self.sink.present(VideoFrame {
            pts,
            width: self.width,
            height: self.height,
            format: PixelFormat::RGBA,
            data,
        })
    }

    fn release(&mut self) {
        self.scaler = None;
        self.sink.release();
        debug!("{} 视频输出已释放", log_ctx());
    }
}

/// 最新一帧的共享槽位，由 UI 线程读取
#[derive(Clone, Default)]
pub struct FrameSlot {
    latest: Arc<Mutex<Option<VideoFrame>>>,
    presented: Arc<AtomicU64>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取走尚未显示的最新帧
    pub fn take_latest(&self) -> Option<VideoFrame> {
        self.latest.lock().take()
    }

    /// 已提交的帧数（包括被新帧覆盖、未被显示的）
    pub fn presented(&self) -> u64 {
        self.presented.load(Ordering::Relaxed)
    }

    fn store(&self, frame: VideoFrame) {
        *self.latest.lock() = Some(frame);
        self.presented.fetch_add(1, Ordering::Relaxed);
    }
}

/// 把帧放进 [`FrameSlot`] 的显示目标，新帧覆盖旧帧
pub struct SlotVideoSink {
    slot: FrameSlot,
    size: Option<(u32, u32)>,
    on_frame: Option<Box<dyn Fn() + Send>>,
}

impl SlotVideoSink {
    pub fn new(slot: FrameSlot) -> Self {
        Self {
            slot,
            size: None,
            on_frame: None,
        }
    }

    /// 每提交一帧调用一次（例如请求 UI 重绘）
    pub fn with_notify(mut self, on_frame: impl Fn() + Send + 'static) -> Self {
        self.on_frame = Some(Box::new(on_frame));
        self
    }
}

impl VideoSink for SlotVideoSink {
    fn configure(&mut self, width: u32, height: u32, format: PixelFormat) -> Result<()> {
        if format != PixelFormat::RGBA {
            return Err(PlayerError::RenderError(format!("不支持的像素格式: {:?}", format)));
        }
        self.size = Some((width, height));
        Ok(())
    }

    fn present(&mut self, frame: VideoFrame) -> Result<()> {
        let (width, height) = self
            .size
            .ok_or_else(|| PlayerError::RenderError("显示目标未配置".to_string()))?;

        if frame.width != width
            || frame.height != height
            || frame.data.len() != width as usize * height as usize * 4
        {
            return Err(PlayerError::RenderError(format!(
                "帧尺寸不匹配: {}x{}（期望 {}x{}）",
                frame.width, frame.height, width, height
            )));
        }

        self.slot.store(frame);
        if let Some(on_frame) = &self.on_frame {
            on_frame();
        }
        Ok(())
    }

    fn release(&mut self) {
        self.size = None;
        self.slot.latest.lock().take();
    }
}
