use crate::core::Result;

/// 解码器 send/receive 的非错误结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeStatus<T> {
    Ready(T),
    /// 需要更多输入（EAGAIN）
    NeedMoreInput,
    /// 解码器已到末尾（EOF）
    EndOfStream,
}

/// 单个媒体流的解码器
///
/// `NeedMoreInput` / `EndOfStream` 是正常的流控信号，不是错误。
pub trait StreamDecoder<P>: Send {
    type Frame;

    fn send(&mut self, packet: &P) -> Result<DecodeStatus<()>>;

    fn receive(&mut self) -> Result<DecodeStatus<Self::Frame>>;
}

/// 解码后帧的渲染通道（视频窗口 / 音频设备）
pub trait FrameRenderer<F>: Send {
    /// 一次性准备（在消费线程中、取第一个包之前调用）
    fn prepare(&mut self) -> Result<()>;

    fn render(&mut self, frame: F) -> Result<()>;

    /// 释放外部资源，由生产线程在收尾阶段调用一次
    fn release(&mut self) {}
}

/// 一条媒体流的解码 + 渲染组合
pub struct StreamPipeline<P, F> {
    pub decoder: Box<dyn StreamDecoder<P, Frame = F>>,
    pub renderer: Box<dyn FrameRenderer<F>>,
}

impl<P, F> StreamPipeline<P, F> {
    pub fn new(
        decoder: impl StreamDecoder<P, Frame = F> + 'static,
        renderer: impl FrameRenderer<F> + 'static,
    ) -> Self {
        Self {
            decoder: Box::new(decoder),
            renderer: Box::new(renderer),
        }
    }
}

/// 收尾时由生产线程统一释放的资源（类型擦除）
pub(crate) trait Teardown: Send {
    fn teardown(self: Box<Self>);
}

impl<P: 'static, F: 'static> Teardown for StreamPipeline<P, F> {
    fn teardown(self: Box<Self>) {
        let StreamPipeline {
            decoder,
            mut renderer,
        } = *self;
        renderer.release();
        drop(decoder);
    }
}
