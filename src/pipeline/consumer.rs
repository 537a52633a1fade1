use crate::core::{log_ctx, ConsumerStats, Result, SessionEvent, StreamKind};
use crate::pipeline::queue::{BoundedBlockingQueue, QueueControl};
use crate::pipeline::stage::{DecodeStatus, StreamPipeline, Teardown};
use crossbeam_channel::Sender;
use log::{debug, error, info, warn};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

/// 错误日志节流：前 N 次和之后每 100 次打印一次
const LOG_FIRST_N: u64 = 5;

fn should_log(count: u64) -> bool {
    count <= LOG_FIRST_N || count % 100 == 0
}

/// 消费线程退出时交还给生产线程的东西
pub(crate) struct ConsumerExit {
    pub(crate) kind: StreamKind,
    pub(crate) stats: ConsumerStats,
    pub(crate) resources: Box<dyn Teardown>,
}

/// 消费线程句柄
///
/// 正常情况下由生产线程在收尾阶段调用 [`wait`](Self::wait)。
/// 未等待就被 drop（会话启动中途失败）时取消队列、等待线程退出并释放渲染通道。
pub(crate) struct ConsumerHandle {
    pub(crate) kind: StreamKind,
    join: Option<JoinHandle<ConsumerExit>>,
    queue: Weak<dyn QueueControl>,
}

impl ConsumerHandle {
    /// 等待消费线程退出；线程 panic 时返回 `None`
    pub(crate) fn wait(mut self) -> Option<ConsumerExit> {
        let join = self.join.take()?;
        match join.join() {
            Ok(exit) => Some(exit),
            Err(_) => {
                error!("{} ❌ {} 消费线程异常退出", log_ctx(), self.kind.label());
                None
            }
        }
    }
}

impl Drop for ConsumerHandle {
    fn drop(&mut self) {
        let Some(join) = self.join.take() else { return };
        if let Some(queue) = self.queue.upgrade() {
            queue.cancel();
        }
        if let Ok(exit) = join.join() {
            exit.resources.teardown();
            debug!("{} {} 未启动的会话已释放渲染通道", log_ctx(), self.kind.label());
        }
    }
}

/// 消费线程 panic 时取消自己的队列，之后的 push 直接丢弃，生产线程不会卡在满队列上
struct CancelOnUnwind<P: Send + 'static>(Arc<BoundedBlockingQueue<P>>);

impl<P: Send + 'static> Drop for CancelOnUnwind<P> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.cancel();
        }
    }
}

/// 消费线程：PREPARING → RUNNING → STOPPED
///
/// 从自己的队列取包、解码、把每个解码帧按顺序交给渲染通道。
/// 队列返回 `None`（已解除阻塞且取空，或被取消）时停止，
/// 发出一次排空信号，然后把解码器和渲染通道交还给生产线程释放。
pub(crate) struct Consumer<P, F> {
    kind: StreamKind,
    queue: Arc<BoundedBlockingQueue<P>>,
    pipeline: StreamPipeline<P, F>,
    drained_tx: Sender<StreamKind>,
    events: Sender<SessionEvent>,
}

impl<P, F> Consumer<P, F>
where
    P: Send + 'static,
    F: 'static,
{
    pub(crate) fn new(
        kind: StreamKind,
        queue: Arc<BoundedBlockingQueue<P>>,
        pipeline: StreamPipeline<P, F>,
        drained_tx: Sender<StreamKind>,
        events: Sender<SessionEvent>,
    ) -> Self {
        Self {
            kind,
            queue,
            pipeline,
            drained_tx,
            events,
        }
    }

    pub(crate) fn spawn(self) -> Result<ConsumerHandle> {
        let kind = self.kind;
        let queue: Arc<dyn QueueControl> = self.queue.clone();
        let queue = Arc::downgrade(&queue);
        let join = thread::Builder::new()
            .name(format!("{}-consumer", kind.as_str()))
            .spawn(move || self.run())?;
        Ok(ConsumerHandle {
            kind,
            join: Some(join),
            queue,
        })
    }

    fn run(mut self) -> ConsumerExit {
        info!("{} {} 消费线程启动", log_ctx(), self.kind.label());
        let _guard = CancelOnUnwind(self.queue.clone());

        // PREPARING：失败不退出，之后每次渲染都会失败并被跳过
        match self.pipeline.renderer.prepare() {
            Ok(()) => {
                info!("{} ✅ {} 渲染通道就绪", log_ctx(), self.kind.label());
                let _ = self.events.send(SessionEvent::Prepared { stream: self.kind });
            }
            Err(e) => {
                warn!("{} ⚠️  {} 渲染通道准备失败: {}", log_ctx(), self.kind.label(), e);
                let _ = self.events.send(SessionEvent::PrepareFailed {
                    stream: self.kind,
                    reason: e.to_string(),
                });
            }
        }

        // RUNNING
        let mut stats = ConsumerStats::default();
        while let Some(packet) = self.queue.pop() {
            stats.packets += 1;
            self.decode_and_render(&packet, &mut stats);
            // packet 在这里释放，无论解码是否成功
        }

        // STOPPED
        info!(
            "{} 🛑 {} 消费线程结束（{} 包，渲染 {} 帧，解码失败 {}，渲染失败 {}）",
            log_ctx(),
            self.kind.label(),
            stats.packets,
            stats.frames_rendered,
            stats.decode_errors,
            stats.render_errors
        );
        let _ = self.events.send(SessionEvent::StreamDrained {
            stream: self.kind,
            stats: stats.clone(),
        });
        let _ = self.drained_tx.send(self.kind);

        ConsumerExit {
            kind: self.kind,
            stats,
            resources: Box::new(self.pipeline),
        }
    }

    fn decode_and_render(&mut self, packet: &P, stats: &mut ConsumerStats) {
        let kind = self.kind;
        let StreamPipeline { decoder, renderer } = &mut self.pipeline;

        match decoder.send(packet) {
            Ok(DecodeStatus::Ready(())) => {}
            Ok(DecodeStatus::NeedMoreInput) | Ok(DecodeStatus::EndOfStream) => {
                debug!("{} 解码器暂不接收输入，继续取帧", kind.label());
            }
            Err(e) => {
                stats.decode_errors += 1;
                if should_log(stats.decode_errors) {
                    error!("{} ❌ {} 送包失败（已跳过）: {}", log_ctx(), kind.label(), e);
                }
                return;
            }
        }

        loop {
            match decoder.receive() {
                Ok(DecodeStatus::Ready(frame)) => match renderer.render(frame) {
                    Ok(()) => stats.frames_rendered += 1,
                    Err(e) => {
                        stats.render_errors += 1;
                        if should_log(stats.render_errors) {
                            error!("{} ❌ {} 渲染失败（已跳过）: {}", log_ctx(), kind.label(), e);
                        }
                    }
                },
                Ok(DecodeStatus::NeedMoreInput) | Ok(DecodeStatus::EndOfStream) => break,
                Err(e) => {
                    stats.decode_errors += 1;
                    if should_log(stats.decode_errors) {
                        error!("{} ❌ {} 取帧失败（已跳过）: {}", log_ctx(), kind.label(), e);
                    }
                    break;
                }
            }
        }
    }
}
