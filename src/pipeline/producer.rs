use crate::core::{
    log_ctx, ProducerStats, SessionEvent, SessionOutcome, SessionReport, StreamKind,
};
use crate::pipeline::consumer::ConsumerHandle;
use crate::pipeline::queue::{BoundedBlockingQueue, PushOutcome};
use crate::pipeline::router::StreamRouter;
use crate::player::demuxer_source::{DemuxerSource, MediaPacket};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const LOG_FIRST_N: u64 = 5;

/// 生产线程状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProducerState {
    Reading,
    Draining,
    Finished,
}

/// 生产线程：READING → DRAINING → FINISHED
///
/// - READING：循环读包、按流索引路由并推入对应队列，直到文件末尾、读错误或收到停止请求
/// - DRAINING：解除两个队列的阻塞，等待每个消费线程的排空信号
/// - FINISHED：回收消费线程，释放渲染通道、解码器、队列和数据源（只做一次）
pub(crate) struct Producer<S: DemuxerSource> {
    source: S,
    router: StreamRouter,
    video_queue: Option<Arc<BoundedBlockingQueue<S::Packet>>>,
    audio_queue: Option<Arc<BoundedBlockingQueue<S::Packet>>>,
    consumers: Vec<ConsumerHandle>,
    drained_rx: Receiver<StreamKind>,
    events: Sender<SessionEvent>,
    stop: Arc<AtomicBool>,
    drain_log_interval: Duration,
    state: ProducerState,
    stats: ProducerStats,
}

impl<S> Producer<S>
where
    S: DemuxerSource + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        source: S,
        router: StreamRouter,
        video_queue: Option<Arc<BoundedBlockingQueue<S::Packet>>>,
        audio_queue: Option<Arc<BoundedBlockingQueue<S::Packet>>>,
        consumers: Vec<ConsumerHandle>,
        drained_rx: Receiver<StreamKind>,
        events: Sender<SessionEvent>,
        stop: Arc<AtomicBool>,
        drain_log_interval: Duration,
    ) -> Self {
        Self {
            source,
            router,
            video_queue,
            audio_queue,
            consumers,
            drained_rx,
            events,
            stop,
            drain_log_interval,
            state: ProducerState::Reading,
            stats: ProducerStats::default(),
        }
    }

    pub(crate) fn spawn(self) -> std::io::Result<JoinHandle<SessionReport>> {
        thread::Builder::new()
            .name("producer".to_string())
            .spawn(move || self.run())
    }

    pub(crate) fn run(mut self) -> SessionReport {
        info!("{} 🎬 生产线程启动: {}", log_ctx(), self.source.description());
        let _ = self.events.send(SessionEvent::Started {
            video: self.video_queue.is_some(),
            audio: self.audio_queue.is_some(),
        });

        let outcome = self.read_loop();
        self.drain();
        self.finish(outcome)
    }

    fn read_loop(&mut self) -> SessionOutcome {
        debug_assert_eq!(self.state, ProducerState::Reading);
        loop {
            if self.stop.load(Ordering::SeqCst) {
                info!("{} ⏹ 收到停止请求，结束读包", log_ctx());
                return SessionOutcome::Cancelled;
            }

            match self.source.read_packet() {
                Ok(Some(media_packet)) => {
                    self.stats.packets_read += 1;
                    self.dispatch(media_packet);
                }
                Ok(None) => {
                    info!(
                        "{} 📄 文件读取完毕，共读取 {} 个包（{} 视频，{} 音频，{} 丢弃）",
                        log_ctx(),
                        self.stats.packets_read,
                        self.stats.video_packets,
                        self.stats.audio_packets,
                        self.stats.discarded
                    );
                    let _ = self.events.send(SessionEvent::InputEnded {
                        packets: self.stats.packets_read,
                    });
                    return SessionOutcome::Completed;
                }
                Err(e) => {
                    error!(
                        "{} ❌ 读取数据包失败: {} (已处理 {} 个包)",
                        log_ctx(),
                        e,
                        self.stats.packets_read
                    );
                    let reason = e.to_string();
                    let _ = self.events.send(SessionEvent::ReadFailed {
                        reason: reason.clone(),
                    });
                    return SessionOutcome::ReadFailed { reason };
                }
            }
        }
    }

    fn dispatch(&mut self, media_packet: MediaPacket<S::Packet>) {
        let MediaPacket {
            packet,
            stream_index,
        } = media_packet;

        let Some(kind) = self.router.route(stream_index) else {
            // 其他流（字幕/数据）直接释放
            self.stats.discarded += 1;
            return;
        };
        let Some(queue) = self.queue(kind) else {
            self.stats.discarded += 1;
            return;
        };

        let count = match kind {
            StreamKind::Video => {
                self.stats.video_packets += 1;
                self.stats.video_packets
            }
            StreamKind::Audio => {
                self.stats.audio_packets += 1;
                self.stats.audio_packets
            }
        };
        if count <= LOG_FIRST_N || count % 100 == 0 {
            debug!(
                "{} 📦 读取{}包 #{}（队列 {}/{}）",
                log_ctx(),
                kind.label(),
                count,
                queue.len(),
                queue.capacity()
            );
        }

        // 队列满时阻塞，形成背压
        if queue.push(packet) == PushOutcome::Dropped {
            self.stats.dropped += 1;
            debug!("{} 队列已关闭，丢弃{}包 #{}", log_ctx(), kind.label(), count);
        }
    }

    fn queue(&self, kind: StreamKind) -> Option<Arc<BoundedBlockingQueue<S::Packet>>> {
        match kind {
            StreamKind::Video => self.video_queue.clone(),
            StreamKind::Audio => self.audio_queue.clone(),
        }
    }

    fn queue_depths(&self) -> (usize, usize) {
        (
            self.video_queue.as_ref().map_or(0, |q| q.len()),
            self.audio_queue.as_ref().map_or(0, |q| q.len()),
        )
    }

    fn drain(&mut self) {
        self.state = ProducerState::Draining;
        info!("{} 🧹 进入排空阶段，解除队列阻塞", log_ctx());

        for queue in self.video_queue.iter().chain(self.audio_queue.iter()) {
            queue.unblock();
        }

        let mut pending = self.consumers.len();
        while pending > 0 {
            match self.drained_rx.recv_timeout(self.drain_log_interval) {
                Ok(kind) => {
                    pending -= 1;
                    info!("{} ✅ {} 队列已排空（剩余 {} 个消费线程）", log_ctx(), kind.label(), pending);
                }
                Err(RecvTimeoutError::Timeout) => {
                    let (video, audio) = self.queue_depths();
                    info!("{} ⏳ 等待排空: 视频队列 {}，音频队列 {}", log_ctx(), video, audio);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("{} ⚠️  排空信号通道已断开，可能有消费线程异常退出", log_ctx());
                    break;
                }
            }
        }
    }

    fn finish(mut self, outcome: SessionOutcome) -> SessionReport {
        self.state = ProducerState::Finished;
        info!("{} 🧹 生产线程收尾，释放会话资源", log_ctx());

        let mut video_stats = None;
        let mut audio_stats = None;
        for handle in self.consumers.drain(..) {
            // 异常退出的线程在 wait() 中记录日志，其渲染通道已随栈展开释放
            let Some(exit) = handle.wait() else { continue };
            exit.resources.teardown();
            debug!("{} {} 渲染通道与解码器已释放", log_ctx(), exit.kind.label());
            match exit.kind {
                StreamKind::Video => video_stats = Some(exit.stats),
                StreamKind::Audio => audio_stats = Some(exit.stats),
            }
        }

        let mut leftover_packets = 0;
        for (kind, queue) in [
            (StreamKind::Video, self.video_queue.take()),
            (StreamKind::Audio, self.audio_queue.take()),
        ] {
            let Some(queue) = queue else { continue };
            match Arc::try_unwrap(queue) {
                Ok(queue) => {
                    let remaining = queue.destroy();
                    leftover_packets += remaining;
                    debug!("{} {} 队列已销毁（释放 {} 个残留包）", log_ctx(), kind.label(), remaining);
                }
                Err(shared) => {
                    // 会话句柄正在临时引用队列，最后一个引用释放时元素随之释放
                    leftover_packets += shared.len();
                    debug!("{} {} 队列仍被引用，交由最后持有者释放", log_ctx(), kind.label());
                }
            }
        }

        let description = self.source.description();
        drop(self.source);
        debug!("{} 数据源已关闭: {}", log_ctx(), description);

        let report = SessionReport {
            outcome,
            producer: self.stats,
            video: video_stats,
            audio: audio_stats,
            leftover_packets,
        };
        info!("{} 🛑 生产线程结束: {:?}", log_ctx(), report.outcome);
        let _ = self.events.send(SessionEvent::Finished(report.clone()));
        report
    }
}
