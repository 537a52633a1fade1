use crate::core::{
    log_ctx, PipelineConfig, PlayerError, Result, SessionEvent, SessionReport, StreamKind,
};
use crate::pipeline::consumer::{Consumer, ConsumerHandle};
use crate::pipeline::producer::Producer;
use crate::pipeline::queue::{BoundedBlockingQueue, QueueControl};
use crate::pipeline::router::StreamRouter;
use crate::pipeline::stage::StreamPipeline;
use crate::player::demuxer_source::DemuxerSource;
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

/// 一次播放会话：1 个生产线程 + 最多 2 个消费线程
///
/// `start()` 立即返回，播放在后台线程中进行。
/// 句柄被 drop 时不会打断播放（线程分离，自然播放到结束）；
/// 需要等待结果时调用 [`wait`](Self::wait)，需要提前结束时调用 [`stop`](Self::stop)。
pub struct PlaybackSession {
    producer: Option<JoinHandle<SessionReport>>,
    stop: Arc<AtomicBool>,
    queues: Vec<Weak<dyn QueueControl>>,
    events: Receiver<SessionEvent>,
    description: String,
}

impl PlaybackSession {
    /// 创建队列、启动消费线程和生产线程
    pub fn start<S, VF, AF>(
        source: S,
        video: Option<StreamPipeline<S::Packet, VF>>,
        audio: Option<StreamPipeline<S::Packet, AF>>,
        config: &PipelineConfig,
    ) -> Result<Self>
    where
        S: DemuxerSource + 'static,
        VF: 'static,
        AF: 'static,
    {
        config.validate()?;
        if video.is_none() && audio.is_none() {
            return Err(PlayerError::NoPlayableStream);
        }

        let video_index = match &video {
            Some(_) => Some(source.video_stream_index().ok_or(PlayerError::NoVideoStream)?),
            None => None,
        };
        let audio_index = match &audio {
            Some(_) => Some(source.audio_stream_index().ok_or(PlayerError::NoAudioStream)?),
            None => None,
        };
        let router = StreamRouter::new(video_index, audio_index);
        let description = source.description();

        info!(
            "{} ▶️  启动播放会话: {}（视频: {:?}，音频: {:?}）",
            log_ctx(),
            description,
            video_index,
            audio_index
        );

        let (events_tx, events_rx) = unbounded();
        let (drained_tx, drained_rx) = unbounded();

        let video_queue = video
            .as_ref()
            .map(|_| Arc::new(BoundedBlockingQueue::new(config.video_queue_capacity)));
        let audio_queue = audio
            .as_ref()
            .map(|_| Arc::new(BoundedBlockingQueue::new(config.audio_queue_capacity)));

        let mut consumers = Vec::new();
        let spawned = spawn_consumer(
            StreamKind::Video,
            video_queue.clone(),
            video,
            &drained_tx,
            &events_tx,
            &mut consumers,
        )
        .and_then(|_| {
            spawn_consumer(
                StreamKind::Audio,
                audio_queue.clone(),
                audio,
                &drained_tx,
                &events_tx,
                &mut consumers,
            )
        });
        // 启动失败时已启动的消费线程随句柄 drop 被取消、回收并释放渲染通道
        spawned?;
        // 只有消费线程持有排空信号的发送端
        drop(drained_tx);

        // 会话句柄只保留弱引用，收尾时生产线程才能独占并销毁队列
        let mut queues: Vec<Weak<dyn QueueControl>> = Vec::new();
        if let Some(queue) = &video_queue {
            let queue: Arc<dyn QueueControl> = queue.clone();
            queues.push(Arc::downgrade(&queue));
        }
        if let Some(queue) = &audio_queue {
            let queue: Arc<dyn QueueControl> = queue.clone();
            queues.push(Arc::downgrade(&queue));
        }

        let stop = Arc::new(AtomicBool::new(false));
        let producer = Producer::new(
            source,
            router,
            video_queue,
            audio_queue,
            consumers,
            drained_rx,
            events_tx,
            stop.clone(),
            config.drain_log_interval(),
        );
        // 失败时生产者随闭包释放，其中的消费线程句柄负责回收
        let producer = producer.spawn()?;

        Ok(Self {
            producer: Some(producer),
            stop,
            queues,
            events: events_rx,
            description,
        })
    }

    /// 会话状态事件
    pub fn events(&self) -> &Receiver<SessionEvent> {
        &self.events
    }

    /// 请求提前结束：生产线程停止读包，消费线程立即退出，收尾照常由生产线程完成
    pub fn stop(&self) {
        if self.stop.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("{} ⏹️  请求停止播放会话: {}", log_ctx(), self.description);
        for queue in self.queues.iter().filter_map(Weak::upgrade) {
            queue.cancel();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.producer
            .as_ref()
            .map_or(true, |handle| handle.is_finished())
    }

    /// 阻塞等待会话结束（包括资源释放），返回最终报告
    pub fn wait(mut self) -> Result<SessionReport> {
        let handle = self
            .producer
            .take()
            .ok_or_else(|| PlayerError::Other("会话已结束".to_string()))?;
        handle
            .join()
            .map_err(|_| PlayerError::Other("生产线程异常退出".to_string()))
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        if self.producer.take().is_some() {
            debug!("{} 会话句柄已释放，播放线程继续在后台运行: {}", log_ctx(), self.description);
        }
    }
}

fn spawn_consumer<P, F>(
    kind: StreamKind,
    queue: Option<Arc<BoundedBlockingQueue<P>>>,
    pipeline: Option<StreamPipeline<P, F>>,
    drained_tx: &Sender<StreamKind>,
    events_tx: &Sender<SessionEvent>,
    consumers: &mut Vec<ConsumerHandle>,
) -> Result<()>
where
    P: Send + 'static,
    F: 'static,
{
    let (Some(queue), Some(pipeline)) = (queue, pipeline) else {
        return Ok(());
    };
    let handle = Consumer::new(kind, queue, pipeline, drained_tx.clone(), events_tx.clone()).spawn()?;
    consumers.push(handle);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ConsumerStats, SessionOutcome};
    use crate::pipeline::stage::{DecodeStatus, FrameRenderer, StreamDecoder};
    use crate::player::demuxer_source::MediaPacket;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::thread;
    use std::time::Duration;

    const VIDEO: usize = 0;
    const AUDIO: usize = 1;
    const SUBTITLE: usize = 2;

    type Log = Arc<Mutex<Vec<String>>>;

    enum Step {
        Packet(usize, u32),
        Fail(&'static str),
        Stall,
    }

    struct ScriptedSource {
        steps: VecDeque<Step>,
        log: Log,
    }

    impl ScriptedSource {
        fn new(steps: Vec<Step>, log: &Log) -> Self {
            Self {
                steps: steps.into(),
                log: log.clone(),
            }
        }
    }

    impl DemuxerSource for ScriptedSource {
        type Packet = u32;

        fn read_packet(&mut self) -> Result<Option<MediaPacket<u32>>> {
            match self.steps.pop_front() {
                Some(Step::Packet(stream_index, packet)) => Ok(Some(MediaPacket {
                    packet,
                    stream_index,
                })),
                Some(Step::Fail(reason)) => Err(PlayerError::Other(reason.to_string())),
                Some(Step::Stall) => {
                    thread::sleep(Duration::from_millis(20));
                    self.steps.push_back(Step::Stall);
                    Ok(Some(MediaPacket {
                        packet: 0,
                        stream_index: SUBTITLE,
                    }))
                }
                None => Ok(None),
            }
        }

        fn video_stream_index(&self) -> Option<usize> {
            Some(VIDEO)
        }

        fn audio_stream_index(&self) -> Option<usize> {
            Some(AUDIO)
        }

        fn description(&self) -> String {
            "scripted".to_string()
        }
    }

    impl Drop for ScriptedSource {
        fn drop(&mut self) {
            self.log.lock().push("source released".to_string());
        }
    }

    struct PassThrough {
        frame: Option<u32>,
    }

    impl StreamDecoder<u32> for PassThrough {
        type Frame = u32;

        fn send(&mut self, packet: &u32) -> Result<DecodeStatus<()>> {
            self.frame = Some(*packet);
            Ok(DecodeStatus::Ready(()))
        }

        fn receive(&mut self) -> Result<DecodeStatus<u32>> {
            Ok(self
                .frame
                .take()
                .map_or(DecodeStatus::NeedMoreInput, DecodeStatus::Ready))
        }
    }

    struct SlowSink {
        name: &'static str,
        delay: Duration,
        log: Log,
    }

    impl FrameRenderer<u32> for SlowSink {
        fn prepare(&mut self) -> Result<()> {
            Ok(())
        }

        fn render(&mut self, frame: u32) -> Result<()> {
            thread::sleep(self.delay);
            self.log.lock().push(format!("{} {}", self.name, frame));
            Ok(())
        }

        fn release(&mut self) {
            self.log.lock().push(format!("{} released", self.name));
        }
    }

    fn pipeline(name: &'static str, delay_ms: u64, log: &Log) -> StreamPipeline<u32, u32> {
        StreamPipeline::new(
            PassThrough { frame: None },
            SlowSink {
                name,
                delay: Duration::from_millis(delay_ms),
                log: log.clone(),
            },
        )
    }

    struct CrashingSink;

    impl FrameRenderer<u32> for CrashingSink {
        fn prepare(&mut self) -> Result<()> {
            Ok(())
        }

        fn render(&mut self, _frame: u32) -> Result<()> {
            panic!("render surface lost");
        }
    }

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            video_queue_capacity: 2,
            audio_queue_capacity: 2,
            drain_log_interval_ms: 10,
            ..PipelineConfig::default()
        }
    }

    fn interleaved(count: u32) -> Vec<Step> {
        (1..=count)
            .flat_map(|i| [Step::Packet(VIDEO, i), Step::Packet(SUBTITLE, 99), Step::Packet(AUDIO, 100 + i)])
            .collect()
    }

    fn rendered(log: &Log, name: &str) -> Vec<u32> {
        let prefix = format!("{} ", name);
        log.lock()
            .iter()
            .filter_map(|line| line.strip_prefix(&prefix))
            .filter_map(|value| value.parse().ok())
            .collect()
    }

    #[test]
    fn plays_both_streams_in_order_then_tears_down_once() {
        let log: Log = Arc::default();
        let session = PlaybackSession::start(
            ScriptedSource::new(interleaved(10), &log),
            Some(pipeline("video", 3, &log)),
            Some(pipeline("audio", 1, &log)),
            &small_config(),
        )
        .unwrap();

        let report = session.wait().unwrap();
        assert_eq!(report.outcome, SessionOutcome::Completed);
        assert_eq!(report.producer.packets_read, 30);
        assert_eq!(report.producer.video_packets, 10);
        assert_eq!(report.producer.audio_packets, 10);
        assert_eq!(report.producer.discarded, 10);
        assert_eq!(report.producer.dropped, 0);
        assert_eq!(report.leftover_packets, 0);
        assert_eq!(report.video.as_ref().map(|s| s.frames_rendered), Some(10));
        assert_eq!(report.audio.as_ref().map(|s| s.frames_rendered), Some(10));

        assert_eq!(rendered(&log, "video"), (1..=10).collect::<Vec<_>>());
        assert_eq!(rendered(&log, "audio"), (101..=110).collect::<Vec<_>>());

        let log = log.lock();
        let position = |entry: &str| log.iter().position(|line| line == entry).unwrap();
        let last_render = log
            .iter()
            .rposition(|line| !line.ends_with("released"))
            .unwrap();
        // 释放一定发生在所有渲染之后，数据源最后释放
        assert!(position("video released") > last_render);
        assert!(position("audio released") > last_render);
        assert_eq!(log.last().map(String::as_str), Some("source released"));
        assert_eq!(log.iter().filter(|line| line.ends_with("released")).count(), 3);
    }

    #[test]
    fn teardown_waits_for_slow_consumer() {
        let log: Log = Arc::default();
        let steps = (1..=5).map(|i| Step::Packet(VIDEO, i)).collect();
        let session = PlaybackSession::start(
            ScriptedSource::new(steps, &log),
            Some(pipeline("video", 40, &log)),
            None::<StreamPipeline<u32, u32>>,
            &small_config(),
        )
        .unwrap();

        let events: Vec<_> = session.events().clone().iter().collect();
        let drained = events
            .iter()
            .position(|event| matches!(event, SessionEvent::StreamDrained { stream: StreamKind::Video, .. }))
            .unwrap();
        let finished = events
            .iter()
            .position(|event| matches!(event, SessionEvent::Finished(_)))
            .unwrap();
        assert!(drained < finished);
        assert!(events.contains(&SessionEvent::Started { video: true, audio: false }));

        assert_eq!(rendered(&log, "video"), vec![1, 2, 3, 4, 5]);
        let report = session.wait().unwrap();
        assert!(report.audio.is_none());
        assert_eq!(
            report.video,
            Some(ConsumerStats {
                packets: 5,
                frames_rendered: 5,
                decode_errors: 0,
                render_errors: 0,
            })
        );
    }

    #[test]
    fn read_error_is_reported_distinctly() {
        let log: Log = Arc::default();
        let steps = vec![
            Step::Packet(VIDEO, 1),
            Step::Packet(AUDIO, 2),
            Step::Fail("corrupt container"),
            Step::Packet(VIDEO, 3),
        ];
        let session = PlaybackSession::start(
            ScriptedSource::new(steps, &log),
            Some(pipeline("video", 0, &log)),
            Some(pipeline("audio", 0, &log)),
            &small_config(),
        )
        .unwrap();
        let events = session.events().clone();

        let report = session.wait().unwrap();
        assert!(matches!(
            report.outcome,
            SessionOutcome::ReadFailed { ref reason } if reason.contains("corrupt container")
        ));
        assert_eq!(rendered(&log, "video"), vec![1]);
        assert_eq!(rendered(&log, "audio"), vec![2]);
        assert!(events
            .try_iter()
            .any(|event| matches!(event, SessionEvent::ReadFailed { .. })));
    }

    #[test]
    fn stop_cancels_a_running_session() {
        let log: Log = Arc::default();
        let mut steps: Vec<Step> = (1..=4).map(|i| Step::Packet(VIDEO, i)).collect();
        steps.push(Step::Stall);
        let session = PlaybackSession::start(
            ScriptedSource::new(steps, &log),
            Some(pipeline("video", 0, &log)),
            None::<StreamPipeline<u32, u32>>,
            &small_config(),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(100));
        assert!(!session.is_finished());
        session.stop();
        session.stop();

        let report = session.wait().unwrap();
        assert_eq!(report.outcome, SessionOutcome::Cancelled);
        assert!(log.lock().iter().any(|line| line == "video released"));
        assert_eq!(log.lock().last().map(String::as_str), Some("source released"));
    }

    #[test]
    fn crashed_consumer_does_not_stall_the_producer() {
        let log: Log = Arc::default();
        let steps = (1..=20)
            .flat_map(|i| [Step::Packet(VIDEO, i), Step::Packet(AUDIO, 100 + i)])
            .collect();
        let session = PlaybackSession::start(
            ScriptedSource::new(steps, &log),
            Some(StreamPipeline::new(PassThrough { frame: None }, CrashingSink)),
            Some(pipeline("audio", 0, &log)),
            &small_config(),
        )
        .unwrap();

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let waiter = thread::spawn(move || done_tx.send(session.wait()).unwrap());
        let report = done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("session must finish after a consumer panics")
            .unwrap();
        waiter.join().unwrap();

        assert_eq!(report.outcome, SessionOutcome::Completed);
        assert_eq!(report.producer.video_packets, 20);
        assert!(report.producer.dropped > 0);
        assert!(report.video.is_none());
        assert_eq!(report.audio.as_ref().map(|s| s.frames_rendered), Some(20));
        assert_eq!(rendered(&log, "audio"), (101..=120).collect::<Vec<_>>());
        assert_eq!(log.lock().last().map(String::as_str), Some("source released"));
    }

    #[test]
    fn needs_at_least_one_stream() {
        let log: Log = Arc::default();
        let err = PlaybackSession::start(
            ScriptedSource::new(Vec::new(), &log),
            None::<StreamPipeline<u32, u32>>,
            None::<StreamPipeline<u32, u32>>,
            &PipelineConfig::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, PlayerError::NoPlayableStream));
        assert_eq!(*log.lock(), vec!["source released".to_string()]);
    }

    #[test]
    fn invalid_config_is_rejected_before_spawning() {
        let log: Log = Arc::default();
        let config = PipelineConfig {
            video_queue_capacity: 0,
            ..PipelineConfig::default()
        };
        let err = PlaybackSession::start(
            ScriptedSource::new(Vec::new(), &log),
            Some(pipeline("video", 0, &log)),
            None::<StreamPipeline<u32, u32>>,
            &config,
        )
        .err()
        .unwrap();
        assert!(matches!(err, PlayerError::ConfigError(_)));
    }
}
