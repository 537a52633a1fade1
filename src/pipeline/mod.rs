// 生产者 / 消费者播放管线

pub mod queue;
pub mod router;
pub mod stage;
mod consumer;
mod producer;
pub mod session;

pub use queue::{BoundedBlockingQueue, PushOutcome};
pub use router::StreamRouter;
pub use stage::{DecodeStatus, FrameRenderer, StreamDecoder, StreamPipeline};
pub use session::PlaybackSession;
