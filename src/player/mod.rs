// FFmpeg / cpal 实现

pub mod demuxer;
pub mod demuxer_source;
pub mod decoder;
pub mod audio_output;
pub mod video_output;
pub mod manager;

pub use demuxer::Demuxer;
pub use demuxer_source::{DemuxerSource, MediaPacket};
pub use decoder::{AudioDecoder, VideoDecoder};
pub use audio_output::{AudioOutput, AudioSink, AudioStage};
pub use video_output::{FrameSlot, SlotVideoSink, VideoSink, VideoStage};
pub use manager::{play, play_with_info, MediaTargets};
