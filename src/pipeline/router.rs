use crate::core::StreamKind;

/// 按流索引把解封装出的包分配到视频/音频队列
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamRouter {
    video_index: Option<usize>,
    audio_index: Option<usize>,
}

impl StreamRouter {
    pub fn new(video_index: Option<usize>, audio_index: Option<usize>) -> Self {
        Self {
            video_index,
            audio_index,
        }
    }

    /// 返回包所属的队列，`None` 表示该包应直接释放
    pub fn route(&self, stream_index: usize) -> Option<StreamKind> {
        if self.video_index == Some(stream_index) {
            Some(StreamKind::Video)
        } else if self.audio_index == Some(stream_index) {
            Some(StreamKind::Audio)
        } else {
            None
        }
    }
}
