use crate::core::Result;

/// 解封装出的一个包（尚未解码），所有权随队列转移给消费线程
pub struct MediaPacket<P> {
    pub packet: P,
    pub stream_index: usize,
}

/// Demuxer 数据源抽象接口
///
/// 生产线程只依赖这个 trait；FFmpeg 实现见 [`crate::player::Demuxer`]，
/// 测试中使用内存数据源。
pub trait DemuxerSource: Send {
    type Packet: Send + 'static;

    /// 读取下一个包
    ///
    /// 返回：
    /// - Ok(Some(packet)): 成功读取一个包（任意流）
    /// - Ok(None): 到达文件末尾
    /// - Err(e): 读取错误
    fn read_packet(&mut self) -> Result<Option<MediaPacket<Self::Packet>>>;

    /// 获取视频流索引
    fn video_stream_index(&self) -> Option<usize>;

    /// 获取音频流索引
    fn audio_stream_index(&self) -> Option<usize>;

    /// 获取描述信息（用于日志）
    fn description(&self) -> String;
}
