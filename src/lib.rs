//! 基于 FFmpeg 的生产者 / 消费者媒体播放管线
//!
//! - [`pipeline`]：有界阻塞队列、按流路由、生产线程与消费线程、会话生命周期
//! - [`player`]：FFmpeg 解封装 / 解码、cpal 音频输出、视频帧输出
//! - [`app`]：egui 查看窗口

pub mod app;
pub mod core;
pub mod pipeline;
pub mod player;
