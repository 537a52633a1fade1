use anyhow::Result;
use log::info;

use pipe_player::app::ViewerApp;
use pipe_player::core::PipelineConfig;

fn main() -> Result<()> {
    // 初始化日志
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        // 过滤掉 wgpu_hal 和 wgpu_core 的警告日志，减少日志噪音
        .filter_module("wgpu_hal", log::LevelFilter::Error)
        .filter_module("wgpu_core", log::LevelFilter::Error)
        .init();

    info!("🎬 pipe_player 启动");

    // 初始化 FFmpeg
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("FFmpeg 初始化失败: {}", e))?;
    info!("✅ FFmpeg 初始化成功");

    let mut args = std::env::args().skip(1);
    let path = match args.next() {
        Some(path) => path,
        None => match rfd::FileDialog::new()
            .add_filter("媒体文件", &["mp4", "mkv", "avi", "mov", "flv", "webm", "mp3", "aac", "flac", "wav"])
            .pick_file()
        {
            Some(path) => path.to_string_lossy().to_string(),
            None => {
                info!("未选择文件，退出");
                return Ok(());
            }
        },
    };
    let config = match args.next() {
        Some(config_path) => PipelineConfig::load(&config_path)
            .map_err(|e| anyhow::anyhow!("配置文件无效 {}: {}", config_path, e))?,
        None => PipelineConfig::default(),
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 720.0])
            .with_min_inner_size([640.0, 360.0])
            .with_title("pipe_player"),
        ..Default::default()
    };

    eframe::run_native(
        "pipe_player",
        options,
        Box::new(move |cc| Box::new(ViewerApp::new(cc, &path, &config))),
    )
    .map_err(|e| anyhow::anyhow!("应用启动失败: {}", e))?;

    Ok(())
}
