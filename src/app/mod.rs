use egui::{ColorImage, Context, FontData, FontDefinitions, FontFamily, TextureHandle, TextureOptions, Ui};
use log::{error, info, warn};
use std::path::Path;
use std::time::Duration;

use crate::core::{MediaInfo, PipelineConfig, SessionEvent, SessionOutcome};
use crate::pipeline::PlaybackSession;
use crate::player::{play_with_info, AudioOutput, FrameSlot, MediaTargets, SlotVideoSink};

/// 简单的查看窗口：显示视频流的最新一帧和会话状态
pub struct ViewerApp {
    session: Option<PlaybackSession>,
    slot: FrameSlot,
    texture: Option<TextureHandle>,
    media_info: Option<MediaInfo>,
    file_name: String,
    status: String,
    error: Option<String>,
}

impl ViewerApp {
    pub fn new(cc: &eframe::CreationContext<'_>, path: &str, config: &PipelineConfig) -> Self {
        info!("🎮 初始化 ViewerApp: {}", path);

        // 配置中文字体
        Self::setup_chinese_fonts(&cc.egui_ctx);

        let slot = FrameSlot::new();
        let repaint_ctx = cc.egui_ctx.clone();
        let video = SlotVideoSink::new(slot.clone()).with_notify(move || repaint_ctx.request_repaint());

        let targets = match AudioOutput::new() {
            Ok(audio) => MediaTargets::new(video, audio),
            Err(e) => {
                warn!("⚠️  音频输出不可用，只播放视频: {}", e);
                MediaTargets::video_only(video)
            }
        };

        let file_name = Path::new(path)
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string());

        let mut app = Self {
            session: None,
            slot,
            texture: None,
            media_info: None,
            file_name,
            status: "正在打开...".to_string(),
            error: None,
        };

        match play_with_info(path, targets, config) {
            Ok((session, media_info)) => {
                info!("✅ 播放器已就绪: {:?}", media_info);
                app.session = Some(session);
                app.media_info = Some(media_info);
            }
            Err(e) => {
                error!("❌ 打开失败: {}", e);
                app.status = "打开失败".to_string();
                app.error = Some(e.to_string());
            }
        }
        app
    }

    fn setup_chinese_fonts(ctx: &Context) {
        let mut fonts = FontDefinitions::default();

        #[cfg(target_os = "windows")]
        let chinese_font_paths = vec![
            "C:/Windows/Fonts/msyh.ttc",      // 微软雅黑
            "C:/Windows/Fonts/simsun.ttc",    // 宋体
        ];

        #[cfg(target_os = "macos")]
        let chinese_font_paths = vec![
            "/System/Library/Fonts/PingFang.ttc",      // 苹方
            "/System/Library/Fonts/STHeiti Light.ttc", // 黑体
        ];

        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        let chinese_font_paths = vec![
            "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
            "/usr/share/fonts/truetype/wqy/wqy-microhei.ttc",
        ];

        let loaded = chinese_font_paths
            .into_iter()
            .filter(|font_path| Path::new(font_path).exists())
            .find_map(|font_path| match std::fs::read(font_path) {
                Ok(font_data) => {
                    info!("✅ 成功加载中文字体: {}", font_path);
                    Some(font_data)
                }
                Err(e) => {
                    warn!("⚠️ 无法读取字体文件 {}: {}", font_path, e);
                    None
                }
            });

        let Some(font_data) = loaded else {
            warn!("⚠️ 未找到可用的中文字体文件，中文可能显示为方块");
            return;
        };

        fonts
            .font_data
            .insert("chinese_font".to_owned(), FontData::from_owned(font_data));
        for family in [FontFamily::Proportional, FontFamily::Monospace] {
            if let Some(family) = fonts.families.get_mut(&family) {
                family.insert(0, "chinese_font".to_owned());
            }
        }
        ctx.set_fonts(fonts);
    }

    fn poll_events(&mut self) {
        let Some(session) = &self.session else { return };
        let events: Vec<SessionEvent> = session.events().try_iter().collect();
        for event in events {
            self.status = describe_event(&event);
        }
    }

    /// 上传最新帧（只在有新帧时更新纹理）
    fn upload_latest_frame(&mut self, ctx: &Context) {
        let Some(frame) = self.slot.take_latest() else { return };

        let color_image = ColorImage::from_rgba_unmultiplied(
            [frame.width as usize, frame.height as usize],
            &frame.data,
        );
        match &mut self.texture {
            Some(texture) => texture.set(color_image, TextureOptions::LINEAR),
            None => {
                self.texture = Some(ctx.load_texture("video_frame", color_image, TextureOptions::LINEAR));
            }
        }
    }

    fn render_video_area(&self, ui: &mut Ui) {
        let rect = ui.available_rect_before_wrap();

        let Some(texture) = &self.texture else {
            self.render_placeholder(ui, rect);
            return;
        };

        let [width, height] = texture.size();
        let display_size = fit_size(width as f32, height as f32, rect.size());
        let display_rect = egui::Rect::from_center_size(rect.center(), display_size);

        ui.allocate_ui_at_rect(display_rect, |ui| {
            ui.add(
                egui::Image::from_texture(texture)
                    .fit_to_exact_size(display_size)
                    .rounding(egui::Rounding::same(4.0)),
            );
        });
    }

    fn render_placeholder(&self, ui: &mut Ui, rect: egui::Rect) {
        ui.allocate_ui_at_rect(rect, |ui| {
            ui.centered_and_justified(|ui| {
                ui.vertical_centered(|ui| {
                    ui.add_space(60.0);
                    let (icon, color, message) = match &self.error {
                        Some(message) => ("❌", egui::Color32::RED, message.as_str()),
                        None => ("🎬", egui::Color32::GRAY, "等待视频帧..."),
                    };
                    ui.label(egui::RichText::new(icon).size(48.0).color(color));
                    ui.add_space(10.0);
                    ui.label(
                        egui::RichText::new(message)
                            .size(16.0)
                            .color(egui::Color32::LIGHT_GRAY),
                    );
                });
            });
        });
    }

    fn render_status_bar(&self, ctx: &Context) {
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(&self.file_name);
                if let Some(info) = &self.media_info {
                    ui.separator();
                    ui.label(format!(
                        "{}x{} {} / {} {} Hz",
                        info.width, info.height, info.video_codec, info.audio_codec, info.sample_rate
                    ));
                }
                ui.separator();
                ui.label(format!("已渲染 {} 帧", self.slot.presented()));
                ui.separator();
                ui.label(&self.status);
            });
        });
    }

    fn stop_session(&mut self) {
        let Some(session) = self.session.take() else { return };
        session.stop();
        match session.wait() {
            Ok(report) => info!("🔚 播放会话结束: {:?}", report.outcome),
            Err(e) => error!("❌ 等待播放会话结束失败: {}", e),
        }
    }
}

impl eframe::App for ViewerApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        self.poll_events();
        self.upload_latest_frame(ctx);

        if ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            self.stop_session();
            self.status = "已停止".to_string();
        }

        self.render_status_bar(ctx);
        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(egui::Color32::BLACK))
            .show(ctx, |ui| {
                self.render_video_area(ui);
            });

        // 视频帧到达时 sink 会主动请求重绘，这里只为刷新状态栏
        if self.session.as_ref().is_some_and(|session| !session.is_finished()) {
            ctx.request_repaint_after(Duration::from_millis(200));
        }
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        info!("🔚 ViewerApp 退出");
        self.stop_session();
    }
}

/// 保持宽高比缩放到可用区域内
fn fit_size(width: f32, height: f32, available: egui::Vec2) -> egui::Vec2 {
    if width <= 0.0 || height <= 0.0 || available.y <= 0.0 {
        return egui::Vec2::ZERO;
    }
    let video_aspect = width / height;
    let rect_aspect = available.x / available.y;

    if video_aspect > rect_aspect {
        // 视频更宽，以宽度为准
        egui::Vec2::new(available.x, available.x / video_aspect)
    } else {
        // 视频更高，以高度为准
        egui::Vec2::new(available.y * video_aspect, available.y)
    }
}

fn describe_event(event: &SessionEvent) -> String {
    match event {
        SessionEvent::Started { video, audio } => match (video, audio) {
            (true, true) => "播放中（视频 + 音频）".to_string(),
            (true, false) => "播放中（仅视频）".to_string(),
            _ => "播放中（仅音频）".to_string(),
        },
        SessionEvent::Prepared { stream } => format!("{} 已就绪", stream.label()),
        SessionEvent::PrepareFailed { stream, reason } => {
            format!("{} 准备失败: {}", stream.label(), reason)
        }
        SessionEvent::InputEnded { packets } => format!("文件读取完毕（{} 个包），等待播放完成", packets),
        SessionEvent::ReadFailed { reason } => format!("读取失败: {}", reason),
        SessionEvent::StreamDrained { stream, stats } => {
            format!("{} 播放完成（{} 帧）", stream.label(), stats.frames_rendered)
        }
        SessionEvent::Finished(report) => match &report.outcome {
            SessionOutcome::Completed => "播放结束".to_string(),
            SessionOutcome::ReadFailed { reason } => format!("播放中断: {}", reason),
            SessionOutcome::Cancelled => "已停止".to_string(),
        },
    }
}
