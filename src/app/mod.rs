use eframe::egui;

use crate::model::{Rgb, ViewAngle};
use crate::session::{CanvasSession, Tool};
use crate::store::JsonFileStore;
use crate::view::View;

mod actions;
mod render;
mod settings;
mod update;

/// A loaded photograph for one view angle: the raster kept for export, the
/// GPU texture for the canvas.
struct Photo {
    image: image::DynamicImage,
    texture: egui::TextureHandle,
    native_size: egui::Vec2,
}

pub struct EvaluationApp {
    session: CanvasSession<JsonFileStore>,
    views: [View; ViewAngle::ALL.len()],
    photos: [Option<Photo>; ViewAngle::ALL.len()],
    tool_before_pan: Option<Tool>,
    status: Option<String>,
    settings: settings::AppSettings,
    settings_path: String,
    text_input: String,
    new_layer_name: String,
    rename_buffer: String,
    last_canvas_size: egui::Vec2,
}

impl EvaluationApp {
    fn config_path() -> Option<String> {
        if let Some(home) = std::env::var_os("HOME") {
            let path = std::path::PathBuf::from(home)
                .join(".config")
                .join("facemark.toml");
            if path.exists() {
                return Some(path.display().to_string());
            }
        }
        if std::path::Path::new("settings.toml").exists() {
            return Some("settings.toml".to_string());
        }
        None
    }

    pub fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        let settings_path = Self::config_path().unwrap_or_else(|| "settings.toml".to_string());
        let settings = settings::load_settings(&settings_path)
            .or_else(|| settings::load_settings("settings.json"))
            .unwrap_or_default();

        let store = JsonFileStore::new(&settings.data_dir);
        let mut session =
            CanvasSession::new(&settings.evaluation_id, store, settings.max_history.max(1));
        if let Some(color) = Rgb::from_hex(&settings.pen_color) {
            session.pen.color = color;
        }
        session.pen.thickness = settings.pen_thickness;
        session.pen.opacity = settings.pen_opacity.clamp(0.0, 1.0);

        Self {
            session,
            views: [View::default(); ViewAngle::ALL.len()],
            photos: std::array::from_fn(|_| None),
            tool_before_pan: None,
            status: None,
            settings,
            settings_path,
            text_input: String::new(),
            new_layer_name: String::new(),
            rename_buffer: String::new(),
            last_canvas_size: egui::Vec2::ZERO,
        }
    }

    fn angle_index(angle: ViewAngle) -> usize {
        ViewAngle::ALL.iter().position(|a| *a == angle).unwrap_or(0)
    }

    fn view(&self) -> &View {
        &self.views[Self::angle_index(self.session.current_angle())]
    }

    fn view_mut(&mut self) -> &mut View {
        &mut self.views[Self::angle_index(self.session.current_angle())]
    }

    fn photo(&self) -> Option<&Photo> {
        self.photos[Self::angle_index(self.session.current_angle())].as_ref()
    }
}
