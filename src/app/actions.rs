use eframe::egui;

use crate::export;
use crate::view::View;

use super::{EvaluationApp, Photo, settings};

impl EvaluationApp {
    pub(super) fn persist_settings(&mut self) {
        self.settings.pen_color = self.session.pen.color.to_hex();
        self.settings.pen_thickness = self.session.pen.thickness;
        self.settings.pen_opacity = self.session.pen.opacity;
        if let Err(e) = settings::save_settings(&self.settings_path, &self.settings) {
            self.status = Some(format!("Settings save failed: {e}"));
        }
    }

    pub(super) fn load_photo_dialog(&mut self, ctx: &egui::Context) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Images", &["png", "jpg", "jpeg"])
            .pick_file()
        else {
            return;
        };
        match image::open(&path) {
            Ok(image) => {
                let rgba = image.to_rgba8();
                let size = [rgba.width() as usize, rgba.height() as usize];
                let color_image = egui::ColorImage::from_rgba_unmultiplied(size, rgba.as_raw());
                let angle = self.session.current_angle();
                let texture = ctx.load_texture(
                    format!("photo-{}", angle.label()),
                    color_image,
                    egui::TextureOptions::LINEAR,
                );
                let native_size = egui::vec2(image.width() as f32, image.height() as f32);
                let idx = Self::angle_index(angle);
                self.photos[idx] = Some(Photo {
                    image,
                    texture,
                    native_size,
                });
                self.views[idx] = View::default();
                self.status = Some(format!("Loaded {}", path.display()));
            }
            Err(e) => self.status = Some(format!("Image load failed: {e}")),
        }
    }

    pub(super) fn save_evaluation(&mut self) {
        match self.session.save() {
            Ok(()) => {
                self.status = Some(format!("Saved evaluation {}", self.session.evaluation_id()));
            }
            Err(msg) => self.status = Some(msg),
        }
    }

    pub(super) fn export_png_dialog(&mut self) {
        let Some(photo) = self.photo() else {
            self.status = Some("Load a photo before exporting".to_string());
            return;
        };
        let flat = export::flatten(
            &photo.image,
            self.session.layers().layers(),
            self.session.annotations(),
            self.session.current_angle(),
        );
        let flat = match flat {
            Ok(flat) => flat,
            Err(e) => {
                self.status = Some(format!("Export failed: {e:#}"));
                return;
            }
        };
        let default_name = export::export_file_name(self.session.evaluation_id());
        let Some(path) = rfd::FileDialog::new()
            .set_file_name(&default_name)
            .add_filter("PNG", &["png"])
            .save_file()
        else {
            return;
        };
        let written = export::encode_png(&flat)
            .and_then(|bytes| std::fs::write(&path, bytes).map_err(Into::into));
        match written {
            Ok(()) => self.status = Some(format!("Exported {}", path.display())),
            Err(e) => self.status = Some(format!("Export failed: {e:#}")),
        }
    }

    /// Derives zoom from the panel/photo ratio, pan reset.
    pub(super) fn fit_to_window(&mut self) {
        let Some(native) = self.photo().map(|p| p.native_size) else {
            self.view_mut().reset();
            return;
        };
        let panel = self.last_canvas_size;
        *self.view_mut() = View::fitted(native, panel);
    }
}
