use eframe::egui;

use crate::model::Point;

pub const MIN_ZOOM: f32 = 0.25;
pub const MAX_ZOOM: f32 = 4.0;
pub const ZOOM_STEP: f32 = 0.25;

/// Pan/zoom transform between screen space and image space. Pan is stored in
/// image-space units; the forward order is scale-then-translate, so the
/// inverse divides by zoom before subtracting pan.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct View {
    pub zoom: f32,
    pub pan: egui::Vec2,
}

impl Default for View {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            pan: egui::Vec2::ZERO,
        }
    }
}

impl View {
    /// The fixed-surface variant: no pan, zoom derived from the displayed
    /// vs. native pixel ratio. Same transform, different parameters.
    pub fn fitted(native: egui::Vec2, displayed: egui::Vec2) -> Self {
        let ratio = if native.x > 0.0 && native.y > 0.0 {
            (displayed.x / native.x).min(displayed.y / native.y)
        } else {
            1.0
        };
        Self {
            zoom: ratio.max(f32::EPSILON),
            pan: egui::Vec2::ZERO,
        }
    }

    pub fn to_screen(&self, origin: egui::Pos2, image: Point) -> egui::Pos2 {
        origin + (image.to_pos2().to_vec2() + self.pan) * self.zoom
    }

    pub fn to_image(&self, origin: egui::Pos2, screen: egui::Pos2) -> Point {
        Point::from_pos2(((screen - origin) / self.zoom - self.pan).to_pos2())
    }

    /// Stepped and clamped; zoom can never reach 0 through these controls.
    pub fn zoom_in(&mut self) {
        self.zoom = (self.zoom + ZOOM_STEP).min(MAX_ZOOM);
    }

    pub fn zoom_out(&mut self) {
        self.zoom = (self.zoom - ZOOM_STEP).max(MIN_ZOOM);
    }

    /// Pointer drag in screen pixels becomes an image-space pan offset.
    pub fn pan_by_screen_delta(&mut self, delta: egui::Vec2) {
        self.pan += delta / self.zoom;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_inverts_forward_transform() {
        let origin = egui::pos2(12.0, 48.0);
        let screen_points = [
            egui::pos2(0.0, 0.0),
            egui::pos2(133.7, 901.5),
            egui::pos2(-40.0, 17.0),
        ];
        let mut zoom = MIN_ZOOM;
        while zoom <= MAX_ZOOM {
            for pan in [
                egui::Vec2::ZERO,
                egui::vec2(120.0, -75.5),
                egui::vec2(-3000.0, 42.0),
            ] {
                let view = View { zoom, pan };
                for p in screen_points {
                    let back = view.to_screen(origin, view.to_image(origin, p));
                    assert!(
                        (back - p).length() < 1e-2,
                        "zoom {zoom} pan {pan:?}: {p:?} -> {back:?}"
                    );
                }
            }
            zoom += ZOOM_STEP;
        }
    }

    #[test]
    fn zoom_controls_stay_inside_bounds() {
        let mut view = View::default();
        for _ in 0..32 {
            view.zoom_in();
        }
        assert_eq!(view.zoom, MAX_ZOOM);
        for _ in 0..64 {
            view.zoom_out();
        }
        assert_eq!(view.zoom, MIN_ZOOM);
        assert!(view.zoom > 0.0);
    }

    #[test]
    fn fitted_view_maps_by_display_ratio() {
        // A 2000px-wide image shown in a 500px surface: screen pixel 250
        // lands on native pixel 1000.
        let view = View::fitted(egui::vec2(2000.0, 1000.0), egui::vec2(500.0, 250.0));
        let origin = egui::pos2(0.0, 0.0);
        let image = view.to_image(origin, egui::pos2(250.0, 125.0));
        assert!((image.x - 1000.0).abs() < 1e-3);
        assert!((image.y - 500.0).abs() < 1e-3);
    }

    #[test]
    fn pan_delta_is_scaled_by_zoom() {
        let mut view = View {
            zoom: 2.0,
            pan: egui::Vec2::ZERO,
        };
        view.pan_by_screen_delta(egui::vec2(10.0, -4.0));
        assert_eq!(view.pan, egui::vec2(5.0, -2.0));
    }
}
