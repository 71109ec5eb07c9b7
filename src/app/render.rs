use eframe::egui;

use crate::model::{Annotation, AnnotationKind, DEFAULT_FONT_SIZE, Point, Rgb, Style, ViewAngle};
use crate::session::Tool;
use crate::view::View;

use super::Photo;

const ARROW_HEAD_LEN: f32 = 15.0;
const ARROW_HEAD_HALF_ANGLE: f32 = std::f32::consts::PI / 6.0;
const MEASUREMENT_LABEL_LIFT: f32 = 14.0;

pub(super) fn tool_button(ui: &mut egui::Ui, label: &str, tool: Tool, current: Tool) -> Option<Tool> {
    let active = current == tool;
    if ui
        .selectable_label(active, label)
        .on_hover_text(tool.label())
        .clicked()
    {
        return Some(tool);
    }
    None
}

fn color_row(ui: &mut egui::Ui, rgb: &mut Rgb) -> bool {
    let mut changed = false;
    ui.horizontal(|ui| {
        let presets = [
            egui::Color32::from_rgb(220, 50, 47),
            egui::Color32::from_rgb(203, 75, 22),
            egui::Color32::from_rgb(181, 137, 0),
            egui::Color32::from_rgb(40, 140, 60),
            egui::Color32::from_rgb(38, 139, 210),
            egui::Color32::from_rgb(108, 113, 196),
            egui::Color32::from_rgb(20, 20, 20),
        ];
        for c in presets {
            if ui
                .add_sized([18.0, 18.0], egui::Button::new("").fill(c))
                .clicked()
            {
                *rgb = Rgb::from_color32(c);
                changed = true;
            }
        }
        let mut arr = [rgb.r, rgb.g, rgb.b];
        if ui.color_edit_button_srgb(&mut arr).changed() {
            *rgb = Rgb {
                r: arr[0],
                g: arr[1],
                b: arr[2],
            };
            changed = true;
        }
    });
    changed
}

pub(super) fn style_editor(ui: &mut egui::Ui, style: &mut Style) -> bool {
    let mut changed = false;
    ui.label("Color");
    changed |= color_row(ui, &mut style.color);
    changed |= ui
        .add(egui::Slider::new(&mut style.thickness, 0.5..=12.0).text("Thickness"))
        .changed();
    changed |= ui
        .add(egui::Slider::new(&mut style.opacity, 0.1..=1.0).text("Opacity"))
        .changed();
    changed
}

pub(super) fn draw_background(painter: &egui::Painter, rect: egui::Rect) {
    let bg = painter.ctx().style().visuals.extreme_bg_color;
    painter.rect_filled(rect, 0.0, bg);
}

pub(super) fn draw_photo(painter: &egui::Painter, origin: egui::Pos2, view: &View, photo: &Photo) {
    let min = view.to_screen(origin, Point::new(0.0, 0.0));
    let max = view.to_screen(
        origin,
        Point::new(photo.native_size.x, photo.native_size.y),
    );
    painter.image(
        photo.texture.id(),
        egui::Rect::from_min_max(min, max),
        egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
        egui::Color32::WHITE,
    );
}

pub(super) fn draw_placeholder(painter: &egui::Painter, rect: egui::Rect, angle: ViewAngle) {
    painter.text(
        rect.center(),
        egui::Align2::CENTER_CENTER,
        format!("No photo loaded for the {} view", angle.label()),
        egui::FontId::proportional(16.0),
        painter.ctx().style().visuals.weak_text_color(),
    );
}

pub(super) fn draw_annotations(
    painter: &egui::Painter,
    origin: egui::Pos2,
    view: &View,
    annotations: &[&Annotation],
) {
    for annotation in annotations {
        draw_annotation(painter, origin, view, annotation);
    }
}

fn draw_annotation(painter: &egui::Painter, origin: egui::Pos2, view: &View, a: &Annotation) {
    let stroke = egui::Stroke::new(
        a.style.thickness * view.zoom,
        a.style.color.to_color32(a.style.opacity),
    );
    match &a.kind {
        AnnotationKind::Line { start, end } => {
            let s = view.to_screen(origin, *start);
            let e = view.to_screen(origin, *end);
            painter.line_segment([s, e], stroke);
        }
        AnnotationKind::Arrow { start, end } => {
            let s = view.to_screen(origin, *start);
            let e = view.to_screen(origin, *end);
            painter.line_segment([s, e], stroke);
            draw_chevron(painter, s, e, stroke, view.zoom);
        }
        AnnotationKind::Circle {
            center,
            radius_x,
            radius_y,
        } => {
            let c = view.to_screen(origin, *center);
            let radii = egui::vec2(*radius_x, *radius_y) * view.zoom;
            painter.add(egui::Shape::ellipse_stroke(c, radii, stroke));
        }
        AnnotationKind::Text {
            position,
            text,
            font_size,
        } => {
            painter.text(
                view.to_screen(origin, *position),
                egui::Align2::LEFT_TOP,
                text,
                egui::FontId::proportional(font_size * view.zoom),
                a.style.color.to_color32(a.style.opacity),
            );
        }
        AnnotationKind::Freehand { points } => {
            let pts: Vec<egui::Pos2> = points.iter().map(|p| view.to_screen(origin, *p)).collect();
            if pts.len() >= 2 {
                painter.add(egui::Shape::line(pts, stroke));
            }
        }
        AnnotationKind::Measurement {
            start,
            end,
            distance,
        } => {
            let s = view.to_screen(origin, *start);
            let e = view.to_screen(origin, *end);
            painter.line_segment([s, e], stroke);
            draw_measurement_label(painter, view, s, e, *distance, a.style.color, a.style.opacity);
        }
    }
}

/// Two strokes fanning back from the tip; drawn in image-space proportions
/// so the head scales with zoom.
fn draw_chevron(
    painter: &egui::Painter,
    start: egui::Pos2,
    end: egui::Pos2,
    stroke: egui::Stroke,
    zoom: f32,
) {
    let v = end - start;
    if v.length_sq() <= f32::EPSILON {
        return;
    }
    let heading = v.y.atan2(v.x);
    let len = ARROW_HEAD_LEN * zoom;
    for side in [-1.0f32, 1.0] {
        let theta = heading + std::f32::consts::PI + side * ARROW_HEAD_HALF_ANGLE;
        painter.line_segment(
            [end, end + egui::vec2(len * theta.cos(), len * theta.sin())],
            stroke,
        );
    }
}

fn draw_measurement_label(
    painter: &egui::Painter,
    view: &View,
    s: egui::Pos2,
    e: egui::Pos2,
    distance: f32,
    color: Rgb,
    opacity: f32,
) {
    let mid = egui::pos2((s.x + e.x) * 0.5, (s.y + e.y) * 0.5);
    painter.text(
        mid - egui::vec2(0.0, MEASUREMENT_LABEL_LIFT * view.zoom),
        egui::Align2::CENTER_BOTTOM,
        format!("{}px", distance.round() as i64),
        egui::FontId::proportional(DEFAULT_FONT_SIZE * view.zoom),
        color.to_color32(opacity),
    );
}

pub(super) fn draw_in_progress(
    painter: &egui::Painter,
    origin: egui::Pos2,
    view: &View,
    tool: Tool,
    style: &Style,
    start: Point,
    current: Point,
    points: Option<&[Point]>,
) {
    let stroke = egui::Stroke::new(
        style.thickness * view.zoom,
        style.color.to_color32(style.opacity),
    );
    let s = view.to_screen(origin, start);
    let c = view.to_screen(origin, current);
    match tool {
        Tool::Line => {
            painter.line_segment([s, c], stroke);
        }
        Tool::Arrow => {
            painter.line_segment([s, c], stroke);
            draw_chevron(painter, s, c, stroke, view.zoom);
        }
        Tool::Circle => {
            let AnnotationKind::Circle {
                center,
                radius_x,
                radius_y,
            } = AnnotationKind::circle_from_drag(start, current)
            else {
                return;
            };
            let center = view.to_screen(origin, center);
            painter.add(egui::Shape::ellipse_stroke(
                center,
                egui::vec2(radius_x, radius_y) * view.zoom,
                stroke,
            ));
        }
        Tool::Measurement => {
            painter.line_segment([s, c], stroke);
            // Live readout; the stored value freezes at commit.
            draw_measurement_label(
                painter,
                view,
                s,
                c,
                start.distance_to(current),
                style.color,
                style.opacity,
            );
        }
        Tool::Freehand => {
            if let Some(points) = points {
                let pts: Vec<egui::Pos2> =
                    points.iter().map(|p| view.to_screen(origin, *p)).collect();
                if pts.len() >= 2 {
                    painter.add(egui::Shape::line(pts, stroke));
                }
            }
        }
        Tool::Text | Tool::Pointer | Tool::Eraser => {}
    }
}
