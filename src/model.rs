use eframe::egui;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn from_pos2(p: egui::Pos2) -> Self {
        Self { x: p.x, y: p.y }
    }

    pub fn to_pos2(self) -> egui::Pos2 {
        egui::pos2(self.x, self.y)
    }

    pub fn distance_to(self, other: Point) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn to_color32(self, opacity: f32) -> egui::Color32 {
        let a = (opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
        egui::Color32::from_rgba_unmultiplied(self.r, self.g, self.b, a)
    }

    pub fn from_color32(c: egui::Color32) -> Self {
        let [r, g, b, _] = c.to_array();
        Self { r, g, b }
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim_start_matches('#');
        if hex.len() < 6 {
            return None;
        }
        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
        Some(Self { r, g, b })
    }
}

/// Photographic perspectives of the subject. Annotations belong to exactly
/// one angle and are never shown under another.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ViewAngle {
    Frontal,
    LeftProfile,
    RightProfile,
    Superior,
    Inferior,
}

impl ViewAngle {
    pub const ALL: [ViewAngle; 5] = [
        ViewAngle::Frontal,
        ViewAngle::LeftProfile,
        ViewAngle::RightProfile,
        ViewAngle::Superior,
        ViewAngle::Inferior,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ViewAngle::Frontal => "Frontal",
            ViewAngle::LeftProfile => "Left profile",
            ViewAngle::RightProfile => "Right profile",
            ViewAngle::Superior => "Superior",
            ViewAngle::Inferior => "Inferior",
        }
    }
}

/// The "current pen": copied into each annotation at commit time.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Style {
    pub color: Rgb,
    pub thickness: f32,
    pub opacity: f32,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            color: Rgb {
                r: 220,
                g: 50,
                b: 47,
            },
            thickness: 3.0,
            opacity: 1.0,
        }
    }
}

pub const DEFAULT_FONT_SIZE: f32 = 16.0;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum AnnotationKind {
    Line {
        start: Point,
        end: Point,
    },
    Arrow {
        start: Point,
        end: Point,
    },
    Circle {
        center: Point,
        radius_x: f32,
        radius_y: f32,
    },
    Text {
        position: Point,
        text: String,
        font_size: f32,
    },
    Freehand {
        points: Vec<Point>,
    },
    Measurement {
        start: Point,
        end: Point,
        distance: f32,
    },
}

impl AnnotationKind {
    /// Drag defines an ellipse anchored at the drag start (the center),
    /// not a bounding-box ellipse between the two points.
    pub fn circle_from_drag(start: Point, end: Point) -> Self {
        Self::Circle {
            center: start,
            radius_x: (end.x - start.x).abs(),
            radius_y: (end.y - start.y).abs(),
        }
    }

    /// Distance is computed here, once, and stored frozen.
    pub fn measurement_from_drag(start: Point, end: Point) -> Self {
        Self::Measurement {
            start,
            end,
            distance: start.distance_to(end),
        }
    }

}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Annotation {
    pub id: u64,
    pub layer_id: u64,
    pub view_angle: ViewAngle,
    pub kind: AnnotationKind,
    pub style: Style,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Annotation {
    pub fn new(
        id: u64,
        layer_id: u64,
        view_angle: ViewAngle,
        kind: AnnotationKind,
        style: Style,
    ) -> Self {
        let now = now_secs();
        Self {
            id,
            layer_id,
            view_angle,
            kind,
            style,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = now_secs();
    }

    pub fn hit_test(&self, p: Point, tolerance: f32) -> bool {
        let slack = tolerance + self.style.thickness;
        match &self.kind {
            AnnotationKind::Line { start, end }
            | AnnotationKind::Arrow { start, end }
            | AnnotationKind::Measurement { start, end, .. } => {
                distance_to_segment(p.to_pos2(), start.to_pos2(), end.to_pos2()) <= slack
            }
            AnnotationKind::Circle {
                center,
                radius_x,
                radius_y,
            } => {
                if *radius_x <= 0.1 || *radius_y <= 0.1 {
                    return p.distance_to(*center) <= slack;
                }
                let nx = (p.x - center.x) / radius_x;
                let ny = (p.y - center.y) / radius_y;
                let d = nx * nx + ny * ny;
                let ring = slack / radius_x.min(*radius_y).max(1.0);
                (1.0 - ring).powi(2) <= d && d <= (1.0 + ring).powi(2)
            }
            AnnotationKind::Text {
                position,
                text,
                font_size,
            } => {
                // Conservative galley estimate, matches the render-side hit box.
                let w = (text.chars().count().max(1) as f32 * font_size * 0.6).max(20.0);
                let h = font_size * 1.2;
                let rect = egui::Rect::from_min_size(position.to_pos2(), egui::vec2(w, h));
                rect.expand(tolerance).contains(p.to_pos2())
            }
            AnnotationKind::Freehand { points } => match points.len() {
                0 => false,
                1 => p.distance_to(points[0]) <= slack,
                _ => points.windows(2).any(|pair| {
                    distance_to_segment(p.to_pos2(), pair[0].to_pos2(), pair[1].to_pos2()) <= slack
                }),
            },
        }
    }
}

pub fn distance_to_segment(p: egui::Pos2, a: egui::Pos2, b: egui::Pos2) -> f32 {
    let ab = b - a;
    let ap = p - a;
    let ab_len2 = ab.x * ab.x + ab.y * ab.y;
    if ab_len2 <= f32::EPSILON {
        return (p - a).length();
    }
    let t = ((ap.x * ab.x + ap.y * ab.y) / ab_len2).clamp(0.0, 1.0);
    let closest = a + ab * t;
    (p - closest).length()
}

pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circle_is_anchored_at_drag_start() {
        let kind =
            AnnotationKind::circle_from_drag(Point::new(10.0, 10.0), Point::new(40.0, 30.0));
        match kind {
            AnnotationKind::Circle {
                center,
                radius_x,
                radius_y,
            } => {
                assert_eq!(center, Point::new(10.0, 10.0));
                assert_eq!(radius_x, 30.0);
                assert_eq!(radius_y, 20.0);
            }
            other => panic!("expected circle, got {other:?}"),
        }
    }

    #[test]
    fn measurement_distance_is_frozen_at_commit() {
        let kind =
            AnnotationKind::measurement_from_drag(Point::new(0.0, 0.0), Point::new(3.0, 4.0));
        let AnnotationKind::Measurement { distance, .. } = kind else {
            panic!("expected measurement");
        };
        assert_eq!(distance, 5.0);
    }

    #[test]
    fn hit_test_line_respects_thickness() {
        let annotation = Annotation::new(
            1,
            1,
            ViewAngle::Frontal,
            AnnotationKind::Line {
                start: Point::new(0.0, 0.0),
                end: Point::new(100.0, 0.0),
            },
            Style {
                thickness: 2.0,
                ..Style::default()
            },
        );
        assert!(annotation.hit_test(Point::new(50.0, 1.5), 2.0));
        assert!(!annotation.hit_test(Point::new(50.0, 20.0), 2.0));
    }

    #[test]
    fn hit_test_circle_ring_only() {
        let annotation = Annotation::new(
            1,
            1,
            ViewAngle::Frontal,
            AnnotationKind::Circle {
                center: Point::new(50.0, 50.0),
                radius_x: 30.0,
                radius_y: 20.0,
            },
            Style::default(),
        );
        assert!(annotation.hit_test(Point::new(80.0, 50.0), 2.0));
        assert!(!annotation.hit_test(Point::new(50.0, 50.0), 2.0));
    }

    #[test]
    fn hit_test_freehand_polyline() {
        let annotation = Annotation::new(
            1,
            1,
            ViewAngle::Frontal,
            AnnotationKind::Freehand {
                points: vec![
                    Point::new(0.0, 0.0),
                    Point::new(10.0, 0.0),
                    Point::new(10.0, 10.0),
                ],
            },
            Style {
                thickness: 1.0,
                ..Style::default()
            },
        );
        assert!(annotation.hit_test(Point::new(10.0, 5.0), 1.0));
        assert!(!annotation.hit_test(Point::new(30.0, 30.0), 1.0));
    }

    #[test]
    fn view_angle_serializes_kebab_case() {
        let json = serde_json::to_string(&ViewAngle::LeftProfile).unwrap();
        assert_eq!(json, "\"left-profile\"");
        let back: ViewAngle = serde_json::from_str("\"frontal\"").unwrap();
        assert_eq!(back, ViewAngle::Frontal);
    }

    #[test]
    fn hex_round_trip() {
        let color = Rgb {
            r: 220,
            g: 50,
            b: 47,
        };
        assert_eq!(color.to_hex(), "#dc322f");
        assert_eq!(Rgb::from_hex("#dc322f"), Some(color));
        assert_eq!(Rgb::from_hex("oops"), None);
    }
}
