use ab_glyph::FontArc;
use anyhow::{Context, Result, anyhow};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::draw_text_mut;
use tiny_skia::{LineCap, LineJoin, Paint, PathBuilder, Pixmap, Rect, Stroke, Transform};

use crate::layers::Layer;
use crate::model::{Annotation, AnnotationKind, DEFAULT_FONT_SIZE, Point, ViewAngle, now_secs};

const ARROW_HEAD_LEN: f32 = 15.0;
const ARROW_HEAD_HALF_ANGLE: f32 = std::f32::consts::PI / 6.0;
const MEASUREMENT_LABEL_LIFT: f32 = 14.0;

/// Burns the visible annotations of one view angle into a copy of the
/// photograph, honoring layer visibility and paint order.
pub fn flatten(
    image: &DynamicImage,
    layers: &[Layer],
    annotations: &[Annotation],
    angle: ViewAngle,
) -> Result<DynamicImage> {
    let mut pixmap = Pixmap::new(image.width(), image.height())
        .ok_or_else(|| anyhow!("cannot allocate pixmap"))?;
    copy_image_to_pixmap(image, &mut pixmap)?;

    let visible = visible_in_paint_order(layers, annotations, angle);
    for annotation in &visible {
        draw_annotation_shape(&mut pixmap, annotation)?;
    }

    let mut output = RgbaImage::from_raw(image.width(), image.height(), pixmap.data().to_vec())
        .ok_or_else(|| anyhow!("cannot construct output image"))?;
    draw_labels(&mut output, &visible);

    Ok(DynamicImage::ImageRgba8(output))
}

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .context("cannot encode PNG")?;
    Ok(buffer.into_inner())
}

pub fn export_file_name(evaluation_id: &str) -> String {
    format!("{evaluation_id}-{}.png", now_secs())
}

fn visible_in_paint_order<'a>(
    layers: &[Layer],
    annotations: &'a [Annotation],
    angle: ViewAngle,
) -> Vec<&'a Annotation> {
    let mut visible: Vec<&Annotation> = annotations
        .iter()
        .filter(|a| a.view_angle == angle)
        .filter(|a| {
            layers
                .iter()
                .find(|l| l.id == a.layer_id)
                .is_some_and(|l| l.visible)
        })
        .collect();
    visible.sort_by_key(|a| {
        layers
            .iter()
            .find(|l| l.id == a.layer_id)
            .map_or(0, |l| l.order)
    });
    visible
}

fn copy_image_to_pixmap(image: &DynamicImage, pixmap: &mut Pixmap) -> Result<()> {
    let rgba = image.to_rgba8();
    let data = pixmap.data_mut();
    if data.len() != rgba.len() {
        return Err(anyhow!("source image and pixmap size mismatch"));
    }
    data.copy_from_slice(rgba.as_raw());
    Ok(())
}

fn draw_annotation_shape(pixmap: &mut Pixmap, annotation: &Annotation) -> Result<()> {
    let mut paint = Paint::default();
    let alpha = (annotation.style.opacity.clamp(0.0, 1.0) * 255.0) as u8;
    paint.set_color_rgba8(
        annotation.style.color.r,
        annotation.style.color.g,
        annotation.style.color.b,
        alpha,
    );
    paint.anti_alias = true;

    let stroke = Stroke {
        width: annotation.style.thickness,
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..Default::default()
    };

    match &annotation.kind {
        AnnotationKind::Line { start, end } => {
            stroke_segments(pixmap, &[*start, *end], &paint, &stroke)?;
        }
        AnnotationKind::Arrow { start, end } => {
            stroke_segments(pixmap, &[*start, *end], &paint, &stroke)?;
            stroke_arrow_head(pixmap, *start, *end, &paint, &stroke)?;
        }
        AnnotationKind::Circle {
            center,
            radius_x,
            radius_y,
        } => {
            let rx = radius_x.max(0.5);
            let ry = radius_y.max(0.5);
            let bounds = Rect::from_ltrb(
                center.x - rx,
                center.y - ry,
                center.x + rx,
                center.y + ry,
            )
            .ok_or_else(|| anyhow!("cannot build ellipse bounds"))?;
            let mut pb = PathBuilder::new();
            pb.push_oval(bounds);
            let path = pb
                .finish()
                .ok_or_else(|| anyhow!("cannot build ellipse path"))?;
            pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
        }
        AnnotationKind::Freehand { points } => {
            stroke_segments(pixmap, points, &paint, &stroke)?;
        }
        AnnotationKind::Measurement { start, end, .. } => {
            stroke_segments(pixmap, &[*start, *end], &paint, &stroke)?;
        }
        AnnotationKind::Text { .. } => {
            // Rendered in the imageproc pass with the other labels.
        }
    }

    Ok(())
}

fn stroke_segments(
    pixmap: &mut Pixmap,
    points: &[Point],
    paint: &Paint,
    stroke: &Stroke,
) -> Result<()> {
    let Some(first) = points.first() else {
        return Ok(());
    };
    let mut pb = PathBuilder::new();
    pb.move_to(first.x, first.y);
    for p in &points[1..] {
        pb.line_to(p.x, p.y);
    }
    if points.len() == 1 {
        // A degenerate segment still leaves a mark.
        pb.line_to(first.x + 0.01, first.y);
    }
    let path = pb.finish().ok_or_else(|| anyhow!("cannot build path"))?;
    pixmap.stroke_path(&path, paint, stroke, Transform::identity(), None);
    Ok(())
}

/// Two chevron strokes fanning back from the tip.
fn stroke_arrow_head(
    pixmap: &mut Pixmap,
    start: Point,
    end: Point,
    paint: &Paint,
    stroke: &Stroke,
) -> Result<()> {
    let heading = (end.y - start.y).atan2(end.x - start.x);
    let mut pb = PathBuilder::new();
    for side in [-1.0, 1.0] {
        let theta = heading + std::f32::consts::PI + side * ARROW_HEAD_HALF_ANGLE;
        pb.move_to(end.x, end.y);
        pb.line_to(
            end.x + ARROW_HEAD_LEN * theta.cos(),
            end.y + ARROW_HEAD_LEN * theta.sin(),
        );
    }
    let path = pb
        .finish()
        .ok_or_else(|| anyhow!("cannot build arrow head"))?;
    pixmap.stroke_path(&path, paint, stroke, Transform::identity(), None);
    Ok(())
}

fn draw_labels(image: &mut RgbaImage, annotations: &[&Annotation]) {
    let Some(font) = load_system_font() else {
        log::warn!("no usable system font; text annotations omitted from export");
        return;
    };

    for annotation in annotations {
        let color = Rgba([
            annotation.style.color.r,
            annotation.style.color.g,
            annotation.style.color.b,
            255,
        ]);
        match &annotation.kind {
            AnnotationKind::Text {
                position,
                text,
                font_size,
            } => {
                draw_text_mut(
                    image,
                    color,
                    position.x as i32,
                    position.y as i32,
                    *font_size,
                    &font,
                    text,
                );
            }
            AnnotationKind::Measurement {
                start,
                end,
                distance,
            } => {
                let mid_x = (start.x + end.x) * 0.5;
                let mid_y = (start.y + end.y) * 0.5 - MEASUREMENT_LABEL_LIFT;
                draw_text_mut(
                    image,
                    color,
                    mid_x as i32,
                    mid_y as i32,
                    DEFAULT_FONT_SIZE,
                    &font,
                    &format!("{}px", distance.round() as i64),
                );
            }
            _ => {}
        }
    }
}

fn load_system_font() -> Option<FontArc> {
    let candidates = [
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/System/Library/Fonts/Supplemental/Arial.ttf",
        "/System/Library/Fonts/SFNS.ttf",
        "C:\\Windows\\Fonts\\arial.ttf",
    ];

    for path in candidates {
        if let Ok(bytes) = std::fs::read(path) {
            if let Ok(font) = FontArc::try_from_vec(bytes) {
                return Some(font);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use image::{DynamicImage, RgbaImage};

    use super::*;
    use crate::model::Style;

    fn white_photo(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, image::Rgba([255, 255, 255, 255])))
    }

    fn layer(id: u64, order: i32, visible: bool) -> Layer {
        Layer {
            id,
            name: format!("Layer {id}"),
            order,
            visible,
            locked: false,
        }
    }

    #[test]
    fn flatten_keeps_image_size() {
        let image = white_photo(320, 200);
        let layers = vec![layer(1, 0, true)];
        let annotations = vec![Annotation::new(
            1,
            1,
            ViewAngle::Frontal,
            AnnotationKind::Arrow {
                start: Point::new(10.0, 10.0),
                end: Point::new(200.0, 150.0),
            },
            Style::default(),
        )];

        let result = flatten(&image, &layers, &annotations, ViewAngle::Frontal).unwrap();
        assert_eq!(result.width(), 320);
        assert_eq!(result.height(), 200);
    }

    #[test]
    fn ellipse_outline_keeps_the_pen_thickness() {
        let image = white_photo(120, 120);
        let layers = vec![layer(1, 0, true)];
        let annotations = vec![Annotation::new(
            1,
            1,
            ViewAngle::Frontal,
            AnnotationKind::Circle {
                center: Point::new(60.0, 60.0),
                radius_x: 40.0,
                radius_y: 10.0,
            },
            Style::default(),
        )];

        let result = flatten(&image, &layers, &annotations, ViewAngle::Frontal)
            .unwrap()
            .to_rgba8();
        // The outline crosses the center row once on the left, at x = 20.
        // A wide-radius ellipse must still leave a band no wider than the
        // 3 px pen plus antialiasing, not one scaled by the radius.
        let band: usize = (0..60)
            .filter(|&x| result.get_pixel(x, 60).0 != [255, 255, 255, 255])
            .count();
        assert!(band >= 1, "outline missing from the center row");
        assert!(band <= 8, "outline band too wide: {band} px");
    }

    #[test]
    fn hidden_layers_and_other_angles_are_skipped() {
        let layers = vec![layer(1, 0, true), layer(2, 1, false)];
        let annotations = vec![
            Annotation::new(
                1,
                1,
                ViewAngle::Frontal,
                AnnotationKind::Line {
                    start: Point::new(0.0, 0.0),
                    end: Point::new(5.0, 5.0),
                },
                Style::default(),
            ),
            Annotation::new(
                2,
                2,
                ViewAngle::Frontal,
                AnnotationKind::Line {
                    start: Point::new(0.0, 0.0),
                    end: Point::new(5.0, 5.0),
                },
                Style::default(),
            ),
            Annotation::new(
                3,
                1,
                ViewAngle::Superior,
                AnnotationKind::Line {
                    start: Point::new(0.0, 0.0),
                    end: Point::new(5.0, 5.0),
                },
                Style::default(),
            ),
        ];

        let visible = visible_in_paint_order(&layers, &annotations, ViewAngle::Frontal);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, 1);
    }

    #[test]
    fn flatten_marks_pixels() {
        let image = white_photo(64, 64);
        let layers = vec![layer(1, 0, true)];
        let annotations = vec![Annotation::new(
            1,
            1,
            ViewAngle::Frontal,
            AnnotationKind::Line {
                start: Point::new(0.0, 32.0),
                end: Point::new(64.0, 32.0),
            },
            Style::default(),
        )];

        let result = flatten(&image, &layers, &annotations, ViewAngle::Frontal).unwrap();
        let rgba = result.to_rgba8();
        assert_ne!(rgba.get_pixel(32, 32), &image::Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn png_encoding_produces_a_png_header() {
        let bytes = encode_png(&white_photo(8, 8)).unwrap();
        assert_eq!(&bytes[..4], &[0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn export_name_embeds_the_evaluation_id() {
        let name = export_file_name("eval-42");
        assert!(name.starts_with("eval-42-"));
        assert!(name.ends_with(".png"));
    }
}
