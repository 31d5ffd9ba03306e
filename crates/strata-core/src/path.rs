use lyon_tessellation::math::point;
use lyon_tessellation::{BuffersBuilder, FillOptions, FillTessellator, FillVertex, VertexBuffers};

use crate::geometry::{Point, Rect};
use crate::renderer::VertexBuffer;

pub const DEFAULT_TOLERANCE: f32 = 0.1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FillRule {
    #[default]
    NonZero,
    EvenOdd,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PathCmd {
    MoveTo(Point),
    LineTo(Point),
    QuadTo(Point, Point),
    CubicTo(Point, Point, Point),
    Close,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RoundingRadii {
    pub top_left: f32,
    pub top_right: f32,
    pub bottom_right: f32,
    pub bottom_left: f32,
}

impl RoundingRadii {
    pub fn uniform(radius: f32) -> Self {
        Self {
            top_left: radius,
            top_right: radius,
            bottom_right: radius,
            bottom_left: radius,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Path {
    pub cmds: Vec<PathCmd>,
    pub fill_rule: FillRule,
}

impl Path {
    pub fn rect(rect: Rect) -> Self {
        Self {
            cmds: vec![
                PathCmd::MoveTo(Point::new(rect.left, rect.top)),
                PathCmd::LineTo(Point::new(rect.right, rect.top)),
                PathCmd::LineTo(Point::new(rect.right, rect.bottom)),
                PathCmd::LineTo(Point::new(rect.left, rect.bottom)),
                PathCmd::Close,
            ],
            fill_rule: FillRule::NonZero,
        }
    }

    /// Rounded rectangle using quarter-circle cubic approximations.
    pub fn rounded_rect(rect: Rect, radii: RoundingRadii) -> Self {
        let max_radius = (rect.width() * 0.5).min(rect.height() * 0.5).max(0.0);
        let clamp = |r: f32| if r.is_finite() && r > 0.0 { r.min(max_radius) } else { 0.0 };
        let (tl, tr, br, bl) = (
            clamp(radii.top_left),
            clamp(radii.top_right),
            clamp(radii.bottom_right),
            clamp(radii.bottom_left),
        );
        if tl <= 0.0 && tr <= 0.0 && br <= 0.0 && bl <= 0.0 {
            return Self::rect(rect);
        }

        const K: f32 = 0.552_284_749_831;
        let (x0, y0, x1, y1) = (rect.left, rect.top, rect.right, rect.bottom);
        let p = Point::new;
        let cmds = vec![
            PathCmd::MoveTo(p(x0 + tl, y0)),
            PathCmd::LineTo(p(x1 - tr, y0)),
            PathCmd::CubicTo(p(x1 - tr + K * tr, y0), p(x1, y0 + tr - K * tr), p(x1, y0 + tr)),
            PathCmd::LineTo(p(x1, y1 - br)),
            PathCmd::CubicTo(p(x1, y1 - br + K * br), p(x1 - br + K * br, y1), p(x1 - br, y1)),
            PathCmd::LineTo(p(x0 + bl, y1)),
            PathCmd::CubicTo(p(x0 + bl - K * bl, y1), p(x0, y1 - bl + K * bl), p(x0, y1 - bl)),
            PathCmd::LineTo(p(x0, y0 + tl)),
            PathCmd::CubicTo(p(x0, y0 + tl - K * tl), p(x0 + tl - K * tl, y0), p(x0 + tl, y0)),
            PathCmd::Close,
        ];
        Self { cmds, fill_rule: FillRule::NonZero }
    }

    pub fn ellipse(bounds: Rect) -> Self {
        const K: f32 = 0.552_284_749_831;
        let c = bounds.center();
        let kx = bounds.width() * 0.5 * K;
        let ky = bounds.height() * 0.5 * K;
        let (l, t, r, b) = (bounds.left, bounds.top, bounds.right, bounds.bottom);
        let p = Point::new;
        let cmds = vec![
            PathCmd::MoveTo(p(c.x, t)),
            PathCmd::CubicTo(p(c.x + kx, t), p(r, c.y - ky), p(r, c.y)),
            PathCmd::CubicTo(p(r, c.y + ky), p(c.x + kx, b), p(c.x, b)),
            PathCmd::CubicTo(p(c.x - kx, b), p(l, c.y + ky), p(l, c.y)),
            PathCmd::CubicTo(p(l, c.y - ky), p(c.x - kx, t), p(c.x, t)),
            PathCmd::Close,
        ];
        Self { cmds, fill_rule: FillRule::NonZero }
    }

    /// Conservative bounds: the hull of every point including control points.
    pub fn bounds(&self) -> Option<Rect> {
        let mut points = Vec::new();
        for cmd in &self.cmds {
            match *cmd {
                PathCmd::MoveTo(a) | PathCmd::LineTo(a) => points.push(a),
                PathCmd::QuadTo(a, b) => points.extend([a, b]),
                PathCmd::CubicTo(a, b, c) => points.extend([a, b, c]),
                PathCmd::Close => {}
            }
        }
        Rect::from_points(&points)
    }

    /// Triangle list covering the path interior. Empty when tessellation fails.
    pub fn tessellate(&self, tolerance: f32) -> VertexBuffer {
        let mut builder = lyon_path::Path::builder();
        let mut started = false;
        for cmd in &self.cmds {
            match *cmd {
                PathCmd::MoveTo(p) => {
                    if started {
                        builder.end(false);
                    }
                    builder.begin(point(p.x, p.y));
                    started = true;
                }
                PathCmd::LineTo(p) => {
                    if started {
                        builder.line_to(point(p.x, p.y));
                    } else {
                        builder.begin(point(p.x, p.y));
                        started = true;
                    }
                }
                PathCmd::QuadTo(c, p) if started => {
                    builder.quadratic_bezier_to(point(c.x, c.y), point(p.x, p.y));
                }
                PathCmd::CubicTo(c1, c2, p) if started => {
                    builder.cubic_bezier_to(point(c1.x, c1.y), point(c2.x, c2.y), point(p.x, p.y));
                }
                PathCmd::Close if started => {
                    builder.end(true);
                    started = false;
                }
                _ => {}
            }
        }
        if started {
            builder.end(false);
        }
        let lyon_path = builder.build();

        let fill_rule = match self.fill_rule {
            FillRule::NonZero => lyon_tessellation::FillRule::NonZero,
            FillRule::EvenOdd => lyon_tessellation::FillRule::EvenOdd,
        };
        let options = FillOptions::default().with_tolerance(tolerance).with_fill_rule(fill_rule);
        let mut geom: VertexBuffers<Point, u32> = VertexBuffers::new();
        let result = FillTessellator::new().tessellate_path(
            lyon_path.as_slice(),
            &options,
            &mut BuffersBuilder::new(&mut geom, |fv: FillVertex| {
                let p = fv.position();
                Point::new(p.x, p.y)
            }),
        );
        if let Err(err) = result {
            tracing::warn!(?err, "path tessellation failed");
            return VertexBuffer::default();
        }
        VertexBuffer { vertices: geom.vertices, indices: geom.indices }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::PrimitiveType;

    #[test]
    fn rounded_rect_bounds_match_rect() {
        let rect = Rect::from_xywh(10.0, 20.0, 100.0, 50.0);
        let path = Path::rounded_rect(rect, RoundingRadii::uniform(10.0));
        assert_eq!(path.bounds(), Some(rect));
    }

    #[test]
    fn tessellated_rect_covers_its_area() {
        let buffer = Path::rect(Rect::from_xywh(0.0, 0.0, 10.0, 10.0)).tessellate(DEFAULT_TOLERANCE);
        let area: f32 = buffer
            .triangles(PrimitiveType::Triangle)
            .iter()
            .map(|[a, b, c]| ((b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y)).abs() * 0.5)
            .sum();
        assert!((area - 100.0).abs() < 1e-3, "area was {area}");
    }

    #[test]
    fn empty_path_tessellates_to_nothing() {
        assert!(Path::default().tessellate(DEFAULT_TOLERANCE).is_empty());
    }
}
