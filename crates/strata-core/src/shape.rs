use crate::formats::PrimitiveType;
use crate::geometry::{ISize, Matrix, Rect};
use crate::path::{DEFAULT_TOLERANCE, Path, RoundingRadii};
use crate::renderer::VertexBuffer;

/// Vertices ready for a draw, plus the transform mapping them into the pass.
#[derive(Clone, Debug, Default)]
pub struct GeometryResult {
    pub primitive_type: PrimitiveType,
    pub vertex_buffer: VertexBuffer,
    pub transform: Matrix,
}

/// Shapes contents can fill.
#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    /// Everything the render target can show.
    Cover,
    Rect(Rect),
    RoundRect { rect: Rect, radii: RoundingRadii },
    Ellipse(Rect),
    FillPath(Path),
}

impl Geometry {
    fn local_bounds(&self) -> Option<Rect> {
        match self {
            Geometry::Cover => Some(Rect::maximum()),
            Geometry::Rect(rect) | Geometry::RoundRect { rect, .. } | Geometry::Ellipse(rect) => {
                Some(*rect)
            }
            Geometry::FillPath(path) => path.bounds(),
        }
    }

    /// Coverage in the space `transform` maps into. Degenerate transforms and
    /// empty shapes cover nothing.
    pub fn coverage(&self, transform: &Matrix) -> Option<Rect> {
        if matches!(self, Geometry::Cover) {
            return Some(Rect::maximum());
        }
        if transform.is_degenerate() {
            return None;
        }
        let bounds = self.local_bounds()?;
        if bounds.is_empty() {
            return None;
        }
        Some(bounds.transform_bounds(transform))
    }

    /// True when the shape is known to fill all of `rect` after `transform`.
    pub fn covers_area(&self, transform: &Matrix, rect: &Rect) -> bool {
        match self {
            Geometry::Cover => true,
            Geometry::Rect(local) => {
                transform.is_translation_scale_only() && local.transform_bounds(transform).contains(rect)
            }
            _ => false,
        }
    }

    pub fn position_buffer(&self, transform: &Matrix, pass_size: ISize) -> GeometryResult {
        match self {
            Geometry::Cover => {
                let Some(inverse) = transform.invert() else {
                    return GeometryResult::default();
                };
                let points = Rect::from_isize(pass_size).points().map(|p| inverse.transform_point(p));
                GeometryResult {
                    primitive_type: PrimitiveType::TriangleStrip,
                    vertex_buffer: VertexBuffer::from_rect_strip(points),
                    transform: *transform,
                }
            }
            Geometry::Rect(rect) => GeometryResult {
                primitive_type: PrimitiveType::TriangleStrip,
                vertex_buffer: if rect.is_empty() {
                    VertexBuffer::default()
                } else {
                    VertexBuffer::from_rect_strip(rect.points())
                },
                transform: *transform,
            },
            Geometry::RoundRect { rect, radii } => {
                Self::fill(&Path::rounded_rect(*rect, *radii), transform)
            }
            Geometry::Ellipse(rect) => Self::fill(&Path::ellipse(*rect), transform),
            Geometry::FillPath(path) => Self::fill(path, transform),
        }
    }

    fn fill(path: &Path, transform: &Matrix) -> GeometryResult {
        let scale = transform.max_basis_length_xy();
        let tolerance = if scale > 0.0 { DEFAULT_TOLERANCE / scale } else { DEFAULT_TOLERANCE };
        GeometryResult {
            primitive_type: PrimitiveType::Triangle,
            vertex_buffer: path.tessellate(tolerance),
            transform: *transform,
        }
    }
}
