use std::ops::{Add, Mul, Neg, Sub};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Neg for Point {
    type Output = Point;
    fn neg(self) -> Point {
        Point::new(-self.x, -self.y)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

/// Integer size, used for textures and render targets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ISize {
    pub width: i64,
    pub height: i64,
}

impl ISize {
    pub const fn new(width: i64, height: i64) -> Self {
        Self { width, height }
    }

    /// A size larger than any real target. Used when a query has no target in mind.
    pub const fn infinite() -> Self {
        Self { width: i64::MAX, height: i64::MAX }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn area(&self) -> i64 {
        self.width.saturating_mul(self.height)
    }

    /// Number of mip levels in a full chain for this size.
    pub fn mip_count(&self) -> u32 {
        if self.is_empty() {
            return 1;
        }
        let longest = self.width.max(self.height) as f64;
        (longest.log2().ceil() as u32).max(1)
    }

    pub fn to_size(self) -> Size {
        Size::new(self.width as f32, self.height as f32)
    }
}

/// Axis aligned rectangle stored as left, top, right, bottom.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub const fn from_ltrb(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn from_xywh(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::from_ltrb(x, y, x + width, y + height)
    }

    pub fn from_origin_size(origin: Point, size: Size) -> Self {
        Self::from_xywh(origin.x, origin.y, size.width, size.height)
    }

    pub fn from_size(size: Size) -> Self {
        Self::from_ltrb(0.0, 0.0, size.width, size.height)
    }

    pub fn from_isize(size: ISize) -> Self {
        Self::from_size(size.to_size())
    }

    /// The largest representable rectangle, reported by unbounded contents.
    pub const fn maximum() -> Self {
        Self::from_ltrb(f32::MIN, f32::MIN, f32::MAX, f32::MAX)
    }

    pub fn is_maximum(&self) -> bool {
        *self == Self::maximum()
    }

    /// Bounding box of a set of points, `None` when the slice is empty.
    pub fn from_points(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let mut rect = Self::from_ltrb(first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            rect.left = rect.left.min(p.x);
            rect.top = rect.top.min(p.y);
            rect.right = rect.right.max(p.x);
            rect.bottom = rect.bottom.max(p.y);
        }
        Some(rect)
    }

    pub fn x(&self) -> f32 {
        self.left
    }

    pub fn y(&self) -> f32 {
        self.top
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn origin(&self) -> Point {
        Point::new(self.left, self.top)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width(), self.height())
    }

    pub fn center(&self) -> Point {
        Point::new((self.left + self.right) * 0.5, (self.top + self.bottom) * 0.5)
    }

    /// Zero-area and inverted rectangles are empty.
    pub fn is_empty(&self) -> bool {
        !(self.left < self.right && self.top < self.bottom)
    }

    pub fn points(&self) -> [Point; 4] {
        [
            Point::new(self.left, self.top),
            Point::new(self.right, self.top),
            Point::new(self.left, self.bottom),
            Point::new(self.right, self.bottom),
        ]
    }

    pub fn contains_point(&self, p: Point) -> bool {
        p.x >= self.left && p.x < self.right && p.y >= self.top && p.y < self.bottom
    }

    pub fn contains(&self, other: &Rect) -> bool {
        other.left >= self.left
            && other.top >= self.top
            && other.right <= self.right
            && other.bottom <= self.bottom
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect::from_ltrb(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right.max(other.right),
            self.bottom.max(other.bottom),
        )
    }

    /// Overlap of two rectangles. Empty overlaps (including zero area) are `None`.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let rect = Rect::from_ltrb(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        );
        if rect.is_empty() { None } else { Some(rect) }
    }

    pub fn intersects_with_rect(&self, other: &Rect) -> bool {
        self.intersection(other).is_some()
    }

    pub fn shift(&self, offset: Point) -> Rect {
        Rect::from_ltrb(
            self.left + offset.x,
            self.top + offset.y,
            self.right + offset.x,
            self.bottom + offset.y,
        )
    }

    pub fn expand(&self, amount: f32) -> Rect {
        self.expand_xy(amount, amount)
    }

    pub fn expand_xy(&self, dx: f32, dy: f32) -> Rect {
        Rect::from_ltrb(self.left - dx, self.top - dy, self.right + dx, self.bottom + dy)
    }

    /// Smallest rectangle with integral edges containing this one.
    pub fn round_out(&self) -> Rect {
        Rect::from_ltrb(
            self.left.floor(),
            self.top.floor(),
            self.right.ceil(),
            self.bottom.ceil(),
        )
    }

    /// Bounds of this rectangle after mapping its corners through `transform`.
    pub fn transform_bounds(&self, transform: &Matrix) -> Rect {
        if self.is_maximum() {
            return *self;
        }
        let points = self.points().map(|p| transform.transform_point(p));
        Rect::from_points(&points).unwrap_or(*self)
    }

    /// `None` acts as "unbounded" on either side.
    pub fn intersection_opt(a: Option<Rect>, b: Option<Rect>) -> Option<Rect> {
        match (a, b) {
            (None, b) => b,
            (a, None) => a,
            (Some(a), Some(b)) => a.intersection(&b),
        }
    }

    /// `None` contributes nothing to the union.
    pub fn union_opt(a: Option<Rect>, b: Option<Rect>) -> Option<Rect> {
        match (a, b) {
            (None, b) => b,
            (a, None) => a,
            (Some(a), Some(b)) => Some(a.union(&b)),
        }
    }
}

/// 4x4 column-major matrix. Only the 2D affine part and the perspective row
/// matter to the compositor; z is carried through untouched.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Matrix {
    pub m: [f32; 16],
}

impl Default for Matrix {
    fn default() -> Self {
        Self::identity()
    }
}

impl Matrix {
    pub const fn identity() -> Self {
        Self {
            m: [
                1.0, 0.0, 0.0, 0.0, //
                0.0, 1.0, 0.0, 0.0, //
                0.0, 0.0, 1.0, 0.0, //
                0.0, 0.0, 0.0, 1.0,
            ],
        }
    }

    pub const fn translation(offset: Point) -> Self {
        let mut m = Self::identity().m;
        m[12] = offset.x;
        m[13] = offset.y;
        Self { m }
    }

    pub fn scale(sx: f32, sy: f32) -> Self {
        let mut m = Self::identity().m;
        m[0] = sx;
        m[5] = sy;
        Self { m }
    }

    pub fn rotation_z(radians: f32) -> Self {
        let (sin, cos) = radians.sin_cos();
        let mut m = Self::identity().m;
        m[0] = cos;
        m[1] = sin;
        m[4] = -sin;
        m[5] = cos;
        Self { m }
    }

    pub fn skew(sx: f32, sy: f32) -> Self {
        let mut m = Self::identity().m;
        m[1] = sy;
        m[4] = sx;
        Self { m }
    }

    /// Maps pixel coordinates of a `size` target (y down) into normalized device coordinates.
    pub fn orthographic(size: ISize) -> Self {
        let w = size.width.max(1) as f32;
        let h = size.height.max(1) as f32;
        Matrix::translation(Point::new(-1.0, 1.0)) * Matrix::scale(2.0 / w, -2.0 / h)
    }

    pub fn get_translation(&self) -> Point {
        Point::new(self.m[12], self.m[13])
    }

    /// The matrix without its translation component.
    pub fn basis(&self) -> Matrix {
        let mut m = self.m;
        m[12] = 0.0;
        m[13] = 0.0;
        m[14] = 0.0;
        Matrix { m }
    }

    pub fn has_perspective(&self) -> bool {
        self.m[3] != 0.0 || self.m[7] != 0.0 || self.m[11] != 0.0 || self.m[15] != 1.0
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    pub fn is_translation_only(&self) -> bool {
        self.basis() == Self::identity()
    }

    /// True when the matrix only scales and translates in 2D.
    pub fn is_translation_scale_only(&self) -> bool {
        self.m[1] == 0.0 && self.m[4] == 0.0 && !self.has_perspective()
    }

    /// Degenerate in the 2D sense: the xy basis collapses to a line or a point.
    pub fn is_degenerate(&self) -> bool {
        let det = self.m[0] * self.m[5] - self.m[1] * self.m[4];
        det == 0.0 || !det.is_finite()
    }

    /// Longest of the x and y basis vectors.
    pub fn max_basis_length_xy(&self) -> f32 {
        let x = (self.m[0] * self.m[0] + self.m[1] * self.m[1]).sqrt();
        let y = (self.m[4] * self.m[4] + self.m[5] * self.m[5]).sqrt();
        x.max(y)
    }

    pub fn transform_point(&self, p: Point) -> Point {
        let m = &self.m;
        let x = m[0] * p.x + m[4] * p.y + m[12];
        let y = m[1] * p.x + m[5] * p.y + m[13];
        let w = m[3] * p.x + m[7] * p.y + m[15];
        if w != 0.0 && w != 1.0 {
            Point::new(x / w, y / w)
        } else {
            Point::new(x, y)
        }
    }

    pub fn determinant(&self) -> f32 {
        let m = &self.m;
        let a0 = m[0] * m[5] - m[1] * m[4];
        let a1 = m[0] * m[6] - m[2] * m[4];
        let a2 = m[0] * m[7] - m[3] * m[4];
        let a3 = m[1] * m[6] - m[2] * m[5];
        let a4 = m[1] * m[7] - m[3] * m[5];
        let a5 = m[2] * m[7] - m[3] * m[6];
        let b0 = m[8] * m[13] - m[9] * m[12];
        let b1 = m[8] * m[14] - m[10] * m[12];
        let b2 = m[8] * m[15] - m[11] * m[12];
        let b3 = m[9] * m[14] - m[10] * m[13];
        let b4 = m[9] * m[15] - m[11] * m[13];
        let b5 = m[10] * m[15] - m[11] * m[14];
        a0 * b5 - a1 * b4 + a2 * b3 + a3 * b2 - a4 * b1 + a5 * b0
    }

    /// Full 4x4 inverse, `None` for singular matrices.
    pub fn invert(&self) -> Option<Matrix> {
        let m = &self.m;
        let mut inv = [0.0f32; 16];

        inv[0] = m[5] * m[10] * m[15] - m[5] * m[11] * m[14] - m[9] * m[6] * m[15]
            + m[9] * m[7] * m[14]
            + m[13] * m[6] * m[11]
            - m[13] * m[7] * m[10];
        inv[4] = -m[4] * m[10] * m[15] + m[4] * m[11] * m[14] + m[8] * m[6] * m[15]
            - m[8] * m[7] * m[14]
            - m[12] * m[6] * m[11]
            + m[12] * m[7] * m[10];
        inv[8] = m[4] * m[9] * m[15] - m[4] * m[11] * m[13] - m[8] * m[5] * m[15]
            + m[8] * m[7] * m[13]
            + m[12] * m[5] * m[11]
            - m[12] * m[7] * m[9];
        inv[12] = -m[4] * m[9] * m[14] + m[4] * m[10] * m[13] + m[8] * m[5] * m[14]
            - m[8] * m[6] * m[13]
            - m[12] * m[5] * m[10]
            + m[12] * m[6] * m[9];
        inv[1] = -m[1] * m[10] * m[15] + m[1] * m[11] * m[14] + m[9] * m[2] * m[15]
            - m[9] * m[3] * m[14]
            - m[13] * m[2] * m[11]
            + m[13] * m[3] * m[10];
        inv[5] = m[0] * m[10] * m[15] - m[0] * m[11] * m[14] - m[8] * m[2] * m[15]
            + m[8] * m[3] * m[14]
            + m[12] * m[2] * m[11]
            - m[12] * m[3] * m[10];
        inv[9] = -m[0] * m[9] * m[15] + m[0] * m[11] * m[13] + m[8] * m[1] * m[15]
            - m[8] * m[3] * m[13]
            - m[12] * m[1] * m[11]
            + m[12] * m[3] * m[9];
        inv[13] = m[0] * m[9] * m[14] - m[0] * m[10] * m[13] - m[8] * m[1] * m[14]
            + m[8] * m[2] * m[13]
            + m[12] * m[1] * m[10]
            - m[12] * m[2] * m[9];
        inv[2] = m[1] * m[6] * m[15] - m[1] * m[7] * m[14] - m[5] * m[2] * m[15]
            + m[5] * m[3] * m[14]
            + m[13] * m[2] * m[7]
            - m[13] * m[3] * m[6];
        inv[6] = -m[0] * m[6] * m[15] + m[0] * m[7] * m[14] + m[4] * m[2] * m[15]
            - m[4] * m[3] * m[14]
            - m[12] * m[2] * m[7]
            + m[12] * m[3] * m[6];
        inv[10] = m[0] * m[5] * m[15] - m[0] * m[7] * m[13] - m[4] * m[1] * m[15]
            + m[4] * m[3] * m[13]
            + m[12] * m[1] * m[7]
            - m[12] * m[3] * m[5];
        inv[14] = -m[0] * m[5] * m[14] + m[0] * m[6] * m[13] + m[4] * m[1] * m[14]
            - m[4] * m[2] * m[13]
            - m[12] * m[1] * m[6]
            + m[12] * m[2] * m[5];
        inv[3] = -m[1] * m[6] * m[11] + m[1] * m[7] * m[10] + m[5] * m[2] * m[11]
            - m[5] * m[3] * m[10]
            - m[9] * m[2] * m[7]
            + m[9] * m[3] * m[6];
        inv[7] = m[0] * m[6] * m[11] - m[0] * m[7] * m[10] - m[4] * m[2] * m[11]
            + m[4] * m[3] * m[10]
            + m[8] * m[2] * m[7]
            - m[8] * m[3] * m[6];
        inv[11] = -m[0] * m[5] * m[11] + m[0] * m[7] * m[9] + m[4] * m[1] * m[11]
            - m[4] * m[3] * m[9]
            - m[8] * m[1] * m[7]
            + m[8] * m[3] * m[5];
        inv[15] = m[0] * m[5] * m[10] - m[0] * m[6] * m[9] - m[4] * m[1] * m[10]
            + m[4] * m[2] * m[9]
            + m[8] * m[1] * m[6]
            - m[8] * m[2] * m[5];

        let det = m[0] * inv[0] + m[1] * inv[4] + m[2] * inv[8] + m[3] * inv[12];
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let inv_det = 1.0 / det;
        Some(Matrix { m: inv.map(|v| v * inv_det) })
    }
}

impl Mul for Matrix {
    type Output = Matrix;

    /// `self * rhs` applies `rhs` first, then `self`.
    fn mul(self, rhs: Matrix) -> Matrix {
        let a = &self.m;
        let b = &rhs.m;
        let mut out = [0.0f32; 16];
        for col in 0..4 {
            for row in 0..4 {
                out[col * 4 + row] = (0..4).map(|k| a[k * 4 + row] * b[col * 4 + k]).sum();
            }
        }
        Matrix { m: out }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_area_intersection_is_none() {
        let a = Rect::from_ltrb(0.0, 0.0, 100.0, 100.0);
        let b = Rect::from_ltrb(100.0, 0.0, 200.0, 100.0);
        assert_eq!(a.intersection(&b), None);
        assert!(!a.intersects_with_rect(&b));
    }

    #[test]
    fn optional_union_and_intersection() {
        let r = Rect::from_xywh(10.0, 10.0, 20.0, 20.0);
        assert_eq!(Rect::union_opt(None, None), None);
        assert_eq!(Rect::union_opt(None, Some(r)), Some(r));
        assert_eq!(Rect::intersection_opt(Some(r), None), Some(r));
        assert_eq!(
            Rect::intersection_opt(Some(r), Some(Rect::from_xywh(20.0, 20.0, 20.0, 20.0))),
            Some(Rect::from_ltrb(20.0, 20.0, 30.0, 30.0))
        );
    }

    #[test]
    fn round_out_grows_to_integers() {
        let r = Rect::from_ltrb(0.5, 1.2, 10.1, 10.9).round_out();
        assert_eq!(r, Rect::from_ltrb(0.0, 1.0, 11.0, 11.0));
    }

    #[test]
    fn transform_bounds_of_rotated_rect() {
        let r = Rect::from_ltrb(0.0, 0.0, 10.0, 10.0);
        let t = Matrix::rotation_z(std::f32::consts::FRAC_PI_4);
        let b = r.transform_bounds(&t);
        assert!((b.width() - 10.0 * 2f32.sqrt()).abs() < 1e-3);
        assert!((b.left + 10.0 / 2f32.sqrt()).abs() < 1e-3);
    }

    #[test]
    fn matrix_product_order() {
        let t = Matrix::translation(Point::new(10.0, 0.0));
        let s = Matrix::scale(2.0, 2.0);
        // scale first, then translate
        assert_eq!((t * s).transform_point(Point::new(1.0, 1.0)), Point::new(12.0, 2.0));
        // translate first, then scale
        assert_eq!((s * t).transform_point(Point::new(1.0, 1.0)), Point::new(22.0, 2.0));
    }

    #[test]
    fn invert_round_trips() {
        let m = Matrix::translation(Point::new(3.0, -7.0))
            * Matrix::rotation_z(0.3)
            * Matrix::scale(2.0, 0.5);
        let inv = m.invert().unwrap();
        let p = (m * inv).transform_point(Point::new(5.0, 9.0));
        assert!((p.x - 5.0).abs() < 1e-4 && (p.y - 9.0).abs() < 1e-4);
        assert!(Matrix::scale(0.0, 1.0).invert().is_none());
        assert!(Matrix::scale(0.0, 1.0).is_degenerate());
    }

    #[test]
    fn mip_count_covers_longest_edge() {
        assert_eq!(ISize::new(1, 1).mip_count(), 1);
        assert_eq!(ISize::new(256, 100).mip_count(), 8);
        assert_eq!(ISize::new(300, 300).mip_count(), 9);
    }
}
