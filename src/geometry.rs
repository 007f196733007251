//! Geometry kernel - points, rectangles, segments on the world plane

use serde::{Deserialize, Serialize};

/// A position on the (x, z) world plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub z: f64,
}

impl Point {
    pub const fn new(x: f64, z: f64) -> Self {
        Self { x, z }
    }

    /// Block coordinates, truncated toward zero.
    pub fn block(self) -> (i32, i32) {
        (self.x as i32, self.z as i32)
    }
}

/// Axis-aligned closed rectangle, normalised so `min <= max` componentwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    min: Point,
    max: Point,
}

impl Rect {
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            min: Point::new(a.x.min(b.x), a.z.min(b.z)),
            max: Point::new(a.x.max(b.x), a.z.max(b.z)),
        }
    }

    pub fn around(center: Point, radius: f64) -> Self {
        Self::from_corners(
            Point::new(center.x - radius, center.z - radius),
            Point::new(center.x + radius, center.z + radius),
        )
    }

    pub fn min(&self) -> Point {
        self.min
    }

    pub fn max(&self) -> Point {
        self.max
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.z + self.max.z) / 2.0,
        )
    }

    /// Half of the x extent.
    pub fn radius(&self) -> f64 {
        (self.max.x - self.min.x) / 2.0
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn depth(&self) -> f64 {
        self.max.z - self.min.z
    }

    /// Corners in the order lower-left, upper-left, upper-right, lower-right.
    pub fn corners(&self) -> [Point; 4] {
        [
            self.min,
            Point::new(self.min.x, self.max.z),
            self.max,
            Point::new(self.max.x, self.min.z),
        ]
    }

    /// Every corner snapped to the chunk grid.
    pub fn snapped(&self, chunk: f64) -> Self {
        Self::from_corners(
            Point::new(snap_to_chunk(self.min.x, chunk), snap_to_chunk(self.min.z, chunk)),
            Point::new(snap_to_chunk(self.max.x, chunk), snap_to_chunk(self.max.z, chunk)),
        )
    }
}

/// A segment between two points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub a: Point,
    pub b: Point,
}

impl Segment {
    pub const fn new(a: Point, b: Point) -> Self {
        Self { a, b }
    }

    pub fn length(&self) -> f64 {
        distance(self.a, self.b)
    }
}

#[inline]
fn orient(a: Point, b: Point, c: Point) -> f64 {
    (b.x - a.x) * (c.z - a.z) - (b.z - a.z) * (c.x - a.x)
}

#[inline]
fn sign(v: f64) -> i8 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

/// Whether `p`, known to be collinear with `s`, lies within its bounding box.
#[inline]
fn on_segment(s: &Segment, p: Point) -> bool {
    p.x >= s.a.x.min(s.b.x)
        && p.x <= s.a.x.max(s.b.x)
        && p.z >= s.a.z.min(s.b.z)
        && p.z <= s.a.z.max(s.b.z)
}

/// Closed segment intersection: proper crossings, endpoint touches and
/// collinear overlaps all count. Callers exclude links that share a beacon.
pub fn segments_intersect(s1: &Segment, s2: &Segment) -> bool {
    let o1 = sign(orient(s1.a, s1.b, s2.a));
    let o2 = sign(orient(s1.a, s1.b, s2.b));
    let o3 = sign(orient(s2.a, s2.b, s1.a));
    let o4 = sign(orient(s2.a, s2.b, s1.b));

    if o1 * o2 < 0 && o3 * o4 < 0 {
        return true;
    }
    (o1 == 0 && on_segment(s1, s2.a))
        || (o2 == 0 && on_segment(s1, s2.b))
        || (o3 == 0 && on_segment(s2, s1.a))
        || (o4 == 0 && on_segment(s2, s1.b))
}

/// Shoelace area of a triangle; zero for collinear triples.
pub fn polygon_area(p1: Point, p2: Point, p3: Point) -> f64 {
    (orient(p1, p2, p3) / 2.0).abs()
}

/// Strict interior test; points on an edge are outside.
pub fn triangle_contains_strict(tri: [Point; 3], p: Point) -> bool {
    let d1 = sign(orient(tri[0], tri[1], p));
    let d2 = sign(orient(tri[1], tri[2], p));
    let d3 = sign(orient(tri[2], tri[0], p));
    d1 != 0 && d1 == d2 && d2 == d3
}

/// Interior crossing: the segments cross at a point inside both. Touching
/// endpoints and collinear runs do not count.
fn segments_cross_properly(s1: &Segment, s2: &Segment) -> bool {
    let o1 = sign(orient(s1.a, s1.b, s2.a));
    let o2 = sign(orient(s1.a, s1.b, s2.b));
    let o3 = sign(orient(s2.a, s2.b, s1.a));
    let o4 = sign(orient(s2.a, s2.b, s1.b));
    o1 * o2 < 0 && o3 * o4 < 0
}

fn triangle_edges(tri: [Point; 3]) -> [Segment; 3] {
    [
        Segment::new(tri[0], tri[1]),
        Segment::new(tri[1], tri[2]),
        Segment::new(tri[2], tri[0]),
    ]
}

fn shoelace(poly: &[Point]) -> f64 {
    if poly.len() < 3 {
        return 0.0;
    }
    let twice: f64 = poly
        .iter()
        .zip(poly.iter().cycle().skip(1))
        .map(|(p, q)| p.x * q.z - q.x * p.z)
        .sum();
    (twice / 2.0).abs()
}

/// Area shared by two triangles, clipping `subject` against each edge of
/// `clip` in turn.
pub fn triangle_overlap_area(subject: [Point; 3], clip: [Point; 3]) -> f64 {
    let mut clip = clip;
    let turn = orient(clip[0], clip[1], clip[2]);
    if turn == 0.0 {
        return 0.0;
    }
    if turn < 0.0 {
        clip.swap(1, 2);
    }
    let mut poly = subject.to_vec();
    for i in 0..3 {
        let (a, b) = (clip[i], clip[(i + 1) % 3]);
        let input = std::mem::take(&mut poly);
        let Some(&last) = input.last() else {
            break;
        };
        let mut prev = (last, orient(a, b, last));
        for &cur in &input {
            let side = orient(a, b, cur);
            if side >= 0.0 {
                if prev.1 < 0.0 {
                    poly.push(cut(prev.0, cur, prev.1, side));
                }
                poly.push(cur);
            } else if prev.1 >= 0.0 {
                poly.push(cut(prev.0, cur, prev.1, side));
            }
            prev = (cur, side);
        }
    }
    shoelace(&poly)
}

#[inline]
fn cut(p: Point, q: Point, dp: f64, dq: f64) -> Point {
    let t = dp / (dp - dq);
    Point::new(p.x + t * (q.x - p.x), p.z + t * (q.z - p.z))
}

/// Whether two triangles share interior area. Shared vertices and shared
/// or collinear edges alone are not an overlap.
pub fn triangles_overlap(t1: [Point; 3], t2: [Point; 3]) -> bool {
    let crossing = triangle_edges(t1)
        .iter()
        .any(|e1| triangle_edges(t2).iter().any(|e2| segments_cross_properly(e1, e2)));
    crossing
        || t2.iter().any(|&p| triangle_contains_strict(t1, p))
        || t1.iter().any(|&p| triangle_contains_strict(t2, p))
        || triangle_overlap_area(t1, t2) > OVERLAP_EPSILON
}

const OVERLAP_EPSILON: f64 = 1e-9;

/// Closed overlap: rectangles sharing only an edge overlap.
pub fn rect_overlaps(r1: &Rect, r2: &Rect) -> bool {
    r1.min.x <= r2.max.x && r2.min.x <= r1.max.x && r1.min.z <= r2.max.z && r2.min.z <= r1.max.z
}

pub fn rect_contains_point(rect: &Rect, p: Point) -> bool {
    p.x >= rect.min.x && p.x <= rect.max.x && p.z >= rect.min.z && p.z <= rect.max.z
}

pub fn distance(p1: Point, p2: Point) -> f64 {
    ((p1.x - p2.x).powi(2) + (p1.z - p2.z).powi(2)).sqrt()
}

/// Rounds to the nearest chunk boundary, halves away from zero.
pub fn snap_to_chunk(v: f64, chunk: f64) -> f64 {
    let c = chunk as i64;
    if c <= 0 {
        return v;
    }
    let half = c / 2;
    let t = v as i64;
    let snapped = if v < 0.0 { (t - half) / c } else { (t + half) / c };
    (snapped * c) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(ax: f64, az: f64, bx: f64, bz: f64) -> Segment {
        Segment::new(Point::new(ax, az), Point::new(bx, bz))
    }

    #[test]
    fn crossing_segments_intersect() {
        assert!(segments_intersect(&seg(0.0, 0.0, 10.0, 10.0), &seg(0.0, 10.0, 10.0, 0.0)));
    }

    #[test]
    fn parallel_segments_do_not_intersect() {
        assert!(!segments_intersect(&seg(0.0, 0.0, 10.0, 0.0), &seg(0.0, 1.0, 10.0, 1.0)));
    }

    #[test]
    fn touching_counts_as_intersection() {
        assert!(segments_intersect(&seg(0.0, 0.0, 10.0, 0.0), &seg(5.0, 0.0, 5.0, 8.0)));
        assert!(segments_intersect(&seg(0.0, 0.0, 10.0, 0.0), &seg(10.0, 0.0, 12.0, 3.0)));
    }

    #[test]
    fn collinear_overlap_and_gap() {
        assert!(segments_intersect(&seg(0.0, 0.0, 10.0, 0.0), &seg(5.0, 0.0, 15.0, 0.0)));
        assert!(!segments_intersect(&seg(0.0, 0.0, 4.0, 0.0), &seg(5.0, 0.0, 15.0, 0.0)));
    }

    #[test]
    fn shoelace_area() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(10.0, 0.0);
        let c = Point::new(5.0, 10.0);
        assert_eq!(polygon_area(a, b, c), 50.0);
        assert_eq!(polygon_area(c, b, a), 50.0);
        assert_eq!(polygon_area(a, b, Point::new(20.0, 0.0)), 0.0);
    }

    #[test]
    fn rect_is_normalised_and_inclusive() {
        let r = Rect::from_corners(Point::new(10.0, -5.0), Point::new(-10.0, 5.0));
        assert_eq!(r.min(), Point::new(-10.0, -5.0));
        assert!(rect_contains_point(&r, Point::new(10.0, 5.0)));
        assert!(!rect_contains_point(&r, Point::new(10.1, 5.0)));
        let edge = Rect::from_corners(Point::new(10.0, 0.0), Point::new(20.0, 5.0));
        assert!(rect_overlaps(&r, &edge));
    }

    #[test]
    fn chunk_snapping() {
        assert_eq!(snap_to_chunk(2000.0, 16.0), 2000.0);
        assert_eq!(snap_to_chunk(1000.0, 16.0), 1008.0);
        assert_eq!(snap_to_chunk(7.0, 16.0), 0.0);
        assert_eq!(snap_to_chunk(8.0, 16.0), 16.0);
        assert_eq!(snap_to_chunk(-8.0, 16.0), -16.0);
        assert_eq!(snap_to_chunk(-7.0, 16.0), 0.0);
    }

    #[test]
    fn strict_containment_excludes_edges() {
        let tri = [Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(5.0, 10.0)];
        assert!(triangle_contains_strict(tri, Point::new(5.0, 3.0)));
        assert!(!triangle_contains_strict(tri, Point::new(5.0, 0.0)));
        assert!(!triangle_contains_strict(tri, Point::new(0.0, 0.0)));
    }

    fn tri(points: [(f64, f64); 3]) -> [Point; 3] {
        points.map(|(x, z)| Point::new(x, z))
    }

    #[test]
    fn crossing_triangles_overlap() {
        let abc = tri([(0.0, 0.0), (10.0, 0.0), (5.0, 10.0)]);
        let abe = tri([(0.0, 0.0), (10.0, 0.0), (12.0, 8.0)]);
        assert!(triangles_overlap(abc, abe));
        assert!(triangles_overlap(abe, abc));
    }

    #[test]
    fn overlap_along_a_shared_line_is_found() {
        let left = tri([(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)]);
        let tucked = tri([(5.0, 0.0), (15.0, 0.0), (5.0, 5.0)]);
        assert!(!left.iter().any(|&p| triangle_contains_strict(tucked, p)));
        assert!(!tucked.iter().any(|&p| triangle_contains_strict(left, p)));
        assert!((triangle_overlap_area(tucked, left) - 12.5).abs() < 1e-9);
        assert!(triangles_overlap(left, tucked));
    }

    #[test]
    fn touching_triangles_do_not_overlap() {
        let left = tri([(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)]);
        let right = tri([(10.0, 0.0), (0.0, 10.0), (10.0, 10.0)]);
        let corner = tri([(10.0, 0.0), (20.0, 0.0), (20.0, 5.0)]);
        assert_eq!(triangle_overlap_area(right, left), 0.0);
        assert!(!triangles_overlap(left, right));
        assert!(!triangles_overlap(left, corner));
    }
}
