use std::cmp::Ordering;

use smallvec::SmallVec;

use crate::types::{Contour, Point2};

/// A simplified closed contour.
///
/// Vertices are a subset of the source points, in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    vertices: SmallVec<[Point2; 8]>,
}

impl Polygon {
    /// Wrap vertices that are already simplified.
    pub fn from_vertices<I: IntoIterator<Item = Point2>>(vertices: I) -> Self {
        Self {
            vertices: vertices.into_iter().collect(),
        }
    }

    pub fn vertices(&self) -> &[Point2] {
        &self.vertices
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}

/// Simplify a closed point loop with the Douglas-Peucker algorithm.
///
/// The loop is cut at its diameter (the farthest pair of points) and each
/// half is split recursively. Every input point stays within `epsilon` of
/// the returned polygon. Feeding the result back in returns it unchanged,
/// and a larger `epsilon` keeps a subset of the vertices.
///
/// The result starts at the kept vertex with the smallest input index and
/// keeps the input orientation. Returns `None` when fewer than three
/// distinct points are given or the loop collapses below three vertices.
pub fn approx_polygon(points: &[Point2], epsilon: f64) -> Option<Polygon> {
    let eps = if epsilon.is_finite() { epsilon.max(0.0) } else { 0.0 };
    let pts = dedup_closed(points);
    let n = pts.len();
    if n < 3 {
        return None;
    }

    let (p, q) = diameter(&convex_hull(&pts))?;
    let a = pts.iter().position(|x| *x == p)?;
    let b = pts.iter().position(|x| *x == q)?;

    let mut keep = vec![false; n];
    keep[a] = true;
    keep[b] = true;
    simplify_chain(&pts, a, (b + n - a) % n, eps, &mut keep);
    simplify_chain(&pts, b, (a + n - b) % n, eps, &mut keep);

    let kept: SmallVec<[Point2; 8]> = (0..n).filter(|&i| keep[i]).map(|i| pts[i]).collect();
    if kept.len() < 3 {
        return None;
    }
    Some(Polygon { vertices: kept })
}

/// Approximate every contour and keep those with exactly `vertex_count`
/// vertices, in input order.
pub fn filter_polygons(contours: &[Contour], vertex_count: usize, epsilon: f64) -> Vec<Polygon> {
    contours
        .iter()
        .filter_map(|c| approx_polygon(c.points(), epsilon))
        .filter(|p| p.len() == vertex_count)
        .collect()
}

/// Drop consecutive duplicates, including a repeated closing point.
fn dedup_closed(points: &[Point2]) -> Vec<Point2> {
    let mut out: Vec<Point2> = Vec::with_capacity(points.len());
    for p in points {
        if out.last() != Some(p) {
            out.push(*p);
        }
    }
    while out.len() > 1 && out.first() == out.last() {
        out.pop();
    }
    out
}

fn lex(p: &Point2, q: &Point2) -> Ordering {
    p.x.total_cmp(&q.x).then(p.y.total_cmp(&q.y))
}

fn cross(o: &Point2, a: &Point2, b: &Point2) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Extreme points of `pts` (Andrew's monotone chain), counter-clockwise.
fn convex_hull(pts: &[Point2]) -> Vec<Point2> {
    let mut sorted = pts.to_vec();
    sorted.sort_by(lex);
    sorted.dedup();
    if sorted.len() < 3 {
        return sorted;
    }

    let mut hull: Vec<Point2> = Vec::with_capacity(2 * sorted.len());
    for p in &sorted {
        push_hull(&mut hull, 0, p);
    }
    let lower = hull.len();
    for p in sorted.iter().rev().skip(1) {
        push_hull(&mut hull, lower - 1, p);
    }
    hull.pop();
    hull
}

/// Push `p`, popping points above `floor` that no longer turn left.
fn push_hull(hull: &mut Vec<Point2>, floor: usize, p: &Point2) {
    while hull.len() >= floor + 2 {
        let m = hull.len();
        if cross(&hull[m - 2], &hull[m - 1], p) > 0.0 {
            break;
        }
        hull.pop();
    }
    hull.push(*p);
}

/// Farthest pair of points, lexicographically smaller point first. Ties go
/// to the lexicographically smallest pair, so the choice depends only on
/// coordinates and never on where the loop starts.
fn diameter(hull: &[Point2]) -> Option<(Point2, Point2)> {
    let mut best: Option<(f64, Point2, Point2)> = None;
    for (i, u) in hull.iter().enumerate() {
        for v in &hull[i + 1..] {
            let (p, q) = if lex(u, v) == Ordering::Greater { (*v, *u) } else { (*u, *v) };
            let d = (q - p).norm_squared();
            let better = match &best {
                None => true,
                Some((bd, bp, bq)) => {
                    d > *bd || (d == *bd && lex(&p, bp).then(lex(&q, bq)) == Ordering::Less)
                }
            };
            if better {
                best = Some((d, p, q));
            }
        }
    }
    match best {
        Some((d, p, q)) if d > 0.0 => Some((p, q)),
        _ => None,
    }
}

/// Simplify the chain of `len + 1` points starting at `start` (wrapping),
/// marking retained points in `keep`. Each split lands on the first point of
/// maximum deviation.
fn simplify_chain(pts: &[Point2], start: usize, len: usize, eps: f64, keep: &mut [bool]) {
    let n = pts.len();
    let idx = |off: usize| (start + off) % n;

    let mut stack = vec![(0usize, len)];
    while let Some((lo, hi)) = stack.pop() {
        if hi < lo + 2 {
            continue;
        }
        let (a, b) = (pts[idx(lo)], pts[idx(hi)]);
        let mut max_d = -1.0;
        let mut max_k = lo;
        for k in (lo + 1)..hi {
            let d = segment_distance(&pts[idx(k)], &a, &b);
            if d > max_d {
                max_d = d;
                max_k = k;
            }
        }
        if max_d > eps {
            keep[idx(max_k)] = true;
            stack.push((max_k, hi));
            stack.push((lo, max_k));
        }
    }
}

/// Distance from `p` to the segment `a`-`b`.
pub(crate) fn segment_distance(p: &Point2, a: &Point2, b: &Point2) -> f64 {
    let ab = b - a;
    let ap = p - a;
    let len2 = ab.norm_squared();
    if len2 == 0.0 {
        return ap.norm();
    }
    let t = (ap.dot(&ab) / len2).clamp(0.0, 1.0);
    (ap - ab * t).norm()
}
