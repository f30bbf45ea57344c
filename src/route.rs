//! Arc-length parameterization of a route in the planar frame.
//!
//! A [`PlanarRoute`] is built once per request from the geodetic route and
//! answers three questions:
//! - where along the route (in meters from the start) is the point closest to `p`
//! - which point lies `d` meters along the route
//! - how far is `p` from the route
//!
//! Distance queries go through an R-tree of the route edges; arc-length
//! projection scans the edges in travel order so that, on a route that
//! passes the same spot twice, the earlier pass wins.

use geo::Coord;
use rstar::primitives::{GeomWithData, Line};
use rstar::{PointDistance, RTree, AABB};

use crate::projection::LocalProjection;
use crate::GpsPoint;

/// Edges shorter than this are treated as a single vertex.
const DEGENERATE_EDGE_SQ: f64 = 1e-18;

/// Bisection steps used to locate a buffer boundary on a line edge.
const BOUNDARY_BISECTION_STEPS: u32 = 32;

type IndexedEdge = GeomWithData<Line<[f64; 2]>, usize>;

/// A route re-projected into the local planar frame.
#[derive(Debug, Clone)]
pub struct PlanarRoute {
    projection: LocalProjection,
    vertices: Vec<Coord>,
    /// Arc-length at each vertex; `cumulative[0] == 0`, last == `length`
    cumulative: Vec<f64>,
    length: f64,
    edges: RTree<IndexedEdge>,
}

impl PlanarRoute {
    /// Project a geodetic route into a frame anchored at its first point.
    ///
    /// Returns `None` if the route has fewer than 2 points or any point is
    /// invalid. Points are never dropped, so vertex indices always match the
    /// input.
    ///
    /// # Example
    /// ```
    /// use poi_matcher::{GpsPoint, PlanarRoute};
    ///
    /// let route = PlanarRoute::from_points(&[
    ///     GpsPoint::new(51.050, 13.737),
    ///     GpsPoint::new(51.051, 13.737),
    /// ])
    /// .unwrap();
    ///
    /// assert!((route.length() - 111.26).abs() < 0.1);
    /// ```
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        let origin = *points.first()?;
        Self::with_projection(points, LocalProjection::new(origin))
    }

    /// Project a geodetic route with a caller-supplied projection.
    pub fn with_projection(points: &[GpsPoint], projection: LocalProjection) -> Option<Self> {
        if points.len() < 2 || points.iter().any(|p| !p.is_valid()) {
            return None;
        }
        let vertices: Vec<Coord> = points.iter().map(|p| projection.to_planar(p)).collect();
        Some(Self::from_planar(vertices, projection))
    }

    fn from_planar(vertices: Vec<Coord>, projection: LocalProjection) -> Self {
        let mut cumulative = Vec::with_capacity(vertices.len());
        let mut length = 0.0;
        cumulative.push(0.0);
        for w in vertices.windows(2) {
            length += planar_distance(w[0], w[1]);
            cumulative.push(length);
        }

        let indexed: Vec<IndexedEdge> = vertices
            .windows(2)
            .enumerate()
            .filter(|(_, w)| squared_distance(w[0], w[1]) > DEGENERATE_EDGE_SQ)
            .map(|(i, w)| GeomWithData::new(Line::new([w[0].x, w[0].y], [w[1].x, w[1].y]), i))
            .collect();

        Self {
            projection,
            vertices,
            cumulative,
            length,
            edges: RTree::bulk_load(indexed),
        }
    }

    pub fn projection(&self) -> &LocalProjection {
        &self.projection
    }

    /// Total planar length in meters.
    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn vertices(&self) -> &[Coord] {
        &self.vertices
    }

    pub fn vertex(&self, index: usize) -> Option<Coord> {
        self.vertices.get(index).copied()
    }

    /// Number of edges (consecutive vertex pairs).
    pub fn edge_count(&self) -> usize {
        self.vertices.len() - 1
    }

    /// Start and end vertex of edge `index`.
    pub fn edge(&self, index: usize) -> (Coord, Coord) {
        (self.vertices[index], self.vertices[index + 1])
    }

    /// Arc-length bounds `[a, b]` of edge `index`.
    pub fn edge_bounds(&self, index: usize) -> (f64, f64) {
        (self.cumulative[index], self.cumulative[index + 1])
    }

    pub fn to_planar(&self, point: &GpsPoint) -> Coord {
        self.projection.to_planar(point)
    }

    pub fn to_geodetic(&self, coord: Coord) -> GpsPoint {
        self.projection.to_geodetic(coord)
    }

    /// Arc-length of the route point closest to `point`, in `[0, length]`.
    ///
    /// Points abeam the route's extension beyond either end map to 0 or
    /// `length`. On equal distances the earliest edge wins.
    pub fn project(&self, point: Coord) -> f64 {
        let mut best_dist_sq = f64::INFINITY;
        let mut best_arc = 0.0;

        for (i, w) in self.vertices.windows(2).enumerate() {
            let (t, dist_sq) = closest_on_edge(point, w[0], w[1]);
            if dist_sq < best_dist_sq {
                best_dist_sq = dist_sq;
                let (a, b) = self.edge_bounds(i);
                best_arc = a + t * (b - a);
            }
        }

        best_arc.clamp(0.0, self.length)
    }

    /// Point lying `distance` meters along the route.
    ///
    /// `distance` is clamped to `[0, length]`; NaN maps to the start.
    pub fn interpolate(&self, distance: f64) -> Coord {
        let d = if distance.is_nan() {
            0.0
        } else {
            distance.clamp(0.0, self.length)
        };

        // First vertex strictly beyond d, minus one, is the edge holding d
        let after = self.cumulative.partition_point(|&c| c <= d);
        let edge = after.saturating_sub(1).min(self.edge_count() - 1);

        let (a, b) = self.edge_bounds(edge);
        let (from, to) = self.edge(edge);
        if b - a <= 0.0 {
            return from;
        }
        let t = ((d - a) / (b - a)).clamp(0.0, 1.0);
        lerp(from, to, t)
    }

    /// Planar distance from `point` to the closest point of the route.
    pub fn distance_to(&self, point: Coord) -> f64 {
        let query = [point.x, point.y];
        match self.edges.nearest_neighbor(&query) {
            Some(edge) => edge.distance_2(&query).sqrt(),
            // Every edge is degenerate, the route is a single spot
            None => planar_distance(point, self.vertices[0]),
        }
    }

    /// Clip a planar polyline to the region strictly closer than `threshold`
    /// meters to the route.
    ///
    /// Each line edge is sampled every `step` meters (at most `threshold / 2`)
    /// plus, for every nearby route edge, at the points where the distance to
    /// that edge can be smallest. Every inside/outside transition is then
    /// refined by bisection. Returns the disjoint pieces in line order; pieces
    /// that collapse to a single point are dropped.
    pub fn clip_line(&self, line: &[Coord], threshold: f64, step: f64) -> Vec<Vec<Coord>> {
        if line.len() < 2 || threshold <= 0.0 {
            return vec![];
        }
        let step = step.min(threshold / 2.0).max(f64::EPSILON);
        let inside = |c: Coord| self.distance_to(c) < threshold;

        let mut pieces = Vec::new();
        let mut current: Option<Vec<Coord>> = inside(line[0]).then(|| vec![line[0]]);

        for w in line.windows(2) {
            let (p, q) = (w[0], w[1]);
            let samples = ((planar_distance(p, q) / step).ceil() as usize).max(1);
            let mut ts: Vec<f64> = (1..=samples).map(|k| k as f64 / samples as f64).collect();
            ts.extend(self.closest_approaches(p, q, threshold));
            ts.sort_by(f64::total_cmp);
            ts.dedup();

            let mut prev_t = 0.0;
            let mut prev_inside = current.is_some();

            for t in ts {
                let now_inside = inside(lerp(p, q, t));

                if now_inside != prev_inside {
                    let boundary = bisect_boundary(prev_t, t, prev_inside, |s| inside(lerp(p, q, s)));
                    let point = lerp(p, q, boundary);
                    if prev_inside {
                        if let Some(mut piece) = current.take() {
                            push_distinct(&mut piece, point);
                            if piece.len() >= 2 {
                                pieces.push(piece);
                            }
                        }
                    } else {
                        current = Some(vec![point]);
                    }
                }

                prev_inside = now_inside;
                prev_t = t;
            }

            if let Some(piece) = current.as_mut() {
                push_distinct(piece, q);
            }
        }

        if let Some(piece) = current {
            if piece.len() >= 2 {
                pieces.push(piece);
            }
        }

        pieces
    }

    /// Parameters on `p -> q` where the distance to a nearby route edge may
    /// reach its minimum: opposite the edge's endpoints, or at a crossing.
    ///
    /// The distance to one edge is convex along the line, so any stretch
    /// inside that edge's buffer contains one of these parameters, however
    /// short it is.
    fn closest_approaches(&self, p: Coord, q: Coord, threshold: f64) -> Vec<f64> {
        let envelope = AABB::from_corners(
            [p.x.min(q.x) - threshold, p.y.min(q.y) - threshold],
            [p.x.max(q.x) + threshold, p.y.max(q.y) + threshold],
        );

        let mut ts = Vec::new();
        for entry in self.edges.locate_in_envelope_intersecting(&envelope) {
            let (a, b) = self.edge(entry.data);
            ts.push(closest_on_edge(a, p, q).0);
            ts.push(closest_on_edge(b, p, q).0);
            ts.extend(crossing(p, q, a, b));
        }
        if self.edges.size() == 0 {
            ts.push(closest_on_edge(self.vertices[0], p, q).0);
        }

        ts.retain(|t| *t > 0.0 && *t < 1.0);
        ts
    }
}

/// Parameter on `p -> q` where it crosses `a -> b`, if the two edges cross.
fn crossing(p: Coord, q: Coord, a: Coord, b: Coord) -> Option<f64> {
    let r = Coord { x: q.x - p.x, y: q.y - p.y };
    let s = Coord { x: b.x - a.x, y: b.y - a.y };
    let denom = r.x * s.y - r.y * s.x;
    if denom.abs() <= f64::EPSILON {
        return None;
    }
    let t = ((a.x - p.x) * s.y - (a.y - p.y) * s.x) / denom;
    let u = ((a.x - p.x) * r.y - (a.y - p.y) * r.x) / denom;
    ((0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u)).then_some(t)
}

/// Parameter of the closest point on edge `a -> b` and its squared distance.
fn closest_on_edge(p: Coord, a: Coord, b: Coord) -> (f64, f64) {
    let len_sq = squared_distance(a, b);
    if len_sq <= DEGENERATE_EDGE_SQ {
        return (0.0, squared_distance(p, a));
    }
    let t = (((p.x - a.x) * (b.x - a.x) + (p.y - a.y) * (b.y - a.y)) / len_sq).clamp(0.0, 1.0);
    (t, squared_distance(p, lerp(a, b, t)))
}

/// Find where `inside` flips between `lo` and `hi`.
///
/// Returns a parameter on the inside of the boundary, so clipped pieces
/// never start or end outside the buffer.
fn bisect_boundary(
    mut lo: f64,
    mut hi: f64,
    lo_inside: bool,
    inside: impl Fn(f64) -> bool,
) -> f64 {
    for _ in 0..BOUNDARY_BISECTION_STEPS {
        let mid = (lo + hi) / 2.0;
        if inside(mid) == lo_inside {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    if lo_inside {
        lo
    } else {
        hi
    }
}

pub(crate) fn push_distinct(points: &mut Vec<Coord>, point: Coord) {
    if points.last() != Some(&point) {
        points.push(point);
    }
}

#[inline]
fn lerp(a: Coord, b: Coord, t: f64) -> Coord {
    Coord {
        x: a.x + t * (b.x - a.x),
        y: a.y + t * (b.y - a.y),
    }
}

#[inline]
fn squared_distance(a: Coord, b: Coord) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    dx * dx + dy * dy
}

#[inline]
pub(crate) fn planar_distance(a: Coord, b: Coord) -> f64 {
    squared_distance(a, b).sqrt()
}
