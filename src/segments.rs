//! Turning merged intervals back into route geometry.
//!
//! The reconstructor walks the route edge by edge while consuming the
//! merged intervals front to back. For edge `[a, b]` and the head interval
//! `[x, y]`:
//!
//! ```text
//! Skip    x--y        interval inside the edge: emit it whole
//!        a----b
//! Enter     x--       interval starts here: open a running segment
//!        a---b
//! Inside x-------y    edge fully covered: extend the running segment
//!          a---b
//! Exit      --y       interval ends here: close the running segment
//!           a---b
//! ```
//!
//! After a Skip or an Exit the same edge is checked again, since the next
//! interval may start on it too. Intervals still queued after the last edge
//! are dropped with a warning rather than clamped to the route end.

use std::collections::VecDeque;

use geo::Coord;
use log::warn;
use serde::ser::{Serialize, SerializeSeq, Serializer};

use crate::intervals::Interval;
use crate::route::{push_distinct, PlanarRoute};
use crate::GpsPoint;

/// A matched stretch of route, at least 2 coordinates in travel order.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedSegment {
    pub points: Vec<GpsPoint>,
}

impl MatchedSegment {
    pub fn new(points: Vec<GpsPoint>) -> Self {
        Self { points }
    }

    pub fn first(&self) -> Option<&GpsPoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&GpsPoint> {
        self.points.last()
    }
}

/// Serialized as `[[lon, lat], ...]`.
impl Serialize for MatchedSegment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.points.len()))?;
        for p in &self.points {
            seq.serialize_element(&p.to_lon_lat())?;
        }
        seq.end()
    }
}

/// Reconstruct the planar sub-polylines realizing `merged`.
///
/// `merged` must be sorted and non-overlapping, as produced by
/// [`crate::merge_intervals`]. The result follows travel order and every
/// polyline has at least 2 coordinates.
pub fn reconstruct_segments(route: &PlanarRoute, merged: &[Interval]) -> Vec<Vec<Coord>> {
    let mut queue: VecDeque<Interval> = merged.iter().copied().collect();
    let mut completed: Vec<Vec<Coord>> = Vec::with_capacity(queue.len());
    let mut running: Option<Vec<Coord>> = None;

    for edge in 0..route.edge_count() {
        if queue.is_empty() {
            break;
        }
        let (a, b) = route.edge_bounds(edge);
        let (from, to) = route.edge(edge);

        while let Some(&Interval { start: x, end: y }) = queue.front() {
            if let Some(mut segment) = running.take() {
                push_distinct(&mut segment, from);
                if y <= b {
                    // Exit
                    push_distinct(&mut segment, route.interpolate(y));
                    completed.push(at_least_two(segment));
                    queue.pop_front();
                    continue;
                }
                // Inside
                push_distinct(&mut segment, to);
                running = Some(segment);
                break;
            }

            if x >= a && y <= b {
                // Skip
                completed.push(vec![route.interpolate(x), route.interpolate(y)]);
                queue.pop_front();
                continue;
            }
            if x >= a && x <= b {
                // Enter
                let mut segment = vec![route.interpolate(x)];
                push_distinct(&mut segment, to);
                running = Some(segment);
            } else if x < a && y > b {
                // Inside without a running segment, only after an exact
                // vertex overlap
                running = Some(vec![from, to]);
            } else if x < a && y >= a {
                // Exit without a running segment
                let mut segment = vec![from];
                push_distinct(&mut segment, route.interpolate(y));
                completed.push(at_least_two(segment));
                queue.pop_front();
                continue;
            } else if y < a {
                warn!("Interval [{:.1}, {:.1}] lies behind edge {}, skipping", x, y, edge);
                queue.pop_front();
                continue;
            }
            break;
        }
    }

    if running.is_some() || !queue.is_empty() {
        warn!(
            "Dropping {} interval(s) extending beyond the route end ({:.1}m)",
            queue.len(),
            route.length()
        );
    }

    completed
}

/// Pad a degenerate segment by repeating its only point.
fn at_least_two(mut segment: Vec<Coord>) -> Vec<Coord> {
    if segment.len() == 1 {
        segment.push(segment[0]);
    }
    segment
}
