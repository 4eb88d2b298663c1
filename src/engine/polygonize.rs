//! Planar polygonization of a line arrangement.
//!
//! Lines are noded at every crossing and touch, nodes closer than the
//! tolerance are merged, dangling edges are pruned and the remaining planar
//! graph is walked face by face. Bounded faces come out counter-clockwise;
//! clockwise rings are component outlines and become holes of the smallest
//! face that encloses them.

use std::collections::{HashMap, HashSet};

use geo::{Contains, Coord, LineString, Polygon};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, AABB};

use crate::geometry::{distance, lerp, project_on_segment, segment_intersection, signed_ring_area};

type SegmentEnvelope = GeomWithData<Rectangle<[f64; 2]>, usize>;

fn envelope(a: Coord<f64>, b: Coord<f64>, pad: f64) -> ([f64; 2], [f64; 2]) {
    (
        [a.x.min(b.x) - pad, a.y.min(b.y) - pad],
        [a.x.max(b.x) + pad, a.y.max(b.y) + pad],
    )
}

/// 交点・接点で線分を分割する
fn node_segments(lines: &[LineString<f64>], tolerance: f64) -> Vec<(Coord<f64>, Coord<f64>)> {
    let segments: Vec<(Coord<f64>, Coord<f64>)> = lines
        .iter()
        .flat_map(|l| l.lines())
        .filter(|seg| distance(seg.start, seg.end) > 0.0)
        .map(|seg| (seg.start, seg.end))
        .collect();

    let tree: RTree<SegmentEnvelope> = RTree::bulk_load(
        segments
            .iter()
            .enumerate()
            .map(|(i, (a, b))| {
                let (lo, hi) = envelope(*a, *b, tolerance);
                GeomWithData::new(Rectangle::from_corners(lo, hi), i)
            })
            .collect(),
    );

    let mut splits: Vec<Vec<f64>> = vec![vec![0.0, 1.0]; segments.len()];
    for (i, &(a, b)) in segments.iter().enumerate() {
        let (lo, hi) = envelope(a, b, tolerance);
        for entry in tree.locate_in_envelope_intersecting(&AABB::from_corners(lo, hi)) {
            let j = entry.data;
            if j <= i {
                continue;
            }
            let (c, d) = segments[j];

            if let Some((t, u)) = segment_intersection(a, b, c, d) {
                splits[i].push(t);
                splits[j].push(u);
            }
            // T字接続・重なり
            for p in [c, d] {
                let (t, q) = project_on_segment(p, a, b);
                if distance(p, q) <= tolerance {
                    splits[i].push(t);
                }
            }
            for p in [a, b] {
                let (u, q) = project_on_segment(p, c, d);
                if distance(p, q) <= tolerance {
                    splits[j].push(u);
                }
            }
        }
    }

    let mut pieces = Vec::new();
    for (&(a, b), ts) in segments.iter().zip(splits.iter_mut()) {
        ts.sort_by(|x, y| x.total_cmp(y));
        ts.dedup_by(|x, y| (*x - *y).abs() < 1e-12);
        for w in ts.windows(2) {
            let start = if w[0] <= 0.0 { a } else { lerp(a, b, w[0]) };
            let end = if w[1] >= 1.0 { b } else { lerp(a, b, w[1]) };
            pieces.push((start, end));
        }
    }
    pieces
}

/// 許容距離内の節点を同一視する格子ハッシュ
struct NodeIndex {
    tolerance: f64,
    grid: HashMap<(i64, i64), Vec<usize>>,
    coords: Vec<Coord<f64>>,
}

impl NodeIndex {
    fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            grid: HashMap::new(),
            coords: Vec::new(),
        }
    }

    fn key(&self, c: Coord<f64>) -> (i64, i64) {
        (
            (c.x / self.tolerance).floor() as i64,
            (c.y / self.tolerance).floor() as i64,
        )
    }

    fn insert(&mut self, c: Coord<f64>) -> usize {
        let (gx, gy) = self.key(c);
        for dx in -1..=1 {
            for dy in -1..=1 {
                if let Some(ids) = self.grid.get(&(gx + dx, gy + dy)) {
                    if let Some(&id) = ids
                        .iter()
                        .find(|&&id| distance(self.coords[id], c) <= self.tolerance)
                    {
                        return id;
                    }
                }
            }
        }
        let id = self.coords.len();
        self.coords.push(c);
        self.grid.entry((gx, gy)).or_default().push(id);
        id
    }
}

fn find(parent: &mut [usize], mut x: usize) -> usize {
    while parent[x] != x {
        parent[x] = parent[parent[x]];
        x = parent[x];
    }
    x
}

struct Ring {
    coords: Vec<Coord<f64>>,
    area: f64,
    component: usize,
}

pub(crate) fn polygonize(lines: &[LineString<f64>], tolerance: f64) -> Vec<Polygon<f64>> {
    let tolerance = tolerance.max(f64::EPSILON);

    // 1. ノード化と節点の統合
    let mut nodes = NodeIndex::new(tolerance);
    let mut seen = HashSet::new();
    let mut edges: Vec<(usize, usize)> = Vec::new();
    for (a, b) in node_segments(lines, tolerance) {
        let u = nodes.insert(a);
        let v = nodes.insert(b);
        if u != v && seen.insert((u.min(v), u.max(v))) {
            edges.push((u, v));
        }
    }
    let coords = nodes.coords;

    // 2. 行き止まりの辺を取り除く
    let mut alive = vec![true; edges.len()];
    let mut degree = vec![0usize; coords.len()];
    for &(u, v) in &edges {
        degree[u] += 1;
        degree[v] += 1;
    }
    loop {
        let mut pruned = false;
        for (k, &(u, v)) in edges.iter().enumerate() {
            if alive[k] && (degree[u] == 1 || degree[v] == 1) {
                alive[k] = false;
                degree[u] -= 1;
                degree[v] -= 1;
                pruned = true;
            }
        }
        if !pruned {
            break;
        }
    }
    let edges: Vec<(usize, usize)> = edges
        .into_iter()
        .zip(alive)
        .filter_map(|(e, keep)| keep.then_some(e))
        .collect();
    if edges.is_empty() {
        return Vec::new();
    }

    // 3. 半辺構造: 2k = u→v, 2k+1 = v→u
    let origin = |h: usize| {
        let (u, v) = edges[h / 2];
        if h % 2 == 0 {
            u
        } else {
            v
        }
    };
    let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); coords.len()];
    for h in 0..edges.len() * 2 {
        outgoing[origin(h)].push(h);
    }
    let angle = |h: usize| {
        let from = coords[origin(h)];
        let to = coords[origin(h ^ 1)];
        (to.y - from.y).atan2(to.x - from.x)
    };
    let mut position = vec![0usize; edges.len() * 2];
    for out in outgoing.iter_mut() {
        out.sort_by(|&x, &y| angle(x).total_cmp(&angle(y)));
        for (i, &h) in out.iter().enumerate() {
            position[h] = i;
        }
    }
    let next = |h: usize| {
        let twin = h ^ 1;
        let out = &outgoing[origin(twin)];
        out[(position[twin] + out.len() - 1) % out.len()]
    };

    let mut parent: Vec<usize> = (0..coords.len()).collect();
    for &(u, v) in &edges {
        let (ru, rv) = (find(&mut parent, u), find(&mut parent, v));
        if ru != rv {
            parent[ru] = rv;
        }
    }

    // 4. 面を辿る
    let mut visited = vec![false; edges.len() * 2];
    let mut rings = Vec::new();
    for start in 0..edges.len() * 2 {
        if visited[start] {
            continue;
        }
        let mut ring = Vec::new();
        let mut h = start;
        while !visited[h] {
            visited[h] = true;
            ring.push(coords[origin(h)]);
            h = next(h);
        }
        let area = signed_ring_area(&ring);
        let component = find(&mut parent, origin(start));
        ring.push(ring[0]);
        rings.push(Ring {
            coords: ring,
            area,
            component,
        });
    }

    let shells: Vec<(Polygon<f64>, &Ring)> = rings
        .iter()
        .filter(|r| r.area > 0.0)
        .map(|r| (Polygon::new(LineString::new(r.coords.clone()), vec![]), r))
        .collect();
    let mut holes: Vec<Vec<LineString<f64>>> = vec![Vec::new(); shells.len()];

    // 5. 他の成分の外周は、それを囲む最小の面の穴
    for outline in rings.iter().filter(|r| r.area < 0.0) {
        let anchor = outline.coords[0];
        let host = shells
            .iter()
            .enumerate()
            .filter(|(_, (polygon, shell))| {
                shell.component != outline.component && polygon.contains(&anchor)
            })
            .min_by(|a, b| a.1 .1.area.total_cmp(&b.1 .1.area))
            .map(|(i, _)| i);
        if let Some(i) = host {
            holes[i].push(LineString::new(outline.coords.clone()));
        }
    }

    shells
        .into_iter()
        .zip(holes)
        .map(|((polygon, _), interiors)| {
            let (exterior, _) = polygon.into_inner();
            Polygon::new(exterior, interiors)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Area;

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> LineString<f64> {
        LineString::from(vec![(x0, y0), (x1, y0), (x1, y1), (x0, y1), (x0, y0)])
    }

    fn areas(polygons: &[Polygon<f64>]) -> Vec<f64> {
        let mut areas: Vec<f64> = polygons.iter().map(|p| p.unsigned_area()).collect();
        areas.sort_by(|a, b| a.total_cmp(b));
        areas
    }

    #[test]
    fn test_divider_splits_rectangle() {
        let lines = vec![
            rect(0.0, 0.0, 20.0, 10.0),
            LineString::from(vec![(10.0, 0.0), (10.0, 10.0)]),
        ];
        let polygons = polygonize(&lines, 1e-6);

        assert_eq!(areas(&polygons), vec![100.0, 100.0]);
        for polygon in &polygons {
            assert!(signed_ring_area(&polygon.exterior().0) > 0.0);
        }
    }

    #[test]
    fn test_crossing_lines_close_a_face() {
        let lines = vec![
            LineString::from(vec![(-5.0, 0.0), (15.0, 0.0)]),
            LineString::from(vec![(-5.0, 10.0), (15.0, 10.0)]),
            LineString::from(vec![(0.0, -5.0), (0.0, 15.0)]),
            LineString::from(vec![(10.0, -5.0), (10.0, 15.0)]),
        ];
        let polygons = polygonize(&lines, 1e-6);

        assert_eq!(polygons.len(), 1);
        assert!((polygons[0].unsigned_area() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_nested_ring_becomes_hole() {
        let lines = vec![rect(0.0, 0.0, 30.0, 30.0), rect(10.0, 10.0, 20.0, 20.0)];
        let polygons = polygonize(&lines, 1e-6);

        assert_eq!(polygons.len(), 2);
        let outer = polygons
            .iter()
            .find(|p| !p.interiors().is_empty())
            .unwrap();
        assert!((outer.unsigned_area() - 800.0).abs() < 1e-9);
        assert_eq!(areas(&polygons), vec![100.0, 800.0]);
    }

    #[test]
    fn test_near_miss_within_tolerance_is_noded() {
        let lines = vec![
            LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]),
            LineString::from(vec![(0.0, 10.0005), (0.0, 0.0004)]),
        ];
        assert!(polygonize(&lines, 1e-6).is_empty());
        assert_eq!(polygonize(&lines, 1e-3).len(), 1);
    }
}
