use geo::{BoundingRect, Contains, Coord, LineString, Polygon};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, AABB};

use crate::geometry::{ring_distance, segment_distance};

#[derive(Debug, Clone, Copy)]
struct PointEntry {
    position: Coord<f64>,
    id: usize,
}

impl rstar::RTreeObject for PointEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.position.x, self.position.y])
    }
}

impl rstar::PointDistance for PointEntry {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.position.x - point[0];
        let dy = self.position.y - point[1];
        dx * dx + dy * dy
    }
}

/// 点の R-tree 索引
#[derive(Debug, Clone)]
pub(crate) struct PointIndex {
    tree: RTree<PointEntry>,
}

impl PointIndex {
    pub(crate) fn new() -> Self {
        Self { tree: RTree::new() }
    }

    pub(crate) fn bulk_load(points: &[Coord<f64>]) -> Self {
        let entries = points
            .iter()
            .enumerate()
            .map(|(id, &position)| PointEntry { position, id })
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    pub(crate) fn insert(&mut self, position: Coord<f64>, id: usize) {
        self.tree.insert(PointEntry { position, id });
    }

    /// 最近点 (id, 距離)。等距離なら小さい id
    pub(crate) fn nearest(&self, p: Coord<f64>) -> Option<(usize, f64)> {
        let mut iter = self.tree.nearest_neighbor_iter_with_distance_2(&[p.x, p.y]);
        let (first, best_d2) = iter.next()?;
        let id = iter
            .take_while(|(_, d2)| *d2 <= best_d2)
            .map(|(entry, _)| entry.id)
            .fold(first.id, usize::min);
        Some((id, best_d2.sqrt()))
    }

    /// `radius` 未満の距離に既存点があるか
    pub(crate) fn has_within(&self, p: Coord<f64>, radius: f64) -> bool {
        self.tree
            .locate_within_distance([p.x, p.y], radius * radius)
            .any(|entry| {
                let dx = entry.position.x - p.x;
                let dy = entry.position.y - p.y;
                dx * dx + dy * dy < radius * radius
            })
    }
}

pub(crate) fn nearest_neighbors(
    from: &[Coord<f64>],
    to: &[Coord<f64>],
) -> Vec<Option<(usize, f64)>> {
    let index = PointIndex::bulk_load(to);
    from.iter().map(|p| index.nearest(*p)).collect()
}

fn rings(polygon: &Polygon<f64>) -> impl Iterator<Item = &LineString<f64>> {
    std::iter::once(polygon.exterior()).chain(polygon.interiors())
}

pub(crate) fn touches_lines(
    polygon: &Polygon<f64>,
    lines: &[LineString<f64>],
    tolerance: f64,
) -> bool {
    let Some(bounds) = polygon.bounding_rect() else {
        return false;
    };
    let (min, max) = (bounds.min(), bounds.max());

    lines.iter().any(|line| {
        // 外接矩形で先に絞る
        let near = line.bounding_rect().is_some_and(|b| {
            b.min().x <= max.x + tolerance
                && b.max().x >= min.x - tolerance
                && b.min().y <= max.y + tolerance
                && b.max().y >= min.y - tolerance
        });
        near && line.lines().any(|seg| {
            rings(polygon)
                .flat_map(|ring| ring.lines())
                .any(|edge| segment_distance(seg.start, seg.end, edge.start, edge.end) <= tolerance)
        })
    })
}

pub(crate) fn locate_points(
    polygons: &[Polygon<f64>],
    points: &[Coord<f64>],
    tolerance: f64,
) -> Vec<Option<usize>> {
    let tree: RTree<GeomWithData<Rectangle<[f64; 2]>, usize>> = RTree::bulk_load(
        polygons
            .iter()
            .enumerate()
            .filter_map(|(i, polygon)| {
                let b = polygon.bounding_rect()?;
                Some(GeomWithData::new(
                    Rectangle::from_corners([b.min().x, b.min().y], [b.max().x, b.max().y]),
                    i,
                ))
            })
            .collect(),
    );

    points
        .iter()
        .map(|p| {
            let query = AABB::from_corners(
                [p.x - tolerance, p.y - tolerance],
                [p.x + tolerance, p.y + tolerance],
            );
            let mut candidates: Vec<usize> = tree
                .locate_in_envelope_intersecting(&query)
                .map(|entry| entry.data)
                .collect();
            candidates.sort_unstable();

            // 内包を優先し、なければ許容距離内で最も近いもの
            if let Some(&i) = candidates.iter().find(|&&i| polygons[i].contains(p)) {
                return Some(i);
            }
            candidates
                .into_iter()
                .map(|i| {
                    let d = rings(&polygons[i])
                        .map(|ring| ring_distance(ring, *p))
                        .fold(f64::INFINITY, f64::min);
                    (i, d)
                })
                .filter(|(_, d)| *d <= tolerance)
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(i, _)| i)
        })
        .collect()
}
