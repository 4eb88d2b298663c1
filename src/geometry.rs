//! Planar helpers shared by the model and the engine.

use geo::{Coord, LineString};

pub fn distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

pub fn line_length(line: &LineString<f64>) -> f64 {
    line.lines().map(|l| l.dx().hypot(l.dy())).sum()
}

/// 線分 `a-b` 上で `p` に最も近い点のパラメータ `t` (0..=1) と座標
pub fn project_on_segment(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> (f64, Coord<f64>) {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return (0.0, a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0);
    (t, Coord {
        x: a.x + dx * t,
        y: a.y + dy * t,
    })
}

pub fn point_segment_distance(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> f64 {
    distance(p, project_on_segment(p, a, b).1)
}

/// 折れ線上の最近点
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineLocation {
    pub segment: usize,
    pub t: f64,
    pub coord: Coord<f64>,
    pub distance: f64,
    /// 始点からの距離
    pub offset: f64,
}

pub fn locate_on_line(line: &LineString<f64>, p: Coord<f64>) -> Option<LineLocation> {
    let mut best: Option<LineLocation> = None;
    let mut travelled = 0.0;
    for (i, seg) in line.lines().enumerate() {
        let (t, coord) = project_on_segment(p, seg.start, seg.end);
        let d = distance(p, coord);
        let seg_len = seg.dx().hypot(seg.dy());
        if best.map_or(true, |b| d < b.distance) {
            best = Some(LineLocation {
                segment: i,
                t,
                coord,
                distance: d,
                offset: travelled + seg_len * t,
            });
        }
        travelled += seg_len;
    }
    best
}

/// 始点から `offset` だけ進んだ位置
pub fn point_along(line: &LineString<f64>, offset: f64) -> Option<Coord<f64>> {
    let mut remaining = offset.max(0.0);
    let mut last = None;
    for seg in line.lines() {
        let seg_len = seg.dx().hypot(seg.dy());
        if remaining <= seg_len && seg_len > 0.0 {
            let t = remaining / seg_len;
            return Some(Coord {
                x: seg.start.x + seg.dx() * t,
                y: seg.start.y + seg.dy() * t,
            });
        }
        remaining -= seg_len;
        last = Some(seg.end);
    }
    last.or_else(|| line.0.first().copied())
}

/// 環（閉じた折れ線）までの距離
pub fn ring_distance(ring: &LineString<f64>, p: Coord<f64>) -> f64 {
    ring.lines()
        .map(|seg| point_segment_distance(p, seg.start, seg.end))
        .fold(f64::INFINITY, f64::min)
}

fn cross(a: Coord<f64>, b: Coord<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

/// 線分 `a-b` と `c-d` の交点パラメータ `(t, u)`（平行なら None）
pub fn segment_intersection(
    a: Coord<f64>,
    b: Coord<f64>,
    c: Coord<f64>,
    d: Coord<f64>,
) -> Option<(f64, f64)> {
    let r = b - a;
    let s = d - c;
    let denom = cross(r, s);
    if denom.abs() < 1e-12 * (r.x.hypot(r.y) * s.x.hypot(s.y)).max(1e-300) {
        return None;
    }
    let qp = c - a;
    let t = cross(qp, s) / denom;
    let u = cross(qp, r) / denom;
    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        Some((t, u))
    } else {
        None
    }
}

/// 線分同士の最短距離
pub fn segment_distance(
    a: Coord<f64>,
    b: Coord<f64>,
    c: Coord<f64>,
    d: Coord<f64>,
) -> f64 {
    if segment_intersection(a, b, c, d).is_some() {
        return 0.0;
    }
    point_segment_distance(a, c, d)
        .min(point_segment_distance(b, c, d))
        .min(point_segment_distance(c, a, b))
        .min(point_segment_distance(d, a, b))
}

pub fn lerp(a: Coord<f64>, b: Coord<f64>, t: f64) -> Coord<f64> {
    Coord {
        x: a.x + (b.x - a.x) * t,
        y: a.y + (b.y - a.y) * t,
    }
}

pub fn signed_ring_area(coords: &[Coord<f64>]) -> f64 {
    if coords.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..coords.len() {
        let a = coords[i];
        let b = coords[(i + 1) % coords.len()];
        sum += a.x * b.y - b.x * a.y;
    }
    sum / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_on_line_reports_offset() {
        let line = LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]);
        let loc = locate_on_line(&line, Coord { x: 12.0, y: 4.0 }).unwrap();
        assert_eq!(loc.segment, 1);
        assert!((loc.offset - 14.0).abs() < 1e-12);
        assert!((loc.distance - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_point_along_clamps_to_end() {
        let line = LineString::from(vec![(0.0, 0.0), (3.0, 4.0)]);
        let mid = point_along(&line, 2.5).unwrap();
        assert!((mid.x - 1.5).abs() < 1e-12 && (mid.y - 2.0).abs() < 1e-12);
        assert_eq!(point_along(&line, 99.0), Some(Coord { x: 3.0, y: 4.0 }));
        assert!((line_length(&line) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_segment_intersection() {
        let hit = segment_intersection(
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 4.0, y: 0.0 },
            Coord { x: 1.0, y: -1.0 },
            Coord { x: 1.0, y: 3.0 },
        )
        .unwrap();
        assert!((hit.0 - 0.25).abs() < 1e-12);
        assert!((hit.1 - 0.25).abs() < 1e-12);

        // 平行・交差なし
        assert!(segment_intersection(
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 4.0, y: 0.0 },
            Coord { x: 0.0, y: 1.0 },
            Coord { x: 4.0, y: 1.0 },
        )
        .is_none());
        assert!(segment_intersection(
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 1.0, y: 0.0 },
            Coord { x: 2.0, y: -1.0 },
            Coord { x: 2.0, y: 1.0 },
        )
        .is_none());
    }

    #[test]
    fn test_signed_area_orientation() {
        let ccw = [
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 1.0, y: 0.0 },
            Coord { x: 1.0, y: 1.0 },
            Coord { x: 0.0, y: 1.0 },
        ];
        assert!((signed_ring_area(&ccw) - 1.0).abs() < 1e-12);
        let mut cw = ccw;
        cw.reverse();
        assert!((signed_ring_area(&cw) + 1.0).abs() < 1e-12);
    }
}
