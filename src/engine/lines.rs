use geo::{Coord, LineString, MultiLineString};

use crate::geometry::{
    distance, lerp, line_length, locate_on_line, point_segment_distance, segment_intersection,
};

const EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
    Start,
    Finish,
}

fn endpoint(coords: &[Coord<f64>], end: End) -> Coord<f64> {
    match end {
        End::Start => coords[0],
        End::Finish => coords[coords.len() - 1],
    }
}

/// 端点から内側に向かって最初の異なる頂点
fn inner_neighbor(coords: &[Coord<f64>], end: End) -> Option<Coord<f64>> {
    let p = endpoint(coords, end);
    match end {
        End::Start => coords.iter().skip(1).find(|c| distance(**c, p) > EPS).copied(),
        End::Finish => coords.iter().rev().skip(1).find(|c| distance(**c, p) > EPS).copied(),
    }
}

fn attach(coords: &mut Vec<Coord<f64>>, end: End, c: Coord<f64>) {
    match end {
        End::Start => coords.insert(0, c),
        End::Finish => coords.push(c),
    }
}

/// どの線にも接していない端点
fn is_dangling(lines: &[LineString<f64>], i: usize, end: End) -> bool {
    let coords = &lines[i].0;
    if lines[i].is_closed() {
        return false;
    }
    let p = endpoint(coords, end);
    let adjacent = match end {
        End::Start => 0,
        End::Finish => coords.len() - 2,
    };
    lines.iter().enumerate().all(|(j, other)| {
        other.lines().enumerate().all(|(k, seg)| {
            if j == i && k == adjacent {
                return true;
            }
            point_segment_distance(p, seg.start, seg.end) > EPS
        })
    })
}

pub(crate) fn extend_lines(lines: Vec<LineString<f64>>, max_extension: f64) -> Vec<LineString<f64>> {
    let mut lines: Vec<LineString<f64>> = lines.into_iter().filter(|l| l.0.len() >= 2).collect();
    if max_extension <= 0.0 {
        return lines;
    }

    let dangles: Vec<(usize, End)> = (0..lines.len())
        .flat_map(|i| [(i, End::Start), (i, End::Finish)])
        .filter(|&(i, end)| is_dangling(&lines, i, end))
        .collect();

    // 1. 向かい合う近い端点同士を直接つなぐ（距離の短い組から順に）
    let ahead = |from: (usize, End), to: Coord<f64>| {
        let coords = &lines[from.0].0;
        let p = endpoint(coords, from.1);
        inner_neighbor(coords, from.1)
            .map(|q| (p.x - q.x) * (to.x - p.x) + (p.y - q.y) * (to.y - p.y) > 0.0)
            .unwrap_or(false)
    };
    let mut candidates: Vec<(usize, usize, f64)> = Vec::new();
    for a in 0..dangles.len() {
        let pa = endpoint(&lines[dangles[a].0].0, dangles[a].1);
        for b in a + 1..dangles.len() {
            if dangles[b].0 == dangles[a].0 {
                continue;
            }
            let pb = endpoint(&lines[dangles[b].0].0, dangles[b].1);
            let d = distance(pa, pb);
            if d <= max_extension && ahead(dangles[a], pb) && ahead(dangles[b], pa) {
                candidates.push((a, b, d));
            }
        }
    }
    candidates.sort_by(|x, y| x.2.total_cmp(&y.2));

    let mut used = vec![false; dangles.len()];
    let mut bridges = Vec::new();
    for (a, b, _) in candidates {
        if used[a] || used[b] {
            continue;
        }
        used[a] = true;
        used[b] = true;
        let (line_a, end_a) = dangles[a];
        bridges.push((line_a, end_a, endpoint(&lines[dangles[b].0].0, dangles[b].1)));
    }
    for (i, end, c) in bridges {
        attach(&mut lines[i].0, end, c);
    }

    // 2. 残った端点を進行方向に延ばし、最初に当たる線まで伸ばす
    let mut rays = Vec::new();
    for (k, &(i, end)) in dangles.iter().enumerate() {
        if used[k] {
            continue;
        }
        let coords = &lines[i].0;
        let p = endpoint(coords, end);
        let Some(q) = inner_neighbor(coords, end) else {
            continue;
        };
        let len = distance(p, q);
        let far = Coord {
            x: p.x + (p.x - q.x) / len * max_extension,
            y: p.y + (p.y - q.y) / len * max_extension,
        };

        let hit = lines
            .iter()
            .flat_map(|other| other.lines())
            .filter_map(|seg| segment_intersection(p, far, seg.start, seg.end))
            .map(|(t, _)| t)
            .filter(|t| t * max_extension > EPS)
            .min_by(|a, b| a.total_cmp(b));
        if let Some(t) = hit {
            rays.push((i, end, lerp(p, far, t)));
        }
    }
    for (i, end, c) in rays {
        attach(&mut lines[i].0, end, c);
    }

    lines
}

pub(crate) fn merge_lines(lines: Vec<LineString<f64>>, tolerance: f64) -> MultiLineString<f64> {
    let mut parts: Vec<Vec<Coord<f64>>> = lines
        .into_iter()
        .filter(|l| l.0.len() >= 2 && line_length(l) > 0.0)
        .map(|l| l.0)
        .collect();

    // ほぼ閉じている線は閉じる
    for part in parts.iter_mut() {
        let (first, last) = (part[0], part[part.len() - 1]);
        if first != last && distance(first, last) <= tolerance && part.len() > 3 {
            let n = part.len();
            part[n - 1] = first;
        }
    }

    loop {
        let mut joined = false;

        'search: for i in 0..parts.len() {
            if parts[i][0] == parts[i][parts[i].len() - 1] {
                continue;
            }
            for end_i in [End::Start, End::Finish] {
                let p = endpoint(&parts[i], end_i);
                let touching: Vec<(usize, End)> = parts
                    .iter()
                    .enumerate()
                    .flat_map(|(j, part)| [(j, End::Start, part), (j, End::Finish, part)])
                    .filter(|(_, end, part)| distance(endpoint(part, *end), p) <= tolerance)
                    .map(|(j, end, _)| (j, end))
                    .collect();
                // 2本だけが集まる節点のみつなぐ
                if touching.len() != 2 {
                    continue;
                }
                let Some(&(j, end_j)) = touching.iter().find(|&&(j, e)| (j, e) != (i, end_i)) else {
                    continue;
                };
                if j == i {
                    continue;
                }

                let mut a = parts[i].clone();
                if end_i == End::Start {
                    a.reverse();
                }
                let mut b = parts[j].clone();
                if end_j == End::Finish {
                    b.reverse();
                }
                a.extend(b.into_iter().skip(1));

                let (keep, drop) = if i < j { (i, j) } else { (j, i) };
                parts[keep] = a;
                parts.remove(drop);
                joined = true;
                break 'search;
            }
        }

        if !joined {
            break;
        }
    }

    MultiLineString::new(parts.into_iter().map(LineString::new).collect())
}

pub(crate) fn split_at_points(
    line: &LineString<f64>,
    points: &[Coord<f64>],
    tolerance: f64,
) -> Vec<LineString<f64>> {
    let coords = &line.0;
    if coords.len() < 2 {
        return Vec::new();
    }

    let mut cuts: Vec<(usize, f64, Coord<f64>)> = points
        .iter()
        .filter_map(|p| locate_on_line(line, *p))
        .filter(|loc| loc.distance <= tolerance)
        .map(|loc| (loc.segment, loc.t, loc.coord))
        .collect();
    cuts.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.total_cmp(&b.1)));
    cuts.dedup_by(|a, b| distance(a.2, b.2) <= EPS);

    if cuts.is_empty() {
        return vec![line.clone()];
    }

    let mut pieces: Vec<Vec<Coord<f64>>> = Vec::new();
    let mut current = vec![coords[0]];
    let mut k = 0;
    for seg in 0..coords.len() - 1 {
        while k < cuts.len() && cuts[k].0 == seg {
            let c = cuts[k].2;
            current.push(c);
            pieces.push(std::mem::replace(&mut current, vec![c]));
            k += 1;
        }
        current.push(coords[seg + 1]);
    }
    pieces.push(current);

    // 閉じた線は始点をまたぐ区間をつなぎ直す
    if line.is_closed() && pieces.len() >= 2 {
        let first = pieces.remove(0);
        if let Some(last) = pieces.last_mut() {
            last.extend(first.into_iter().skip(1));
        }
    }

    pieces
        .into_iter()
        .map(|mut piece| {
            piece.dedup_by(|a, b| distance(*a, *b) <= EPS);
            LineString::new(piece)
        })
        .filter(|piece| piece.0.len() >= 2 && line_length(piece) > EPS)
        .collect()
}
