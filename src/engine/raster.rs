use std::collections::{HashSet, VecDeque};

use geo::{LineString, Simplify};
use rayon::prelude::*;

use crate::error::{Result, SeawallError};
use crate::model::{CellMask, ElevationField};

pub(crate) fn focal_mean(field: &ElevationField, radius: usize) -> Result<ElevationField> {
    if radius == 0 {
        return Err(SeawallError::invalid("radius", radius, "must be > 0"));
    }

    let (rows, cols) = field.shape();

    let values: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];

            for col in 0..cols {
                // 欠測セルは欠測のまま
                if field.get(row, col).is_none() {
                    continue;
                }
                if let Some(mean) = field.window_mean(row, col, radius) {
                    row_data[col] = mean;
                }
            }

            row_data
        })
        .collect();

    field.map_values(values)
}

pub(crate) fn reclassify_range(field: &ElevationField, lo: f64, hi: f64) -> CellMask {
    let (rows, cols) = field.shape();
    let mut mask = CellMask::empty(rows, cols);
    for row in 0..rows {
        for col in 0..cols {
            if let Some(v) = field.get(row, col) {
                if v >= lo && v <= hi {
                    mask.set(row, col, true);
                }
            }
        }
    }
    mask
}

const NEIGHBORS_8: [(isize, isize); 8] = [
    (-1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
];

pub(crate) fn sieve(mask: &CellMask, min_cells: usize) -> CellMask {
    let (rows, cols) = (mask.rows, mask.cols);
    let mut out = CellMask::empty(rows, cols);
    let mut seen = vec![false; rows * cols];
    let mut queue = VecDeque::new();

    for start in 0..rows * cols {
        if seen[start] || mask.cells[start] == 0 {
            continue;
        }

        // 連結成分を幅優先で収集
        let mut component = Vec::new();
        seen[start] = true;
        queue.push_back(start);
        while let Some(idx) = queue.pop_front() {
            component.push(idx);
            let (r, c) = ((idx / cols) as isize, (idx % cols) as isize);
            for (dr, dc) in NEIGHBORS_8 {
                let (nr, nc) = (r + dr, c + dc);
                if mask.is_set(nr, nc) {
                    let nidx = nr as usize * cols + nc as usize;
                    if !seen[nidx] {
                        seen[nidx] = true;
                        queue.push_back(nidx);
                    }
                }
            }
        }

        if component.len() >= min_cells {
            for idx in component {
                out.cells[idx] = 1;
            }
        }
    }

    out
}

/// P2..P9 (north, clockwise)
fn neighbors_8(mask: &CellMask, r: usize, c: usize) -> [u8; 8] {
    let mut p = [0u8; 8];
    for (i, (dr, dc)) in NEIGHBORS_8.iter().enumerate() {
        p[i] = mask.is_set(r as isize + dr, c as isize + dc) as u8;
    }
    p
}

fn transitions_01(p: &[u8; 8]) -> usize {
    (0..8).filter(|&i| p[i] == 0 && p[(i + 1) % 8] == 1).count()
}

/// Zhang-Suen thinning; cells outside the raster count as background.
pub(crate) fn thin(mask: &CellMask) -> CellMask {
    let (rows, cols) = (mask.rows, mask.cols);
    let mut current = mask.clone();

    loop {
        let mut changed = false;

        for step in 0..2 {
            let mut to_remove = Vec::new();
            for r in 0..rows {
                for c in 0..cols {
                    if current.cells[r * cols + c] == 0 {
                        continue;
                    }
                    let p = neighbors_8(&current, r, c);
                    let b = p.iter().filter(|&&v| v == 1).count();
                    let a = transitions_01(&p);
                    let removable = if step == 0 {
                        p[0] * p[2] * p[4] == 0 && p[2] * p[4] * p[6] == 0
                    } else {
                        p[0] * p[2] * p[6] == 0 && p[0] * p[4] * p[6] == 0
                    };
                    if (2..=6).contains(&b) && a == 1 && removable {
                        to_remove.push(r * cols + c);
                    }
                }
            }
            for idx in to_remove {
                current.cells[idx] = 0;
                changed = true;
            }
        }

        if !changed {
            break;
        }
    }

    current
}

/// 4近傍を優先し、対角は間の直交セルが両方空のときだけつなぐ
fn skeleton_neighbors(mask: &CellMask, idx: usize) -> Vec<usize> {
    let cols = mask.cols;
    let (r, c) = ((idx / cols) as isize, (idx % cols) as isize);
    let mut out = Vec::with_capacity(4);
    for (dr, dc) in NEIGHBORS_8 {
        if !mask.is_set(r + dr, c + dc) {
            continue;
        }
        if dr != 0 && dc != 0 && (mask.is_set(r + dr, c) || mask.is_set(r, c + dc)) {
            continue;
        }
        out.push((r + dr) as usize * cols + (c + dc) as usize);
    }
    out
}

fn edge_key(a: usize, b: usize) -> (usize, usize) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

fn walk(
    mask: &CellMask,
    visited: &mut HashSet<(usize, usize)>,
    start: usize,
    next: usize,
) -> Vec<usize> {
    let mut path = vec![start, next];
    let mut prev = start;
    let mut cur = next;
    loop {
        let neighbors = skeleton_neighbors(mask, cur);
        if neighbors.len() != 2 {
            break;
        }
        let following = if neighbors[0] == prev {
            neighbors[1]
        } else {
            neighbors[0]
        };
        if !visited.insert(edge_key(cur, following)) {
            break;
        }
        path.push(following);
        prev = cur;
        cur = following;
    }
    path
}

pub(crate) fn trace_lines(
    mask: &CellMask,
    field: &ElevationField,
    simplify_tolerance: f64,
) -> Vec<LineString<f64>> {
    let set: Vec<usize> = (0..mask.cells.len())
        .filter(|&i| mask.cells[i] == 1)
        .collect();
    let degrees: Vec<usize> = set
        .iter()
        .map(|&i| skeleton_neighbors(mask, i).len())
        .collect();

    let mut visited = HashSet::new();
    let mut paths = Vec::new();

    // 端点・分岐点から先に辿り、残りは閉じたループ
    let ordered = set
        .iter()
        .zip(&degrees)
        .filter(|(_, &d)| d > 0 && d != 2)
        .chain(set.iter().zip(&degrees).filter(|(_, &d)| d == 2))
        .map(|(&i, _)| i);
    for idx in ordered {
        for neighbor in skeleton_neighbors(mask, idx) {
            if visited.insert(edge_key(idx, neighbor)) {
                paths.push(walk(mask, &mut visited, idx, neighbor));
            }
        }
    }

    paths
        .into_iter()
        .map(|path| {
            let line: LineString<f64> = path
                .into_iter()
                .map(|idx| field.cell_center(idx / mask.cols, idx % mask.cols))
                .collect::<Vec<_>>()
                .into();
            if simplify_tolerance > 0.0 {
                line.simplify(&simplify_tolerance)
            } else {
                line
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::line_length;

    fn strip_mask(rows: usize, cols: usize, col_range: std::ops::Range<usize>) -> CellMask {
        let mut mask = CellMask::empty(rows, cols);
        for r in 0..rows {
            for c in col_range.clone() {
                mask.set(r, c, true);
            }
        }
        mask
    }

    #[test]
    fn test_focal_mean_preserves_linear_ramp_interior() {
        let values = (0..20 * 20).map(|i| (i % 20) as f64 * 0.5).collect();
        let field = ElevationField::new(20, 20, (0.0, 20.0), 1.0, values).unwrap();
        let smoothed = focal_mean(&field, 2).unwrap();

        for row in 0..20 {
            for col in 2..18 {
                let expected = col as f64 * 0.5;
                let got = smoothed.get(row, col).unwrap();
                assert!((got - expected).abs() < 1e-9, "({row},{col}) = {got}");
            }
        }
        assert!(focal_mean(&field, 0).is_err());
    }

    #[test]
    fn test_focal_mean_keeps_nodata() {
        let mut values = vec![1.0; 9];
        values[4] = f64::NAN;
        let field = ElevationField::new(3, 3, (0.0, 3.0), 1.0, values).unwrap();
        let smoothed = focal_mean(&field, 1).unwrap();
        assert_eq!(smoothed.get(1, 1), None);
        assert_eq!(smoothed.get(0, 0), Some(1.0));
    }

    #[test]
    fn test_sieve_removes_small_components() {
        let mut mask = strip_mask(10, 10, 0..3);
        mask.set(5, 8, true);
        mask.set(6, 8, true);

        let sieved = sieve(&mask, 5);
        assert_eq!(sieved.count(), 30);
        assert!(!sieved.is_set(5, 8));
        // 対角接続も同じ成分
        let mut diagonal = CellMask::empty(3, 3);
        diagonal.set(0, 0, true);
        diagonal.set(1, 1, true);
        diagonal.set(2, 2, true);
        assert_eq!(sieve(&diagonal, 3).count(), 3);
    }

    #[test]
    fn test_thin_reduces_strip_to_single_line() {
        let mask = strip_mask(40, 12, 3..9);
        let skeleton = thin(&mask);

        assert!(skeleton.count() > 0);
        for r in 5..35 {
            let width = (0..12).filter(|&c| skeleton.is_set(r, c as isize)).count();
            assert_eq!(width, 1, "row {r} should be one cell wide");
        }
    }

    #[test]
    fn test_trace_lines_follows_skeleton() {
        let mut mask = CellMask::empty(30, 5);
        for r in 2..28 {
            mask.set(r, 2, true);
        }
        let field = ElevationField::new(30, 5, (0.0, 30.0), 1.0, vec![0.0; 150]).unwrap();
        let lines = trace_lines(&mask, &field, 0.5);

        assert_eq!(lines.len(), 1);
        assert!((line_length(&lines[0]) - 25.0).abs() < 1e-9);
        assert_eq!(lines[0].0.len(), 2, "straight run simplifies to its endpoints");
    }

    #[test]
    fn test_trace_lines_closes_loops() {
        let mut mask = CellMask::empty(8, 8);
        for i in 2..6 {
            mask.set(2, i, true);
            mask.set(5, i, true);
            mask.set(i, 2, true);
            mask.set(i, 5, true);
        }
        let field = ElevationField::new(8, 8, (0.0, 8.0), 1.0, vec![0.0; 64]).unwrap();
        let lines = trace_lines(&mask, &field, 0.0);

        assert_eq!(lines.len(), 1);
        assert!(lines[0].is_closed());
        assert!((line_length(&lines[0]) - 12.0).abs() < 1e-9);
    }
}
