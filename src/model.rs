use geo::{Coord, LineString, MultiLineString, MultiPolygon, Polygon};

use crate::error::{Result, SeawallError};
use crate::geometry::{self, line_length};

/// 標高ラスタ（行優先、左上原点、正方セル）
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationField {
    pub rows: usize,
    pub cols: usize,
    pub origin_x: f64,
    pub origin_y: f64,
    pub cell_size: f64,
    pub values: Vec<f64>,
    pub nodata: Option<f64>,
}

impl ElevationField {
    pub fn new(
        rows: usize,
        cols: usize,
        origin: (f64, f64),
        cell_size: f64,
        values: Vec<f64>,
    ) -> Result<Self> {
        let expected = rows.checked_mul(cols);
        if rows == 0 || cols == 0 || expected != Some(values.len()) {
            return Err(SeawallError::InvalidDimensions {
                rows,
                cols,
                len: values.len(),
            });
        }
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(SeawallError::invalid("cell_size", cell_size, "must be > 0"));
        }
        Ok(Self {
            rows,
            cols,
            origin_x: origin.0,
            origin_y: origin.1,
            cell_size,
            values,
            nodata: None,
        })
    }

    pub fn with_nodata(mut self, nodata: Option<f64>) -> Self {
        self.nodata = nodata;
        self
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn geo_transform(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.cell_size,
            0.0,
            self.origin_y,
            0.0,
            -self.cell_size,
        ]
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        let value = self.values[row * self.cols + col];
        if value.is_nan() || self.nodata == Some(value) {
            None
        } else {
            Some(value)
        }
    }

    pub fn cell_center(&self, row: usize, col: usize) -> Coord<f64> {
        Coord {
            x: self.origin_x + (col as f64 + 0.5) * self.cell_size,
            y: self.origin_y - (row as f64 + 0.5) * self.cell_size,
        }
    }

    pub fn world_to_cell(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let col = ((x - self.origin_x) / self.cell_size).floor();
        let row = ((self.origin_y - y) / self.cell_size).floor();
        if col < 0.0 || row < 0.0 || col >= self.cols as f64 || row >= self.rows as f64 {
            return None;
        }
        Some((row as usize, col as usize))
    }

    pub fn sample(&self, x: f64, y: f64) -> Option<f64> {
        let (row, col) = self.world_to_cell(x, y)?;
        self.get(row, col)
    }

    /// 半径 `radius` セルの円形窓の平均（欠測セルは除外）
    pub fn window_mean(&self, row: usize, col: usize, radius: usize) -> Option<f64> {
        let r = radius as isize;
        let mut sum = 0.0;
        let mut count = 0usize;
        for dr in -r..=r {
            for dc in -r..=r {
                if dr * dr + dc * dc > r * r {
                    continue;
                }
                let nr = row as isize + dr;
                let nc = col as isize + dc;
                if nr < 0 || nc < 0 {
                    continue;
                }
                if let Some(v) = self.get(nr as usize, nc as usize) {
                    sum += v;
                    count += 1;
                }
            }
        }
        (count > 0).then(|| sum / count as f64)
    }

    /// 同じジオリファレンスで値だけ差し替える
    pub fn map_values(&self, values: Vec<f64>) -> Result<Self> {
        Ok(Self::new(
            self.rows,
            self.cols,
            (self.origin_x, self.origin_y),
            self.cell_size,
            values,
        )?
        .with_nodata(self.nodata))
    }
}

/// 2値ラスタ（0/1）
#[derive(Debug, Clone, PartialEq)]
pub struct CellMask {
    pub rows: usize,
    pub cols: usize,
    pub cells: Vec<u8>,
}

impl CellMask {
    pub fn empty(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![0; rows * cols],
        }
    }

    pub fn is_set(&self, row: isize, col: isize) -> bool {
        if row < 0 || col < 0 || row as usize >= self.rows || col as usize >= self.cols {
            return false;
        }
        self.cells[row as usize * self.cols + col as usize] == 1
    }

    pub fn set(&mut self, row: usize, col: usize, on: bool) {
        self.cells[row * self.cols + col] = on as u8;
    }

    pub fn count(&self) -> usize {
        self.cells.iter().filter(|&&c| c == 1).count()
    }
}

/// ある標高の境界線。複数の折れ線で構成されても一つの対象として扱う
#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    pub elevation: f64,
    pub parts: MultiLineString<f64>,
}

impl Curve {
    pub fn new(elevation: f64, parts: MultiLineString<f64>) -> Self {
        Self { elevation, parts }
    }

    pub fn is_empty(&self) -> bool {
        self.length() == 0.0
    }

    pub fn part_lengths(&self) -> Vec<f64> {
        self.parts.0.iter().map(line_length).collect()
    }

    pub fn length(&self) -> f64 {
        self.part_lengths().iter().sum()
    }

    /// 全パートを連結した長さ `distance` の位置 → (パート番号, パート内距離, 座標)
    pub fn point_at(&self, distance: f64) -> Option<(usize, f64, Coord<f64>)> {
        let lengths = self.part_lengths();
        let mut remaining = distance.max(0.0);
        for (i, (part, len)) in self.parts.0.iter().zip(&lengths).enumerate() {
            if remaining <= *len && *len > 0.0 {
                return geometry::point_along(part, remaining).map(|c| (i, remaining, c));
            }
            remaining -= len;
        }
        let (i, part) = self
            .parts
            .0
            .iter()
            .enumerate()
            .rev()
            .find(|(_, p)| !p.0.is_empty())?;
        part.0.last().map(|c| (i, lengths[i], *c))
    }

    /// 最近点 → (パート番号, 位置)
    pub fn closest_point(&self, p: Coord<f64>) -> Option<(usize, geometry::LineLocation)> {
        self.parts
            .0
            .iter()
            .enumerate()
            .filter_map(|(i, part)| geometry::locate_on_line(part, p).map(|loc| (i, loc)))
            .min_by(|a, b| a.1.distance.total_cmp(&b.1.distance))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidatePoint {
    pub id: u32,
    pub position: Coord<f64>,
    pub part: usize,
    pub offset: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchedPair {
    pub source: CandidatePoint,
    pub target: CandidatePoint,
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Connector {
    pub source_id: u32,
    pub target_id: u32,
    pub line: LineString<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub id: usize,
    pub polygon: Polygon<f64>,
    pub boundary_length: f64,
    pub total_damage: f64,
    pub damage_density: f64,
    pub asset_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub id: String,
    pub position: Coord<f64>,
    /// 建物の外形（点資産は None）
    pub footprint: Option<MultiPolygon<f64>>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetDamage {
    pub asset_id: String,
    pub position: Coord<f64>,
    pub ground_elevation: f64,
    pub damage: f64,
}
