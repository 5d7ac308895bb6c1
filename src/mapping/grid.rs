//! Grid (C1): static occupancy + inflated-safety view.
//!
//! Grounded in `original_source/backend/layer1/include/{StaticBitMap,InflatedBitMap}.hh`:
//! the inflation is a Minkowski-sum disk stamped around every obstacle cell,
//! plus a border of the same radius on all four sides.

use crate::errors::LoadError;
use crate::geometry::{Coordinates, Resolution};

#[derive(Debug, Clone)]
pub struct Grid {
    width: usize,
    height: usize,
    resolution: Resolution,
    static_cells: Vec<bool>,
    inflated_cells: Vec<bool>,
    inflation_radius_px: i32,
}

impl Grid {
    /// Parses the bitmap text format: first line `W H`, then `H` rows of
    /// exactly `W` characters each (`.` free, `#` obstacle).
    pub fn load_from_str(
        text: &str,
        resolution: Resolution,
        robot_radius_meters: f64,
    ) -> Result<Grid, LoadError> {
        let mut lines = text.lines();
        let header = lines
            .next()
            .ok_or_else(|| LoadError::Parse("missing header line".into()))?;
        let mut parts = header.split_whitespace();
        let width: usize = parts
            .next()
            .ok_or_else(|| LoadError::Parse("missing width".into()))?
            .parse()
            .map_err(|_| LoadError::Parse("width is not an integer".into()))?;
        let height: usize = parts
            .next()
            .ok_or_else(|| LoadError::Parse("missing height".into()))?
            .parse()
            .map_err(|_| LoadError::Parse("height is not an integer".into()))?;

        if width == 0 || height == 0 {
            return Err(LoadError::EmptyGrid);
        }

        let mut static_cells = vec![false; width * height];
        let mut row_count = 0;
        for (y, line) in lines.enumerate() {
            if y >= height {
                break;
            }
            if line.chars().count() != width {
                return Err(LoadError::Parse(format!(
                    "row {y} has {} characters, expected {width}",
                    line.chars().count()
                )));
            }
            for (x, ch) in line.chars().enumerate() {
                let blocked = match ch {
                    '#' => true,
                    '.' => false,
                    other => {
                        return Err(LoadError::Parse(format!(
                            "unknown bitmap character '{other}' at ({x},{y})"
                        )))
                    }
                };
                static_cells[y * width + x] = blocked;
            }
            row_count += 1;
        }
        if row_count != height {
            return Err(LoadError::Parse(format!(
                "expected {height} rows, found {row_count}"
            )));
        }

        Ok(Grid::build(
            width,
            height,
            resolution,
            static_cells,
            robot_radius_meters,
        ))
    }

    pub fn load_from_file(
        path: impl AsRef<std::path::Path>,
        resolution: Resolution,
        robot_radius_meters: f64,
    ) -> Result<Grid, LoadError> {
        let text = std::fs::read_to_string(path)?;
        Grid::load_from_str(&text, resolution, robot_radius_meters)
    }

    fn build(
        width: usize,
        height: usize,
        resolution: Resolution,
        static_cells: Vec<bool>,
        robot_radius_meters: f64,
    ) -> Grid {
        let rho = ((robot_radius_meters / resolution.meters_per_pixel()).ceil()) as i32;
        let rho = rho.max(0);

        // Precompute the disk offsets once; reused per obstacle cell.
        let mut offsets = Vec::new();
        for dy in -rho..=rho {
            for dx in -rho..=rho {
                if dx * dx + dy * dy <= rho * rho {
                    offsets.push((dx, dy));
                }
            }
        }

        let mut inflated_cells = static_cells.clone();
        for y in 0..height {
            for x in 0..width {
                if !static_cells[y * width + x] {
                    continue;
                }
                for (dx, dy) in &offsets {
                    let nx = x as i32 + dx;
                    let ny = y as i32 + dy;
                    if nx >= 0 && ny >= 0 && (nx as usize) < width && (ny as usize) < height {
                        inflated_cells[ny as usize * width + nx as usize] = true;
                    }
                }
            }
        }

        // Block a rho-pixel border on all four sides.
        if rho > 0 {
            for y in 0..height {
                for x in 0..width {
                    let near_border = (x as i32) < rho
                        || (y as i32) < rho
                        || (width as i32 - 1 - x as i32) < rho
                        || (height as i32 - 1 - y as i32) < rho;
                    if near_border {
                        inflated_cells[y * width + x] = true;
                    }
                }
            }
        }

        Grid {
            width,
            height,
            resolution,
            static_cells,
            inflated_cells,
            inflation_radius_px: rho,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn inflation_radius_px(&self) -> i32 {
        self.inflation_radius_px
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            None
        } else {
            Some(y as usize * self.width + x as usize)
        }
    }

    pub fn in_bounds(&self, c: Coordinates) -> bool {
        self.index(c.x, c.y).is_some()
    }

    pub fn is_accessible_static(&self, c: Coordinates) -> bool {
        match self.index(c.x, c.y) {
            Some(i) => !self.static_cells[i],
            None => false,
        }
    }

    pub fn is_accessible_safe(&self, c: Coordinates) -> bool {
        match self.index(c.x, c.y) {
            Some(i) => !self.inflated_cells[i],
            None => false,
        }
    }

    pub fn static_cells(&self) -> &[bool] {
        &self.static_cells
    }

    pub fn inflated_cells(&self) -> &[bool] {
        &self.inflated_cells
    }

    pub fn export_to_string(&self) -> String {
        let mut out = format!("{} {}\n", self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                out.push(if self.static_cells[y * self.width + x] {
                    '#'
                } else {
                    '.'
                });
            }
            out.push('\n');
        }
        out
    }
}
