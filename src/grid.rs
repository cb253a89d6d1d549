//! Static grid and cardinality index (spec.md C1).

use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};

use crate::movement::Direction;

/// A rectangular grid with a dense index over its traversable cells.
///
/// `cardinality[x][y]` maps a traversable cell to `[0, num_locations)` and
/// an obstacle cell to `None`; the mapping is bijective over the
/// traversable subset and stable for the instance's lifetime (spec.md §3).
#[derive(Debug, Clone)]
pub struct Grid {
    pub width: usize,
    pub height: usize,
    obstacle: Vec<Vec<bool>>,
    cardinality: Vec<Vec<Option<usize>>>,
    cells: Vec<(usize, usize)>,
}

impl Grid {
    /// Build from an explicit obstacle matrix, `obstacle[x][y]`.
    pub fn new(obstacle: Vec<Vec<bool>>) -> Self {
        let width = obstacle.len();
        let height = if width == 0 { 0 } else { obstacle[0].len() };

        let mut cardinality = vec![vec![None; height]; width];
        let mut cells = Vec::new();
        for x in 0..width {
            for y in 0..height {
                if !obstacle[x][y] {
                    cardinality[x][y] = Some(cells.len());
                    cells.push((x, y));
                }
            }
        }

        Grid {
            width,
            height,
            obstacle,
            cardinality,
            cells,
        }
    }

    pub fn num_locations(&self) -> usize {
        self.cells.len()
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    pub fn is_obstacle(&self, x: usize, y: usize) -> bool {
        self.obstacle[x][y]
    }

    pub fn is_traversable(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height && !self.obstacle[x][y]
    }

    /// Dense index of a traversable cell; `None` for obstacles or out of bounds.
    pub fn cardinality(&self, x: usize, y: usize) -> Option<usize> {
        self.cardinality.get(x).and_then(|col| col.get(y)).copied().flatten()
    }

    /// Inverse of `cardinality`: the cell at dense index `idx`.
    pub fn cell_at(&self, idx: usize) -> (usize, usize) {
        self.cells[idx]
    }

    /// In-bounds, non-obstacle neighbors of `(x, y)` reachable via the
    /// enabled direction set, each tagged with the direction used.
    pub fn neighbors(&self, x: usize, y: usize, allowed_directions: usize) -> Vec<((usize, usize), Direction)> {
        let mut out = Vec::new();
        for &d in Direction::enabled(allowed_directions) {
            let (dx, dy) = d.delta();
            let nx = x as i32 + dx;
            let ny = y as i32 + dy;
            if self.in_bounds(nx, ny) {
                let (nx, ny) = (nx as usize, ny as usize);
                if self.is_traversable(nx, ny) {
                    out.push(((nx, ny), d));
                }
            }
        }
        out
    }

    /// Parse the "benchmark" (`type octile`) map format from spec.md §6:
    /// `height H` / `width W` / `map` header, then `H` rows of `W` chars;
    /// `@OTW` are obstacles, anything else is traversable.
    pub fn from_octile_file(path: &str) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("opening map file {path}"))?;
        let mut lines = BufReader::new(file).lines();

        let _type = lines.next().context("missing type header")??;
        let height = parse_last_usize(&lines.next().context("missing height")??)?;
        let width = parse_last_usize(&lines.next().context("missing width")??)?;
        let _map = lines.next().context("missing map marker")??;

        let mut obstacle = vec![vec![false; width]; height];
        for x in 0..height {
            let line = lines
                .next()
                .with_context(|| format!("missing row {x}"))??;
            let row: Vec<char> = line.chars().collect();
            if row.len() < width {
                bail!("row {x} shorter than declared width {width}");
            }
            for y in 0..width {
                obstacle[x][y] = matches!(row[y], '@' | 'O' | 'T' | 'W');
            }
        }

        Ok(Grid::new(obstacle))
    }

    /// Parse the Liron map format from spec.md §6: `W,H` header, then `W`
    /// rows of `H` characters; `1` is an obstacle, anything else traversable.
    pub fn from_liron_file(path: &str) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("opening map file {path}"))?;
        let mut lines = BufReader::new(file).lines();

        let header = lines.next().context("missing W,H header")??;
        let mut parts = header.split(',');
        let width: usize = parts.next().context("missing width")?.trim().parse()?;
        let height: usize = parts.next().context("missing height")?.trim().parse()?;

        let mut obstacle = vec![vec![false; height]; width];
        for x in 0..width {
            let line = lines.next().with_context(|| format!("missing row {x}"))??;
            let row: Vec<char> = line.chars().collect();
            if row.len() < height {
                bail!("row {x} shorter than declared height {height}");
            }
            for y in 0..height {
                obstacle[x][y] = row[y] == '1';
            }
        }

        Ok(Grid::new(obstacle))
    }

    /// Write the octile map format back out (spec.md §6 export formats).
    pub fn to_octile_string(&self) -> String {
        let mut out = String::new();
        out.push_str("type octile\n");
        out.push_str(&format!("height {}\n", self.width));
        out.push_str(&format!("width {}\n", self.height));
        out.push_str("map\n");
        for x in 0..self.width {
            for y in 0..self.height {
                out.push(if self.obstacle[x][y] { '@' } else { '.' });
            }
            out.push('\n');
        }
        out
    }

    /// Write the Liron map format back out.
    pub fn to_liron_string(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("{},{}\n", self.width, self.height));
        for x in 0..self.width {
            for y in 0..self.height {
                out.push(if self.obstacle[x][y] { '1' } else { '0' });
            }
            out.push('\n');
        }
        out
    }
}

fn parse_last_usize(line: &str) -> Result<usize> {
    Ok(line
        .split_whitespace()
        .last()
        .context("empty line")?
        .parse()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_grid() -> Grid {
        // . . #
        // . . .
        // # . .
        Grid::new(vec![
            vec![false, false, true],
            vec![false, false, false],
            vec![true, false, false],
        ])
    }

    #[test]
    fn cardinality_is_bijective_over_traversable_cells() {
        let g = small_grid();
        assert_eq!(g.num_locations(), 7);
        let mut seen = std::collections::HashSet::new();
        for x in 0..g.width {
            for y in 0..g.height {
                if g.is_traversable(x, y) {
                    let idx = g.cardinality(x, y).unwrap();
                    assert!(idx < g.num_locations());
                    assert!(seen.insert(idx), "duplicate cardinality index {idx}");
                    assert_eq!(g.cell_at(idx), (x, y));
                } else {
                    assert!(g.cardinality(x, y).is_none());
                }
            }
        }
    }

    #[test]
    fn neighbors_exclude_obstacles_and_out_of_bounds() {
        let g = small_grid();
        let neighbors = g.neighbors(1, 1, 5);
        // Wait plus 4 straight neighbors, (0,2) and (2,0) are obstacles.
        assert_eq!(neighbors.len(), 3);
    }
}
