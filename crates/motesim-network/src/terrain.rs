//! Terrain map and path sampling.

use motesim_common::{GridPos, SimError};
use motesim_radio::Terrain;

/// Upper bound on the number of cells sampled along one path.
pub const MAX_PATH_SAMPLES: usize = 256;

/// Default edge length of a terrain cell in metres.
pub const DEFAULT_CELL_SIZE_M: u32 = 10;

/// Terrain characteristics between two points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathProfile {
    /// Mean path loss exponent of the sampled cells.
    pub exponent: f64,
    /// Most frequent terrain class along the path.
    pub dominant: Terrain,
}

/// Grid of terrain cells covering the simulated area.
///
/// The map is immutable once built. Positions outside the map resolve to the
/// nearest edge cell.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainMap {
    width_cells: u32,
    height_cells: u32,
    cell_size: u32,
    cells: Vec<Terrain>,
}

impl TerrainMap {
    /// A map where every cell has the same terrain.
    pub fn uniform(width_m: u32, height_m: u32, cell_size: u32, terrain: Terrain) -> Self {
        let cell_size = cell_size.max(1);
        let width_cells = cells_for(width_m, cell_size);
        let height_cells = cells_for(height_m, cell_size);
        TerrainMap {
            width_cells,
            height_cells,
            cell_size,
            cells: vec![terrain; (width_cells * height_cells) as usize],
        }
    }

    /// A map split into three vertical bands: forest in the west, plain in
    /// the middle and city in the east.
    pub fn three_bands(width_m: u32, height_m: u32, cell_size: u32) -> Self {
        let mut map = Self::uniform(width_m, height_m, cell_size, Terrain::Plain);
        let band = (map.width_cells / 3).max(1);
        for row in 0..map.height_cells {
            for col in 0..map.width_cells {
                let terrain = if col < band {
                    Terrain::Forest
                } else if col < band * 2 {
                    Terrain::Plain
                } else {
                    Terrain::City
                };
                let idx = (row * map.width_cells + col) as usize;
                map.cells[idx] = terrain;
            }
        }
        map
    }

    /// Build a map from explicit cells in row-major order.
    pub fn from_cells(
        width_cells: u32,
        height_cells: u32,
        cell_size: u32,
        cells: Vec<Terrain>,
    ) -> Result<Self, SimError> {
        if width_cells == 0 || height_cells == 0 {
            return Err(SimError::InvalidParameter("terrain map must have at least one cell".into()));
        }
        if cells.len() != (width_cells * height_cells) as usize {
            return Err(SimError::InvalidParameter(format!(
                "expected {} terrain cells, got {}",
                width_cells * height_cells,
                cells.len()
            )));
        }
        Ok(TerrainMap {
            width_cells,
            height_cells,
            cell_size: cell_size.max(1),
            cells,
        })
    }

    /// Width of the map in metres.
    pub fn width_m(&self) -> u32 {
        self.width_cells * self.cell_size
    }

    /// Height of the map in metres.
    pub fn height_m(&self) -> u32 {
        self.height_cells * self.cell_size
    }

    /// Edge length of a cell in metres.
    pub fn cell_size(&self) -> u32 {
        self.cell_size
    }

    /// Terrain of the cell containing `pos`.
    pub fn terrain_at(&self, pos: GridPos) -> Terrain {
        let col = clamp_cell(pos.x, self.cell_size, self.width_cells);
        let row = clamp_cell(pos.y, self.cell_size, self.height_cells);
        self.cells[(row * self.width_cells + col) as usize]
    }

    /// Sample the terrain along the straight line from `a` to `b`.
    pub fn path_profile(&self, a: GridPos, b: GridPos) -> PathProfile {
        let distance = a.distance_to(&b);
        let steps = ((distance / self.cell_size as f64).ceil() as usize).clamp(1, MAX_PATH_SAMPLES);

        let mut counts = [0usize; 3];
        let mut exponent_sum = 0.0;
        for i in 0..=steps {
            let t = i as f64 / steps as f64;
            let x = a.x as f64 + (b.x - a.x) as f64 * t;
            let y = a.y as f64 + (b.y - a.y) as f64 * t;
            let terrain = self.terrain_at(GridPos::new(x.round() as i32, y.round() as i32));
            exponent_sum += terrain.path_loss_exponent();
            counts[terrain_slot(terrain)] += 1;
        }

        let mut dominant = Terrain::ALL[0];
        let mut best = 0;
        for terrain in Terrain::ALL {
            if counts[terrain_slot(terrain)] > best {
                best = counts[terrain_slot(terrain)];
                dominant = terrain;
            }
        }

        PathProfile {
            exponent: exponent_sum / (steps + 1) as f64,
            dominant,
        }
    }

    /// Mean path loss exponent of the cells between `a` and `b`.
    pub fn mean_path_loss_exponent(&self, a: GridPos, b: GridPos) -> f64 {
        self.path_profile(a, b).exponent
    }

    /// Most frequent terrain between `a` and `b`.
    pub fn dominant_terrain(&self, a: GridPos, b: GridPos) -> Terrain {
        self.path_profile(a, b).dominant
    }
}

fn cells_for(length_m: u32, cell_size: u32) -> u32 {
    length_m.div_ceil(cell_size).max(1)
}

fn clamp_cell(coord: i32, cell_size: u32, cells: u32) -> u32 {
    if coord <= 0 {
        return 0;
    }
    ((coord as u32) / cell_size).min(cells - 1)
}

fn terrain_slot(terrain: Terrain) -> usize {
    match terrain {
        Terrain::Forest => 0,
        Terrain::Plain => 1,
        Terrain::City => 2,
    }
}
