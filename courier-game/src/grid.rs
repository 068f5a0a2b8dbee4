//! City grid model: terrain, walkability and per-cell surface weights
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Grid coordinate. `x` grows east, `y` grows south.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub const fn manhattan(self, other: Self) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    #[must_use]
    pub const fn chebyshev(self, other: Self) -> u32 {
        let dx = self.x.abs_diff(other.x);
        let dy = self.y.abs_diff(other.y);
        if dx > dy { dx } else { dy }
    }

    /// True when `other` is this cell or one of its four orthogonal neighbours.
    #[must_use]
    pub const fn within_reach(self, other: Self) -> bool {
        self.manhattan(other) <= 1
    }

    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Orthogonal neighbours in north, south, west, east order.
    #[must_use]
    pub const fn orthogonal(self) -> [Self; 4] {
        [
            self.offset(0, -1),
            self.offset(0, 1),
            self.offset(-1, 0),
            self.offset(1, 0),
        ]
    }
}

impl From<[i32; 2]> for Cell {
    fn from([x, y]: [i32; 2]) -> Self {
        Self::new(x, y)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Terrain class of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Terrain {
    #[default]
    Street,
    Park,
    Building,
}

impl Terrain {
    /// Map a tile code to its terrain. Unknown codes are treated as street.
    #[must_use]
    pub const fn from_code(code: char) -> Self {
        match code {
            'B' => Self::Building,
            'P' => Self::Park,
            _ => Self::Street,
        }
    }

    #[must_use]
    pub const fn is_walkable(self) -> bool {
        !matches!(self, Self::Building)
    }

    /// Parks let resting couriers recover stamina faster.
    #[must_use]
    pub const fn is_recovery(self) -> bool {
        matches!(self, Self::Park)
    }
}

/// Legend entry for a single tile code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LegendEntry {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub surface_weight: Option<f64>,
}

/// One row of tiles, either `"CCBP"` or `["C", "C", "B", "P"]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TileRow {
    Text(String),
    Codes(Vec<String>),
}

impl TileRow {
    fn codes(&self) -> Vec<char> {
        match self {
            Self::Text(text) => text.chars().collect(),
            Self::Codes(codes) => codes
                .iter()
                .map(|code| code.chars().next().unwrap_or('C'))
                .collect(),
        }
    }
}

/// Map feed as delivered by the city data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MapFeed {
    #[serde(default)]
    pub width: Option<usize>,
    #[serde(default)]
    pub height: Option<usize>,
    #[serde(default)]
    pub tiles: Vec<TileRow>,
    #[serde(default)]
    pub legend: BTreeMap<String, LegendEntry>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub max_time: Option<f64>,
    #[serde(default)]
    pub goal: Option<f64>,
}

impl MapFeed {
    /// Parse a map feed, accepting either the bare object or a `{"data": ...}` envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or does not describe a map.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        crate::data::parse_feed(json)
    }

    /// Built-in demo city used when no map feed is supplied to the tester.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedded asset is malformed.
    pub fn demo_city() -> Result<Self, serde_json::Error> {
        Self::from_json(include_str!("../assets/city.json"))
    }
}

/// Errors raised while building a grid from map data.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridError {
    #[error("map has no tiles")]
    Empty,
    #[error("row {row} has {found} tiles, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error(
        "declared size {declared_width}x{declared_height} does not match tiles {width}x{height}"
    )]
    DimensionMismatch {
        declared_width: usize,
        declared_height: usize,
        width: usize,
        height: usize,
    },
    #[error("map dimension {0} is too large")]
    TooLarge(usize),
}

/// Immutable city grid.
#[derive(Debug, Clone, PartialEq)]
pub struct CityGrid {
    width: i32,
    height: i32,
    terrain: Vec<Terrain>,
    weights: Vec<f64>,
}

impl CityGrid {
    /// Build a grid from a map feed.
    ///
    /// # Errors
    ///
    /// Returns [`GridError`] when the tiles are empty, ragged or disagree with
    /// the declared dimensions.
    pub fn from_feed(feed: &MapFeed) -> Result<Self, GridError> {
        let rows: Vec<Vec<char>> = feed.tiles.iter().map(TileRow::codes).collect();
        let grid = Self::build(&rows, &feed.legend)?;
        let (width, height) = (grid.width_usize(), grid.height_usize());
        let declared_width = feed.width.unwrap_or(width);
        let declared_height = feed.height.unwrap_or(height);
        if declared_width != width || declared_height != height {
            return Err(GridError::DimensionMismatch {
                declared_width,
                declared_height,
                width,
                height,
            });
        }
        Ok(grid)
    }

    /// Build a grid from text rows with every surface weight at 1.0.
    ///
    /// # Errors
    ///
    /// Returns [`GridError`] when the rows are empty or ragged.
    pub fn from_rows<S: AsRef<str>>(rows: &[S]) -> Result<Self, GridError> {
        Self::with_legend(rows, &BTreeMap::new())
    }

    /// Build a grid from text rows and a legend of surface weights.
    ///
    /// # Errors
    ///
    /// Returns [`GridError`] when the rows are empty or ragged.
    pub fn with_legend<S: AsRef<str>>(
        rows: &[S],
        legend: &BTreeMap<String, LegendEntry>,
    ) -> Result<Self, GridError> {
        let rows: Vec<Vec<char>> = rows.iter().map(|row| row.as_ref().chars().collect()).collect();
        Self::build(&rows, legend)
    }

    fn build(
        rows: &[Vec<char>],
        legend: &BTreeMap<String, LegendEntry>,
    ) -> Result<Self, GridError> {
        let width = rows.first().map_or(0, Vec::len);
        if rows.is_empty() || width == 0 {
            return Err(GridError::Empty);
        }
        if let Some((row, found)) = rows
            .iter()
            .enumerate()
            .map(|(idx, row)| (idx, row.len()))
            .find(|(_, len)| *len != width)
        {
            return Err(GridError::RaggedRow {
                row,
                expected: width,
                found,
            });
        }
        let grid_width = i32::try_from(width).map_err(|_| GridError::TooLarge(width))?;
        let grid_height = i32::try_from(rows.len()).map_err(|_| GridError::TooLarge(rows.len()))?;

        let mut terrain = Vec::with_capacity(width * rows.len());
        let mut weights = Vec::with_capacity(width * rows.len());
        for code in rows.iter().flatten().copied() {
            terrain.push(Terrain::from_code(code));
            weights.push(legend_weight(legend, code));
        }

        Ok(Self {
            width: grid_width,
            height: grid_height,
            terrain,
            weights,
        })
    }

    #[must_use]
    pub const fn width(&self) -> i32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> i32 {
        self.height
    }

    fn width_usize(&self) -> usize {
        self.terrain.len() / self.height_usize()
    }

    const fn height_usize(&self) -> usize {
        self.height.unsigned_abs() as usize
    }

    #[must_use]
    pub const fn contains(&self, cell: Cell) -> bool {
        cell.x >= 0 && cell.y >= 0 && cell.x < self.width && cell.y < self.height
    }

    fn index(&self, cell: Cell) -> Option<usize> {
        if !self.contains(cell) {
            return None;
        }
        let x = usize::try_from(cell.x).ok()?;
        let y = usize::try_from(cell.y).ok()?;
        Some(y * self.width_usize() + x)
    }

    #[must_use]
    pub fn terrain_at(&self, cell: Cell) -> Option<Terrain> {
        self.index(cell).map(|idx| self.terrain[idx])
    }

    /// False outside the grid and on buildings.
    #[must_use]
    pub fn is_walkable(&self, cell: Cell) -> bool {
        self.terrain_at(cell).is_some_and(Terrain::is_walkable)
    }

    /// Surface weight of a cell; 1.0 outside the grid or for codes missing from the legend.
    #[must_use]
    pub fn surface_weight_at(&self, cell: Cell) -> f64 {
        self.index(cell).map_or(1.0, |idx| self.weights[idx])
    }

    #[must_use]
    pub fn is_recovery_tile(&self, cell: Cell) -> bool {
        self.terrain_at(cell).is_some_and(Terrain::is_recovery)
    }

    #[must_use]
    pub fn walkable_neighbors(&self, cell: Cell) -> SmallVec<[Cell; 4]> {
        cell.orthogonal()
            .into_iter()
            .filter(|next| self.is_walkable(*next))
            .collect()
    }

    /// All cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        (0..self.height).flat_map(move |y| (0..self.width).map(move |x| Cell::new(x, y)))
    }

    pub fn walkable_cells(&self) -> impl Iterator<Item = Cell> + '_ {
        self.cells().filter(|cell| self.is_walkable(*cell))
    }

    /// Walkable cells orthogonally adjacent to at least one building, row-major.
    #[must_use]
    pub fn building_edges(&self) -> Vec<Cell> {
        self.walkable_cells()
            .filter(|cell| {
                cell.orthogonal()
                    .into_iter()
                    .any(|next| self.terrain_at(next) == Some(Terrain::Building))
            })
            .collect()
    }

    #[must_use]
    pub fn street_positions(&self) -> Vec<Cell> {
        self.cells()
            .filter(|cell| self.terrain_at(*cell) == Some(Terrain::Street))
            .collect()
    }

    /// Largest surface weight on any walkable cell.
    #[must_use]
    pub fn max_surface_weight(&self) -> f64 {
        self.walkable_cells()
            .map(|cell| self.surface_weight_at(cell))
            .fold(None, |best: Option<f64>, weight| {
                Some(best.map_or(weight, |b| b.max(weight)))
            })
            .unwrap_or(1.0)
    }
}

fn legend_weight(legend: &BTreeMap<String, LegendEntry>, code: char) -> f64 {
    let mut key = [0_u8; 4];
    let key = code.encode_utf8(&mut key);
    match legend.get(&*key).and_then(|entry| entry.surface_weight) {
        Some(weight) if weight.is_finite() && weight > 0.0 => weight,
        Some(weight) => {
            log::warn!("legend weight {weight} for tile '{code}' is invalid; using 1.0");
            1.0
        }
        None => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legend() -> BTreeMap<String, LegendEntry> {
        BTreeMap::from([
            (
                "C".to_string(),
                LegendEntry {
                    name: Some("street".into()),
                    surface_weight: Some(1.0),
                },
            ),
            (
                "P".to_string(),
                LegendEntry {
                    name: Some("park".into()),
                    surface_weight: Some(0.95),
                },
            ),
        ])
    }

    #[test]
    fn buildings_block_and_open_tiles_walk() {
        let grid = CityGrid::with_legend(&["CPB", "BCC"], &legend()).unwrap();
        for cell in grid.cells() {
            let terrain = grid.terrain_at(cell).unwrap();
            assert_eq!(grid.is_walkable(cell), terrain != Terrain::Building);
        }
        assert!(!grid.is_walkable(Cell::new(-1, 0)));
        assert!(!grid.is_walkable(Cell::new(3, 0)));
    }

    #[test]
    fn surface_weight_follows_legend_or_defaults() {
        let grid = CityGrid::with_legend(&["CPX"], &legend()).unwrap();
        assert!((grid.surface_weight_at(Cell::new(0, 0)) - 1.0).abs() < f64::EPSILON);
        assert!((grid.surface_weight_at(Cell::new(1, 0)) - 0.95).abs() < f64::EPSILON);
        assert!((grid.surface_weight_at(Cell::new(2, 0)) - 1.0).abs() < f64::EPSILON);
        assert!((grid.surface_weight_at(Cell::new(9, 9)) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn non_positive_legend_weights_are_sanitized() {
        let mut legend = legend();
        legend.insert(
            "C".into(),
            LegendEntry {
                name: None,
                surface_weight: Some(0.0),
            },
        );
        let grid = CityGrid::with_legend(&["C"], &legend).unwrap();
        assert!((grid.surface_weight_at(Cell::new(0, 0)) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_empty_and_ragged_maps() {
        let empty: [&str; 0] = [];
        assert_eq!(CityGrid::from_rows(&empty), Err(GridError::Empty));
        assert_eq!(
            CityGrid::from_rows(&["CCC", "CC"]),
            Err(GridError::RaggedRow {
                row: 1,
                expected: 3,
                found: 2
            })
        );
    }

    #[test]
    fn feed_dimensions_must_match_tiles() {
        let feed = MapFeed::from_json(
            r#"{"data": {"width": 4, "height": 1, "tiles": [["C","C","B"]], "legend": {}}}"#,
        )
        .unwrap();
        assert!(matches!(
            CityGrid::from_feed(&feed),
            Err(GridError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn building_edges_and_street_positions() {
        let grid = CityGrid::from_rows(&["CCC", "CBP", "CCC"]).unwrap();
        let edges = grid.building_edges();
        assert_eq!(
            edges,
            vec![
                Cell::new(1, 0),
                Cell::new(0, 1),
                Cell::new(2, 1),
                Cell::new(1, 2)
            ]
        );
        assert_eq!(grid.street_positions().len(), 7);
        assert!(grid.is_recovery_tile(Cell::new(2, 1)));
    }

    #[test]
    fn neighbors_skip_buildings_and_edges() {
        let grid = CityGrid::from_rows(&["CB", "CC"]).unwrap();
        let neighbors = grid.walkable_neighbors(Cell::new(0, 0));
        assert_eq!(neighbors.as_slice(), &[Cell::new(0, 1)]);
    }

    #[test]
    fn demo_city_loads() {
        let feed = MapFeed::demo_city().unwrap();
        let grid = CityGrid::from_feed(&feed).unwrap();
        assert!(grid.walkable_cells().count() > 50);
        assert!(!grid.building_edges().is_empty());
    }

    #[test]
    fn cell_distances() {
        let a = Cell::new(1, 1);
        let b = Cell::new(4, -1);
        assert_eq!(a.manhattan(b), 5);
        assert_eq!(a.chebyshev(b), 3);
        assert!(a.within_reach(Cell::new(1, 2)));
        assert!(!a.within_reach(Cell::new(2, 2)));
    }
}
