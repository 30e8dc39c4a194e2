use std::collections::HashMap;

use rand::RngCore;
use rand::seq::IndexedRandom;
use thiserror::Error;

use crate::infra::{Bounds, Coordinate};

/// Read-only view on the dungeon that movement is resolved against.
pub trait Level {
    fn is_accessible(&self, coord: Coordinate) -> bool;

    /// Accessible coordinates, in a stable order.
    fn floor_tiles(&self) -> Vec<Coordinate>;

    fn goal(&self) -> Option<Coordinate> {
        None
    }

    fn random_floor_tile(&self, rng: &mut dyn RngCore) -> Option<Coordinate> {
        self.floor_tiles().choose(rng).copied()
    }

    /// Bounds of the observation space: every accessible coordinate lies inside.
    fn state_bounds(&self) -> Option<Bounds> {
        Bounds::enclosing(self.floor_tiles())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tile {
    Wall,
    Floor,
    Goal,
}

impl Tile {
    pub fn is_accessible(self) -> bool {
        matches!(self, Tile::Floor | Tile::Goal)
    }
}

#[derive(Debug, Error)]
pub enum LevelError {
    #[error("unknown tile '{ch}' at line {line}, column {column}")]
    UnknownTile { ch: char, line: usize, column: usize },
    #[error("level has no accessible tiles")]
    NoFloor,
    #[error("level has more than one goal tile")]
    MultipleGoals,
}

/// Tile grid keyed by coordinate. Missing cells are void and never accessible.
#[derive(Clone, Debug)]
pub struct GridMap {
    pub width: i32,
    pub height: i32,
    tiles: HashMap<Coordinate, Tile>,
    goal: Option<Coordinate>,
    starts: Vec<Coordinate>,
}

impl GridMap {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            tiles: HashMap::new(),
            goal: None,
            starts: Vec::new(),
        }
    }

    /// Parse an ASCII level: `#` wall, `.` floor, `G` goal, `S` floor with a
    /// start marker, space for void. The first line is the top row, i.e. the
    /// highest `y`, so North (+y) points up on screen. Blank lines before and
    /// after the level are ignored; blank lines inside it are void rows.
    pub fn from_ascii(text: &str) -> Result<Self, LevelError> {
        let mut lines: Vec<&str> = text.lines().map(|l| l.trim_end()).collect();
        while lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        let first = lines.iter().position(|l| !l.is_empty()).unwrap_or(lines.len());
        let lines = &lines[first..];

        let height = lines.len() as i32;
        let width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0) as i32;
        let mut map = GridMap::new(width, height);

        for (row, line) in lines.iter().enumerate() {
            let y = height - 1 - row as i32;
            for (column, ch) in line.chars().enumerate() {
                let coord = Coordinate::new(column as i32, y);
                let tile = match ch {
                    '#' => Tile::Wall,
                    '.' => Tile::Floor,
                    'S' => {
                        map.starts.push(coord);
                        Tile::Floor
                    }
                    'G' => {
                        if map.goal.replace(coord).is_some() {
                            return Err(LevelError::MultipleGoals);
                        }
                        Tile::Goal
                    }
                    ' ' => continue,
                    _ => {
                        return Err(LevelError::UnknownTile {
                            ch,
                            line: row + 1,
                            column: column + 1,
                        });
                    }
                };
                map.tiles.insert(coord, tile);
            }
        }

        if !map.tiles.values().any(|t| t.is_accessible()) {
            return Err(LevelError::NoFloor);
        }
        Ok(map)
    }

    pub fn get(&self, coord: &Coordinate) -> Option<&Tile> {
        self.tiles.get(coord)
    }

    /// Tiles marked `S` in the source text.
    pub fn start_tiles(&self) -> &[Coordinate] {
        &self.starts
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Render the map top row first, with `@` for every occupied coordinate.
    pub fn draw_ascii_map(&self, actors: &[Coordinate]) -> String {
        let mut output = String::new();
        for y in (0..self.height).rev() {
            for x in 0..self.width {
                let coord = Coordinate::new(x, y);
                let ch = if actors.contains(&coord) {
                    '@'
                } else {
                    match self.tiles.get(&coord) {
                        Some(Tile::Wall) => '#',
                        Some(Tile::Floor) => '.',
                        Some(Tile::Goal) => 'G',
                        None => ' ',
                    }
                };
                output.push(ch);
            }
            output.push('\n');
        }
        output
    }
}

impl Level for GridMap {
    fn is_accessible(&self, coord: Coordinate) -> bool {
        self.tiles.get(&coord).is_some_and(|t| t.is_accessible())
    }

    fn floor_tiles(&self) -> Vec<Coordinate> {
        let mut tiles: Vec<Coordinate> = self
            .tiles
            .iter()
            .filter(|(_, t)| t.is_accessible())
            .map(|(c, _)| *c)
            .collect();
        tiles.sort();
        tiles
    }

    fn goal(&self) -> Option<Coordinate> {
        self.goal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const LEVEL: &str = "\
#####
#S.G#
#.#.#
#####
";

    #[test]
    fn test_parse_ascii_level() {
        let map = GridMap::from_ascii(LEVEL).unwrap();
        assert_eq!(map.width, 5);
        assert_eq!(map.height, 4);

        // First line is the top row (y = 3)
        assert_eq!(map.get(&Coordinate::new(0, 3)), Some(&Tile::Wall));
        assert_eq!(map.goal(), Some(Coordinate::new(3, 2)));
        assert_eq!(map.start_tiles(), &[Coordinate::new(1, 2)]);
        assert!(map.is_accessible(Coordinate::new(1, 1)));
        assert!(!map.is_accessible(Coordinate::new(2, 1)));
        assert!(!map.is_accessible(Coordinate::new(40, 40)));
    }

    #[test]
    fn test_parse_rejects_unknown_tiles() {
        let err = GridMap::from_ascii("#.x#").unwrap_err();
        assert!(matches!(err, LevelError::UnknownTile { ch: 'x', line: 1, column: 3 }));
        assert!(matches!(GridMap::from_ascii("###"), Err(LevelError::NoFloor)));
        assert!(matches!(GridMap::from_ascii("#GG#"), Err(LevelError::MultipleGoals)));
    }

    #[test]
    fn test_random_floor_tile_is_accessible() {
        let map = GridMap::from_ascii(LEVEL).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let coord = map.random_floor_tile(&mut rng).unwrap();
            assert!(map.is_accessible(coord));
        }
    }

    #[test]
    fn test_state_bounds_cover_floor() {
        let map = GridMap::from_ascii(LEVEL).unwrap();
        let bounds = map.state_bounds().unwrap();
        assert_eq!(bounds, Bounds { min_x: 1, max_x: 3, min_y: 1, max_y: 2 });
    }

    #[test]
    fn test_void_row_is_preserved() {
        let map = GridMap::from_ascii("\n###\n#.#\n   \n#G#\n###\n\n").unwrap();
        assert_eq!(map.height, 5);
        assert_eq!(map.goal(), Some(Coordinate::new(1, 1)));
        assert!(map.is_accessible(Coordinate::new(1, 3)));
        assert!(!map.is_accessible(Coordinate::new(1, 2)));
        assert_eq!(map.draw_ascii_map(&[]), "###\n#.#\n   \n#G#\n###\n");

        let map = GridMap::from_ascii("#.#\n\n#G#").unwrap();
        assert_eq!(map.height, 3);
        assert_eq!(map.draw_ascii_map(&[]), "#.#\n   \n#G#\n");
    }

    #[test]
    fn test_draw_roundtrips_layout() {
        let map = GridMap::from_ascii(LEVEL).unwrap();
        let drawn = map.draw_ascii_map(&[Coordinate::new(1, 1)]);
        assert_eq!(drawn, "#####\n#..G#\n#@#.#\n#####\n");
    }
}
