use serde::Serialize;

/// Continuous actor position. Only the movement resolver (or a reset)
/// writes it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Grid cell this position falls into (truncation toward zero).
    pub fn to_coordinate(self) -> Coordinate {
        Coordinate::new(self.x as i32, self.y as i32)
    }

    pub fn offset(self, dx: f32, dy: f32) -> Position {
        Position::new(self.x + dx, self.y + dy)
    }
}

impl From<Coordinate> for Position {
    fn from(coord: Coordinate) -> Self {
        Position::new(coord.x as f32, coord.y as f32)
    }
}

/// Integer grid cell used for map queries. Always derived from the current
/// `Position`, never cached next to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Coordinate {
    pub x: i32,
    pub y: i32,
}

impl Coordinate {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Coordinate {
        Coordinate::new(self.x + dx, self.y + dy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub min_x: i32,
    pub max_x: i32,
    pub min_y: i32,
    pub max_y: i32,
}

impl Bounds {
    /// Smallest box containing every coordinate, `None` for an empty input.
    pub fn enclosing<I>(coords: I) -> Option<Self>
    where
        I: IntoIterator<Item = Coordinate>,
    {
        coords.into_iter().fold(None, |acc, c| {
            Some(match acc {
                None => Bounds {
                    min_x: c.x,
                    max_x: c.x,
                    min_y: c.y,
                    max_y: c.y,
                },
                Some(b) => Bounds {
                    min_x: b.min_x.min(c.x),
                    max_x: b.max_x.max(c.x),
                    min_y: b.min_y.min(c.y),
                    max_y: b.max_y.max(c.y),
                },
            })
        })
    }
}
