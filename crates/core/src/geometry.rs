//! Planar geometry of the scenery layout.
//!
//! Coordinates are expressed in layout units with the origin at the top left
//! corner, the X-axis pointing right and the Y-axis pointing down. They only
//! describe how the network is laid out; distances travelled by trains use
//! each item's real length instead.

use std::{
    fmt,
    ops::{Add, AddAssign, Sub},
    str::FromStr,
};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::RecordError;

/// A point of the scenery layout.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

impl Point {
    /// Build a point from its coordinates.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance_to(self, other: Point) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    /// Round both coordinates to the nearest multiple of `grid`. A
    /// non-positive grid leaves the point untouched.
    pub fn snapped(self, grid: f64) -> Self {
        if grid <= 0.0 {
            return self;
        }
        Self {
            x: (self.x / grid).round() * grid,
            y: (self.y / grid).round() * grid,
        }
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Point {
    fn add_assign(&mut self, rhs: Point) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Formats as `(x, y)` with coordinates truncated to integers, the form shown
/// in property editors.
impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x.trunc() as i64, self.y.trunc() as i64)
    }
}

static POINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\(?\s*([-+]?\d+(?:\.\d*)?)\s*,\s*([-+]?\d+(?:\.\d*)?)\s*\)?\s*$")
        .expect("failed to compile point regex")
});

impl FromStr for Point {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || RecordError::MalformedPoint(s.to_string());
        let caps = POINT_RE.captures(s).ok_or_else(malformed)?;
        let x = caps[1].parse::<f64>().map_err(|_| malformed())?;
        let y = caps[2].parse::<f64>().map_err(|_| malformed())?;
        Ok(Point::new(x, y))
    }
}

/// Axis-aligned rectangle, relative to an item's origin.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Horizontal extent.
    pub width: f64,
    /// Vertical extent.
    pub height: f64,
}

impl Rect {
    /// Build a rectangle from its top-left corner and size.
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}
