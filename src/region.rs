//! Claimed rectangles of the world plane

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::{rect_contains_point, rect_overlaps, Point, Rect};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegionId(u64);

impl RegionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    id: RegionId,
    rect: Rect,
}

impl Region {
    pub fn new(id: RegionId, rect: Rect) -> Self {
        Self { id, rect }
    }

    pub fn id(&self) -> RegionId {
        self.id
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn center(&self) -> Point {
        self.rect.center()
    }

    pub fn radius(&self) -> f64 {
        self.rect.radius()
    }

    pub fn contains(&self, point: Point) -> bool {
        rect_contains_point(&self.rect, point)
    }

    pub fn overlaps(&self, other: &Rect) -> bool {
        rect_overlaps(&self.rect, other)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (min, max) = (self.rect.min(), self.rect.max());
        write!(
            f,
            "{} [{}, {}] to [{}, {}]",
            self.id, min.x, min.z, max.x, max.z
        )
    }
}
