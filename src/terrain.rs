//! World collaborators: terrain sampling and beacon scanning

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::geometry::{rect_contains_point, Point, Rect};
use crate::territory::TeamId;

/// Read-only view of the host world's terrain.
pub trait TerrainQuery: Send + Sync {
    /// Liquid in the topmost block of the column.
    fn is_liquid_at(&self, x: i32, z: i32) -> bool;
    fn highest_solid_y(&self, x: i32, z: i32) -> i32;

    /// Liquid in the block just under the top one.
    fn is_liquid_below_surface(&self, _x: i32, _z: i32) -> bool {
        false
    }
}

impl<T: TerrainQuery + ?Sized> TerrainQuery for Arc<T> {
    fn is_liquid_at(&self, x: i32, z: i32) -> bool {
        (**self).is_liquid_at(x, z)
    }

    fn highest_solid_y(&self, x: i32, z: i32) -> i32 {
        (**self).highest_solid_y(x, z)
    }

    fn is_liquid_below_surface(&self, x: i32, z: i32) -> bool {
        (**self).is_liquid_below_surface(x, z)
    }
}

/// Dry land at a constant height.
#[derive(Debug, Clone, Copy)]
pub struct FlatTerrain {
    pub surface_y: i32,
}

impl Default for FlatTerrain {
    fn default() -> Self {
        Self { surface_y: 64 }
    }
}

impl TerrainQuery for FlatTerrain {
    fn is_liquid_at(&self, _x: i32, _z: i32) -> bool {
        false
    }

    fn highest_solid_y(&self, _x: i32, _z: i32) -> i32 {
        self.surface_y
    }
}

/// Flat terrain with rectangular pools of liquid. `buried` pools sit one
/// block under a solid crust.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiquidMask {
    #[serde(default)]
    pub surface_y: i32,
    #[serde(default)]
    pub pools: Vec<Rect>,
    #[serde(default)]
    pub buried: Vec<Rect>,
}

impl LiquidMask {
    pub fn new(surface_y: i32) -> Self {
        Self {
            surface_y,
            pools: Vec::new(),
            buried: Vec::new(),
        }
    }

    pub fn with_pool(mut self, pool: Rect) -> Self {
        self.pools.push(pool);
        self
    }

    pub fn with_buried_pool(mut self, pool: Rect) -> Self {
        self.buried.push(pool);
        self
    }
}

impl TerrainQuery for LiquidMask {
    fn is_liquid_at(&self, x: i32, z: i32) -> bool {
        let p = Point::new(x as f64, z as f64);
        self.pools.iter().any(|pool| rect_contains_point(pool, p))
    }

    fn highest_solid_y(&self, x: i32, z: i32) -> i32 {
        if self.is_liquid_at(x, z) {
            self.surface_y - 1
        } else {
            self.surface_y
        }
    }

    fn is_liquid_below_surface(&self, x: i32, z: i32) -> bool {
        let p = Point::new(x as f64, z as f64);
        self.buried.iter().any(|pool| rect_contains_point(pool, p))
    }
}

/// A beacon discovered by walking the host world.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedBeacon {
    pub point: Point,
    pub owner: Option<TeamId>,
}

/// Recovery path used when stored beacons are missing: reports every beacon
/// physically present inside an area.
pub trait BeaconScan {
    fn scan(&self, area: &Rect) -> Vec<ScannedBeacon>;
}

/// Scan results held in memory, for tests and scripted runs.
#[derive(Debug, Clone, Default)]
pub struct StaticScan {
    pub beacons: Vec<ScannedBeacon>,
}

impl BeaconScan for StaticScan {
    fn scan(&self, area: &Rect) -> Vec<ScannedBeacon> {
        self.beacons
            .iter()
            .filter(|b| rect_contains_point(area, b.point))
            .cloned()
            .collect()
    }
}
