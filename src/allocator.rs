//! Packing of non-overlapping, chunk-aligned game regions
//!
//! New regions are placed next to existing ones, probing the four axis
//! neighbours of each region in a fixed order (up, right, down, left). The
//! first game is placed next to the configured world centre. When every
//! neighbour is taken or unsafe, a bounded number of random seeds are tried.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::InvariantViolation;
use crate::geometry::{rect_contains_point, rect_overlaps, snap_to_chunk, Point, Rect};
use crate::region::{Region, RegionId};
use crate::rng::{RngStreams, ALLOCATOR_STREAM};
use crate::terrain::TerrainQuery;

/// Terrain safety thresholds for a candidate region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyCheck {
    /// Candidates at or above this fraction of liquid samples are refused.
    pub max_unsafe_fraction: f64,
    /// Regions with a larger radius are not sampled and count as safe.
    pub sample_radius_cap: f64,
}

impl Default for SafetyCheck {
    fn default() -> Self {
        Self {
            max_unsafe_fraction: 0.4,
            sample_radius_cap: 128.0,
        }
    }
}

impl From<&Settings> for SafetyCheck {
    fn from(settings: &Settings) -> Self {
        Self {
            max_unsafe_fraction: settings.safety.max_unsafe_fraction,
            sample_radius_cap: settings.safety.sample_radius_cap,
        }
    }
}

pub struct RegionAllocator {
    regions: BTreeMap<RegionId, Region>,
    lobby: Option<RegionId>,
    next_id: u64,
    terrain: Arc<dyn TerrainQuery>,
    rng: RngStreams,
    world_center: Point,
    chunk: f64,
    margin: f64,
    random_probes: u32,
    random_span: u32,
    strict_free_check: bool,
}

impl RegionAllocator {
    pub fn new(settings: &Settings, terrain: Arc<dyn TerrainQuery>) -> Self {
        Self {
            regions: BTreeMap::new(),
            lobby: None,
            next_id: 0,
            terrain,
            rng: RngStreams::new(settings.seed),
            world_center: Point::new(settings.world.center_x as f64, settings.world.center_z as f64),
            chunk: settings.chunk(),
            margin: settings.world.region_margin as f64,
            random_probes: settings.world.random_probes,
            random_span: settings.world.game_distance.saturating_mul(100).max(1),
            strict_free_check: settings.world.strict_free_check,
        }
    }

    pub fn terrain(&self) -> &Arc<dyn TerrainQuery> {
        &self.terrain
    }

    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.values()
    }

    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(&id)
    }

    pub fn lobby(&self) -> Option<&Region> {
        self.lobby.and_then(|id| self.regions.get(&id))
    }

    pub fn is_lobby(&self, id: RegionId) -> bool {
        self.lobby == Some(id)
    }

    fn game_regions(&self) -> impl Iterator<Item = &Region> {
        let lobby = self.lobby;
        self.regions.values().filter(move |r| Some(r.id()) != lobby)
    }

    fn insert(&mut self, rect: Rect) -> Region {
        let region = Region::new(RegionId::new(self.next_id), rect);
        self.next_id += 1;
        self.regions.insert(region.id(), region);
        region
    }

    /// Claims the lobby at `center`. If the area is taken the radius shrinks
    /// one chunk at a time; below one chunk a single-chunk lobby at the
    /// origin is used.
    pub fn create_lobby(&mut self, center: Point, radius: f64) -> Region {
        if let Some(old) = self.lobby.take() {
            self.regions.remove(&old);
        }
        let mut rad = radius;
        if !self.is_free(&Rect::around(center, rad)) {
            warn!(x = center.x, z = center.z, radius, "lobby area is not free, shrinking");
            rad -= self.chunk;
            while rad > 0.0 && !self.is_free(&Rect::around(center, rad)) {
                rad -= self.chunk;
            }
        }
        let rect = if rad >= self.chunk {
            Rect::around(center, rad)
        } else {
            warn!("no free lobby area of at least one chunk, using origin");
            Rect::around(Point::new(0.0, 0.0), self.chunk / 2.0)
        };
        let lobby = self.insert(rect);
        self.lobby = Some(lobby.id());
        info!(region = %lobby, "lobby created");
        lobby
    }

    /// Finds, claims and returns a free region of `radius`. `None` when every
    /// probe fails; nothing is claimed in that case.
    pub fn allocate(&mut self, radius: f64, safety: Option<&SafetyCheck>) -> Option<Region> {
        let radius = snap_to_chunk(radius, self.chunk);
        let Some(center) = self.find_location(radius, safety) else {
            warn!(radius, "no free region location found");
            return None;
        };
        let region = self.insert(self.candidate(center, radius));
        info!(%region, "region allocated");
        Some(region)
    }

    /// Centre of the first acceptable candidate, without claiming it.
    pub fn find_location(&mut self, radius: f64, safety: Option<&SafetyCheck>) -> Option<Point> {
        let seeds: Vec<(Point, f64)> = if self.game_regions().next().is_none() {
            vec![(self.world_center, radius)]
        } else {
            self.game_regions()
                .map(|r| (r.center(), r.radius() + self.margin + radius))
                .collect()
        };
        for (center, distance) in seeds {
            if let Some(found) = self.good_neighbor(center, distance, radius, safety) {
                return Some(found);
            }
        }
        for attempt in 0..self.random_probes {
            let r = self.rng.stream(ALLOCATOR_STREAM).gen_range(0..self.random_span) as f64;
            debug!(attempt, seed = r, "random region probe");
            if let Some(found) = self.good_neighbor(Point::new(r, r), radius, radius, safety) {
                return Some(found);
            }
        }
        None
    }

    /// Probes up, right, down and left of `center` at `distance`, returning
    /// the first candidate that is free and safe.
    pub fn good_neighbor(
        &self,
        center: Point,
        distance: f64,
        radius: f64,
        safety: Option<&SafetyCheck>,
    ) -> Option<Point> {
        let (x, z) = (
            snap_to_chunk(center.x, self.chunk),
            snap_to_chunk(center.z, self.chunk),
        );
        let probes = [
            Point::new(x, snap_to_chunk(z + distance, self.chunk)),
            Point::new(snap_to_chunk(x + distance, self.chunk), z),
            Point::new(x, snap_to_chunk(z - distance, self.chunk)),
            Point::new(snap_to_chunk(x - distance, self.chunk), z),
        ];
        probes.into_iter().find(|&probe| {
            self.is_free(&self.candidate(probe, radius))
                && safety.map_or(true, |check| self.is_safe(probe, radius, check))
        })
    }

    fn candidate(&self, center: Point, radius: f64) -> Rect {
        Rect::around(center, radius).snapped(self.chunk)
    }

    /// True when no corner of `rect` lies inside a claimed region. A claimed
    /// region strictly inside `rect` goes unnoticed unless the strict check
    /// is enabled.
    pub fn is_free(&self, rect: &Rect) -> bool {
        let corners = rect.corners();
        self.regions.values().all(|region| {
            let claimed = region.rect();
            let hit = corners.iter().any(|&c| rect_contains_point(&claimed, c))
                || (self.strict_free_check && rect_overlaps(&claimed, rect));
            !hit
        })
    }

    /// Samples liquid on the block grid covering the area. A column is unsafe
    /// when its top block or the block under it is liquid. Radii above the
    /// sampling cap are not sampled.
    pub fn is_safe(&self, center: Point, radius: f64, check: &SafetyCheck) -> bool {
        if radius > check.sample_radius_cap {
            return true;
        }
        let min_x = snap_to_chunk(center.x - radius, self.chunk) as i32;
        let max_x = snap_to_chunk(center.x + radius, self.chunk) as i32;
        let min_z = snap_to_chunk(center.z - radius, self.chunk) as i32;
        let max_z = snap_to_chunk(center.z + radius, self.chunk) as i32;
        let mut total = 0u64;
        let mut unsafe_blocks = 0u64;
        for x in min_x..=max_x {
            for z in min_z..=max_z {
                total += 1;
                if self.terrain.is_liquid_at(x, z) || self.terrain.is_liquid_below_surface(x, z) {
                    unsafe_blocks += 1;
                }
            }
        }
        if total == 0 {
            return true;
        }
        let fraction = unsafe_blocks as f64 / total as f64;
        debug!(x = center.x, z = center.z, radius, fraction, "area safety sampled");
        fraction < check.max_unsafe_fraction
    }

    /// Frees a game region. The lobby cannot be released.
    pub fn release(&mut self, id: RegionId) -> Option<Region> {
        if self.is_lobby(id) {
            return None;
        }
        let region = self.regions.remove(&id)?;
        info!(%region, "region released");
        Some(region)
    }

    /// Re-claims a stored region under its stored identity.
    pub fn restore(&mut self, id: RegionId, rect: Rect, lobby: bool) -> Region {
        let region = Region::new(id, rect);
        self.next_id = self.next_id.max(id.raw() + 1);
        self.regions.insert(id, region);
        if lobby {
            self.lobby = Some(id);
        }
        region
    }

    pub fn region_at(&self, point: Point) -> Option<&Region> {
        self.regions.values().find(|r| r.contains(point))
    }

    /// Pairwise overlap scan over every claimed region.
    pub fn check_overlaps(&self) -> Result<(), InvariantViolation> {
        let all: Vec<&Region> = self.regions.values().collect();
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                if rect_overlaps(&a.rect(), &b.rect()) {
                    return Err(InvariantViolation::RegionOverlap(a.id(), b.id()));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::{FlatTerrain, LiquidMask};

    fn allocator(terrain: Arc<dyn TerrainQuery>) -> RegionAllocator {
        RegionAllocator::new(&Settings::default(), terrain)
    }

    #[test]
    fn first_region_goes_north_of_world_center() {
        let mut alloc = allocator(Arc::new(FlatTerrain::default()));
        alloc.create_lobby(Point::new(0.0, 0.0), 32.0);
        let region = alloc
            .allocate(1000.0, Some(&SafetyCheck::default()))
            .unwrap();
        assert_eq!(region.center(), Point::new(2000.0, 3008.0));
        assert_eq!(region.radius(), 1008.0);
        assert!(alloc.check_overlaps().is_ok());
    }

    #[test]
    fn neighbours_probe_up_right_down_left() {
        let mut alloc = allocator(Arc::new(FlatTerrain::default()));
        alloc.create_lobby(Point::new(0.0, 0.0), 32.0);
        let first = alloc.allocate(1008.0, None).unwrap();
        let second = alloc.allocate(1008.0, None).unwrap();
        let third = alloc.allocate(1008.0, None).unwrap();
        let spacing = 1008.0 + 16.0 + 1008.0;
        assert_eq!(second.center(), Point::new(2000.0, 3008.0 + spacing));
        assert_eq!(third.center(), Point::new(2000.0 + spacing, first.center().z));
        assert!(alloc.check_overlaps().is_ok());
    }

    #[test]
    fn liquid_candidate_is_skipped() {
        let pool = Rect::from_corners(Point::new(-200.0, 40.0), Point::new(200.0, 400.0));
        let terrain = LiquidMask::new(64).with_pool(pool);
        let mut settings = Settings::default();
        settings.world.center_x = 0;
        settings.world.center_z = 0;
        let mut alloc = RegionAllocator::new(&settings, Arc::new(terrain));
        alloc.create_lobby(Point::new(-1000.0, -1000.0), 32.0);
        let region = alloc.allocate(64.0, Some(&SafetyCheck::default())).unwrap();
        assert_eq!(region.center(), Point::new(64.0, 0.0));
    }

    #[test]
    fn liquid_under_a_crust_is_unsafe() {
        let pool = Rect::from_corners(Point::new(-200.0, 40.0), Point::new(200.0, 400.0));
        let terrain = LiquidMask::new(64).with_buried_pool(pool);
        let mut settings = Settings::default();
        settings.world.center_x = 0;
        settings.world.center_z = 0;
        let mut alloc = RegionAllocator::new(&settings, Arc::new(terrain));
        alloc.create_lobby(Point::new(-1000.0, -1000.0), 32.0);
        let region = alloc.allocate(64.0, Some(&SafetyCheck::default())).unwrap();
        assert_eq!(region.center(), Point::new(64.0, 0.0));
    }

    #[test]
    fn lobby_shrinks_then_falls_back() {
        let mut alloc = allocator(Arc::new(FlatTerrain::default()));
        alloc.restore(RegionId::new(10), Rect::around(Point::new(50.0, 50.0), 20.0), false);
        let lobby = alloc.create_lobby(Point::new(0.0, 0.0), 64.0);
        assert_eq!(lobby.radius(), 16.0);

        let mut alloc = allocator(Arc::new(FlatTerrain::default()));
        alloc.restore(RegionId::new(10), Rect::around(Point::new(0.0, 0.0), 500.0), false);
        let lobby = alloc.create_lobby(Point::new(0.0, 0.0), 64.0);
        assert_eq!(lobby.rect(), Rect::around(Point::new(0.0, 0.0), 8.0));
    }

    #[test]
    fn released_regions_free_their_space() {
        let mut alloc = allocator(Arc::new(FlatTerrain::default()));
        let lobby = alloc.create_lobby(Point::new(0.0, 0.0), 32.0);
        let region = alloc.allocate(1008.0, None).unwrap();
        assert!(alloc.release(lobby.id()).is_none());
        assert!(alloc.release(region.id()).is_some());
        let again = alloc.allocate(1008.0, None).unwrap();
        assert_eq!(again.center(), region.center());
    }

    #[test]
    fn corner_test_misses_contained_region() {
        let mut alloc = allocator(Arc::new(FlatTerrain::default()));
        alloc.restore(RegionId::new(0), Rect::around(Point::new(0.0, 0.0), 16.0), false);
        let big = Rect::around(Point::new(0.0, 0.0), 1000.0);
        assert!(alloc.is_free(&big));
        alloc.strict_free_check = true;
        assert!(!alloc.is_free(&big));
    }

    #[test]
    fn safety_ignores_large_radius() {
        let pool = Rect::from_corners(Point::new(-5000.0, -5000.0), Point::new(5000.0, 5000.0));
        let alloc = allocator(Arc::new(LiquidMask::new(64).with_pool(pool)));
        let check = SafetyCheck::default();
        assert!(!alloc.is_safe(Point::new(0.0, 0.0), 64.0, &check));
        assert!(alloc.is_safe(Point::new(0.0, 0.0), 512.0, &check));
    }
}
