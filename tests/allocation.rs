use std::sync::Arc;

use beaconfield::{
    allocator::{RegionAllocator, SafetyCheck},
    config::Settings,
    geometry::{rect_overlaps, Point, Rect},
    terrain::{FlatTerrain, LiquidMask},
};

fn flat_allocator(settings: &Settings) -> RegionAllocator {
    let mut alloc = RegionAllocator::new(settings, Arc::new(FlatTerrain::default()));
    alloc.create_lobby(
        Point::new(settings.lobby.x as f64, settings.lobby.z as f64),
        settings.lobby.radius as f64,
    );
    alloc
}

#[test]
fn first_game_lands_north_of_the_world_centre() {
    let settings = Settings::default();
    let mut alloc = flat_allocator(&settings);
    let region = alloc
        .allocate(1000.0, Some(&SafetyCheck::from(&settings)))
        .expect("flat world has room");
    assert_eq!(region.center(), Point::new(2000.0, 3008.0));
    let lobby = alloc.lobby().unwrap();
    assert!(!rect_overlaps(&region.rect(), &lobby.rect()));
}

#[test]
fn many_regions_never_overlap_and_stay_on_the_chunk_grid() {
    let settings = Settings::default();
    let mut alloc = flat_allocator(&settings);
    let mut games = Vec::new();
    for _ in 0..25 {
        let region = alloc
            .allocate(settings.game_radius(), Some(&SafetyCheck::from(&settings)))
            .expect("flat world has room");
        let (min, max) = (region.rect().min(), region.rect().max());
        for v in [min.x, min.z, max.x, max.z] {
            assert_eq!(v % 16.0, 0.0, "corner {v} is off the chunk grid");
        }
        games.push(region);
    }
    assert_eq!(alloc.regions().count(), 26);
    for (i, a) in games.iter().enumerate() {
        for b in &games[i + 1..] {
            assert!(!rect_overlaps(&a.rect(), &b.rect()), "{a} overlaps {b}");
        }
    }
}

#[test]
fn strict_free_check_keeps_the_lobby_clear() {
    let mut settings = Settings::default();
    settings.world.strict_free_check = true;
    let mut alloc = flat_allocator(&settings);
    for _ in 0..25 {
        alloc
            .allocate(settings.game_radius(), None)
            .expect("flat world has room");
    }
    assert!(alloc.check_overlaps().is_ok());
}

#[test]
fn unsafe_neighbours_fall_through_to_the_next_side() {
    let mut settings = Settings::default();
    settings.world.center_x = 0;
    settings.world.center_z = 0;
    settings.world.game_distance = 128;
    let north = Rect::from_corners(Point::new(-64.0, 64.0), Point::new(64.0, 192.0));
    let east = Rect::from_corners(Point::new(64.0, -64.0), Point::new(192.0, 64.0));
    let terrain = LiquidMask::new(62).with_pool(north).with_pool(east);
    let mut alloc = RegionAllocator::new(&settings, Arc::new(terrain));
    alloc.create_lobby(Point::new(5000.0, 5000.0), 32.0);

    let region = alloc
        .allocate(settings.game_radius(), Some(&SafetyCheck::from(&settings)))
        .unwrap();
    assert_eq!(region.center(), Point::new(0.0, -64.0));
}

#[test]
fn allocation_gives_up_when_everything_is_liquid() {
    let mut settings = Settings::default();
    settings.world.game_distance = 128;
    settings.world.random_probes = 3;
    let ocean = Rect::from_corners(Point::new(-1.0e7, -1.0e7), Point::new(1.0e7, 1.0e7));
    let mut alloc = RegionAllocator::new(&settings, Arc::new(LiquidMask::new(62).with_pool(ocean)));
    alloc.create_lobby(Point::new(0.0, 0.0), 32.0);
    assert!(alloc
        .allocate(settings.game_radius(), Some(&SafetyCheck::from(&settings)))
        .is_none());
    assert_eq!(alloc.regions().count(), 1);
    assert!(alloc.allocate(settings.game_radius(), None).is_some());
}

#[test]
fn random_fallback_is_seeded() {
    let place = |seed: u64| {
        let mut settings = Settings::default();
        settings.seed = seed;
        settings.world.game_distance = 128;
        settings.world.center_x = 0;
        settings.world.center_z = 0;
        let centre = Rect::from_corners(Point::new(-300.0, -300.0), Point::new(300.0, 300.0));
        let mut alloc =
            RegionAllocator::new(&settings, Arc::new(LiquidMask::new(62).with_pool(centre)));
        alloc.create_lobby(Point::new(-5000.0, -5000.0), 32.0);
        alloc
            .allocate(settings.game_radius(), Some(&SafetyCheck::from(&settings)))
            .map(|r| r.center())
    };
    let first = place(99).expect("random probes escape the pool");
    assert_eq!(place(99), Some(first));
    assert!(first.x.abs() > 300.0 || first.z.abs() > 300.0);
}
