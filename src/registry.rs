//! Games by name and by the ground they stand on

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::allocator::{RegionAllocator, SafetyCheck};
use crate::config::Settings;
use crate::error::{GameError, InvariantViolation};
use crate::game::{Game, GameParams, PlayerId};
use crate::geometry::{Point, Rect};
use crate::region::{Region, RegionId};
use crate::terrain::TerrainQuery;

pub struct GameRegistry {
    settings: Settings,
    allocator: RegionAllocator,
    games: BTreeMap<String, Game>,
    by_region: BTreeMap<RegionId, String>,
}

impl GameRegistry {
    /// Empty registry with the configured lobby claimed.
    pub fn new(settings: &Settings, terrain: Arc<dyn TerrainQuery>) -> Self {
        let mut registry = Self::without_lobby(settings, terrain);
        let lobby = Point::new(settings.lobby.x as f64, settings.lobby.z as f64);
        registry
            .allocator
            .create_lobby(lobby, settings.lobby.radius as f64);
        registry
    }

    pub(crate) fn without_lobby(settings: &Settings, terrain: Arc<dyn TerrainQuery>) -> Self {
        Self {
            settings: settings.clone(),
            allocator: RegionAllocator::new(settings, terrain),
            games: BTreeMap::new(),
            by_region: BTreeMap::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn allocator(&self) -> &RegionAllocator {
        &self.allocator
    }

    pub fn terrain(&self) -> Arc<dyn TerrainQuery> {
        Arc::clone(self.allocator.terrain())
    }

    pub fn lobby(&self) -> Option<&Region> {
        self.allocator.lobby()
    }

    pub fn in_lobby(&self, point: Point) -> bool {
        self.lobby().map_or(false, |lobby| lobby.contains(point))
    }

    /// Allocates a region and starts a game in it.
    pub fn create_game(&mut self, name: &str, params: GameParams) -> Result<&mut Game, GameError> {
        if self.games.contains_key(name) {
            return Err(GameError::NameTaken(name.to_string()));
        }
        let safety = SafetyCheck::from(&self.settings);
        let region = self
            .allocator
            .allocate(self.settings.game_radius(), Some(&safety))
            .ok_or_else(|| GameError::AllocationFailed(name.to_string()))?;
        let terrain = self.terrain();
        let game = Game::new(name, region, params, &self.settings, terrain.as_ref());
        info!(game = name, %region, "game created");
        Ok(self.insert(game))
    }

    fn insert(&mut self, game: Game) -> &mut Game {
        let name = game.name().to_string();
        self.by_region.insert(game.region().id(), name.clone());
        self.games.entry(name).or_insert(game)
    }

    /// Removes a game and frees its region for later allocations.
    pub fn delete_game(&mut self, name: &str) -> Result<Game, GameError> {
        let game = self
            .games
            .remove(name)
            .ok_or_else(|| GameError::UnknownGame(name.to_string()))?;
        let region = game.region().id();
        self.by_region.remove(&region);
        self.allocator.release(region);
        info!(game = name, "game deleted");
        Ok(game)
    }

    pub fn game(&self, name: &str) -> Option<&Game> {
        self.games.get(name)
    }

    pub fn game_mut(&mut self, name: &str) -> Option<&mut Game> {
        self.games.get_mut(name)
    }

    pub(crate) fn require_mut(&mut self, name: &str) -> Result<&mut Game, GameError> {
        self.games
            .get_mut(name)
            .ok_or_else(|| GameError::UnknownGame(name.to_string()))
    }

    pub fn games(&self) -> impl Iterator<Item = &Game> {
        self.games.values()
    }

    pub fn games_mut(&mut self) -> impl Iterator<Item = &mut Game> {
        self.games.values_mut()
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    pub fn region_at(&self, point: Point) -> Option<&Region> {
        self.allocator.region_at(point)
    }

    pub fn game_at(&self, point: Point) -> Option<&Game> {
        let region = self.region_at(point)?;
        self.by_region
            .get(&region.id())
            .and_then(|name| self.games.get(name))
    }

    pub fn game_at_mut(&mut self, point: Point) -> Option<&mut Game> {
        let region = self.allocator.region_at(point)?.id();
        let name = self.by_region.get(&region)?;
        self.games.get_mut(name)
    }

    pub fn game_of_player(&self, player: &PlayerId) -> Option<&Game> {
        self.games.values().find(|g| g.team_of(player).is_some())
    }

    /// Region overlaps first, then score drift in any game.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        self.allocator.check_overlaps()?;
        for game in self.games.values() {
            game.scorer().verify(game.graph())?;
        }
        Ok(())
    }

    /// Heals every drifting game; returns how many needed it.
    pub fn heal(&mut self) -> usize {
        self.games
            .values_mut()
            .filter_map(|game| game.heal())
            .count()
    }

    pub(crate) fn restore_lobby(&mut self, id: RegionId, rect: Rect) {
        self.allocator.restore(id, rect, true);
    }

    /// Re-claims a stored region and adopts the game built on it. Refused
    /// when the name is taken or the region collides with one already held.
    pub(crate) fn adopt(
        &mut self,
        id: RegionId,
        rect: Rect,
        build: impl FnOnce(Region, &Settings, &dyn TerrainQuery) -> Game,
    ) -> Option<&mut Game> {
        let collides = self
            .allocator
            .regions()
            .any(|r| r.id() == id || r.overlaps(&rect));
        if collides {
            warn!(region = %id, "stored region collides with a held region, dropped");
            return None;
        }
        let region = self.allocator.restore(id, rect, false);
        let terrain = self.terrain();
        let game = build(region, &self.settings, terrain.as_ref());
        if self.games.contains_key(game.name()) {
            warn!(game = game.name(), "duplicate stored game name, dropped");
            self.allocator.release(id);
            return None;
        }
        Some(self.insert(game))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::FlatTerrain;

    fn registry() -> GameRegistry {
        GameRegistry::new(&Settings::default(), Arc::new(FlatTerrain::default()))
    }

    #[test]
    fn games_are_found_by_point_and_name() {
        let mut reg = registry();
        let params = GameParams::defaults(reg.settings());
        let center = reg.create_game("alpha", params).unwrap().region().center();
        assert_eq!(reg.game_at(center).map(Game::name), Some("alpha"));
        assert!(reg.game("alpha").is_some());
        assert!(reg.in_lobby(Point::new(0.0, 0.0)));
        assert!(reg.game_at(Point::new(0.0, 0.0)).is_none());
        assert!(reg.check_invariants().is_ok());
    }

    #[test]
    fn duplicate_names_are_refused() {
        let mut reg = registry();
        let params = GameParams::defaults(reg.settings());
        reg.create_game("alpha", params.clone()).unwrap();
        assert!(matches!(
            reg.create_game("alpha", params),
            Err(GameError::NameTaken(_))
        ));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn delete_frees_the_region() {
        let mut reg = registry();
        let params = GameParams::defaults(reg.settings());
        let first = reg.create_game("alpha", params.clone()).unwrap().region().center();
        reg.delete_game("alpha").unwrap();
        assert!(reg.game_at(first).is_none());
        assert!(matches!(reg.delete_game("alpha"), Err(GameError::UnknownGame(_))));
        let again = reg.create_game("beta", params).unwrap().region().center();
        assert_eq!(again, first);
    }

    #[test]
    fn players_are_found_across_games() {
        let mut reg = registry();
        let params = GameParams::defaults(reg.settings());
        reg.create_game("alpha", params.clone()).unwrap();
        reg.create_game("beta", params)
            .unwrap()
            .assign_player(PlayerId::new("steve"));
        assert_eq!(
            reg.game_of_player(&PlayerId::new("steve")).map(Game::name),
            Some("beta")
        );
    }
}
