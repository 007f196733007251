//! Host-facing entry point. Every mutation goes through `&mut Session`, so
//! sharing it behind a lock serialises writers per process while readers
//! proceed together.

use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use crate::config::Settings;
use crate::error::{GameError, PersistenceError};
use crate::events::NotificationSink;
use crate::game::{Game, GameParams, PlayerId};
use crate::geometry::Point;
use crate::persistence::{restore, Persistence, RestoreReport, WorldDocument};
use crate::registry::GameRegistry;
use crate::terrain::{BeaconScan, TerrainQuery};
use crate::territory::{BeaconId, LinkResult, TeamId};

pub type SharedSession = Arc<RwLock<Session>>;

pub struct Session {
    registry: GameRegistry,
    sink: Arc<dyn NotificationSink>,
    store: Option<Box<dyn Persistence>>,
}

impl Session {
    pub fn new(registry: GameRegistry, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            registry,
            sink,
            store: None,
        }
    }

    /// Loads the stored registry, falling back to a fresh one when nothing
    /// was saved or the document cannot be read.
    pub fn open(
        settings: &Settings,
        terrain: Arc<dyn TerrainQuery>,
        sink: Arc<dyn NotificationSink>,
        store: Box<dyn Persistence>,
        scan: Option<&dyn BeaconScan>,
    ) -> (Self, RestoreReport) {
        let (registry, report) = match store.load() {
            Ok(Some(document)) => restore(&document, settings, terrain, scan),
            Ok(None) => (GameRegistry::new(settings, terrain), RestoreReport::default()),
            Err(err) => {
                warn!(error = %err, "stored state unusable, starting fresh");
                (GameRegistry::new(settings, terrain), RestoreReport::default())
            }
        };
        let session = Self {
            registry,
            sink,
            store: Some(store),
        };
        (session, report)
    }

    pub fn into_shared(self) -> SharedSession {
        Arc::new(RwLock::new(self))
    }

    pub fn registry(&self) -> &GameRegistry {
        &self.registry
    }

    pub fn game(&self, name: &str) -> Option<&Game> {
        self.registry.game(name)
    }

    fn flush(&mut self, game: &str) {
        if let Some(game) = self.registry.game_mut(game) {
            let notes = game.drain_notifications();
            self.sink.notify_all(&notes);
        }
    }

    /// Runs `op` on the named game and forwards whatever it announced.
    fn with_game<T>(
        &mut self,
        name: &str,
        op: impl FnOnce(&mut Game) -> Result<T, GameError>,
    ) -> Result<T, GameError> {
        let result = op(self.registry.require_mut(name)?);
        self.flush(name);
        result
    }

    pub fn create_game(&mut self, name: &str, params: GameParams) -> Result<(), GameError> {
        self.registry.create_game(name, params).map(|_| ())
    }

    pub fn delete_game(&mut self, name: &str) -> Result<(), GameError> {
        self.registry.delete_game(name).map(|_| ())
    }

    pub fn join(&mut self, game: &str, player: PlayerId) -> Result<TeamId, GameError> {
        self.with_game(game, |g| {
            g.assign_player(player)
                .ok_or_else(|| GameError::UnknownTeam(String::new()))
        })
    }

    /// Plants a beacon in whichever game owns `point`.
    pub fn place_beacon(&mut self, point: Point, owner: Option<TeamId>) -> Result<(String, BeaconId), GameError> {
        let name = self
            .registry
            .game_at(point)
            .map(|g| g.name().to_string())
            .ok_or(GameError::OutsideGameRegion { x: point.x, z: point.z })?;
        let id = self.with_game(&name, |g| g.place_beacon(point, owner))?;
        Ok((name, id))
    }

    pub fn capture(&mut self, game: &str, beacon: BeaconId, team: &TeamId) -> Result<(), GameError> {
        self.with_game(game, |g| g.capture(beacon, team))
    }

    pub fn release(&mut self, game: &str, beacon: BeaconId) -> Result<(), GameError> {
        self.with_game(game, |g| g.release(beacon))
    }

    pub fn remove_beacon(&mut self, game: &str, beacon: BeaconId) -> Result<(), GameError> {
        self.with_game(game, |g| g.remove_beacon(beacon))
    }

    pub fn link(&mut self, game: &str, a: BeaconId, b: BeaconId, team: &TeamId) -> Result<LinkResult, GameError> {
        self.with_game(game, |g| g.try_link(a, b, team))
    }

    pub fn unlink(&mut self, game: &str, a: BeaconId, b: BeaconId) -> Result<bool, GameError> {
        self.with_game(game, |g| g.unlink(a, b))
    }

    /// Advances every game clock.
    pub fn tick(&mut self, secs: u64) {
        let names: Vec<String> = self.registry.games().map(|g| g.name().to_string()).collect();
        for name in names {
            if let Some(game) = self.registry.game_mut(&name) {
                game.tick(secs);
            }
            self.flush(&name);
        }
    }

    pub fn end_game(&mut self, game: &str) -> Result<Option<TeamId>, GameError> {
        self.with_game(game, |g| Ok(g.end()))
    }

    /// Heals score drift everywhere; returns the number of games repaired.
    pub fn heal(&mut self) -> usize {
        self.registry.heal()
    }

    pub fn save(&self) -> Result<(), PersistenceError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        store.save(&WorldDocument::capture(&self.registry))?;
        info!(games = self.registry.len(), "session saved");
        Ok(())
    }
}
