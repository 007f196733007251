//! Saving and restoring the whole registry as one JSON document
//!
//! The store keeps the previous save next to the current one. Loading
//! rebuilds every graph from its beacons and links, re-derives triangles and
//! compares the stored score snapshot with a recount.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::PersistenceError;
use crate::game::{Game, GameClock, GameParams, GameState, PlayerId};
use crate::geometry::{Point, Rect};
use crate::region::{Region, RegionId};
use crate::registry::GameRegistry;
use crate::terrain::{BeaconScan, TerrainQuery};
use crate::territory::{BeaconId, TeamId, TeamScore, TriangleKey};

pub const STATE_FILE: &str = "games.json";
pub const BACKUP_FILE: &str = "games.old";
const DOCUMENT_VERSION: u32 = 1;

/// A block position with facing, written as
/// `world:x:y:z:yawbits:pitchbits` where the angles are raw float bits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Location {
    pub world: String,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub yaw: f32,
    pub pitch: f32,
}

impl Location {
    pub fn new(world: impl Into<String>, x: i32, y: i32, z: i32) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
            yaw: 0.0,
            pitch: 0.0,
        }
    }

    pub fn facing(mut self, yaw: f32, pitch: f32) -> Self {
        self.yaw = yaw;
        self.pitch = pitch;
        self
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}:{}",
            self.world,
            self.x,
            self.y,
            self.z,
            self.yaw.to_bits() as i32,
            self.pitch.to_bits() as i32
        )
    }
}

impl FromStr for Location {
    type Err = PersistenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let corrupt = || PersistenceError::Corrupt(format!("bad location '{s}'"));
        let parts: Vec<&str> = s.trim().split(':').collect();
        let [world, x, y, z, yaw, pitch] = parts.as_slice() else {
            return Err(corrupt());
        };
        if world.is_empty() {
            return Err(corrupt());
        }
        let int = |v: &str| v.parse::<i32>().map_err(|_| corrupt());
        Ok(Self {
            world: world.to_string(),
            x: int(x)?,
            y: int(y)?,
            z: int(z)?,
            yaw: f32::from_bits(int(yaw)? as u32),
            pitch: f32::from_bits(int(pitch)? as u32),
        })
    }
}

impl TryFrom<String> for Location {
    type Error = PersistenceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Location> for String {
    fn from(location: Location) -> Self {
        location.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRecord {
    pub id: RegionId,
    pub corners: [Point; 2],
}

impl RegionRecord {
    fn of(region: &Region) -> Self {
        let rect = region.rect();
        Self {
            id: region.id(),
            corners: [rect.min(), rect.max()],
        }
    }

    fn rect(&self) -> Rect {
        Rect::from_corners(self.corners[0], self.corners[1])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRecord {
    pub id: TeamId,
    pub spawn: Location,
    #[serde(default)]
    pub players: Vec<PlayerId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeaconRecord {
    pub id: BeaconId,
    pub x: f64,
    pub z: f64,
    #[serde(default)]
    pub owner: Option<TeamId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub a: BeaconId,
    pub b: BeaconId,
    pub team: TeamId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub name: String,
    pub region: RegionRecord,
    pub params: GameParams,
    pub clock: GameClock,
    pub state: GameState,
    pub teams: Vec<TeamRecord>,
    #[serde(default)]
    pub beacons: Vec<BeaconRecord>,
    #[serde(default)]
    pub links: Vec<LinkRecord>,
    /// Registered triangles. Absent in older documents, in which case they
    /// are re-derived from the links.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triangles: Option<Vec<TriangleKey>>,
    #[serde(default)]
    pub scores: BTreeMap<TeamId, TeamScore>,
}

impl GameRecord {
    pub fn capture(game: &Game) -> Self {
        let graph = game.graph();
        Self {
            name: game.name().to_string(),
            region: RegionRecord::of(game.region()),
            params: game.params().clone(),
            clock: game.clock().clone(),
            state: game.state(),
            teams: game
                .teams()
                .iter()
                .map(|t| TeamRecord {
                    id: t.id.clone(),
                    spawn: t.spawn.clone(),
                    players: t.players.iter().cloned().collect(),
                })
                .collect(),
            beacons: graph
                .beacons()
                .map(|b| BeaconRecord {
                    id: b.id(),
                    x: b.point().x,
                    z: b.point().z,
                    owner: b.owner().cloned(),
                })
                .collect(),
            links: graph
                .links()
                .map(|(a, b, team)| LinkRecord {
                    a,
                    b,
                    team: team.clone(),
                })
                .collect(),
            triangles: Some(graph.triangles().iter().map(|t| t.key).collect()),
            scores: game.scorer().scores().clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldDocument {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub lobby: Option<RegionRecord>,
    #[serde(default)]
    pub lobby_spawn: Option<Location>,
    #[serde(default)]
    pub games: Vec<GameRecord>,
}

impl WorldDocument {
    pub fn capture(registry: &GameRegistry) -> Self {
        let world = &registry.settings().world.name;
        let terrain = registry.terrain();
        let lobby_spawn = registry.lobby().map(|lobby| {
            let (x, z) = lobby.center().block();
            Location::new(world.clone(), x, terrain.highest_solid_y(x, z) + 1, z)
        });
        Self {
            version: DOCUMENT_VERSION,
            saved_at: Utc::now(),
            lobby: registry.lobby().map(RegionRecord::of),
            lobby_spawn,
            games: registry.games().map(GameRecord::capture).collect(),
        }
    }
}

/// Counts of what a restore had to repair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub games: usize,
    pub games_dropped: usize,
    pub orphans_dropped: usize,
    pub beacons_rescanned: usize,
    pub drift_healed: usize,
}

/// Rebuilds a registry from a stored document. Anything that no longer
/// fits is dropped with a warning rather than failing the whole load.
pub fn restore(
    document: &WorldDocument,
    settings: &Settings,
    terrain: Arc<dyn TerrainQuery>,
    scan: Option<&dyn BeaconScan>,
) -> (GameRegistry, RestoreReport) {
    let mut report = RestoreReport::default();
    let mut registry = match &document.lobby {
        Some(lobby) => {
            let mut registry = GameRegistry::without_lobby(settings, terrain);
            registry.restore_lobby(lobby.id, lobby.rect());
            registry
        }
        None => GameRegistry::new(settings, terrain),
    };

    for record in &document.games {
        let adopted = registry.adopt(record.region.id, record.region.rect(), |region, settings, terrain| {
            Game::new(record.name.clone(), region, record.params.clone(), settings, terrain)
        });
        let Some(game) = adopted else {
            report.games_dropped += 1;
            continue;
        };
        restore_game(game, record, scan, &mut report);
        report.games += 1;
    }
    info!(
        games = report.games,
        dropped = report.games_dropped,
        orphans = report.orphans_dropped,
        healed = report.drift_healed,
        "state restored"
    );
    (registry, report)
}

fn restore_game(
    game: &mut Game,
    record: &GameRecord,
    scan: Option<&dyn BeaconScan>,
    report: &mut RestoreReport,
) {
    let rosters = record
        .teams
        .iter()
        .map(|t| {
            let players: BTreeSet<PlayerId> = t.players.iter().cloned().collect();
            (t.id.clone(), (t.spawn.clone(), players))
        })
        .collect();
    game.restore_state(record.clock.clone(), record.state, rosters);

    let teams: BTreeSet<TeamId> = game.team_ids().cloned().collect();
    let known_owner = |owner: &Option<TeamId>| match owner {
        Some(team) if !teams.contains(team) => None,
        other => Some(other.clone()),
    };
    let region = *game.region();

    for beacon in &record.beacons {
        let point = Point::new(beacon.x, beacon.z);
        let owner = known_owner(&beacon.owner);
        let restored = match owner {
            Some(owner) if region.contains(point) => {
                game.graph_mut().restore_beacon(beacon.id, point, owner).is_some()
            }
            _ => false,
        };
        if !restored {
            warn!(game = %record.name, beacon = %beacon.id, "orphaned beacon dropped");
            report.orphans_dropped += 1;
        }
    }

    if record.beacons.is_empty() {
        if let Some(scan) = scan {
            for found in scan.scan(&region.rect()) {
                let owner = known_owner(&found.owner).flatten();
                game.graph_mut().add_beacon(found.point, owner);
                report.beacons_rescanned += 1;
            }
        }
    }

    for link in &record.links {
        let restored = teams.contains(&link.team)
            && game.graph_mut().restore_link(link.a, link.b, &link.team).is_ok();
        if !restored {
            warn!(game = %record.name, a = %link.a, b = %link.b, "orphaned link dropped");
            report.orphans_dropped += 1;
        }
    }

    match &record.triangles {
        Some(keys) => {
            for &key in keys {
                if !game.graph_mut().restore_triangle(key) {
                    let [a, b, c] = key.beacons();
                    warn!(game = %record.name, %a, %b, %c, "orphaned triangle dropped");
                    report.orphans_dropped += 1;
                }
            }
        }
        None => {
            game.graph_mut().rebuild_triangles();
        }
    }
    if game.restore_scores(&record.scores).is_some() {
        report.drift_healed += 1;
    }
}

/// Where the registry document lives.
pub trait Persistence: Send + Sync {
    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<WorldDocument>, PersistenceError>;
    fn save(&self, document: &WorldDocument) -> Result<(), PersistenceError>;
}

/// Pretty JSON in a directory, rotating the previous save to a backup.
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    pub fn backup_path(&self) -> PathBuf {
        self.dir.join(BACKUP_FILE)
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PersistenceError + '_ {
    move |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl Persistence for JsonStore {
    fn load(&self) -> Result<Option<WorldDocument>, PersistenceError> {
        let path = self.state_path();
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path).map_err(io_error(&path))?;
        let document: WorldDocument = serde_json::from_str(&text)?;
        if document.version > DOCUMENT_VERSION {
            return Err(PersistenceError::Corrupt(format!(
                "unsupported document version {}",
                document.version
            )));
        }
        Ok(Some(document))
    }

    fn save(&self, document: &WorldDocument) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;
        let path = self.state_path();
        if path.exists() {
            let backup = self.backup_path();
            fs::rename(&path, &backup).map_err(io_error(&backup))?;
        }
        let json = serde_json::to_string_pretty(document)?;
        fs::write(&path, json).map_err(io_error(&path))?;
        info!(path = %path.display(), games = document.games.len(), "state saved");
        Ok(())
    }
}
