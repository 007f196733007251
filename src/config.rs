//! Configuration for the territory engine

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::territory::scoring::ScoreType;

fn default_world_name() -> String {
    "beaconz".to_string()
}

fn default_center() -> i32 {
    2000
}

fn default_game_distance() -> u32 {
    2000
}

fn default_chunk_size() -> u32 {
    16
}

fn default_region_margin() -> u32 {
    16
}

fn default_random_probes() -> u32 {
    10
}

fn default_lobby_radius() -> u32 {
    32
}

fn default_max_unsafe_fraction() -> f64 {
    0.4
}

fn default_sample_radius_cap() -> f64 {
    128.0
}

fn default_max_links() -> usize {
    6
}

fn default_link_limit() -> u32 {
    500
}

fn default_exp_distance() -> f64 {
    5.0
}

fn default_game_name() -> String {
    "Beaconz".to_string()
}

fn default_team_names() -> Vec<String> {
    vec!["red".to_string(), "blue".to_string()]
}

fn default_team_count() -> usize {
    2
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_seed() -> u64 {
    7
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub world: WorldSettings,
    #[serde(default)]
    pub lobby: LobbySettings,
    #[serde(default)]
    pub safety: SafetySettings,
    #[serde(default)]
    pub links: LinkSettings,
    #[serde(default)]
    pub game: GameDefaults,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSettings {
    #[serde(default = "default_world_name")]
    pub name: String,
    #[serde(default = "default_center")]
    pub center_x: i32,
    #[serde(default = "default_center")]
    pub center_z: i32,
    #[serde(default = "default_game_distance")]
    pub game_distance: u32,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,
    #[serde(default = "default_region_margin")]
    pub region_margin: u32,
    #[serde(default = "default_random_probes")]
    pub random_probes: u32,
    /// Also refuse candidates that contain a claimed region without sharing
    /// a corner with it.
    #[serde(default)]
    pub strict_free_check: bool,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            name: default_world_name(),
            center_x: default_center(),
            center_z: default_center(),
            game_distance: default_game_distance(),
            chunk_size: default_chunk_size(),
            region_margin: default_region_margin(),
            random_probes: default_random_probes(),
            strict_free_check: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbySettings {
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub z: i32,
    #[serde(default = "default_lobby_radius")]
    pub radius: u32,
}

impl Default for LobbySettings {
    fn default() -> Self {
        Self {
            x: 0,
            z: 0,
            radius: default_lobby_radius(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetySettings {
    #[serde(default = "default_max_unsafe_fraction")]
    pub max_unsafe_fraction: f64,
    #[serde(default = "default_sample_radius_cap")]
    pub sample_radius_cap: f64,
}

impl Default for SafetySettings {
    fn default() -> Self {
        Self {
            max_unsafe_fraction: default_max_unsafe_fraction(),
            sample_radius_cap: default_sample_radius_cap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSettings {
    #[serde(default = "default_max_links")]
    pub max_links: usize,
    /// Longest allowed link, in blocks.
    #[serde(default = "default_link_limit")]
    pub link_limit: u32,
    /// Blocks per experience point of link cost; zero disables range and cost.
    #[serde(default = "default_exp_distance")]
    pub exp_distance: f64,
    #[serde(default)]
    pub clear_on_recapture: bool,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            max_links: default_max_links(),
            link_limit: default_link_limit(),
            exp_distance: default_exp_distance(),
            clear_on_recapture: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    Minigame,
    Strategy,
}

impl Default for GameMode {
    fn default() -> Self {
        GameMode::Minigame
    }
}

/// Score type and the value that wins the game; zero means "most wins".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub score: ScoreType,
    pub value: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeDefaults {
    pub score_types: Vec<ScoreType>,
    pub goal: Goal,
    /// Countdown in seconds; zero runs open-ended.
    pub timer_secs: u64,
}

impl ModeDefaults {
    pub fn minigame() -> Self {
        Self {
            score_types: vec![ScoreType::Beacons, ScoreType::Links, ScoreType::Triangles],
            goal: Goal {
                score: ScoreType::Triangles,
                value: 0,
            },
            timer_secs: 600,
        }
    }

    pub fn strategy() -> Self {
        Self {
            score_types: vec![ScoreType::Area, ScoreType::Triangles],
            goal: Goal {
                score: ScoreType::Area,
                value: 10_000,
            },
            timer_secs: 60_000,
        }
    }

    /// A goal on an undisplayed score type falls back to the mode's default
    /// goal, which is then displayed.
    fn normalise(&mut self, fallback: Goal) {
        if !self.score_types.contains(&self.goal.score) {
            self.goal = fallback;
            if !self.score_types.contains(&fallback.score) {
                self.score_types.push(fallback.score);
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameDefaults {
    #[serde(default = "default_game_name")]
    pub default_name: String,
    #[serde(default)]
    pub mode: GameMode,
    #[serde(default = "default_team_names")]
    pub teams: Vec<String>,
    #[serde(default = "default_team_count")]
    pub default_teams: usize,
    #[serde(default = "ModeDefaults::minigame")]
    pub minigame: ModeDefaults,
    #[serde(default = "ModeDefaults::strategy")]
    pub strategy: ModeDefaults,
}

impl Default for GameDefaults {
    fn default() -> Self {
        Self {
            default_name: default_game_name(),
            mode: GameMode::default(),
            teams: default_team_names(),
            default_teams: default_team_count(),
            minigame: ModeDefaults::minigame(),
            strategy: ModeDefaults::strategy(),
        }
    }
}

impl GameDefaults {
    pub fn for_mode(&self, mode: GameMode) -> &ModeDefaults {
        match mode {
            GameMode::Minigame => &self.minigame,
            GameMode::Strategy => &self.strategy,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,
    #[error("game distance must be greater than zero")]
    ZeroGameDistance,
    #[error("max links must be greater than zero")]
    ZeroMaxLinks,
    #[error("max unsafe fraction {0} must be in (0, 1]")]
    UnsafeFraction(f64),
    #[error("at least one team must be configured")]
    NoTeams,
}

impl Default for Settings {
    fn default() -> Self {
        let mut settings = Self {
            seed: default_seed(),
            world: WorldSettings::default(),
            lobby: LobbySettings::default(),
            safety: SafetySettings::default(),
            links: LinkSettings::default(),
            game: GameDefaults::default(),
            logging: LoggingSettings::default(),
        };
        settings.normalise();
        settings
    }
}

impl Settings {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let mut settings: Settings =
            serde_yaml::from_str(text).context("Failed to parse settings")?;
        settings.normalise();
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        fs::write(path.as_ref(), yaml)
            .with_context(|| format!("Failed to write {}", path.as_ref().display()))?;
        Ok(())
    }

    /// Snaps lobby values to the chunk grid and repairs mode goals.
    pub fn normalise(&mut self) {
        let chunk = self.world.chunk_size.max(1) as i32;
        self.lobby.x = (self.lobby.x / chunk) * chunk;
        self.lobby.z = (self.lobby.z / chunk) * chunk;
        self.lobby.radius = (self.lobby.radius / chunk as u32) * chunk as u32;
        if self.lobby.radius == 0 {
            self.lobby.radius = default_lobby_radius();
        }
        self.game.minigame.normalise(Goal {
            score: ScoreType::Triangles,
            value: 0,
        });
        self.game.strategy.normalise(Goal {
            score: ScoreType::Area,
            value: 10_000,
        });
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.world.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.world.game_distance == 0 {
            return Err(ConfigError::ZeroGameDistance);
        }
        if self.links.max_links == 0 {
            return Err(ConfigError::ZeroMaxLinks);
        }
        let fraction = self.safety.max_unsafe_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(ConfigError::UnsafeFraction(fraction));
        }
        if self.game.teams.is_empty() || self.game.default_teams == 0 {
            return Err(ConfigError::NoTeams);
        }
        Ok(())
    }

    pub fn chunk(&self) -> f64 {
        self.world.chunk_size as f64
    }

    /// Radius of every new game region, on the chunk grid.
    pub fn game_radius(&self) -> f64 {
        crate::geometry::snap_to_chunk(self.world.game_distance as f64 / 2.0, self.chunk())
    }
}

pub struct SettingsLoader {
    base_dir: PathBuf,
}

impl SettingsLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<Settings> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        Settings::from_yaml_str(&data).with_context(|| format!("Invalid settings in {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_classic_game() {
        let settings = Settings::default();
        assert_eq!(settings.links.max_links, 6);
        assert_eq!(settings.links.link_limit, 500);
        assert_eq!(settings.world.game_distance, 2000);
        assert_eq!(settings.lobby.radius, 32);
        assert_eq!(settings.game.minigame.goal.score, ScoreType::Triangles);
        assert_eq!(settings.game.strategy.goal.value, 10_000);
        assert_eq!(settings.game_radius(), 1008.0);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn partial_yaml_uses_defaults() {
        let settings = Settings::from_yaml_str("links:\n  max_links: 3\nlobby:\n  x: 40\n  radius: 50\n")
            .unwrap();
        assert_eq!(settings.links.max_links, 3);
        assert_eq!(settings.links.link_limit, 500);
        assert_eq!(settings.lobby.x, 32);
        assert_eq!(settings.lobby.radius, 48);
    }

    #[test]
    fn undisplayed_goal_falls_back() {
        let yaml = "game:\n  strategy:\n    score_types: [beacons]\n    goal: { score: links, value: 4 }\n    timer_secs: 0\n";
        let settings = Settings::from_yaml_str(yaml).unwrap();
        let strategy = &settings.game.strategy;
        assert_eq!(strategy.goal.score, ScoreType::Area);
        assert_eq!(strategy.goal.value, 10_000);
        assert_eq!(strategy.score_types, vec![ScoreType::Beacons, ScoreType::Area]);
    }

    #[test]
    fn validation_rejects_bad_fraction() {
        let mut settings = Settings::default();
        settings.safety.max_unsafe_fraction = 1.5;
        assert_eq!(settings.validate(), Err(ConfigError::UnsafeFraction(1.5)));
    }

    #[test]
    fn yaml_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        let settings = Settings::default();
        settings.to_yaml(&path).unwrap();
        let loaded = SettingsLoader::new(dir.path()).load("settings.yaml").unwrap();
        assert_eq!(loaded.world.center_x, settings.world.center_x);
        assert_eq!(loaded.game.teams, settings.game.teams);
    }
}
