use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::config::{GameMode, Goal, Settings};
use crate::error::InvalidLink;
use crate::game::{GameParams, PlayerId};
use crate::geometry::Point;
use crate::session::Session;
use crate::terrain::LiquidMask;
use crate::territory::{BeaconId, TeamId};

fn default_surface_y() -> i32 {
    64
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub terrain: ScenarioTerrain,
    pub games: Vec<ScenarioGame>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub expect: Vec<Expectation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioTerrain {
    #[serde(default = "default_surface_y")]
    pub surface_y: i32,
    #[serde(default)]
    pub pools: Vec<crate::geometry::Rect>,
    #[serde(default)]
    pub buried: Vec<crate::geometry::Rect>,
}

impl Default for ScenarioTerrain {
    fn default() -> Self {
        Self {
            surface_y: default_surface_y(),
            pools: Vec::new(),
            buried: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioGame {
    pub name: String,
    #[serde(default)]
    pub mode: Option<GameMode>,
    #[serde(default)]
    pub teams: Option<usize>,
    #[serde(default)]
    pub goal: Option<Goal>,
    #[serde(default)]
    pub timer_secs: Option<u64>,
}

impl ScenarioGame {
    pub fn params(&self, settings: &Settings) -> GameParams {
        let mut params = GameParams::for_mode(settings, self.mode.unwrap_or(settings.game.mode));
        if let Some(teams) = self.teams {
            params = params.with_teams(teams);
        }
        if let Some(goal) = self.goal {
            params = params.with_goal(goal);
        }
        if let Some(secs) = self.timer_secs {
            params = params.with_timer(secs);
        }
        params
    }
}

/// One scripted step. Beacons are named by labels given when placed, and
/// placed relative to their game's region centre.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Place {
        game: String,
        label: String,
        dx: f64,
        dz: f64,
        #[serde(default)]
        owner: Option<String>,
    },
    Link {
        game: String,
        from: String,
        to: String,
        team: String,
    },
    Unlink {
        game: String,
        from: String,
        to: String,
    },
    Capture {
        game: String,
        beacon: String,
        team: String,
    },
    Release {
        game: String,
        beacon: String,
    },
    Remove {
        game: String,
        beacon: String,
    },
    Join {
        game: String,
        player: String,
    },
    Tick {
        secs: u64,
    },
    End {
        game: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Expectation {
    pub game: String,
    pub team: String,
    #[serde(default)]
    pub beacons: Option<u64>,
    #[serde(default)]
    pub links: Option<u64>,
    #[serde(default)]
    pub triangles: Option<u64>,
    #[serde(default)]
    pub area: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenarioOutcome {
    pub links_made: usize,
    pub links_rejected: Vec<(String, String, InvalidLink)>,
    pub triangles_formed: usize,
    pub triangles_failed: u32,
}

pub struct ScenarioLoader {
    base_dir: PathBuf,
}

impl ScenarioLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<Scenario> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
        let scenario: Scenario = serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(scenario)
    }
}

impl Scenario {
    pub fn terrain(&self) -> LiquidMask {
        LiquidMask {
            surface_y: self.terrain.surface_y,
            pools: self.terrain.pools.clone(),
            buried: self.terrain.buried.clone(),
        }
    }

    /// Creates the scenario's games that do not exist yet, then plays every
    /// action in order. Link rejections are part of the outcome; any other
    /// failure stops the run.
    pub fn run(&self, session: &mut Session) -> Result<ScenarioOutcome> {
        for game in &self.games {
            if session.game(&game.name).is_none() {
                let params = game.params(session.registry().settings());
                session
                    .create_game(&game.name, params)
                    .with_context(|| format!("Failed to create game '{}'", game.name))?;
            }
        }

        let mut labels: HashMap<(String, String), BeaconId> = HashMap::new();
        let lookup = |labels: &HashMap<(String, String), BeaconId>, game: &str, label: &str| {
            labels
                .get(&(game.to_string(), label.to_string()))
                .copied()
                .ok_or_else(|| anyhow!("unknown beacon label '{label}' in game '{game}'"))
        };
        let mut outcome = ScenarioOutcome::default();

        for (step, action) in self.actions.iter().enumerate() {
            debug!(step, ?action, "scenario action");
            match action {
                Action::Place {
                    game,
                    label,
                    dx,
                    dz,
                    owner,
                } => {
                    let center = session
                        .game(game)
                        .map(|g| g.region().center())
                        .ok_or_else(|| anyhow!("unknown game '{game}'"))?;
                    let point = Point::new(center.x + dx, center.z + dz);
                    let (_, id) = session
                        .place_beacon(point, owner.as_deref().map(TeamId::new))
                        .with_context(|| format!("step {step}: placing '{label}'"))?;
                    labels.insert((game.clone(), label.clone()), id);
                }
                Action::Link {
                    game,
                    from,
                    to,
                    team,
                } => {
                    let (a, b) = (lookup(&labels, game, from)?, lookup(&labels, game, to)?);
                    let result = session
                        .link(game, a, b, &TeamId::new(team.as_str()))
                        .with_context(|| format!("step {step}: linking '{from}' to '{to}'"))?;
                    match result.outcome {
                        Ok(success) => {
                            outcome.links_made += 1;
                            outcome.triangles_formed += success.triangles_formed.len();
                            outcome.triangles_failed += success.triangles_failed;
                        }
                        Err(reason) => outcome
                            .links_rejected
                            .push((from.clone(), to.clone(), reason)),
                    }
                }
                Action::Unlink { game, from, to } => {
                    let (a, b) = (lookup(&labels, game, from)?, lookup(&labels, game, to)?);
                    session
                        .unlink(game, a, b)
                        .with_context(|| format!("step {step}: unlinking '{from}' from '{to}'"))?;
                }
                Action::Capture { game, beacon, team } => {
                    let id = lookup(&labels, game, beacon)?;
                    session
                        .capture(game, id, &TeamId::new(team.as_str()))
                        .with_context(|| format!("step {step}: capturing '{beacon}'"))?;
                }
                Action::Release { game, beacon } => {
                    let id = lookup(&labels, game, beacon)?;
                    session
                        .release(game, id)
                        .with_context(|| format!("step {step}: releasing '{beacon}'"))?;
                }
                Action::Remove { game, beacon } => {
                    let id = lookup(&labels, game, beacon)?;
                    session
                        .remove_beacon(game, id)
                        .with_context(|| format!("step {step}: removing '{beacon}'"))?;
                }
                Action::Join { game, player } => {
                    session
                        .join(game, PlayerId::new(player.as_str()))
                        .with_context(|| format!("step {step}: joining '{player}'"))?;
                }
                Action::Tick { secs } => session.tick(*secs),
                Action::End { game } => {
                    session
                        .end_game(game)
                        .with_context(|| format!("step {step}: ending '{game}'"))?;
                }
            }
        }
        Ok(outcome)
    }

    /// Expectations that do not hold, one message each.
    pub fn check(&self, session: &Session) -> Vec<String> {
        let mut failures = Vec::new();
        for expect in &self.expect {
            let Some(game) = session.game(&expect.game) else {
                failures.push(format!("game '{}' does not exist", expect.game));
                continue;
            };
            let score = game.score(&TeamId::new(expect.team.as_str()));
            let mut compare = |what: &str, wanted: Option<f64>, actual: f64| {
                if let Some(wanted) = wanted {
                    if (wanted - actual).abs() > 1e-6 {
                        failures.push(format!(
                            "{}/{} {what}: expected {wanted}, got {actual}",
                            expect.game, expect.team
                        ));
                    }
                }
            };
            compare("beacons", expect.beacons.map(|v| v as f64), score.beacons());
            compare("links", expect.links.map(|v| v as f64), score.links());
            compare("triangles", expect.triangles.map(|v| v as f64), score.triangles());
            compare("area", expect.area, score.area());
        }
        failures
    }
}
