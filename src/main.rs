use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;

use beaconfield::{
    config::{Settings, SettingsLoader},
    events::TracingSink,
    logging,
    persistence::JsonStore,
    registry::GameRegistry,
    scenario::ScenarioLoader,
    session::Session,
    terrain::TerrainQuery,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Beaconfield territory engine runner")]
struct Cli {
    /// Path to the settings YAML file
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Path to the scenario YAML file
    #[arg(long, default_value = "scenarios/triangle_rush.yaml")]
    scenario: PathBuf,

    /// Directory holding games.json; state is loaded from and saved to it
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Override the allocator seed
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = match &cli.settings {
        Some(path) => SettingsLoader::new(".").load(path)?,
        None => Settings::default(),
    };
    logging::init(&settings.logging);

    let scenario = ScenarioLoader::new(".").load(&cli.scenario)?;
    if let Some(seed) = cli.seed.or(scenario.seed) {
        settings.seed = seed;
    }
    let terrain: Arc<dyn TerrainQuery> = Arc::new(scenario.terrain());
    let sink = Arc::new(TracingSink);

    let mut session = match &cli.state_dir {
        Some(dir) => {
            let store = Box::new(JsonStore::new(dir));
            Session::open(&settings, terrain, sink, store, None).0
        }
        None => Session::new(GameRegistry::new(&settings, terrain), sink),
    };

    let outcome = scenario
        .run(&mut session)
        .with_context(|| format!("Scenario '{}' failed", scenario.name))?;
    session.save().context("Failed to save state")?;

    println!(
        "Scenario '{}': {} links made, {} rejected, {} triangles formed, {} failed",
        scenario.name,
        outcome.links_made,
        outcome.links_rejected.len(),
        outcome.triangles_formed,
        outcome.triangles_failed
    );
    for game in session.registry().games() {
        println!("{} ({:?})", game.name(), game.state());
        for team in game.team_ids() {
            let score = game.score(team);
            println!(
                "  {:<10} beacons {:>3}  links {:>3}  triangles {:>3}  area {:>10.1}",
                team.as_str(),
                score.beacons,
                score.links,
                score.triangles,
                score.area
            );
        }
    }

    let failures = scenario.check(&session);
    if !failures.is_empty() {
        for failure in &failures {
            eprintln!("expectation failed: {failure}");
        }
        bail!("{} expectation(s) failed", failures.len());
    }
    Ok(())
}
