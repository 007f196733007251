use std::sync::Arc;

use beaconfield::{
    config::Settings,
    error::InvalidLink,
    events::{Notification, RecordingSink},
    registry::GameRegistry,
    scenario::ScenarioLoader,
    territory::TeamId,
    Session,
};

#[test]
fn triangle_rush_plays_out() {
    let scenario = ScenarioLoader::new(env!("CARGO_MANIFEST_DIR"))
        .load("scenarios/triangle_rush.yaml")
        .unwrap();
    let mut settings = Settings::default();
    if let Some(seed) = scenario.seed {
        settings.seed = seed;
    }
    let sink = Arc::new(RecordingSink::new());
    let registry = GameRegistry::new(&settings, Arc::new(scenario.terrain()));
    let mut session = Session::new(registry, sink.clone());

    let outcome = scenario.run(&mut session).unwrap();
    assert_eq!(outcome.links_made, 3);
    assert_eq!(outcome.triangles_formed, 1);
    assert_eq!(outcome.triangles_failed, 0);
    let reasons: Vec<_> = outcome.links_rejected.iter().map(|(_, _, r)| r.clone()).collect();
    assert_eq!(
        reasons,
        vec![InvalidLink::CrossesEnemyLink(TeamId::new("red")), InvalidLink::SelfLink]
    );
    assert!(scenario.check(&session).is_empty());

    let notes = sink.take();
    assert_eq!(
        notes
            .iter()
            .filter(|n| matches!(n, Notification::TriangleFormed { .. }))
            .count(),
        1
    );
    assert_eq!(
        notes
            .iter()
            .filter(|n| matches!(n, Notification::LinkRejected { .. }))
            .count(),
        2
    );
}

#[test]
fn failed_expectations_are_reported() {
    let mut scenario = ScenarioLoader::new(env!("CARGO_MANIFEST_DIR"))
        .load("scenarios/triangle_rush.yaml")
        .unwrap();
    scenario.expect[0].area = Some(49.0);
    let settings = Settings::default();
    let registry = GameRegistry::new(&settings, Arc::new(scenario.terrain()));
    let mut session = Session::new(registry, Arc::new(RecordingSink::new()));
    scenario.run(&mut session).unwrap();
    let failures = scenario.check(&session);
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("area"));
}

#[test]
fn unknown_labels_stop_the_run() {
    let text = r#"
name: broken
games:
  - name: alpha
actions:
  - { action: link, game: alpha, from: a, to: b, team: red }
"#;
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("broken.yaml"), text).unwrap();
    let scenario = ScenarioLoader::new(dir.path()).load("broken.yaml").unwrap();
    let settings = Settings::default();
    let registry = GameRegistry::new(&settings, Arc::new(scenario.terrain()));
    let mut session = Session::new(registry, Arc::new(RecordingSink::new()));
    assert!(scenario.run(&mut session).is_err());
}
