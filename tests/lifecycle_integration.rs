use seethrough_rig::calibration::{CalibrationProfile, CalibrationSurface, JsonProfileLoader};
use seethrough_rig::engine::{Engine, EngineConfig};
use seethrough_rig::input::NullInput;
use seethrough_rig::rig::{CameraRig, RigConfig, SessionId};
use std::io::Write;
use std::sync::Arc;

const MAIN: SessionId = SessionId(1);

#[test]
fn resolve_after_teardown_yields_no_instance() {
    let mut engine = Engine::new();
    let rig = engine.spawn_rig(&RigConfig::default()).unwrap();
    engine.step();
    assert_eq!(engine.resolve_rig(MAIN), Some(rig));

    assert!(engine.teardown_rig(MAIN).unwrap());

    assert!(!engine.world().contains(rig));
    assert_eq!(engine.resolve_rig(MAIN), None);
    assert!(engine.rig(MAIN).is_none());
    assert!(!engine.teardown_rig(MAIN).unwrap());
    engine.step();
}

#[test]
fn resolve_after_teardown_finds_replacement_rig() {
    let mut engine = Engine::new();
    let first = engine.spawn_rig(&RigConfig::default()).unwrap();
    engine.step();
    assert_eq!(engine.resolve_rig(MAIN), Some(first));
    assert!(engine.teardown_rig(MAIN).unwrap());

    let second = engine.spawn_rig(&RigConfig::default()).unwrap();
    engine.step();

    assert_ne!(first, second);
    assert_eq!(engine.resolve_rig(MAIN), Some(second));
    assert!(engine.world().get::<CameraRig>(second).unwrap().is_bound());
}

#[test]
fn teardown_only_touches_the_sessions_own_rig() {
    let mut engine = Engine::new();
    let owned = engine.spawn_rig(&RigConfig::default()).unwrap();
    let unclaimed = engine.spawn_rig(&RigConfig::default()).unwrap();
    engine.register_rig(MAIN, owned);
    engine.step();

    assert!(!engine.teardown_rig(SessionId(99)).unwrap());
    assert!(engine.world().contains(unclaimed));
    assert!(engine.world().contains(owned));

    assert!(engine.teardown_rig(MAIN).unwrap());
    assert!(!engine.world().contains(owned));
    assert!(engine.world().contains(unclaimed));
}

#[test]
fn rig_despawned_behind_the_registry_is_not_returned() {
    let mut engine = Engine::new();
    let rig = engine.spawn_rig(&RigConfig::default()).unwrap();
    assert_eq!(engine.resolve_rig(MAIN), Some(rig));

    engine.world_mut().despawn(rig).unwrap();

    assert_eq!(engine.resolve_rig(MAIN), None);
    assert!(engine.registry().is_empty());
}

#[test]
fn startup_applies_profile_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let profile = CalibrationProfile {
        name: "unit-07".to_string(),
        field_of_view: 64.0,
        pupil_distance: 0.066,
        fov_center_offset: 0.2,
        ..CalibrationProfile::default()
    };
    write!(file, "{}", profile.to_json().unwrap()).unwrap();

    let mut engine = Engine::with_parts(
        EngineConfig::default(),
        Box::new(NullInput),
        Arc::new(JsonProfileLoader::new(file.path())),
    );
    engine.spawn_rig(&RigConfig::default()).unwrap();
    engine.step();

    let ctx = engine.rig(MAIN).expect("rig resolves");
    assert_eq!(ctx.field_of_view().unwrap(), 64.0);
    assert!((ctx.pupil_distance().unwrap() - 0.066).abs() < 1e-6);
    assert_eq!(ctx.fov_center_offset().unwrap(), 0.2);
}

#[test]
fn missing_profile_still_binds_rig() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = Engine::with_parts(
        EngineConfig::default(),
        Box::new(NullInput),
        Arc::new(JsonProfileLoader::new(dir.path().join("missing.json"))),
    );
    let rig = engine
        .spawn_rig(&RigConfig {
            field_of_view: 55.0,
            ..RigConfig::default()
        })
        .unwrap();
    engine.step();

    assert!(engine.world().get::<CameraRig>(rig).unwrap().is_bound());
    let ctx = engine.rig(MAIN).unwrap();
    assert_eq!(ctx.field_of_view().unwrap(), 55.0);
}

#[test]
fn rig_config_loads_from_json() {
    let config = RigConfig::from_json_str(
        r#"{ "initial_mode": "Optical", "toggle_key": "Tap", "show_mode_switch_button": false }"#,
    )
    .unwrap();
    let mut engine = Engine::new();
    let rig = engine.spawn_rig(&config).unwrap();
    engine.step();

    let state = engine.world().get::<CameraRig>(rig).unwrap();
    assert!(!state.shows_mode_switch_button());
    assert_eq!(state.toggle_key(), seethrough_rig::input::KeyCode::Tap);
    assert_eq!(state.cached_culling_mask(), Some(config.center_culling_mask));
}
