pub mod calibration;
pub mod diagnostics;
pub mod ecs;
pub mod engine;
pub mod input;
pub mod rig;

/// Runs a default engine for its configured frame budget.
pub fn run() {
    let mut engine = engine::Engine::default();
    engine.run();
}
