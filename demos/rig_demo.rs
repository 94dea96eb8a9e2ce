/// Drives a rig through a few frames, flipping see-through mode with the
/// toggle key. Run with `RUST_LOG=debug` to see per-frame telemetry.
use seethrough_rig::calibration::CalibrationSurface;
use seethrough_rig::engine::Engine;
use seethrough_rig::input::{KeyCode, KeyboardInput};
use seethrough_rig::rig::{RigConfig, SessionId};
use std::env;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let frames: u64 = env::args()
        .nth(1)
        .map(|arg| arg.parse::<u64>())
        .transpose()?
        .unwrap_or(8);

    let keyboard = KeyboardInput::new();
    let mut engine = Engine::with_input(Box::new(keyboard.clone()));
    engine.spawn_rig(&RigConfig {
        toggle_key: KeyCode::Space,
        ..RigConfig::default()
    })?;

    let session = SessionId(0);
    for frame in 1..=frames {
        if frame % 3 == 0 {
            keyboard.press(KeyCode::Space);
        } else {
            keyboard.release(KeyCode::Space);
        }
        engine.step();

        if let Some(ctx) = engine.rig(session) {
            println!(
                "frame {frame}: {:?} fov {:.1} ipd {:.3}",
                ctx.mode()?,
                ctx.field_of_view()?,
                ctx.pupil_distance()?
            );
        }
    }

    Ok(())
}
