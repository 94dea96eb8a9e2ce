pub mod schedule;

use crate::calibration::{BuiltinCalibration, CalibrationLoader};
use crate::diagnostics::{FrameTelemetry, RigTelemetry, TelemetrySurface};
use crate::ecs::{Entity, World};
use crate::input::{InputSource, NullInput};
use crate::rig::{
    CameraRig, RigConfig, RigContext, RigRegistry, RigResult, SessionId, despawn_rig,
    spawn_rig,
};
use schedule::{Scheduler, Stage};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

const DEFAULT_MAX_FRAMES: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Frames executed by [`Engine::run`].
    pub max_frames: u32,
    /// Capture rig telemetry after every frame.
    pub record_telemetry: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_frames: DEFAULT_MAX_FRAMES,
            record_telemetry: true,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

type SharedInput = Arc<Mutex<Box<dyn InputSource>>>;
type CapturedRigs = Arc<Mutex<Vec<RigTelemetry>>>;

/// Host loop driving every rig in its world once per frame.
pub struct Engine {
    scheduler: Scheduler,
    config: EngineConfig,
    frame: u64,
    registry: RigRegistry,
    input: SharedInput,
    captured_rigs: CapturedRigs,
    diagnostics_entity: Option<Entity>,
}

impl Engine {
    pub fn new() -> Self {
        Self::with_parts(
            EngineConfig::default(),
            Box::new(NullInput),
            Arc::new(BuiltinCalibration::default()),
        )
    }

    pub fn with_input(input: Box<dyn InputSource>) -> Self {
        Self::with_parts(
            EngineConfig::default(),
            input,
            Arc::new(BuiltinCalibration::default()),
        )
    }

    pub fn with_parts(
        config: EngineConfig,
        input: Box<dyn InputSource>,
        loader: Arc<dyn CalibrationLoader>,
    ) -> Self {
        log::info!(
            "[engine] input '{}', calibration '{}'",
            input.label(),
            loader.label()
        );
        let mut engine = Self {
            scheduler: Scheduler::default(),
            config,
            frame: 0,
            registry: RigRegistry::new(),
            input: Arc::new(Mutex::new(input)),
            captured_rigs: CapturedRigs::default(),
            diagnostics_entity: None,
        };
        engine.register_core_systems(loader);
        engine
    }

    pub fn add_system_fn<F>(&mut self, stage: Stage, name: &'static str, func: F)
    where
        F: FnMut(&mut World, u64) + Send + 'static,
    {
        self.scheduler.add_system_fn(stage, name, func);
    }

    pub fn add_parallel_system_fn<F>(&mut self, stage: Stage, name: &'static str, func: F)
    where
        F: Fn(&World, u64) + Send + Sync + 'static,
    {
        self.scheduler.add_parallel_system_fn(stage, name, func);
    }

    pub fn configure_max_frames(&mut self, frames: u32) {
        self.config.max_frames = frames.max(1);
    }

    pub fn run(&mut self) {
        for _ in 0..self.config.max_frames {
            self.step();
        }
    }

    /// Executes exactly one frame.
    pub fn step(&mut self) {
        self.frame += 1;
        self.scheduler.tick(self.frame);
        self.input
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .advance_frame();
        if self.config.record_telemetry {
            self.update_frame_diagnostics();
        }
    }

    /// Index of the last completed frame; 0 before the first.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn world(&self) -> &World {
        self.scheduler.world()
    }

    pub fn world_mut(&mut self) -> &mut World {
        self.scheduler.world_mut()
    }

    pub fn registry(&self) -> &RigRegistry {
        &self.registry
    }

    /// Builds a rig prefab. It is bound and calibrated at the start of the
    /// next frame.
    pub fn spawn_rig(&mut self, config: &RigConfig) -> RigResult<Entity> {
        spawn_rig(self.scheduler.world_mut(), config)
    }

    pub fn register_rig(&mut self, session: SessionId, rig: Entity) {
        if let Some(previous) = self.registry.register(session, rig) {
            log::debug!("[engine] {session:?} rebound from {previous:?} to {rig:?}");
        }
    }

    pub fn resolve_rig(&mut self, session: SessionId) -> Option<Entity> {
        self.registry.resolve(session, self.scheduler.world())
    }

    /// Context over the session's rig, or `None` when no live rig resolves.
    pub fn rig(&mut self, session: SessionId) -> Option<RigContext<'_>> {
        let rig = self.resolve_rig(session)?;
        RigContext::new(self.scheduler.world_mut(), rig).ok()
    }

    /// Destroys the rig registered to `session` and forgets it. Returns
    /// `false` when the session owns no live rig; unclaimed rigs are never
    /// touched.
    pub fn teardown_rig(&mut self, session: SessionId) -> RigResult<bool> {
        let Some(rig) = self.registry.release(session) else {
            return Ok(false);
        };
        if !self.world().has::<CameraRig>(rig) {
            log::debug!("[engine] {session:?} released stale rig {rig:?}");
            return Ok(false);
        }
        despawn_rig(self.scheduler.world_mut(), rig)?;
        log::info!("[engine] {session:?} tore down rig {rig:?}");
        Ok(true)
    }

    /// The on-screen mode button. Shares the once-per-frame toggle latch with
    /// the toggle key, keyed on the frame about to run.
    pub fn press_mode_button(&mut self, session: SessionId) -> RigResult<bool> {
        let pending_frame = self.frame + 1;
        let Some(mut rig) = self.rig(session) else {
            log::debug!("[engine] mode button pressed with no rig for {session:?}");
            return Ok(false);
        };
        if !rig.state()?.shows_mode_switch_button() {
            return Ok(false);
        }
        rig.request_toggle(pending_frame)
    }

    pub fn diagnostics_entity(&self) -> Option<Entity> {
        self.diagnostics_entity
    }

    pub fn latest_telemetry(&self) -> Option<&FrameTelemetry> {
        self.world()
            .get::<TelemetrySurface>(self.diagnostics_entity?)?
            .latest()
    }

    fn register_core_systems(&mut self, loader: Arc<dyn CalibrationLoader>) {
        let diagnostics = {
            let world = self.scheduler.world_mut();
            let entity = world.spawn();
            world
                .insert(entity, TelemetrySurface::default())
                .map(|_| entity)
                .ok()
        };
        self.diagnostics_entity = diagnostics;

        let mut failed_binds: HashSet<Entity> = HashSet::new();
        self.add_system_fn(Stage::Startup, "bind_rigs", move |world, _frame| {
            failed_binds.retain(|rig| world.contains(*rig));
            for rig in world.entities_with::<CameraRig>() {
                if world.get::<CameraRig>(rig).is_some_and(CameraRig::is_bound) {
                    continue;
                }
                let result =
                    RigContext::new(world, rig).and_then(|mut ctx| ctx.initialize(loader.as_ref()));
                match result {
                    Ok(()) => {
                        failed_binds.remove(&rig);
                    }
                    Err(err) if failed_binds.insert(rig) => {
                        log::warn!("[engine] failed to bind rig {rig:?}: {err}");
                    }
                    Err(err) => log::debug!("[engine] rig {rig:?} still unbound: {err}"),
                }
            }
        });

        self.add_system_fn(Stage::Activation, "apply_see_through_mode", |world, _frame| {
            for_each_bound_rig(world, "apply_see_through_mode", |ctx| ctx.apply_mode());
        });

        self.add_system_fn(Stage::Correction, "propagate_distortion", |world, _frame| {
            for_each_bound_rig(world, "propagate_distortion", |ctx| {
                ctx.propagate_distortion()
            });
        });

        let input = Arc::clone(&self.input);
        self.add_system_fn(Stage::Input, "poll_mode_toggle", move |world, frame| {
            let input = input.lock().unwrap_or_else(PoisonError::into_inner);
            for_each_bound_rig(world, "poll_mode_toggle", |ctx| {
                ctx.poll_toggle(&**input, frame).map(|_| ())
            });
        });

        let captured = Arc::clone(&self.captured_rigs);
        self.add_parallel_system_fn(
            Stage::Diagnostics,
            "capture_rig_telemetry",
            move |world, frame| {
                let rigs = world
                    .entities_with::<CameraRig>()
                    .into_iter()
                    .filter_map(|rig| RigTelemetry::capture(world, rig, frame))
                    .collect();
                *captured.lock().unwrap_or_else(PoisonError::into_inner) = rigs;
            },
        );
    }

    fn update_frame_diagnostics(&mut self) {
        let Some(entity) = self.diagnostics_entity else {
            return;
        };
        let rigs = std::mem::take(
            &mut *self
                .captured_rigs
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let telemetry = FrameTelemetry::new(self.frame, self.scheduler.last_profile(), rigs);

        if let Some(surface) = self
            .scheduler
            .world_mut()
            .get_mut::<TelemetrySurface>(entity)
        {
            surface.record(telemetry);
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

fn for_each_bound_rig<F>(world: &mut World, system: &str, mut op: F)
where
    F: FnMut(&mut RigContext<'_>) -> RigResult<()>,
{
    for rig in world.entities_with::<CameraRig>() {
        if !world.get::<CameraRig>(rig).is_some_and(CameraRig::is_bound) {
            continue;
        }
        let result = RigContext::new(world, rig).and_then(|mut ctx| op(&mut ctx));
        if let Err(err) = result {
            log::warn!("[engine] {system} skipped rig {rig:?}: {err}");
        }
    }
}
