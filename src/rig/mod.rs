pub mod components;
pub mod registry;

pub use components::{BarrelDistortion, Camera, LayerMask, PassthroughVideo, Transform, Vec3};
pub use registry::{RigRegistry, SessionId};

use crate::calibration::{
    CalibrationError, CalibrationLoader, CalibrationResult, CalibrationSurface,
    check_fov_center_offset,
};
use crate::ecs::{Component, EcsError, Entity, World};
use crate::input::{InputSource, KeyCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How the wearer sees the real world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeeThroughMode {
    /// Center camera composites the live camera feed.
    Video,
    /// Eye cameras render through the optical combiners.
    Optical,
}

impl SeeThroughMode {
    pub fn toggled(self) -> Self {
        match self {
            SeeThroughMode::Video => SeeThroughMode::Optical,
            SeeThroughMode::Optical => SeeThroughMode::Video,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RigError {
    #[error(transparent)]
    Ecs(#[from] EcsError),
    #[error("entity {entity:?} has no {component} component")]
    MissingComponent {
        entity: Entity,
        component: &'static str,
    },
    #[error("rig {0:?} is not bound to its cameras")]
    Unbound(Entity),
}

pub type RigResult<T> = Result<T, RigError>;

impl From<RigError> for CalibrationError {
    fn from(err: RigError) -> Self {
        CalibrationError::Unavailable(err.to_string())
    }
}

/// Owner-supplied setup for a rig prefab.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    pub initial_mode: SeeThroughMode,
    pub toggle_key: KeyCode,
    pub show_mode_switch_button: bool,
    pub center_culling_mask: LayerMask,
    pub field_of_view: f32,
    pub pupil_distance: f32,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            initial_mode: SeeThroughMode::Video,
            toggle_key: KeyCode::None,
            show_mode_switch_button: true,
            center_culling_mask: LayerMask::EVERYTHING,
            field_of_view: 60.0,
            pupil_distance: 0.064,
        }
    }
}

impl RigConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Entities the rig drives, assigned when the prefab is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RigAssignment {
    pub center_camera: Entity,
    /// Shared optical origin the eye cameras hang off.
    pub eye_anchor: Entity,
    pub left_eye: Entity,
    pub right_eye: Entity,
}

impl RigAssignment {
    fn entities(&self) -> [Entity; 4] {
        [
            self.center_camera,
            self.eye_anchor,
            self.left_eye,
            self.right_eye,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RigBinding {
    center_culling_mask: LayerMask,
}

/// Rig state stored on the rig's root entity.
///
/// FOV, distortion radius, pupil distance and eye-center offset are not kept
/// here; they live on the camera, corrector and anchor components.
#[derive(Debug, Clone)]
pub struct CameraRig {
    mode: SeeThroughMode,
    fov_center_offset: f32,
    toggle_key: KeyCode,
    show_mode_switch_button: bool,
    assignment: RigAssignment,
    binding: Option<RigBinding>,
    last_toggle_frame: Option<u64>,
}

impl CameraRig {
    pub fn new(config: &RigConfig, assignment: RigAssignment) -> Self {
        Self {
            mode: config.initial_mode,
            fov_center_offset: 0.0,
            toggle_key: config.toggle_key,
            show_mode_switch_button: config.show_mode_switch_button,
            assignment,
            binding: None,
            last_toggle_frame: None,
        }
    }

    pub fn mode(&self) -> SeeThroughMode {
        self.mode
    }

    pub fn toggle_key(&self) -> KeyCode {
        self.toggle_key
    }

    pub fn set_toggle_key(&mut self, key: KeyCode) {
        self.toggle_key = key;
    }

    pub fn shows_mode_switch_button(&self) -> bool {
        self.show_mode_switch_button
    }

    pub fn set_show_mode_switch_button(&mut self, visible: bool) {
        self.show_mode_switch_button = visible;
    }

    pub fn assignment(&self) -> RigAssignment {
        self.assignment
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Center culling mask cached at bind time.
    pub fn cached_culling_mask(&self) -> Option<LayerMask> {
        self.binding.map(|binding| binding.center_culling_mask)
    }
}

/// Builds the rig prefab: center camera with passthrough, eye anchor, two eye
/// cameras with distortion correctors, and the rig root. Eye cameras start
/// inactive; the first frame puts everything in the configured mode.
pub fn spawn_rig(world: &mut World, config: &RigConfig) -> RigResult<Entity> {
    let center_camera = world.spawn();
    world.insert(
        center_camera,
        Camera {
            field_of_view: config.field_of_view,
            culling_mask: config.center_culling_mask,
            active: true,
        },
    )?;
    world.insert(center_camera, Transform::default())?;
    world.insert(center_camera, PassthroughVideo::default())?;

    let eye_anchor = world.spawn();
    world.insert(eye_anchor, Transform::default())?;

    let half = config.pupil_distance / 2.0;
    let left_eye = spawn_eye(world, config.field_of_view, -half)?;
    let right_eye = spawn_eye(world, config.field_of_view, half)?;

    let assignment = RigAssignment {
        center_camera,
        eye_anchor,
        left_eye,
        right_eye,
    };
    let rig = world.spawn();
    world.insert(rig, CameraRig::new(config, assignment))?;

    log::debug!("[rig] spawned rig {rig:?} with {assignment:?}");
    Ok(rig)
}

fn spawn_eye(world: &mut World, field_of_view: f32, x: f32) -> RigResult<Entity> {
    let eye = world.spawn();
    world.insert(
        eye,
        Camera {
            field_of_view,
            culling_mask: LayerMask::EVERYTHING,
            active: false,
        },
    )?;
    world.insert(eye, Transform::at([x, 0.0, 0.0]))?;
    world.insert(eye, BarrelDistortion::default())?;
    Ok(eye)
}

/// Despawns the rig root and every entity assigned to it that is still alive.
pub fn despawn_rig(world: &mut World, rig: Entity) -> RigResult<()> {
    let assignment = world
        .get::<CameraRig>(rig)
        .map(CameraRig::assignment)
        .ok_or(RigError::MissingComponent {
            entity: rig,
            component: "CameraRig",
        })?;

    for entity in assignment.entities() {
        if world.contains(entity) {
            world.despawn(entity)?;
        }
    }
    world.despawn(rig)?;
    log::debug!("[rig] despawned rig {rig:?}");
    Ok(())
}

/// Operations on one rig, borrowing the world it lives in.
pub struct RigContext<'w> {
    world: &'w mut World,
    rig: Entity,
    assignment: RigAssignment,
}

impl<'w> RigContext<'w> {
    pub fn new(world: &'w mut World, rig: Entity) -> RigResult<Self> {
        let assignment = world
            .get::<CameraRig>(rig)
            .map(CameraRig::assignment)
            .ok_or(RigError::MissingComponent {
                entity: rig,
                component: "CameraRig",
            })?;
        Ok(Self {
            world,
            rig,
            assignment,
        })
    }

    pub fn entity(&self) -> Entity {
        self.rig
    }

    pub fn assignment(&self) -> RigAssignment {
        self.assignment
    }

    pub fn state(&self) -> RigResult<&CameraRig> {
        self.component::<CameraRig>(self.rig, "CameraRig")
    }

    fn state_mut(&mut self) -> RigResult<&mut CameraRig> {
        let rig = self.rig;
        self.component_mut::<CameraRig>(rig, "CameraRig")
    }

    fn component<T: Component>(&self, entity: Entity, name: &'static str) -> RigResult<&T> {
        self.world
            .get::<T>(entity)
            .ok_or(RigError::MissingComponent {
                entity,
                component: name,
            })
    }

    fn component_mut<T: Component>(
        &mut self,
        entity: Entity,
        name: &'static str,
    ) -> RigResult<&mut T> {
        self.world
            .get_mut::<T>(entity)
            .ok_or(RigError::MissingComponent {
                entity,
                component: name,
            })
    }

    /// Binds the rig to its correctors and passthrough renderer, caches the
    /// center culling mask and lets `loader` apply the device defaults.
    ///
    /// A loader failure is logged and does not undo the binding.
    pub fn initialize(&mut self, loader: &dyn CalibrationLoader) -> RigResult<()> {
        self.bind()?;
        if let Err(err) = loader.load_default(&mut *self) {
            log::warn!(
                "[rig] {} could not apply defaults to {:?}: {err}",
                loader.label(),
                self.rig
            );
        }
        Ok(())
    }

    pub fn bind(&mut self) -> RigResult<()> {
        let RigAssignment {
            center_camera,
            eye_anchor,
            left_eye,
            right_eye,
        } = self.assignment;

        for eye in [left_eye, right_eye] {
            self.component::<Camera>(eye, "Camera")?;
            self.component::<Transform>(eye, "Transform")?;
            self.component::<BarrelDistortion>(eye, "BarrelDistortion")?;
        }
        self.component::<Transform>(eye_anchor, "Transform")?;
        self.component::<PassthroughVideo>(center_camera, "PassthroughVideo")?;
        let center_culling_mask = self.component::<Camera>(center_camera, "Camera")?.culling_mask;

        self.state_mut()?.binding = Some(RigBinding {
            center_culling_mask,
        });
        log::info!(
            "[rig] bound {:?} (center mask {:#x})",
            self.rig,
            center_culling_mask.0
        );
        Ok(())
    }

    pub fn mode(&self) -> RigResult<SeeThroughMode> {
        Ok(self.state()?.mode)
    }

    pub fn set_mode(&mut self, mode: SeeThroughMode) -> RigResult<()> {
        self.state_mut()?.mode = mode;
        Ok(())
    }

    pub fn toggle_mode(&mut self) -> RigResult<SeeThroughMode> {
        let rig = self.rig;
        let state = self.state_mut()?;
        state.mode = state.mode.toggled();
        log::info!("[rig] {rig:?} switched to {:?} see-through", state.mode);
        Ok(state.mode)
    }

    /// Flips the mode at most once per frame, however many toggle requests
    /// (key edges, button presses) arrive during `frame`.
    pub fn request_toggle(&mut self, frame: u64) -> RigResult<bool> {
        let state = self.state_mut()?;
        if state.last_toggle_frame == Some(frame) {
            log::debug!("[rig] toggle already handled in frame {frame}");
            return Ok(false);
        }
        state.last_toggle_frame = Some(frame);
        self.toggle_mode()?;
        Ok(true)
    }

    /// Puts cameras, passthrough and center culling in the state the current
    /// mode demands. Safe to call every frame.
    pub fn apply_mode(&mut self) -> RigResult<()> {
        let state = self.state()?;
        let optical = state.mode == SeeThroughMode::Optical;
        let original_mask = state
            .binding
            .ok_or(RigError::Unbound(self.rig))?
            .center_culling_mask;

        let RigAssignment {
            center_camera,
            left_eye,
            right_eye,
            ..
        } = self.assignment;

        self.component_mut::<Camera>(left_eye, "Camera")?.active = optical;
        self.component_mut::<Camera>(right_eye, "Camera")?.active = optical;
        self.component_mut::<PassthroughVideo>(center_camera, "PassthroughVideo")?
            .enabled = !optical;
        self.component_mut::<Camera>(center_camera, "Camera")?.culling_mask = if optical {
            LayerMask::NOTHING
        } else {
            original_mask
        };
        Ok(())
    }

    /// Mirrors the FOV-center offset into the two correctors. Does nothing
    /// outside optical mode.
    pub fn propagate_distortion(&mut self) -> RigResult<()> {
        let state = self.state()?;
        if state.mode != SeeThroughMode::Optical {
            return Ok(());
        }
        let offset = state.fov_center_offset;
        let RigAssignment {
            left_eye,
            right_eye,
            ..
        } = self.assignment;

        self.component_mut::<BarrelDistortion>(left_eye, "BarrelDistortion")?
            .offset = offset;
        self.component_mut::<BarrelDistortion>(right_eye, "BarrelDistortion")?
            .offset = -offset;
        Ok(())
    }

    /// Flips the mode when the configured toggle key went down this frame.
    pub fn poll_toggle(&mut self, input: &dyn InputSource, frame: u64) -> RigResult<bool> {
        let key = self.state()?.toggle_key;
        if key == KeyCode::None || !input.key_down(key) {
            return Ok(false);
        }
        self.request_toggle(frame)
    }

    /// One full frame for hosts that drive the rig without the scheduler:
    /// activation, then distortion propagation, then the toggle check.
    pub fn update(&mut self, input: &dyn InputSource, frame: u64) -> RigResult<()> {
        self.apply_mode()?;
        self.propagate_distortion()?;
        self.poll_toggle(input, frame)?;
        Ok(())
    }

    /// Transform the wearer's eyes are centered on in the current mode.
    pub fn current_eye_center(&self) -> RigResult<Entity> {
        Ok(match self.state()?.mode {
            SeeThroughMode::Optical => self.assignment.eye_anchor,
            SeeThroughMode::Video => self.assignment.center_camera,
        })
    }
}

impl CalibrationSurface for RigContext<'_> {
    fn field_of_view(&self) -> CalibrationResult<f32> {
        Ok(self
            .component::<Camera>(self.assignment.left_eye, "Camera")?
            .field_of_view)
    }

    fn set_field_of_view(&mut self, degrees: f32) -> CalibrationResult<()> {
        let RigAssignment {
            left_eye,
            right_eye,
            ..
        } = self.assignment;
        self.component_mut::<Camera>(left_eye, "Camera")?.field_of_view = degrees;
        self.component_mut::<Camera>(right_eye, "Camera")?.field_of_view = degrees;
        Ok(())
    }

    fn distortion_radius(&self) -> CalibrationResult<f32> {
        Ok(self
            .component::<BarrelDistortion>(self.assignment.left_eye, "BarrelDistortion")?
            .distortion_radius)
    }

    fn set_distortion_radius(&mut self, radius: f32) -> CalibrationResult<()> {
        let RigAssignment {
            left_eye,
            right_eye,
            ..
        } = self.assignment;
        self.component_mut::<BarrelDistortion>(left_eye, "BarrelDistortion")?
            .distortion_radius = radius;
        self.component_mut::<BarrelDistortion>(right_eye, "BarrelDistortion")?
            .distortion_radius = radius;
        Ok(())
    }

    fn pupil_distance(&self) -> CalibrationResult<f32> {
        let left = self.component::<Transform>(self.assignment.left_eye, "Transform")?;
        let right = self.component::<Transform>(self.assignment.right_eye, "Transform")?;
        Ok(right.local_position[0] - left.local_position[0])
    }

    fn set_pupil_distance(&mut self, distance: f32) -> CalibrationResult<()> {
        let half = distance / 2.0;
        let RigAssignment {
            left_eye,
            right_eye,
            ..
        } = self.assignment;
        self.component_mut::<Transform>(left_eye, "Transform")?
            .local_position = [-half, 0.0, 0.0];
        self.component_mut::<Transform>(right_eye, "Transform")?
            .local_position = [half, 0.0, 0.0];
        Ok(())
    }

    fn eye_center_offset(&self) -> CalibrationResult<Vec3> {
        Ok(self
            .component::<Transform>(self.assignment.eye_anchor, "Transform")?
            .local_position)
    }

    fn set_eye_center_offset(&mut self, offset: Vec3) -> CalibrationResult<()> {
        let anchor = self.assignment.eye_anchor;
        self.component_mut::<Transform>(anchor, "Transform")?
            .local_position = offset;
        Ok(())
    }

    fn fov_center_offset(&self) -> CalibrationResult<f32> {
        Ok(self.state()?.fov_center_offset)
    }

    fn set_fov_center_offset(&mut self, offset: f32) -> CalibrationResult<()> {
        check_fov_center_offset(offset)?;
        self.state_mut()?.fov_center_offset = offset;
        Ok(())
    }
}
