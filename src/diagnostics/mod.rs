use crate::ecs::{Entity, World};
use crate::engine::schedule::{FrameProfile, Stage};
use crate::rig::{
    BarrelDistortion, Camera, CameraRig, LayerMask, PassthroughVideo, SeeThroughMode, Transform,
};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct StageSample {
    pub stage: &'static str,
    pub total_ms: f32,
    pub systems: usize,
}

/// Per-frame snapshot of one rig's observable state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RigTelemetry {
    pub frame: u64,
    pub mode: SeeThroughMode,
    pub eye_cameras_active: [bool; 2],
    pub passthrough_enabled: bool,
    pub center_culling_mask: LayerMask,
    pub field_of_view: [f32; 2],
    pub pupil_distance: f32,
    pub distortion_offsets: [f32; 2],
}

impl RigTelemetry {
    /// Reads the rig's state back out of the world. `None` when any part of
    /// the prefab is gone.
    pub fn capture(world: &World, rig: Entity, frame: u64) -> Option<Self> {
        let state = world.get::<CameraRig>(rig)?;
        let assignment = state.assignment();
        let left = world.get::<Camera>(assignment.left_eye)?;
        let right = world.get::<Camera>(assignment.right_eye)?;
        let left_position = world.get::<Transform>(assignment.left_eye)?.local_position;
        let right_position = world.get::<Transform>(assignment.right_eye)?.local_position;
        let left_distortion = world.get::<BarrelDistortion>(assignment.left_eye)?;
        let right_distortion = world.get::<BarrelDistortion>(assignment.right_eye)?;
        let center = world.get::<Camera>(assignment.center_camera)?;
        let passthrough = world.get::<PassthroughVideo>(assignment.center_camera)?;

        Some(Self {
            frame,
            mode: state.mode(),
            eye_cameras_active: [left.active, right.active],
            passthrough_enabled: passthrough.enabled,
            center_culling_mask: center.culling_mask,
            field_of_view: [left.field_of_view, right.field_of_view],
            pupil_distance: right_position[0] - left_position[0],
            distortion_offsets: [left_distortion.offset, right_distortion.offset],
        })
    }

    /// Eye cameras and passthrough never run together, and both eyes agree.
    pub fn is_consistent(&self) -> bool {
        let [left, right] = self.eye_cameras_active;
        left == right && left != self.passthrough_enabled
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameTelemetry {
    pub frame: u64,
    pub stage_samples: Vec<StageSample>,
    pub rigs: Vec<RigTelemetry>,
}

impl FrameTelemetry {
    pub fn new(frame: u64, profile: &FrameProfile, rigs: Vec<RigTelemetry>) -> Self {
        let stage_samples = Stage::ordered()
            .iter()
            .filter_map(|stage| profile.stage(*stage))
            .map(|sample| StageSample {
                stage: sample.stage.label(),
                total_ms: sample.total_ms(),
                systems: sample.sequential_systems.len() + sample.parallel_count,
            })
            .collect();

        Self {
            frame,
            stage_samples,
            rigs,
        }
    }
}

/// Holds the most recent frame telemetry; attached to a diagnostics entity.
#[derive(Default)]
pub struct TelemetrySurface {
    latest: Option<FrameTelemetry>,
    inconsistent_frames: u64,
}

impl TelemetrySurface {
    /// Stores `telemetry`, returning whether every rig in it was consistent.
    pub fn record(&mut self, telemetry: FrameTelemetry) -> bool {
        let consistent = telemetry.rigs.iter().all(RigTelemetry::is_consistent);
        if !consistent {
            self.inconsistent_frames += 1;
            log::warn!(
                "[diagnostics] frame {} has eye cameras and passthrough out of step",
                telemetry.frame
            );
        }
        match serde_json::to_string(&telemetry) {
            Ok(json) => log::debug!("[diagnostics] {json}"),
            Err(err) => log::warn!(
                "[diagnostics] failed to serialize frame {}: {err}",
                telemetry.frame
            ),
        }
        self.latest = Some(telemetry);
        consistent
    }

    pub fn latest(&self) -> Option<&FrameTelemetry> {
        self.latest.as_ref()
    }

    pub fn inconsistent_frames(&self) -> u64 {
        self.inconsistent_frames
    }
}
