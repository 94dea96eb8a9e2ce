//! Device calibration contract.
//!
//! Every rig variant exposes the same five tunable parameters through
//! [`CalibrationSurface`], so calibration tooling and profile loaders can
//! target any form factor without knowing how the rig stores them.

use serde::{Deserialize, Serialize};
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const FOV_CENTER_OFFSET_RANGE: RangeInclusive<f32> = 0.0..=0.5;

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("{parameter} = {value} is outside [{min}, {max}]")]
    OutOfRange {
        parameter: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
    #[error("calibration target unavailable: {0}")]
    Unavailable(String),
    #[error("failed to read calibration profile {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed calibration profile: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type CalibrationResult<T> = Result<T, CalibrationError>;

/// Tunable optical parameters of a see-through rig.
///
/// Setters write through to the underlying targets immediately; getters read
/// the targets back rather than a cached copy.
pub trait CalibrationSurface {
    /// Vertical field of view in degrees, shared by both eyes.
    fn field_of_view(&self) -> CalibrationResult<f32>;
    fn set_field_of_view(&mut self, degrees: f32) -> CalibrationResult<()>;

    /// Barrel distortion radius, shared by both eye correctors.
    fn distortion_radius(&self) -> CalibrationResult<f32>;
    fn set_distortion_radius(&mut self, radius: f32) -> CalibrationResult<()>;

    /// Total inter-pupillary distance in meters.
    fn pupil_distance(&self) -> CalibrationResult<f32>;
    fn set_pupil_distance(&mut self, distance: f32) -> CalibrationResult<()>;

    /// Translation of the shared optical origin.
    fn eye_center_offset(&self) -> CalibrationResult<[f32; 3]>;
    fn set_eye_center_offset(&mut self, offset: [f32; 3]) -> CalibrationResult<()>;

    /// Optical-axis asymmetry, within [`FOV_CENTER_OFFSET_RANGE`].
    fn fov_center_offset(&self) -> CalibrationResult<f32>;
    fn set_fov_center_offset(&mut self, offset: f32) -> CalibrationResult<()>;

    /// Applies every parameter of `profile`. A failing parameter does not
    /// stop the rest from being applied; the first failure is returned.
    fn apply_profile(&mut self, profile: &CalibrationProfile) -> CalibrationResult<()> {
        let results = [
            self.set_field_of_view(profile.field_of_view),
            self.set_distortion_radius(profile.distortion_radius),
            self.set_pupil_distance(profile.pupil_distance),
            self.set_eye_center_offset(profile.eye_center_offset),
            self.set_fov_center_offset(profile.fov_center_offset),
        ];

        let mut first_error = None;
        for result in results {
            if let Err(err) = result {
                log::warn!("[calibration] profile '{}': {err}", profile.name);
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn capture_profile(&self, name: &str) -> CalibrationResult<CalibrationProfile> {
        Ok(CalibrationProfile {
            name: name.to_string(),
            field_of_view: self.field_of_view()?,
            distortion_radius: self.distortion_radius()?,
            pupil_distance: self.pupil_distance()?,
            eye_center_offset: self.eye_center_offset()?,
            fov_center_offset: self.fov_center_offset()?,
        })
    }
}

pub(crate) fn check_fov_center_offset(value: f32) -> CalibrationResult<()> {
    if FOV_CENTER_OFFSET_RANGE.contains(&value) {
        Ok(())
    } else {
        Err(CalibrationError::OutOfRange {
            parameter: "fov_center_offset",
            value,
            min: *FOV_CENTER_OFFSET_RANGE.start(),
            max: *FOV_CENTER_OFFSET_RANGE.end(),
        })
    }
}

/// A persisted set of calibration values for one physical device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationProfile {
    pub name: String,
    pub field_of_view: f32,
    pub distortion_radius: f32,
    pub pupil_distance: f32,
    pub eye_center_offset: [f32; 3],
    pub fov_center_offset: f32,
}

impl Default for CalibrationProfile {
    fn default() -> Self {
        Self {
            name: "reference".to_string(),
            field_of_view: 58.0,
            distortion_radius: 1.0,
            pupil_distance: 0.064,
            eye_center_offset: [0.0, 0.075, 0.065],
            fov_center_offset: 0.1,
        }
    }
}

impl CalibrationProfile {
    pub fn from_json_str(json: &str) -> CalibrationResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> CalibrationResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| CalibrationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn to_json(&self) -> CalibrationResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Applies a device's default calibration to a freshly bound rig.
pub trait CalibrationLoader: Send + Sync {
    fn label(&self) -> &'static str;
    fn load_default(&self, surface: &mut dyn CalibrationSurface) -> CalibrationResult<()>;
}

/// Loader backed by a profile compiled into the binary.
#[derive(Debug, Clone, Default)]
pub struct BuiltinCalibration {
    profile: CalibrationProfile,
}

impl BuiltinCalibration {
    pub fn new(profile: CalibrationProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &CalibrationProfile {
        &self.profile
    }
}

impl CalibrationLoader for BuiltinCalibration {
    fn label(&self) -> &'static str {
        "Builtin Calibration"
    }

    fn load_default(&self, surface: &mut dyn CalibrationSurface) -> CalibrationResult<()> {
        log::info!("[calibration] applying builtin profile '{}'", self.profile.name);
        surface.apply_profile(&self.profile)
    }
}

/// Loader reading a JSON profile from disk on every request.
#[derive(Debug, Clone)]
pub struct JsonProfileLoader {
    path: PathBuf,
    fallback: Option<CalibrationProfile>,
}

impl JsonProfileLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fallback: None,
        }
    }

    /// Profile applied when the file is missing or malformed.
    pub fn with_fallback(mut self, profile: CalibrationProfile) -> Self {
        self.fallback = Some(profile);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CalibrationLoader for JsonProfileLoader {
    fn label(&self) -> &'static str {
        "JSON Profile"
    }

    fn load_default(&self, surface: &mut dyn CalibrationSurface) -> CalibrationResult<()> {
        match CalibrationProfile::from_path(&self.path) {
            Ok(profile) => {
                log::info!(
                    "[calibration] applying profile '{}' from {}",
                    profile.name,
                    self.path.display()
                );
                surface.apply_profile(&profile)
            }
            Err(err) => match &self.fallback {
                Some(fallback) => {
                    log::warn!(
                        "[calibration] {err}; falling back to profile '{}'",
                        fallback.name
                    );
                    surface.apply_profile(fallback)
                }
                None => Err(err),
            },
        }
    }
}
