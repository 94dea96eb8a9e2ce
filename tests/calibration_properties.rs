use proptest::prelude::*;
use seethrough_rig::calibration::{CalibrationProfile, CalibrationSurface};
use seethrough_rig::ecs::{Entity, World};
use seethrough_rig::rig::{
    BarrelDistortion, Camera, CameraRig, RigConfig, RigContext, SeeThroughMode, Transform,
    spawn_rig,
};

fn optical_rig() -> (World, Entity) {
    let mut world = World::new();
    let rig = spawn_rig(
        &mut world,
        &RigConfig {
            initial_mode: SeeThroughMode::Optical,
            ..RigConfig::default()
        },
    )
    .expect("prefab spawns");
    RigContext::new(&mut world, rig)
        .and_then(|mut ctx| ctx.bind())
        .expect("prefab binds");
    (world, rig)
}

proptest! {
    #[test]
    fn offset_is_mirrored_across_eyes(offset in 0.0f32..=0.5) {
        let (mut world, rig) = optical_rig();
        let assignment = world.get::<CameraRig>(rig).unwrap().assignment();
        {
            let mut ctx = RigContext::new(&mut world, rig).unwrap();
            ctx.set_fov_center_offset(offset).unwrap();
            ctx.propagate_distortion().unwrap();
        }

        let left = world.get::<BarrelDistortion>(assignment.left_eye).unwrap();
        let right = world.get::<BarrelDistortion>(assignment.right_eye).unwrap();
        prop_assert_eq!(left.offset, offset);
        prop_assert_eq!(right.offset, -offset);
    }

    #[test]
    fn pupil_distance_is_right_minus_left(distance in 0.0f32..0.2) {
        let (mut world, rig) = optical_rig();
        let assignment = world.get::<CameraRig>(rig).unwrap().assignment();
        let reported = {
            let mut ctx = RigContext::new(&mut world, rig).unwrap();
            ctx.set_pupil_distance(distance).unwrap();
            ctx.pupil_distance().unwrap()
        };

        let left = world.get::<Transform>(assignment.left_eye).unwrap().local_position;
        let right = world.get::<Transform>(assignment.right_eye).unwrap().local_position;
        prop_assert!((right[0] - left[0] - distance).abs() < 1e-6);
        prop_assert!((reported - distance).abs() < 1e-6);
        prop_assert_eq!(left[0], -right[0]);
    }

    #[test]
    fn eyes_share_fov_and_radius(fov in 20.0f32..120.0, radius in 0.1f32..3.0) {
        let (mut world, rig) = optical_rig();
        let assignment = world.get::<CameraRig>(rig).unwrap().assignment();
        {
            let mut ctx = RigContext::new(&mut world, rig).unwrap();
            ctx.set_field_of_view(fov).unwrap();
            ctx.set_distortion_radius(radius).unwrap();
        }

        let left = world.get::<Camera>(assignment.left_eye).unwrap();
        let right = world.get::<Camera>(assignment.right_eye).unwrap();
        prop_assert_eq!(left.field_of_view, right.field_of_view);
        let left = world.get::<BarrelDistortion>(assignment.left_eye).unwrap();
        let right = world.get::<BarrelDistortion>(assignment.right_eye).unwrap();
        prop_assert_eq!(left.distortion_radius, radius);
        prop_assert_eq!(right.distortion_radius, radius);
    }

    #[test]
    fn out_of_range_offset_is_rejected(offset in prop_oneof![-10.0f32..-0.001, 0.501f32..10.0]) {
        let (mut world, rig) = optical_rig();
        let mut ctx = RigContext::new(&mut world, rig).unwrap();

        prop_assert!(ctx.set_fov_center_offset(offset).is_err());
        prop_assert_eq!(ctx.fov_center_offset().unwrap(), 0.0);
    }
}

#[test]
fn captured_profile_round_trips_through_json() {
    let (mut world, rig) = optical_rig();
    let mut ctx = RigContext::new(&mut world, rig).unwrap();
    let profile = CalibrationProfile {
        name: "bench".to_string(),
        field_of_view: 72.5,
        distortion_radius: 1.4,
        pupil_distance: 0.062,
        eye_center_offset: [0.0, 0.07, 0.06],
        fov_center_offset: 0.12,
    };
    ctx.apply_profile(&profile).unwrap();

    let json = ctx.capture_profile("bench").unwrap().to_json().unwrap();
    let restored = CalibrationProfile::from_json_str(&json).unwrap();

    assert_eq!(restored.field_of_view, 72.5);
    assert!((restored.pupil_distance - 0.062).abs() < 1e-6);
    assert_eq!(restored.eye_center_offset, [0.0, 0.07, 0.06]);
}
