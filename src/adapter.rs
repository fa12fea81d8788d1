//! Conversion from camera poses to the subscriber's transform representation.
//!
//! The camera is opened left-handed / Z-up in centimeters. Translation and
//! rotation are passed through unchanged: whether the subscriber's axes match
//! that convention is not verified here, so any future remapping belongs in
//! [`map_translation`] and [`map_rotation`] alone.

use crate::types::{DevicePose, Quat, Quaternion, Transform, Vec3, Vector3};

/// Map a camera-space translation onto the subscriber's axes.
pub fn map_translation(v: Vector3) -> Vec3 {
    Vec3 {
        x: v.x as f64,
        y: v.y as f64,
        z: v.z as f64,
    }
}

/// Map a camera-space rotation onto the subscriber's axes. Components are
/// copied in order with no renormalization.
pub fn map_rotation(q: Quaternion) -> Quat {
    Quat {
        x: q.x as f64,
        y: q.y as f64,
        z: q.z as f64,
        w: q.w as f64,
    }
}

/// Build the subscriber transform for a camera pose. Scale is always unit.
pub fn to_target_transform(pose: &DevicePose) -> Transform {
    Transform {
        translation: map_translation(pose.translation),
        rotation: map_rotation(pose.rotation),
        scale: Vec3::ONE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose(t: [f32; 3], q: [f32; 4]) -> DevicePose {
        DevicePose {
            translation: Vector3::new(t[0], t[1], t[2]),
            rotation: Quaternion::new(q[0], q[1], q[2], q[3]),
            ..DevicePose::default()
        }
    }

    #[test]
    fn test_scale_is_always_unit() {
        let poses = [
            pose([0.0, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0]),
            pose([1e6, -3.5, 0.001], [0.5, 0.5, 0.5, 0.5]),
            pose([-20.0, 7.25, 180.0], [0.0, 0.0, 0.0, 0.0]),
        ];
        for p in &poses {
            assert_eq!(to_target_transform(p).scale, Vec3::ONE);
        }
    }

    #[test]
    fn test_rotation_copied_component_for_component() {
        // Deliberately non-unit: must not be renormalized.
        let p = pose([0.0; 3], [0.1, -0.2, 0.3, 2.0]);
        let r = to_target_transform(&p).rotation;
        assert_eq!(r.x, 0.1f32 as f64);
        assert_eq!(r.y, -0.2f32 as f64);
        assert_eq!(r.z, 0.3f32 as f64);
        assert_eq!(r.w, 2.0);
    }

    #[test]
    fn test_translation_axes_not_permuted() {
        let p = pose([12.5, -40.0, 3.0], [0.0, 0.0, 0.0, 1.0]);
        let t = to_target_transform(&p).translation;
        assert_eq!((t.x, t.y, t.z), (12.5, -40.0, 3.0));
    }

    #[test]
    fn test_map_translation_is_identity() {
        let v = Vector3::new(1.0, 2.0, 3.0);
        assert_eq!(map_translation(v), Vec3 { x: 1.0, y: 2.0, z: 3.0 });
    }
}
