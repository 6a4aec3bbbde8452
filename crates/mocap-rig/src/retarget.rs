use crate::calibration::{CalibrationEngine, Phase};
use crate::labels::JointLabel;
use crate::skeleton::{BoneMap, Skeleton};
use glam::{Quat, Vec4};

/// Compose a raw sensor orientation against its T-pose reference.
///
/// The order is fixed: reference conjugate first, current orientation
/// second. Swapping the operands produces a plausible-looking but wrong
/// relative frame, which is why the order is pinned by tests.
pub fn relative_orientation(reference: Quat, raw: Quat) -> Quat {
    let current = Vec4::from(raw)
        .try_normalize()
        .map(Quat::from_vec4)
        .unwrap_or(raw);
    let relative = reference.conjugate() * current;
    Vec4::from(relative)
        .try_normalize()
        .map(Quat::from_vec4)
        .unwrap_or(relative)
}

/// Applies live samples to the bound skeleton joints.
pub struct Retargeter {
    bones: BoneMap,
}

impl Retargeter {
    pub fn new(bones: BoneMap) -> Self {
        Self { bones }
    }

    pub fn bones(&self) -> &BoneMap {
        &self.bones
    }

    /// Route one live sample to the skeleton.
    ///
    /// - `Idle`: no calibration run yet, the raw orientation passes
    ///   through unmodified.
    /// - `Calibrated` with a reference: the reference-relative orientation
    ///   is applied.
    /// - `Calibrated` without a reference (label sent nothing during the
    ///   window): the sample is not applied.
    /// - `Collecting`: buffering belongs to the calibration engine; this
    ///   path applies nothing.
    pub fn apply(
        &self,
        engine: &CalibrationEngine,
        skeleton: &mut dyn Skeleton,
        label: JointLabel,
        raw: Quat,
    ) {
        let Some(joint) = self.bones.joint(label) else {
            tracing::warn!(%label, "sample for unbound label dropped");
            return;
        };

        match engine.phase() {
            Phase::Idle => skeleton.apply_orientation(joint, raw),
            Phase::Calibrated => match engine.reference(label) {
                Some(reference) => {
                    skeleton.apply_orientation(joint, relative_orientation(reference, raw));
                }
                None => {
                    tracing::debug!(%label, "no reference for label; sample not applied");
                }
            },
            Phase::Collecting => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::{Duration, Instant};

    fn quat_approx_eq(a: Quat, b: Quat) -> bool {
        (a.w - b.w).abs() < 1e-6
            && (a.x - b.x).abs() < 1e-6
            && (a.y - b.y).abs() < 1e-6
            && (a.z - b.z).abs() < 1e-6
    }

    #[test]
    fn identity_reference_is_a_noop() {
        let q = Quat::from_axis_angle(glam::Vec3::Y, 0.7);
        assert!(quat_approx_eq(relative_orientation(Quat::IDENTITY, q), q));
    }

    #[test]
    fn self_relative_pose_is_identity() {
        let q = Quat::from_axis_angle(glam::Vec3::new(0.5, 0.3, -0.2).normalize(), 1.1);
        assert!(quat_approx_eq(relative_orientation(q, q), Quat::IDENTITY));
    }

    #[test]
    fn composition_order_is_reference_conjugate_first() {
        // Reference pose rotated about Y; the sensor then moves a further
        // rotation about X in the reference frame. The relative result
        // must be exactly that X rotation.
        let reference = Quat::from_axis_angle(glam::Vec3::Y, std::f32::consts::FRAC_PI_2);
        let delta = Quat::from_axis_angle(glam::Vec3::X, std::f32::consts::FRAC_PI_2);
        let current = reference * delta;

        let relative = relative_orientation(reference, current);
        assert!(quat_approx_eq(relative, delta));

        // The swapped order gives a different frame; guard against a
        // silent operand swap.
        let swapped = (current.conjugate() * reference).normalize();
        assert!(!quat_approx_eq(swapped, delta));
    }

    #[test]
    fn unnormalized_input_is_normalized_before_composition() {
        let q = Quat::from_axis_angle(glam::Vec3::Y, 0.4);
        let scaled = Quat::from_xyzw(q.x * 3.0, q.y * 3.0, q.z * 3.0, q.w * 3.0);
        assert!(quat_approx_eq(relative_orientation(Quat::IDENTITY, scaled), q));
    }

    fn retargeter_for(label: JointLabel) -> Retargeter {
        let mut bindings = BTreeMap::new();
        bindings.insert(label, "joint".to_string());
        let joints = vec!["joint".to_string()];
        Retargeter::new(crate::skeleton::BoneMap::resolve(&bindings, &joints))
    }

    #[test]
    fn idle_passes_raw_through() {
        let retargeter = retargeter_for(JointLabel::Ra);
        let engine = CalibrationEngine::new(Duration::from_secs(30));
        let mut skeleton = crate::skeleton::PoseBuffer::new(vec!["joint".to_string()]);

        let q = Quat::from_axis_angle(glam::Vec3::Z, 0.3);
        retargeter.apply(&engine, &mut skeleton, JointLabel::Ra, q);
        assert_eq!(skeleton.orientation(0), Some(q));
    }

    #[test]
    fn calibrated_without_reference_applies_nothing() {
        let retargeter = retargeter_for(JointLabel::Ra);
        let mut engine = CalibrationEngine::new(Duration::from_secs(30));
        let start = Instant::now();
        engine.begin([JointLabel::Ra], start);
        engine.tick(start + Duration::from_secs(30));
        assert!(engine.is_calibrated());

        let mut skeleton = crate::skeleton::PoseBuffer::new(vec!["joint".to_string()]);
        retargeter.apply(&engine, &mut skeleton, JointLabel::Ra, Quat::IDENTITY);
        assert_eq!(skeleton.orientation(0), None);
    }

    #[test]
    fn unbound_label_is_dropped() {
        let retargeter = retargeter_for(JointLabel::Ra);
        let engine = CalibrationEngine::new(Duration::from_secs(30));
        let mut skeleton = crate::skeleton::PoseBuffer::new(vec!["joint".to_string()]);

        retargeter.apply(&engine, &mut skeleton, JointLabel::La, Quat::IDENTITY);
        assert_eq!(skeleton.orientation(0), None);
    }

    #[test]
    fn calibrated_sample_equal_to_reference_yields_identity() {
        let retargeter = retargeter_for(JointLabel::Ra);
        let mut engine = CalibrationEngine::new(Duration::from_secs(30));
        let start = Instant::now();
        engine.begin([JointLabel::Ra], start);

        let pose = Quat::from_axis_angle(glam::Vec3::Y, 0.9);
        engine.push_sample(JointLabel::Ra, pose);
        engine.tick(start + Duration::from_secs(30));

        let mut skeleton = crate::skeleton::PoseBuffer::new(vec!["joint".to_string()]);
        retargeter.apply(&engine, &mut skeleton, JointLabel::Ra, pose);
        let applied = skeleton.orientation(0).unwrap();
        assert!(quat_approx_eq(applied, Quat::IDENTITY));
    }
}
