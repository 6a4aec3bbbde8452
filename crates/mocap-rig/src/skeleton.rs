use crate::labels::JointLabel;
use glam::Quat;
use std::collections::{BTreeMap, HashMap};

/// Opaque handle into a skeleton consumer: the index of a joint in the
/// order returned by [`Skeleton::joint_names`].
pub type JointId = usize;

/// Seam to the external rig consumer (renderer, recorder, ...).
///
/// The pose service only ever needs two things from a skeleton: the full
/// list of joint names (once, for binding) and a way to set one joint's
/// orientation. Applying is last-write-wins per joint.
pub trait Skeleton {
    fn joint_names(&self) -> Vec<String>;
    fn apply_orientation(&mut self, joint: JointId, orientation: Quat);
}

/// One-shot binding of sensor labels to skeleton joints.
///
/// Built once after the skeleton is loaded; lookups are O(1) afterwards.
/// Labels whose target joint name is missing from the skeleton stay
/// unbound — that is logged, not an error, so a partial skeleton still
/// drives whatever subset matched.
#[derive(Debug, Default)]
pub struct BoneMap {
    bound: HashMap<JointLabel, JointId>,
}

impl BoneMap {
    /// Match each configured `label -> joint name` binding exactly against
    /// the skeleton's joint names.
    pub fn resolve(bindings: &BTreeMap<JointLabel, String>, joint_names: &[String]) -> Self {
        let index: HashMap<&str, JointId> = joint_names
            .iter()
            .enumerate()
            .map(|(id, name)| (name.as_str(), id))
            .collect();

        let mut bound = HashMap::new();
        for (&label, target) in bindings {
            match index.get(target.as_str()) {
                Some(&id) => {
                    tracing::debug!(%label, joint = %target, id, "bound label to skeleton joint");
                    bound.insert(label, id);
                }
                None => {
                    tracing::warn!(
                        %label,
                        joint = %target,
                        "no skeleton joint matches binding; label left unbound"
                    );
                }
            }
        }

        tracing::info!(bound = bound.len(), configured = bindings.len(), "bone map resolved");
        Self { bound }
    }

    /// The joint bound to `label`, if any.
    pub fn joint(&self, label: JointLabel) -> Option<JointId> {
        self.bound.get(&label).copied()
    }

    pub fn len(&self) -> usize {
        self.bound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }
}

/// In-memory skeleton: keeps the latest applied orientation per joint.
///
/// This is the default consumer when no renderer is attached, and doubles
/// as the recording skeleton in tests.
pub struct PoseBuffer {
    names: Vec<String>,
    latest: Vec<Option<Quat>>,
}

impl PoseBuffer {
    pub fn new(names: Vec<String>) -> Self {
        let latest = vec![None; names.len()];
        Self { names, latest }
    }

    /// Latest orientation applied to `joint`, if any sample reached it yet.
    pub fn orientation(&self, joint: JointId) -> Option<Quat> {
        self.latest.get(joint).copied().flatten()
    }
}

impl Skeleton for PoseBuffer {
    fn joint_names(&self) -> Vec<String> {
        self.names.clone()
    }

    fn apply_orientation(&mut self, joint: JointId, orientation: Quat) {
        if let Some(slot) = self.latest.get_mut(joint) {
            *slot = Some(orientation);
        }
    }
}
