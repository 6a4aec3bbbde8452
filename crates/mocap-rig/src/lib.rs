pub mod calibration;
pub mod labels;
pub mod retarget;
pub mod skeleton;

pub use calibration::{CalibrationEngine, Phase};
pub use labels::{JointLabel, StatusToken};
pub use retarget::{relative_orientation, Retargeter};
pub use skeleton::{BoneMap, JointId, PoseBuffer, Skeleton};
