//! The motion/perception contract the caretaker drives.
//!
//! Face recognition, object tracking and actuator control all live behind [`RobotDevice`].
//! Every call completes only once the robot has finished (or given up on) the command.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::geometry::Pose;

/// SDK identifiers of the three light cubes.
pub const LIGHT_CUBE_1_ID: u8 = 1;
pub const LIGHT_CUBE_2_ID: u8 = 2;
pub const LIGHT_CUBE_3_ID: u8 = 3;

/// A face currently visible to the robot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    pub face_id: i32,
    /// Enrolled name; empty for unrecognised faces.
    pub name: String,
    pub pose: Pose,
}

impl DetectedFace {
    pub fn is_named(&self, name: &str) -> bool {
        !self.name.is_empty() && self.name.to_lowercase() == name.to_lowercase()
    }
}

/// Opaque handle to one light cube.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CubeRef(pub u8);

/// The fixed job each cube stands in for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CubeRole {
    Medicine,
    Kit,
    Water,
}

impl CubeRole {
    pub fn cube(self) -> CubeRef {
        match self {
            CubeRole::Medicine => CubeRef(LIGHT_CUBE_1_ID),
            CubeRole::Kit => CubeRef(LIGHT_CUBE_2_ID),
            CubeRole::Water => CubeRef(LIGHT_CUBE_3_ID),
        }
    }

    /// Light shown while the cube is being delivered.
    pub fn light(self) -> LightColor {
        match self {
            CubeRole::Medicine => LightColor::Red,
            CubeRole::Kit => LightColor::Green,
            CubeRole::Water => LightColor::Blue,
        }
    }
}

impl std::fmt::Display for CubeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CubeRole::Medicine => "medicine",
            CubeRole::Kit => "kit",
            CubeRole::Water => "water",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightColor {
    Red,
    Green,
    Blue,
    Off,
}

/// Animation triggers played between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reaction {
    #[serde(rename = "CodeLabBored")]
    Bored,
    #[serde(rename = "CodeLabCelebrate")]
    Celebrate,
    #[serde(rename = "CodeLabAmazed")]
    Amazed,
    #[serde(rename = "CodeLabThinking")]
    Thinking,
    #[serde(rename = "CodeLabFrustrated")]
    Frustrated,
    #[serde(rename = "CodeLabWondering")]
    Wondering,
    #[serde(rename = "CodeLabSleep")]
    Sleep,
}

/// Long-running search behaviors; each must be stopped once started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BehaviorKind {
    FindFaces,
    LookAroundInPlace,
}

/// Handle to a running behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorId(pub u64);

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("device call timed out")]
    Timeout,
    #[error("device busy: {0}")]
    Busy(String),
    #[error("device rejected command: {0}")]
    Rejected(String),
    #[error("device disconnected: {0}")]
    Disconnected(#[source] std::io::Error),
    #[error("device protocol error: {0}")]
    Protocol(String),
}

impl DeviceError {
    /// Transient errors are worth polling again; the rest end the current operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, DeviceError::Timeout | DeviceError::Busy(_))
    }
}

#[async_trait]
pub trait RobotDevice: Send + Sync {
    async fn start_behavior(&self, kind: BehaviorKind) -> Result<BehaviorId, DeviceError>;

    async fn stop_behavior(&self, id: BehaviorId) -> Result<(), DeviceError>;

    /// Faces seen in the most recent frames.
    async fn visible_faces(&self) -> Result<Vec<DetectedFace>, DeviceError>;

    async fn robot_pose(&self) -> Result<Pose, DeviceError>;

    async fn turn_toward(&self, face: &DetectedFace, retries: u32) -> Result<(), DeviceError>;

    /// Waits until `count` light cubes have been observed. `Ok(None)` on timeout.
    async fn wait_for_cubes(
        &self,
        count: usize,
        timeout: Duration,
    ) -> Result<Option<Vec<CubeRef>>, DeviceError>;

    async fn pickup(&self, cube: CubeRef, retries: u32) -> Result<(), DeviceError>;

    async fn go_to_pose(&self, pose: &Pose, retries: u32) -> Result<(), DeviceError>;

    async fn place_on_ground(&self, cube: CubeRef, retries: u32) -> Result<(), DeviceError>;

    async fn play_reaction(&self, reaction: Reaction) -> Result<(), DeviceError>;

    async fn say(&self, text: &str) -> Result<(), DeviceError>;

    async fn set_light(&self, cube: CubeRef, color: LightColor) -> Result<(), DeviceError>;

    /// Waits for a tap on `cube`. `Ok(false)` when `timeout` passes untouched.
    async fn wait_for_tap(&self, cube: CubeRef, timeout: Duration) -> Result<bool, DeviceError>;
}
