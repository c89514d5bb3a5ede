//! Spatial primitives and the delivery standoff computation.
//!
//! Positions wrap [`nalgebra::Vector3<f32>`] so the approach math can stay in vector form.

use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// A 3D position in millimetres, in the robot's world frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position(pub Vector3<f32>);

impl Position {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self(Vector3::new(x, y, z))
    }

    pub fn x(&self) -> f32 {
        self.0.x
    }

    pub fn y(&self) -> f32 {
        self.0.y
    }

    pub fn z(&self) -> f32 {
        self.0.z
    }

    fn planar(&self) -> Vector2<f32> {
        Vector2::new(self.0.x, self.0.y)
    }
}

/// Position plus heading, tagged with the origin (frame) it was observed in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Position,
    /// Heading around the vertical axis, radians.
    pub angle_z: f32,
    pub origin_id: i32,
}

impl Pose {
    pub fn new(x: f32, y: f32, z: f32, angle_z: f32, origin_id: i32) -> Self {
        Self {
            position: Position::new(x, y, z),
            angle_z,
            origin_id,
        }
    }

    /// Planar (x, y) distance to another pose.
    pub fn planar_distance(&self, other: &Pose) -> f32 {
        (other.position.planar() - self.position.planar()).norm()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum GeometryError {
    /// Robot and face share the same (x, y); the approach direction is undefined.
    #[error("robot and face positions coincide; approach direction undefined")]
    Coincident,
    #[error("standoff distance must be finite and positive, got {0}")]
    InvalidStandoff(f32),
}

/// Computes the delivery pose `standoff` millimetres short of `face`, on the line from
/// `robot` to `face`.
///
/// The result sits on the ground (`z = 0`), keeps the robot's current heading and takes the
/// face's origin id.
pub fn approach_pose(robot: &Pose, face: &Pose, standoff: f32) -> Result<Pose, GeometryError> {
    if !standoff.is_finite() || standoff <= 0.0 {
        return Err(GeometryError::InvalidStandoff(standoff));
    }

    let f = face.position.planar();
    let toward_face = f - robot.position.planar();
    let distance = toward_face.norm();
    if distance <= f32::EPSILON {
        return Err(GeometryError::Coincident);
    }

    let target = f - toward_face * (standoff / distance);
    Ok(Pose::new(target.x, target.y, 0.0, robot.angle_z, face.origin_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f32, b: f32) {
        assert!((a - b).abs() < 1e-2, "{a} != {b}");
    }

    #[test]
    fn approach_sits_standoff_short_of_face() {
        let robot = Pose::new(0.0, 0.0, 0.0, 0.5, 1);
        let face = Pose::new(1000.0, 0.0, 300.0, 0.0, 7);

        let pose = approach_pose(&robot, &face, 250.0).expect("valid geometry");

        assert_close(pose.position.x(), 750.0);
        assert_close(pose.position.y(), 0.0);
        assert_eq!(pose.position.z(), 0.0);
        assert_eq!(pose.angle_z, 0.5);
        assert_eq!(pose.origin_id, 7);
    }

    #[test]
    fn approach_is_colinear_and_at_fixed_distance() {
        let cases = [
            ((0.0, 0.0), (300.0, 400.0)),
            ((-120.0, 55.0), (80.0, -600.0)),
            ((10.0, 10.0), (10.5, 10.0)),
            ((500.0, -500.0), (-500.0, 500.0)),
        ];

        for ((rx, ry), (fx, fy)) in cases {
            let robot = Pose::new(rx, ry, 0.0, 0.0, 0);
            let face = Pose::new(fx, fy, 0.0, 0.0, 0);
            let pose = approach_pose(&robot, &face, 250.0).expect("valid geometry");

            assert_close(pose.planar_distance(&face), 250.0);

            // Cross product of (approach - face) and (robot - face) vanishes when colinear.
            let a = pose.position.planar() - face.position.planar();
            let r = robot.position.planar() - face.position.planar();
            let cross = a.x * r.y - a.y * r.x;
            assert!(cross.abs() / r.norm() < 1e-2, "not colinear: {cross}");
            // Approach lies on the robot's side of the face.
            assert!(a.dot(&r) > 0.0);
        }
    }

    #[test]
    fn coincident_positions_are_rejected() {
        let robot = Pose::new(42.0, -3.0, 0.0, 0.0, 0);
        let face = Pose::new(42.0, -3.0, 200.0, 0.0, 0);

        assert_eq!(
            approach_pose(&robot, &face, 250.0),
            Err(GeometryError::Coincident)
        );
    }

    #[test]
    fn non_positive_standoff_is_rejected() {
        let robot = Pose::new(0.0, 0.0, 0.0, 0.0, 0);
        let face = Pose::new(100.0, 0.0, 0.0, 0.0, 0);

        assert!(matches!(
            approach_pose(&robot, &face, 0.0),
            Err(GeometryError::InvalidStandoff(_))
        ));
    }
}
