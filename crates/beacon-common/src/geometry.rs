//! Geometry helpers shared by scanning, planning, traversal and audio.
//!
//! The world is Y-up. "Horizontal" always means the XZ plane, and the world
//! axes used when no camera is available are `+X` (right) and `+Z` (forward).

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Below this length a direction is treated as zero.
pub const DIRECTION_EPSILON: f32 = 1e-4;

/// Projects a vector onto the horizontal plane.
#[must_use]
pub fn flatten(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

/// Distance between two points ignoring height.
#[must_use]
pub fn horizontal_distance(a: Vec3, b: Vec3) -> f32 {
    flatten(b - a).length()
}

/// Sum of consecutive point distances along a polyline.
#[must_use]
pub fn polyline_length(points: &[Vec3]) -> f32 {
    points.windows(2).map(|w| w[0].distance(w[1])).sum()
}

/// Closest point to `p` on the segment `a..b`, with its parameter in `[0, 1]`.
#[must_use]
pub fn project_onto_segment(p: Vec3, a: Vec3, b: Vec3) -> (Vec3, f32) {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq <= DIRECTION_EPSILON * DIRECTION_EPSILON {
        return (a, 0.0);
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    (a + ab * t, t)
}

/// Orthonormal right/up/forward frame of the observer's camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraBasis {
    /// Camera right axis.
    pub right: Vec3,
    /// Camera up axis.
    pub up: Vec3,
    /// Camera forward axis.
    pub forward: Vec3,
}

impl Default for CameraBasis {
    fn default() -> Self {
        Self::world()
    }
}

impl CameraBasis {
    /// Creates a basis from explicit axes.
    #[must_use]
    pub const fn new(right: Vec3, up: Vec3, forward: Vec3) -> Self {
        Self { right, up, forward }
    }

    /// The world-aligned basis.
    #[must_use]
    pub const fn world() -> Self {
        Self {
            right: Vec3::X,
            up: Vec3::Y,
            forward: Vec3::Z,
        }
    }

    /// Builds an upright basis looking along `forward`.
    ///
    /// Falls back to the world basis when `forward` is zero or vertical.
    #[must_use]
    pub fn from_forward(forward: Vec3) -> Self {
        let f = forward.normalize_or_zero();
        let right = Vec3::Y.cross(f);
        if f == Vec3::ZERO || right.length() < DIRECTION_EPSILON {
            return Self::world();
        }
        let right = right.normalize();
        Self {
            right,
            up: f.cross(right),
            forward: f,
        }
    }

    /// Expresses a world-space direction in listener-local coordinates
    /// (`x` = right, `y` = up, `z` = forward).
    #[must_use]
    pub fn to_local(&self, direction: Vec3) -> Vec3 {
        Vec3::new(
            direction.dot(self.right),
            direction.dot(self.up),
            direction.dot(self.forward),
        )
    }
}

/// Position and orientation of the observer (the player character).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObserverPose {
    /// World position.
    pub position: Vec3,
    /// Facing direction of the character.
    pub forward: Vec3,
    /// Camera frame, when the host exposes one.
    pub camera: Option<CameraBasis>,
}

impl Default for ObserverPose {
    fn default() -> Self {
        Self::at(Vec3::ZERO)
    }
}

impl ObserverPose {
    /// Creates a pose at a position facing world forward with no camera.
    #[must_use]
    pub const fn at(position: Vec3) -> Self {
        Self {
            position,
            forward: Vec3::Z,
            camera: None,
        }
    }

    /// Sets the facing direction.
    #[must_use]
    pub fn with_forward(mut self, forward: Vec3) -> Self {
        self.forward = forward;
        self
    }

    /// Sets the camera frame.
    #[must_use]
    pub const fn with_camera(mut self, camera: CameraBasis) -> Self {
        self.camera = Some(camera);
        self
    }

    /// Full 3D listener basis: the camera if present, else derived from facing.
    #[must_use]
    pub fn listener_basis(&self) -> CameraBasis {
        self.camera
            .unwrap_or_else(|| CameraBasis::from_forward(self.forward))
    }

    /// Horizontal (right, forward) axes for stick-style input.
    ///
    /// Uses the camera when present and not looking straight up or down;
    /// otherwise the world axes.
    #[must_use]
    pub fn input_axes(&self) -> (Vec3, Vec3) {
        let world = (Vec3::X, Vec3::Z);
        let Some(camera) = self.camera else {
            return world;
        };
        let right = flatten(camera.right).normalize_or_zero();
        let forward = flatten(camera.forward).normalize_or_zero();
        if right == Vec3::ZERO || forward == Vec3::ZERO {
            world
        } else {
            (right, forward)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polyline_length_sums_segments() {
        let points = [
            Vec3::ZERO,
            Vec3::new(3.0, 0.0, 0.0),
            Vec3::new(3.0, 0.0, 4.0),
        ];
        assert!((polyline_length(&points) - 7.0).abs() < 1e-5);
        assert!(polyline_length(&points[..1]).abs() < f32::EPSILON);
    }

    #[test]
    fn test_horizontal_distance_ignores_height() {
        let a = Vec3::new(0.0, 10.0, 0.0);
        let b = Vec3::new(3.0, -5.0, 4.0);
        assert!((horizontal_distance(a, b) - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_project_onto_segment_clamps() {
        let a = Vec3::ZERO;
        let b = Vec3::new(10.0, 0.0, 0.0);
        let (p, t) = project_onto_segment(Vec3::new(5.0, 0.0, 3.0), a, b);
        assert!((p.x - 5.0).abs() < 1e-5);
        assert!((t - 0.5).abs() < 1e-5);

        let (p, t) = project_onto_segment(Vec3::new(-4.0, 0.0, 0.0), a, b);
        assert_eq!(p, a);
        assert!(t.abs() < f32::EPSILON);
    }

    #[test]
    fn test_basis_from_forward() {
        let basis = CameraBasis::from_forward(Vec3::Z);
        assert!((basis.right - Vec3::X).length() < 1e-5);
        assert!((basis.up - Vec3::Y).length() < 1e-5);

        // Looking straight up has no horizontal heading.
        assert_eq!(CameraBasis::from_forward(Vec3::Y), CameraBasis::world());
    }

    #[test]
    fn test_to_local() {
        let basis = CameraBasis::from_forward(Vec3::X);
        // Facing +X, world -Z is to the right.
        let local = basis.to_local(Vec3::new(0.0, 0.0, -1.0));
        assert!((local.x - 1.0).abs() < 1e-5);
        assert!(local.z.abs() < 1e-5);
    }

    #[test]
    fn test_input_axes_fallback() {
        let pose = ObserverPose::at(Vec3::ZERO);
        assert_eq!(pose.input_axes(), (Vec3::X, Vec3::Z));

        let looking_down = ObserverPose::at(Vec3::ZERO).with_camera(CameraBasis::new(
            Vec3::X,
            Vec3::Z,
            Vec3::NEG_Y,
        ));
        assert_eq!(looking_down.input_axes(), (Vec3::X, Vec3::Z));
    }
}
