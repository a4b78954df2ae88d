//! Orientation to absolute cursor position
//!
//! Horizontal position spans ±30° of psi (yaw), vertical position spans ±20°
//! of theta (pitch). Both axes are inverted so that turning right or tilting
//! down moves the cursor right or down on screen.

/// Euler angles in degrees
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EulerAngles {
    /// Roll
    pub phi: f32,
    /// Pitch
    pub theta: f32,
    /// Yaw
    pub psi: f32,
}

/// Half-width of the horizontal range in degrees
pub const YAW_RANGE_DEG: f32 = 30.0;
/// Half-height of the vertical range in degrees
pub const PITCH_RANGE_DEG: f32 = 20.0;
/// Centre of the 0..65535 absolute coordinate space
pub const ABSOLUTE_MIDPOINT: f32 = 32768.5;

/// Absolute pointer coordinates, not clamped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbsolutePosition {
    pub x: i32,
    pub y: i32,
}

/// Maps an orientation to absolute pointer coordinates.
///
/// The float result is truncated toward zero. Angles beyond the ranges give
/// coordinates outside the screen space; clamping is left to the pointer sink.
pub fn map_to_absolute(angles: &EulerAngles) -> AbsolutePosition {
    AbsolutePosition {
        x: scale_axis(angles.psi, YAW_RANGE_DEG),
        y: scale_axis(angles.theta, PITCH_RANGE_DEG),
    }
}

fn scale_axis(angle: f32, range: f32) -> i32 {
    (ABSOLUTE_MIDPOINT + ((-angle / range) * ABSOLUTE_MIDPOINT)) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn angles(psi: f32, theta: f32) -> EulerAngles {
        EulerAngles {
            phi: 0.0,
            theta,
            psi,
        }
    }

    #[test]
    fn level_orientation_is_screen_centre() {
        assert_eq!(
            map_to_absolute(&angles(0.0, 0.0)),
            AbsolutePosition { x: 32768, y: 32768 }
        );
    }

    #[test]
    fn range_limits_reach_screen_edges() {
        assert_eq!(map_to_absolute(&angles(30.0, 0.0)).x, 0);
        assert_eq!(map_to_absolute(&angles(-30.0, 0.0)).x, 65537);
        assert_eq!(map_to_absolute(&angles(0.0, 20.0)).y, 0);
        assert_eq!(map_to_absolute(&angles(0.0, -20.0)).y, 65537);
    }

    #[test]
    fn roll_is_ignored() {
        let mut rolled = angles(5.0, -3.0);
        rolled.phi = 45.0;
        assert_eq!(map_to_absolute(&rolled), map_to_absolute(&angles(5.0, -3.0)));
    }

    #[test]
    fn axes_are_inverted_and_monotonic() {
        let mut previous = map_to_absolute(&angles(-30.0, -20.0));
        for step in 1..=120 {
            let psi = -30.0 + step as f32 * 0.5;
            let theta = -20.0 + step as f32 * (40.0 / 120.0);
            let current = map_to_absolute(&angles(psi, theta));
            assert!(current.x <= previous.x, "x rose at psi={}", psi);
            assert!(current.y <= previous.y, "y rose at theta={}", theta);
            assert!((0..=65537).contains(&current.x));
            assert!((0..=65537).contains(&current.y));
            previous = current;
        }
    }

    #[test]
    fn out_of_range_angles_are_not_clamped() {
        assert!(map_to_absolute(&angles(-45.0, 0.0)).x > 65537);
        // truncation toward zero keeps small overshoots at 0
        assert_eq!(map_to_absolute(&angles(30.0001, 0.0)).x, 0);
        assert!(map_to_absolute(&angles(60.0, 0.0)).x < 0);
    }
}
