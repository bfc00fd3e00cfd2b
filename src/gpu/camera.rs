//! Camera orbiting a fixed target.

use std::f32::consts::TAU;

use glam::{Mat3, Mat4, Vec3};

/// Radians the camera advances per unit of orbit parameter.
///
/// The app advances the parameter by one per rendered frame.
pub const ORBIT_RATE: f32 = 0.001;

/// Orbit parameter fed to [`Camera::update`], one step per rotating frame.
///
/// Wraps after a full turn so the parameter keeps its precision.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Orbit {
    t: f32,
}

impl Orbit {
    /// Parameter span of one full revolution.
    pub const PERIOD: f32 = TAU / ORBIT_RATE;

    pub fn t(self) -> f32 {
        self.t
    }

    /// Return the parameter for this frame and step to the next one.
    pub fn advance(&mut self) -> f32 {
        let t = self.t;
        self.t = (self.t + 1.0) % Self::PERIOD;
        t
    }
}

/// Orbit camera feeding view/projection state and a billboard basis to both passes.
///
/// The orbit keeps the eye at a fixed distance from `target` and at the
/// target's height.
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub right: Vec3,
    pub forward: Vec3,
    /// Distance from the eye to the target, fixed at construction.
    pub rot_radius: f32,
    /// Vertical field of view in degrees.
    pub fovy: f32,
    pub aspect_ratio: f32,
    pub near: f32,
    pub far: f32,
    pub view_matrix: Mat4,
    pub projection_matrix: Mat4,
}

impl Camera {
    /// Create a camera looking from `position` at `target`.
    pub fn new(position: Vec3, target: Vec3) -> Self {
        let up = Vec3::Y;
        let mut camera = Self {
            position,
            target,
            up,
            right: Vec3::X,
            forward: Vec3::NEG_Z,
            rot_radius: (target - position).length(),
            fovy: 45.0,
            aspect_ratio: 1.0,
            near: 0.1,
            far: 1000.0,
            view_matrix: Mat4::look_at_rh(position, target, up),
            projection_matrix: Mat4::IDENTITY,
        };
        camera.forward = camera.look_direction();
        camera.right = camera.forward.cross(up).try_normalize().unwrap_or(Vec3::X);
        camera.update_projection_matrix();
        camera
    }

    /// Move the eye to orbit parameter `t` and rebuild the view and basis.
    pub fn update(&mut self, t: f32) {
        let theta = ORBIT_RATE * t;
        self.position = self.target + self.rot_radius * Vec3::new(theta.cos(), 0.0, theta.sin());
        self.view_matrix = Mat4::look_at_rh(self.position, self.target, self.up);

        self.forward = self.look_direction();
        self.right = self.forward.cross(self.up).try_normalize().unwrap_or(self.right);
        // Re-derive up from the new basis so rounding never accumulates in it.
        self.up = self.right.cross(self.forward).normalize();
    }

    pub fn set_aspect_ratio(&mut self, aspect_ratio: f32) {
        self.aspect_ratio = aspect_ratio;
    }

    pub fn update_projection_matrix(&mut self) {
        self.projection_matrix = Mat4::perspective_rh(
            self.fovy.to_radians(),
            self.aspect_ratio,
            self.near,
            self.far,
        );
    }

    /// Apply a new viewport size.
    ///
    /// Returns `false` without touching the projection when either
    /// dimension is zero (minimized windows report 0x0).
    pub fn set_viewport(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 {
            return false;
        }
        self.set_aspect_ratio(width as f32 / height as f32);
        self.update_projection_matrix();
        true
    }

    pub fn view_proj(&self) -> Mat4 {
        self.projection_matrix * self.view_matrix
    }

    /// Billboard basis: columns are right, up and forward.
    pub fn axes(&self) -> Mat3 {
        Mat3::from_cols(self.right, self.up, self.forward)
    }

    fn look_direction(&self) -> Vec3 {
        (self.target - self.position)
            .try_normalize()
            .unwrap_or(Vec3::NEG_Z)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.0, 5.5), Vec3::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-4;

    fn assert_orthonormal(camera: &Camera) {
        let Camera { forward, right, up, .. } = camera;
        assert!((forward.length() - 1.0).abs() < EPS);
        assert!((right.length() - 1.0).abs() < EPS);
        assert!((up.length() - 1.0).abs() < EPS);
        assert!(forward.dot(*right).abs() < EPS);
        assert!(forward.dot(*up).abs() < EPS);
        assert!(right.dot(*up).abs() < EPS);
    }

    #[test]
    fn test_initial_state() {
        let camera = Camera::new(Vec3::new(0.0, 0.0, 5.5), Vec3::ZERO);

        assert!((camera.rot_radius - 5.5).abs() < EPS);
        assert!(camera.forward.abs_diff_eq(Vec3::NEG_Z, EPS));
        assert!(camera.right.abs_diff_eq(Vec3::X, EPS));
        assert_orthonormal(&camera);
    }

    #[test]
    fn test_update_at_zero() {
        let mut camera = Camera::new(Vec3::new(0.0, 0.0, 5.5), Vec3::ZERO);
        camera.update(0.0);

        assert!(camera.position.abs_diff_eq(Vec3::new(5.5, 0.0, 0.0), EPS));
        assert_eq!(camera.position.y, 0.0);
    }

    #[test]
    fn test_orbit_keeps_radius_and_height() {
        let target = Vec3::new(1.0, -2.0, 0.5);
        let mut camera = Camera::new(Vec3::new(4.0, 3.0, -1.0), target);
        let radius = camera.rot_radius;

        for frame in 0..5_000 {
            camera.update(frame as f32 * 7.3);
            assert!(((camera.position - camera.target).length() - radius).abs() < 1e-3);
            assert_eq!(camera.position.y, target.y);
        }
    }

    #[test]
    fn test_basis_stays_orthonormal() {
        let mut camera = Camera::default();
        for frame in 0..20_000 {
            camera.update(frame as f32);
            assert_orthonormal(&camera);
        }
    }

    #[test]
    fn test_axes_columns() {
        let mut camera = Camera::default();
        camera.update(1234.0);
        let axes = camera.axes();

        assert_eq!(axes.x_axis, camera.right);
        assert_eq!(axes.y_axis, camera.up);
        assert_eq!(axes.z_axis, camera.forward);
    }

    #[test]
    fn test_zero_viewport_is_skipped() {
        let mut camera = Camera::default();
        assert!(camera.set_viewport(1600, 800));
        let projection = camera.projection_matrix;

        assert!(!camera.set_viewport(0, 600));
        assert!(!camera.set_viewport(800, 0));
        assert_eq!(camera.aspect_ratio, 2.0);
        assert_eq!(camera.projection_matrix, projection);
    }

    #[test]
    fn test_orbit_starts_at_zero() {
        let mut orbit = Orbit::default();
        assert_eq!(orbit.advance(), 0.0);
        assert_eq!(orbit.advance(), 1.0);
        assert_eq!(orbit.t(), 2.0);
    }

    #[test]
    fn test_orbit_wraps_after_full_turn() {
        let mut orbit = Orbit::default();
        let mut last = 0.0;
        for _ in 0..(Orbit::PERIOD as usize + 10) {
            last = orbit.advance();
            assert!((0.0..Orbit::PERIOD).contains(&last));
        }
        assert!(last < 20.0);

        // The wrapped parameter lands on the same eye position it would have
        // reached without wrapping.
        let mut wrapped = Camera::default();
        let mut unwrapped = Camera::default();
        wrapped.update(orbit.t());
        unwrapped.update(orbit.t() + Orbit::PERIOD);
        assert!(wrapped.position.abs_diff_eq(unwrapped.position, 1e-3));
    }

    #[test]
    fn test_degenerate_eye() {
        let camera = Camera::new(Vec3::ONE, Vec3::ONE);
        assert_eq!(camera.rot_radius, 0.0);
        assert!(camera.forward.is_finite());
        assert!(camera.right.is_finite());
    }
}
