// SPDX-License-Identifier: CEPL-1.0
//! Per-frame transforms for the spinning quad.
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Matches the vertex shader's `UniformBufferObject` block (std140, 3 x mat4).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct UniformBufferObject {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
}

pub const EYE: Vec3 = Vec3::new(2.0, 2.0, 2.0);
pub const FOV_Y_DEGREES: f32 = 45.0;
pub const Z_NEAR: f32 = 0.1;
pub const Z_FAR: f32 = 10.0;

/// Rotation about +Z after `seconds` at `degrees_per_sec`.
pub fn model_at(seconds: f32, degrees_per_sec: f32) -> Mat4 {
    Mat4::from_rotation_z((seconds * degrees_per_sec).to_radians())
}

/// Camera sitting at `EYE`, looking at the origin, Z up.
pub fn view() -> Mat4 {
    Mat4::look_at_rh(EYE, Vec3::ZERO, Vec3::Z)
}

/// Zero-to-one depth perspective with Y flipped for Vulkan clip space.
pub fn projection(aspect: f32) -> Mat4 {
    let mut proj = Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), aspect, Z_NEAR, Z_FAR);
    proj.y_axis.y *= -1.0;
    proj
}

/// Aspect ratio of a surface; degenerate heights fall back to square.
pub fn aspect_ratio(width: u32, height: u32) -> f32 {
    if height == 0 {
        1.0
    } else {
        width as f32 / height as f32
    }
}

impl UniformBufferObject {
    pub fn new(model: Mat4, view: Mat4, proj: Mat4) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            proj: proj.to_cols_array_2d(),
        }
    }

    /// Everything the quad needs for one frame.
    pub fn spinning_quad(seconds: f32, degrees_per_sec: f32, width: u32, height: u32) -> Self {
        Self::new(
            model_at(seconds, degrees_per_sec),
            view(),
            projection(aspect_ratio(width, height)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    const EPS: f32 = 1e-5;

    #[test]
    fn ubo_is_three_mat4s() {
        assert_eq!(std::mem::size_of::<UniformBufferObject>(), 3 * 64);
        assert_eq!(std::mem::align_of::<UniformBufferObject>(), 4);
    }

    #[test]
    fn model_starts_at_identity() {
        assert!(model_at(0.0, 90.0).abs_diff_eq(Mat4::IDENTITY, EPS));
    }

    #[test]
    fn model_quarter_turn_after_one_second() {
        let x = model_at(1.0, 90.0) * Vec4::new(1.0, 0.0, 0.0, 1.0);
        assert!(x.abs_diff_eq(Vec4::new(0.0, 1.0, 0.0, 1.0), EPS), "{x:?}");
    }

    #[test]
    fn view_maps_origin_in_front_of_camera() {
        let p = view() * Vec4::new(0.0, 0.0, 0.0, 1.0);
        // right-handed view space looks down -Z
        assert!(p.z < 0.0);
        assert!((p.z + EYE.length()).abs() < EPS);
        assert!(p.x.abs() < EPS && p.y.abs() < EPS);
    }

    #[test]
    fn projection_flips_y() {
        let unflipped = Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), 1.5, Z_NEAR, Z_FAR);
        let p = projection(1.5);
        assert!(p.y_axis.y < 0.0);
        assert!((p.y_axis.y + unflipped.y_axis.y).abs() < EPS);
        assert!((p.x_axis.x - unflipped.x_axis.x).abs() < EPS);
    }

    #[test]
    fn projection_depth_is_zero_to_one() {
        let p = projection(1.0);
        let near = p * Vec4::new(0.0, 0.0, -Z_NEAR, 1.0);
        let far = p * Vec4::new(0.0, 0.0, -Z_FAR, 1.0);
        assert!((near.z / near.w).abs() < EPS);
        assert!((far.z / far.w - 1.0).abs() < EPS);
    }

    #[test]
    fn aspect_ratio_guards_zero_height() {
        assert_eq!(aspect_ratio(800, 600), 800.0 / 600.0);
        assert_eq!(aspect_ratio(800, 0), 1.0);
    }

    #[test]
    fn spinning_quad_is_column_major() {
        let ubo = UniformBufferObject::spinning_quad(0.0, 90.0, 800, 600);
        assert_eq!(ubo.model, Mat4::IDENTITY.to_cols_array_2d());
        assert_eq!(ubo.view[3], view().w_axis.to_array());
        assert_eq!(bytemuck::bytes_of(&ubo).len(), 192);
    }
}
