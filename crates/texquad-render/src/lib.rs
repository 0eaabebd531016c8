// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::path::PathBuf;

mod geometry;
mod texels;

pub use geometry::{Vertex, QUAD_INDICES, QUAD_VERTICES};
pub use texels::Texels;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum VsyncMode {
    Fifo,
    #[default]
    Mailbox,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TextureFilter {
    #[default]
    Nearest,
    Linear,
}

/// Everything a backend needs to know before it creates GPU objects.
#[derive(Clone, Debug)]
pub struct RenderSettings {
    pub clear_color: [f32; 4],
    pub vsync: bool,
    pub vsync_mode: VsyncMode,
    pub validation: bool,
    /// `None` uses a generated checkerboard.
    pub texture: Option<PathBuf>,
    pub filter: TextureFilter,
    pub spin_degrees_per_sec: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            vsync: true,
            vsync_mode: VsyncMode::Mailbox,
            validation: cfg!(debug_assertions),
            texture: None,
            filter: TextureFilter::Nearest,
            spin_degrees_per_sec: 90.0,
        }
    }
}

impl RenderSettings {
    /// Pixels for the configured texture, or the fallback pattern.
    pub fn load_texels(&self) -> Result<Texels> {
        match &self.texture {
            Some(path) => Ok(Texels::load(path)?),
            None => {
                tracing::info!("no texture configured; using checkerboard");
                Ok(Texels::checkerboard(256, 32))
            }
        }
    }
}

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: &RenderSettings,
    ) -> Result<Self>
    where
        Self: Sized;

    fn resize(&mut self, size: RenderSize) -> Result<()>;
    fn render(&mut self) -> Result<()>;
    fn set_clear_color(&mut self, rgba: [f32; 4]);
    fn set_vsync(&mut self, _on: bool) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sized_when_either_side_is_zero() {
        assert!(RenderSize { width: 0, height: 600 }.is_zero());
        assert!(RenderSize { width: 800, height: 0 }.is_zero());
        assert!(!RenderSize { width: 800, height: 600 }.is_zero());
    }

    #[test]
    fn defaults_render_black_mailbox_nearest() {
        let s = RenderSettings::default();
        assert_eq!(s.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(s.vsync_mode, VsyncMode::Mailbox);
        assert_eq!(s.filter, TextureFilter::Nearest);
        assert_eq!(s.spin_degrees_per_sec, 90.0);
        assert!(s.texture.is_none());
    }

    #[test]
    fn unset_texture_falls_back_to_checkerboard() {
        let t = RenderSettings::default().load_texels().unwrap();
        assert_eq!((t.width, t.height), (256, 256));
    }

    #[test]
    fn configured_texture_must_exist() {
        let s = RenderSettings {
            texture: Some("definitely/not/here.jpg".into()),
            ..Default::default()
        };
        assert!(s.load_texels().is_err());
    }
}
