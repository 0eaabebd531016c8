// SPDX-License-Identifier: CEPL-1.0
pub use winit;

use winit::dpi::LogicalSize;
use winit::window::{Window, WindowAttributes};

/// Attributes for the main window. Size is in logical pixels.
pub fn window_attributes(title: &str, width: u32, height: u32) -> WindowAttributes {
    Window::default_attributes()
        .with_title(title)
        .with_inner_size(LogicalSize::new(width.max(1), height.max(1)))
        .with_resizable(true)
}

/// Current drawable size in physical pixels; zero while minimized.
pub fn framebuffer_size(window: &Window) -> (u32, u32) {
    let size = window.inner_size();
    tracing::trace!("framebuffer {}x{}", size.width, size.height);
    (size.width, size.height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_carry_title_and_size() {
        let attrs = window_attributes("Vulkan Tutorial", 800, 600);
        assert_eq!(attrs.title, "Vulkan Tutorial");
        assert!(attrs.resizable);
        match attrs.inner_size {
            Some(winit::dpi::Size::Logical(s)) => {
                assert_eq!((s.width, s.height), (800.0, 600.0));
            }
            other => panic!("unexpected size {other:?}"),
        }
    }

    #[test]
    fn attributes_never_zero_sized() {
        let attrs = window_attributes("t", 0, 0);
        match attrs.inner_size {
            Some(winit::dpi::Size::Logical(s)) => assert_eq!((s.width, s.height), (1.0, 1.0)),
            other => panic!("unexpected size {other:?}"),
        }
    }
}
