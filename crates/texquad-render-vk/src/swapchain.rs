// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::khr::{surface, swapchain};
use ash::vk;
use bitflags::bitflags;
use texquad_render::{RenderSize, VsyncMode};
use tracing::info;

use crate::texture::create_image_view;

bitflags! {
    /// Reasons the swapchain must be rebuilt before the next frame.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub(crate) struct Recreate: u8 {
        const RESIZED = 1 << 0;
        const OUT_OF_DATE = 1 << 1;
        const SUBOPTIMAL = 1 << 2;
        const PRESENT_MODE = 1 << 3;
    }
}

impl Recreate {
    /// Folds a `queue_present` result into the pending reasons. Errors other
    /// than OUT_OF_DATE are returned unchanged.
    pub fn after_present(self, present: Result<bool, vk::Result>) -> Result<Self, vk::Result> {
        match present {
            Ok(false) => Ok(self),
            Ok(true) => Ok(self | Recreate::SUBOPTIMAL),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(self | Recreate::OUT_OF_DATE),
            Err(e) => Err(e),
        }
    }
}

/// What a new window size does to the renderer: `None` pauses, otherwise the
/// swapchain is marked for rebuild.
pub(crate) fn resize_outcome(size: RenderSize) -> Option<Recreate> {
    if size.is_zero() {
        None
    } else {
        Some(Recreate::RESIZED)
    }
}

pub(crate) struct SwapchainSupport {
    pub caps: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub unsafe fn query(
        surf_i: &surface::Instance,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self> {
        Ok(Self {
            caps: surf_i
                .get_physical_device_surface_capabilities(phys, surface)
                .context("get_physical_device_surface_capabilities")?,
            formats: surf_i
                .get_physical_device_surface_formats(phys, surface)
                .context("get_physical_device_surface_formats")?,
            present_modes: surf_i
                .get_physical_device_surface_present_modes(phys, surface)
                .context("get_physical_device_surface_present_modes")?,
        })
    }

    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

fn fmt_name(f: vk::Format) -> &'static str {
    match f {
        vk::Format::B8G8R8A8_UNORM => "B8G8R8A8_UNORM",
        vk::Format::B8G8R8A8_SRGB => "B8G8R8A8_SRGB",
        vk::Format::R8G8B8A8_SRGB => "R8G8B8A8_SRGB",
        vk::Format::R8G8B8A8_UNORM => "R8G8B8A8_UNORM",
        _ => "OTHER",
    }
}

fn pm_name(m: vk::PresentModeKHR) -> &'static str {
    match m {
        vk::PresentModeKHR::FIFO => "FIFO",
        vk::PresentModeKHR::MAILBOX => "MAILBOX",
        vk::PresentModeKHR::IMMEDIATE => "IMMEDIATE",
        vk::PresentModeKHR::FIFO_RELAXED => "FIFO_RELAXED",
        _ => "OTHER",
    }
}

/// BGRA8 sRGB in the sRGB color space if offered, else whatever comes first.
pub(crate) fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
}

pub(crate) fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    vsync: bool,
    mode: VsyncMode,
) -> vk::PresentModeKHR {
    let order: &[vk::PresentModeKHR] = match (vsync, mode) {
        (false, _) => &[
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
        ],
        (true, VsyncMode::Mailbox) => &[vk::PresentModeKHR::MAILBOX],
        (true, VsyncMode::Fifo) => &[],
    };
    // FIFO is the only mode every implementation must support.
    order
        .iter()
        .copied()
        .find(|m| modes.contains(m))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

pub(crate) fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum; `max_image_count == 0` means unbounded.
pub(crate) fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let want = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        want.min(caps.max_image_count)
    } else {
        want
    }
}

/// Inputs for one swapchain build.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SwapchainConfig {
    pub hint: RenderSize,
    pub vsync: bool,
    pub vsync_mode: VsyncMode,
}

pub(crate) struct SwapchainBundle {
    pub swapchain: vk::SwapchainKHR,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub framebuffers: Vec<vk::Framebuffer>,
}

impl SwapchainBundle {
    /// `sharing` lists the queue families that touch the images; empty means exclusive.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn create(
        device: &ash::Device,
        surf_i: &surface::Instance,
        swap_d: &swapchain::Device,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        old_swapchain: vk::SwapchainKHR,
        sharing: &[u32],
        cfg: SwapchainConfig,
    ) -> Result<Self> {
        let support = SwapchainSupport::query(surf_i, phys, surface)?;
        let surf_format =
            choose_surface_format(&support.formats).ok_or(texquad_core::Error::NoSurfaceFormat)?;
        let present_mode = choose_present_mode(&support.present_modes, cfg.vsync, cfg.vsync_mode);
        let extent = choose_extent(&support.caps, cfg.hint);
        let min_count = choose_image_count(&support.caps);

        info!(
            "swapchain: format {} / {:?}, present_mode {}, extent {}x{}, images(min={} → picked={})",
            fmt_name(surf_format.format),
            surf_format.color_space,
            pm_name(present_mode),
            extent.width,
            extent.height,
            support.caps.min_image_count,
            min_count
        );

        let (image_sharing_mode, queue_family_index_count, p_queue_family_indices) =
            if sharing.is_empty() {
                (vk::SharingMode::EXCLUSIVE, 0, std::ptr::null())
            } else {
                (
                    vk::SharingMode::CONCURRENT,
                    sharing.len() as u32,
                    sharing.as_ptr(),
                )
            };

        let swap_info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface,
            min_image_count: min_count,
            image_format: surf_format.format,
            image_color_space: surf_format.color_space,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode,
            queue_family_index_count,
            p_queue_family_indices,
            pre_transform: support.caps.current_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode,
            clipped: vk::TRUE,
            old_swapchain,
            ..Default::default()
        };

        let swapchain = swap_d
            .create_swapchain(&swap_info, None)
            .context("create_swapchain")?;
        let images = swap_d
            .get_swapchain_images(swapchain)
            .context("get_swapchain_images")?;

        let mut image_views = Vec::with_capacity(images.len());
        for &img in &images {
            image_views.push(create_image_view(device, img, surf_format.format)?);
        }

        Ok(Self {
            swapchain,
            format: surf_format.format,
            extent,
            images,
            image_views,
            framebuffers: Vec::new(),
        })
    }

    /// One framebuffer per image view; must run after the render pass exists.
    pub unsafe fn create_framebuffers(
        &mut self,
        device: &ash::Device,
        render_pass: vk::RenderPass,
    ) -> Result<()> {
        let mut framebuffers = Vec::with_capacity(self.image_views.len());
        for view in &self.image_views {
            let fb_info = vk::FramebufferCreateInfo {
                s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
                render_pass,
                attachment_count: 1,
                p_attachments: view,
                width: self.extent.width,
                height: self.extent.height,
                layers: 1,
                ..Default::default()
            };
            framebuffers.push(
                device
                    .create_framebuffer(&fb_info, None)
                    .context("create_framebuffer")?,
            );
        }
        self.framebuffers = framebuffers;
        Ok(())
    }

    // STRICT ORDER: framebuffers, then views, then the swapchain itself.
    pub unsafe fn destroy(&mut self, device: &ash::Device, swap_d: &swapchain::Device) {
        for fb in self.framebuffers.drain(..) {
            device.destroy_framebuffer(fb, None);
        }
        for iv in self.image_views.drain(..) {
            device.destroy_image_view(iv, None);
        }
        self.images.clear();
        if self.swapchain != vk::SwapchainKHR::null() {
            swap_d.destroy_swapchain(self.swapchain, None);
            self.swapchain = vk::SwapchainKHR::null();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sf(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 16,
                height: 16,
            },
            max_image_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        }
    }

    #[test]
    fn prefers_bgra_srgb_nonlinear() {
        let formats = [
            sf(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            sf(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(
            choose_surface_format(&formats).unwrap().format,
            vk::Format::B8G8R8A8_SRGB
        );
    }

    #[test]
    fn falls_back_to_first_format() {
        let formats = [
            sf(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            sf(
                vk::Format::B8G8R8A8_SRGB,
                vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT,
            ),
        ];
        assert_eq!(
            choose_surface_format(&formats).unwrap().format,
            vk::Format::R8G8B8A8_UNORM
        );
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn present_mode_policy() {
        use vk::PresentModeKHR as P;
        let all = [P::FIFO, P::MAILBOX, P::IMMEDIATE];
        assert_eq!(choose_present_mode(&all, true, VsyncMode::Mailbox), P::MAILBOX);
        assert_eq!(choose_present_mode(&all, true, VsyncMode::Fifo), P::FIFO);
        assert_eq!(choose_present_mode(&all, false, VsyncMode::Fifo), P::IMMEDIATE);

        let fifo_only = [P::FIFO];
        assert_eq!(choose_present_mode(&fifo_only, true, VsyncMode::Mailbox), P::FIFO);
        assert_eq!(choose_present_mode(&fifo_only, false, VsyncMode::Mailbox), P::FIFO);

        let no_immediate = [P::FIFO, P::MAILBOX];
        assert_eq!(
            choose_present_mode(&no_immediate, false, VsyncMode::Fifo),
            P::MAILBOX
        );
    }

    #[test]
    fn fixed_extent_is_used_verbatim() {
        let mut c = caps(2, 3);
        c.current_extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        let e = choose_extent(
            &c,
            RenderSize {
                width: 1,
                height: 1,
            },
        );
        assert_eq!((e.width, e.height), (800, 600));
    }

    #[test]
    fn free_extent_is_clamped() {
        let c = caps(2, 3);
        let big = choose_extent(
            &c,
            RenderSize {
                width: 4000,
                height: 500,
            },
        );
        assert_eq!((big.width, big.height), (1920, 500));
        let small = choose_extent(
            &c,
            RenderSize {
                width: 1,
                height: 1,
            },
        );
        assert_eq!((small.width, small.height), (16, 16));
    }

    #[test]
    fn image_count_is_min_plus_one_capped() {
        assert_eq!(choose_image_count(&caps(2, 0)), 3);
        assert_eq!(choose_image_count(&caps(2, 8)), 3);
        assert_eq!(choose_image_count(&caps(3, 3)), 3);
    }

    #[test]
    fn adequacy_needs_formats_and_modes() {
        let mut s = SwapchainSupport {
            caps: caps(2, 0),
            formats: vec![sf(
                vk::Format::B8G8R8A8_SRGB,
                vk::ColorSpaceKHR::SRGB_NONLINEAR,
            )],
            present_modes: vec![],
        };
        assert!(!s.is_adequate());
        s.present_modes.push(vk::PresentModeKHR::FIFO);
        assert!(s.is_adequate());
        s.formats.clear();
        assert!(!s.is_adequate());
    }

    #[test]
    fn present_result_sets_rebuild_reason() {
        let none = Recreate::empty();
        assert_eq!(none.after_present(Ok(false)), Ok(Recreate::empty()));
        assert_eq!(none.after_present(Ok(true)), Ok(Recreate::SUBOPTIMAL));
        assert_eq!(
            none.after_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)),
            Ok(Recreate::OUT_OF_DATE)
        );
        assert_eq!(
            none.after_present(Err(vk::Result::ERROR_DEVICE_LOST)),
            Err(vk::Result::ERROR_DEVICE_LOST)
        );
    }

    #[test]
    fn pending_resize_rebuilds_after_clean_present() {
        let r = Recreate::RESIZED.after_present(Ok(false)).unwrap();
        assert_eq!(r, Recreate::RESIZED);
        assert!(!r.is_empty());

        let r = Recreate::PRESENT_MODE.after_present(Ok(true)).unwrap();
        assert_eq!(r, Recreate::PRESENT_MODE | Recreate::SUBOPTIMAL);
    }

    #[test]
    fn zero_size_pauses_and_nonzero_rebuilds() {
        let size = |width, height| RenderSize { width, height };
        assert_eq!(resize_outcome(size(0, 0)), None);
        assert_eq!(resize_outcome(size(0, 600)), None);
        assert_eq!(resize_outcome(size(800, 0)), None);
        assert_eq!(resize_outcome(size(800, 600)), Some(Recreate::RESIZED));
        assert_eq!(resize_outcome(size(1, 1)), Some(Recreate::RESIZED));
    }

    #[test]
    fn recreate_flags_combine() {
        let mut r = Recreate::empty();
        r |= Recreate::RESIZED;
        r.insert(Recreate::SUBOPTIMAL);
        assert!(r.contains(Recreate::RESIZED | Recreate::SUBOPTIMAL));
        assert!(!r.contains(Recreate::OUT_OF_DATE));
        assert!(!r.is_empty());
    }
}
