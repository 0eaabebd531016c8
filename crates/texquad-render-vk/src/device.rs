// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::khr::{surface, swapchain};
use ash::{vk, Instance};
use std::collections::BTreeSet;
use std::ffi::CStr;
use texquad_core::Error;
use tracing::{debug, info};

use crate::instance::missing_names;
use crate::swapchain::SwapchainSupport;

pub(crate) const DEVICE_EXTENSIONS: [&CStr; 1] = [swapchain::NAME];

/// Raw scan result. `transfer` is only set for a family without GRAPHICS.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
    pub transfer: Option<u32>,
}

impl QueueFamilyIndices {
    /// Walk the families in order; stop as soon as all three roles are filled.
    pub fn find(
        families: &[vk::QueueFamilyProperties],
        mut can_present: impl FnMut(u32) -> bool,
    ) -> Self {
        let mut out = Self::default();
        for (i, family) in families.iter().enumerate() {
            let i = i as u32;
            let flags = family.queue_flags;
            if flags.contains(vk::QueueFlags::GRAPHICS) {
                out.graphics = Some(i);
            }
            if flags.contains(vk::QueueFlags::TRANSFER) && !flags.contains(vk::QueueFlags::GRAPHICS)
            {
                out.transfer = Some(i);
            }
            if can_present(i) {
                out.present = Some(i);
            }
            if out.graphics.is_some() && out.present.is_some() && out.transfer.is_some() {
                break;
            }
        }
        out
    }

    /// Graphics and present are mandatory; transfer falls back to graphics.
    pub fn resolve(&self) -> Option<QueueFamilies> {
        let graphics = self.graphics?;
        let present = self.present?;
        Some(QueueFamilies {
            graphics,
            present,
            transfer: self.transfer.unwrap_or(graphics),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
    pub transfer: u32,
}

impl QueueFamilies {
    /// Distinct family indices, ascending.
    pub fn unique(&self) -> Vec<u32> {
        [self.graphics, self.present, self.transfer]
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Families a shared resource must be visible to; empty means EXCLUSIVE is enough.
    pub fn sharing(&self) -> Vec<u32> {
        let unique = self.unique();
        if unique.len() > 1 {
            unique
        } else {
            Vec::new()
        }
    }

    /// Families that touch buffers filled on the transfer queue and read by graphics.
    pub fn upload_sharing(&self) -> Vec<u32> {
        if self.graphics == self.transfer {
            Vec::new()
        } else {
            vec![self.graphics, self.transfer]
        }
    }
}

pub(crate) struct Queues {
    pub graphics: vk::Queue,
    pub present: vk::Queue,
    pub transfer: vk::Queue,
}

/// What a physical device offers that decides suitability.
#[derive(Clone, Debug, Default)]
pub(crate) struct DeviceReport {
    pub families: QueueFamilyIndices,
    pub missing_extensions: Vec<String>,
    pub swapchain_adequate: bool,
    pub sampler_anisotropy: bool,
    pub linear_filter_srgb: bool,
}

impl DeviceReport {
    pub fn suitable(&self) -> Option<QueueFamilies> {
        if self.missing_extensions.is_empty()
            && self.swapchain_adequate
            && self.sampler_anisotropy
            && self.linear_filter_srgb
        {
            self.families.resolve()
        } else {
            None
        }
    }
}

pub(crate) unsafe fn check_device_extension_support(
    instance: &Instance,
    phys: vk::PhysicalDevice,
) -> Result<Vec<String>> {
    let props = instance
        .enumerate_device_extension_properties(phys)
        .context("enumerate_device_extension_properties")?;
    let available: Vec<&CStr> = props
        .iter()
        .filter_map(|p| p.extension_name_as_c_str().ok())
        .collect();
    Ok(missing_names(&DEVICE_EXTENSIONS, &available))
}

unsafe fn inspect_device(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
    phys: vk::PhysicalDevice,
) -> Result<DeviceReport> {
    let qprops = instance.get_physical_device_queue_family_properties(phys);
    let families = QueueFamilyIndices::find(&qprops, |i| {
        surface_loader
            .get_physical_device_surface_support(phys, i, surface)
            .unwrap_or(false)
    });

    let missing_extensions = check_device_extension_support(instance, phys)?;
    // Only query the surface once we know the swapchain extension is there.
    let swapchain_adequate = missing_extensions.is_empty()
        && SwapchainSupport::query(surface_loader, phys, surface)?.is_adequate();

    let features = instance.get_physical_device_features(phys);
    let fmt = instance.get_physical_device_format_properties(phys, vk::Format::R8G8B8A8_SRGB);

    Ok(DeviceReport {
        families,
        missing_extensions,
        swapchain_adequate,
        sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
        linear_filter_srgb: fmt
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR),
    })
}

fn device_name(props: &vk::PhysicalDeviceProperties) -> String {
    props
        .device_name_as_c_str()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "<unnamed>".to_owned())
}

/// First suitable GPU, in enumeration order.
pub(crate) unsafe fn pick_physical_device(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, QueueFamilies)> {
    let devices = instance
        .enumerate_physical_devices()
        .context("enumerate_physical_devices")?;
    if devices.is_empty() {
        return Err(Error::NoVulkanGpu.into());
    }

    for phys in devices {
        let props = instance.get_physical_device_properties(phys);
        let name = device_name(&props);
        let report = inspect_device(instance, surface_loader, surface, phys)?;
        match report.suitable() {
            Some(families) => {
                info!("GPU: {name} (families {families:?})");
                return Ok((phys, families));
            }
            None => debug!("skipping {name}: {report:?}"),
        }
    }
    Err(Error::NoSuitableGpu.into())
}

pub(crate) unsafe fn create_logical_device(
    instance: &Instance,
    phys: vk::PhysicalDevice,
    families: QueueFamilies,
) -> Result<(ash::Device, Queues)> {
    let priorities = [1.0_f32];
    let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
        .unique()
        .into_iter()
        .map(|family| vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            queue_family_index: family,
            queue_count: 1,
            p_queue_priorities: priorities.as_ptr(),
            ..Default::default()
        })
        .collect();

    let features = vk::PhysicalDeviceFeatures {
        sampler_anisotropy: vk::TRUE,
        ..Default::default()
    };

    let device_exts: Vec<*const std::ffi::c_char> =
        DEVICE_EXTENSIONS.iter().map(|e| e.as_ptr()).collect();
    let dinfo = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        queue_create_info_count: queue_infos.len() as u32,
        p_queue_create_infos: queue_infos.as_ptr(),
        enabled_extension_count: device_exts.len() as u32,
        pp_enabled_extension_names: device_exts.as_ptr(),
        p_enabled_features: &features,
        ..Default::default()
    };

    let device = instance
        .create_device(phys, &dinfo, None)
        .context("create_device")?;
    let queues = Queues {
        graphics: device.get_device_queue(families.graphics, 0),
        present: device.get_device_queue(families.present, 0),
        transfer: device.get_device_queue(families.transfer, 0),
    };
    Ok((device, queues))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn single_universal_family_covers_everything() {
        let fams = [family(
            vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
        )];
        let idx = QueueFamilyIndices::find(&fams, |_| true);
        assert_eq!(idx.graphics, Some(0));
        assert_eq!(idx.present, Some(0));
        assert_eq!(idx.transfer, None);

        let resolved = idx.resolve().unwrap();
        assert_eq!(resolved.transfer, 0);
        assert_eq!(resolved.unique(), vec![0]);
        assert!(resolved.sharing().is_empty());
        assert!(resolved.upload_sharing().is_empty());
    }

    #[test]
    fn dedicated_transfer_family_is_preferred() {
        let fams = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::TRANSFER),
        ];
        let idx = QueueFamilyIndices::find(&fams, |i| i == 0);
        let resolved = idx.resolve().unwrap();
        assert_eq!(
            resolved,
            QueueFamilies {
                graphics: 0,
                present: 0,
                transfer: 2
            }
        );
        assert_eq!(resolved.sharing(), vec![0, 2]);
        assert_eq!(resolved.upload_sharing(), vec![0, 2]);
    }

    #[test]
    fn scan_stops_once_complete() {
        let fams = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let mut asked = Vec::new();
        let idx = QueueFamilyIndices::find(&fams, |i| {
            asked.push(i);
            true
        });
        assert_eq!(asked, vec![0, 1]);
        assert_eq!(idx.graphics, Some(0));
        assert_eq!(idx.present, Some(1));
        assert_eq!(idx.transfer, Some(1));
    }

    #[test]
    fn later_families_overwrite_earlier_until_complete() {
        let fams = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let idx = QueueFamilyIndices::find(&fams, |i| i == 0);
        assert_eq!(idx.graphics, Some(1));
        assert_eq!(idx.present, Some(0));
        assert_eq!(idx.resolve().unwrap().unique(), vec![0, 1]);
    }

    #[test]
    fn no_present_support_is_unresolvable() {
        let fams = [family(vk::QueueFlags::GRAPHICS)];
        assert!(QueueFamilyIndices::find(&fams, |_| false).resolve().is_none());
    }

    #[test]
    fn report_requires_every_capability() {
        let good = DeviceReport {
            families: QueueFamilyIndices {
                graphics: Some(0),
                present: Some(0),
                transfer: None,
            },
            missing_extensions: vec![],
            swapchain_adequate: true,
            sampler_anisotropy: true,
            linear_filter_srgb: true,
        };
        assert!(good.suitable().is_some());

        let no_aniso = DeviceReport {
            sampler_anisotropy: false,
            ..good.clone()
        };
        assert!(no_aniso.suitable().is_none());

        let no_swapchain = DeviceReport {
            missing_extensions: vec!["VK_KHR_swapchain".into()],
            ..good.clone()
        };
        assert!(no_swapchain.suitable().is_none());

        let no_linear = DeviceReport {
            linear_filter_srgb: false,
            ..good.clone()
        };
        assert!(no_linear.suitable().is_none());

        let bad_surface = DeviceReport {
            swapchain_adequate: false,
            ..good
        };
        assert!(bad_surface.suitable().is_none());
    }

    #[test]
    fn swapchain_is_the_only_device_extension() {
        assert_eq!(DEVICE_EXTENSIONS, [c"VK_KHR_swapchain"]);
    }
}
