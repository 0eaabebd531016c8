// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::ext::debug_utils;
use ash::{vk, Entry, Instance};
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_void, CStr};
use texquad_core::Error;
use tracing::{debug, error, info, trace, warn};

pub(crate) const VALIDATION_LAYERS: [&CStr; 1] = [c"VK_LAYER_KHRONOS_validation"];

const APP_NAME: &CStr = c"Vulkan Tutorial";
const ENGINE_NAME: &CStr = c"No Engine";

/// Names from `desired` that do not appear in `available`, in `desired` order.
pub(crate) fn missing_names(desired: &[&CStr], available: &[&CStr]) -> Vec<String> {
    desired
        .iter()
        .filter(|want| !available.contains(want))
        .map(|want| want.to_string_lossy().into_owned())
        .collect()
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() {
        return vk::FALSE;
    }
    let p = (*data).p_message;
    if p.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr(p).to_string_lossy();

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(?types, "validation: {msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(?types, "validation: {msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        info!(?types, "validation: {msg}");
    } else {
        trace!(?types, "validation: {msg}");
    }
    vk::FALSE
}

pub(crate) fn debug_messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    }
}

/// Standalone messenger for the lifetime of the instance.
pub(crate) struct DebugMessenger {
    loader: debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    pub unsafe fn new(entry: &Entry, instance: &Instance) -> Result<Self> {
        let loader = debug_utils::Instance::new(entry, instance);
        let ci = debug_messenger_create_info();
        let messenger = loader
            .create_debug_utils_messenger(&ci, None)
            .context("create_debug_utils_messenger")?;
        Ok(Self { loader, messenger })
    }

    pub unsafe fn destroy(&self) {
        self.loader
            .destroy_debug_utils_messenger(self.messenger, None);
    }
}

/// Returns the desired validation layers the runtime does not provide.
pub(crate) unsafe fn check_validation_layer_support(entry: &Entry) -> Result<Vec<String>> {
    let props = entry
        .enumerate_instance_layer_properties()
        .context("enumerate_instance_layer_properties")?;
    let available: Vec<&CStr> = props
        .iter()
        .filter_map(|p| p.layer_name_as_c_str().ok())
        .collect();

    debug!("instance layers:");
    for name in &available {
        debug!("  {}", name.to_string_lossy());
    }

    let missing = missing_names(&VALIDATION_LAYERS, &available);
    for want in VALIDATION_LAYERS {
        let found = !missing.iter().any(|m| m.as_str() == want.to_string_lossy());
        debug!(
            "  desired {} ({})",
            want.to_string_lossy(),
            if found { "supported" } else { "not supported" }
        );
    }
    Ok(missing)
}

unsafe fn log_instance_extensions(entry: &Entry, required: &[*const std::ffi::c_char]) {
    let props = entry
        .enumerate_instance_extension_properties(None)
        .unwrap_or_default();
    let available: Vec<&CStr> = props
        .iter()
        .filter_map(|p| p.extension_name_as_c_str().ok())
        .collect();

    debug!("instance extensions:");
    for name in &available {
        debug!("  {}", name.to_string_lossy());
    }
    debug!("window system extensions:");
    for &ptr in required {
        // ash-window hands out static NUL-terminated names
        let name = CStr::from_ptr(ptr);
        debug!(
            "  {} ({})",
            name.to_string_lossy(),
            if available.contains(&name) {
                "runtime supported"
            } else {
                "NOT runtime supported"
            }
        );
    }
}

pub(crate) unsafe fn create_instance(
    entry: &Entry,
    display_raw: RawDisplayHandle,
    validation: bool,
) -> Result<Instance> {
    if validation {
        let missing = check_validation_layer_support(entry)?;
        if !missing.is_empty() {
            return Err(Error::MissingValidationLayers(missing).into());
        }
    }

    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: APP_NAME.as_ptr(),
        application_version: vk::make_api_version(0, 1, 0, 0),
        p_engine_name: ENGINE_NAME.as_ptr(),
        engine_version: vk::make_api_version(0, 1, 0, 0),
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };

    let wsi_exts = ash_window::enumerate_required_extensions(display_raw)
        .context("enumerate_required_extensions")?;
    log_instance_extensions(entry, wsi_exts);

    let mut ext_vec = wsi_exts.to_vec();
    if validation {
        ext_vec.push(debug_utils::NAME.as_ptr());
    }

    let layer_ptrs: Vec<*const std::ffi::c_char> =
        VALIDATION_LAYERS.iter().map(|l| l.as_ptr()).collect();
    let (enabled_layer_count, pp_enabled_layer_names) = if validation {
        (layer_ptrs.len() as u32, layer_ptrs.as_ptr())
    } else {
        (0u32, std::ptr::null())
    };

    // Chained so instance creation/destruction itself is reported too.
    let debug_ci = debug_messenger_create_info();
    let p_next = if validation {
        (&debug_ci as *const vk::DebugUtilsMessengerCreateInfoEXT<'_>).cast::<c_void>()
    } else {
        std::ptr::null()
    };

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_next,
        p_application_info: &app_info,
        enabled_extension_count: ext_vec.len() as u32,
        pp_enabled_extension_names: ext_vec.as_ptr(),
        enabled_layer_count,
        pp_enabled_layer_names,
        ..Default::default()
    };

    let instance = entry
        .create_instance(&create_info, None)
        .context("create_instance")?;
    info!(
        "Vulkan instance ready (validation={}, {} extensions)",
        validation,
        ext_vec.len()
    );
    Ok(instance)
}
