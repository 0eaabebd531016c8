// SPDX-License-Identifier: CEPL-1.0
use std::path::PathBuf;

/// Failures worth matching on. Raw Vulkan errors travel as `anyhow` context instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("validation layers requested but not available: {}", .0.join(", "))]
    MissingValidationLayers(Vec<String>),

    #[error("failed to find GPUs with Vulkan support")]
    NoVulkanGpu,

    #[error("failed to find a suitable GPU")]
    NoSuitableGpu,

    #[error("failed to find suitable memory type (filter {type_filter:#034b}, flags {flags:#x})")]
    NoSuitableMemoryType { type_filter: u32, flags: u32 },

    #[error("unsupported layout transition: {from} -> {to}")]
    UnsupportedLayoutTransition { from: String, to: String },

    #[error("failed to load texture image {path}: {reason}")]
    TextureLoad { path: PathBuf, reason: String },

    #[error("surface reports no formats")]
    NoSurfaceFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_layers_lists_every_name() {
        let e = Error::MissingValidationLayers(vec!["A".into(), "B".into()]);
        assert_eq!(
            e.to_string(),
            "validation layers requested but not available: A, B"
        );
    }

    #[test]
    fn memory_type_error_shows_filter_bits() {
        let e = Error::NoSuitableMemoryType {
            type_filter: 0b101,
            flags: 0x6,
        };
        let s = e.to_string();
        assert!(s.contains("0b00000000000000000000000000000101"), "{s}");
        assert!(s.contains("0x6"), "{s}");
    }
}
