// SPDX-License-Identifier: CEPL-1.0
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use texquad_render::{RenderSettings, TextureFilter, VsyncMode};
use tracing::{info, warn};

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppCfg {
    pub window: WindowCfg,
    pub render: RenderCfg,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WindowCfg {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            width: 800,
            height: 600,
            title: "Vulkan Tutorial".to_owned(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RenderCfg {
    pub clear_color: [f32; 4],
    pub vsync: bool,
    pub vsync_mode: VsyncModeCfg,
    /// Unset follows the build profile.
    pub validation: Option<bool>,
    pub texture: Option<PathBuf>,
    pub filter: FilterCfg,
    pub spin_degrees_per_sec: f32,
    pub unfocused: UnfocusedPolicy,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            vsync: true,
            vsync_mode: VsyncModeCfg::Mailbox,
            validation: None,
            texture: None,
            filter: FilterCfg::Nearest,
            spin_degrees_per_sec: 90.0,
            unfocused: UnfocusedPolicy::VsyncOn,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VsyncModeCfg {
    Fifo,
    #[default]
    Mailbox,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterCfg {
    #[default]
    Nearest,
    Linear,
}

/// What to do with presentation while the window is in the background.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnfocusedPolicy {
    None,
    #[default]
    VsyncOn,
}

impl UnfocusedPolicy {
    /// Presentation to apply after a focus change, or `None` to leave it alone.
    /// `configured` is the `(vsync, mode)` pair the user asked for.
    pub fn presentation(
        self,
        focused: bool,
        configured: (bool, VsyncMode),
    ) -> Option<(bool, VsyncMode)> {
        match self {
            UnfocusedPolicy::None => None,
            UnfocusedPolicy::VsyncOn if focused => Some(configured),
            UnfocusedPolicy::VsyncOn => Some((true, VsyncMode::Fifo)),
        }
    }
}

impl RenderCfg {
    pub fn to_settings(&self) -> RenderSettings {
        let defaults = RenderSettings::default();
        RenderSettings {
            clear_color: self.clear_color,
            vsync: self.vsync,
            vsync_mode: match self.vsync_mode {
                VsyncModeCfg::Fifo => VsyncMode::Fifo,
                VsyncModeCfg::Mailbox => VsyncMode::Mailbox,
            },
            validation: self.validation.unwrap_or(defaults.validation),
            texture: self.texture.clone(),
            filter: match self.filter {
                FilterCfg::Nearest => TextureFilter::Nearest,
                FilterCfg::Linear => TextureFilter::Linear,
            },
            spin_degrees_per_sec: self.spin_degrees_per_sec,
        }
    }
}

pub fn parse_cfg(text: &str) -> Result<AppCfg, toml::de::Error> {
    toml::from_str::<AppCfg>(text)
}

/// Missing file → defaults. Malformed file → warning, then defaults.
pub fn load_cfg(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => match parse_cfg(&s) {
            Ok(cfg) => {
                info!("config: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("config {} ignored: {e}", path.display());
                AppCfg::default()
            }
        },
        Err(_) => AppCfg::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = parse_cfg("").unwrap();
        assert_eq!(cfg.window.width, 800);
        assert_eq!(cfg.window.height, 600);
        assert_eq!(cfg.window.title, "Vulkan Tutorial");
        assert_eq!(cfg.render.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(cfg.render.vsync_mode, VsyncModeCfg::Mailbox);
        assert_eq!(cfg.render.unfocused, UnfocusedPolicy::VsyncOn);
        assert!(cfg.render.texture.is_none());
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let cfg = parse_cfg(
            r#"
            [window]
            title = "quad"

            [render]
            vsync_mode = "fifo"
            filter = "linear"
            texture = "textures/texture.jpg"
            spin_degrees_per_sec = 45.0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.window.title, "quad");
        assert_eq!(cfg.window.width, 800);

        let s = cfg.render.to_settings();
        assert_eq!(s.vsync_mode, VsyncMode::Fifo);
        assert_eq!(s.filter, TextureFilter::Linear);
        assert_eq!(s.texture, Some(PathBuf::from("textures/texture.jpg")));
        assert_eq!(s.spin_degrees_per_sec, 45.0);
        assert!(s.vsync);
    }

    #[test]
    fn validation_defaults_to_build_profile() {
        let s = RenderCfg::default().to_settings();
        assert_eq!(s.validation, cfg!(debug_assertions));

        let forced = parse_cfg("[render]\nvalidation = false\n").unwrap();
        assert!(!forced.render.to_settings().validation);
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(parse_cfg("[render]\nvsync_mode = \"sometimes\"\n").is_err());
        assert!(parse_cfg("[window\nwidth = 1").is_err());
    }

    #[test]
    fn unfocused_vsync_on_forces_fifo_until_focus_returns() {
        let configured = (false, VsyncMode::Mailbox);
        let p = UnfocusedPolicy::VsyncOn;
        assert_eq!(p.presentation(false, configured), Some((true, VsyncMode::Fifo)));
        assert_eq!(p.presentation(true, configured), Some(configured));
    }

    #[test]
    fn unfocused_none_leaves_presentation_alone() {
        let configured = (false, VsyncMode::Mailbox);
        assert_eq!(UnfocusedPolicy::None.presentation(false, configured), None);
        assert_eq!(UnfocusedPolicy::None.presentation(true, configured), None);

        let cfg = parse_cfg("[render]\nunfocused = \"none\"\n").unwrap();
        assert_eq!(cfg.render.unfocused, UnfocusedPolicy::None);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let cfg = load_cfg(Path::new("definitely/not/here/texquad.toml"));
        assert_eq!(cfg.window.width, 800);
    }
}
