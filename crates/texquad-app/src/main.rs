// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use texquad_core::init_tracing;
use texquad_render::{RenderSettings, RenderSize, Renderer, VsyncMode};
use texquad_render_vk::VkRenderer;
use tracing::{error, info};

use texquad_platform::winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

mod config;

use config::{load_cfg, AppCfg};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file; missing is fine
    #[arg(long, default_value = "texquad.toml")]
    config: PathBuf,

    /// Image to put on the quad (overrides the config file)
    #[arg(long)]
    texture: Option<PathBuf>,

    /// Skip the Khronos validation layer
    #[arg(long)]
    no_validation: bool,

    /// Force FIFO presentation
    #[arg(long)]
    fifo: bool,
}

impl Args {
    fn settings(&self, cfg: &AppCfg) -> RenderSettings {
        let mut s = cfg.render.to_settings();
        if let Some(t) = &self.texture {
            s.texture = Some(t.clone());
        }
        if self.no_validation {
            s.validation = false;
        }
        if self.fifo {
            s.vsync = true;
            s.vsync_mode = VsyncMode::Fifo;
        }
        s
    }
}

/// Nothing is drawn while the window is hidden or has no area.
fn should_pause(size: RenderSize, occluded: bool) -> bool {
    occluded || size.is_zero()
}

struct App {
    cfg: AppCfg,
    settings: RenderSettings,
    // Field order matters: the renderer must drop before the window.
    renderer: Option<VkRenderer>,
    window: Option<Window>,
    render_size: RenderSize,

    exiting: bool,
    paused: bool,
    occluded: bool,
    focused: bool,
    frames: u32,
    last_fps_instant: std::time::Instant,
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(cfg: AppCfg, settings: RenderSettings) -> Self {
        App {
            cfg,
            settings,
            renderer: None,
            window: None,
            render_size: RenderSize {
                width: 1,
                height: 1,
            },
            exiting: false,
            paused: false,
            occluded: false,
            focused: true,
            frames: 0,
            last_fps_instant: std::time::Instant::now(),
            failure: None,
        }
    }

    fn create_window_and_renderer(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = texquad_platform::window_attributes(
            &self.cfg.window.title,
            self.cfg.window.width,
            self.cfg.window.height,
        );
        let window = event_loop.create_window(attrs)?;

        let (w, h) = texquad_platform::framebuffer_size(&window);
        self.render_size = RenderSize {
            width: w.max(1),
            height: h.max(1),
        };

        let renderer = VkRenderer::new(&window, &window, self.render_size, &self.settings)?;
        info!(
            "vk renderer up: {}x{}, vsync={} ({:?}), validation={}",
            self.render_size.width,
            self.render_size.height,
            self.settings.vsync,
            self.settings.vsync_mode,
            self.settings.validation
        );

        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn update_paused(&mut self) -> bool {
        let now_paused = should_pause(self.render_size, self.occluded);
        let changed = self.paused != now_paused;
        self.paused = now_paused;
        changed
    }

    /// A failed frame may leave its fence unsignaled, so any render error ends the app.
    fn note_render_result(&mut self, res: Result<()>) -> bool {
        match res {
            Ok(()) => {
                self.frames = self.frames.saturating_add(1);
                true
            }
            Err(e) => {
                error!("render error: {e:#}");
                self.failure = Some(e);
                false
            }
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.exiting = true;
        self.renderer = None;
        self.window = None;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.create_window_and_renderer(event_loop) {
                error!("startup failed: {e:#}");
                self.failure = Some(e);
                self.shutdown(event_loop);
                return;
            }
        }

        // Draw continuously; presentation mode decides the pace.
        event_loop.set_control_flow(ControlFlow::Poll);

        self.update_paused();
        info!("resumed → paused={}", self.paused);

        if !self.paused {
            if let Some(w) = &self.window {
                w.request_redraw();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(new_size) => {
                self.render_size = RenderSize {
                    width: new_size.width,
                    height: new_size.height,
                };
                if self.update_paused() {
                    info!(
                        "Resized → {}x{} (paused={})",
                        self.render_size.width, self.render_size.height, self.paused
                    );
                }

                if let Some(r) = &mut self.renderer {
                    if let Err(e) = r.resize(self.render_size) {
                        error!("resize error: {e:#}");
                    }
                }
                if !self.paused {
                    if let Some(w) = &self.window {
                        w.request_redraw();
                    }
                }
            }

            WindowEvent::Occluded(occluded) => {
                self.occluded = occluded;
                if self.update_paused() {
                    info!("Occluded={} → paused={}", occluded, self.paused);
                }
            }

            WindowEvent::Focused(focused) => {
                if self.focused != focused {
                    self.focused = focused;
                    info!("Focused({})", focused);
                    let configured = (self.settings.vsync, self.settings.vsync_mode);
                    let wanted = self.cfg.render.unfocused.presentation(focused, configured);
                    if let (Some(r), Some((vsync, mode))) = (&mut self.renderer, wanted) {
                        r.set_vsync(vsync);
                        r.set_vsync_mode(mode);
                    }
                }
            }

            WindowEvent::RedrawRequested => {
                if self.exiting || self.paused {
                    return;
                }
                if let Some(r) = &mut self.renderer {
                    let res = r.render();
                    if !self.note_render_result(res) {
                        self.shutdown(event_loop);
                    }
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }

        if self.paused {
            // Minimized or fully hidden: sleep until the window system wakes us.
            event_loop.set_control_flow(ControlFlow::Wait);
            self.frames = 0;
            return;
        }

        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(w) = &self.window {
            w.request_redraw();
        }

        let now = std::time::Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", self.frames);
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let cfg = load_cfg(&args.config);
    let settings = args.settings(&cfg);

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App::new(cfg, settings);
    event_loop.run_app(&mut app)?;

    match app.failure.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
