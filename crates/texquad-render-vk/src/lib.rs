// SPDX-License-Identifier: CEPL-1.0
use anyhow::{anyhow, Context, Result};
use ash::khr::{surface, swapchain as khr_swapchain};
use ash::{vk, Entry, Instance};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::time::Instant;
use texquad_math::UniformBufferObject;
use texquad_render::{
    RenderSettings, RenderSize, Renderer, VsyncMode, QUAD_INDICES, QUAD_VERTICES,
};
use tracing::{debug, info};

mod buffer;
mod descriptor;
mod device;
mod frame;
mod instance;
mod pipeline;
mod swapchain;
mod texture;

use buffer::{create_general_buffer, AllocatedBuffer, OneShot};
use device::{QueueFamilies, Queues};
use frame::{CommandPools, FrameCounter, FrameSync};
use instance::DebugMessenger;
use pipeline::{replace_with, GraphicsObjects};
use swapchain::{resize_outcome, Recreate, SwapchainBundle, SwapchainConfig};
use texture::Texture;

/// Frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

pub struct VkRenderer {
    _entry: Entry,
    instance: Instance,
    debug: Option<DebugMessenger>,
    surface_loader: surface::Instance,
    surface: vk::SurfaceKHR,

    phys: vk::PhysicalDevice,
    families: QueueFamilies,
    device: ash::Device,
    queues: Queues,

    swapchain_loader: khr_swapchain::Device,
    sc: SwapchainBundle,

    desc_set_layout: vk::DescriptorSetLayout,
    gfx: GraphicsObjects,

    pools: CommandPools,
    cmd_bufs: Vec<vk::CommandBuffer>,

    texture: Texture,
    vertex: AllocatedBuffer,
    index: AllocatedBuffer,
    index_count: u32,
    ubufs: Vec<AllocatedBuffer>,
    desc_pool: vk::DescriptorPool,
    desc_sets: Vec<vk::DescriptorSet>,

    frames: Vec<FrameSync>,
    counter: FrameCounter,

    clear: vk::ClearValue,
    vsync: bool,
    vsync_mode: VsyncMode,
    spin_degrees_per_sec: f32,
    size: RenderSize,
    recreate: Recreate,
    paused: bool,
    started: Instant,
}

// Teardown (STRICT ORDER):
// - Wait for the device to go idle first
// - Swapchain resources, then everything the frames reference
// - Pipeline before its layout, layout before the render pass
// - Device, then debug messenger, surface, instance last
impl Drop for VkRenderer {
    fn drop(&mut self) {
        unsafe {
            let d = &self.device;
            d.device_wait_idle().ok();

            self.sc.destroy(d, &self.swapchain_loader);

            self.texture.destroy(d);
            for b in &self.ubufs {
                b.destroy(d);
            }
            d.destroy_descriptor_pool(self.desc_pool, None);
            d.destroy_descriptor_set_layout(self.desc_set_layout, None);

            self.vertex.destroy(d);
            self.index.destroy(d);

            for f in &self.frames {
                f.destroy(d);
            }
            // Destroying the pools frees their command buffers.
            self.pools.destroy(d);

            self.gfx.destroy(d);

            d.destroy_device(None);
            if let Some(dbg) = &self.debug {
                dbg.destroy();
            }
            self.surface_loader.destroy_surface(self.surface, None);
            self.instance.destroy_instance(None);
        }
        info!("vk: renderer destroyed");
    }
}

unsafe fn build_renderer(
    window: &dyn HasWindowHandle,
    display: &dyn HasDisplayHandle,
    size: RenderSize,
    settings: &RenderSettings,
) -> Result<VkRenderer> {
    // STRICT ORDER:
    // 1) Instance (+ messenger), then the surface FROM THIS INSTANCE
    // 2) Physical device chosen AGAINST THIS SURFACE
    // 3) Logical device, then swapchain, render pass, pipeline, framebuffers
    // 4) Pools before anything that uploads through them
    // Decode the texture before any GPU object exists so a bad path leaks nothing.
    let texels = settings.load_texels()?;

    let dh = display
        .display_handle()
        .map_err(|e| anyhow!("{e}"))?
        .as_raw();
    let wh = window
        .window_handle()
        .map_err(|e| anyhow!("{e}"))?
        .as_raw();

    let entry = Entry::linked();
    let instance = instance::create_instance(&entry, dh, settings.validation)?;
    let debug = if settings.validation {
        Some(DebugMessenger::new(&entry, &instance)?)
    } else {
        None
    };

    let surface_loader = surface::Instance::new(&entry, &instance);
    let surface = ash_window::create_surface(&entry, &instance, dh, wh, None)
        .context("ash_window::create_surface")?;

    let (phys, families) = device::pick_physical_device(&instance, &surface_loader, surface)?;
    let (device, queues) = device::create_logical_device(&instance, phys, families)?;
    let props = instance.get_physical_device_properties(phys);
    let mem_props = instance.get_physical_device_memory_properties(phys);

    let swapchain_loader = khr_swapchain::Device::new(&instance, &device);
    let mut sc = SwapchainBundle::create(
        &device,
        &surface_loader,
        &swapchain_loader,
        phys,
        surface,
        vk::SwapchainKHR::null(),
        &families.sharing(),
        SwapchainConfig {
            hint: size,
            vsync: settings.vsync,
            vsync_mode: settings.vsync_mode,
        },
    )?;

    let desc_set_layout = pipeline::create_descriptor_set_layout(&device)?;
    let gfx = GraphicsObjects::create(&device, sc.format, desc_set_layout)?;
    sc.create_framebuffers(&device, gfx.render_pass)?;

    let pools = CommandPools::create(&device, families.graphics, families.transfer)?;
    let graphics_once = OneShot {
        pool: pools.graphics,
        queue: queues.graphics,
    };
    let transfer_once = OneShot {
        pool: pools.transfer,
        queue: queues.transfer,
    };

    let texture = Texture::create(
        &device,
        &mem_props,
        graphics_once,
        &texels,
        props.limits.max_sampler_anisotropy,
        settings.filter,
    )?;

    let upload_families = families.upload_sharing();
    let vertex = create_general_buffer(
        &device,
        &mem_props,
        transfer_once,
        &upload_families,
        bytemuck::cast_slice(&QUAD_VERTICES[..]),
        vk::BufferUsageFlags::VERTEX_BUFFER,
    )?;
    let index = create_general_buffer(
        &device,
        &mem_props,
        transfer_once,
        &upload_families,
        bytemuck::cast_slice(&QUAD_INDICES[..]),
        vk::BufferUsageFlags::INDEX_BUFFER,
    )?;

    let ubufs = descriptor::create_uniform_buffers(&device, &mem_props)?;
    let desc_pool = descriptor::create_descriptor_pool(&device)?;
    let desc_sets =
        descriptor::create_descriptor_sets(&device, desc_pool, desc_set_layout, &ubufs, &texture)?;

    let cmd_bufs = pools.allocate_frame_buffers(&device)?;
    let frames = frame::create_sync_objects(&device)?;

    info!(
        "vk: ready ({} swapchain images, {} frames in flight)",
        sc.images.len(),
        MAX_FRAMES_IN_FLIGHT
    );

    Ok(VkRenderer {
        _entry: entry,
        instance,
        debug,
        surface_loader,
        surface,
        phys,
        families,
        device,
        queues,
        swapchain_loader,
        sc,
        desc_set_layout,
        gfx,
        pools,
        cmd_bufs,
        texture,
        vertex,
        index,
        index_count: QUAD_INDICES.len() as u32,
        ubufs,
        desc_pool,
        desc_sets,
        frames,
        counter: FrameCounter::default(),
        clear: vk::ClearValue {
            color: vk::ClearColorValue {
                float32: settings.clear_color,
            },
        },
        vsync: settings.vsync,
        vsync_mode: settings.vsync_mode,
        spin_degrees_per_sec: settings.spin_degrees_per_sec,
        size,
        recreate: Recreate::empty(),
        paused: size.is_zero(),
        started: Instant::now(),
    })
}

impl VkRenderer {
    /// Switch between MAILBOX and FIFO; applied on the next swapchain rebuild.
    pub fn set_vsync_mode(&mut self, mode: VsyncMode) {
        if self.vsync_mode == mode {
            return;
        }
        self.vsync_mode = mode;
        self.recreate |= Recreate::PRESENT_MODE;
    }

    unsafe fn update_uniform_buffer(&self, frame: usize) -> Result<()> {
        let ubo = UniformBufferObject::spinning_quad(
            self.started.elapsed().as_secs_f32(),
            self.spin_degrees_per_sec,
            self.sc.extent.width,
            self.sc.extent.height,
        );
        descriptor::update_uniform_buffer(&self.device, &self.ubufs[frame], &ubo)
    }

    unsafe fn record_command_buffer(
        &self,
        cmd: vk::CommandBuffer,
        image_index: usize,
        frame: usize,
    ) -> Result<()> {
        let d = &self.device;
        d.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
            .context("reset_command_buffer")?;
        let begin = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            ..Default::default()
        };
        d.begin_command_buffer(cmd, &begin)
            .context("begin_command_buffer")?;

        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.sc.extent,
        };
        let rp_begin = vk::RenderPassBeginInfo {
            s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
            render_pass: self.gfx.render_pass,
            framebuffer: self.sc.framebuffers[image_index],
            render_area,
            clear_value_count: 1,
            p_clear_values: &self.clear,
            ..Default::default()
        };
        d.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);
        d.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.gfx.pipeline);

        d.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex.buffer], &[0]);
        d.cmd_bind_index_buffer(cmd, self.index.buffer, 0, vk::IndexType::UINT16);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.sc.extent.width as f32,
            height: self.sc.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        d.cmd_set_viewport(cmd, 0, std::slice::from_ref(&viewport));
        d.cmd_set_scissor(cmd, 0, std::slice::from_ref(&render_area));

        d.cmd_bind_descriptor_sets(
            cmd,
            vk::PipelineBindPoint::GRAPHICS,
            self.gfx.layout,
            0,
            &[self.desc_sets[frame]],
            &[],
        );
        d.cmd_draw_indexed(cmd, self.index_count, 1, 0, 0, 0);

        d.cmd_end_render_pass(cmd);
        d.end_command_buffer(cmd).context("end_command_buffer")?;
        Ok(())
    }

    // STRICT ORDER (recreate):
    // 1) Zero-sized surface → pause, touch nothing
    // 2) device_wait_idle() so nothing still references the old images
    // 3) Create NEW swapchain (old handle passed along), then destroy the OLD bundle
    // 4) Rebuild render pass + pipeline ONLY if the color format changed;
    //    the new pair is built before the old one is destroyed
    // 5) Framebuffers for the new views
    unsafe fn recreate_swapchain(&mut self) -> Result<()> {
        if self.size.is_zero() {
            self.paused = true;
            return Ok(());
        }

        self.device
            .device_wait_idle()
            .context("device_wait_idle(recreate)")?;

        let bundle = SwapchainBundle::create(
            &self.device,
            &self.surface_loader,
            &self.swapchain_loader,
            self.phys,
            self.surface,
            self.sc.swapchain,
            &self.families.sharing(),
            SwapchainConfig {
                hint: self.size,
                vsync: self.vsync,
                vsync_mode: self.vsync_mode,
            },
        )?;
        let mut old = std::mem::replace(&mut self.sc, bundle);
        let old_format = old.format;
        old.destroy(&self.device, &self.swapchain_loader);

        if self.sc.format != old_format {
            info!(
                "vk: swapchain format changed {:?} → {:?}; rebuilding pipeline",
                old_format, self.sc.format
            );
            let device = &self.device;
            let format = self.sc.format;
            let set_layout = self.desc_set_layout;
            replace_with(
                &mut self.gfx,
                || GraphicsObjects::create(device, format, set_layout),
                |old| old.destroy(device),
            )?;
        }

        self.sc.create_framebuffers(&self.device, self.gfx.render_pass)?;
        debug!(
            "vk: swapchain recreated ({:?}) at {}x{}",
            self.recreate, self.sc.extent.width, self.sc.extent.height
        );
        self.recreate = Recreate::empty();
        Ok(())
    }

    // STRICT PER-FRAME ORDER:
    // 1) wait this frame's fence
    // 2) acquire (signals image_available)
    // 3) update UBO, record, then reset the fence right before submit
    // 4) submit (waits image_available, signals render_finished + fence)
    // 5) present (waits render_finished)
    unsafe fn draw_frame(&mut self) -> Result<()> {
        let frame = self.counter.current();
        let in_flight = self.frames[frame].in_flight;
        let image_available = self.frames[frame].image_available;
        let render_finished = self.frames[frame].render_finished;

        self.device
            .wait_for_fences(&[in_flight], true, u64::MAX)
            .context("wait_for_fences(in_flight)")?;

        let image_index = match self.swapchain_loader.acquire_next_image(
            self.sc.swapchain,
            u64::MAX,
            image_available,
            vk::Fence::null(),
        ) {
            Ok((idx, _suboptimal)) => idx,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.recreate |= Recreate::OUT_OF_DATE;
                // Fence is still signaled; nothing was submitted this frame.
                return self.recreate_swapchain();
            }
            Err(e) => return Err(anyhow!("acquire_next_image: {e:?}")),
        };

        self.update_uniform_buffer(frame)?;

        let cmd = self.cmd_bufs[frame];
        self.record_command_buffer(cmd, image_index as usize, frame)?;

        // Past this point a failure leaves the fence unsignaled; callers must
        // treat any error from here on as fatal.
        self.device
            .reset_fences(&[in_flight])
            .context("reset_fences")?;

        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &image_available,
            p_wait_dst_stage_mask: wait_stages.as_ptr(),
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            signal_semaphore_count: 1,
            p_signal_semaphores: &render_finished,
            ..Default::default()
        };
        self.device
            .queue_submit(
                self.queues.graphics,
                std::slice::from_ref(&submit),
                in_flight,
            )
            .context("queue_submit")?;

        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &render_finished,
            swapchain_count: 1,
            p_swapchains: &self.sc.swapchain,
            p_image_indices: &image_index,
            ..Default::default()
        };
        self.recreate = self
            .recreate
            .after_present(
                self.swapchain_loader
                    .queue_present(self.queues.present, &present),
            )
            .map_err(|e| anyhow!("queue_present: {e:?}"))?;

        self.counter.advance();

        if !self.recreate.is_empty() {
            self.recreate_swapchain()?;
        }
        Ok(())
    }
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: &RenderSettings,
    ) -> Result<Self> {
        unsafe { build_renderer(window, display, size, settings) }
    }

    fn resize(&mut self, size: RenderSize) -> Result<()> {
        self.size = size;
        let outcome = resize_outcome(size);
        let paused = outcome.is_none();
        if self.paused != paused {
            info!(
                "vk: resize to {}x{} → paused={}",
                size.width, size.height, paused
            );
        }
        self.paused = paused;
        if let Some(reason) = outcome {
            self.recreate |= reason;
        }
        Ok(())
    }

    fn render(&mut self) -> Result<()> {
        if self.paused {
            return Ok(());
        }
        unsafe { self.draw_frame() }
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear = vk::ClearValue {
            color: vk::ClearColorValue { float32: rgba },
        };
    }

    fn set_vsync(&mut self, on: bool) {
        if self.vsync == on {
            return;
        }
        self.vsync = on;
        self.recreate |= Recreate::PRESENT_MODE;
    }
}
