// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;

use crate::MAX_FRAMES_IN_FLIGHT;

pub(crate) struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
}

impl FrameSync {
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_semaphore(self.image_available, None);
        device.destroy_semaphore(self.render_finished, None);
        device.destroy_fence(self.in_flight, None);
    }
}

/// Fences start signaled so the first wait on each frame returns at once.
pub(crate) unsafe fn create_sync_objects(device: &ash::Device) -> Result<Vec<FrameSync>> {
    let sem_ci = vk::SemaphoreCreateInfo::default();
    let fence_ci = vk::FenceCreateInfo {
        s_type: vk::StructureType::FENCE_CREATE_INFO,
        flags: vk::FenceCreateFlags::SIGNALED,
        ..Default::default()
    };
    let mut frames = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
    for _ in 0..MAX_FRAMES_IN_FLIGHT {
        frames.push(FrameSync {
            image_available: device
                .create_semaphore(&sem_ci, None)
                .context("create_semaphore(image_available)")?,
            render_finished: device
                .create_semaphore(&sem_ci, None)
                .context("create_semaphore(render_finished)")?,
            in_flight: device
                .create_fence(&fence_ci, None)
                .context("create_fence(in_flight)")?,
        });
    }
    Ok(frames)
}

pub(crate) struct CommandPools {
    pub graphics: vk::CommandPool,
    pub transfer: vk::CommandPool,
}

impl CommandPools {
    pub unsafe fn create(device: &ash::Device, graphics: u32, transfer: u32) -> Result<Self> {
        let gfx_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            queue_family_index: graphics,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            ..Default::default()
        };
        let xfer_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            queue_family_index: transfer,
            flags: vk::CommandPoolCreateFlags::TRANSIENT,
            ..Default::default()
        };
        let graphics = device
            .create_command_pool(&gfx_info, None)
            .context("create_command_pool(graphics)")?;
        let transfer = match device.create_command_pool(&xfer_info, None) {
            Ok(p) => p,
            Err(e) => {
                device.destroy_command_pool(graphics, None);
                return Err(e).context("create_command_pool(transfer)");
            }
        };
        Ok(Self { graphics, transfer })
    }

    pub unsafe fn allocate_frame_buffers(
        &self,
        device: &ash::Device,
    ) -> Result<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: self.graphics,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: MAX_FRAMES_IN_FLIGHT as u32,
            ..Default::default()
        };
        Ok(device
            .allocate_command_buffers(&alloc_info)
            .context("allocate_command_buffers")?)
    }

    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_command_pool(self.transfer, None);
        device.destroy_command_pool(self.graphics, None);
    }
}

/// Cycles 0, 1, 0, 1, ... over the frames in flight.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct FrameCounter {
    count: u64,
}

impl FrameCounter {
    pub fn current(&self) -> usize {
        (self.count % MAX_FRAMES_IN_FLIGHT as u64) as usize
    }

    pub fn advance(&mut self) {
        self.count = self.count.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_alternates_between_frames() {
        let mut c = FrameCounter::default();
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(c.current());
            c.advance();
        }
        assert_eq!(seen, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn counter_survives_wraparound() {
        let mut c = FrameCounter { count: u64::MAX };
        assert_eq!(c.current(), 1);
        c.advance();
        assert_eq!(c.current(), 0);
    }
}
