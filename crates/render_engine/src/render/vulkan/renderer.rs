//! Frame-in-flight execution protocol
//!
//! One frame is one `begin_frame`/`end_frame` cycle: wait for the current
//! slot's previous GPU work, acquire a presentable image, let the caller
//! record into the slot's command buffer, submit, present, advance the
//! slot. The swapchain is destroyed and rebuilt whenever acquire or present
//! reports it stale, or an external component requested a resize; every
//! rebuild is announced on the event bus so surface-derived resources can
//! recreate themselves.
//!
//! Both invalidation checks are needed: the windowing system can report
//! staleness at acquire or at present, and only a full rebuild keeps image
//! format, extent and count consistent for all dependents.

use ash::{vk, Device};

use crate::core::config::RendererConfig;
use crate::events::{EngineEvent, EventBus};
use crate::render::vulkan::commands::CommandPool;
use crate::render::vulkan::context::DeviceContext;
use crate::render::vulkan::swapchain::Swapchain;
use crate::render::vulkan::sync::FrameSync;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// One frame's worth of in-flight state: a resettable primary command
/// buffer plus its synchronization objects
struct FrameSlot {
    command_buffer: vk::CommandBuffer,
    sync: FrameSync,
}

/// Orchestrates the swapchain and frame slots across the frame protocol
///
/// Exactly one slot is current at any time; the index advances
/// `(i + 1) % N` once per completed frame and never on a skipped one, so a
/// frame skipped for a surface rebuild is retried on the same slot.
pub struct Renderer {
    device: Device,
    swapchain: Swapchain,
    slots: Vec<FrameSlot>,
    // Held for RAII: owns the slots' command buffers.
    _command_pool: CommandPool,
    events: EventBus,
    window_extent: vk::Extent2D,
    vsync: bool,
    current_frame: usize,
    image_index: u32,
    frame_active: bool,
    resize_requested: bool,
}

impl Renderer {
    /// Create the renderer: swapchain plus `max_frames_in_flight` slots
    pub fn new(
        context: &DeviceContext,
        window_size: (u32, u32),
        config: &RendererConfig,
    ) -> VulkanResult<Self> {
        let device = context.raw_device();
        let window_extent = vk::Extent2D { width: window_size.0, height: window_size.1 };

        let swapchain = Swapchain::new(
            context.instance(),
            device.clone(),
            context.surface(),
            context.surface_loader(),
            context.physical_device(),
            window_extent,
            config.vsync,
            vk::SwapchainKHR::null(),
        )?;

        let command_pool = CommandPool::new(device.clone(), context.graphics_queue_family())?;
        let command_buffers =
            command_pool.allocate_command_buffers(config.max_frames_in_flight as u32)?;

        let slots = command_buffers
            .into_iter()
            .map(|command_buffer| {
                Ok(FrameSlot { command_buffer, sync: FrameSync::new(device.clone())? })
            })
            .collect::<VulkanResult<Vec<_>>>()?;
        log::info!("Renderer: {} frame slot(s) created", slots.len());

        Ok(Self {
            device,
            swapchain,
            slots,
            _command_pool: command_pool,
            events: EventBus::new(),
            window_extent,
            vsync: config.vsync,
            current_frame: 0,
            image_index: 0,
            frame_active: false,
            resize_requested: false,
        })
    }

    /// Start a frame
    ///
    /// Blocks on the current slot's fence, bounding in-flight frames to the
    /// slot count, then acquires the next presentable image. Returns
    /// `Ok(false)` when the surface was out of date: the swapchain has been
    /// rebuilt, `SurfaceInvalidated` broadcast, and the caller must skip
    /// all rendering this iteration and retry next tick. On `Ok(true)` the
    /// slot's command buffer is recording and ready for draw commands.
    pub fn begin_frame(&mut self, context: &DeviceContext) -> VulkanResult<bool> {
        self.slots[self.current_frame].sync.in_flight.wait(u64::MAX)?;

        let image_available = self.slots[self.current_frame].sync.image_available.handle();
        let acquired = unsafe {
            context.swapchain_loader().acquire_next_image(
                self.swapchain.handle(),
                u64::MAX,
                image_available,
                vk::Fence::null(),
            )
        };

        // Suboptimal at acquire still yields a usable image; the frame
        // proceeds and present handles the rebuild.
        let image_index = match acquired {
            Ok((index, _suboptimal)) => index,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.rebuild_swapchain(context)?;
                return Ok(false);
            }
            Err(e) => return Err(VulkanError::Api(e)),
        };

        let slot = &self.slots[self.current_frame];
        slot.sync.in_flight.reset()?;

        let command_buffer = slot.command_buffer;
        let begin_info = vk::CommandBufferBeginInfo::builder();
        unsafe {
            self.device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(VulkanError::Api)?;
            self.device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }

        self.image_index = image_index;
        self.frame_active = true;
        Ok(true)
    }

    /// Finish the frame: submit the recorded work and present
    ///
    /// Submission waits on the image-acquired semaphore and signals the
    /// work-finished semaphore plus the slot fence; presentation waits on
    /// the work-finished semaphore. A stale or suboptimal present, or a
    /// pending [`request_resize`](Self::request_resize), triggers the
    /// rebuild-and-broadcast path. The slot index advances unconditionally.
    pub fn end_frame(&mut self, context: &DeviceContext) -> VulkanResult<()> {
        if !self.frame_active {
            log::warn!("Renderer: end_frame without a matching begin_frame, ignoring");
            return Ok(());
        }
        self.frame_active = false;

        let slot = &self.slots[self.current_frame];
        let command_buffer = slot.command_buffer;
        unsafe {
            self.device.end_command_buffer(command_buffer).map_err(VulkanError::Api)?;
        }

        let wait_semaphores = [slot.sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let signal_semaphores = [slot.sync.render_finished.handle()];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .queue_submit(
                    context.graphics_queue(),
                    &[submit_info.build()],
                    slot.sync.in_flight.handle(),
                )
                .map_err(VulkanError::Api)?;
        }

        let swapchains = [self.swapchain.handle()];
        let image_indices = [self.image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let present_result = unsafe {
            context
                .swapchain_loader()
                .queue_present(context.present_queue(), &present_info)
        };

        let surface_stale = match present_result {
            Ok(suboptimal) => suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => true,
            Err(e) => return Err(VulkanError::Api(e)),
        };

        if surface_stale || self.resize_requested {
            self.resize_requested = false;
            self.rebuild_swapchain(context)?;
        }

        self.current_frame = (self.current_frame + 1) % self.slots.len();
        Ok(())
    }

    /// Destroy and rebuild the swapchain, then broadcast
    /// [`EngineEvent::SurfaceInvalidated`]
    ///
    /// Waits for the device to go fully idle first: all slots' GPU work
    /// must retire before the old images are destroyed.
    fn rebuild_swapchain(&mut self, context: &DeviceContext) -> VulkanResult<()> {
        context.wait_idle()?;

        let new_swapchain = Swapchain::new(
            context.instance(),
            self.device.clone(),
            context.surface(),
            context.surface_loader(),
            context.physical_device(),
            self.window_extent,
            self.vsync,
            self.swapchain.handle(),
        )?;
        // The old swapchain must stay alive until after creation so the
        // driver can recycle its images; it drops on assignment.
        self.swapchain = new_swapchain;

        let extent = self.swapchain.extent();
        self.events.send_broadcast(&EngineEvent::SurfaceInvalidated {
            width: extent.width,
            height: extent.height,
        });
        Ok(())
    }

    /// Force a swapchain rebuild at the next `end_frame`
    ///
    /// Called by window-event glue when the OS reports a size change the
    /// driver has not (yet) flagged through acquire/present results.
    pub fn request_resize(&mut self) {
        self.resize_requested = true;
    }

    /// Update the fallback extent used when the surface does not dictate
    /// its own size
    pub fn set_window_extent(&mut self, width: u32, height: u32) {
        self.window_extent = vk::Extent2D { width, height };
    }

    /// Command buffer of the current frame slot, for external render-pass
    /// recording between `begin_frame` and `end_frame`
    pub fn active_command_buffer(&self) -> vk::CommandBuffer {
        self.slots[self.current_frame].command_buffer
    }

    /// Swapchain image index acquired by the last successful `begin_frame`
    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    /// Index of the current frame slot
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Number of frame slots (frames in flight)
    pub fn max_frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// The current swapchain
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// Event registry, for components that must rebuild on
    /// `SurfaceInvalidated`
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Mutable event registry for listener registration
    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        unsafe {
            // Slots, pool and swapchain are about to be destroyed; nothing
            // may still be executing.
            let _ = self.device.device_wait_idle();
        }
        log::info!("Renderer: destroyed");
    }
}
