//! wgpu-backed GPU context
//!
//! The adapter and device are acquired lazily on the first surface so the
//! adapter is guaranteed compatible with it. Device loss reported by wgpu
//! is latched and turned into a failed present.

use super::blit::BlitPipeline;
use super::{FrameTarget, GpuContext, SurfaceHandle, SurfaceRegion};
use crate::utils::config::{PowerPreference, RenderConfig};
use crate::utils::error::{PlayerError, Result, ResultExt};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// Adapter and presentation options
#[derive(Debug, Clone, Copy)]
pub struct GpuOptions {
    pub power_preference: wgpu::PowerPreference,
    pub vsync: bool,
}

impl Default for GpuOptions {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            vsync: true,
        }
    }
}

impl From<&RenderConfig> for GpuOptions {
    fn from(config: &RenderConfig) -> Self {
        Self {
            power_preference: match config.power_preference {
                PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
                PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
            },
            vsync: config.vsync,
        }
    }
}

/// Device, queue and the pipeline built on them
struct DeviceState {
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    blit: Option<BlitPipeline>,
    lost: Arc<AtomicBool>,
}

/// The one configured surface
struct SurfaceSlot {
    handle: SurfaceHandle,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
}

/// [`GpuContext`] over wgpu
pub struct WgpuContext {
    instance: wgpu::Instance,
    options: GpuOptions,
    device: Option<DeviceState>,
    slot: Option<SurfaceSlot>,
    next_id: u64,
    owner: Option<ThreadId>,
}

impl WgpuContext {
    pub fn new(options: GpuOptions) -> Self {
        Self {
            instance: Self::create_instance(),
            options,
            device: None,
            slot: None,
            next_id: 1,
            owner: None,
        }
    }

    fn create_instance() -> wgpu::Instance {
        wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        })
    }

    async fn request_device(
        instance: &wgpu::Instance,
        surface: &wgpu::Surface<'_>,
        options: GpuOptions,
    ) -> Result<DeviceState> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: options.power_preference,
                compatible_surface: Some(surface),
                force_fallback_adapter: false,
            })
            .await
            .surface_err("Failed to find suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("vidpane GPU Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                ..Default::default()
            })
            .await
            .surface_err("Failed to create GPU device")?;

        let lost = Arc::new(AtomicBool::new(false));
        let flag = lost.clone();
        device.set_device_lost_callback(move |reason, message| {
            warn!("GPU device lost ({:?}): {}", reason, message);
            flag.store(true, Ordering::SeqCst);
        });

        info!("GPU adapter: {:?}", adapter.get_info().name);

        Ok(DeviceState {
            adapter,
            device,
            queue,
            blit: None,
            lost,
        })
    }

    fn surface_config(
        &self,
        state: &DeviceState,
        surface: &wgpu::Surface<'_>,
        width: u32,
        height: u32,
    ) -> Result<wgpu::SurfaceConfiguration> {
        let caps = surface.get_capabilities(&state.adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first())
            .copied()
            .ok_or_else(|| PlayerError::SurfaceCreation("surface supports no formats".to_string()))?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        let present_mode = if self.options.vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };

        Ok(wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width,
            height,
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        })
    }

    fn check_device(&self) -> Result<&DeviceState> {
        let state = self
            .device
            .as_ref()
            .ok_or_else(|| PlayerError::DeviceLost("no GPU device".to_string()))?;
        if state.lost.load(Ordering::SeqCst) {
            return Err(PlayerError::DeviceLost("GPU device reported lost".to_string()));
        }
        Ok(state)
    }
}

impl GpuContext for WgpuContext {
    fn create_surface(&mut self, region: &SurfaceRegion) -> Result<SurfaceHandle> {
        let target = region
            .target
            .clone()
            .ok_or_else(|| PlayerError::SurfaceCreation("region has no window to bind".to_string()))?;
        let surface = self
            .instance
            .create_surface(target)
            .surface_err("Failed to create surface")?;

        if self.device.is_none() {
            let state = pollster::block_on(Self::request_device(&self.instance, &surface, self.options))?;
            self.device = Some(state);
        }
        let state = self
            .device
            .as_ref()
            .ok_or_else(|| PlayerError::SurfaceCreation("no GPU device".to_string()))?;

        let (width, height) = region.physical_size();
        let config = self.surface_config(state, &surface, width, height)?;
        surface.configure(&state.device, &config);

        let rebuild = state
            .blit
            .as_ref()
            .map_or(true, |blit| blit.target_format() != config.format);
        if rebuild {
            let blit = BlitPipeline::new(&state.device, config.format);
            if let Some(state) = self.device.as_mut() {
                state.blit = Some(blit);
            }
        }

        let handle = SurfaceHandle::from_raw(self.next_id);
        self.next_id += 1;
        debug!("Configured {:?} surface {}x{}", config.format, width, height);
        self.slot = Some(SurfaceSlot {
            handle,
            surface,
            config,
        });
        Ok(handle)
    }

    fn destroy_surface(&mut self, surface: SurfaceHandle) {
        if self.slot.as_ref().is_some_and(|slot| slot.handle == surface) {
            self.slot = None;
        }
    }

    fn reset(&mut self) -> Result<()> {
        // Surfaces hold instance state; drop them before the device
        self.slot = None;
        self.device = None;
        self.owner = None;
        self.instance = Self::create_instance();
        info!("GPU context reset");
        Ok(())
    }

    fn make_current(&mut self) -> Result<()> {
        self.check_device()?;
        let id = thread::current().id();
        if self.owner != Some(id) {
            debug!("GPU context now current on {:?}", thread::current().name());
            self.owner = Some(id);
        }
        Ok(())
    }

    fn resize(&mut self, surface: SurfaceHandle, width: u32, height: u32) -> Result<()> {
        let Some(state) = self.device.as_ref() else {
            return Ok(());
        };
        if let Some(slot) = self.slot.as_mut().filter(|slot| slot.handle == surface) {
            slot.config.width = width;
            slot.config.height = height;
            slot.surface.configure(&state.device, &slot.config);
        }
        Ok(())
    }

    fn present(&mut self, surface: SurfaceHandle, frame: &FrameTarget) -> Result<()> {
        if self.owner != Some(thread::current().id()) {
            return Err(PlayerError::DeviceLost(
                "present from a thread that does not own the context".to_string(),
            ));
        }
        self.check_device()?;
        let Some(state) = self.device.as_mut() else {
            return Err(PlayerError::DeviceLost("no GPU device".to_string()));
        };
        let slot = self
            .slot
            .as_ref()
            .filter(|slot| slot.handle == surface)
            .ok_or_else(|| PlayerError::DeviceLost(format!("unknown surface {}", surface.raw())))?;
        let blit = state
            .blit
            .as_mut()
            .ok_or_else(|| PlayerError::DeviceLost("blit pipeline missing".to_string()))?;

        let surface_texture = match slot.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Outdated) => {
                slot.surface.configure(&state.device, &slot.config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                debug!("Surface texture acquisition timed out; skipping frame");
                return Ok(());
            }
            Err(e) => {
                return Err(PlayerError::DeviceLost(format!("surface texture unavailable: {}", e)));
            }
        };

        blit.upload(&state.device, &state.queue, frame);
        blit.set_viewport(&state.queue, (slot.config.width, slot.config.height));

        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = state
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Blit Encoder"),
            });
        blit.draw(&mut encoder, &view);

        state.queue.submit(std::iter::once(encoder.finish()));
        surface_texture.present();
        Ok(())
    }
}
