use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::RenderError;

pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_name: String,
    lost: Arc<AtomicBool>,
}

impl GpuContext {
    pub fn new() -> Result<Self, RenderError> {
        pollster::block_on(Self::init_async())
    }

    async fn init_async() -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY | wgpu::Backends::GL,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::LowPower,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| RenderError::GpuInit("no suitable GPU adapter".into()))?;

        let info = adapter.get_info();
        log::info!("Using GPU: {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("barglow_device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_webgl2_defaults()
                        .using_resolution(adapter.limits()),
                    ..Default::default()
                },
                None,
            )
            .await
            .map_err(|e| RenderError::GpuInit(format!("failed to create GPU device: {e}")))?;

        // Errors outside an error scope would otherwise panic inside wgpu.
        device.on_uncaptured_error(Box::new(|err: wgpu::Error| {
            log::error!("Uncaptured GPU error: {}", err);
        }));

        let lost = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason: wgpu::DeviceLostReason, message: String| {
            log::error!("GPU device lost ({:?}): {}", reason, message);
            flag.store(true, Ordering::Release);
        });

        Ok(Self {
            device,
            queue,
            adapter_name: info.name,
            lost,
        })
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    /// Run `f` inside validation and out-of-memory error scopes and turn any
    /// captured error into `wrap(message)`.
    pub fn scoped<T>(
        &self,
        wrap: fn(String) -> RenderError,
        f: impl FnOnce(&Self) -> Result<T, RenderError>,
    ) -> Result<T, RenderError> {
        if self.is_lost() {
            return Err(wrap("GPU device lost".into()));
        }
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let result = f(self);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());

        if let Some(err) = validation.or(oom) {
            return Err(wrap(err.to_string()));
        }
        result
    }
}
