use crate::error::ContextError;
use crate::types::{AdapterProfile, GpuOptions, GpuPowerPreference};

/// Headless `wgpu` instance/device pair shared by every run of a controller.
pub struct GpuContext {
    pub(crate) _instance: wgpu::Instance,
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    adapter_profile: AdapterProfile,
    float32_filterable: bool,
}

impl GpuContext {
    pub fn new(options: &GpuOptions) -> Result<Self, ContextError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });

        let power_preference = match options.power {
            GpuPowerPreference::Low => wgpu::PowerPreference::LowPower,
            GpuPowerPreference::High => wgpu::PowerPreference::HighPerformance,
        };
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference,
            compatible_surface: None,
            force_fallback_adapter: options.force_fallback_adapter,
        }))?;

        let adapter_info = adapter.get_info();
        let limits = adapter.limits();
        let adapter_profile = AdapterProfile::from_wgpu(&adapter_info, &limits);
        tracing::debug!(
            name = %adapter_profile.name,
            backend = ?adapter_profile.backend,
            device_type = ?adapter_profile.device_type,
            driver = %adapter_profile.driver,
            is_software = adapter_profile.is_software(),
            "selected GPU adapter"
        );

        // RGBA32F is only filterable behind an optional feature; without it the
        // bindings fall back to nearest sampling.
        let float32_filterable = adapter
            .features()
            .contains(wgpu::Features::FLOAT32_FILTERABLE);
        let mut required_features = wgpu::Features::empty();
        if float32_filterable {
            required_features |= wgpu::Features::FLOAT32_FILTERABLE;
        } else {
            tracing::debug!("adapter lacks FLOAT32_FILTERABLE; inputs use nearest sampling");
        }

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("demod device"),
            required_features,
            required_limits: limits,
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))?;

        device.set_device_lost_callback(|reason, message| {
            tracing::error!(?reason, %message, "GPU device lost");
        });
        // Errors raised outside a validation scope are logged, not panicked on.
        device.on_uncaptured_error(Box::new(|err| {
            tracing::error!(error = %err, "uncaptured GPU error");
        }));

        Ok(Self {
            _instance: instance,
            device,
            queue,
            adapter_profile,
            float32_filterable,
        })
    }

    pub fn adapter_profile(&self) -> &AdapterProfile {
        &self.adapter_profile
    }

    pub fn float32_filterable(&self) -> bool {
        self.float32_filterable
    }

    pub fn max_texture_dimension(&self) -> u32 {
        self.adapter_profile.max_texture_dimension_2d
    }

    /// Runs `record` inside a validation error scope. A validation failure
    /// becomes [`ContextError::Rejected`] instead of reaching the device's
    /// uncaptured error handler.
    pub(crate) fn validation_scope<T>(
        &self,
        operation: &'static str,
        record: impl FnOnce(&wgpu::Device) -> T,
    ) -> Result<T, ContextError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = record(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(ContextError::Rejected {
                operation,
                message: err.to_string(),
            }),
            None => Ok(value),
        }
    }
}
