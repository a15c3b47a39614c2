use std::fmt;
use std::path::Path;

use crate::codec::ImageCodec;
use crate::compile::{CompiledProgram, KernelProgram};
use crate::error::{BindingError, ContextError, ProcessOrderError, Result, SaveError};
use crate::gpu::{BindingTable, BoundState, DispatchEngine, GpuContext, ReadbackBuffer};
use crate::image::{Extent, Image, ImageStore};
use crate::types::{GpuOptions, PipelineOptions};
use crate::variant::KernelVariant;

/// Operations a caller can request from the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Load,
    Configure,
    Execute,
    Export,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Load => "load",
            Operation::Configure => "configure",
            Operation::Execute => "execute",
            Operation::Export => "export",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Empty,
    Loaded,
    Configured,
    Executed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Empty => "empty",
            PipelineState::Loaded => "loaded",
            PipelineState::Configured => "configured",
            PipelineState::Executed => "executed",
        };
        f.write_str(name)
    }
}

/// The single live run: created at configure, filled in at execute.
struct DispatchRun {
    program: CompiledProgram,
    bound: BoundState,
    result: Option<Image>,
}

/// Drives `load -> configure -> execute -> export` for one run at a time.
///
/// The GPU context is created on the first `configure` and then reused by
/// every later run; `clear` releases the run's textures and host images but
/// keeps the device alive.
pub struct PipelineController<C> {
    gpu: Option<GpuContext>,
    gpu_options: GpuOptions,
    codec: C,
    options: PipelineOptions,
    store: ImageStore,
    run: Option<DispatchRun>,
}

impl<C: ImageCodec> PipelineController<C> {
    /// Builds a controller whose GPU context is created on first use.
    pub fn new(codec: C, options: PipelineOptions, gpu_options: GpuOptions) -> Self {
        Self {
            gpu: None,
            gpu_options,
            codec,
            options,
            store: ImageStore::new(),
            run: None,
        }
    }

    /// Builds a controller around an existing context.
    pub fn with_context(gpu: GpuContext, codec: C, options: PipelineOptions) -> Self {
        Self {
            gpu: Some(gpu),
            gpu_options: GpuOptions::default(),
            codec,
            options,
            store: ImageStore::new(),
            run: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        match &self.run {
            Some(run) if run.result.is_some() => PipelineState::Executed,
            Some(_) => PipelineState::Configured,
            None if self.store.is_empty() => PipelineState::Empty,
            None => PipelineState::Loaded,
        }
    }

    pub fn options(&self) -> PipelineOptions {
        self.options
    }

    pub fn set_options(&mut self, options: PipelineOptions) {
        self.options = options;
    }

    /// Context, if one has been created yet.
    pub fn context(&self) -> Option<&GpuContext> {
        self.gpu.as_ref()
    }

    /// Decodes `paths` in order as the inputs of the next run.
    pub fn load<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<Extent> {
        self.require(Operation::Load, PipelineState::Empty)?;
        self.store.load(&self.codec, paths)?;
        self.loaded_extent()
    }

    /// Same as [`load`](Self::load) for images already in memory.
    pub fn load_images(&mut self, images: Vec<Image>) -> Result<Extent> {
        self.require(Operation::Load, PipelineState::Empty)?;
        self.store.insert(images)?;
        self.loaded_extent()
    }

    fn loaded_extent(&self) -> Result<Extent> {
        let extent = self.store.extent().unwrap_or(Extent::new(0, 0));
        tracing::info!(images = self.store.len(), %extent, "loaded inputs");
        Ok(extent)
    }

    /// Compiles `variant` and binds the loaded images to its inputs. On
    /// failure nothing is kept and the controller stays loaded.
    pub fn configure(&mut self, variant: KernelVariant) -> Result<()> {
        self.require(Operation::Configure, PipelineState::Loaded)?;
        let descriptor = variant.descriptor();
        // Arity and resolution do not need a device.
        BindingTable::validate(descriptor, self.store.images(), u32::MAX)?;

        let compiler = self.options.shader_compiler;
        let gpu = ensure_context(&mut self.gpu, &self.gpu_options)?;
        let program = KernelProgram::compile(gpu, descriptor, compiler)?;
        let bound = BindingTable::configure(gpu, descriptor, &program, self.store.images())?;
        tracing::info!(%variant, extent = %bound.extent(), %compiler, "configured kernel");

        self.run = Some(DispatchRun {
            program,
            bound,
            result: None,
        });
        Ok(())
    }

    /// Dispatches the configured kernel and reads the output back to the
    /// host. `variant` must be the one passed to `configure`.
    pub fn execute(&mut self, variant: KernelVariant) -> Result<&Image> {
        self.require(Operation::Execute, PipelineState::Configured)?;
        let grid = self.options.grid;
        let state = self.state();
        let (Some(gpu), Some(run)) = (self.gpu.as_ref(), self.run.as_mut()) else {
            return Err(ProcessOrderError {
                operation: Operation::Execute,
                state,
            }
            .into());
        };
        let configured = run.program.variant();
        if configured != variant {
            return Err(BindingError::VariantMismatch {
                configured,
                requested: variant,
            }
            .into());
        }

        let handle = DispatchEngine::dispatch(gpu, &run.program, &run.bound, grid)?;
        let pixels = ReadbackBuffer::copy_out(gpu, &run.bound, &handle)?;
        let extent = handle.extent;
        let image = Image::new(extent.width, extent.height, pixels).map_err(|message| {
            ContextError::Rejected {
                operation: "readback",
                message,
            }
        })?;
        tracing::info!(
            %variant,
            %extent,
            groups_x = handle.grid.x,
            groups_y = handle.grid.y,
            "executed kernel"
        );
        Ok(&*run.result.insert(image))
    }

    /// Writes the result of the last execute. May be repeated.
    pub fn export(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let image = self
            .result()
            .ok_or_else(|| self.order_error(Operation::Export))?;
        self.codec.encode(path, image).map_err(|err| SaveError {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        tracing::info!(path = %path.display(), extent = %image.extent(), "exported result");
        Ok(())
    }

    /// Host copy of the output, once executed.
    pub fn result(&self) -> Option<&Image> {
        self.run.as_ref().and_then(|run| run.result.as_ref())
    }

    /// Releases the run and the loaded images. Valid from any state.
    pub fn clear(&mut self) {
        if let Some(run) = self.run.take() {
            tracing::debug!(variant = %run.program.variant(), "released dispatch run");
        }
        self.store.clear();
    }

    fn require(&self, operation: Operation, expected: PipelineState) -> Result<(), ProcessOrderError> {
        if self.state() == expected {
            Ok(())
        } else {
            Err(self.order_error(operation))
        }
    }

    fn order_error(&self, operation: Operation) -> ProcessOrderError {
        ProcessOrderError {
            operation,
            state: self.state(),
        }
    }
}

fn ensure_context<'a>(
    slot: &'a mut Option<GpuContext>,
    options: &GpuOptions,
) -> Result<&'a GpuContext, ContextError> {
    let gpu = match slot.take() {
        Some(gpu) => gpu,
        None => {
            let gpu = GpuContext::new(options)?;
            let profile = gpu.adapter_profile();
            tracing::info!(
                adapter = %profile.name,
                backend = ?profile.backend,
                float32_filterable = gpu.float32_filterable(),
                "GPU context ready"
            );
            gpu
        }
    };
    Ok(slot.insert(gpu))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    struct NullCodec;

    impl ImageCodec for NullCodec {
        fn decode(&self, path: &Path) -> Result<Image, crate::codec::DecodeError> {
            Err(crate::codec::DecodeError::new(format!(
                "{} is not in memory",
                path.display()
            )))
        }

        fn encode(&self, _path: &Path, _image: &Image) -> Result<(), crate::codec::EncodeError> {
            Ok(())
        }
    }

    fn controller() -> PipelineController<NullCodec> {
        PipelineController::new(NullCodec, PipelineOptions::default(), GpuOptions::default())
    }

    fn order_error(err: PipelineError) -> ProcessOrderError {
        match err {
            PipelineError::ProcessOrder(err) => err,
            other => panic!("expected an order error, got {other}"),
        }
    }

    #[test]
    fn starts_empty_without_a_device() {
        let controller = controller();
        assert_eq!(controller.state(), PipelineState::Empty);
        assert!(controller.context().is_none());
        assert!(controller.result().is_none());
    }

    #[test]
    fn execute_before_configure_is_rejected_without_gpu() {
        let mut controller = controller();
        let err = order_error(controller.execute(KernelVariant::Identity).unwrap_err());
        assert_eq!(
            err,
            ProcessOrderError {
                operation: Operation::Execute,
                state: PipelineState::Empty,
            }
        );

        controller
            .load_images(vec![Image::filled(4, 4, 0.5).unwrap()])
            .unwrap();
        let err = order_error(controller.execute(KernelVariant::Identity).unwrap_err());
        assert_eq!(err.state, PipelineState::Loaded);
        assert!(controller.context().is_none());
    }

    #[test]
    fn export_requires_executed_state() {
        let controller = controller();
        let err = order_error(controller.export("out.exr").unwrap_err());
        assert_eq!(err.operation, Operation::Export);
        assert_eq!(err.to_string(), "cannot export while the pipeline is empty");
    }

    #[test]
    fn load_is_only_valid_when_empty() {
        let mut controller = controller();
        controller
            .load_images(vec![Image::filled(2, 2, 1.0).unwrap()])
            .unwrap();
        assert_eq!(controller.state(), PipelineState::Loaded);
        let err = order_error(
            controller
                .load_images(vec![Image::filled(2, 2, 1.0).unwrap()])
                .unwrap_err(),
        );
        assert_eq!(err.operation, Operation::Load);
        assert_eq!(err.state, PipelineState::Loaded);
    }

    #[test]
    fn configure_before_load_is_rejected() {
        let mut controller = controller();
        let err = order_error(controller.configure(KernelVariant::Demodulate).unwrap_err());
        assert_eq!(err.operation, Operation::Configure);
        assert_eq!(err.state, PipelineState::Empty);
    }

    #[test]
    fn arity_mismatch_leaves_controller_loaded() {
        let mut controller = controller();
        controller
            .load_images(vec![Image::filled(8, 8, 1.0).unwrap(); 4])
            .unwrap();
        let err = controller.configure(KernelVariant::BrdfDemodulate).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Binding(BindingError::ArityMismatch {
                expected: 5,
                actual: 4,
                ..
            })
        ));
        assert_eq!(controller.state(), PipelineState::Loaded);
        assert!(controller.context().is_none());
    }

    #[test]
    fn resolution_mismatch_is_reported_before_compilation() {
        let mut controller = controller();
        controller
            .load_images(vec![
                Image::filled(8, 8, 1.0).unwrap(),
                Image::filled(9, 8, 1.0).unwrap(),
            ])
            .unwrap();
        let err = controller.configure(KernelVariant::Demodulate).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Binding(BindingError::ResolutionMismatch { index: 1, .. })
        ));
    }

    #[test]
    fn failed_load_keeps_controller_empty() {
        let mut controller = controller();
        let err = controller.load(&["missing.exr"]).unwrap_err();
        assert!(matches!(err, PipelineError::Load(ref load) if load.index == 0));
        assert_eq!(controller.state(), PipelineState::Empty);
    }

    #[test]
    fn clear_is_valid_from_any_state() {
        let mut controller = controller();
        controller.clear();
        assert_eq!(controller.state(), PipelineState::Empty);
        controller
            .load_images(vec![Image::filled(1, 1, 0.0).unwrap()])
            .unwrap();
        controller.clear();
        assert_eq!(controller.state(), PipelineState::Empty);
        controller
            .load_images(vec![Image::filled(3, 3, 0.0).unwrap()])
            .unwrap();
        assert_eq!(controller.state(), PipelineState::Loaded);
    }
}
