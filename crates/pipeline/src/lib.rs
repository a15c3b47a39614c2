//! GPU compute pipeline for per-pixel image demodulation.
//!
//! A run moves through a small state machine owned by
//! [`PipelineController`]:
//!
//! ```text
//!   load(paths) ──▶ configure(variant) ──▶ execute(variant) ──▶ export(path)
//!       │                 │                       │
//!   ImageStore      KernelProgram +          DispatchEngine ─▶ barrier
//!                   BindingTable                  │
//!                                           ReadbackBuffer ─▶ host Image
//! ```
//!
//! Kernel bodies are GLSL compute functions (`void demod_main(ivec2 pixel)`)
//! embedded at build time. Before compilation each body is wrapped with a
//! generated prelude that declares every input under the binding name the
//! variant registry gives it, so the host never binds by position. Misordered
//! calls return [`ProcessOrderError`] without touching the device, and every
//! GPU resource of a run is released when the run is cleared or dropped.

pub mod codec;
pub mod compile;
pub mod controller;
pub mod error;
pub mod gpu;
pub mod image;
pub mod types;
pub mod variant;

pub use codec::{DecodeError, EncodeError, ExrCodec, ImageCodec};
pub use compile::{CompiledProgram, KernelProgram};
pub use controller::{Operation, PipelineController, PipelineState};
pub use error::{
    BindingError, CompileError, CompileStage, ContextError, LoadError, PipelineError,
    ProcessOrderError, Result, SaveError,
};
pub use gpu::{
    BindingTable, BoundState, DispatchEngine, DispatchGrid, DispatchHandle, GpuContext,
    ReadbackBuffer,
};
pub use crate::image::{Extent, Image, ImageStore};
pub use types::{
    AdapterProfile, GpuOptions, GpuPowerPreference, GridPolicy, PipelineOptions, ShaderCompiler,
    CHANNELS, WORKGROUP_X, WORKGROUP_Y,
};
pub use variant::{InputBinding, KernelVariant, OutputBinding, VariantDescriptor};
