//! Typed failures for every pipeline operation.
//!
//! Each stage reports its own error type so callers can branch on the kind of
//! failure; [`PipelineError`] unifies them for code that only needs to report.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::controller::{Operation, PipelineState};
use crate::image::Extent;
use crate::variant::KernelVariant;

/// Decoding an input failed; the whole load was discarded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("failed to load input #{index} ({identifier}): {message}")]
pub struct LoadError {
    /// Position of the failing input in the requested order.
    pub index: usize,
    /// Path or label of the failing input.
    pub identifier: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileStage {
    /// Front-end parsing, validation or shader module creation.
    Shader,
    /// Compute pipeline creation and entry point checks.
    Link,
}

impl fmt::Display for CompileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileStage::Shader => f.write_str("shader"),
            CompileStage::Link => f.write_str("link"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("kernel '{variant}' failed at the {stage} stage:\n{log}")]
pub struct CompileError {
    pub variant: KernelVariant,
    pub stage: CompileStage,
    pub log: String,
}

impl CompileError {
    pub(crate) fn shader(variant: KernelVariant, log: impl Into<String>) -> Self {
        Self {
            variant,
            stage: CompileStage::Shader,
            log: log.into(),
        }
    }

    pub(crate) fn link(variant: KernelVariant, log: impl Into<String>) -> Self {
        Self {
            variant,
            stage: CompileStage::Link,
            log: log.into(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BindingError {
    #[error("kernel '{variant}' expects {expected} input images, got {actual}")]
    ArityMismatch {
        variant: KernelVariant,
        expected: usize,
        actual: usize,
    },
    #[error("input #{index} is {actual} but input #0 is {expected}; all inputs must share one resolution")]
    ResolutionMismatch {
        index: usize,
        expected: Extent,
        actual: Extent,
    },
    #[error("image extent {extent} exceeds the device texture limit of {limit} pixels per side")]
    ExtentTooLarge { extent: Extent, limit: u32 },
    #[error("pipeline is configured for '{configured}' but execute was asked for '{requested}'")]
    VariantMismatch {
        configured: KernelVariant,
        requested: KernelVariant,
    },
}

/// An operation was requested from a state that does not allow it.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("cannot {operation} while the pipeline is {state}")]
pub struct ProcessOrderError {
    pub operation: Operation,
    pub state: PipelineState,
}

/// The GPU context could not be created or stopped working. Never recoverable.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("failed to find a suitable GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    #[error("failed to create GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("GPU device stopped responding: {0}")]
    Poll(#[from] wgpu::PollError),
    #[error("failed to map readback buffer: {0}")]
    Map(#[from] wgpu::BufferAsyncError),
    #[error("readback callback was dropped before completion")]
    MapCallbackDropped,
    #[error("GPU rejected {operation}: {message}")]
    Rejected {
        operation: &'static str,
        message: String,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("failed to save result to {}: {message}", path.display())]
pub struct SaveError {
    pub path: PathBuf,
    pub message: String,
}

/// Any failure the pipeline can report.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Binding(#[from] BindingError),
    #[error(transparent)]
    ProcessOrder(#[from] ProcessOrderError),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Save(#[from] SaveError),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
