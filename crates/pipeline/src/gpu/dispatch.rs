use crate::compile::CompiledProgram;
use crate::error::ContextError;
use crate::image::Extent;
use crate::types::{GridPolicy, WORKGROUP_X, WORKGROUP_Y};

use super::binding::BoundState;
use super::context::GpuContext;

/// Number of work-groups along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchGrid {
    pub x: u32,
    pub y: u32,
}

impl DispatchGrid {
    pub fn for_extent(extent: Extent, policy: GridPolicy) -> Self {
        match policy {
            GridPolicy::Cover => Self {
                x: extent.width.div_ceil(WORKGROUP_X),
                y: extent.height.div_ceil(WORKGROUP_Y),
            },
            GridPolicy::Truncate => Self {
                x: extent.width / WORKGROUP_X,
                y: extent.height / WORKGROUP_Y,
            },
        }
    }

    /// Pixels reached by at least one invocation, clipped to the extent.
    pub fn covered(&self, extent: Extent) -> Extent {
        Extent::new(
            (self.x * WORKGROUP_X).min(extent.width),
            (self.y * WORKGROUP_Y).min(extent.height),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.x == 0 || self.y == 0
    }
}

/// Proof that a dispatch was submitted and the GPU finished it. Readback only
/// accepts this, so the output cannot be read before the kernel's writes land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchHandle {
    pub extent: Extent,
    pub grid: DispatchGrid,
}

pub struct DispatchEngine;

impl DispatchEngine {
    /// Records and submits the compute pass, then blocks until the submission
    /// completes. Everything the kernel stored is visible to later copies.
    pub fn dispatch(
        gpu: &GpuContext,
        program: &CompiledProgram,
        bound: &BoundState,
        policy: GridPolicy,
    ) -> Result<DispatchHandle, ContextError> {
        let extent = bound.extent();
        let grid = DispatchGrid::for_extent(extent, policy);
        if grid.covered(extent) != extent {
            tracing::warn!(
                %extent,
                covered = %grid.covered(extent),
                %policy,
                "dispatch grid does not cover the full image; trailing pixels stay zero"
            );
        }

        let device = &gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("kernel dispatch"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(program.variant().name()),
                timestamp_writes: None,
            });
            pass.set_pipeline(&program.pipeline);
            pass.set_bind_group(0, &bound.bind_group, &[]);
            if !grid.is_empty() {
                pass.dispatch_workgroups(grid.x, grid.y, 1);
            }
        }
        let submission = gpu.queue.submit(Some(encoder.finish()));
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(ContextError::Rejected {
                operation: "compute dispatch",
                message: err.to_string(),
            });
        }

        Self::barrier(gpu, submission)?;
        tracing::debug!(
            variant = %program.variant(),
            %extent,
            groups_x = grid.x,
            groups_y = grid.y,
            "dispatch complete"
        );
        Ok(DispatchHandle { extent, grid })
    }

    /// Full barrier: waits until the GPU retired `submission`.
    fn barrier(gpu: &GpuContext, submission: wgpu::SubmissionIndex) -> Result<(), ContextError> {
        gpu.device
            .poll(wgpu::PollType::WaitForSubmissionIndex(submission))?;
        Ok(())
    }
}
