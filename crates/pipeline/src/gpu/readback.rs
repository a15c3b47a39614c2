use crate::error::ContextError;
use crate::types::CHANNELS;

use super::binding::BoundState;
use super::context::GpuContext;
use super::dispatch::DispatchHandle;

const BYTES_PER_PIXEL: u32 = (CHANNELS * std::mem::size_of::<f32>()) as u32;

/// Align a row to `wgpu::COPY_BYTES_PER_ROW_ALIGNMENT` (256 bytes).
pub(crate) fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * BYTES_PER_PIXEL;
    unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT
}

pub struct ReadbackBuffer;

impl ReadbackBuffer {
    /// Copies the whole output texture into a freshly allocated RGBA buffer of
    /// `4 * width * height` floats. The staging buffer is released before
    /// returning; the caller owns the result.
    pub fn copy_out(
        gpu: &GpuContext,
        bound: &BoundState,
        handle: &DispatchHandle,
    ) -> Result<Vec<f32>, ContextError> {
        let extent = handle.extent;
        let padded_bpr = padded_bytes_per_row(extent.width);
        let tight_bpr = (extent.width * BYTES_PER_PIXEL) as usize;
        let size = padded_bpr as wgpu::BufferAddress * extent.height as wgpu::BufferAddress;

        let staging = gpu.validation_scope("readback copy", |device| {
            let staging = StagingBuffer(device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("readback staging"),
                size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback"),
            });
            encoder.copy_texture_to_buffer(
                wgpu::TexelCopyTextureInfo {
                    texture: bound.output(),
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::TexelCopyBufferInfo {
                    buffer: &staging.0,
                    layout: wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(padded_bpr),
                        rows_per_image: Some(extent.height),
                    },
                },
                extent.to_wgpu(),
            );
            gpu.queue.submit(Some(encoder.finish()));
            staging
        })?;

        let slice = staging.0.slice(..);
        let (sender, receiver) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        gpu.device.poll(wgpu::PollType::Wait)?;
        receiver
            .recv()
            .map_err(|_| ContextError::MapCallbackDropped)??;

        let mut pixels = Vec::with_capacity(extent.float_count());
        {
            let mapped = slice.get_mapped_range();
            for row in mapped.chunks_exact(padded_bpr as usize) {
                pixels.extend_from_slice(bytemuck::cast_slice::<u8, f32>(&row[..tight_bpr]));
            }
        }
        staging.0.unmap();

        tracing::debug!(%extent, floats = pixels.len(), "read back kernel output");
        Ok(pixels)
    }
}

/// Destroys the staging buffer on every exit path.
struct StagingBuffer(wgpu::Buffer);

impl Drop for StagingBuffer {
    fn drop(&mut self) {
        self.0.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded_to_copy_alignment() {
        assert_eq!(padded_bytes_per_row(1), 256);
        assert_eq!(padded_bytes_per_row(16), 256);
        assert_eq!(padded_bytes_per_row(17), 512);
        assert_eq!(padded_bytes_per_row(64), 1024);
    }
}
