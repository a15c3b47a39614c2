use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::compile::CompiledProgram;
use crate::error::{BindingError, Result};
use crate::image::{Extent, Image};
use crate::variant::VariantDescriptor;

use super::context::GpuContext;

/// Storage format of every input and output texture.
pub(crate) const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

/// GPU resources bound for one run: uploaded inputs, the output texture and
/// the bind group tying them to the kernel's named bindings.
///
/// Textures are destroyed when the state is dropped, so releasing a run is
/// just dropping it.
pub struct BoundState {
    inputs: Vec<InputTexture>,
    output: wgpu::Texture,
    pub(crate) bind_group: wgpu::BindGroup,
    extent: Extent,
}

struct InputTexture {
    name: &'static str,
    texture: wgpu::Texture,
}

impl BoundState {
    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub(crate) fn output(&self) -> &wgpu::Texture {
        &self.output
    }

    /// Binding names in the order their textures were bound.
    pub fn input_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.inputs.iter().map(|input| input.name)
    }
}

impl Drop for BoundState {
    fn drop(&mut self) {
        for input in &self.inputs {
            input.texture.destroy();
        }
        self.output.destroy();
    }
}

impl std::fmt::Debug for BoundState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundState")
            .field("inputs", &self.input_names().collect::<Vec<_>>())
            .field("extent", &self.extent)
            .finish_non_exhaustive()
    }
}

pub struct BindingTable;

impl BindingTable {
    /// Host-side checks that must pass before anything is allocated.
    pub fn validate(
        descriptor: &VariantDescriptor,
        images: &[Image],
        max_dimension: u32,
    ) -> Result<Extent, BindingError> {
        if images.len() != descriptor.input_count() {
            return Err(BindingError::ArityMismatch {
                variant: descriptor.variant,
                expected: descriptor.input_count(),
                actual: images.len(),
            });
        }

        let extent = images[0].extent();
        if let Some((index, image)) = images
            .iter()
            .enumerate()
            .find(|(_, image)| image.extent() != extent)
        {
            return Err(BindingError::ResolutionMismatch {
                index,
                expected: extent,
                actual: image.extent(),
            });
        }

        if extent.width > max_dimension || extent.height > max_dimension {
            return Err(BindingError::ExtentTooLarge {
                extent,
                limit: max_dimension,
            });
        }
        Ok(extent)
    }

    /// Uploads the images and binds each one to the input the variant names
    /// for its slot, plus a zero-initialised output storage texture.
    pub fn configure(
        gpu: &GpuContext,
        descriptor: &VariantDescriptor,
        program: &CompiledProgram,
        images: &[Image],
    ) -> Result<BoundState> {
        let extent = Self::validate(descriptor, images, gpu.max_texture_dimension())?;
        let filterable = gpu.float32_filterable();

        let (inputs, output, bind_group) = gpu.validation_scope("input binding", |device| {
            let inputs: Vec<InputTexture> = descriptor
                .inputs
                .iter()
                .map(|input| InputTexture {
                    name: input.name,
                    texture: device.create_texture_with_data(
                        &gpu.queue,
                        &wgpu::TextureDescriptor {
                            label: Some(input.name),
                            size: extent.to_wgpu(),
                            mip_level_count: 1,
                            sample_count: 1,
                            dimension: wgpu::TextureDimension::D2,
                            format: TEXTURE_FORMAT,
                            usage: wgpu::TextureUsages::TEXTURE_BINDING
                                | wgpu::TextureUsages::COPY_DST,
                            view_formats: &[],
                        },
                        TextureDataOrder::LayerMajor,
                        bytemuck::cast_slice(images[input.slot].pixels()),
                    ),
                })
                .collect();

            let output = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(descriptor.output.name),
                size: extent.to_wgpu(),
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: TEXTURE_FORMAT,
                usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            });

            let filter = if filterable {
                wgpu::FilterMode::Linear
            } else {
                wgpu::FilterMode::Nearest
            };
            let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("kernel input sampler"),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                address_mode_w: wgpu::AddressMode::ClampToEdge,
                mag_filter: filter,
                min_filter: filter,
                mipmap_filter: wgpu::FilterMode::Nearest,
                ..Default::default()
            });

            let input_views: Vec<wgpu::TextureView> = inputs
                .iter()
                .map(|input| {
                    input
                        .texture
                        .create_view(&wgpu::TextureViewDescriptor::default())
                })
                .collect();
            let output_view = output.create_view(&wgpu::TextureViewDescriptor::default());

            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("kernel bind group"),
                layout: &program.bind_group_layout,
                entries: &build_entries(descriptor, &input_views, &sampler, &output_view),
            });
            (inputs, output, bind_group)
        })?;

        tracing::debug!(
            variant = %descriptor.variant,
            %extent,
            inputs = inputs.len(),
            "bound kernel inputs"
        );

        Ok(BoundState {
            inputs,
            output,
            bind_group,
            extent,
        })
    }
}

fn build_entries<'a>(
    descriptor: &VariantDescriptor,
    input_views: &'a [wgpu::TextureView],
    sampler: &'a wgpu::Sampler,
    output_view: &'a wgpu::TextureView,
) -> Vec<wgpu::BindGroupEntry<'a>> {
    let mut entries = Vec::with_capacity(input_views.len() * 2 + 1);
    for (position, view) in input_views.iter().enumerate() {
        entries.push(wgpu::BindGroupEntry {
            binding: VariantDescriptor::texture_binding(position),
            resource: wgpu::BindingResource::TextureView(view),
        });
        entries.push(wgpu::BindGroupEntry {
            binding: VariantDescriptor::sampler_binding(position),
            resource: wgpu::BindingResource::Sampler(sampler),
        });
    }
    entries.push(wgpu::BindGroupEntry {
        binding: descriptor.output_binding(),
        resource: wgpu::BindingResource::TextureView(output_view),
    });
    entries
}

/// Layout matching the prelude generated for `descriptor`: a sampled texture
/// and sampler per input, then one write-only storage image.
pub(crate) fn layout_entries(
    descriptor: &VariantDescriptor,
    filterable: bool,
) -> Vec<wgpu::BindGroupLayoutEntry> {
    let sampler_type = if filterable {
        wgpu::SamplerBindingType::Filtering
    } else {
        wgpu::SamplerBindingType::NonFiltering
    };
    let mut entries = Vec::with_capacity(descriptor.input_count() * 2 + 1);
    for position in 0..descriptor.input_count() {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: VariantDescriptor::texture_binding(position),
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: VariantDescriptor::sampler_binding(position),
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Sampler(sampler_type),
            count: None,
        });
    }
    entries.push(wgpu::BindGroupLayoutEntry {
        binding: descriptor.output_binding(),
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format: TEXTURE_FORMAT,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    });
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::KernelVariant;

    fn images(count: usize, width: u32, height: u32) -> Vec<Image> {
        (0..count)
            .map(|_| Image::filled(width, height, 1.0).unwrap())
            .collect()
    }

    #[test]
    fn arity_mismatch_is_rejected() {
        let descriptor = KernelVariant::BrdfDemodulate.descriptor();
        let err = BindingTable::validate(descriptor, &images(4, 8, 8), 8192).unwrap_err();
        assert_eq!(
            err,
            BindingError::ArityMismatch {
                variant: KernelVariant::BrdfDemodulate,
                expected: 5,
                actual: 4,
            }
        );
    }

    #[test]
    fn resolution_mismatch_reports_first_offender() {
        let descriptor = KernelVariant::Demodulate.descriptor();
        let mut inputs = images(1, 8, 8);
        inputs.push(Image::filled(8, 9, 1.0).unwrap());
        let err = BindingTable::validate(descriptor, &inputs, 8192).unwrap_err();
        assert_eq!(
            err,
            BindingError::ResolutionMismatch {
                index: 1,
                expected: Extent::new(8, 8),
                actual: Extent::new(8, 9),
            }
        );
    }

    #[test]
    fn oversized_extent_is_rejected() {
        let descriptor = KernelVariant::Identity.descriptor();
        let err = BindingTable::validate(descriptor, &images(1, 16, 4), 8).unwrap_err();
        assert!(matches!(err, BindingError::ExtentTooLarge { limit: 8, .. }));
    }

    #[test]
    fn matching_inputs_yield_common_extent() {
        let descriptor = KernelVariant::Demodulate.descriptor();
        let extent = BindingTable::validate(descriptor, &images(2, 9, 7), 8192).unwrap();
        assert_eq!(extent, Extent::new(9, 7));
    }

    #[test]
    fn layout_mirrors_prelude_bindings() {
        let descriptor = KernelVariant::Demodulate.descriptor();
        let entries = layout_entries(descriptor, false);
        assert_eq!(entries.len(), 5);
        assert!(matches!(
            entries[1].ty,
            wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering)
        ));
        assert!(matches!(
            entries[4].ty,
            wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::WriteOnly,
                ..
            }
        ));
        assert_eq!(entries[4].binding, 4);
    }
}
