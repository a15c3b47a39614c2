use std::borrow::Cow;
use std::fmt::Write as _;

use wgpu::naga::ShaderStage;

use crate::error::CompileError;
use crate::gpu::binding::layout_entries;
use crate::gpu::GpuContext;
use crate::types::{ShaderCompiler, WORKGROUP_X, WORKGROUP_Y};
use crate::variant::{KernelVariant, VariantDescriptor};

/// A compiled compute pipeline together with the bind group layout its
/// prelude was generated for. Immutable once built.
pub struct CompiledProgram {
    variant: KernelVariant,
    pub(crate) pipeline: wgpu::ComputePipeline,
    pub(crate) bind_group_layout: wgpu::BindGroupLayout,
}

impl CompiledProgram {
    pub fn variant(&self) -> KernelVariant {
        self.variant
    }
}

impl std::fmt::Debug for CompiledProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledProgram")
            .field("variant", &self.variant)
            .finish_non_exhaustive()
    }
}

pub struct KernelProgram;

impl KernelProgram {
    /// Wraps the variant's body, checks it on the host and builds the compute
    /// pipeline. Nothing allocated here outlives a failed compile.
    pub fn compile(
        gpu: &GpuContext,
        descriptor: &VariantDescriptor,
        compiler: ShaderCompiler,
    ) -> Result<CompiledProgram, CompileError> {
        let variant = descriptor.variant;
        let wrapped = wrap_kernel(descriptor);

        let (module, source) = match compiler {
            ShaderCompiler::NagaGlsl => {
                let module = parse_glsl(variant, &wrapped)?;
                let source = wgpu::ShaderSource::Glsl {
                    shader: Cow::Borrowed(wrapped.as_str()),
                    stage: ShaderStage::Compute,
                    defines: &[],
                };
                (module, source)
            }
            ShaderCompiler::Shaderc => {
                let words = compile_shaderc(variant, &wrapped)?;
                let module = parse_spirv(variant, &words)?;
                (module, wgpu::ShaderSource::SpirV(Cow::Owned(words)))
            }
        };
        check_workgroup_size(variant, &module)?;

        let device = &gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(variant.name()),
            source,
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(CompileError::shader(variant, err.to_string()));
        }

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kernel bindings"),
            entries: &layout_entries(descriptor, gpu.float32_filterable()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("kernel pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(variant.name()),
            layout: Some(&pipeline_layout),
            module: &shader_module,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(CompileError::link(variant, err.to_string()));
        }

        tracing::debug!(%variant, %compiler, "compiled kernel");
        Ok(CompiledProgram {
            variant,
            pipeline,
            bind_group_layout,
        })
    }
}

fn parse_glsl(variant: KernelVariant, wrapped: &str) -> Result<wgpu::naga::Module, CompileError> {
    use wgpu::naga::front::glsl::{Frontend, Options};

    let mut frontend = Frontend::default();
    let module = frontend
        .parse(&Options::from(ShaderStage::Compute), wrapped)
        .map_err(|errors| CompileError::shader(variant, errors.emit_to_string(wrapped)))?;
    validate(variant, &module, wrapped)?;
    Ok(module)
}

fn parse_spirv(variant: KernelVariant, words: &[u32]) -> Result<wgpu::naga::Module, CompileError> {
    use wgpu::naga::front::spv;

    let module = spv::parse_u8_slice(bytemuck::cast_slice(words), &spv::Options::default())
        .map_err(|err| CompileError::shader(variant, err.to_string()))?;
    validate(variant, &module, "")?;
    Ok(module)
}

fn validate(
    variant: KernelVariant,
    module: &wgpu::naga::Module,
    source: &str,
) -> Result<(), CompileError> {
    use wgpu::naga::valid::{Capabilities, ValidationFlags, Validator};

    Validator::new(ValidationFlags::all(), Capabilities::default())
        .validate(module)
        .map(|_| ())
        .map_err(|err| CompileError::shader(variant, err.emit_to_string(source)))
}

#[cfg(feature = "shaderc")]
fn compile_shaderc(variant: KernelVariant, wrapped: &str) -> Result<Vec<u32>, CompileError> {
    let compiler = shaderc::Compiler::new()
        .map_err(|err| CompileError::shader(variant, format!("shaderc unavailable: {err}")))?;
    let artifact = compiler
        .compile_into_spirv(
            wrapped,
            shaderc::ShaderKind::Compute,
            variant.name(),
            "main",
            None,
        )
        .map_err(|err| CompileError::shader(variant, err.to_string()))?;
    if artifact.get_num_warnings() > 0 {
        tracing::warn!(%variant, warnings = %artifact.get_warning_messages(), "shaderc warnings");
    }
    Ok(artifact.as_binary().to_vec())
}

#[cfg(not(feature = "shaderc"))]
fn compile_shaderc(variant: KernelVariant, _wrapped: &str) -> Result<Vec<u32>, CompileError> {
    Err(CompileError::shader(
        variant,
        "shaderc support is not enabled in this build",
    ))
}

/// The host dispatch grid assumes `WORKGROUP_X x WORKGROUP_Y x 1`; a kernel
/// compiled with any other size would silently skip or double-cover pixels.
fn check_workgroup_size(
    variant: KernelVariant,
    module: &wgpu::naga::Module,
) -> Result<(), CompileError> {
    let entry = module
        .entry_points
        .iter()
        .find(|entry| entry.stage == ShaderStage::Compute && entry.name == "main")
        .ok_or_else(|| CompileError::link(variant, "no compute entry point named 'main'"))?;
    let expected = [WORKGROUP_X, WORKGROUP_Y, 1];
    if entry.workgroup_size != expected {
        return Err(CompileError::link(
            variant,
            format!(
                "kernel work-group size {:?} does not match host dispatch size {:?}",
                entry.workgroup_size, expected
            ),
        ));
    }
    Ok(())
}

/// Produces a self-contained GLSL compute shader from a variant's body.
///
/// The generated prelude declares each input under its binding name as a
/// `sampler2D` built from a texture/sampler pair, declares the write-only
/// output image, and fixes the work-group size. The footer's `main()` drops
/// invocations outside the output image before calling `demod_main`.
pub(crate) fn wrap_kernel(descriptor: &VariantDescriptor) -> String {
    let mut prelude = String::new();
    let _ = writeln!(prelude, "#version 450");
    let _ = writeln!(
        prelude,
        "layout(local_size_x = {WORKGROUP_X}, local_size_y = {WORKGROUP_Y}, local_size_z = 1) in;"
    );
    prelude.push('\n');

    for (position, input) in descriptor.inputs.iter().enumerate() {
        let name = input.name;
        let _ = writeln!(
            prelude,
            "layout(set = 0, binding = {}) uniform texture2D demod_{name}_texture;",
            VariantDescriptor::texture_binding(position)
        );
        let _ = writeln!(
            prelude,
            "layout(set = 0, binding = {}) uniform sampler demod_{name}_sampler;",
            VariantDescriptor::sampler_binding(position)
        );
        let _ = writeln!(
            prelude,
            "#define {name} sampler2D(demod_{name}_texture, demod_{name}_sampler)"
        );
    }
    let _ = writeln!(
        prelude,
        "layout(set = 0, binding = {}, rgba32f) uniform writeonly image2D {};",
        descriptor.output_binding(),
        descriptor.output.name
    );

    let mut body = String::new();
    for line in descriptor.source.lines() {
        if line.trim_start().starts_with("#version") {
            continue;
        }
        body.push_str(line);
        body.push('\n');
    }

    let footer = format!(
        r"
void main() {{
    ivec2 pixel = ivec2(gl_GlobalInvocationID.xy);
    ivec2 extent = imageSize({output});
    if (pixel.x >= extent.x || pixel.y >= extent.y) {{
        return;
    }}
    demod_main(pixel);
}}
",
        output = descriptor.output.name
    );

    format!("{prelude}\n{body}{footer}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::KernelVariant;

    #[test]
    fn prelude_declares_inputs_by_name() {
        let wrapped = wrap_kernel(KernelVariant::BrdfDemodulate.descriptor());
        assert!(wrapped.starts_with("#version 450"));
        assert!(wrapped.contains("local_size_x = 8, local_size_y = 8"));
        assert!(wrapped
            .contains("layout(set = 0, binding = 6) uniform texture2D demod_precomputed_texture;"));
        assert!(wrapped
            .contains("layout(set = 0, binding = 7) uniform sampler demod_precomputed_sampler;"));
        assert!(wrapped.contains(
            "#define specular sampler2D(demod_specular_texture, demod_specular_sampler)"
        ));
        assert!(wrapped
            .contains("layout(set = 0, binding = 10, rgba32f) uniform writeonly image2D result;"));
    }

    #[test]
    fn footer_bounds_checks_before_body() {
        let wrapped = wrap_kernel(KernelVariant::Identity.descriptor());
        let check = wrapped.find("pixel.x >= extent.x").unwrap();
        let call = wrapped.rfind("demod_main(pixel);").unwrap();
        assert!(check < call);
        assert!(wrapped.contains("imageSize(result)"));
    }

    #[test]
    fn body_version_directive_is_dropped() {
        let descriptor = VariantDescriptor {
            source: "#version 460\nvoid demod_main(ivec2 pixel) {}\n",
            ..*KernelVariant::Identity.descriptor()
        };
        let wrapped = wrap_kernel(&descriptor);
        assert_eq!(wrapped.matches("#version").count(), 1);
    }

    #[test]
    fn shipped_kernels_pass_naga_validation() {
        for variant in KernelVariant::ALL {
            let wrapped = wrap_kernel(variant.descriptor());
            let module = parse_glsl(variant, &wrapped)
                .unwrap_or_else(|err| panic!("{variant} failed to parse: {err}"));
            check_workgroup_size(variant, &module).unwrap();
        }
    }

    #[test]
    fn syntax_errors_surface_at_shader_stage() {
        let descriptor = VariantDescriptor {
            source: "void demod_main(ivec2 pixel) { imageStore(result, pixel, vec4(1.0) }\n",
            ..*KernelVariant::Identity.descriptor()
        };
        let wrapped = wrap_kernel(&descriptor);
        let err = parse_glsl(KernelVariant::Identity, &wrapped).unwrap_err();
        assert_eq!(err.stage, crate::error::CompileStage::Shader);
        assert!(!err.log.is_empty());
    }
}
