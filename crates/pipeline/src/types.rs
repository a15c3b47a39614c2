use std::fmt;
use std::str::FromStr;

/// Compute work-group width baked into every generated kernel prelude.
pub const WORKGROUP_X: u32 = 8;
/// Compute work-group height baked into every generated kernel prelude.
pub const WORKGROUP_Y: u32 = 8;

/// Images are always RGBA on the host and on the GPU.
pub const CHANNELS: usize = 4;

/// Shader compilation backend requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderCompiler {
    /// Hand the wrapped GLSL to naga's built-in frontend.
    NagaGlsl,
    /// Compile wrapped GLSL through shaderc into SPIR-V.
    Shaderc,
}

impl Default for ShaderCompiler {
    fn default() -> Self {
        ShaderCompiler::NagaGlsl
    }
}

impl fmt::Display for ShaderCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderCompiler::Shaderc => f.write_str("shaderc"),
            ShaderCompiler::NagaGlsl => f.write_str("naga"),
        }
    }
}

impl FromStr for ShaderCompiler {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "naga" | "naga-glsl" => Ok(ShaderCompiler::NagaGlsl),
            "shaderc" => Ok(ShaderCompiler::Shaderc),
            other => Err(format!(
                "invalid shader compiler '{other}'; expected 'naga' or 'shaderc'"
            )),
        }
    }
}

/// How the dispatch grid treats image extents that are not a multiple of the
/// work-group size.
///
/// * `Cover` rounds the grid up and relies on the generated bounds check in the
///   kernel footer, so every pixel is written.
/// * `Truncate` rounds the grid down. Trailing rows and columns are never
///   dispatched and keep the output texture's zero fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GridPolicy {
    #[default]
    Cover,
    Truncate,
}

impl fmt::Display for GridPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridPolicy::Cover => f.write_str("cover"),
            GridPolicy::Truncate => f.write_str("truncate"),
        }
    }
}

impl FromStr for GridPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cover" | "ceil" => Ok(GridPolicy::Cover),
            "truncate" | "floor" => Ok(GridPolicy::Truncate),
            other => Err(format!(
                "invalid grid policy '{other}'; expected 'cover' or 'truncate'"
            )),
        }
    }
}

/// Adapter power preference forwarded to `wgpu`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPowerPreference {
    Low,
    #[default]
    High,
}

impl FromStr for GpuPowerPreference {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" | "low-power" => Ok(GpuPowerPreference::Low),
            "high" | "high-performance" => Ok(GpuPowerPreference::High),
            other => Err(format!(
                "invalid GPU power preference '{other}'; expected 'low' or 'high'"
            )),
        }
    }
}

/// Options used when bringing up the headless GPU context.
#[derive(Debug, Clone, Default)]
pub struct GpuOptions {
    pub power: GpuPowerPreference,
    /// Ask `wgpu` for a software adapter (e.g. llvmpipe/WARP).
    pub force_fallback_adapter: bool,
}

/// Per-controller knobs that affect how kernels are built and dispatched.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    pub shader_compiler: ShaderCompiler,
    pub grid: GridPolicy,
}

/// Summary of the adapter the context ended up on, for logging and diagnostics.
#[derive(Debug, Clone)]
pub struct AdapterProfile {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
    pub driver: String,
    pub max_texture_dimension_2d: u32,
}

impl AdapterProfile {
    pub(crate) fn from_wgpu(info: &wgpu::AdapterInfo, limits: &wgpu::Limits) -> Self {
        Self {
            name: info.name.clone(),
            backend: info.backend,
            device_type: info.device_type,
            driver: info.driver.clone(),
            max_texture_dimension_2d: limits.max_texture_dimension_2d,
        }
    }

    pub fn is_software(&self) -> bool {
        matches!(self.device_type, wgpu::DeviceType::Cpu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cli_spellings() {
        assert_eq!("Cover".parse::<GridPolicy>().unwrap(), GridPolicy::Cover);
        assert_eq!("floor".parse::<GridPolicy>().unwrap(), GridPolicy::Truncate);
        assert_eq!(
            "naga".parse::<ShaderCompiler>().unwrap(),
            ShaderCompiler::NagaGlsl
        );
        assert_eq!(
            " low ".parse::<GpuPowerPreference>().unwrap(),
            GpuPowerPreference::Low
        );
    }

    #[test]
    fn rejects_unknown_values() {
        let err = "diagonal".parse::<GridPolicy>().unwrap_err();
        assert!(err.contains("'diagonal'"));
        assert!("glslang".parse::<ShaderCompiler>().is_err());
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for policy in [GridPolicy::Cover, GridPolicy::Truncate] {
            assert_eq!(policy.to_string().parse::<GridPolicy>().unwrap(), policy);
        }
        for compiler in [ShaderCompiler::NagaGlsl, ShaderCompiler::Shaderc] {
            assert_eq!(
                compiler.to_string().parse::<ShaderCompiler>().unwrap(),
                compiler
            );
        }
    }
}
