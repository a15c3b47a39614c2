use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pipeline::{GpuPowerPreference, GridPolicy, KernelVariant, ShaderCompiler};

#[derive(Parser, Debug)]
#[command(
    name = "demod",
    author,
    version,
    about = "Run GPU demodulation kernels over EXR render passes"
)]
pub struct Cli {
    #[command(flatten)]
    pub gpu: GpuArgs,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Parser, Debug)]
pub struct GpuArgs {
    /// Shader compiler backend: `naga` (default) or `shaderc`.
    #[arg(
        long,
        global = true,
        value_name = "COMPILER",
        value_parser = parse_shader_compiler,
        default_value_t = ShaderCompiler::default()
    )]
    pub shader_compiler: ShaderCompiler,

    /// Dispatch grid policy for extents that are not a multiple of 8:
    /// `cover` (every pixel) or `truncate` (floor sizing). Overrides
    /// any grid set in a batch file.
    #[arg(long, global = true, value_name = "POLICY", value_parser = parse_grid)]
    pub grid: Option<GridPolicy>,

    /// Adapter power preference: `low` or `high`.
    #[arg(
        long,
        global = true,
        value_name = "PREFERENCE",
        value_parser = parse_gpu_power,
        default_value = "high"
    )]
    pub gpu_power: GpuPowerPreference,

    /// Request a software fallback adapter (llvmpipe, WARP).
    #[arg(long, global = true)]
    pub fallback_adapter: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one kernel over the given inputs and write the result.
    Run(RunArgs),
    /// Run every entry of a TOML batch file through one pipeline.
    Batch(BatchArgs),
    /// List the available kernel variants and their inputs.
    Variants,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Kernel variant (see `demod variants`).
    #[arg(long, short = 'k', value_name = "VARIANT", value_parser = parse_variant)]
    pub variant: KernelVariant,

    /// Where to write the EXR result.
    #[arg(long, short, value_name = "PATH")]
    pub output: PathBuf,

    /// Input EXR files, in the order the variant lists its inputs.
    #[arg(value_name = "INPUT", required = true)]
    pub inputs: Vec<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct BatchArgs {
    /// Batch file; relative paths inside it resolve against its directory.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_variant(value: &str) -> Result<KernelVariant, String> {
    if value.trim().is_empty() {
        return Err("kernel variant must not be empty".to_string());
    }
    value.parse()
}

pub fn parse_shader_compiler(value: &str) -> Result<ShaderCompiler, String> {
    let compiler: ShaderCompiler = value.parse()?;
    if compiler == ShaderCompiler::Shaderc && !cfg!(feature = "shaderc") {
        return Err("shaderc support is not enabled in this build".to_string());
    }
    Ok(compiler)
}

pub fn parse_grid(value: &str) -> Result<GridPolicy, String> {
    value.parse()
}

pub fn parse_gpu_power(value: &str) -> Result<GpuPowerPreference, String> {
    value.parse()
}
