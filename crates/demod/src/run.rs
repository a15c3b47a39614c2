use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use batchconfig::BatchConfig;
use pipeline::{
    ExrCodec, GpuOptions, GridPolicy, KernelVariant, PipelineController, PipelineOptions,
};
use tracing_subscriber::EnvFilter;

use crate::cli::{BatchArgs, Cli, Command, GpuArgs, RunArgs};

/// One unit of work for the controller, from the command line or a batch entry.
struct RunRequest {
    name: String,
    variant: KernelVariant,
    inputs: Vec<PathBuf>,
    output: PathBuf,
    grid: GridPolicy,
}

pub fn run(cli: Cli) -> Result<()> {
    initialise_tracing();

    match cli.command {
        Command::Variants => {
            print_variants();
            Ok(())
        }
        Command::Run(args) => run_single(&cli.gpu, args),
        Command::Batch(args) => run_batch(&cli.gpu, &args),
    }
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_variants() {
    for variant in KernelVariant::ALL {
        let descriptor = variant.descriptor();
        let inputs = descriptor
            .inputs
            .iter()
            .map(|input| input.name)
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "{:<16} {} -> {}    {}",
            variant.name(),
            inputs,
            descriptor.output.name,
            descriptor.summary
        );
    }
}

fn build_controller(gpu: &GpuArgs) -> PipelineController<ExrCodec> {
    let gpu_options = GpuOptions {
        power: gpu.gpu_power,
        force_fallback_adapter: gpu.fallback_adapter,
    };
    let options = PipelineOptions {
        shader_compiler: gpu.shader_compiler,
        grid: gpu.grid.unwrap_or_default(),
    };
    PipelineController::new(ExrCodec, options, gpu_options)
}

fn run_single(gpu: &GpuArgs, args: RunArgs) -> Result<()> {
    let mut controller = build_controller(gpu);
    let request = RunRequest {
        name: args.variant.name().to_string(),
        variant: args.variant,
        inputs: args.inputs,
        output: args.output,
        grid: gpu.grid.unwrap_or_default(),
    };
    execute_request(&mut controller, &request)
}

fn run_batch(gpu: &GpuArgs, args: &BatchArgs) -> Result<()> {
    let config = BatchConfig::load(&args.file)
        .with_context(|| format!("failed to load batch file {}", args.file.display()))?;
    let base_dir = args
        .file
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let runs = config.resolved_runs(base_dir);
    let total = runs.len();
    tracing::info!(file = %args.file.display(), runs = total, "starting batch");

    let mut controller = build_controller(gpu);
    let mut failed = Vec::new();
    for run in runs {
        let request = RunRequest {
            grid: gpu.grid.or(run.grid).unwrap_or_default(),
            name: run.name,
            variant: run.variant,
            inputs: run.inputs,
            output: run.output,
        };
        if let Err(err) = execute_request(&mut controller, &request) {
            tracing::error!(run = %request.name, "run failed: {err:#}");
            failed.push(request.name);
        }
    }
    controller.clear();

    if !failed.is_empty() {
        bail!(
            "{} of {total} runs failed: {}",
            failed.len(),
            failed.join(", ")
        );
    }
    tracing::info!(runs = total, "batch complete");
    Ok(())
}

fn execute_request(
    controller: &mut PipelineController<ExrCodec>,
    request: &RunRequest,
) -> Result<()> {
    controller.clear();
    controller.set_options(PipelineOptions {
        grid: request.grid,
        ..controller.options()
    });
    tracing::info!(
        run = %request.name,
        variant = %request.variant,
        inputs = request.inputs.len(),
        grid = %request.grid,
        "starting run"
    );

    controller
        .load(&request.inputs)
        .context("failed to load inputs")?;
    controller
        .configure(request.variant)
        .with_context(|| format!("failed to configure kernel '{}'", request.variant))?;
    controller
        .execute(request.variant)
        .with_context(|| format!("failed to execute kernel '{}'", request.variant))?;
    controller
        .export(&request.output)
        .context("failed to write result")?;

    tracing::info!(
        run = %request.name,
        output = %request.output.display(),
        "run complete"
    );
    Ok(())
}
