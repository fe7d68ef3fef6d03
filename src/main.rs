use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tiff_volume::{
    BatchReport, ExternalEngine, FixedFolder, FolderPicker, batch,
    config::{
        Cli, Command, CompileOptions, DownsampleOptions, MotionArgs, MotionOptions, PreviewArgs,
    },
    tiff_io,
};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Command::Compile(args) => {
            let options = CompileOptions::from(args);
            if let Err(e) = options.validate() {
                error!("Configuration error: {}", e);
                return ExitCode::FAILURE;
            }
            let Some(mut picker) = build_picker(&cli) else {
                return ExitCode::FAILURE;
            };
            finish(batch::run_compile(&args.items, &options, picker.as_mut()))
        }
        Command::Downsample(args) => {
            let options = DownsampleOptions::from(args);
            if let Err(e) = options.validate() {
                error!("Configuration error: {}", e);
                return ExitCode::FAILURE;
            }
            let Some(mut picker) = build_picker(&cli) else {
                return ExitCode::FAILURE;
            };
            finish(batch::run_downsample(&args.items, &options, picker.as_mut()))
        }
        Command::Motion(args) => run_motion(&cli, args),
        Command::Preview(args) => run_preview(args),
    }
}

fn run_motion(cli: &Cli, args: &MotionArgs) -> ExitCode {
    let options = MotionOptions::from(args);
    if let Err(e) = options.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }
    let Some(mut picker) = build_picker(cli) else {
        return ExitCode::FAILURE;
    };
    let mut engine = ExternalEngine::new(&args.engine, args.engine_args.clone());
    finish(batch::run_motion(
        &args.items,
        &options,
        &mut engine,
        picker.as_mut(),
    ))
}

fn run_preview(args: &PreviewArgs) -> ExitCode {
    let volume = match tiff_io::read_volume(&args.input) {
        Ok(volume) => volume,
        Err(e) => {
            error!("Failed to read {}: {}", args.input.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let Some(image) = volume.preview_image(args.frame) else {
        error!(
            "Frame {} is out of range ({} frames)",
            args.frame,
            volume.frames()
        );
        return ExitCode::FAILURE;
    };
    if let Err(e) = image.save(&args.png) {
        error!("Failed to save {}: {}", args.png.display(), e);
        return ExitCode::FAILURE;
    }
    info!("Saved preview to {}", args.png.display());
    ExitCode::SUCCESS
}

/// Fixed output directory if configured, otherwise the native dialog.
fn build_picker(cli: &Cli) -> Option<Box<dyn FolderPicker>> {
    if let Some(dir) = &cli.output_dir {
        return Some(Box::new(FixedFolder(dir.clone())));
    }
    #[cfg(feature = "dialog")]
    {
        Some(Box::new(tiff_volume::picker::DialogPicker))
    }
    #[cfg(not(feature = "dialog"))]
    {
        error!("No output directory given. Set --output-dir or TVOL_OUTPUT_DIR");
        None
    }
}

fn finish(report: BatchReport) -> ExitCode {
    info!(
        "Done: {} file(s) written, {} empty, {} cancelled, {} failed",
        report.written.len(),
        report.empty.len(),
        report.cancelled.len(),
        report.failed.len()
    );
    for (item, e) in &report.failed {
        warn!("  {}: {}", item.display(), e);
    }
    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tiff_volume=debug"
    } else {
        "tiff_volume=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
