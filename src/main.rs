//! Commandline utility to convert a medical image volume into a series of 2D slices.
//!
//! The input format is sniffed from the file contents (extension and magic
//! bytes must agree), then the volume is written as one file per slice in
//! the requested target format.

use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, error, info, warn, Level};

use medformat::{
    parse_format, parse_modality, sniff, ConvertError, Format, ToolkitBackend,
    VolumeToSeriesConverter,
};

// use clap to create commandline interface
#[derive(Parser, Debug)]
#[command(author, about, version, long_about)]
struct Args {
    /// the input volume (DICOM, NIfTI, .nii.gz or PNG)
    #[arg(short, long)]
    input: PathBuf,

    /// the directory where the slice files will be written
    #[arg(short, long)]
    output: PathBuf,

    /// target format of the slices: DICOM, NIFTI or PNG
    #[arg(short, long)]
    format: String,

    /// modality of the image: CT, MR or CXR
    #[arg(short, long, default_value = "CT")]
    modality: String,

    /// Print more information about the conversion
    #[arg(short, long)]
    verbose: bool,
}

/// Logs an error together with its chain of causes.
fn report(err: &dyn std::error::Error) {
    error!("{}", err);
    let mut source = err.source();
    while let Some(cause) = source {
        error!("  caused by: {}", cause);
        source = cause.source();
    }
}

fn exit_code(err: &ConvertError) -> i32 {
    match err {
        ConvertError::Decode { .. } | ConvertError::EmptyVolume => -2,
        ConvertError::UnsupportedTarget(_) => -1,
        _ => -3,
    }
}

fn main() {
    let cli = Args::parse();

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("[ERROR] Could not set up global logging subscriber: {}", e);
    }

    debug!("Input path: {}", cli.input.display());
    debug!("Output path: {}", cli.output.display());

    if !cli.input.exists() {
        error!("Input file does not exist: {}", cli.input.display());
        std::process::exit(-1);
    }

    let target = parse_format(&cli.format);
    if target == Format::Unknown {
        error!(
            "Invalid target format {:?}. Must be one of DICOM, NIFTI or PNG",
            cli.format
        );
        std::process::exit(-1);
    }

    let modality = parse_modality(&cli.modality);
    if !modality.as_str().eq_ignore_ascii_case(cli.modality.trim()) {
        warn!(
            "Unrecognized modality {:?}, falling back to {}",
            cli.modality, modality
        );
    }
    debug!("Target format: {}", target);
    debug!("Target modality: {}", modality);

    let input_format = sniff::detect(&cli.input);
    if input_format == Format::Unknown {
        error!("Unknown input format. Supported formats are DICOM, NIFTI and PNG");
        std::process::exit(-1);
    }
    info!("Detected input format: {}", input_format);

    let converter =
        match VolumeToSeriesConverter::new(ToolkitBackend::for_input(input_format), target) {
            Ok(converter) => converter,
            Err(e) => {
                report(&e);
                std::process::exit(exit_code(&e));
            }
        };

    match converter.convert(&cli.input, &cli.output, modality) {
        Ok(written) => info!(
            "{} series of {} slices written to {}",
            target,
            written,
            cli.output.display()
        ),
        Err(e) => {
            report(&e);
            std::process::exit(exit_code(&e));
        }
    }
}
