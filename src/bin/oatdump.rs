//! oatdump command line front end.
//!
//! Reads an oat container (raw, or wrapped in an ELF file that exports an
//! `oatdata` symbol) and writes the archive report to stdout or a file.
//! Set `RUST_LOG` to see diagnostics on stderr.

use clap::Parser;
use oatdump::container::Container;
use oatdump::report::{DumpOptions, OatDumper};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "oatdump")]
#[command(about = "Dump the contents of an oat container", long_about = None)]
struct Cli {
    /// Oat container to dump, raw or ELF wrapped
    #[arg(long, value_name = "FILE")]
    oat_file: Option<PathBuf>,

    /// Image file to report on (requires a heap walker)
    #[arg(long, value_name = "FILE")]
    image: Option<PathBuf>,

    /// Boot image the image depends on
    #[arg(long, value_name = "FILE")]
    boot_image: Option<PathBuf>,

    /// Prefix for finding on-device paths on the host
    #[arg(long, env = "ANDROID_PRODUCT_OUT", value_name = "DIR")]
    host_prefix: Option<String>,

    /// Write the report here instead of stdout
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Skip disassembly of code and invoke stubs
    #[arg(long)]
    no_disassemble: bool,

    /// Append size attribution and outlier statistics
    #[arg(long)]
    stats: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if cli.image.is_some() || cli.boot_image.is_some() {
        return Err("--image and --boot-image need a live heap walker, which this build does not provide".into());
    }
    let Some(oat_file) = &cli.oat_file else {
        return Err("expected --oat-file".into());
    };

    let data = fs::read(oat_file).map_err(|e| format!("{}: {e}", oat_file.display()))?;
    let container = Container::load(&data)?;
    log::info!(
        "{}: {} container, {} dex files, {} bytes",
        oat_file.display(),
        container.instruction_set(),
        container.dex_files().len(),
        container.size()
    );

    let options = DumpOptions {
        host_prefix: cli.host_prefix.clone(),
        disassemble: !cli.no_disassemble,
        stats: cli.stats,
    };
    let dumper = OatDumper::new(&container, options)?;

    let mut out: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).map_err(|e| format!("{}: {e}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    dumper.dump(&mut *out)?;
    out.flush()?;
    Ok(())
}
