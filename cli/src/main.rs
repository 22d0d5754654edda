//! Command-line shell around the `s7p` parser.

use std::io::BufWriter;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use s7p::DeviceSymbolInfo;

mod export;
mod logger;

use self::export::export_csv;
use self::logger::Logger;

#[derive(clap::Parser)]
#[clap(version)]
struct Args {
    /// Verbose output.
    #[clap(short = 'v', long = "verbose")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Print every device, block and variable.
    Show {
        /// STEP 7 project folder (the one containing the `.s7p` file).
        #[clap(value_name = "PROJECT DIR")]
        folder: PathBuf,
    },
    /// Export all variables to a semicolon-separated CSV file.
    Export {
        /// STEP 7 project folder (the one containing the `.s7p` file).
        #[clap(value_name = "PROJECT DIR")]
        folder: PathBuf,

        /// Output file.
        #[clap(short = 'o', long = "output", value_name = "FILE")]
        output: PathBuf,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = Logger::init(args.verbose) {
        eprintln!("Failed to set logger: {e}");
        return ExitCode::FAILURE;
    }
    match do_main(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn do_main(args: Args) -> Result<(), s7p::Error> {
    match args.command {
        Command::Show { folder } => {
            let devices = s7p::parse_project(&folder)?;
            report_warnings(&devices);
            show(&devices)
        }
        Command::Export { folder, output } => {
            let devices = s7p::parse_project(&folder)?;
            report_warnings(&devices);
            export_csv(&output, &devices)
        }
    }
}

fn report_warnings(devices: &[DeviceSymbolInfo]) {
    for device in devices {
        for warning in &device.warnings {
            log::warn!("{}: {warning}", device.name);
        }
    }
}

fn show(devices: &[DeviceSymbolInfo]) -> Result<(), s7p::Error> {
    let mut writer = BufWriter::new(std::io::stdout());
    for device in devices {
        writeln!(writer, "{}", device.name)?;
        for block in &device.blocks {
            writeln!(writer, "  {}", block.name)?;
            for symbol in &block.symbols {
                writeln!(
                    writer,
                    "    {}\t{}\t{}\t{}",
                    symbol.name, symbol.code, symbol.datatype, symbol.comment
                )?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}
