use clap::Parser;
use clap_verbosity_flag::Verbosity;
use std::path::PathBuf;

mod commands;
mod error;

use commands::call::handle_call;
use commands::layout::handle_layout;

#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(about = "Inspect native record layouts and call native functions from declarations", long_about = None)]
struct Args {
    #[command(flatten)]
    verbose: Verbosity,

    #[clap(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Print the computed layout of every declared record
    Layout {
        /// Declaration file
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Only show this record
        #[arg(short, long, value_name = "NAME")]
        record: Option<String>,
    },

    /// Call a declared native function
    ///
    /// Arguments are parsed by the declared parameter kind: integers (decimal, 0x hex
    /// or 'c'), floats, `null`, or `@record` to pass a fresh zeroed record whose
    /// callback fields log their calls.
    Call {
        /// Declaration file
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Function to call
        #[arg(value_name = "FUNCTION")]
        function: String,
        /// Library to load instead of the one named in the declarations
        #[arg(short, long, value_name = "PATH")]
        library: Option<PathBuf>,
        /// Arguments, one per declared parameter
        #[arg(value_name = "ARGS", allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn main() -> miette::Result<()> {
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .init();

    match args.command {
        Command::Layout { file, record } => handle_layout(&file, record.as_deref())?,
        Command::Call {
            file,
            function,
            library,
            args,
        } => handle_call(&file, &function, library.as_deref(), &args)?,
    }
    Ok(())
}
