use clap::Parser;

use intscript::asm;
use intscript::cli::{self, Error};

/// Assemble symbolic assembly to intcode.
#[derive(Parser, Debug)]
#[clap(name = "as")]
struct Args {
    /// File to read from.
    #[clap(long, default_value = "-")]
    input: String,

    /// File to write to.
    #[clap(long, default_value = "-")]
    output: String,
}

fn assemble(args: &Args) -> Result<(), Error> {
    let (file, source) = cli::read_input(&args.input)?;
    let statements = asm::parse(&file, &source).map_err(asm::Error::from)?;
    let image = asm::encode(&statements)?;
    cli::write_output(&args.output, &cli::render_intcode(&image))
}

fn main() {
    env_logger::init();
    let args: Args = cli::parse_args(&["help", "input", "output"]);
    if let Err(e) = assemble(&args) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
