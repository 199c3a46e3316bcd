use clap::{Parser, ValueEnum};

use intscript::asm;
use intscript::cli::{self, Error};
use intscript::compiler;

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutputType {
    Assembly,
    Intcode,
}

/// Compile IntScript source to assembly or intcode.
#[derive(Parser, Debug)]
#[clap(name = "compile")]
struct Args {
    /// File to read from.
    #[clap(long, default_value = "-")]
    input: String,

    /// File to write to.
    #[clap(long, default_value = "-")]
    output: String,

    /// Output format (assembly or intcode).
    #[clap(long = "output_type", value_enum, default_value = "intcode")]
    output_type: OutputType,
}

fn compile(args: &Args) -> Result<(), Error> {
    let modules = if args.input == "-" {
        let (name, source) = cli::read_input(&args.input)?;
        compiler::load_source(&name, &source)?
    } else {
        compiler::load(&args.input)?
    };
    let statements = compiler::generate(&modules)?;
    let output = match args.output_type {
        OutputType::Assembly => cli::render_assembly(&statements),
        OutputType::Intcode => cli::render_intcode(&asm::encode(&statements)?),
    };
    cli::write_output(&args.output, &output)
}

fn main() {
    env_logger::init();
    let args: Args = cli::parse_args(&["help", "input", "output", "output_type"]);
    if let Err(e) = compile(&args) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
