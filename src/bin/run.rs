use std::path::Path;

use clap::Parser;

use intscript::cli::{self, Error};
use intscript::{asm, compiler, vm};

/// Execute a program: intcode directly, assembly or source after
/// translating on the fly.
#[derive(Parser, Debug)]
#[clap(name = "run")]
struct Args {
    /// Program to execute (.ic, .asm, or .is).
    path: String,

    /// Show executed instructions.
    #[clap(long)]
    debug: bool,
}

fn load(path: &str) -> Result<Vec<i64>, Error> {
    let extension = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");
    match extension {
        "ic" => {
            let (_, source) = cli::read_input(path)?;
            Ok(vm::parse_image(&source)?)
        }
        "asm" => {
            let (file, source) = cli::read_input(path)?;
            let statements = asm::parse(&file, &source).map_err(asm::Error::from)?;
            Ok(asm::encode(&statements)?)
        }
        "is" => {
            let modules = compiler::load(path)?;
            Ok(asm::encode(&compiler::generate(&modules)?)?)
        }
        _ => Err(Error::Usage(format!(
            "Unknown extension {:?}, must be \".ic\", \".asm\", or \".is\".",
            extension
        ))),
    }
}

fn execute(args: &Args) -> Result<(), Error> {
    let image = load(&args.path)?;
    let mut program = vm::Program::new(&image);
    if args.debug {
        program = program.with_trace();
    }
    program.run(&mut vm::StandardDevice)?;
    Ok(())
}

fn main() {
    env_logger::init();
    let args: Args = cli::parse_args(&["help", "debug"]);
    if let Err(e) = execute(&args) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
