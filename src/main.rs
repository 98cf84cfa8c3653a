#[macro_use]
extern crate clap;

use clap::Arg;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

fn main() {
    env_logger::init();

    let matches = app_from_crate!()
        .arg(
            Arg::with_name("INPUT")
                .help("Sets the source file to compile")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .takes_value(true)
                .value_name("ASM")
                .help("Sets the assembly listing path (defaults to INPUT with a .asm extension)"),
        )
        .arg(
            Arg::with_name("bin")
                .short("b")
                .long("bin")
                .takes_value(true)
                .value_name("BIN")
                .help("Sets the hex machine code path (defaults to INPUT with a .bin extension)"),
        )
        .arg(
            Arg::with_name("tree")
                .short("t")
                .long("tree")
                .help("Also dumps the parsed tree next to INPUT with a .tre extension"),
        )
        .get_matches();

    let input = matches.value_of("INPUT").unwrap();
    let output = matches.value_of("output");
    let bin = matches.value_of("bin");
    let dump_tree = matches.is_present("tree");

    if let Err(err) = run(input, output, bin, dump_tree) {
        eprintln!("{}", err);
        process::exit(1);
    }
}

fn run(input: &str, output: Option<&str>, bin: Option<&str>, dump_tree: bool) -> Result<(), String> {
    let input_path = Path::new(input);
    let source = fs::read_to_string(input_path)
        .map_err(|err| format!("reading input file \"{}\" failed: {}", input_path.display(), err))?;

    if dump_tree {
        let tree = logisimc::pretty_print_tree(&source).map_err(|err| err.to_string())?;
        let tree_path: PathBuf = input_path.with_extension("tre");
        fs::write(&tree_path, tree)
            .map_err(|err| format!("writing tree file \"{}\" failed: {}", tree_path.display(), err))?;
    }

    let compiled = logisimc::compile(&source).map_err(|err| err.to_string())?;

    let asm_path: PathBuf = output.map(PathBuf::from).unwrap_or_else(|| input_path.with_extension("asm"));
    fs::write(&asm_path, &compiled.assembly)
        .map_err(|err| format!("writing assembly file \"{}\" failed: {}", asm_path.display(), err))?;

    let bin_path: PathBuf = bin.map(PathBuf::from).unwrap_or_else(|| input_path.with_extension("bin"));
    fs::write(&bin_path, &compiled.binary)
        .map_err(|err| format!("writing binary file \"{}\" failed: {}", bin_path.display(), err))?;

    Ok(())
}
