//! Entry-point wiring: parse args, load the assembly source, run it to
//! completion, report fatal errors on one line.

pub mod args;

use crate::asm;
use crate::driver::Driver;
use crate::gc;
use crate::symbol::Interner;
use args::CliArgs;
use std::fs;
use std::process;

pub fn run_cli() -> Result<(), Box<dyn std::error::Error>> {
    let args = match CliArgs::parse() {
        Ok(args) => args,
        Err(usage) => {
            eprintln!("{}", usage);
            process::exit(1);
        }
    };

    let source = fs::read_to_string(&args.file).map_err(|e| {
        eprintln!("Error: couldn't read '{}': {}", args.file, e);
        process::exit(1);
    })?;

    let mut interner = Interner::new();
    let mut heap = gc::Heap::new();
    let (blocks, entry) = match asm::load(&source, &mut heap, &mut interner) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let engine = gc::engine_for_name(&args.gc_type, args.debug_mode);
    let mut driver = Driver::new(blocks, heap, interner, engine, args.trace_enabled);

    if let Err(e) = driver.run(entry) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    if args.gc_stats {
        driver.report_gc_stats();
    }

    Ok(())
}
