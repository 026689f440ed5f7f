//! Argument parsing. Exactly one positional argument naming the assembly
//! source file; every other runtime knob lives in an environment variable
//! so the single-argument contract stays exact (`TTVM_GC`, `TTVM_DEBUG`,
//! `TTVM_GC_STATS`, `TTVM_TRACE`).

use std::env;

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub file: String,
    pub gc_type: String,
    pub debug_mode: bool,
    pub gc_stats: bool,
    pub trace_enabled: bool,
}

impl CliArgs {
    pub fn parse() -> Result<Self, String> {
        let args: Vec<String> = env::args().collect();
        if args.len() != 2 {
            return Err(Self::usage_string());
        }

        Ok(CliArgs {
            file: args[1].clone(),
            gc_type: env::var("TTVM_GC").unwrap_or_else(|_| "mark-sweep".to_string()),
            debug_mode: env_flag("TTVM_DEBUG"),
            gc_stats: env_flag("TTVM_GC_STATS"),
            trace_enabled: env_flag("TTVM_TRACE"),
        })
    }

    fn usage_string() -> String {
        "Usage: tlvm <program.ttasm>\n\
         \n\
         Environment variables:\n\
         \x20 TTVM_GC        mark-sweep (default) | no-gc\n\
         \x20 TTVM_DEBUG     1 to print GC-cycle diagnostics to stderr\n\
         \x20 TTVM_GC_STATS  1 to print a final allocation/collection summary\n\
         \x20 TTVM_TRACE     1 to print a line per GC cycle that frees anything"
            .to_string()
    }
}

fn env_flag(name: &str) -> bool {
    matches!(env::var(name).as_deref(), Ok("1") | Ok("true"))
}