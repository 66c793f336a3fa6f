//! `twc`, the command-line driver for the Twine compiler.
//!
//! The front end produces a textual IR module; everything after that is
//! delegated to the external backend tools: `opt` (optimisation, advisory),
//! `llc` (assembly and object emission) and a C-compatible linker.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

#[derive(Parser)]
#[command(name = "twc")]
#[command(about = "Ahead-of-time compiler for the Twine scripting language")]
#[command(disable_version_flag = true)]
struct Args {
    /// Path to the source file to compile (must end in .tw)
    input: Option<PathBuf>,

    /// Output executable name
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Stop after writing the textual IR (<base>.ll)
    #[arg(long)]
    emit_ir: bool,

    /// Stop after writing assembly (<base>.s)
    #[arg(long)]
    emit_asm: bool,

    /// Stop after writing the object file (<base>.o)
    #[arg(long)]
    emit_obj: bool,

    /// Trace each pipeline stage and keep intermediate files
    #[arg(long)]
    verbose: bool,

    /// Print version information
    #[arg(short = 'v', long = "version")]
    version: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if args.version {
        println!("twc {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let input = match &args.input {
        Some(input) => input,
        None => bail!("no input file specified"),
    };
    if !has_tw_extension(input) {
        bail!("input file must have .tw extension: {}", input.display());
    }

    let source = fs::read_to_string(input)
        .with_context(|| format!("could not read {}", input.display()))?;
    let base = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("out")
        .to_string();

    if args.verbose {
        println!("Compiling {} ...", input.display());
    }
    let ir_text = tw_compiler::compile_to_ir_text(&source, &base)?;

    let ir_file = PathBuf::from(format!("{base}.ll"));
    fs::write(&ir_file, &ir_text)
        .with_context(|| format!("could not write {}", ir_file.display()))?;
    if args.verbose {
        println!("IR written to {}", ir_file.display());
    }
    if args.emit_ir {
        println!("IR written to: {}", ir_file.display());
        return Ok(());
    }

    // Optimisation is advisory: if opt is missing or fails, the unoptimised
    // module goes to llc unchanged.
    let opt_file = PathBuf::from(format!("{base}_opt.ll"));
    let mut best_ir = ir_file.clone();
    let opt_ok = run_tool(
        "opt",
        &["-O2", "-S", path_str(&ir_file), "-o", path_str(&opt_file)],
        args.verbose,
    );
    if opt_ok {
        best_ir = opt_file.clone();
        if args.verbose {
            println!("Optimization completed");
        }
    } else if args.verbose {
        println!("Optimization skipped (opt not available or failed)");
    }

    let asm_file = PathBuf::from(format!("{base}.s"));
    if !run_tool(
        "llc",
        &[
            "-filetype=asm",
            path_str(&best_ir),
            "-o",
            path_str(&asm_file),
        ],
        args.verbose,
    ) {
        bail!("assembly generation failed");
    }
    if args.emit_asm {
        println!("Assembly written to: {}", asm_file.display());
        return Ok(());
    }

    let obj_file = PathBuf::from(format!("{base}.o"));
    if !run_tool(
        "llc",
        &[
            "-filetype=obj",
            path_str(&best_ir),
            "-o",
            path_str(&obj_file),
        ],
        args.verbose,
    ) {
        bail!("object file generation failed");
    }
    if args.emit_obj {
        println!("Object file written to: {}", obj_file.display());
        return Ok(());
    }

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(&base));
    link(&obj_file, &output, args.verbose)?;

    println!("Compilation successful!");
    println!("Executable: {}", output.display());

    if !args.verbose {
        cleanup_intermediates(&[&ir_file, &opt_file, &asm_file, &obj_file]);
    }
    Ok(())
}

/// Link with gcc, then g++, then raw ld as a last resort. The math library
/// is always requested.
fn link(obj_file: &Path, output: &Path, verbose: bool) -> Result<()> {
    let obj = path_str(obj_file);
    let out = path_str(output);

    if run_tool("gcc", &[obj, "-o", out, "-lm"], verbose) {
        return Ok(());
    }
    if run_tool("g++", &[obj, "-o", out, "-lm"], verbose) {
        return Ok(());
    }
    let mut ld_args = vec![obj, "-o", out];
    if cfg!(target_os = "linux") {
        ld_args.extend([
            "-dynamic-linker",
            "/lib64/ld-linux-x86-64.so.2",
            "-lc",
            "-lm",
        ]);
    }
    if run_tool("ld", &ld_args, verbose) {
        return Ok(());
    }
    bail!("linking failed")
}

/// Run an external tool, reporting the command when verbose. Returns whether
/// it ran and exited successfully.
fn run_tool(tool: &str, tool_args: &[&str], verbose: bool) -> bool {
    if verbose {
        println!("Running: {tool} {}", tool_args.join(" "));
    }
    match Command::new(tool).args(tool_args).status() {
        Ok(status) => status.success(),
        Err(err) => {
            if verbose {
                println!("Could not run {tool}: {err}");
            }
            false
        }
    }
}

fn cleanup_intermediates(files: &[&Path]) {
    for file in files {
        let _ = fs::remove_file(file);
    }
}

fn has_tw_extension(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("tw")
}

fn default_output(base: &str) -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(format!("{base}.exe"))
    } else {
        PathBuf::from(base)
    }
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tw_extension_is_required() {
        assert!(has_tw_extension(Path::new("demo.tw")));
        assert!(has_tw_extension(Path::new("dir/demo.tw")));
        assert!(!has_tw_extension(Path::new("demo.ts")));
        assert!(!has_tw_extension(Path::new("demo")));
        assert!(!has_tw_extension(Path::new("tw")));
    }

    #[test]
    fn default_output_strips_nothing_on_unix() {
        if !cfg!(windows) {
            assert_eq!(default_output("demo"), PathBuf::from("demo"));
        } else {
            assert_eq!(default_output("demo"), PathBuf::from("demo.exe"));
        }
    }

    #[test]
    fn cleanup_removes_what_exists_and_ignores_the_rest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let present = dir.path().join("a.ll");
        let absent = dir.path().join("b.ll");
        std::fs::write(&present, "x").expect("write");
        cleanup_intermediates(&[present.as_path(), absent.as_path()]);
        assert!(!present.exists());
        assert!(!absent.exists());
    }
}
