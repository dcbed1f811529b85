use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use opal_core::context::{CompilationContext, ModuleOrFile, SourceUnit};
use opal_core::lower::lower_file;
use opal_core::name_resolve::{ModuleRegistry, perform_name_binding};
use opal_core::parser::{ParseOptions, parse_into_source_unit};
use opal_core::serialize::{SerializeOptions, serialize};
use opal_core::span::FileId;
use opal_core::typecheck::{TopLevelContext, perform_type_checking};
use opal_core::verify::verify_unit;
use opal_core::{CompilationArtifact, compile_wasm, emit_mir};
use wasmi::{Engine, Linker, Module, Store};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[arg(short, long, help = "Input file (defaults to stdin)")]
    input: Option<String>,

    #[arg(short, long)]
    output: String,

    #[arg(
        long,
        value_name = "FORMAT",
        default_value = "wasm",
        help = "Output format: wasm, mir, artifact"
    )]
    emit: String,

    #[arg(long, help = "Run the code if the output format is wasm")]
    run: bool,

    #[arg(
        long,
        value_name = "NAME",
        default_value = "main",
        help = "Link name recorded in emitted module artifacts"
    )]
    module_name: String,

    #[arg(long, help = "Embed private function bodies in the artifact")]
    all_mir: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    execute(cli)
}

fn execute(cli: Cli) -> Result<()> {
    let source = match &cli.input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read input file {path}"))?,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    let input_name = cli.input.as_deref().unwrap_or("<stdin>");

    match cli.emit.as_str() {
        "wasm" => {
            let artifact = compile_wasm(&source)?;
            for warning in &artifact.diagnostics {
                eprintln!("warning: {}", warning.message);
            }
            write_output(&cli.output, &artifact.wasm)?;
            if cli.run {
                let result = run_wasm(&artifact)?;
                println!("Program exited with {result}");
            }
        }
        "mir" => {
            let dump = emit_mir(&source)?;
            write_output(&cli.output, dump.as_bytes())?;
            if cli.run {
                eprintln!("--run is ignored for non-wasm outputs");
            }
        }
        "artifact" => {
            emit_artifact(&source, input_name, &cli)?;
        }
        other => return Err(anyhow::anyhow!("unsupported emit format: {other}")),
    }

    Ok(())
}

/// Drive the pipeline stages directly; the artifact form needs the
/// session and unit that the batch wrappers keep to themselves.
fn emit_artifact(source: &str, input_name: &str, cli: &Cli) -> Result<()> {
    let mut ctx = CompilationContext::new();
    let mut unit = SourceUnit::new(FileId(0), input_name);
    parse_into_source_unit(
        &mut ctx,
        &mut unit,
        source,
        ParseOptions::default(),
        None,
        None,
        None,
    );
    perform_name_binding(&mut ctx, &mut unit, &ModuleRegistry::new(), 0);
    let mut tlc = TopLevelContext::new();
    perform_type_checking(&mut ctx, &mut unit, &mut tlc, 0);
    verify_unit(&mut ctx, &unit);

    if ctx.diagnostics.has_errors() {
        for diag in ctx.diagnostics.iter() {
            eprintln!("error: {}", diag.message);
        }
        anyhow::bail!(
            "compilation failed with {} error(s)",
            ctx.diagnostics.error_count()
        );
    }

    let mir = lower_file(&mut ctx, &unit, 0);
    serialize(
        &ctx,
        ModuleOrFile::File(&unit),
        SerializeOptions {
            output_path: Path::new(&cli.output),
            doc_output_path: None,
            mir: Some(&mir),
            serialize_all_mir: cli.all_mir,
            link_name: &cli.module_name,
        },
    )
    .context("failed to serialize module artifact")?;
    Ok(())
}

fn write_output(path: &str, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = PathBuf::from(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {parent:?}"))?;
        }
    }
    fs::write(path, bytes).with_context(|| format!("failed to write output file {path}"))?;
    Ok(())
}

fn run_wasm(artifact: &CompilationArtifact) -> Result<i32> {
    let engine = Engine::default();
    let module = Module::new(&engine, &artifact.wasm).context("failed to compile wasm artifact")?;
    let mut linker = Linker::new(&engine);
    linker
        .func_wrap("env", "print", |value: i32| -> i32 {
            println!("{value}");
            value
        })
        .context("failed to link print")?;
    linker
        .func_wrap("env", "log", |value: i32| -> i32 {
            println!("= {value}");
            value
        })
        .context("failed to link log")?;
    let mut store = Store::new(&engine, ());
    let instance = linker
        .instantiate(&mut store, &module)
        .context("failed to instantiate module")?
        .start(&mut store)
        .context("failed to start module")?;
    let main = instance
        .get_typed_func::<(), i32>(&store, "main")
        .context("exported main function missing or has wrong type")?;
    let result = main
        .call(&mut store, ())
        .context("failed to execute main")?;
    Ok(result)
}
