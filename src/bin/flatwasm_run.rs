use clap::Parser;
use flatwasm::{Extern, Imports, ValType, Value};
use log::{debug, LevelFilter};
use std::fmt::Display;
use std::fs;
use std::path::PathBuf;

/// Instantiates a binary module with an empty import object and calls one of
/// its exports.
#[derive(Parser, Debug)]
#[command(name = "flatwasm-run", version)]
#[command(about = "Instantiate a .wasm binary and call one of its exports")]
#[command(after_help = "\
Arguments are typed as <value>:<type>, where type is one of i32, i64, f32, f64.

  flatwasm-run add.wasm -i add -a 2:i32 3:i32
  flatwasm-run fib.wasm -i fib -a 20:i32 --trace
  flatwasm-run lib.wasm --list-exports

Without --invoke the export named _start is called. Modules that import
anything fail to link, since no host functions are provided.")]
struct Args {
    /// Binary module to load
    wasm_file: PathBuf,

    /// Export to call
    #[arg(short, long, value_name = "EXPORT", default_value = "_start")]
    invoke: String,

    /// Call arguments in <value>:<type> form
    #[arg(short, long, value_name = "VALUE:TYPE", value_delimiter = ' ', num_args = 0..)]
    args: Vec<String>,

    /// Print call depth and instruction offset after every instruction
    #[arg(short, long)]
    trace: bool,

    /// Log at debug level (RUST_LOG still applies otherwise)
    #[arg(short, long)]
    debug: bool,

    /// Print the module's exports and exit
    #[arg(short, long)]
    list_exports: bool,
}

fn parse_value(arg: &str) -> Result<Value, String> {
    let (text, ty) = arg.rsplit_once(':')
        .ok_or_else(|| format!("argument '{}' has no type suffix, write it as <value>:<type>", arg))?;
    let invalid = |e: &dyn Display| format!("'{}' is not a valid {} ({})", text, ty, e);
    match ty {
        "i32" => text.parse::<i32>().map(Value::I32).map_err(|e| invalid(&e)),
        "i64" => text.parse::<i64>().map(Value::I64).map_err(|e| invalid(&e)),
        "f32" => text.parse::<f32>().map(Value::from).map_err(|e| invalid(&e)),
        "f64" => text.parse::<f64>().map(Value::from).map_err(|e| invalid(&e)),
        _ => Err(format!("argument '{}' uses unknown type '{}', expected i32, i64, f32 or f64", arg, ty)),
    }
}

fn describe(types: &[ValType]) -> String {
    types.iter().map(|t| t.name()).collect::<Vec<_>>().join(" ")
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.debug {
        env_logger::Builder::from_default_env().filter_level(LevelFilter::Debug).init();
    } else {
        env_logger::init();
    }

    let bytes = fs::read(&args.wasm_file)
        .map_err(|e| format!("cannot read {}: {}", args.wasm_file.display(), e))?;
    debug!("read {} bytes from {}", bytes.len(), args.wasm_file.display());

    let flatwasm::Instantiated { instance, module } = flatwasm::instantiate(&bytes, &Imports::new())
        .map_err(|e| format!("{}: {}", args.wasm_file.display(), e))?;

    if args.list_exports {
        for (name, export) in instance.exports() {
            match module.export_func_type(name) {
                Some(ty) => println!("func   {:<24} {}", name, ty),
                None => println!("{:<6} {}", export.kind(), name),
            }
        }
        return Ok(());
    }

    let name = args.invoke.as_str();
    let func = match instance.export(name) {
        Some(Extern::Func(f)) => f.clone(),
        Some(other) => return Err(format!("export '{}' is a {}, not a func", name, other.kind()).into()),
        None => return Err(format!("module has no export named '{}'", name).into()),
    };

    let call_args = args.args.iter().map(|a| parse_value(a)).collect::<Result<Vec<_>, _>>()?;
    let params = &func.ty().params;
    if call_args.iter().map(Value::ty).ne(params.iter().copied()) {
        let given: Vec<ValType> = call_args.iter().map(Value::ty).collect();
        return Err(format!("'{}' takes [{}], got [{}]", name, describe(params), describe(&given)).into());
    }

    debug!("calling {} {}", name, func.ty());
    let results = if args.trace {
        let mut print_step = |depth: usize, pc: usize| println!("{:>4} {:>6}", depth, pc);
        func.call_traced(&call_args, &mut print_step)
    } else {
        func.call(&call_args)
    }
    .map_err(|e| format!("{} failed: {}", name, e))?;

    for value in &results {
        println!("{}", value);
    }
    Ok(())
}
