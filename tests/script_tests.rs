use flatwasm::{Error, Extern, Func, FuncType, Imports, Instance, Memory, Table, ValType, Value, F32, F64};
use serde::Deserialize;
use std::{collections::HashMap, fs, path::Path, rc::Rc};

#[derive(Deserialize, Clone)]
struct ValueJSON {
    r#type: String,
    value: String,
}

#[derive(Deserialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Act {
    Get { module: Option<String>, field: String },
    Invoke { module: Option<String>, field: String, args: Vec<ValueJSON> },
}

#[allow(dead_code)]
#[derive(Deserialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TestCmd {
    Module { line: u32, name: Option<String>, hex: String },
    Register { line: u32, name: Option<String>, r#as: String },
    Action { line: u32, action: Act, expected: Option<Vec<ValueJSON>> },
    AssertReturn { line: u32, action: Act, expected: Vec<ValueJSON> },
    AssertTrap { line: u32, action: Act, text: String },
    AssertMalformed { line: u32, hex: String, text: String },
    AssertInvalid { line: u32, hex: String, text: String },
    AssertUnlinkable { line: u32, hex: String, text: String },
}

impl TestCmd {
    fn line(&self) -> u32 {
        match self {
            TestCmd::Module { line, .. }
            | TestCmd::Register { line, .. }
            | TestCmd::Action { line, .. }
            | TestCmd::AssertReturn { line, .. }
            | TestCmd::AssertTrap { line, .. }
            | TestCmd::AssertMalformed { line, .. }
            | TestCmd::AssertInvalid { line, .. }
            | TestCmd::AssertUnlinkable { line, .. } => *line,
        }
    }
}

#[allow(dead_code)]
#[derive(Deserialize)]
struct ScriptJSON {
    source_filename: String,
    commands: Vec<TestCmd>,
}

fn hex_bytes(hex: &str) -> Vec<u8> {
    let digits: Vec<u8> = hex.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    digits.chunks(2)
        .map(|pair| u8::from_str_radix(std::str::from_utf8(pair).unwrap(), 16).unwrap())
        .collect()
}

fn to_value(v: &ValueJSON) -> Value {
    let nan = v.value.starts_with("nan:");
    match v.r#type.as_str() {
        "i32" => Value::I32(v.value.parse::<u32>().unwrap() as i32),
        "i64" => Value::I64(v.value.parse::<u64>().unwrap() as i64),
        "f32" if nan => Value::F32(F32::canonical_nan()),
        "f32" => Value::F32(F32::from_bits(v.value.parse().unwrap())),
        "f64" if nan => Value::F64(F64::canonical_nan()),
        "f64" => Value::F64(F64::from_bits(v.value.parse().unwrap())),
        other => panic!("unknown value type: {}", other),
    }
}

fn spectest_imports() -> Imports {
    let print = |params: &[ValType]| Func::host(FuncType::new(params.to_vec(), Vec::new()), |_| Ok(vec![]));
    Imports::new()
        .define("spectest", "global_i32", Value::I32(666))
        .define("spectest", "global_i64", Value::I64(666))
        .define("spectest", "global_f32", Value::from(666.6f32))
        .define("spectest", "global_f64", Value::from(666.6f64))
        .define("spectest", "table", Table::new(10, Some(20)).unwrap())
        .define("spectest", "memory", Memory::new(1, Some(2)).unwrap())
        .define("spectest", "print", print(&[]))
        .define("spectest", "print_i32", print(&[ValType::I32]))
        .define("spectest", "print_i64", print(&[ValType::I64]))
        .define("spectest", "print_f32", print(&[ValType::F32]))
        .define("spectest", "print_f64", print(&[ValType::F64]))
        .define("spectest", "print_i32_f32", print(&[ValType::I32, ValType::F32]))
        .define("spectest", "print_f64_f64", print(&[ValType::F64, ValType::F64]))
}

fn exec_action(instances: &HashMap<String, Rc<Instance>>, action: &Act) -> Result<Vec<Value>, String> {
    let (module, field) = match action {
        Act::Get { module, field } | Act::Invoke { module, field, .. } => (module.as_deref().unwrap_or("default"), field),
    };
    let inst = instances.get(module).ok_or_else(|| format!("module '{}' not found", module))?;
    match action {
        Act::Get { .. } => match inst.export(field) {
            Some(Extern::Global(g)) => Ok(vec![g.get()]),
            _ => Err(format!("'{}' is not a global", field)),
        },
        Act::Invoke { args, .. } => {
            let args: Vec<Value> = args.iter().map(to_value).collect();
            inst.invoke(field, &args).map_err(|e| match e {
                Error::Trap(msg) => format!("trap: {}", msg),
                other => other.to_string(),
            })
        }
    }
}

fn check_results(results: &[Value], expected: &[ValueJSON]) -> Result<(), String> {
    if results.len() != expected.len() {
        return Err(format!("result count mismatch: expected {}, got {}", expected.len(), results.len()));
    }
    for (i, (result, exp)) in results.iter().zip(expected).enumerate() {
        let matches = match (result, exp.value.as_str()) {
            (Value::F32(f), "nan:canonical") => *f == F32::canonical_nan() || f.with_sign(false) == F32::canonical_nan(),
            (Value::F64(f), "nan:canonical") => *f == F64::canonical_nan() || f.with_sign(false) == F64::canonical_nan(),
            (Value::F32(f), "nan:arithmetic") => f.payload().is_some_and(|p| p & F32::CANONICAL_PAYLOAD != 0),
            (Value::F64(f), "nan:arithmetic") => f.payload().is_some_and(|p| p & F64::CANONICAL_PAYLOAD != 0),
            _ => *result == to_value(exp),
        };
        if !matches {
            return Err(format!("result[{}] mismatch: expected {}, got {}", i, exp.value, result));
        }
    }
    Ok(())
}

fn expect_message(kind: &str, got: Result<(), Error>, text: &str) -> Result<(), String> {
    match got {
        Err(Error::Compile(msg)) if kind == "compile" => message_matches(&msg, text),
        Err(Error::Link(msg)) if kind == "link" => message_matches(&msg, text),
        Err(e) => Err(format!("expected {} error '{}', got '{}'", kind, text, e)),
        Ok(()) => Err(format!("expected {} error '{}'", kind, text)),
    }
}

fn message_matches(msg: &str, text: &str) -> Result<(), String> {
    if msg == text || msg.starts_with(text) {
        Ok(())
    } else {
        Err(format!("message mismatch: expected '{}', got '{}'", text, msg))
    }
}

fn run_script(path: &Path) -> Result<(u32, u32), String> {
    let text = fs::read_to_string(path).map_err(|e| format!("failed to read json: {}", e))?;
    let script: ScriptJSON = serde_json::from_str(&text).map_err(|e| format!("failed to parse json: {}", e))?;

    let mut instances: HashMap<String, Rc<Instance>> = HashMap::new();
    let mut imports = spectest_imports();
    let (mut passes, mut failures) = (0u32, 0u32);

    for cmd in &script.commands {
        let result = match cmd {
            TestCmd::Module { name, hex, .. } => {
                flatwasm::instantiate(&hex_bytes(hex), &imports)
                    .map(|r| {
                        let inst = Rc::new(r.instance);
                        if let Some(n) = name {
                            instances.insert(n.clone(), inst.clone());
                        }
                        instances.insert("default".to_string(), inst);
                    })
                    .map_err(|e| format!("instantiate failed: {}", e))
            }
            TestCmd::Register { name, r#as, .. } => {
                let key = name.as_deref().unwrap_or("default");
                match instances.get(key) {
                    Some(inst) => {
                        imports.register(r#as, inst);
                        Ok(())
                    }
                    None => Err(format!("module '{}' not found", key)),
                }
            }
            TestCmd::Action { action, .. } => exec_action(&instances, action).map(|_| ()),
            TestCmd::AssertReturn { action, expected, .. } => {
                exec_action(&instances, action).and_then(|results| check_results(&results, expected))
            }
            TestCmd::AssertTrap { action, text, .. } => match exec_action(&instances, action) {
                Err(msg) => match msg.strip_prefix("trap: ") {
                    Some(msg) => message_matches(msg, text),
                    None => Err(format!("wrong error type, expected trap '{}': {}", text, msg)),
                },
                Ok(_) => Err(format!("expected trap: '{}'", text)),
            },
            TestCmd::AssertMalformed { hex, text, .. } | TestCmd::AssertInvalid { hex, text, .. } => {
                expect_message("compile", flatwasm::compile(&hex_bytes(hex)).map(|_| ()), text)
            }
            TestCmd::AssertUnlinkable { hex, text, .. } => match flatwasm::compile(&hex_bytes(hex)) {
                Ok(module) => {
                    let got = Instance::new(&Rc::new(module), &imports).map(|_| ());
                    expect_message("link", got, text)
                }
                Err(e) => Err(format!("failed to compile: {}", e)),
            },
        };

        match result {
            Ok(()) => passes += 1,
            Err(e) => {
                eprintln!("[{}:{}] {}", script.source_filename, cmd.line(), e);
                failures += 1;
            }
        }
    }
    Ok((passes, failures))
}

#[test]
fn run_script_tests() {
    let dir = Path::new("tests/scripts");
    let mut total_passes = 0u32;
    let mut total_failures = 0u32;

    let mut paths: Vec<_> = fs::read_dir(dir).expect("failed to read script directory")
        .map(|entry| entry.expect("failed to read entry").path())
        .filter(|path| path.extension().and_then(|s| s.to_str()) == Some("json"))
        .collect();
    paths.sort();
    assert!(!paths.is_empty(), "no scripts found in {:?}", dir);

    for path in paths {
        println!("Running {}", path.display());
        match run_script(&path) {
            Ok((passes, failures)) => {
                total_passes += passes;
                total_failures += failures;
                println!("  {} passed, {} failed", passes, failures);
            }
            Err(e) => {
                eprintln!("  Error: {}", e);
                total_failures += 1;
            }
        }
    }

    println!("\nTotal: {} passed, {} failed", total_passes, total_failures);
    assert_eq!(total_failures, 0, "{} script commands failed", total_failures);
}
