mod common;

use common::*;
use flatwasm::ast::{self, ElemSegment, ExportDesc, GlobalType, Import, ImportDesc, Instr, Limits};
use flatwasm::error::*;
use flatwasm::memory::{LoadOp, StoreOp};
use flatwasm::numeric::{IBinOp, NumOp};
use flatwasm::{Error, Executor, Extern, Func, Imports, ValType, Value};

#[test]
fn add_two_numbers() {
    let instance = build(add_module(), &Imports::new()).unwrap();
    assert_eq!(instance.invoke("add", &[Value::I32(2), Value::I32(3)]), Ok(vec![Value::I32(5)]));
    assert_eq!(instance.invoke("add", &[Value::I32(i32::MAX), Value::I32(1)]), Ok(vec![Value::I32(i32::MIN)]));
}

#[test]
fn host_argument_checks() {
    let instance = build(add_module(), &Imports::new()).unwrap();
    assert_eq!(instance.invoke("add", &[Value::I32(1)]), Err(Error::Type(INVALID_NUM_ARG)));
    assert_eq!(
        instance.invoke("add", &[Value::I64(1), Value::I32(2)]),
        Err(Error::Type(ARG_TYPE_MISMATCH))
    );
    assert_eq!(instance.invoke("sub", &[]), Err(Error::Type(UNKNOWN_EXPORT)));
}

fn memory_module() -> ast::Module {
    ast::Module {
        types: vec![
            sig(&[ValType::I32, ValType::I32], &[]),
            sig(&[ValType::I32], &[ValType::I32]),
            sig(&[], &[ValType::I32]),
        ],
        funcs: vec![
            func(0, &[], vec![get(0), get(1), Instr::Store(StoreOp::I32Store, mem(0))]),
            func(1, &[], vec![get(0), Instr::Load(LoadOp::I32Load, mem(0))]),
            func(1, &[], vec![get(0), Instr::Load(LoadOp::I32Load16U, mem(0))]),
            func(1, &[], vec![get(0), Instr::MemoryGrow]),
            func(2, &[], vec![Instr::MemorySize]),
            func(1, &[], vec![get(0), Instr::Load(LoadOp::I32Load8U, mem(-1))]),
            func(0, &[], vec![get(0), get(1), Instr::Store(StoreOp::I32Store, mem(0)), Instr::Unreachable]),
        ],
        memories: vec![Limits { min: 1, max: Some(2) }],
        exports: vec![
            export_func("store", 0),
            export_func("load", 1),
            export_func("load16_u", 2),
            export_func("grow", 3),
            export_func("size", 4),
            export_func("load_negative", 5),
            export_func("store_then_trap", 6),
            export("mem", ExportDesc::Memory(0)),
        ],
        ..Default::default()
    }
}

#[test]
fn store_then_load() {
    let instance = build(memory_module(), &Imports::new()).unwrap();
    instance.invoke("store", &[Value::I32(4), Value::I32(0x0102_0304)]).unwrap();
    assert_eq!(instance.invoke("load", &[Value::I32(4)]), Ok(vec![Value::I32(0x0102_0304)]));
    assert_eq!(instance.invoke("load16_u", &[Value::I32(4)]), Ok(vec![Value::I32(0x0304)]));

    let mem = instance.memory("mem").unwrap();
    assert_eq!(mem.borrow().read_bytes(4, 4).unwrap(), &[4, 3, 2, 1]);
}

#[test]
fn memory_traps() {
    let instance = build(memory_module(), &Imports::new()).unwrap();
    assert_eq!(instance.invoke("load", &[Value::I32(65533)]), Err(Error::Trap(OOB_MEMORY_ACCESS)));
    assert_eq!(instance.invoke("load", &[Value::I32(65532)]), Ok(vec![Value::I32(0)]));
    assert_eq!(instance.invoke("load_negative", &[Value::I32(0)]), Err(Error::Trap(OFFSET_NEGATIVE)));
}

#[test]
fn writes_before_a_trap_are_kept() {
    let instance = build(memory_module(), &Imports::new()).unwrap();
    let r = instance.invoke("store_then_trap", &[Value::I32(8), Value::I32(99)]);
    assert_eq!(r, Err(Error::Trap(UNREACHABLE)));
    assert_eq!(instance.invoke("load", &[Value::I32(8)]), Ok(vec![Value::I32(99)]));
}

#[test]
fn memory_grow_and_size() {
    let instance = build(memory_module(), &Imports::new()).unwrap();
    assert_eq!(instance.invoke("size", &[]), Ok(vec![Value::I32(1)]));
    assert_eq!(instance.invoke("grow", &[Value::I32(1)]), Ok(vec![Value::I32(1)]));
    assert_eq!(instance.invoke("grow", &[Value::I32(1)]), Ok(vec![Value::I32(-1)]));
    assert_eq!(instance.invoke("size", &[]), Ok(vec![Value::I32(2)]));
    assert_eq!(instance.invoke("load", &[Value::I32(65536)]), Ok(vec![Value::I32(0)]));
}

#[test]
fn recursive_fib() {
    let instance = build(fib_module(), &Imports::new()).unwrap();
    let fib = instance.func("fib").unwrap();
    let got: Vec<_> = (0..10).map(|n| fib.call(&[Value::I32(n)]).unwrap()[0]).collect();
    let want: Vec<_> = [0, 1, 1, 2, 3, 5, 8, 13, 21, 34].into_iter().map(Value::I32).collect();
    assert_eq!(got, want);
}

#[test]
fn loop_with_br_if() {
    // acc = 1; while n != 0 { acc *= n; n -= 1 }
    let body = vec![
        i64c(1), Instr::LocalSet(1),
        Instr::Block(ast::BlockType::Empty, vec![
            Instr::Loop(ast::BlockType::Empty, vec![
                get(0), Instr::Num(NumOp::I64Eqz), Instr::BrIf(1),
                get(1), get(0), i64bin(IBinOp::Mul), Instr::LocalSet(1),
                get(0), i64c(1), i64bin(IBinOp::Sub), Instr::LocalSet(0),
                Instr::Br(0),
            ]),
        ]),
        get(1),
    ];
    let module = ast::Module {
        types: vec![sig(&[ValType::I64], &[ValType::I64])],
        funcs: vec![func(0, &[ValType::I64], body)],
        exports: vec![export_func("fac", 0)],
        ..Default::default()
    };
    let instance = build(module, &Imports::new()).unwrap();
    assert_eq!(instance.invoke("fac", &[Value::I64(0)]), Ok(vec![Value::I64(1)]));
    assert_eq!(instance.invoke("fac", &[Value::I64(20)]), Ok(vec![Value::I64(2432902008176640000)]));
}

#[test]
fn branches_carry_block_results() {
    let br_value = vec![
        Instr::Block(result(ValType::I32), vec![i32c(1), i32c(2), Instr::Br(0), i32c(3)]),
    ];
    let early_return = vec![get(0), Instr::Br(0), i32c(99)];
    let if_without_else = vec![
        get(0),
        Instr::If(ast::BlockType::Empty, vec![i32c(7), Instr::LocalSet(0)], vec![]),
        get(0),
    ];
    let select = vec![i32c(10), i32c(20), get(0), Instr::Select];
    let tee = vec![get(0), i32c(1), i32bin(IBinOp::Add), Instr::LocalTee(1), get(1), i32bin(IBinOp::Mul)];
    let module = ast::Module {
        types: vec![sig(&[ValType::I32], &[ValType::I32])],
        funcs: vec![
            func(0, &[], br_value),
            func(0, &[], early_return),
            func(0, &[], if_without_else),
            func(0, &[], select),
            func(0, &[ValType::I32], tee),
        ],
        exports: vec![
            export_func("br_value", 0),
            export_func("early_return", 1),
            export_func("if_without_else", 2),
            export_func("select", 3),
            export_func("tee", 4),
        ],
        ..Default::default()
    };
    let instance = build(module, &Imports::new()).unwrap();
    let call = |name: &str, n: i32| instance.invoke(name, &[Value::I32(n)]).unwrap();
    assert_eq!(call("br_value", 0), vec![Value::I32(2)]);
    assert_eq!(call("early_return", 5), vec![Value::I32(5)]);
    assert_eq!(call("if_without_else", 0), vec![Value::I32(0)]);
    assert_eq!(call("if_without_else", 3), vec![Value::I32(7)]);
    assert_eq!(call("select", 1), vec![Value::I32(10)]);
    assert_eq!(call("select", 0), vec![Value::I32(20)]);
    assert_eq!(call("tee", 2), vec![Value::I32(9)]);
}

#[test]
fn br_table_dispatch() {
    let body = vec![
        Instr::Block(result(ValType::I32), vec![
            Instr::Block(ast::BlockType::Empty, vec![
                Instr::Block(ast::BlockType::Empty, vec![
                    i32c(30), get(0), Instr::BrTable(vec![0, 1], 2),
                ]),
                i32c(10), Instr::Br(1),
            ]),
            i32c(20),
        ]),
    ];
    let module = ast::Module {
        types: vec![sig(&[ValType::I32], &[ValType::I32])],
        funcs: vec![func(0, &[], body)],
        exports: vec![export_func("switch", 0)],
        ..Default::default()
    };
    let instance = build(module, &Imports::new()).unwrap();
    let switch = |n: i32| instance.invoke("switch", &[Value::I32(n)]).unwrap();
    assert_eq!(switch(0), vec![Value::I32(10)]);
    assert_eq!(switch(1), vec![Value::I32(20)]);
    assert_eq!(switch(2), vec![Value::I32(30)]);
    assert_eq!(switch(-1), vec![Value::I32(30)]);
}

fn indirect_module() -> ast::Module {
    ast::Module {
        types: vec![
            sig(&[], &[ValType::I32]),
            sig(&[], &[ValType::I64]),
            sig(&[ValType::I32], &[ValType::I32]),
        ],
        funcs: vec![
            func(0, &[], vec![i32c(42)]),
            func(1, &[], vec![i64c(7)]),
            func(2, &[], vec![get(0), Instr::CallIndirect(0)]),
        ],
        tables: vec![Limits { min: 3, max: None }],
        elems: vec![ElemSegment { table: 0, offset: ast::ConstExpr::I32(0), funcs: vec![0, 1] }],
        exports: vec![export_func("dispatch", 2), export("table", ExportDesc::Table(0))],
        ..Default::default()
    }
}

#[test]
fn call_indirect_checks() {
    let instance = build(indirect_module(), &Imports::new()).unwrap();
    let dispatch = |n: i32| instance.invoke("dispatch", &[Value::I32(n)]);
    assert_eq!(dispatch(0), Ok(vec![Value::I32(42)]));
    assert_eq!(dispatch(1), Err(Error::Trap(INDIRECT_CALL_MISMATCH)));
    assert_eq!(dispatch(2), Err(Error::Trap(UNINITIALIZED_ELEM)));
    assert_eq!(dispatch(3), Err(Error::Trap(UNDEF_ELEM)));
}

#[test]
fn call_indirect_through_host_written_slot() {
    let instance = build(indirect_module(), &Imports::new()).unwrap();
    let table = instance.table("table").unwrap();
    let host = Func::host(sig(&[], &[ValType::I32]), |_| Ok(vec![Value::I32(-5)]));
    table.borrow_mut().set(2, Some(host)).unwrap();
    assert_eq!(instance.invoke("dispatch", &[Value::I32(2)]), Ok(vec![Value::I32(-5)]));
}

fn host_module() -> ast::Module {
    ast::Module {
        types: vec![sig(&[ValType::I32], &[ValType::I32])],
        imports: vec![Import { module: "env".into(), field: "double".into(), desc: ImportDesc::Func(0) }],
        funcs: vec![func(0, &[], vec![get(0), Instr::Call(0), i32c(1), i32bin(IBinOp::Add)])],
        exports: vec![export_func("f", 1)],
        ..Default::default()
    }
}

#[test]
fn calls_into_host_functions() {
    let double = Func::host(sig(&[ValType::I32], &[ValType::I32]), |args| {
        Ok(vec![Value::I32(args[0].as_i32().unwrap_or(0) * 2)])
    });
    let instance = build(host_module(), &Imports::new().define("env", "double", double)).unwrap();
    assert_eq!(instance.invoke("f", &[Value::I32(5)]), Ok(vec![Value::I32(11)]));
}

#[test]
fn host_results_are_checked() {
    let liar = Func::host(sig(&[ValType::I32], &[ValType::I32]), |_| Ok(vec![Value::I64(1)]));
    let instance = build(host_module(), &Imports::new().define("env", "double", liar)).unwrap();
    assert_eq!(instance.invoke("f", &[Value::I32(5)]), Err(Error::Type(RESULT_TYPE_MISMATCH)));
}

#[test]
fn host_trap_unwinds() {
    let failing = Func::host(sig(&[ValType::I32], &[ValType::I32]), |_| Err(Error::trap(TRAPPED)));
    let instance = build(host_module(), &Imports::new().define("env", "double", failing)).unwrap();
    assert_eq!(instance.invoke("f", &[Value::I32(5)]), Err(Error::Trap(TRAPPED)));
}

#[test]
fn mutable_global_state_persists() {
    let inc = vec![
        Instr::GlobalGet(0), i32c(1), i32bin(IBinOp::Add), Instr::GlobalSet(0), Instr::GlobalGet(0),
    ];
    let module = ast::Module {
        types: vec![sig(&[], &[ValType::I32])],
        funcs: vec![func(0, &[], inc), func(0, &[], vec![Instr::GlobalGet(1)])],
        globals: vec![
            ast::Global { ty: GlobalType { ty: ValType::I32, mutable: true }, init: ast::ConstExpr::I32(0) },
            ast::Global { ty: GlobalType { ty: ValType::I32, mutable: false }, init: ast::ConstExpr::I32(42) },
        ],
        exports: vec![export_func("inc", 0), export_func("answer", 1), export("ANSWER", ExportDesc::Global(1))],
        ..Default::default()
    };
    let instance = build(module, &Imports::new()).unwrap();
    assert_eq!(instance.invoke("inc", &[]), Ok(vec![Value::I32(1)]));
    assert_eq!(instance.invoke("inc", &[]), Ok(vec![Value::I32(2)]));
    assert_eq!(instance.invoke("answer", &[]), Ok(vec![Value::I32(42)]));

    let global = instance.global("ANSWER").unwrap();
    assert_eq!(global.get(), Value::I32(42));
    assert_eq!(global.set(Value::I32(0)), Err(Error::Type(GLOBAL_IS_IMMUTABLE)));
    assert_eq!(instance.invoke("ANSWER", &[]), Err(Error::Type(NOT_A_FUNCTION)));
}

#[test]
fn unreachable_traps() {
    let module = ast::Module {
        types: vec![sig(&[], &[])],
        funcs: vec![func(0, &[], vec![Instr::Nop, Instr::Unreachable])],
        exports: vec![export_func("boom", 0)],
        ..Default::default()
    };
    let instance = build(module, &Imports::new()).unwrap();
    let err = instance.invoke("boom", &[]).unwrap_err();
    assert!(err.is_trap());
    assert_eq!(err.to_string(), "unreachable");
}

fn countdown_module() -> ast::Module {
    let body = vec![
        get(0), Instr::Num(NumOp::I32Eqz),
        Instr::If(
            result(ValType::I32),
            vec![i32c(0)],
            vec![get(0), i32c(1), i32bin(IBinOp::Sub), Instr::Call(0)],
        ),
    ];
    ast::Module {
        types: vec![sig(&[ValType::I32], &[ValType::I32])],
        funcs: vec![func(0, &[], body)],
        exports: vec![export_func("countdown", 0)],
        ..Default::default()
    }
}

#[test]
fn call_depth_is_bounded() {
    let instance = build(countdown_module(), &Imports::new()).unwrap();
    let f = instance.func("countdown").unwrap();
    assert_eq!(f.call(&[Value::I32(500)]), Ok(vec![Value::I32(0)]));
    assert_eq!(f.call(&[Value::I32(5000)]), Err(Error::Trap(STACK_EXHAUSTED)));

    let mut exec = Executor::new().with_max_depth(5);
    assert_eq!(exec.call(&f, &[Value::I32(3)]), Ok(vec![Value::I32(0)]));
    assert_eq!(exec.call(&f, &[Value::I32(10)]), Err(Error::Trap(STACK_EXHAUSTED)));
    // A trap leaves no frames behind, so the executor is reusable.
    assert_eq!(exec.depth(), 0);
    assert_eq!(exec.call(&f, &[Value::I32(4)]), Ok(vec![Value::I32(0)]));
}

#[test]
fn host_reentry_counts_toward_call_depth() {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    // dive(n) recurses n times, then calls env.reenter, which calls dive(400) again.
    let module = ast::Module {
        types: vec![sig(&[], &[]), sig(&[ValType::I32], &[])],
        imports: vec![Import { module: "env".into(), field: "reenter".into(), desc: ImportDesc::Func(0) }],
        funcs: vec![func(1, &[], vec![
            get(0),
            Instr::If(
                ast::BlockType::Empty,
                vec![get(0), i32c(1), i32bin(IBinOp::Sub), Instr::Call(1)],
                vec![Instr::Call(0)],
            ),
        ])],
        exports: vec![export_func("dive", 1)],
        ..Default::default()
    };
    let dive: Rc<RefCell<Option<Func>>> = Rc::new(RefCell::new(None));
    let entries = Rc::new(Cell::new(0));
    let reenter = {
        let (dive, entries) = (dive.clone(), entries.clone());
        Func::host(sig(&[], &[]), move |_| {
            entries.set(entries.get() + 1);
            let f = dive.borrow().clone().ok_or(Error::Trap(FUNC_NO_IMPL))?;
            f.call(&[Value::I32(400)])
        })
    };
    let instance = build(module, &Imports::new().define("env", "reenter", reenter)).unwrap();
    *dive.borrow_mut() = instance.func("dive");

    // 401 frames per descent: the third descent crosses the 1000 frame limit.
    assert_eq!(instance.invoke("dive", &[Value::I32(400)]), Err(Error::Trap(STACK_EXHAUSTED)));
    assert_eq!(entries.get(), 2);

    // The depth carried into host calls is restored once they return.
    let mut depths = Vec::new();
    let mut record = |depth: usize, _: usize| depths.push(depth);
    let countdown = build(countdown_module(), &Imports::new()).unwrap().func("countdown").unwrap();
    countdown.call_traced(&[Value::I32(0)], &mut record).unwrap();
    assert_eq!(depths.first(), Some(&1));
}

#[test]
fn tracing_does_not_change_results() {
    let instance = build(fib_module(), &Imports::new()).unwrap();
    let fib = instance.func("fib").unwrap();
    let plain = fib.call(&[Value::I32(12)]).unwrap();

    let mut steps: Vec<(usize, usize)> = Vec::new();
    let traced = fib.call_traced(&[Value::I32(12)], &mut |depth: usize, pc: usize| steps.push((depth, pc))).unwrap();

    assert_eq!(plain, traced);
    assert_eq!(traced, vec![Value::I32(144)]);
    assert_eq!(steps.first(), Some(&(1, 0)));
    assert!(steps.iter().any(|&(depth, _)| depth > 1));
    assert_eq!(steps.last().map(|&(depth, _)| depth), Some(1));
}

#[test]
fn functions_outliving_their_instance_trap() {
    let instance = build(add_module(), &Imports::new()).unwrap();
    let add = instance.func("add").unwrap();
    assert_eq!(add.call(&[Value::I32(1), Value::I32(1)]), Ok(vec![Value::I32(2)]));
    drop(instance);
    assert_eq!(add.call(&[Value::I32(1), Value::I32(1)]), Err(Error::Trap(FUNC_NO_IMPL)));
}

#[test]
fn exports_keep_declaration_order() {
    let instance = build(memory_module(), &Imports::new()).unwrap();
    let names: Vec<_> = instance.exports().map(|(name, _)| name).collect();
    assert_eq!(names, ["store", "load", "load16_u", "grow", "size", "load_negative", "store_then_trap", "mem"]);
    assert!(matches!(instance.export("mem"), Some(Extern::Memory(_))));
    assert_eq!(instance.export("mem").map(Extern::kind), Some("memory"));
}
