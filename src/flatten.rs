use crate::ast::{FuncType, Function, Instr};
use crate::error::Error;
use crate::ir::{FlatFunc, Op};
use nohash_hasher::IntMap;

/// Lowers a structured function body into a flat op stream.
///
/// `if` becomes `BrUnless` over a then-block, followed by `Goto` past a
/// separate else-block when one exists. Calls to imported functions become
/// `CallExtern`, and the closing `end` of the body becomes `Return`.
pub fn flatten(func: &Function, ty: &FuncType, imported_funcs: u32) -> Result<FlatFunc, Error> {
    let mut f = Flattener { ops: Vec::new(), imported_funcs, patches: IntMap::default() };
    f.body(&func.body);
    f.emit(Op::Return);
    Ok(FlatFunc { ty: ty.clone(), locals: func.locals.clone(), code: f.finish()? })
}

struct Flattener {
    ops: Vec<Op>,
    imported_funcs: u32,
    /// Forward jump targets, keyed by the index of the op that needs them.
    patches: IntMap<usize, usize>,
}

impl Flattener {
    fn emit(&mut self, op: Op) -> usize {
        self.ops.push(op);
        self.ops.len() - 1
    }

    fn here(&self) -> usize { self.ops.len() }

    fn body(&mut self, instrs: &[Instr]) {
        for instr in instrs {
            self.instr(instr);
        }
    }

    fn block(&mut self, arity: u32, body: &[Instr]) {
        let start = self.emit(Op::Block { arity, end: 0 });
        self.body(body);
        let end = self.emit(Op::End);
        self.patches.insert(start, end);
    }

    fn instr(&mut self, instr: &Instr) {
        let op = match instr {
            Instr::Block(bt, body) => return self.block(bt.arity(), body),
            Instr::Loop(_, body) => {
                self.emit(Op::Loop);
                self.body(body);
                self.emit(Op::End);
                return;
            }
            Instr::If(bt, then, alternate) => {
                let br_unless = self.emit(Op::BrUnless(0));
                self.block(bt.arity(), then);
                if alternate.is_empty() {
                    let after = self.here();
                    self.patches.insert(br_unless, after);
                } else {
                    let goto = self.emit(Op::Goto(0));
                    let else_start = self.here();
                    self.patches.insert(br_unless, else_start);
                    self.block(bt.arity(), alternate);
                    let after = self.here();
                    self.patches.insert(goto, after);
                }
                return;
            }
            Instr::Unreachable => Op::Unreachable,
            Instr::Trap => Op::Trap,
            Instr::Nop => Op::Nop,
            Instr::Br(d) => Op::Br(*d),
            Instr::BrIf(d) => Op::BrIf(*d),
            Instr::BrTable(targets, default) => Op::BrTable {
                targets: targets.clone().into_boxed_slice(),
                default: *default,
            },
            Instr::Return => Op::Return,
            Instr::Call(idx) if *idx < self.imported_funcs => Op::CallExtern(*idx),
            Instr::Call(idx) => Op::Call(*idx),
            Instr::CallIndirect(ty) => Op::CallIndirect(*ty),
            Instr::Drop => Op::Drop,
            Instr::Select => Op::Select,
            Instr::LocalGet(i) => Op::LocalGet(*i),
            Instr::LocalSet(i) => Op::LocalSet(*i),
            Instr::LocalTee(i) => Op::LocalTee(*i),
            Instr::GlobalGet(i) => Op::GlobalGet(*i),
            Instr::GlobalSet(i) => Op::GlobalSet(*i),
            Instr::Load(op, arg) => Op::Load(*op, arg.offset),
            Instr::Store(op, arg) => Op::Store(*op, arg.offset),
            Instr::MemorySize => Op::MemorySize,
            Instr::MemoryGrow => Op::MemoryGrow,
            Instr::Const(v) => Op::Const(*v),
            Instr::Num(n) => Op::Num(*n),
        };
        self.emit(op);
    }

    fn finish(mut self) -> Result<Vec<Op>, Error> {
        for (at, target) in self.patches.drain() {
            match self.ops.get_mut(at) {
                Some(Op::Block { end, .. }) => *end = target,
                Some(Op::BrUnless(t)) | Some(Op::Goto(t)) => *t = target,
                other => return Err(Error::internal(format!("no jump to patch at {}: {:?}", at, other))),
            }
        }
        Ok(self.ops)
    }
}
