use crate::error::*;
use crate::func::{Func, FuncInst};
use crate::instance::ModuleInstance;
use crate::ir::{FlatFunc, Op};
use crate::memory::Memory;
use crate::numeric::{self, pop_i32, underflow};
use crate::value::Value;
use log::trace;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Observer notified after every executed instruction with the call depth
/// (1 for the outermost frame, including frames suspended in host calls) and
/// the instruction offset within its function.
pub trait Tracer {
    fn on_instruction(&mut self, depth: usize, pc: usize);
}

impl<F: FnMut(usize, usize)> Tracer for F {
    fn on_instruction(&mut self, depth: usize, pc: usize) { self(depth, pc) }
}

/// An open block or loop: where a branch to it resumes, how many values it
/// carries and the operand stack height when it was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label {
    pub target: usize,
    pub arity: usize,
    pub height: usize,
}

/// Per-call state.
pub struct Frame {
    code: Rc<FlatFunc>,
    module: Rc<ModuleInstance>,
    pc: usize,
    locals: Vec<Value>,
    values: Vec<Value>,
    labels: Vec<Label>,
}

enum Control {
    Next,
    Call(Func),
    Return,
}

impl Frame {
    fn new(code: Rc<FlatFunc>, module: Rc<ModuleInstance>, mut locals: Vec<Value>) -> Self {
        locals.extend(code.locals.iter().map(|&ty| Value::default_for(ty)));
        Self { code, module, pc: 0, locals, values: Vec::new(), labels: Vec::new() }
    }

    fn arity(&self) -> usize { self.code.ty.results.len() }

    /// Unwinds to the label `depth` levels out, keeping its result values on
    /// top of the stack. Branching past the outermost label returns.
    fn branch(&mut self, depth: u32) -> Result<Control, Error> {
        let depth = depth as usize;
        if depth >= self.labels.len() { return Ok(Control::Return); }
        let idx = self.labels.len() - 1 - depth;
        let label = self.labels[idx];
        let keep_from = self.values.len().saturating_sub(label.arity);
        if keep_from < label.height { return Err(underflow(label.height + label.arity, self.values.len())); }
        self.values.drain(label.height..keep_from);
        self.labels.truncate(idx);
        self.pc = label.target;
        Ok(Control::Next)
    }

    /// Values returned by this frame, taken from the top of its stack.
    fn take_results(&mut self) -> Result<Vec<Value>, Error> {
        let arity = self.arity();
        if self.values.len() < arity { return Err(underflow(arity, self.values.len())); }
        Ok(self.values.split_off(self.values.len() - arity))
    }

    fn memory(&self) -> Result<&Rc<RefCell<Memory>>, Error> {
        self.module.memories.first().ok_or_else(|| Error::internal(UNKNOWN_MEMORY))
    }

    #[inline]
    fn pop(&mut self) -> Result<Value, Error> {
        self.values.pop().ok_or_else(|| underflow(1, 0))
    }

    fn local(&self, idx: u32) -> Result<Value, Error> {
        self.locals.get(idx as usize).copied().ok_or_else(|| Error::internal(UNKNOWN_LOCAL))
    }

    fn set_local(&mut self, idx: u32, v: Value) -> Result<(), Error> {
        let slot = self.locals.get_mut(idx as usize).ok_or_else(|| Error::internal(UNKNOWN_LOCAL))?;
        *slot = v;
        Ok(())
    }

    fn step(&mut self, pc: usize, op: &Op) -> Result<Control, Error> {
        match op {
            Op::Unreachable => return trap(UNREACHABLE),
            Op::Trap => return trap(TRAPPED),
            Op::Nop => {}
            Op::Block { arity, end } => {
                let height = self.values.len();
                self.labels.push(Label { target: end + 1, arity: *arity as usize, height });
            }
            Op::Loop => {
                let height = self.values.len();
                self.labels.push(Label { target: pc, arity: 0, height });
            }
            Op::End => {
                self.labels.pop().ok_or_else(|| Error::internal("end without an open label"))?;
            }
            Op::BrUnless(target) => {
                if pop_i32(&mut self.values)? == 0 { self.pc = *target; }
            }
            Op::Goto(target) => self.pc = *target,
            Op::Br(depth) => return self.branch(*depth),
            Op::BrIf(depth) => {
                if pop_i32(&mut self.values)? != 0 { return self.branch(*depth); }
            }
            Op::BrTable { targets, default } => {
                let idx = pop_i32(&mut self.values)? as u32 as usize;
                return self.branch(targets.get(idx).copied().unwrap_or(*default));
            }
            Op::Return => return Ok(Control::Return),
            Op::Call(idx) | Op::CallExtern(idx) => {
                let func = self.module.funcs.get(*idx as usize).ok_or_else(|| Error::internal(UNKNOWN_FUNC))?;
                return Ok(Control::Call(func.clone()));
            }
            Op::CallIndirect(type_idx) => {
                let expected = self.module.module.types().get(*type_idx as usize)
                    .ok_or_else(|| Error::internal(UNKNOWN_TYPE))?;
                let idx = pop_i32(&mut self.values)? as u32;
                let table = self.module.tables.first().ok_or(Error::Trap(UNDEF_ELEM))?.borrow();
                if idx >= table.size() { return trap(UNDEF_ELEM); }
                let func = table.get(idx).ok_or(Error::Trap(UNINITIALIZED_ELEM))?;
                if func.ty() != expected { return trap(INDIRECT_CALL_MISMATCH); }
                return Ok(Control::Call(func));
            }
            Op::Drop => { self.pop()?; }
            Op::Select => {
                let cond = pop_i32(&mut self.values)?;
                let b = self.pop()?;
                let a = self.pop()?;
                self.values.push(if cond != 0 { a } else { b });
            }
            Op::LocalGet(idx) => {
                let v = self.local(*idx)?;
                self.values.push(v);
            }
            Op::LocalSet(idx) => {
                let v = self.pop()?;
                self.set_local(*idx, v)?;
            }
            Op::LocalTee(idx) => {
                let v = *self.values.last().ok_or_else(|| underflow(1, 0))?;
                self.set_local(*idx, v)?;
            }
            Op::GlobalGet(idx) => {
                let global = self.module.globals.get(*idx as usize).ok_or_else(|| Error::internal(UNKNOWN_GLOBAL))?;
                self.values.push(global.get());
            }
            Op::GlobalSet(idx) => {
                let v = self.pop()?;
                let global = self.module.globals.get(*idx as usize).ok_or_else(|| Error::internal(UNKNOWN_GLOBAL))?;
                global.set_unchecked(v);
            }
            Op::Load(load, offset) => {
                let addr = pop_i32(&mut self.values)? as u32;
                let v = self.memory()?.borrow().load(*load, addr, *offset)?;
                self.values.push(v);
            }
            Op::Store(store, offset) => {
                let v = self.pop()?;
                let addr = pop_i32(&mut self.values)? as u32;
                self.memory()?.borrow_mut().store(*store, addr, *offset, v)?;
            }
            Op::MemorySize => {
                let pages = self.memory()?.borrow().size();
                self.values.push(Value::I32(pages as i32));
            }
            Op::MemoryGrow => {
                let delta = pop_i32(&mut self.values)? as u32;
                let old = self.memory()?.borrow_mut().grow(delta);
                self.values.push(Value::I32(old.map_or(-1, |p| p as i32)));
            }
            Op::Const(v) => self.values.push(*v),
            Op::Num(n) => numeric::execute(*n, &mut self.values)?,
        }
        Ok(Control::Next)
    }
}

thread_local! {
    /// Frames open in executors that are waiting on a host call. An executor
    /// created from inside a host function starts counting from here.
    static HOST_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Runs function bodies as a program-counter loop over their flat code, with
/// an explicit stack of frames in place of host recursion.
pub struct Executor<'t> {
    outer: usize,
    frames: Vec<Frame>,
    tracer: Option<&'t mut dyn Tracer>,
    max_depth: usize,
}

impl Default for Executor<'_> {
    fn default() -> Self { Self::new() }
}

impl<'t> Executor<'t> {
    pub const DEFAULT_MAX_DEPTH: usize = 1000;

    pub fn new() -> Self {
        Self {
            outer: HOST_DEPTH.with(Cell::get),
            frames: Vec::new(),
            tracer: None,
            max_depth: Self::DEFAULT_MAX_DEPTH,
        }
    }

    /// Maximum number of nested frames before trapping with `call stack exhausted`.
    /// Frames of executors suspended in a host call count towards the limit.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_tracer(mut self, tracer: &'t mut dyn Tracer) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn depth(&self) -> usize { self.outer + self.frames.len() }

    /// Calls `func` with host-supplied arguments, checked against its signature.
    /// A trap unwinds every frame opened by this call.
    pub fn call(&mut self, func: &Func, args: &[Value]) -> Result<Vec<Value>, Error> {
        let ty = func.ty();
        if args.len() != ty.params.len() { return Err(Error::Type(INVALID_NUM_ARG)); }
        if args.iter().zip(&ty.params).any(|(a, t)| a.ty() != *t) {
            return Err(Error::Type(ARG_TYPE_MISMATCH));
        }
        trace!("call {} with {} args", ty, args.len());

        let base = self.frames.len();
        let result = match func.inner() {
            FuncInst::Host { .. } => call_host(func, args, self.depth()),
            FuncInst::Wasm { code, module } => {
                let module = module.upgrade().ok_or(Error::Trap(FUNC_NO_IMPL))?;
                self.push_frame(code.clone(), module, args.to_vec())?;
                self.run(base)
            }
        };
        if let Err(e) = &result {
            trace!("call {} failed: {}", ty, e);
            self.frames.truncate(base);
        }
        result
    }

    fn push_frame(&mut self, code: Rc<FlatFunc>, module: Rc<ModuleInstance>, args: Vec<Value>) -> Result<(), Error> {
        if self.depth() >= self.max_depth { return trap(STACK_EXHAUSTED); }
        self.frames.push(Frame::new(code, module, args));
        Ok(())
    }

    /// Executes until the frame at index `base` returns.
    fn run(&mut self, base: usize) -> Result<Vec<Value>, Error> {
        'frames: loop {
            let code = match self.frames.last() {
                Some(frame) => frame.code.clone(),
                None => return Err(Error::internal("no active frame")),
            };
            loop {
                let depth = self.depth();
                let frame = self.frames.last_mut().ok_or_else(|| Error::internal("no active frame"))?;
                let pc = frame.pc;
                let op = code.code.get(pc).ok_or_else(|| Error::internal(format!("pc {} past end of code", pc)))?;
                frame.pc += 1;

                #[cfg(feature = "wasm_debug")]
                trace!("{:>4} {:>6}  {:?}", depth, pc, op);

                let control = frame.step(pc, op)?;
                if let Some(tracer) = self.tracer.as_mut() {
                    tracer.on_instruction(depth, pc);
                }

                match control {
                    Control::Next => {}
                    Control::Call(func) => {
                        let depth = self.depth();
                        let n = func.ty().params.len();
                        let frame = self.frames.last_mut().ok_or_else(|| Error::internal("no active frame"))?;
                        if frame.values.len() < n { return Err(underflow(n, frame.values.len())); }
                        let args = frame.values.split_off(frame.values.len() - n);
                        match func.inner() {
                            FuncInst::Host { .. } => {
                                let results = call_host(&func, &args, depth)?;
                                frame.values.extend(results);
                            }
                            FuncInst::Wasm { code, module } => {
                                let module = module.upgrade().ok_or(Error::Trap(FUNC_NO_IMPL))?;
                                self.push_frame(code.clone(), module, args)?;
                                continue 'frames;
                            }
                        }
                    }
                    Control::Return => {
                        let mut done = self.frames.pop().ok_or_else(|| Error::internal("no active frame"))?;
                        let results = done.take_results()?;
                        if self.frames.len() <= base { return Ok(results); }
                        if let Some(caller) = self.frames.last_mut() {
                            caller.values.extend(results);
                        }
                        continue 'frames;
                    }
                }
            }
        }
    }
}

/// Invokes a host function and checks what it returns against its signature.
/// `depth` frames stay open while the callback runs.
fn call_host(func: &Func, args: &[Value], depth: usize) -> Result<Vec<Value>, Error> {
    let FuncInst::Host { ty, callback } = func.inner() else {
        return Err(Error::internal("not a host function"));
    };
    let outer = HOST_DEPTH.with(|d| d.replace(depth));
    let results = callback(args);
    HOST_DEPTH.with(|d| d.set(outer));
    let results = results?;
    if results.len() != ty.results.len() || results.iter().zip(&ty.results).any(|(v, t)| v.ty() != *t) {
        return Err(Error::Type(RESULT_TYPE_MISMATCH));
    }
    Ok(results)
}
