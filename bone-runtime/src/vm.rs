//! The bytecode virtual machine: a fetch-execute loop over [`Opcode`]s with
//! explicit tail-call optimization.
//!
//! Calls are assembled in two phases, mirroring the compiler's own
//! staged-evaluation order (callee and arguments are themselves
//! expressions that may push and call): `PrepareCall` opens a staging
//! frame, each `AddArg` moves one operand-stack value (the callee first,
//! then its arguments in order) into that frame, and `Call`/`TailCall`
//! consumes the finished frame to perform the invocation. `TailCall`
//! reuses the current call frame in place instead of pushing a new one,
//! so a self- or mutually-recursive tail loop runs in constant call-stack
//! space.

use crate::code::{CodeObject, Opcode};
use crate::error::{BoneError, BoneResult};
use crate::interpreter::Interpreter;
use crate::pair::list_from_slice;
use crate::sub::{self, Arity, Body};
use bone_core::Value;

pub const CALL_STACK_CAPACITY: usize = 256;
pub const UPCOMING_CALL_STACK_CAPACITY: usize = 256;

struct Frame {
    code: &'static CodeObject,
    pc: usize,
    args: Vec<Value>,
    env: Vec<Value>,
    locals: Vec<Value>,
    operand_stack: Vec<Value>,
}

impl Frame {
    fn new(code: &'static CodeObject, args: Vec<Value>, env: Vec<Value>) -> Frame {
        Frame {
            code,
            pc: 0,
            args,
            env,
            locals: vec![Value::NIL; code.local_count as usize],
            operand_stack: Vec::new(),
        }
    }
}

/// Bundle the args a closure call supplies into the parameter slots its
/// code expects, collecting any surplus into a trailing list when the
/// target is variadic.
fn bind_args(regions: &mut crate::region::RegionAllocator, arity: Arity, args: &[Value]) -> Vec<Value> {
    match arity {
        Arity::Exact(_) => args.to_vec(),
        Arity::AtLeast(n) => {
            let n = n as usize;
            let mut bound: Vec<Value> = args[..n].to_vec();
            let rest = list_from_slice(regions, &args[n..]);
            bound.push(rest);
            bound
        }
    }
}

/// Invoke `callee` (a `Sub` value) with `args`, running compiled code
/// through the bytecode loop or dispatching straight to a primitive
/// function.
pub fn call(interp: &mut Interpreter, callee: Value, args: &[Value]) -> BoneResult<Value> {
    let arity = sub::arity_of(callee)?;
    if !arity.accepts(args.len()) {
        return Err(BoneError::WrongNumberOfArgs {
            sub_name: interp.describe_sub(callee),
            args: args.to_vec(),
        });
    }
    let bound = bind_args(&mut interp.regions, arity, args);
    match sub::body_of(callee)? {
        Body::Primitive { index } => interp.call_primitive(index, &bound),
        Body::Compiled { code, env } => {
            let code = crate::code::of_value(code)?;
            let env_vec = crate::pair::list_to_vec(env)?;
            run(interp, code, bound, env_vec)
        }
    }
}

fn run(
    interp: &mut Interpreter,
    code: &'static CodeObject,
    args: Vec<Value>,
    env: Vec<Value>,
) -> BoneResult<Value> {
    let mut frames: Vec<Frame> = vec![Frame::new(code, args, env)];
    // Each entry staged by `PrepareCall`/`PrepareSub` holds, in order, the
    // operand-stack values handed to it by `AddArg`/`AddEnv`: for a call,
    // element 0 is the callee and the rest are its arguments.
    let mut upcoming_calls: Vec<Vec<Value>> = Vec::new();
    let mut upcoming_envs: Vec<Vec<Value>> = Vec::new();

    loop {
        let op = {
            let frame = frames.last().expect("run() never empties its own frame stack");
            frame.code.instructions[frame.pc]
        };
        let frame = frames.last_mut().unwrap();
        frame.pc += 1;

        match op {
            Opcode::Const(i) => {
                let v = frame.code.consts[i as usize];
                frame.operand_stack.push(v);
            }
            Opcode::GetEnv(i) => {
                let v = frame.env[i as usize];
                frame.operand_stack.push(v);
            }
            Opcode::GetArg(i) => {
                let v = frame.args[i as usize];
                frame.operand_stack.push(v);
            }
            Opcode::SetLocal(i) => {
                let v = frame.operand_stack.pop().expect("SetLocal needs an operand");
                frame.locals[i as usize] = v;
            }
            Opcode::GetLocal(i) => {
                let v = frame.locals[i as usize];
                frame.operand_stack.push(v);
            }
            Opcode::PrepareCall => {
                assert!(
                    upcoming_calls.len() < UPCOMING_CALL_STACK_CAPACITY,
                    "upcoming-call stack overflow"
                );
                upcoming_calls.push(Vec::new());
            }
            Opcode::AddArg => {
                let v = frame.operand_stack.pop().expect("AddArg needs an operand");
                upcoming_calls
                    .last_mut()
                    .expect("AddArg without a PrepareCall")
                    .push(v);
            }
            Opcode::Call => {
                let parts = upcoming_calls.pop().expect("Call without a PrepareCall");
                let (callee, call_args) = split_call(&parts);
                match dispatch(interp, callee, call_args)? {
                    Dispatched::Value(v) => {
                        frames.last_mut().unwrap().operand_stack.push(v);
                    }
                    Dispatched::Enter(new_code, new_args, new_env) => {
                        assert!(frames.len() < CALL_STACK_CAPACITY, "call stack overflow");
                        frames.push(Frame::new(new_code, new_args, new_env));
                    }
                }
            }
            Opcode::TailCall => {
                let parts = upcoming_calls.pop().expect("TailCall without a PrepareCall");
                let (callee, call_args) = split_call(&parts);
                match dispatch(interp, callee, call_args)? {
                    Dispatched::Value(v) => {
                        if let Some(done) = pop_and_deliver(&mut frames, v) {
                            return Ok(done);
                        }
                    }
                    Dispatched::Enter(new_code, new_args, new_env) => {
                        let top = frames.last_mut().unwrap();
                        *top = Frame::new(new_code, new_args, new_env);
                    }
                }
            }
            Opcode::Jmp(offset) => {
                frame.pc = (frame.pc as i64 + offset as i64) as usize;
            }
            Opcode::JmpIf(offset) => {
                let cond = frame.operand_stack.pop().expect("JmpIf needs an operand");
                if cond.is_truthy() {
                    let frame = frames.last_mut().unwrap();
                    frame.pc = (frame.pc as i64 + offset as i64) as usize;
                }
            }
            Opcode::Ret => {
                let v = frame
                    .operand_stack
                    .pop()
                    .expect("Ret needs a return value on the operand stack");
                if let Some(done) = pop_and_deliver(&mut frames, v) {
                    return Ok(done);
                }
            }
            Opcode::PrepareSub => {
                upcoming_envs.push(Vec::new());
            }
            Opcode::AddEnv => {
                let v = frame.operand_stack.pop().expect("AddEnv needs an operand");
                upcoming_envs
                    .last_mut()
                    .expect("AddEnv without a PrepareSub")
                    .push(v);
            }
            Opcode::MakeSub(const_index) => {
                let nested = frame.code.consts[const_index as usize];
                let captured = upcoming_envs.pop().expect("MakeSub without a PrepareSub");
                let nested_code = crate::code::of_value(nested)?;
                let env_list = list_from_slice(&mut interp.regions, &captured);
                let closure =
                    crate::sub::make_compiled(&mut interp.regions, nested_code.arity, nested, env_list);
                frames.last_mut().unwrap().operand_stack.push(closure);
            }
        }
    }
}

fn split_call(parts: &[Value]) -> (Value, &[Value]) {
    (parts[0], &parts[1..])
}

enum Dispatched {
    Value(Value),
    Enter(&'static CodeObject, Vec<Value>, Vec<Value>),
}

/// Resolve a callee to either an immediately-available value (primitives)
/// or the ingredients of a new/reused frame (compiled subs), checking
/// arity along the way.
fn dispatch(interp: &mut Interpreter, callee: Value, args: &[Value]) -> BoneResult<Dispatched> {
    let arity = sub::arity_of(callee)?;
    if !arity.accepts(args.len()) {
        return Err(BoneError::WrongNumberOfArgs {
            sub_name: interp.describe_sub(callee),
            args: args.to_vec(),
        });
    }
    let bound = bind_args(&mut interp.regions, arity, args);
    match sub::body_of(callee)? {
        Body::Primitive { index } => Ok(Dispatched::Value(interp.call_primitive(index, &bound)?)),
        Body::Compiled { code, env } => {
            let code = crate::code::of_value(code)?;
            let env_vec = crate::pair::list_to_vec(env)?;
            Ok(Dispatched::Enter(code, bound, env_vec))
        }
    }
}

/// Pop the finished top frame and hand its return value to whatever is
/// left: the new top frame's operand stack, or (if that was the last
/// frame) back to the caller of `run`.
fn pop_and_deliver(frames: &mut Vec<Frame>, value: Value) -> Option<Value> {
    frames.pop();
    match frames.last_mut() {
        Some(caller) => {
            caller.operand_stack.push(value);
            None
        }
        None => Some(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::to_value;
    use crate::sub::make_compiled;

    #[test]
    fn const_then_ret_returns_the_constant() {
        let mut interp = Interpreter::new();
        let code_value = to_value(CodeObject {
            instructions: vec![Opcode::Const(0), Opcode::Ret],
            consts: vec![Value::of_int(41)],
            local_count: 0,
            arity: Arity::Exact(0),
            name: None,
        });
        let sub = make_compiled(&mut interp.regions, Arity::Exact(0), code_value, Value::NIL);
        let result = call(&mut interp, sub, &[]).unwrap();
        assert_eq!(result, Value::of_int(41));
    }

    #[test]
    fn get_arg_returns_the_argument() {
        let mut interp = Interpreter::new();
        let code_value = to_value(CodeObject {
            instructions: vec![Opcode::GetArg(0), Opcode::Ret],
            consts: vec![],
            local_count: 0,
            arity: Arity::Exact(1),
            name: None,
        });
        let sub = make_compiled(&mut interp.regions, Arity::Exact(1), code_value, Value::NIL);
        let result = call(&mut interp, sub, &[Value::of_int(7)]).unwrap();
        assert_eq!(result, Value::of_int(7));
    }

    #[test]
    fn wrong_arity_is_an_error() {
        let mut interp = Interpreter::new();
        let code_value = to_value(CodeObject {
            instructions: vec![Opcode::Ret],
            consts: vec![],
            local_count: 0,
            arity: Arity::Exact(1),
            name: None,
        });
        let sub = make_compiled(&mut interp.regions, Arity::Exact(1), code_value, Value::NIL);
        assert!(call(&mut interp, sub, &[]).is_err());
    }

    #[test]
    fn tail_call_to_another_sub_reuses_the_frame() {
        // inner(x) = x ; outer(x) = tailcall inner(x)
        let mut interp = Interpreter::new();
        let inner_value = to_value(CodeObject {
            instructions: vec![Opcode::GetArg(0), Opcode::Ret],
            consts: vec![],
            local_count: 0,
            arity: Arity::Exact(1),
            name: Some("inner".to_string()),
        });
        let inner = make_compiled(&mut interp.regions, Arity::Exact(1), inner_value, Value::NIL);

        let outer_value = to_value(CodeObject {
            instructions: vec![
                Opcode::PrepareCall,
                Opcode::Const(0), // the inner sub itself
                Opcode::AddArg,
                Opcode::GetArg(0),
                Opcode::AddArg,
                Opcode::TailCall,
            ],
            consts: vec![inner],
            local_count: 0,
            arity: Arity::Exact(1),
            name: Some("outer".to_string()),
        });
        let outer = make_compiled(&mut interp.regions, Arity::Exact(1), outer_value, Value::NIL);

        let result = call(&mut interp, outer, &[Value::of_int(99)]).unwrap();
        assert_eq!(result, Value::of_int(99));
    }

    #[test]
    fn tail_call_to_a_primitive_delivers_its_result() {
        let mut interp = Interpreter::new();
        let id_index = interp.primitives.register(Arity::Exact(1), |_interp, args| Ok(args[0]));
        let id_sub = crate::sub::make_primitive(&mut interp.regions, Arity::Exact(1), id_index);

        let code_value = to_value(CodeObject {
            instructions: vec![
                Opcode::PrepareCall,
                Opcode::Const(0),
                Opcode::AddArg,
                Opcode::GetArg(0),
                Opcode::AddArg,
                Opcode::TailCall,
            ],
            consts: vec![id_sub],
            local_count: 0,
            arity: Arity::Exact(1),
            name: None,
        });
        let sub = make_compiled(&mut interp.regions, Arity::Exact(1), code_value, Value::NIL);
        let result = call(&mut interp, sub, &[Value::of_int(5)]).unwrap();
        assert_eq!(result, Value::of_int(5));
    }
}
