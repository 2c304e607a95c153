//! The compiler: walks one s-expression and appends bytecode to a growable
//! instruction buffer, which is only copied into the permanent region once
//! a whole top-level form (or lambda body) is done — `bone.c`'s
//! `precons`-into-place scratch buffer, replaced by an ordinary `Vec`.
//!
//! Handles `quote` and application (per the distilled instruction table)
//! plus `if`, `lambda`, and `with`, the forms the opcode set anticipates
//! but the original compiler never got around to lowering.

use bone_core::{Tag, Value};
use bone_runtime::code::{self, CodeObject, Opcode};
use bone_runtime::copy::copy_back;
use bone_runtime::error::{BoneError, BoneResult};
use bone_runtime::interpreter::Interpreter;
use bone_runtime::pair::{car, cdr, list_to_vec};
use bone_runtime::sub::{self, Arity};
use bone_runtime::symbol::name_of;

/// Where a lexically-bound name's value lives at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    /// A sub's own parameter (fixed or the collected rest list).
    Arg(u32),
    /// A captured free variable, read from the closure's environment.
    Env(u32),
    /// A `with`-bound local.
    Local(u32),
}

type LexEnv = Vec<(Value, Binding)>;

/// Per-function scratch state: the constant pool and local-slot counter
/// for the `CodeObject` currently being assembled. Kept separate from the
/// instruction buffer itself so `if`'s branches can be compiled into their
/// own temporary buffers (to measure their length before emitting the
/// enclosing jumps) while still sharing one pool of constants and locals.
struct FnBuild {
    consts: Vec<Value>,
    next_local: u32,
}

impl FnBuild {
    fn new() -> FnBuild {
        FnBuild { consts: Vec::new(), next_local: 0 }
    }
}

/// Compile one top-level form into a zero-argument sub, ready to be
/// invoked with an empty argument list.
pub fn compile_toplevel(interp: &mut Interpreter, expr: Value) -> BoneResult<Value> {
    let mut build = FnBuild::new();
    let mut out = Vec::new();
    let env: LexEnv = Vec::new();
    compile_expr(&mut out, &mut build, interp, expr, &env, true)?;
    out.push(Opcode::Ret);
    let code = CodeObject {
        instructions: out,
        consts: build.consts,
        local_count: build.next_local,
        arity: Arity::Exact(0),
        name: None,
    };
    let code_value = code::to_value(code);
    Ok(sub::make_compiled(&mut interp.regions, Arity::Exact(0), code_value, Value::NIL))
}

/// Embed `value` as a constant: copied into the permanent region first (a
/// `CodeObject`'s const pool outlives whatever region `value` happened to
/// be built in), then appended, returning its index.
fn const_index(build: &mut FnBuild, interp: &mut Interpreter, value: Value) -> u32 {
    let permanent = interp.regions.permanent();
    let copied = copy_back(&mut interp.regions, permanent, value);
    build.consts.push(copied);
    (build.consts.len() - 1) as u32
}

fn compile_expr(
    out: &mut Vec<Opcode>,
    build: &mut FnBuild,
    interp: &mut Interpreter,
    expr: Value,
    env: &LexEnv,
    tail: bool,
) -> BoneResult<()> {
    match expr.tag_of() {
        Tag::Sym => compile_symbol_ref(out, build, interp, expr, env),
        Tag::Cons if !expr.is_nil() => compile_list_form(out, build, interp, expr, env, tail),
        _ => {
            let idx = const_index(build, interp, expr);
            out.push(Opcode::Const(idx));
            Ok(())
        }
    }
}

fn compile_symbol_ref(
    out: &mut Vec<Opcode>,
    build: &mut FnBuild,
    interp: &mut Interpreter,
    sym: Value,
    env: &LexEnv,
) -> BoneResult<()> {
    if let Some((_, binding)) = env.iter().rev().find(|(s, _)| *s == sym) {
        out.push(match binding {
            Binding::Arg(i) => Opcode::GetArg(*i),
            Binding::Env(i) => Opcode::GetEnv(*i),
            Binding::Local(i) => Opcode::GetLocal(*i),
        });
        return Ok(());
    }
    if let Some(value) = interp.bindings.lookup(sym) {
        let idx = const_index(build, interp, value);
        out.push(Opcode::Const(idx));
        return Ok(());
    }
    Err(BoneError::UnboundSym {
        name: name_of(sym).unwrap_or_else(|_| "?".to_string()),
    })
}

fn compile_list_form(
    out: &mut Vec<Opcode>,
    build: &mut FnBuild,
    interp: &mut Interpreter,
    expr: Value,
    env: &LexEnv,
    tail: bool,
) -> BoneResult<()> {
    let head = car(expr).expect("Cons-tagged, non-nil value has a car");
    if let Some(name) = head.is_tagged(Tag::Sym).then(|| name_of(head).ok()).flatten() {
        match name.as_str() {
            "quote" => return compile_quote(out, build, interp, expr),
            "if" => return compile_if(out, build, interp, expr, env, tail),
            "lambda" => return compile_lambda(out, build, interp, expr, env),
            "with" => return compile_with(out, build, interp, expr, env, tail),
            _ => {}
        }
    }
    let args = list_to_vec(cdr(expr).expect("Cons-tagged, non-nil value has a cdr"))
        .map_err(|_| BoneError::MalformedForm("improper application form".to_string()))?;
    compile_application(out, build, interp, head, &args, env, tail)
}

fn compile_quote(out: &mut Vec<Opcode>, build: &mut FnBuild, interp: &mut Interpreter, expr: Value) -> BoneResult<()> {
    let items = list_to_vec(expr).map_err(|_| BoneError::MalformedForm("quote".to_string()))?;
    if items.len() != 2 {
        return Err(BoneError::MalformedForm("(quote x)".to_string()));
    }
    let idx = const_index(build, interp, items[1]);
    out.push(Opcode::Const(idx));
    Ok(())
}

fn compile_if(
    out: &mut Vec<Opcode>,
    build: &mut FnBuild,
    interp: &mut Interpreter,
    expr: Value,
    env: &LexEnv,
    tail: bool,
) -> BoneResult<()> {
    let items = list_to_vec(expr).map_err(|_| BoneError::MalformedForm("if".to_string()))?;
    if items.len() != 4 {
        return Err(BoneError::MalformedForm("(if cond then else)".to_string()));
    }
    compile_expr(out, build, interp, items[1], env, false)?;
    let mut else_buf = Vec::new();
    compile_expr(&mut else_buf, build, interp, items[3], env, tail)?;
    let mut then_buf = Vec::new();
    compile_expr(&mut then_buf, build, interp, items[2], env, tail)?;
    // `JmpIf` lands exactly past the else branch and its trailing `Jmp`;
    // falling through (cond was `#f`) runs the else branch, which then
    // jumps past the then branch.
    out.push(Opcode::JmpIf(else_buf.len() as i32 + 1));
    out.extend(else_buf);
    out.push(Opcode::Jmp(then_buf.len() as i32));
    out.extend(then_buf);
    Ok(())
}

fn compile_with(
    out: &mut Vec<Opcode>,
    build: &mut FnBuild,
    interp: &mut Interpreter,
    expr: Value,
    env: &LexEnv,
    tail: bool,
) -> BoneResult<()> {
    let items = list_to_vec(expr).map_err(|_| BoneError::MalformedForm("with".to_string()))?;
    if items.len() < 2 {
        return Err(BoneError::MalformedForm("(with (name val ...) body...)".to_string()));
    }
    let pairs = list_to_vec(items[1]).map_err(|_| BoneError::MalformedForm("with bindings".to_string()))?;
    if pairs.len() % 2 != 0 {
        return Err(BoneError::MalformedForm("with bindings must come in name/value pairs".to_string()));
    }
    let mut inner_env = env.clone();
    let mut i = 0;
    while i < pairs.len() {
        let name = pairs[i];
        let value_expr = pairs[i + 1];
        compile_expr(out, build, interp, value_expr, &inner_env, false)?;
        let slot = build.next_local;
        build.next_local += 1;
        out.push(Opcode::SetLocal(slot));
        inner_env.push((name, Binding::Local(slot)));
        i += 2;
    }
    compile_body_seq(out, build, interp, &items[2..], &inner_env, tail)
}

/// A sequence of expressions evaluated for their side effects except the
/// last, whose value (and tail-position status) is the sequence's own.
fn compile_body_seq(
    out: &mut Vec<Opcode>,
    build: &mut FnBuild,
    interp: &mut Interpreter,
    exprs: &[Value],
    env: &LexEnv,
    tail: bool,
) -> BoneResult<()> {
    if exprs.is_empty() {
        let idx = const_index(build, interp, Value::NIL);
        out.push(Opcode::Const(idx));
        return Ok(());
    }
    let last = exprs.len() - 1;
    for (i, e) in exprs.iter().enumerate() {
        compile_expr(out, build, interp, *e, env, tail && i == last)?;
    }
    Ok(())
}

fn compile_application(
    out: &mut Vec<Opcode>,
    build: &mut FnBuild,
    interp: &mut Interpreter,
    callee: Value,
    args: &[Value],
    env: &LexEnv,
    tail: bool,
) -> BoneResult<()> {
    out.push(Opcode::PrepareCall);
    compile_expr(out, build, interp, callee, env, false)?;
    out.push(Opcode::AddArg);
    for a in args {
        compile_expr(out, build, interp, *a, env, false)?;
        out.push(Opcode::AddArg);
    }
    out.push(if tail { Opcode::TailCall } else { Opcode::Call });
    Ok(())
}

/// `(lambda params body)`, and the reader's `|params body` short form
/// which desugars to the same shape. Captures every free variable the
/// body references that resolves to an enclosing `Arg`/`Env`/`Local`
/// binding, closing over it by value at the point the closure is built.
fn compile_lambda(out: &mut Vec<Opcode>, build: &mut FnBuild, interp: &mut Interpreter, expr: Value, outer_env: &LexEnv) -> BoneResult<()> {
    let items = list_to_vec(expr).map_err(|_| BoneError::MalformedForm("lambda".to_string()))?;
    if items.len() != 3 {
        return Err(BoneError::MalformedForm("(lambda params body)".to_string()));
    }
    let (fixed, rest) = parse_params(items[1])?;
    let body = items[2];

    let mut own_shadow = fixed.clone();
    if let Some(r) = rest {
        own_shadow.push(r);
    }
    let mut free = Vec::new();
    collect_free(body, &own_shadow, &mut free);
    let mut captured = Vec::new();
    for sym in &free {
        if outer_env.iter().any(|(s, _)| s == sym) && !captured.contains(sym) {
            captured.push(*sym);
        }
    }

    out.push(Opcode::PrepareSub);
    for sym in &captured {
        compile_symbol_ref(out, build, interp, *sym, outer_env)?;
        out.push(Opcode::AddEnv);
    }

    let mut inner_env: LexEnv = Vec::new();
    for (i, sym) in fixed.iter().enumerate() {
        inner_env.push((*sym, Binding::Arg(i as u32)));
    }
    if let Some(r) = rest {
        inner_env.push((r, Binding::Arg(fixed.len() as u32)));
    }
    for (j, sym) in captured.iter().enumerate() {
        inner_env.push((*sym, Binding::Env(j as u32)));
    }

    let mut inner_build = FnBuild::new();
    let mut inner_out = Vec::new();
    compile_expr(&mut inner_out, &mut inner_build, interp, body, &inner_env, true)?;
    inner_out.push(Opcode::Ret);

    let arity = match rest {
        Some(_) => Arity::AtLeast(fixed.len() as u32),
        None => Arity::Exact(fixed.len() as u32),
    };
    let code = CodeObject {
        instructions: inner_out,
        consts: inner_build.consts,
        local_count: inner_build.next_local,
        arity,
        name: None,
    };
    let code_value = code::to_value(code);
    let idx = const_index(build, interp, code_value);
    out.push(Opcode::MakeSub(idx));
    Ok(())
}

/// `(a b)` -> `([a, b], None)`; `(a . rest)` -> `([a], Some(rest))`; a
/// bare symbol -> `([], Some(sym))` (fully variadic, no fixed params).
fn parse_params(mut params: Value) -> BoneResult<(Vec<Value>, Option<Value>)> {
    if params.is_tagged(Tag::Sym) {
        return Ok((Vec::new(), Some(params)));
    }
    let mut fixed = Vec::new();
    loop {
        if params.is_nil() {
            return Ok((fixed, None));
        }
        if !params.is_tagged(Tag::Cons) {
            if !params.is_tagged(Tag::Sym) {
                return Err(BoneError::MalformedForm("lambda rest parameter must be a symbol".to_string()));
            }
            return Ok((fixed, Some(params)));
        }
        let head = car(params).expect("Cons-tagged value has a car");
        if !head.is_tagged(Tag::Sym) {
            return Err(BoneError::MalformedForm("lambda parameters must be symbols".to_string()));
        }
        fixed.push(head);
        params = cdr(params).expect("Cons-tagged value has a cdr");
    }
}

/// Collect every symbol `body` references that is not bound by `body`
/// itself (as a lambda parameter or `with`-local introduced along the
/// way), in first-encountered order. `quote`d data is skipped entirely;
/// the head symbols of recognized special forms are not themselves
/// treated as references.
fn collect_free(expr: Value, shadow: &[Value], out: &mut Vec<Value>) {
    if expr.is_tagged(Tag::Sym) {
        if !shadow.contains(&expr) && !out.contains(&expr) {
            out.push(expr);
        }
        return;
    }
    if !expr.is_tagged(Tag::Cons) || expr.is_nil() {
        return;
    }
    if let Ok(head) = car(expr) {
        if head.is_tagged(Tag::Sym) {
            if let Ok(name) = name_of(head) {
                match name.as_str() {
                    "quote" => return,
                    "if" => {
                        if let Ok(items) = list_to_vec(expr) {
                            if items.len() == 4 {
                                for e in &items[1..4] {
                                    collect_free(*e, shadow, out);
                                }
                                return;
                            }
                        }
                    }
                    "lambda" => {
                        if let Ok(items) = list_to_vec(expr) {
                            if items.len() == 3 {
                                let mut inner_shadow = shadow.to_vec();
                                collect_param_syms(items[1], &mut inner_shadow);
                                collect_free(items[2], &inner_shadow, out);
                                return;
                            }
                        }
                    }
                    "with" => {
                        if let Ok(items) = list_to_vec(expr) {
                            if items.len() >= 2 {
                                let mut inner_shadow = shadow.to_vec();
                                if let Ok(pairs) = list_to_vec(items[1]) {
                                    let mut i = 0;
                                    while i + 1 < pairs.len() {
                                        collect_free(pairs[i + 1], &inner_shadow, out);
                                        inner_shadow.push(pairs[i]);
                                        i += 2;
                                    }
                                }
                                for body_e in &items[2..] {
                                    collect_free(*body_e, &inner_shadow, out);
                                }
                                return;
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }
    let mut x = expr;
    loop {
        match car(x) {
            Ok(h) => {
                collect_free(h, shadow, out);
                match cdr(x) {
                    Ok(next) if next.is_tagged(Tag::Cons) && !next.is_nil() => x = next,
                    Ok(next) if next.is_nil() => break,
                    Ok(next) => {
                        collect_free(next, shadow, out);
                        break;
                    }
                    Err(_) => break,
                }
            }
            Err(_) => break,
        }
    }
}

fn collect_param_syms(params: Value, out: &mut Vec<Value>) {
    if params.is_tagged(Tag::Sym) {
        out.push(params);
        return;
    }
    let mut x = params;
    loop {
        if x.is_nil() {
            break;
        }
        if !x.is_tagged(Tag::Cons) {
            out.push(x);
            break;
        }
        out.push(car(x).expect("Cons-tagged value has a car"));
        x = cdr(x).expect("Cons-tagged value has a cdr");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Reader;
    use bone_runtime::vm;

    fn run(src: &str) -> BoneResult<Value> {
        let mut interp = Interpreter::with_stdlib();
        let mut reader = Reader::new(src);
        let expr = reader.read(&mut interp.regions, &mut interp.symbols).unwrap();
        let sub = compile_toplevel(&mut interp, expr)?;
        vm::call(&mut interp, sub, &[])
    }

    #[test]
    fn self_evaluating_literal_compiles_to_itself() {
        assert_eq!(run("42").unwrap(), Value::of_int(42));
    }

    #[test]
    fn quote_returns_its_argument_unevaluated() {
        let v = run("'(1 2)").unwrap();
        assert_eq!(bone_runtime::pair::list_to_vec(v).unwrap(), vec![Value::of_int(1), Value::of_int(2)]);
    }

    #[test]
    fn application_calls_a_primitive() {
        assert_eq!(run("(+ 1 2)").unwrap(), Value::of_int(3));
    }

    #[test]
    fn unbound_symbol_is_a_compile_error() {
        assert!(run("never-bound-anywhere").is_err());
    }

    #[test]
    fn if_picks_the_then_branch_when_truthy() {
        assert_eq!(run("(if #t 1 2)").unwrap(), Value::of_int(1));
    }

    #[test]
    fn if_picks_the_else_branch_when_falsy() {
        assert_eq!(run("(if #f 1 2)").unwrap(), Value::of_int(2));
    }

    #[test]
    fn lambda_applies_to_its_argument() {
        assert_eq!(run("((lambda (x) (+ x 1)) 41)").unwrap(), Value::of_int(42));
    }

    #[test]
    fn lambda_short_form_also_compiles() {
        assert_eq!(run("(|x (+ x 1) 41)").unwrap(), Value::of_int(42));
    }

    #[test]
    fn lambda_closes_over_an_enclosing_parameter() {
        // (lambda (x) (lambda (y) (+ x y))) applied to 1 then 2.
        assert_eq!(run("(((lambda (x) (lambda (y) (+ x y))) 1) 2)").unwrap(), Value::of_int(3));
    }

    #[test]
    fn with_binds_sequential_locals() {
        assert_eq!(run("(with (a 1 b 2) (+ a b))").unwrap(), Value::of_int(3));
    }

    #[test]
    fn with_locals_can_reference_earlier_bindings() {
        assert_eq!(run("(with (a 1 b (+ a 1)) b)").unwrap(), Value::of_int(2));
    }

    #[test]
    fn variadic_lambda_collects_rest_args_into_a_list() {
        let v = run("((lambda (a . rest) rest) 1 2 3)").unwrap();
        assert_eq!(bone_runtime::pair::list_to_vec(v).unwrap(), vec![Value::of_int(2), Value::of_int(3)]);
    }

    #[test]
    fn self_application_tail_recursion_does_not_overflow_the_call_stack() {
        // Global `def` resolves free symbols at compile time, so a lambda
        // cannot reference its own future binding; the usual workaround is
        // to pass the lambda itself in as an argument. `self` here is an
        // ordinary parameter, not a global, so it compiles to `GetArg` with
        // no forward-reference problem. `TailCall` keeps this at constant
        // call-stack depth regardless of `n`.
        let src = "((lambda (f) (f f 100000)) \
                     (lambda (self n) (if (eq? n 0) 'done (self self (- n 1)))))";
        let result = run(src).unwrap();
        assert!(result.is_tagged(Tag::Sym));
        assert_eq!(bone_runtime::symbol::name_of(result).unwrap(), "done");
    }
}
