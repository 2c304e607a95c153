//! The error taxonomy for the interpreter.
//!
//! The language specification says every one of these "terminates the
//! process after printing a diagnostic" — but threading a `Result` through
//! the VM, compiler, and reader (rather than calling `abort()` the moment a
//! condition is detected) is what lets the rest of this crate be unit
//! tested. Only the REPL driver (`bone-repl`) turns an `Err` into the
//! spec-mandated process termination.

use bone_core::{TypeError, Value};
use thiserror::Error;

/// Why the reader rejected its input. See spec §4.6.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReaderError {
    #[error("unexpected closing parenthesis")]
    UnexpectedCloseParen,
    #[error("end of file inside of a str")]
    EofInString,
    #[error("end of file in list")]
    EofInList,
    #[error("end of file after backslash in str")]
    EofAfterBackslash,
    #[error("invalid character after backslash in str")]
    InvalidStringEscape,
    #[error("invalid improper list")]
    InvalidDottedPair,
    #[error("invalid character after #")]
    InvalidHashChar,
    #[error("empty body expression not allowed in lambda short form")]
    EmptyLambdaBody,
}

/// Every abort condition the interpreter can hit after the reader has
/// accepted its input.
#[derive(Debug, Error)]
pub enum BoneError {
    #[error(transparent)]
    Type(#[from] TypeError),

    #[error("unbound sym: {name}")]
    UnboundSym { name: String },

    #[error("wrong number of args: ({sub_name}{})", args_suffix(args))]
    WrongNumberOfArgs { sub_name: String, args: Vec<Value> },

    #[error("malformed special form: {0}")]
    MalformedForm(String),

    #[error("parse error: {0}")]
    Parse(#[from] ReaderError),

    #[error("unknown vm instruction: {0}")]
    UnknownInstruction(u8),
}

fn args_suffix(args: &[Value]) -> String {
    if args.is_empty() {
        String::new()
    } else {
        let mut s = String::new();
        for a in args {
            s.push(' ');
            s.push_str(&format!("{a:?}"));
        }
        s
    }
}

pub type BoneResult<T> = Result<T, BoneError>;
