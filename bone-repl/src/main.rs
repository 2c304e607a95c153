//! `bone`: the interactive top-level loop.
//!
//! Reads one form at a time, compiles it to a zero-argument sub, runs it,
//! and prints `last_value` — the same three-step loop `bone.c`'s own
//! `bone_repl` runs, just with a prompt that survives `Ctrl-D`/parse errors
//! instead of calling `abort()` straight out of the reader.

use bone_compiler::{Reader, compile_toplevel, print};
use bone_runtime::{BoneError, Interpreter, ReaderError};
use clap::Parser;
use rustyline::error::ReadlineError;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bone")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Bone Lisp", long_about = None)]
struct Cli {
    /// A script to read and evaluate, form by form, before dropping into
    /// the interactive prompt. `#!`-shebang headers are skipped by the
    /// reader, so a script may be run directly as `./foo.bn`.
    script: Option<PathBuf>,

    /// Evaluate the script and exit instead of continuing into the prompt.
    #[arg(long)]
    no_repl: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bone=warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut interp = Interpreter::with_stdlib();
    let mut line = 0u32;

    if let Some(path) = &cli.script {
        let source = std::fs::read_to_string(path).unwrap_or_else(|e| {
            eprintln!("bone: cannot read {}: {}", path.display(), e);
            std::process::exit(1);
        });
        let mut reader = Reader::new(&source);
        loop {
            match reader.read(&mut interp.regions, &mut interp.symbols) {
                Ok(v) if v == bone_core::Value::EOF => break,
                Ok(form) => eval_and_print(&mut interp, form, &mut line),
                Err(e) => abort(&format!("parse error: {e}")),
            }
        }
        if cli.no_repl {
            return;
        }
    }

    run_interactive(&mut interp, &mut line);
}

/// Compile one form and run it, printing `last_value` and advancing the
/// prompt's form counter. A `BoneError` here is fatal: every abort
/// condition in `spec.md` §7 ends the process after a diagnostic.
fn eval_and_print(interp: &mut Interpreter, form: bone_core::Value, line: &mut u32) {
    *line += 1;
    let result = compile_toplevel(interp, form).and_then(|sub| bone_runtime::vm::call(interp, sub, &[]));
    match result {
        Ok(v) => {
            interp.last_value = v;
            println!("{}", print(interp, v));
        }
        Err(e) => abort_with(e),
    }
}

fn run_interactive(interp: &mut Interpreter, line: &mut u32) {
    let history_path = history_file();
    let mut editor = rustyline::DefaultEditor::new().unwrap_or_else(|e| {
        eprintln!("bone: failed to start line editor: {e}");
        std::process::exit(1);
    });
    if let Some(path) = &history_path {
        let _ = editor.load_history(path);
    }

    loop {
        let mut buf = match read_one_line(&mut editor, &format!("@{}: ", line)) {
            Some(s) => s,
            None => break,
        };
        let _ = editor.add_history_entry(&buf);

        // A form left open across the line (an unclosed `(` or `"`) isn't a
        // parse error yet, just incomplete — keep pulling lines with a
        // continuation prompt until the reader either finishes a form or
        // hits a genuine syntax error. Re-lexing the whole accumulated
        // buffer from scratch on every attempt is simplest, so `evaluated`
        // tracks how many of its leading forms already ran, since re-lexing
        // reproduces the same prefix every time.
        let mut evaluated = 0usize;
        loop {
            let mut reader = Reader::new(&buf);
            let mut forms = Vec::new();
            let outcome = loop {
                match reader.read(&mut interp.regions, &mut interp.symbols) {
                    Ok(v) if v == bone_core::Value::EOF => break Ok(()),
                    Ok(form) => forms.push(form),
                    Err(e @ (ReaderError::EofInList | ReaderError::EofInString | ReaderError::EofAfterBackslash)) => {
                        break Err(e)
                    }
                    Err(e) => abort(&format!("parse error: {e}")),
                }
            };
            for form in &forms[evaluated..] {
                eval_and_print(interp, *form, line);
            }
            evaluated = forms.len();
            match outcome {
                Ok(()) => break,
                Err(_) => match read_one_line(&mut editor, "... ") {
                    Some(more) => {
                        buf.push('\n');
                        buf.push_str(&more);
                    }
                    None => abort("unexpected end of input"),
                },
            }
        }
    }

    if let Some(path) = &history_path {
        let _ = editor.save_history(path);
    }
}

/// One line from the editor, or `None` at `Ctrl-D`/`Ctrl-C` — both of which
/// end the session rather than abort it, since neither signals malformed
/// input.
fn read_one_line(editor: &mut rustyline::DefaultEditor, prompt: &str) -> Option<String> {
    match editor.readline(prompt) {
        Ok(line) => Some(line),
        Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => None,
        Err(e) => abort(&format!("input error: {e}")),
    }
}

/// `~/.local/share/bone/history` (or the platform equivalent), created on
/// demand; `None` if the platform has no data directory, in which case the
/// session simply runs without persisted history.
fn history_file() -> Option<PathBuf> {
    let dir = dirs::data_dir()?.join("bone");
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir.join("history"))
}

fn abort_with(e: BoneError) -> ! {
    tracing::error!(error = %e, "aborting");
    eprintln!("bone: {e}");
    std::process::exit(1);
}

fn abort(message: &str) -> ! {
    tracing::error!(message, "aborting");
    eprintln!("bone: {message}");
    std::process::exit(1);
}
