//! Reader, printer, and bytecode compiler: the text-facing half of the
//! interpreter, sitting on top of `bone-runtime`'s values, regions, and VM.

pub mod compiler;
pub mod printer;
pub mod reader;

pub use compiler::compile_toplevel;
pub use printer::print;
pub use reader::Reader;
