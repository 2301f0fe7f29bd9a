mod encode;
mod eval;
mod expr;
mod heap;
mod parse;

use encode::{car, cdr, church2int};
use eval::Input;
use expr::{ExprRef, Tag};
use heap::Heap;

use std::error;
use std::fmt::{self, Display, Formatter};
use std::io::{self, prelude::*};

pub use parse::{parse, ParseError};

/// Nodes per semispace; matches the reference's 64 MiB spaces.
pub const DEFAULT_HEAP_NODES: usize = 2 * 1024 * 1024;

#[derive(Clone, Debug, Default)]
pub struct Program(parse::Ast);

impl Program {
    /// Unix-pipe composition: the result feeds this program's output
    /// stream through `next`.
    pub fn pipe(self, next: Program) -> Program {
        use parse::Ast;
        Program(Ast::S.apply(Ast::K.apply(next.0)).apply(self.0))
    }
}

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    IncOnNonNumber,
    NumberApplied,
    NonNumberResult,
    OutOfMemory,
    Internal(String),
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Io(_) => 1,
            Error::IncOnNonNumber | Error::NumberApplied | Error::NonNumberResult => 3,
            Error::OutOfMemory | Error::Internal(_) => 4,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "{}", err),
            Error::IncOnNonNumber => f.write_str(
                "Runtime error: invalid output format (attempted to apply inc to a non-number)",
            ),
            Error::NumberApplied => {
                f.write_str("Runtime error: invalid output format (attempted to apply a number)")
            }
            Error::NonNumberResult => {
                f.write_str("Runtime error: invalid output format (result was not a number)")
            }
            Error::OutOfMemory => f.write_str("out of memory!"),
            Error::Internal(tag) => {
                write!(f, "INTERNAL ERROR: invalid type in apply_primitive ({})", tag)
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

/// Applies `prog` to the byte stream behind `reader` and drains the
/// resulting stream into `writer`, one Church numeral at a time, until a
/// head of 256 or more ends the run. The returned value is the process
/// exit code (`head - 256`).
pub fn run<W>(
    reader: Box<dyn Read>,
    mut writer: W,
    prog: Program,
    heap_nodes: usize,
) -> Result<i32, Error>
where
    W: Write,
{
    let mut heap = Heap::with_capacity(heap_nodes)?;
    let mut input = Input::new(reader);

    let program = heap.build(&prog.0)?;
    heap.push_root(program);
    heap.check(2)?;
    let program = heap.pop_root();
    let stream = heap.alloc(Tag::LazyRead, ExprRef::NIL, ExprRef::NIL);
    let toplevel = heap.alloc(Tag::A, program, stream);
    heap.set_toplevel(toplevel);

    loop {
        let list = heap.toplevel();
        let head = car(&mut heap, list)?;
        let ch = church2int(&mut heap, &mut input, head)?;
        if ch >= 256 {
            break Ok(ch - 256);
        }
        writer.write_all(&[ch as u8])?;
        writer.flush()?;
        let list = heap.toplevel();
        let tail = cdr(&mut heap, list)?;
        heap.set_toplevel(tail);
    }
}
