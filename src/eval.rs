use crate::expr::{ExprRef, Tag};
use crate::heap::Heap;
use crate::Error;

use derivative::Derivative;
use std::io::{self, Read};

const EOF_CHAR: usize = 256;

/// The not-yet-observed remainder of standard input. Each `LazyRead`
/// forcing consumes exactly one byte, in stream order.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Input {
    #[derivative(Debug = "ignore")]
    reader: Box<dyn Read>,
    reached_eof: bool,
}

impl Input {
    pub fn new(reader: Box<dyn Read>) -> Self {
        Input {
            reader,
            reached_eof: false,
        }
    }

    fn read_byte(&mut self) -> io::Result<usize> {
        if self.reached_eof {
            return Ok(EOF_CHAR);
        }
        let mut buf = [0];
        match self.reader.read(&mut buf)? {
            0 => {
                self.reached_eof = true;
                Ok(EOF_CHAR)
            }
            1 => Ok(buf[0] as usize),
            _ => unreachable!(),
        }
    }
}

/// Collapses a chain of `I1` indirections, rewriting the entry node to
/// point one hop from the end so later visitors skip the chain.
fn drop_i1(heap: &mut Heap, entry: ExprRef) -> ExprRef {
    let mut cur = entry;
    if heap[cur].tag == Tag::I1 {
        loop {
            cur = heap[cur].arg1;
            if heap[cur].tag != Tag::I1 {
                break;
            }
        }
        heap[entry].arg1 = cur;
    }
    cur
}

/// Reduces `node` to weak head normal form, destructively.
///
/// The left spine is chased without host recursion: each application's
/// `arg1` is borrowed as a back-link to its ancestor while descending,
/// and restored on the way back up. A collection can only happen inside
/// `apply_primitive`, which roots both the current application and the
/// reversed-spine head first.
pub fn partial_eval(heap: &mut Heap, input: &mut Input, node: ExprRef) -> Result<ExprRef, Error> {
    let mut prev = ExprRef::NIL;
    let mut cur = node;
    loop {
        cur = drop_i1(heap, cur);
        while heap[cur].tag == Tag::A {
            let next = {
                let lhs = heap[cur].arg1;
                drop_i1(heap, lhs)
            };
            heap[cur].arg1 = prev;
            prev = cur;
            cur = next;
        }
        if prev.is_nil() {
            break Ok(cur);
        }
        let next = cur;
        cur = prev;
        prev = heap[cur].arg1;
        heap[cur].arg1 = next;

        cur = apply_primitive(heap, input, cur, &mut prev)?;
    }
}

/// One primitive step on the application `e`, keyed on the tag of its
/// (already weak-head-normal) left child. Rewrites `e` in place so every
/// sharer observes the reduction.
fn apply_primitive(
    heap: &mut Heap,
    input: &mut Input,
    mut e: ExprRef,
    prev: &mut ExprRef,
) -> Result<ExprRef, Error> {
    let lhs = heap[e].arg1;
    let rhs = heap[e].arg2;
    let result = match heap[lhs].tag {
        Tag::I => {
            let node = &mut heap[e];
            node.tag = Tag::I1;
            node.arg1 = rhs;
            node.arg2 = ExprRef::NIL;
            rhs
        }
        Tag::K => {
            let node = &mut heap[e];
            node.tag = Tag::K1;
            node.arg1 = rhs;
            node.arg2 = ExprRef::NIL;
            e
        }
        Tag::K1 => {
            let kept = heap[lhs].arg1;
            let node = &mut heap[e];
            node.tag = Tag::I1;
            node.arg1 = kept;
            node.arg2 = ExprRef::NIL;
            kept
        }
        Tag::S => {
            let node = &mut heap[e];
            node.tag = Tag::S1;
            node.arg1 = rhs;
            node.arg2 = ExprRef::NIL;
            e
        }
        Tag::S1 => {
            let arg0 = heap[lhs].arg1;
            let node = &mut heap[e];
            node.tag = Tag::S2;
            node.arg1 = arg0;
            node.arg2 = rhs;
            e
        }
        Tag::LazyRead => {
            // 4 nodes for the cons-cell plus 2 for the S2 unfolding.
            heap.check_rooted(6, &mut e, prev)?;
            let lazy = heap[e].arg1;
            let church = heap.church_char(input.read_byte()?);
            let wrapped = heap.alloc(Tag::K1, church, ExprRef::NIL);
            let head = heap.alloc(Tag::S2, heap.consts.i, wrapped);
            let next = heap.alloc(Tag::LazyRead, ExprRef::NIL, ExprRef::NIL);
            let tail = heap.alloc(Tag::K1, next, ExprRef::NIL);
            let node = &mut heap[lazy];
            node.tag = Tag::S2;
            node.arg1 = head;
            node.arg2 = tail;
            unfold_s2(heap, e)
        }
        Tag::S2 => {
            heap.check_rooted(2, &mut e, prev)?;
            unfold_s2(heap, e)
        }
        Tag::Inc => {
            // The one place the right argument must be forced; root the
            // application and the reversed spine across the recursion.
            heap.push_root(e);
            heap.push_root(*prev);
            let forced = partial_eval(heap, input, rhs)?;
            *prev = heap.pop_root();
            e = heap.pop_root();

            let n = heap[forced].to_number().wrapping_add(1);
            if n == 0 {
                return Err(Error::IncOnNonNumber);
            }
            let node = &mut heap[e];
            node.tag = Tag::Num(n);
            node.arg1 = ExprRef::NIL;
            node.arg2 = ExprRef::NIL;
            e
        }
        Tag::Num(_) => return Err(Error::NumberApplied),
        tag => return Err(Error::Internal(format!("{:?}", tag))),
    };
    Ok(result)
}

/// `(S2 x y) z` becomes `(x z) (y z)` with the single `z` node shared.
/// Caller has already reserved the two nodes.
fn unfold_s2(heap: &mut Heap, e: ExprRef) -> ExprRef {
    let lhs = heap[e].arg1;
    let rhs = heap[e].arg2;
    let x = heap[lhs].arg1;
    let fst = heap.alloc(Tag::A, x, rhs);
    let y = heap[lhs].arg2;
    let snd = heap.alloc(Tag::A, y, rhs);
    let node = &mut heap[e];
    node.arg1 = fst;
    node.arg2 = snd;
    e
}
