use crate::eval::{partial_eval, Input};
use crate::expr::{ExprRef, Tag};
use crate::heap::Heap;
use crate::Error;

/// `car l = l K`: a stream cons-cell applied to `K` selects its head.
pub fn car(heap: &mut Heap, list: ExprRef) -> Result<ExprRef, Error> {
    let k = heap.consts.k;
    heap.app(list, k)
}

/// `cdr l = l (K I)`: selects the tail.
pub fn cdr(heap: &mut Heap, list: ExprRef) -> Result<ExprRef, Error> {
    let ki = heap.consts.ki;
    heap.app(list, ki)
}

/// Converts a Church numeral to an integer by evaluating
/// `church Inc Num(0)`. The intermediate expression is held in its
/// reserved root slot while the evaluator runs.
pub fn church2int(heap: &mut Heap, input: &mut Input, church: ExprRef) -> Result<i32, Error> {
    heap.push_root(church);
    heap.check(2)?;
    let church = heap.pop_root();
    let inc = heap.consts.inc;
    let zero = heap.consts.zero;
    let applied = heap.alloc(Tag::A, church, inc);
    let expr = heap.alloc(Tag::A, applied, zero);
    heap.set_church2int_root(expr);
    let result = partial_eval(heap, input, expr)?;
    let n = heap[result].to_number();
    heap.clear_church2int_root();
    if n == -1 {
        Err(Error::NonNumberResult)
    } else {
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn empty_input() -> Input {
        Input::new(Box::new(io::empty()))
    }

    fn nil() -> ExprRef {
        ExprRef::NIL
    }

    /// `cons a b = S (S I (K a)) (K b)`, the encoding `LazyRead` expands
    /// into.
    fn cons(heap: &mut Heap, a: ExprRef, b: ExprRef) -> ExprRef {
        let ka = heap.alloc(Tag::K1, a, nil());
        let inner = heap.alloc(Tag::S2, heap.consts.i, ka);
        let kb = heap.alloc(Tag::K1, b, nil());
        heap.alloc(Tag::S2, inner, kb)
    }

    #[test]
    fn cached_numerals_convert_back() {
        let mut heap = Heap::with_capacity(4096).unwrap();
        let mut input = empty_input();
        for &n in &[0usize, 1, 2, 64, 255, 256] {
            let church = heap.church_char(n);
            assert_eq!(church2int(&mut heap, &mut input, church).unwrap(), n as i32);
        }
    }

    #[test]
    fn non_numeral_head_is_reported() {
        let mut heap = Heap::with_capacity(1024).unwrap();
        let k = heap.consts.k;
        let err = church2int(&mut heap, &mut empty_input(), k).unwrap_err();
        assert!(matches!(err, Error::NonNumberResult));
    }

    #[test]
    fn car_and_cdr_select_the_pair_fields() {
        let mut heap = Heap::with_capacity(4096).unwrap();
        let mut input = empty_input();
        let h = heap.church_char(72);
        let stop = heap.church_char(256);
        let i = heap.consts.i;
        let tail = cons(&mut heap, stop, i);
        let list = cons(&mut heap, h, tail);
        heap.set_toplevel(list);

        let head = car(&mut heap, list).unwrap();
        assert_eq!(church2int(&mut heap, &mut input, head).unwrap(), 72);

        let list = heap.toplevel();
        let rest = cdr(&mut heap, list).unwrap();
        heap.set_toplevel(rest);
        let rest = heap.toplevel();
        let head = car(&mut heap, rest).unwrap();
        assert_eq!(church2int(&mut heap, &mut input, head).unwrap(), 256);
    }
}
