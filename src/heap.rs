use crate::expr::{ExprRef, Node, Tag};
use crate::parse::Ast;
use crate::Error;

use std::mem;
use std::ops::{Index, IndexMut};

// Two roots are reserved for the toplevel stream and the in-progress
// church2int conversion; the rest is a stack, two entries per nested
// Inc forcing. Reduction only nests as deep as the largest number
// emitted, so this leaves ample headroom.
const MAX_ROOTS: usize = 10_000;
const TOPLEVEL_ROOT: usize = 0;
const CHURCH2INT_ROOT: usize = 1;

/// Combinator singletons, allocated once at startup and treated as
/// permanent roots. `sksk` is the Church successor; the remaining
/// composites exist for the iota expansion and the numeral cache.
pub struct Consts {
    pub k: ExprRef,
    pub s: ExprRef,
    pub i: ExprRef,
    pub ki: ExprRef,
    pub si: ExprRef,
    pub ks: ExprRef,
    pub kk: ExprRef,
    pub sksk: ExprRef,
    pub siks: ExprRef,
    pub iota: ExprRef,
    pub inc: ExprRef,
    pub zero: ExprRef,
}

impl Consts {
    const UNSET: Consts = Consts {
        k: ExprRef::NIL,
        s: ExprRef::NIL,
        i: ExprRef::NIL,
        ki: ExprRef::NIL,
        si: ExprRef::NIL,
        ks: ExprRef::NIL,
        kk: ExprRef::NIL,
        sksk: ExprRef::NIL,
        siks: ExprRef::NIL,
        iota: ExprRef::NIL,
        inc: ExprRef::NIL,
        zero: ExprRef::NIL,
    };
}

/// Semispace arena. `from` is live; `to` is reserved for the next
/// collection. Allocation bumps `next_alloc`; callers guarantee capacity
/// beforehand with `check`/`check_rooted`.
pub struct Heap {
    from: Box<[Node]>,
    to: Box<[Node]>,
    next_alloc: usize,
    roots: Vec<ExprRef>,
    church_chars: [ExprRef; 257],
    pub consts: Consts,
}

// Startup allocations: the singletons plus the cache entries not shared
// with them. A heap that cannot hold these is exhausted before it runs.
const STARTUP_NODES: usize = 12 + 255;

impl Heap {
    pub fn with_capacity(nodes: usize) -> Result<Heap, Error> {
        if nodes < STARTUP_NODES {
            return Err(Error::OutOfMemory);
        }
        let mut roots = Vec::with_capacity(MAX_ROOTS);
        roots.push(ExprRef::NIL);
        roots.push(ExprRef::NIL);
        let mut heap = Heap {
            from: vec![Node::default(); nodes].into_boxed_slice(),
            to: vec![Node::default(); nodes].into_boxed_slice(),
            next_alloc: 0,
            roots,
            church_chars: [ExprRef::NIL; 257],
            consts: Consts::UNSET,
        };

        let k = heap.alloc(Tag::K, ExprRef::NIL, ExprRef::NIL);
        let s = heap.alloc(Tag::S, ExprRef::NIL, ExprRef::NIL);
        let i = heap.alloc(Tag::I, ExprRef::NIL, ExprRef::NIL);
        let ki = heap.alloc(Tag::K1, i, ExprRef::NIL);
        let si = heap.alloc(Tag::S1, i, ExprRef::NIL);
        let ks = heap.alloc(Tag::K1, s, ExprRef::NIL);
        let kk = heap.alloc(Tag::K1, k, ExprRef::NIL);
        let sksk = heap.alloc(Tag::S2, ks, k);
        let siks = heap.alloc(Tag::S2, i, ks);
        let iota = heap.alloc(Tag::S2, siks, kk);
        let inc = heap.alloc(Tag::Inc, ExprRef::NIL, ExprRef::NIL);
        let zero = heap.alloc(Tag::Num(0), ExprRef::NIL, ExprRef::NIL);
        heap.consts = Consts {
            k,
            s,
            i,
            ki,
            si,
            ks,
            kk,
            sksk,
            siks,
            iota,
            inc,
            zero,
        };

        heap.church_chars[0] = ki;
        heap.church_chars[1] = i;
        for n in 2..=256 {
            let prev = heap.church_chars[n - 1];
            let numeral = heap.alloc(Tag::S2, sksk, prev);
            heap.church_chars[n] = numeral;
        }
        Ok(heap)
    }

    pub fn alloc(&mut self, tag: Tag, arg1: ExprRef, arg2: ExprRef) -> ExprRef {
        debug_assert!(
            self.next_alloc < self.from.len(),
            "allocation without a prior capacity check"
        );
        let r = ExprRef::new(self.next_alloc);
        self.from[self.next_alloc] = Node::new(tag, arg1, arg2);
        self.next_alloc += 1;
        r
    }

    pub fn allocated(&self) -> usize {
        self.next_alloc
    }

    pub fn free_slots(&self) -> usize {
        self.from.len() - self.next_alloc
    }

    pub fn check(&mut self, n: usize) -> Result<(), Error> {
        if self.free_slots() < n {
            self.gc();
            if self.free_slots() < n {
                return Err(Error::OutOfMemory);
            }
        }
        Ok(())
    }

    /// `check`, but keeps the caller's two node-local references alive
    /// across a collection and refreshes them with the moved addresses.
    pub fn check_rooted(
        &mut self,
        n: usize,
        e1: &mut ExprRef,
        e2: &mut ExprRef,
    ) -> Result<(), Error> {
        if self.free_slots() < n {
            self.push_root(*e1);
            self.push_root(*e2);
            self.check(n)?;
            *e2 = self.pop_root();
            *e1 = self.pop_root();
        }
        Ok(())
    }

    pub fn push_root(&mut self, e: ExprRef) {
        assert!(self.roots.len() < MAX_ROOTS, "root stack overflow");
        self.roots.push(e);
    }

    pub fn pop_root(&mut self) -> ExprRef {
        debug_assert!(self.roots.len() > CHURCH2INT_ROOT + 1);
        self.roots.pop().unwrap()
    }

    pub fn toplevel(&self) -> ExprRef {
        self.roots[TOPLEVEL_ROOT]
    }

    pub fn set_toplevel(&mut self, e: ExprRef) {
        self.roots[TOPLEVEL_ROOT] = e;
    }

    pub fn set_church2int_root(&mut self, e: ExprRef) {
        self.roots[CHURCH2INT_ROOT] = e;
    }

    pub fn clear_church2int_root(&mut self) {
        self.roots[CHURCH2INT_ROOT] = ExprRef::NIL;
    }

    /// Church numeral for a byte, with 256 standing for end of input.
    /// Out-of-range requests clamp to 256.
    pub fn church_char(&self, ch: usize) -> ExprRef {
        self.church_chars[ch.min(256)]
    }

    /// Lowers a parsed expression into the arena. Leaves map to the
    /// permanent singletons; applications allocate, so intermediate
    /// results are rooted across child construction.
    pub fn build(&mut self, ast: &Ast) -> Result<ExprRef, Error> {
        match ast {
            Ast::S => Ok(self.consts.s),
            Ast::K => Ok(self.consts.k),
            Ast::I => Ok(self.consts.i),
            Ast::Iota => Ok(self.consts.iota),
            Ast::Apply(lhs, rhs) => {
                let lhs = self.build(lhs)?;
                self.push_root(lhs);
                let rhs = self.build(rhs)?;
                let lhs = self.pop_root();
                self.app(lhs, rhs)
            }
        }
    }

    /// Allocates an unreduced application, collecting first if needed.
    pub fn app(&mut self, mut lhs: ExprRef, mut rhs: ExprRef) -> Result<ExprRef, Error> {
        self.check_rooted(1, &mut lhs, &mut rhs)?;
        Ok(self.alloc(Tag::A, lhs, rhs))
    }

    /// Cheney collection: evacuate the roots, the numeral cache, and the
    /// singletons, then scan to-space until every copied node's children
    /// have been forwarded. Forwarding pointers in the old space make the
    /// copy share-preserving and terminate on cycles.
    fn gc(&mut self) {
        let Heap {
            ref mut from,
            ref mut to,
            ref mut next_alloc,
            ref mut roots,
            ref mut church_chars,
            ref mut consts,
        } = *self;
        *next_alloc = 0;

        for slot in roots.iter_mut() {
            *slot = evacuate(from, to, next_alloc, *slot);
        }
        for slot in church_chars.iter_mut() {
            *slot = evacuate(from, to, next_alloc, *slot);
        }
        let Consts {
            ref mut k,
            ref mut s,
            ref mut i,
            ref mut ki,
            ref mut si,
            ref mut ks,
            ref mut kk,
            ref mut sksk,
            ref mut siks,
            ref mut iota,
            ref mut inc,
            ref mut zero,
        } = *consts;
        for slot in [k, s, i, ki, si, ks, kk, sksk, siks, iota, inc, zero].iter_mut() {
            **slot = evacuate(from, to, next_alloc, **slot);
        }

        let mut scan = 0;
        while scan < *next_alloc {
            let (arg1, arg2) = {
                let node = &to[scan];
                (node.arg1, node.arg2)
            };
            let arg1 = evacuate(from, to, next_alloc, arg1);
            to[scan].arg1 = arg1;
            let arg2 = evacuate(from, to, next_alloc, arg2);
            to[scan].arg2 = arg2;
            scan += 1;
        }

        mem::swap(from, to);
    }
}

fn evacuate(from: &mut [Node], to: &mut [Node], next_alloc: &mut usize, r: ExprRef) -> ExprRef {
    if r.is_nil() {
        return r;
    }
    let forward = from[r.index()].forward;
    if !forward.is_nil() {
        return forward;
    }
    // Copy before setting the forwarding pointer so the copy's own
    // forward field stays clear.
    let dst = ExprRef::new(*next_alloc);
    to[*next_alloc] = from[r.index()];
    *next_alloc += 1;
    from[r.index()].forward = dst;
    dst
}

impl Index<ExprRef> for Heap {
    type Output = Node;

    fn index(&self, r: ExprRef) -> &Node {
        &self.from[r.index()]
    }
}

impl IndexMut<ExprRef> for Heap {
    fn index_mut(&mut self, r: ExprRef) -> &mut Node {
        &mut self.from[r.index()]
    }
}
