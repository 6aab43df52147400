//! Native stack accounting for the recursive parser and evaluator.
//!
//! Both walk the AST with Rust recursion, so deep scripts are cut off with a
//! script error before the thread's stack runs out. Usage is measured as the
//! distance between the address of a local at the entry point and one at the
//! current frame.

/// Stack the evaluator may use below its outermost entry.
pub const EVAL_STACK_BUDGET: usize = 1024 * 1024;

/// Stack the parser may use below its entry.
pub const PARSE_STACK_BUDGET: usize = 512 * 1024;

/// Address of a local in a fresh frame just below the caller.
#[inline(never)]
pub fn position() -> usize {
    let marker = 0u8;
    std::hint::black_box(&marker) as *const u8 as usize
}

/// Bytes of stack between `base` and the caller.
pub fn used_since(base: usize) -> usize {
    base.abs_diff(position())
}
