use crate::utilities::enums::Kernel;
use std::mem::MaybeUninit;

/// Poison pattern written into uninitialized `f64` output matrices in debug
/// builds. Any cell still carrying these bits after a transform ran was never
/// written by the evaluator.
pub const UNINIT_F64_POISON: u64 = 0x3333_3333_3333_3333;

/// Poison pattern for uninitialized `i32` label matrices in debug builds.
pub const UNINIT_I32_POISON: i32 = 0x3333_3333;

/// Best kernel for a single row. The per-row sweep is branchy and strictly
/// sequential, so there is only the scalar variant.
#[inline(always)]
pub fn detect_best_kernel() -> Kernel {
    Kernel::Scalar
}

/// Best kernel for a batched volume: scalar rows dispatched across the rayon
/// pool. On `wasm32` the batch path degrades to a serial loop internally.
#[inline(always)]
pub fn detect_best_batch_kernel() -> Kernel {
    Kernel::ScalarBatch
}

/// Allocate a `rows x cols` output matrix without initializing it.
///
/// Callers must write every element before reclaiming the buffer with
/// `Vec::from_raw_parts`. Debug builds fill the matrix with a poison pattern
/// so a missed write is caught by the no-poison tests instead of silently
/// leaking stale heap contents.
pub fn make_uninit_matrix(rows: usize, cols: usize) -> Vec<MaybeUninit<f64>> {
    let len = rows * cols;
    let mut buf: Vec<MaybeUninit<f64>> = Vec::with_capacity(len);
    // SAFETY: MaybeUninit<f64> needs no initialization; capacity is `len`.
    unsafe { buf.set_len(len) };
    #[cfg(debug_assertions)]
    for cell in buf.iter_mut() {
        cell.write(f64::from_bits(UNINIT_F64_POISON));
    }
    buf
}

/// `i32` counterpart of [`make_uninit_matrix`] for basin label matrices.
pub fn make_uninit_index_matrix(rows: usize, cols: usize) -> Vec<MaybeUninit<i32>> {
    let len = rows * cols;
    let mut buf: Vec<MaybeUninit<i32>> = Vec::with_capacity(len);
    // SAFETY: MaybeUninit<i32> needs no initialization; capacity is `len`.
    unsafe { buf.set_len(len) };
    #[cfg(debug_assertions)]
    for cell in buf.iter_mut() {
        cell.write(UNINIT_I32_POISON);
    }
    buf
}
