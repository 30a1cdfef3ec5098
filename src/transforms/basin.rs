//! # Parabolic Basin Transform (1-D generalized squared EDT)
//!
//! Computes, for each row of a `(dim0, dim1, dim2)` volume, the lower envelope
//! of the parabolas `y = (x - p)^2 + f[p]` rooted at every sample `p` of the
//! row, emitting the envelope value `out[q] = min_p (q - p)^2 + f[p]` and the
//! winning root `basins[q]` per position. Rows run along the middle axis with
//! stride `dim2`; every `(i0, i2)` pair is an independent row and the batch is
//! dispatched in parallel over disjoint output slabs.
//!
//! ## Shapes
//! - **f / out / basins**: flat `(dim0, dim1, dim2)` row-major buffers.
//! - **v scratch**: `(dim0, dim1, dim2)` `i32`, **z scratch**: `(dim0, dim1+1, dim2)` `f64`.
//!
//! ## Errors
//! - **EmptyData**: basin: Input data slice is empty.
//! - **InvalidShape**: basin: A dimension is zero.
//! - **DimTooLarge**: basin: `dim1` does not fit an `i32` basin label.
//! - **DataLengthMismatch**: basin: Flat input length does not match the shape.
//! - **OutputLengthMismatch**: basin: `out`/`basins` buffer sized incorrectly.
//! - **ScratchLengthMismatch**: basin: `v`/`z` scratch sized incorrectly.
//! - **InvalidKernel**: basin: Batch kernel requested for a single row.
//!
//! ## Returns
//! - **`Ok(BasinOutput)`** on success, containing `values: Vec<f64>` and
//!   `basins: Vec<i32>` of the input shape.
//! - **`Err(BasinError)`** otherwise.
//!
//! Input values must be finite. The sweep is precondition-driven: NaN or
//! infinite samples silently corrupt that row's envelope (and only that
//! row's).

use crate::utilities::enums::Kernel;
use crate::utilities::helpers::{
    detect_best_batch_kernel, detect_best_kernel, make_uninit_index_matrix, make_uninit_matrix,
};
use aligned_vec::{AVec, CACHELINE_ALIGN};
#[cfg(not(target_arch = "wasm32"))]
use rayon::prelude::*;
use thiserror::Error;

#[derive(Debug, Clone)]
pub enum BasinData<'a> {
    /// One contiguous row of samples (shape `(1, n, 1)`).
    Row(&'a [f64]),
    /// A flat row-major `(dim0, dim1, dim2)` volume; the transform runs along
    /// the middle axis.
    Volume {
        f: &'a [f64],
        shape: (usize, usize, usize),
    },
}

#[derive(Debug, Clone)]
pub struct BasinInput<'a> {
    pub data: BasinData<'a>,
}

impl<'a> BasinInput<'a> {
    #[inline]
    pub fn from_row(row: &'a [f64]) -> Self {
        Self {
            data: BasinData::Row(row),
        }
    }
    #[inline]
    pub fn from_volume(f: &'a [f64], shape: (usize, usize, usize)) -> Self {
        Self {
            data: BasinData::Volume { f, shape },
        }
    }
}

#[derive(Debug, Clone)]
pub struct BasinOutput {
    /// Envelope values, same shape as the input.
    pub values: Vec<f64>,
    /// Winning parabola root per position, same shape as the input.
    pub basins: Vec<i32>,
    pub shape: (usize, usize, usize),
}

impl BasinOutput {
    #[inline(always)]
    pub fn index(&self, i0: usize, i1: usize, i2: usize) -> usize {
        (i0 * self.shape.1 + i1) * self.shape.2 + i2
    }

    /// Gather one `(i0, i2)` row of envelope values (stride `dim2`).
    pub fn row_values(&self, i0: usize, i2: usize) -> Vec<f64> {
        (0..self.shape.1)
            .map(|i1| self.values[self.index(i0, i1, i2)])
            .collect()
    }

    /// Gather one `(i0, i2)` row of basin labels.
    pub fn row_basins(&self, i0: usize, i2: usize) -> Vec<i32> {
        (0..self.shape.1)
            .map(|i1| self.basins[self.index(i0, i1, i2)])
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum BasinError {
    #[error("basin: Input data slice is empty.")]
    EmptyData,
    #[error("basin: Invalid shape: dim0 = {dim0}, dim1 = {dim1}, dim2 = {dim2}")]
    InvalidShape {
        dim0: usize,
        dim1: usize,
        dim2: usize,
    },
    #[error("basin: dim1 = {dim1} does not fit an i32 basin label")]
    DimTooLarge { dim1: usize },
    #[error("basin: Input length mismatch: expected = {expected}, got = {got}")]
    DataLengthMismatch { expected: usize, got: usize },
    #[error("basin: {name} buffer length mismatch: expected = {expected}, got = {got}")]
    OutputLengthMismatch {
        name: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("basin: {name} scratch length mismatch: expected = {expected}, got = {got}")]
    ScratchLengthMismatch {
        name: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("basin: {kernel:?} kernel is not valid for this input form")]
    InvalidKernel { kernel: Kernel },
}

#[derive(Copy, Clone, Debug, Default)]
pub struct BasinBuilder {
    kernel: Kernel,
}

impl BasinBuilder {
    #[inline(always)]
    pub fn new() -> Self {
        Self::default()
    }
    #[inline(always)]
    pub fn kernel(mut self, k: Kernel) -> Self {
        self.kernel = k;
        self
    }
    #[inline(always)]
    pub fn apply_row(self, row: &[f64]) -> Result<BasinOutput, BasinError> {
        basins_with_kernel(&BasinInput::from_row(row), self.kernel)
    }
    #[inline(always)]
    pub fn apply_volume(
        self,
        f: &[f64],
        shape: (usize, usize, usize),
    ) -> Result<BasinOutput, BasinError> {
        basins_with_kernel(&BasinInput::from_volume(f, shape), self.kernel)
    }
}

#[inline]
pub fn basins(input: &BasinInput) -> Result<BasinOutput, BasinError> {
    basins_with_kernel(input, Kernel::Auto)
}

pub fn basins_with_kernel(input: &BasinInput, kernel: Kernel) -> Result<BasinOutput, BasinError> {
    let ((dim0, dim1, dim2), f, parallel) = match &input.data {
        BasinData::Row(row) => {
            if row.is_empty() {
                return Err(BasinError::EmptyData);
            }
            let chosen = match kernel {
                Kernel::Auto => detect_best_kernel(),
                other => other,
            };
            if chosen.is_batch() {
                return Err(BasinError::InvalidKernel { kernel: chosen });
            }
            ((1usize, row.len(), 1usize), *row, false)
        }
        BasinData::Volume { f, shape } => {
            if f.is_empty() {
                return Err(BasinError::EmptyData);
            }
            let chosen = match kernel {
                Kernel::Auto => detect_best_batch_kernel(),
                other => other,
            };
            (*shape, *f, chosen.is_batch())
        }
    };
    validate_shape(dim0, dim1, dim2)?;

    let total = dim0 * dim1 * dim2;
    if f.len() != total {
        return Err(BasinError::DataLengthMismatch {
            expected: total,
            got: f.len(),
        });
    }

    // Outputs start uninitialized; the evaluator pass writes every cell.
    let out_mu = make_uninit_matrix(dim0 * dim2, dim1);
    let basins_mu = make_uninit_index_matrix(dim0 * dim2, dim1);
    let mut out_guard = core::mem::ManuallyDrop::new(out_mu);
    let mut basins_guard = core::mem::ManuallyDrop::new(basins_mu);
    let out: &mut [f64] = unsafe {
        core::slice::from_raw_parts_mut(out_guard.as_mut_ptr() as *mut f64, out_guard.len())
    };
    let labels: &mut [i32] = unsafe {
        core::slice::from_raw_parts_mut(basins_guard.as_mut_ptr() as *mut i32, basins_guard.len())
    };

    // One scratch lane per row slot, cacheline aligned so concurrent rows
    // never share a line.
    let mut z_scratch = AVec::<f64>::with_capacity(CACHELINE_ALIGN, dim0 * (dim1 + 1) * dim2);
    z_scratch.resize(dim0 * (dim1 + 1) * dim2, 0.0);
    let mut v_scratch = AVec::<i32>::with_capacity(CACHELINE_ALIGN, total);
    v_scratch.resize(total, 0);

    compute_basins_inner(
        dim0,
        dim1,
        dim2,
        f,
        out,
        &mut z_scratch,
        &mut v_scratch,
        labels,
        parallel,
    );

    let values = unsafe {
        Vec::from_raw_parts(
            out_guard.as_mut_ptr() as *mut f64,
            out_guard.len(),
            out_guard.capacity(),
        )
    };
    let basins = unsafe {
        Vec::from_raw_parts(
            basins_guard.as_mut_ptr() as *mut i32,
            basins_guard.len(),
            basins_guard.capacity(),
        )
    };

    Ok(BasinOutput {
        values,
        basins,
        shape: (dim0, dim1, dim2),
    })
}

/// Low-level entry point over caller-provided flat buffers, serial dispatch.
///
/// Buffer layouts: `f`/`out`/`basins` are `(dim0, dim1, dim2)`; `v_scratch` is
/// `(dim0, dim1, dim2)` `i32` and `z_scratch` is `(dim0, dim1+1, dim2)` `f64`.
/// Scratch contents are ignored on entry (each row re-zeroes its lane) and are
/// left in an unspecified state, so buffers can be reused across calls.
pub fn compute_basins(
    dim0: usize,
    dim1: usize,
    dim2: usize,
    f: &[f64],
    out: &mut [f64],
    z_scratch: &mut [f64],
    v_scratch: &mut [i32],
    basins: &mut [i32],
) -> Result<(), BasinError> {
    validate_buffers(dim0, dim1, dim2, f, out, z_scratch, v_scratch, basins)?;
    compute_basins_inner(
        dim0, dim1, dim2, f, out, z_scratch, v_scratch, basins, false,
    );
    Ok(())
}

/// Parallel counterpart of [`compute_basins`]: rows are dispatched across the
/// rayon pool, one `dim1 x dim2` slab per task. The call returns only after
/// every row has been written.
pub fn compute_basins_par(
    dim0: usize,
    dim1: usize,
    dim2: usize,
    f: &[f64],
    out: &mut [f64],
    z_scratch: &mut [f64],
    v_scratch: &mut [i32],
    basins: &mut [i32],
) -> Result<(), BasinError> {
    validate_buffers(dim0, dim1, dim2, f, out, z_scratch, v_scratch, basins)?;
    compute_basins_inner(dim0, dim1, dim2, f, out, z_scratch, v_scratch, basins, true);
    Ok(())
}

#[inline]
fn validate_shape(dim0: usize, dim1: usize, dim2: usize) -> Result<(), BasinError> {
    if dim0 == 0 || dim1 == 0 || dim2 == 0 {
        return Err(BasinError::InvalidShape { dim0, dim1, dim2 });
    }
    if dim1 > i32::MAX as usize {
        return Err(BasinError::DimTooLarge { dim1 });
    }
    Ok(())
}

#[inline]
fn validate_buffers(
    dim0: usize,
    dim1: usize,
    dim2: usize,
    f: &[f64],
    out: &[f64],
    z_scratch: &[f64],
    v_scratch: &[i32],
    basins: &[i32],
) -> Result<(), BasinError> {
    validate_shape(dim0, dim1, dim2)?;
    let total = dim0 * dim1 * dim2;
    let z_total = dim0 * (dim1 + 1) * dim2;
    if f.len() != total {
        return Err(BasinError::DataLengthMismatch {
            expected: total,
            got: f.len(),
        });
    }
    if out.len() != total {
        return Err(BasinError::OutputLengthMismatch {
            name: "out",
            expected: total,
            got: out.len(),
        });
    }
    if basins.len() != total {
        return Err(BasinError::OutputLengthMismatch {
            name: "basins",
            expected: total,
            got: basins.len(),
        });
    }
    if z_scratch.len() != z_total {
        return Err(BasinError::ScratchLengthMismatch {
            name: "z",
            expected: z_total,
            got: z_scratch.len(),
        });
    }
    if v_scratch.len() != total {
        return Err(BasinError::ScratchLengthMismatch {
            name: "v",
            expected: total,
            got: v_scratch.len(),
        });
    }
    Ok(())
}

fn compute_basins_inner(
    dim0: usize,
    dim1: usize,
    dim2: usize,
    f: &[f64],
    out: &mut [f64],
    z_scratch: &mut [f64],
    v_scratch: &mut [i32],
    basins: &mut [i32],
    parallel: bool,
) {
    let slab = dim1 * dim2;
    let z_slab = (dim1 + 1) * dim2;

    let do_slab = |f_slab: &[f64],
                   out_slab: &mut [f64],
                   z_s: &mut [f64],
                   v_slab: &mut [i32],
                   b_slab: &mut [i32]| {
        for lane in 0..dim2 {
            basin_row_scalar(f_slab, dim1, dim2, lane, v_slab, z_s, out_slab, b_slab);
        }
    };

    if parallel {
        #[cfg(not(target_arch = "wasm32"))]
        {
            (
                f.par_chunks(slab),
                out.par_chunks_mut(slab),
                z_scratch.par_chunks_mut(z_slab),
                v_scratch.par_chunks_mut(slab),
                basins.par_chunks_mut(slab),
            )
                .into_par_iter()
                .for_each(|(f_s, o_s, z_s, v_s, b_s)| do_slab(f_s, o_s, z_s, v_s, b_s));
        }

        #[cfg(target_arch = "wasm32")]
        {
            for i0 in 0..dim0 {
                let (fs, os, zs, vs, bs) = slab_slices(
                    i0, slab, z_slab, f, out, z_scratch, v_scratch, basins,
                );
                do_slab(fs, os, zs, vs, bs);
            }
        }
    } else {
        for i0 in 0..dim0 {
            let (fs, os, zs, vs, bs) =
                slab_slices(i0, slab, z_slab, f, out, z_scratch, v_scratch, basins);
            do_slab(fs, os, zs, vs, bs);
        }
    }
}

#[allow(clippy::type_complexity)]
#[inline(always)]
fn slab_slices<'a>(
    i0: usize,
    slab: usize,
    z_slab: usize,
    f: &'a [f64],
    out: &'a mut [f64],
    z_scratch: &'a mut [f64],
    v_scratch: &'a mut [i32],
    basins: &'a mut [i32],
) -> (
    &'a [f64],
    &'a mut [f64],
    &'a mut [f64],
    &'a mut [i32],
    &'a mut [i32],
) {
    (
        &f[i0 * slab..(i0 + 1) * slab],
        &mut out[i0 * slab..(i0 + 1) * slab],
        &mut z_scratch[i0 * z_slab..(i0 + 1) * z_slab],
        &mut v_scratch[i0 * slab..(i0 + 1) * slab],
        &mut basins[i0 * slab..(i0 + 1) * slab],
    )
}

/// Crossover position of the parabolas rooted at `q` and `p` with vertex
/// heights `fq` and `fp`. The sweep guarantees `q > p`, so the denominator is
/// never zero.
#[inline(always)]
fn intersection(q: usize, p: usize, fq: f64, fp: f64) -> f64 {
    let qf = q as f64;
    let pf = p as f64;
    ((fq + qf * qf) - (fp + pf * pf)) / (2.0 * qf - 2.0 * pf)
}

/// Build the lower envelope of one `(i0, i2)` row inside its slab.
///
/// `v` and `z` are the slab's scratch lanes (`dim1` / `dim1 + 1` entries at
/// stride `stride`). Returns `k`, the index of the last envelope vertex:
/// `v[0..=k]` are strictly increasing roots and `z[1..=k]` their
/// non-decreasing crossovers, with `z[0] = -inf` and `z[k+1] = +inf`.
///
/// A candidate whose crossover falls at or before the previous boundary
/// (`s <= z[k]`) fully dominates the top vertex, which is popped; the `<=`
/// also evicts segments whose interval collapses to a point, so at an exact
/// integer crossover the earliest-constructed (smallest-root) segment wins.
fn build_row_envelope(
    f: &[f64],
    dim1: usize,
    stride: usize,
    lane: usize,
    v: &mut [i32],
    z: &mut [f64],
) -> usize {
    // Stale boundaries from a previous run would be read before being
    // overwritten, so the lane is re-zeroed first.
    for i1 in 0..dim1 {
        v[lane + i1 * stride] = 0;
        z[lane + i1 * stride] = 0.0;
    }
    z[lane + dim1 * stride] = 0.0;

    let mut k = 0usize;
    z[lane] = f64::NEG_INFINITY;
    z[lane + stride] = f64::INFINITY;

    for q in 1..dim1 {
        let fq = f[lane + q * stride];
        let mut p = v[lane + k * stride] as usize;
        let mut s = intersection(q, p, fq, f[lane + p * stride]);
        while s <= z[lane + k * stride] {
            k -= 1;
            p = v[lane + k * stride] as usize;
            s = intersection(q, p, fq, f[lane + p * stride]);
        }
        k += 1;
        v[lane + k * stride] = q as i32;
        z[lane + k * stride] = s;
        z[lane + (k + 1) * stride] = f64::INFINITY;
    }

    k
}

/// Scan the finished envelope left to right, writing `out` and `basins` for
/// every position of the row.
///
/// The advance is strict (`z[k+1] < q`): a position exactly on a boundary
/// stays with the earlier segment, which pins basin assignment at integer
/// crossovers. The winning root can lie on either side of `q`, hence the
/// signed distance.
fn evaluate_row_envelope(
    f: &[f64],
    dim1: usize,
    stride: usize,
    lane: usize,
    v: &[i32],
    z: &[f64],
    out: &mut [f64],
    basins: &mut [i32],
) {
    let mut k = 0usize;
    for q in 0..dim1 {
        while z[lane + (k + 1) * stride] < q as f64 {
            k += 1;
        }
        let p = v[lane + k * stride];
        let d = q as i64 - p as i64;
        basins[lane + q * stride] = p;
        out[lane + q * stride] = (d * d) as f64 + f[lane + p as usize * stride];
    }
}

#[inline]
fn basin_row_scalar(
    f: &[f64],
    dim1: usize,
    stride: usize,
    lane: usize,
    v: &mut [i32],
    z: &mut [f64],
    out: &mut [f64],
    basins: &mut [i32],
) {
    build_row_envelope(f, dim1, stride, lane, v, z);
    evaluate_row_envelope(f, dim1, stride, lane, v, z, out, basins);
}
