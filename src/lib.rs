//! Batched 1-D generalized squared Euclidean distance transforms.
//!
//! For every row of a logical `(dim0, dim1, dim2)` volume (rows run along the
//! middle axis with stride `dim2`), the crate computes the lower envelope of
//! the parabolas `y = (x - p)^2 + f[p]` rooted at each sample `p`, emitting per
//! position the envelope value and the index of the parabola that achieves it
//! (the "basin" label, i.e. the dominant seed in a watershed-style transform).
//!
//! Rows are fully independent and are dispatched in parallel over disjoint
//! output slabs; see [`transforms::basin`] for the operation itself and the
//! low-level strided entry points.
#![allow(clippy::needless_range_loop)]
#![allow(clippy::too_many_arguments)]

pub mod transforms;
pub mod utilities;
