pub mod basin;

pub use basin::{
    basins, basins_with_kernel, compute_basins, compute_basins_par, BasinBuilder, BasinData,
    BasinError, BasinInput, BasinOutput,
};
