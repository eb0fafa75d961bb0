//! DRBM model components: the parameterized module with its probability
//! engine, and the tensor bridge between plain numeric lists and burn tensors.

pub mod bridge;
pub mod drbm;

pub use drbm::{backend_dtype, dtype_name, Drbm, DrbmConfig, DrbmParams};
