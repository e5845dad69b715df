//! # agora-core
//! Foundation records, policy and traits for the Agora decision kernel.
//!
//! Everything here is plain data: signals, clusters' identifiers, proposals,
//! predictions, influence records and validator vote histories. The engines
//! in `agora-cluster`, `agora-influence` and `agora-consensus` consume these
//! records and return plain results. Nothing in the kernel performs I/O.

pub mod audit;
pub mod constants;
pub mod error;
pub mod geocell;
pub mod policy;
pub mod proposal;
pub mod traits;
pub mod types;

pub use error::KernelError;
pub use policy::KernelPolicy;
