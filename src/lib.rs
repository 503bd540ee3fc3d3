//! Bitstream-based video quality estimation.
//!
//! A parametric degradation model over bitstream statistics is blended with
//! a learned residual correction into a sequence-level MOS, which is then
//! spread into a per-second trajectory.

pub mod baseline;
pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
pub mod features;
pub mod inference;
pub mod pipeline;
pub mod plot;
pub mod residual;
pub mod scale;
pub mod temporal;
