//! Matrix shapes, operand views, packing and the reference product.
//!
//! These are the data-shape pieces around the kernels: describing a
//! problem, addressing strided operands, interleaving blocks into the
//! layout a kernel consumes, and a naive product used as the correctness
//! baseline.

pub mod interleave;
pub mod layout;
pub mod reference;
