//! Infrastructure layer
//!
//! Concrete implementations of the boundary collaborators: primitive routines
//! and secure-storage delegates.

pub mod primitives;
pub mod storage;
