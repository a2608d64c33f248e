//! Small standalone helpers shared by the storage, codec and index layers.

pub mod bitvec;

pub use bitvec::BitVec;
