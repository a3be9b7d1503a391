//! This is the library module that provides structures like
//! Mbuf, Mempool, RingPort, AfPacketPort and associated functions
//! together with the chunk protocol and the compute bridge used by the COIN VNFs
//!
//! These structures and functions enable the user to run a chunk processing VNF
//! without having to manually figure out buffer ownership and wire format semantics

pub mod apis;
pub mod bridge;
pub mod protocol;

pub use apis::*;
pub use protocol::*;
