//! State machines and loops of the chunk processing VNFs
//!
//! Two pipelines share this substrate: the CNN pipeline consumes X messages
//! and re-emits them after compute, the MEICA pipeline cooperatively refines
//! a uW state across peers while fast-forwarding X downstream.

pub mod cli;
pub mod manager;
pub mod vnf;
