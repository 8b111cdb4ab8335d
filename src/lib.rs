//! Synthesize a function from a signature, a docstring and example cases,
//! then keep verifying and refining it against a growing doctest set.

pub mod builder;
pub mod config;
pub mod doctest;
pub mod executor;
pub mod explorer;
pub mod literal;
pub mod llm;
pub mod persistence;
pub mod sandbox;
pub mod signature;
pub mod synth;
pub mod value;
pub mod workflow;
