//! Library crate for airplonk: find SSH nodes on the local /24 and push a
//! directory to the one the operator picks.
pub mod cleanup;
pub mod discovery;
pub mod error;
pub mod input;
pub mod neighbors;
pub mod netdetect;
pub mod preflight;
pub mod render;
pub mod scanner;
pub mod select;
pub mod session;
pub mod spinner;
pub mod transfer;
pub mod types;
