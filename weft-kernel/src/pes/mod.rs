//! Processing elements and the applications bound to them

mod vpe;

pub use vpe::{State, Vpe, VpeRef};
