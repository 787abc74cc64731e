//! Capabilities
//!
//! A capability names one shared kernel object and carries its local
//! endpoint binding. Each VPE owns two selector-keyed tables: object
//! capabilities (send/receive gates, sessions) and mapping capabilities
//! (memory gates).

mod object;
mod table;

#[cfg(test)]
mod tests_prop;

pub use object::{KObject, MGateObject, RGateObject, SGateObject, SessObject};
pub use table::{CapTable, Capability};
