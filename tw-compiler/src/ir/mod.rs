// Keep the IR types reachable as `crate::ir::*`.
pub mod ir;
pub use ir::*;

pub mod lower;
pub mod symbol_table;
pub mod verify;
