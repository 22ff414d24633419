//! Pure data structures shared by the store, the orchestrator and the clients.

pub mod bill;
pub mod item;
pub mod summary;

pub use bill::*;
pub use item::*;
pub use summary::*;
