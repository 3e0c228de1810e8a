mod policy;
mod store;
mod writer;

pub use policy::{SavePolicy, SaveTrigger};
pub use store::RecoveryStore;
pub use writer::RecoveryWriter;
