//! Service configuration loading, mutation and persistence

mod store;

pub use store::*;
