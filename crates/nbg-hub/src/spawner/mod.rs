//! Runtime spawners

mod process;

pub use process::{ProcessSpawner, USER_ENV};
