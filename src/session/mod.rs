//! Session orchestration - directory of live games, identity, read views

pub mod directory;
pub mod identity;
pub mod views;

pub use directory::SessionDirectory;
