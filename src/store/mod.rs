//! In-process persistence - the game registry and the prompt catalog

pub mod catalog;
pub mod games;

pub use catalog::CatalogStore;
pub use games::GameStore;
