pub mod catalog;
pub mod db;
pub mod derive;
pub mod loader;
pub mod reconcile;
pub mod runs;
