pub mod db;
mod files;
mod keys;
pub mod models;
mod tables;

pub use db::{Database, DatabaseError};
pub use tables::*;
