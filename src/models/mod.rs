pub mod db_model;
pub mod feed_model;
pub mod queries;

pub use db_model::*;
pub use feed_model::*;
