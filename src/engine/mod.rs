// Bookshelf Engine - Core module structure
pub mod catalog;
pub mod config;
pub mod nosql;

pub use catalog::BookCatalog;
pub use config::Config;
pub use nosql::NoSqlEngine;
