// Library exports for Likeboard
// Integration tests drive the router and stores through these modules

pub mod accounts;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod feed;
pub mod retry;
pub mod routes;
pub mod state;
pub mod store;
