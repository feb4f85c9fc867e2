//! Application services: cache coordination, catalog queries and search.

pub mod catalog;
pub mod error;
pub mod freshness;
pub mod refresh;
pub mod repos;
pub mod search;
pub mod workflow;
