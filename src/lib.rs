mod database {
    pub mod actions;
    pub mod error;
    pub mod form;
    pub mod pagination;
    pub mod schema;
    pub mod validation;
}
mod authentication {
    pub mod cryptography;
    pub mod jwt;
    pub mod middleware;
    pub mod permissions;
}
pub mod config;
pub mod constants;
pub mod media;
pub mod routes;

mod cache {
    pub mod cache;
}

pub use authentication::*;
pub use cache::cache::*;
pub use database::*;
