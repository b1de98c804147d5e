//! Session lifecycle and shared caching for the carelink API.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod state;

pub mod crypto {
    pub mod token;
}

pub mod models {
    pub mod cache;
    pub mod form;
    pub mod session;
    pub mod user;
}

pub mod sessions {
    pub mod audit;
    pub mod clock;
    pub mod manager;
    pub mod store;
    pub mod sweeper;
}

pub mod repositories {
    pub mod form;
    pub mod session;
    pub mod user;
}

pub mod services {
    pub mod auth;
}

pub mod handlers {
    pub mod auth;
    pub mod forms;
    pub mod health;
    pub mod sessions;
}

pub mod middleware_layer {
    pub mod rate_limit;
    pub mod session;
}
