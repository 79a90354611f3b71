//! Recipe management API: accounts with token authentication, plus tags,
//! ingredients and recipes owned by each user.

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod recipes;
pub mod state;
pub mod validation;
