//! Green Basket Storefront library.
//!
//! This crate provides the storefront functionality as a library,
//! allowing it to be tested and reused by the CLI.
//!
//! # Components
//!
//! - [`cart`] - cart stores with write-through persistence
//! - [`auth`] - auth client and the process-wide session hub
//! - [`identity`] - Supabase Auth integration
//! - [`catalog`] - Stripe products and checkout
//! - [`liveness`] - backend liveness monitor
//! - [`routes`] / [`middleware`] - the HTTP surface and route gate

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod liveness;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;

#[cfg(test)]
mod test_support;
