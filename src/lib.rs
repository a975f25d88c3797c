#![allow(clippy::derive_partial_eq_without_eq)]

pub mod api;
pub mod auth;
pub mod cache;
pub mod flow;
pub mod job;
pub mod report;
pub mod session;
pub mod transport;
