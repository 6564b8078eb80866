//! Core library for playlist-merge
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod identity;
pub mod merge;
pub mod models;
