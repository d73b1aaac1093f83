//! Library crate for party-lobby, exposing modules for binaries and integration tests.

pub mod codes;
pub mod config;
pub mod dao;
pub mod dto;
pub mod error;
pub mod games;
pub mod links;
pub mod realtime;
pub mod routes;
pub mod services;
pub mod state;
