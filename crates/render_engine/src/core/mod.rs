//! Core engine services

pub mod config;
