// src/handlers/mod.rs

pub mod admin;
pub mod analytics;
pub mod auth;
pub mod enrollment;
pub mod interaction;
pub mod quiz;
