// src/models/mod.rs

pub mod course;
pub mod enrollment;
pub mod interaction;
pub mod quiz_result;
pub mod submission;
pub mod user;
pub mod vocabulary;
