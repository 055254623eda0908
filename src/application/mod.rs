// src/application/mod.rs
pub mod dto;
pub mod service;
pub mod usecase;
