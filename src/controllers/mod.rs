//! HTTP API controllers

pub mod chat;
pub mod health;
pub mod identity;
pub mod integrations;
