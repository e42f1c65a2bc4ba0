// Token-gated page access engine
pub mod gate;

// Environment configuration for the server binary
pub mod config;

// HTTP endpoints
pub mod modules;
