// auth-plugin-google
// Google sign-in for the gateway authentication plugin interface

// TOML configuration with environment overrides
pub mod config;

// OAuth2 code flow against Google
pub mod strategy;

// Router assembly
pub mod app;

pub use app::{build_app, AppDeps};
pub use config::PluginConfig;
pub use strategy::GoogleStrategy;
