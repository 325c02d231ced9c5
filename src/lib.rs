// Runtime configuration
pub mod config;

// Credential records and encryption at rest
pub mod credentials;

// Master encryption key provisioning
pub mod keystore;

// Authenticated request proxy (login, logout, catalog forwarding)
pub mod proxy;

// Session persistence
pub mod session;
