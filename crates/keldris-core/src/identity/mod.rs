//! Identity & session component (C1): API-key validation for agents,
//! session/OIDC flows with hot reload, impersonation, and agent-registration
//! codes.

pub mod api_key;
pub mod impersonation;
pub mod oidc;
pub mod registration;
pub mod session;
