//! `classroom-auth`: authentication/authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage: it knows how
//! to validate identity-provider tokens, how a resolved request identity looks,
//! and how role allow-lists are checked. Provisioning users lives in infra.

pub mod authorize;
pub mod claims;
pub mod context;
pub mod roles;

pub use authorize::{AuthzError, authorize_roles, require_organization};
pub use claims::{Hs256JwtValidator, IdentityClaims, JwtValidator, TokenValidationError};
pub use context::AuthContext;
pub use roles::Role;
