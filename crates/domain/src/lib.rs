//! `classroom-domain`: entities and pure business rules of the classroom platform.
//!
//! Every type here is storage-agnostic. Infra persists them; the API validates
//! requests into the `New*` inputs and serializes the records back out.

pub mod assignments;
pub mod audit;
pub mod classes;
pub mod curriculum;
pub mod independent;
pub mod moderation;
pub mod policy;
pub mod reports;
pub mod users;
mod validate;

pub use validate::{validate_confidence, validate_non_empty};
