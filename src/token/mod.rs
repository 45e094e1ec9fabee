//! Id token parsing and claim validation.

pub mod claims;
pub mod validation;

pub use claims::{Audience, IdClaims};
pub use validation::{Expectations, JwksKeyResolver, KeyResolver, StaticKeyResolver, TokenValidator, ValidatedIdToken};
