//! OAuth 2.0 wire types exchanged with the authorization and token endpoints.

pub mod access_token;
pub mod authorization;
pub mod error;
pub mod pkce;
pub mod revocation;

pub use access_token::*;
pub use authorization::*;
pub use error::{AuthorizationErrorKind, ErrorResponse, ProviderError};
pub use revocation::*;
