//! Asynchronous OpenID Connect session management.
//!
//! [`UserManager`] drives popup, hidden-frame and redirect sign-in flows against an
//! OpenID Connect provider, keeps the signed-in [`IdentityUser`] persisted in a
//! pluggable [`Store`], and renews it silently before the access token expires.

pub mod auth;
pub mod core;
pub mod error;
pub mod manager;
pub mod oidc;
pub mod provider;
pub mod storage;
pub mod token;
pub mod transport;
pub mod util;

pub use crate::core::config::IdentityConfiguration;
pub use crate::core::models::{FlowState, IdentityUser};
pub use error::{Error, Result};
pub use manager::{Runtime, SessionManager, SessionStatus, UserManager, UserManagerEvent};
pub use provider::{HttpProviderClient, ProviderClient};
pub use storage::{FileStore, MemoryStore, Store};
pub use transport::{FrameWindow, Mechanism, Navigator, PopupWindow, Purpose};
