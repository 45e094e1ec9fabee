pub mod discovery;
pub mod models;
pub mod types;

use crate::core::types::Scope;
pub use discovery::ProviderMetadata;

impl Scope {
    pub fn has_openid(&self) -> bool {
        self.contains("openid")
    }
}
