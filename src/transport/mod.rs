//! Delivery of authorization requests to the provider and correlation of their
//! callbacks.

pub mod callback;
pub mod coordinator;

use async_trait::async_trait;
use url::Url;

use crate::error::Result;

pub use coordinator::{CallbackMessage, FlowHandle, FlowOutcome, PopupClaim, TransportCoordinator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mechanism {
    Popup,
    Iframe,
    Redirect,
}

impl std::fmt::Display for Mechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Popup => "popup",
            Self::Iframe => "iframe",
            Self::Redirect => "redirect",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    SignIn,
    SignOut,
    SessionStatus,
}

/// `Created -> AwaitingCallback -> {Completed | Failed | Expired}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    Created,
    AwaitingCallback,
    Completed,
    Failed,
    Expired,
}

impl FlowStatus {
    pub fn can_advance_to(self, next: FlowStatus) -> bool {
        use FlowStatus::*;

        match (self, next) {
            (Created, AwaitingCallback) => true,
            (Created, Failed) | (Created, Expired) => true,
            (AwaitingCallback, Completed)
            | (AwaitingCallback, Failed)
            | (AwaitingCallback, Expired) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Expired)
    }
}

/// Handle on the hosting environment: windows, frames and navigation.
///
/// Passed to the manager at construction; nothing in this crate reaches for an
/// ambient runtime.
#[async_trait]
pub trait Navigator: Send + Sync {
    /// Opens a new window at `url`.
    async fn open_popup(&self, url: &Url) -> Result<Box<dyn PopupWindow>>;
    /// Loads `url` in a hidden frame.
    async fn create_frame(&self, url: &Url) -> Result<Box<dyn FrameWindow>>;
    /// Replaces the current document. Returns once navigation has been started.
    async fn navigate(&self, url: &Url) -> Result<()>;
    /// Location of the current document, used by callbacks invoked without a URL.
    fn current_location(&self) -> Option<Url>;
}

#[async_trait]
pub trait PopupWindow: Send + Sync {
    /// Resolves once the window has been closed by the user.
    async fn closed(&self);
    async fn close(&self);
}

#[async_trait]
pub trait FrameWindow: Send + Sync {
    async fn remove(&self);
}
