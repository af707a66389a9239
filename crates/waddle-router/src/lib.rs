//! The Router: session lifecycle, trigger/alias resolution, the four-kind
//! policy chain, and the HTTP boundary that admits inbound events and
//! module responses.

pub mod alias;
pub mod app;
pub mod auth;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod ingest;
pub mod trigger;
pub mod types;

pub use alias::{Alias, AliasStore};
pub use app::{build_router, RouterState};
pub use auth::{resolve_credential, ApiKeyStore};
pub use dispatcher::{dispatch, InboundContext};
pub use error::{Result, RouterError};
pub use trigger::{PatternKind, Trigger, TriggerRegistry};
