//! Progressive-enhancement core for server-rendered forms.
//!
//! [`engine::VisibilityEngine`] keeps conditional field groups consistent
//! with the inputs that control them. [`sso::SsoInterceptor`] gates
//! navigation on SSO-flagged links behind a signed-payload round trip.
//! Both degrade to the page's server-rendered behaviour on any failure.

pub mod engine;
pub mod error;
pub mod form;
pub mod manifest;
pub mod policy;
pub mod sso;

pub use engine::{GroupUpdate, VisibilityEngine, VisibilitySnapshot};
pub use error::{EngineError, SsoError};
pub use form::{FieldGroup, Form, FormInput, InputChange, InputKind, InputValue};
pub use manifest::{ManifestIssue, PageManifest};
pub use policy::{GroupRule, OverrideFlag, TriggerValues, VisibilityPolicy};
