//! Business logic and the persistence port for supportdesk.
//!
//! This crate owns the session registry and the notification hub, and
//! defines the `ChatStore` trait that the infrastructure layer implements.
//! It depends only on `supportdesk-types` -- never on `supportdesk-infra`
//! or any database/IO crate.

pub mod chat;
pub mod notify;

pub use chat::policy::StorePolicy;
pub use chat::registry::SessionRegistry;
pub use chat::store::ChatStore;
pub use notify::hub::NotificationHub;
pub use notify::observer::{FnObserver, Observer};
