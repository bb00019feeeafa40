//! Live tree runtime
//!
//! One tokio task per node, addressed through [`NodeHandle`]s. Structural
//! changes are linearized per parent by its mailbox; everything a change
//! implies for other nodes travels as follow-up messages.
//!
//! ## Architecture
//!
//! ```text
//! Tree ──► NodeActor (mailbox) ──► follow-ups: Adopt / Relink / Orphan
//!  │             │                             Membership (up the ancestors)
//!  │             └─► watch<Arc<DomNode>>       SetOwner ──► Bind / Unbind
//!  │
//!  ├─► QueryEngine ──► scatter::await_first / await_all ──► dom::matcher
//!  └─► EventRegistry (listeners, purged when a node's mailbox closes)
//! ```

mod ack;
mod actor;
mod context;
mod elements;
pub mod error;
pub mod events;
pub mod listeners;
mod membership;
mod mutator;
pub mod notify;
pub mod query;
pub mod scatter;
pub mod tree;

pub use actor::NodeHandle;
pub use error::{Result, TreeError};
pub use events::{EventBus, NodeEvents, TreeEvent};
pub use listeners::{DomEvent, EventListener, EventRegistry, ListenerOptions};
pub use notify::{JsonEncoder, MutationKind, MutationOptions, MutationRecord, NodeEncoder};
pub use query::QueryEngine;
pub use tree::{Tree, TreeConfig};
