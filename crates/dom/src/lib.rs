//! Live document node model
//!
//! Runtime-free half of the live tree: node snapshots, the selector AST,
//! the pure selector matcher, and the snapshot arena.
//!
//! ## Core Design
//!
//! ```text
//! NodeInit → DomNode (one per node, published as Arc snapshots)
//!                ↓
//!           DomArena (id → snapshot) → matcher::matches(node, &Selector)
//! ```

pub mod arena;
pub mod error;
pub mod matcher;
pub mod selector;
pub mod types;

pub use arena::DomArena;
pub use error::{DomError, Result};
pub use matcher::{match_node, matches};
pub use selector::{AttributeSelector, ChainStep, Combinator, Comparator, Selector};
pub use types::*;
