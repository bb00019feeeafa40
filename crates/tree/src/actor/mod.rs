//! Node actors
//!
//! One tokio task per node. The task exclusively owns the node's mutable
//! state and processes its mailbox one message at a time; everyone else
//! holds a [`NodeHandle`].

mod command;
mod handle;
mod node;

pub(crate) use command::{Command, Mutation};
pub use handle::NodeHandle;
pub(crate) use node::spawn;
