//! Execution contexts.
//!
//! A [`Stream`] is the ordering and dependency domain work units are
//! submitted through: in-order streams serialize implicitly, out-of-order
//! streams run anything whose declared dependencies have fired. The
//! topologies under benchmark differ only in how many streams they use,
//! each stream's ordering mode, and which [`Token`]s submissions depend
//! on; the submission code path is the same for all of them.

mod event;
mod stream;

pub use event::Token;
pub use stream::{Stream, StreamOrder};
