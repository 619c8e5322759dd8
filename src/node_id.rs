//! Lightweight handles for everything stored in a [`FlowGraph`](crate::graph::FlowGraph).
//!
//! Nodes, ports and block ports are addressed by generated integer handles
//! instead of live references, so "owner", "opposite" and "connected"
//! relations are plain lookups into the arena. Handles are allocated from a
//! single monotonically increasing counter, which makes their ordering equal
//! to their creation order; the planner relies on that for deterministic
//! iteration.
//!
//! They're small, `Copy`, ordered and hashable, so they can be used as keys
//! in maps or sets when traversing or copying a graph.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
        pub struct $name(u64);

        impl $name {
            /// Create a handle from its raw value (used internally by the arena).
            pub(crate) const fn new(v: u64) -> Self {
                Self(v)
            }

            /// Return the underlying numeric value.
            ///
            /// Useful mainly for debugging or serialization.
            #[must_use]
            pub const fn raw(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

handle!(
    /// Unique identifier for a node in a flow graph.
    NodeId,
    "n"
);
handle!(
    /// Unique identifier for an input port of a node.
    InputId,
    "i"
);
handle!(
    /// Unique identifier for an output port of a node.
    OutputId,
    "o"
);
handle!(
    /// Unique identifier for a block.
    BlockId,
    "b"
);
handle!(
    /// Unique identifier for a block-level input port.
    BlockInputId,
    "bi"
);
handle!(
    /// Unique identifier for a block-level output port.
    BlockOutputId,
    "bo"
);

/// Handle generator shared by all handle kinds of one arena.
#[derive(Clone, Debug, Default)]
pub(crate) struct IdGen {
    next: u64,
}

impl IdGen {
    pub(crate) fn next_raw(&mut self) -> u64 {
        let v = self.next;
        self.next += 1;
        v
    }

    pub(crate) fn node(&mut self) -> NodeId {
        NodeId::new(self.next_raw())
    }

    pub(crate) fn input(&mut self) -> InputId {
        InputId::new(self.next_raw())
    }

    pub(crate) fn output(&mut self) -> OutputId {
        OutputId::new(self.next_raw())
    }

    pub(crate) fn block(&mut self) -> BlockId {
        BlockId::new(self.next_raw())
    }

    pub(crate) fn block_input(&mut self) -> BlockInputId {
        BlockInputId::new(self.next_raw())
    }

    pub(crate) fn block_output(&mut self) -> BlockOutputId {
        BlockOutputId::new(self.next_raw())
    }
}
