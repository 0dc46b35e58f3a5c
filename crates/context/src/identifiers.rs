//! Newtype identifiers.
//!
//! Each identity in the context hierarchy is a distinct newtype wrapping a
//! UUID. This prevents accidentally interchanging a [`ContextId`] with a
//! [`RunId`] even though both are UUIDs under the hood.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for UUID-wrapped newtypes.
// Generates: struct (Copy), new_random(), from_uuid(), as_uuid(), Display.
// ---------------------------------------------------------------------------
macro_rules! uuid_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a new random identifier.
            pub fn new_random() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Returns the underlying [`Uuid`].
            pub fn as_uuid(self) -> Uuid {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id! {
    /// Identifies one node of the context hierarchy.
    ///
    /// Assigned when the context is created and attached to every tracing
    /// event the context emits, so activity from sibling contexts running on
    /// different threads can be told apart.
    ContextId
}

uuid_id! {
    /// Identifies a single top-level run (one root context and everything
    /// beneath it).
    RunId
}
