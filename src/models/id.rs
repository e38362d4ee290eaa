/// Identifier types shared with the simulation collaborator
///
/// The collaborator names vehicles, lanes and edges with plain strings
/// (`m.0`, `E0_0`, `:J1_0_0`). Each kind gets its own newtype so a lane id
/// can never be passed where a vehicle id is expected.
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Vehicle identifier, e.g. `m.12` (mainline flow) or `r.3` (ramp flow)
    VehicleId
);
string_id!(
    /// Lane identifier, including junction-internal lanes such as `:J1_0_0`
    LaneId
);
string_id!(
    /// Edge (road section) identifier; an edge groups one or more lanes
    EdgeId
);
