use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two converging traffic origins feeding the merge segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stream {
    Mainline,
    Ramp,
}

impl Stream {
    pub const ALL: [Self; 2] = [Self::Mainline, Self::Ramp];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Mainline => "mainline",
            Self::Ramp => "ramp",
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
