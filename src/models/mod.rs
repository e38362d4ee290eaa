mod commitment;
mod id;
mod lane;
mod stream;
mod trajectory;

pub use commitment::{is_time_ordered, CommitmentRecord};
pub use id::{EdgeId, LaneId, VehicleId};
pub use lane::{LaneChain, LaneLocation, LaneSegment};
pub use stream::Stream;
pub use trajectory::{Profile, Sample, Trajectory, TrajectoryFrame};
