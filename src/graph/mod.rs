pub mod arbiter;
pub mod builder;
pub mod elements;
pub mod media_file;
pub mod registry;
pub mod source;
pub mod stage;
pub mod topology;

pub use arbiter::{DeviceArbiter, DeviceLease, Holder};
pub use builder::{BuildReport, GraphBuilder, SkippedEntry};
pub use registry::StageRegistry;
pub use source::{Source, SourceFactory, SourceInfo, TrackInfo};
pub use stage::{
    Buffer, PortEvent, Stage, StageContext, StageFactory, StageFault, StageState, StateChange,
};
pub use topology::{Bin, Direction, Graph, LinkError, Port, PortOwner, StageBody, StageNode};
