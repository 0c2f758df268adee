pub mod chord;
pub mod conversions;
pub mod maintenance;
pub mod setup;
pub mod snapshot;
pub mod transport;
