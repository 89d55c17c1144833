pub mod gate;

pub use gate::{ApprovedContext, ClientHandle, HxRequest};
