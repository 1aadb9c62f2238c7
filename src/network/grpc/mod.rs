pub mod client;
pub mod server;
pub mod thread;

pub use client::{GrpcConnector, GrpcPeer};
pub use server::OverlayService;
pub use thread::GrpcThread;
