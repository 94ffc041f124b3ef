//! Remote-call plumbing: status codes, the client transport contract, the
//! inbound service stack, the in-process transport and the service handlers.

pub mod handlers;
pub mod loopback;
pub mod server;
pub mod status;
pub mod transport;

pub use handlers::{MetadataRpcHandler, RatingRpcHandler};
pub use loopback::LoopbackTransport;
pub use server::{build_rpc_stack, RpcHandler, RpcServer, RpcStack};
pub use status::{RemoteError, StatusCode};
pub use transport::{RemoteConnection, RemoteTransport, RpcRequest};
