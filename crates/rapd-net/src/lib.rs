pub mod dispatch;
pub use dispatch::{DispatchError, LaunchAction, RetryPolicy, dispatch};

pub mod server;
pub use server::{
    CommandReceiver, ControlServer, Received, ServerConfig, ServerError, ServerHandle,
};
