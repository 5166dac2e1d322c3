//! External service integrations.

pub mod gateway_client {
    pub use crate::gateway_client::*;
}

pub mod chat_stream {
    pub use crate::chat_stream::*;
}

pub mod credit_sources {
    pub use crate::credit_sources::*;
}
