// Thin namespace wrapper for API-layer components
pub mod handlers {
    pub use crate::handlers::*;
}

pub mod token_handler {
    pub use crate::token_handler::*;
}

pub mod solbot_handler {
    pub use crate::solbot_handler::*;
}

pub mod app {
    pub use crate::app::*;
}

pub mod auth {
    pub use crate::auth::*;
}
