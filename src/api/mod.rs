// Thin namespace wrapper for HTTP-layer components
pub mod handlers {
    pub use crate::handlers::*;
}

pub mod admin_handlers {
    pub use crate::admin_handlers::*;
}

pub mod routes {
    pub use crate::routes::*;
}

pub mod session {
    pub use crate::session::*;
}
