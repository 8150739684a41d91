// Domain-layer modules and shared errors/models
pub mod assistant {
    pub use crate::assistant::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod normalize {
    pub use crate::normalize::*;
}

pub mod errors {
    pub use crate::errors::*;
}
