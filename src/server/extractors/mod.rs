mod edge_authentication_extractor;
mod owner_extractor;
mod validation_extractor;

pub use edge_authentication_extractor::*;
pub use owner_extractor::*;
pub use validation_extractor::*;
