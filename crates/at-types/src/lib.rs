pub mod param;
pub mod domain;
pub mod arm;
pub mod goals;
pub mod errors;

pub use param::*;
pub use domain::*;
pub use arm::*;
pub use goals::*;
pub use errors::*;
