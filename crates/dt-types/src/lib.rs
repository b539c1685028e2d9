pub mod circuit;
pub mod errors;
pub mod observation;

pub use circuit::*;
pub use errors::*;
pub use observation::*;
