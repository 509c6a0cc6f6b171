pub mod collector;
pub mod resolver;
pub mod router;

pub use collector::*;
pub use resolver::*;
pub use router::*;
