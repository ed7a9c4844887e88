pub mod restaurant;
pub mod risk;

pub use restaurant::*;
pub use risk::*;
