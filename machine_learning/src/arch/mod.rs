pub mod activations;
pub mod layers;
mod mode;
mod sequential;

pub use mode::Mode;
pub use sequential::Sequential;
