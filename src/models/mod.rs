pub mod descriptor;
pub mod probe;

pub use descriptor::*;
pub use probe::*;
