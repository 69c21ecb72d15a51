mod profile;
pub use profile::*;

pub use profiling;
