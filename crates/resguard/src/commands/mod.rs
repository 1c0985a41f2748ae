mod info;
mod obfuscate;

pub use info::*;
pub use obfuscate::*;
