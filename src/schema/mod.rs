//! Schema derivation: from entity metadata to a flat column schema.

mod builder;
mod descriptor;
mod discriminator;
mod provider;

pub use builder::*;
pub use descriptor::*;
pub use discriminator::*;
pub use provider::*;
