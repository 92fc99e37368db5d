#![allow(non_snake_case)]

mod assembler;
mod error;
mod midi_exporter;
mod model;
mod roll_loader;
mod transcriber;
mod util;

pub use assembler::*;
pub use error::*;
pub use midi_exporter::*;
pub use model::config::*;
pub use model::song::*;
pub use roll_loader::*;
pub use transcriber::*;
pub use util::*;
