#![doc = include_str!("../README.md")]

mod dbf;
mod device_id;
mod error;
mod mc5;
mod project;
mod subblocks;
mod symbol_list;
mod symbols;
mod text;
mod tokenizer;

pub use self::dbf::*;
pub use self::error::*;
pub use self::mc5::BlockKind;
pub use self::project::*;
pub use self::symbols::*;
