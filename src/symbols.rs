use std::collections::BTreeMap;

use crate::Error;

/// A single variable with its resolved absolute address.
#[derive(Debug, Clone)]
#[cfg_attr(test, derive(PartialEq, Eq))]
pub struct Symbol {
    /// Fully qualified variable name.
    ///
    /// Nested structure members are joined with `.`, array elements carry
    /// their index list in brackets, e.g. `motors[2].speed`.
    pub name: String,
    /// Absolute address, e.g. `DB7:12.3` for a data block variable or
    /// `I0.0`/`M10.1`/`Q4.2` for a Symbol List entry.
    pub code: String,
    /// Declared data type, e.g. `BOOL`, `STRING [32]` or
    /// `ARRAY [1..5, -3..0] OF INT`.
    pub datatype: String,
    /// Declaration-section tag (`In`, `Out`, `InOut`, `Var`, `Struct`)
    /// and/or the source-line comment, joined by `; `.
    pub comment: String,
}

/// An ordered list of symbols belonging to one data block or to the Symbol
/// List of a device.
#[derive(Debug, Clone)]
#[cfg_attr(test, derive(PartialEq, Eq))]
pub struct Block {
    /// `Symbol List`, or `DB<n>` with the user-given name appended in
    /// parentheses when one exists.
    pub name: String,
    /// Symbols in source declaration order.
    pub symbols: Vec<Symbol>,
}

/// All symbol information extracted for one controller device.
#[derive(Debug)]
pub struct DeviceSymbolInfo {
    /// Concatenation of station type, station name, device name and program
    /// name, e.g. `S7-300: Station1 -> CPU315 -> MyProgram`.
    pub name: String,
    /// Blocks in discovery order; the Symbol List block comes first.
    pub blocks: Vec<Block>,
    /// User-given data block names, keyed by data block number.
    pub db_names: BTreeMap<u32, String>,
    /// Non-fatal problems encountered while parsing this device.
    pub warnings: Vec<Error>,
}
