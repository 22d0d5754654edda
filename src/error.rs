use thiserror::Error;

use crate::BlockKind;

/// Errors produced while reading a STEP 7 project.
///
/// Errors returned from [`parse_project`](crate::parse_project) are fatal and
/// abort the pipeline. Errors stored in
/// [`DeviceSymbolInfo::warnings`](crate::DeviceSymbolInfo) are non-fatal;
/// parsing continued with the next data block.
#[derive(Error, Debug)]
pub enum Error {
    /// The version byte does not identify a dBASE III table.
    #[error("Not a dBASE III table: version byte {0:#04x}")]
    NotDbf(u8),
    /// The table header and the field descriptors disagree.
    #[error("Malformed dBASE table header")]
    MalformedHeader,
    /// A required column is missing from a table.
    #[error("Field {0:?} does not exist in this table")]
    MissingField(String),
    /// The table ended in the middle of a record.
    #[error("Truncated record in dBASE table")]
    TruncatedRecord,
    /// An error wrapped with the pipeline stage or file it occurred in.
    #[error("{context}: {source}")]
    Context {
        /// Pipeline stage or file name.
        context: String,
        /// The underlying error.
        source: Box<Error>,
    },
    /// A column that must hold a decimal number holds something else.
    #[error("Invalid {field} value {value:?} in {table}")]
    InvalidNumber {
        /// Table file name.
        table: &'static str,
        /// Column name.
        field: &'static str,
        /// The offending cell content.
        value: String,
    },
    /// A Symbol List row references a device that does not exist.
    #[error("Could not find a device for Symbol List {0}")]
    UnknownSymbolList(u32),
    /// A Subblock List matched a device id but no device entry exists.
    #[error("Could not find a device entry for {name:?} and Subblock List {id}")]
    UnknownDevice {
        /// Device name from the id tables.
        name: String,
        /// Subblock List id.
        id: u32,
    },
    /// A data block instantiates a function block that is not in the project.
    #[error("Could not find referenced FB{fb} while parsing DB{db}")]
    MissingFb {
        /// Referenced function block number.
        fb: u32,
        /// Data block being parsed.
        db: u32,
    },
    /// A declaration ended where more tokens were required.
    #[error("Expected {expected} but found end of input while parsing {variable}")]
    UnexpectedEnd {
        /// What the parser was looking for.
        expected: &'static str,
        /// Variable being parsed.
        variable: String,
    },
    /// A declaration token does not fit the grammar.
    #[error("Expected {expected} but found {found:?} while parsing {variable}")]
    UnexpectedToken {
        /// What the parser was looking for.
        expected: &'static str,
        /// The token actually read.
        found: String,
        /// Variable being parsed.
        variable: String,
    },
    /// A declaration section starts with an unknown keyword.
    #[error("Unknown section keyword {keyword:?} while parsing DB{db}")]
    UnknownSection {
        /// The offending keyword.
        keyword: String,
        /// Data block being parsed.
        db: u32,
    },
    /// `END_STRUCT` was not followed by a semicolon.
    #[error("Expected semicolon after END_STRUCT but found {0:?}")]
    UnterminatedStruct(String),
    /// A variable uses a primitive type this parser does not know.
    #[error("Variable {variable} of DB{db} has unknown primitive type {type_name:?}")]
    UnknownType {
        /// Variable being parsed.
        variable: String,
        /// Data block being parsed.
        db: u32,
        /// The unknown type token.
        type_name: String,
    },
    /// A variable references a block that is not in the Subblock List.
    #[error("Variable {variable} of DB{db} references {kind}{number}, which could not be found")]
    MissingBlock {
        /// Variable being parsed.
        variable: String,
        /// Data block being parsed.
        db: u32,
        /// Kind of the referenced block.
        kind: BlockKind,
        /// Number of the referenced block.
        number: u32,
    },
    /// A block reference expands to a declaration that references it back.
    #[error("{kind}{number} references itself while expanding {variable} of DB{db}")]
    RecursiveBlock {
        /// Variable being parsed.
        variable: String,
        /// Data block being parsed.
        db: u32,
        /// Kind of the self-referencing block.
        kind: BlockKind,
        /// Number of the self-referencing block.
        number: u32,
    },
    /// An array declares more dimensions than STEP 7 allows.
    #[error("Array variable {0} exceeds the maximum number of dimensions")]
    TooManyDimensions(String),
    /// An array start index does not fit a 16-bit signed integer.
    #[error("Start index {index} is out of range while parsing {variable}")]
    StartIndexOutOfRange {
        /// The offending index.
        index: i32,
        /// Variable being parsed.
        variable: String,
    },
    /// An array end index is out of range or below the start index.
    #[error("End index {index} is out of range while parsing {variable} (start index {start})")]
    EndIndexOutOfRange {
        /// The offending index.
        index: i32,
        /// The already accepted start index.
        start: i32,
        /// Variable being parsed.
        variable: String,
    },
    /// Input/output error.
    #[error("Input/output error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}
