//! MC5 declaration parser and data block layout engine.
//!
//! Every data block (or the function block it instantiates) carries a
//! Pascal-like declaration text. Parsing walks that text while advancing a
//! bit address counter according to STEP 7's alignment and packing rules, so
//! that every leaf variable comes out with its exact byte/bit offset.

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;

use log::warn;

use crate::subblocks::Mc5CodeMaps;
use crate::symbols::Block;
use crate::symbols::DeviceSymbolInfo;
use crate::symbols::Symbol;
use crate::text::from_windows_1252;
use crate::text::parse_i32;
use crate::text::parse_u32;
use crate::tokenizer::Tokenizer;
use crate::Error;

// See "Programmieren mit STEP 7", A5E02789665-01, page 597.
const MAX_ARRAY_DIMENSIONS: usize = 6;

/// Kinds of blocks that a declaration can reference by number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Function block.
    Fb,
    /// System function block.
    Sfb,
    /// User-defined type.
    Udt,
}

impl BlockKind {
    fn from_token(token: &[u8]) -> Option<Self> {
        match token {
            b"FB" => Some(Self::Fb),
            b"SFB" => Some(Self::Sfb),
            b"UDT" => Some(Self::Udt),
            _ => None,
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fb => "FB",
            Self::Sfb => "SFB",
            Self::Udt => "UDT",
        })
    }
}

struct PrimitiveType {
    name: &'static str,
    byte_alignment: u64,
    byte_size: u64,
}

const PRIMITIVE_TYPES: [PrimitiveType; 20] = [
    PrimitiveType { name: "BYTE", byte_alignment: 1, byte_size: 1 },
    PrimitiveType { name: "CHAR", byte_alignment: 1, byte_size: 1 },
    PrimitiveType { name: "INT", byte_alignment: 2, byte_size: 2 },
    PrimitiveType { name: "WORD", byte_alignment: 2, byte_size: 2 },
    PrimitiveType { name: "COUNTER", byte_alignment: 2, byte_size: 2 },
    PrimitiveType { name: "DATE", byte_alignment: 2, byte_size: 2 },
    PrimitiveType { name: "TIMER", byte_alignment: 2, byte_size: 2 },
    PrimitiveType { name: "S5TIME", byte_alignment: 2, byte_size: 2 },
    PrimitiveType { name: "BLOCK_DB", byte_alignment: 2, byte_size: 2 },
    PrimitiveType { name: "BLOCK_FB", byte_alignment: 2, byte_size: 2 },
    PrimitiveType { name: "BLOCK_FC", byte_alignment: 2, byte_size: 2 },
    PrimitiveType { name: "BLOCK_SDB", byte_alignment: 2, byte_size: 2 },
    PrimitiveType { name: "DINT", byte_alignment: 2, byte_size: 4 },
    PrimitiveType { name: "DWORD", byte_alignment: 2, byte_size: 4 },
    PrimitiveType { name: "REAL", byte_alignment: 2, byte_size: 4 },
    PrimitiveType { name: "TIME", byte_alignment: 2, byte_size: 4 },
    PrimitiveType { name: "TIME_OF_DAY", byte_alignment: 2, byte_size: 4 },
    PrimitiveType { name: "POINTER", byte_alignment: 2, byte_size: 6 },
    PrimitiveType { name: "DATE_AND_TIME", byte_alignment: 2, byte_size: 8 },
    PrimitiveType { name: "ANY", byte_alignment: 2, byte_size: 10 },
];

/// One `start..end` range of an array declaration.
#[derive(Debug, Clone, Copy)]
struct ArrayDimension {
    start: i16,
    end: i16,
}

impl ArrayDimension {
    fn len(&self) -> u64 {
        (i32::from(self.end) - i32::from(self.start) + 1) as u64
    }
}

impl fmt::Display for ArrayDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Row-major enumeration of all index tuples of an array.
///
/// For `ARRAY [-5..5, 1..2, 3..4]` the order is
/// `-5,1,3 | -5,1,4 | -5,2,3 | -5,2,4 | -4,1,3 | ...`.
struct ArrayIndexes<'a> {
    dimensions: &'a [ArrayDimension],
    next: Option<Vec<i16>>,
}

impl<'a> ArrayIndexes<'a> {
    fn new(dimensions: &'a [ArrayDimension]) -> Self {
        let first = dimensions.iter().map(|dimension| dimension.start).collect();
        Self {
            dimensions,
            next: Some(first),
        }
    }
}

impl Iterator for ArrayIndexes<'_> {
    type Item = Vec<i16>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        // Increment from the last dimension to the first; once every
        // dimension has wrapped, the enumeration is over.
        let mut incremented = current.clone();
        for i in (0..incremented.len()).rev() {
            if incremented[i] != self.dimensions[i].end {
                incremented[i] += 1;
                for j in i + 1..incremented.len() {
                    incremented[j] = self.dimensions[j].start;
                }
                self.next = Some(incremented);
                break;
            }
        }
        Some(current)
    }
}

/// Layout state shared between a data block's top-level parser and every
/// recursively entered block reference.
struct ParseContext<'a> {
    symbols: &'a mut Vec<Symbol>,
    bit_addr: u64,
    db_number: u32,
    maps: &'a Mc5CodeMaps,
    /// Block references currently being expanded, to catch self-references.
    expanding: Vec<(BlockKind, u32)>,
}

impl ParseContext<'_> {
    fn align_up(&mut self, bit_alignment: u64) {
        let mask = bit_alignment - 1;
        self.bit_addr = (self.bit_addr + mask) & !mask;
    }
}

struct Mc5Parser<'a, 'c> {
    tokens: Tokenizer<'a>,
    ctx: &'c mut ParseContext<'a>,
}

impl<'a> Mc5Parser<'a, '_> {
    fn parse(&mut self, prefix: &str) -> Result<(), Error> {
        loop {
            let Some(section) = self.parse_section_keyword()? else {
                return Ok(());
            };
            if !self.parse_section_body(section, prefix)? {
                return Ok(());
            }
            // Each new section starts on a 2-byte boundary.
            self.ctx.align_up(2 * 8);
        }
    }

    /// The `VAR`/`VAR_INPUT`/... keyword opening the next section, mapped to
    /// its comment tag.
    ///
    /// Returns `None` at end of input and on `VAR_TEMP`: temporaries live on
    /// the stack and carry no addressable offset, and neither does anything
    /// declared after them.
    fn parse_section_keyword(&mut self) -> Result<Option<&'static str>, Error> {
        let Some(token) = self.tokens.next_token(b"", false) else {
            return Ok(None);
        };
        let section = match token {
            b"VAR_INPUT" => "In",
            b"VAR_OUTPUT" => "Out",
            b"VAR_IN_OUT" => "InOut",
            b"VAR" => "Var",
            b"STRUCT" => "Struct",
            b"VAR_TEMP" => return Ok(None),
            _ => {
                return Err(Error::UnknownSection {
                    keyword: from_windows_1252(token),
                    db: self.ctx.db_number,
                })
            }
        };
        Ok(Some(section))
    }

    /// The variable list of one section or inner `STRUCT`.
    ///
    /// Returns `false` when the input ended inside the list.
    fn parse_section_body(&mut self, section: &'static str, prefix: &str) -> Result<bool, Error> {
        loop {
            let Some(token) = self.tokens.next_token(b":;", false) else {
                return Ok(false);
            };
            match token {
                b"END_VAR" => return Ok(true),
                b"END_STRUCT" => {
                    // END_STRUCT concludes with a final semicolon.
                    let Some(token) = self.tokens.next_token(b";", false) else {
                        return Ok(false);
                    };
                    if token != b";" {
                        return Err(Error::UnterminatedStruct(from_windows_1252(token)));
                    }
                    return Ok(true);
                }
                _ => {
                    let name = format!("{prefix}{}", from_windows_1252(token));
                    self.add_variable(section, name)?;
                }
            }
        }
    }

    fn add_variable(&mut self, section: &'static str, name: String) -> Result<(), Error> {
        let mut token = self.expect_token(b":{", "colon or opening brace", &name)?;
        if token == b"{" {
            // An attribute list; nothing in it is address-relevant.
            loop {
                token = self.expect_token(b"}", "closing brace", &name)?;
                if token == b"}" {
                    break;
                }
            }
            token = self.expect_token(b":", "colon", &name)?;
        }
        if token != b":" {
            return Err(Error::UnexpectedToken {
                expected: "colon",
                found: from_windows_1252(token),
                variable: name,
            });
        }
        let variable_type = self.expect_token(b";[:", "variable type", &name)?;
        if variable_type == b"ARRAY" {
            self.add_array_variable(section, name)
        } else {
            self.add_single_variable(section, name, variable_type)
        }
    }

    fn add_single_variable(
        &mut self,
        section: &'static str,
        name: String,
        variable_type: &[u8],
    ) -> Result<(), Error> {
        if variable_type == b"STRUCT" {
            self.add_struct_variable(name)
        } else if let Some(kind) = BlockKind::from_token(variable_type) {
            self.add_block_variable(name, kind)
        } else {
            self.add_primitive_variable(section, name, variable_type, &[])
        }
    }

    fn add_struct_variable(&mut self, name: String) -> Result<(), Error> {
        let prefix = format!("{name}.");
        self.parse_section_body("Struct", &prefix)?;
        Ok(())
    }

    /// Lays out a block reference by inlining the referenced declaration.
    ///
    /// The sub-parse runs over the referenced block's own text but shares
    /// this parser's bit address counter and symbol list.
    fn add_block_variable(&mut self, name: String, kind: BlockKind) -> Result<(), Error> {
        // Block references start on a 2-byte boundary.
        self.ctx.align_up(2 * 8);
        let token = self.expect_token(b";", "block number", &name)?;
        let Some(number) = parse_u32(token) else {
            return Err(Error::UnexpectedToken {
                expected: "block number",
                found: from_windows_1252(token),
                variable: name,
            });
        };
        self.skip_to_semicolon();
        let maps = self.ctx.maps;
        let Some(mc5code) = maps.block(kind).get(&number) else {
            return Err(Error::MissingBlock {
                variable: name,
                db: self.ctx.db_number,
                kind,
                number,
            });
        };
        if self.ctx.expanding.contains(&(kind, number)) {
            return Err(Error::RecursiveBlock {
                variable: name,
                db: self.ctx.db_number,
                kind,
                number,
            });
        }
        self.ctx.expanding.push((kind, number));
        let prefix = format!("{name}.");
        let mut parser = Mc5Parser {
            tokens: Tokenizer::new(mc5code),
            ctx: &mut *self.ctx,
        };
        let result = parser.parse(&prefix);
        self.ctx.expanding.pop();
        result
    }

    fn add_array_variable(&mut self, section: &'static str, name: String) -> Result<(), Error> {
        // Arrays start on a 2-byte boundary.
        self.ctx.align_up(2 * 8);
        let token = self.expect_token(b"[", "opening bracket", &name)?;
        if token != b"[" {
            return Err(Error::UnexpectedToken {
                expected: "opening bracket",
                found: from_windows_1252(token),
                variable: name,
            });
        }
        let mut dimensions = Vec::new();
        loop {
            if dimensions.len() == MAX_ARRAY_DIMENSIONS {
                return Err(Error::TooManyDimensions(name));
            }
            dimensions.push(self.next_array_dimension(&name)?);
            let token = self.expect_token(b",]", "comma or closing bracket", &name)?;
            match token {
                b"]" => break,
                b"," => {}
                _ => {
                    return Err(Error::UnexpectedToken {
                        expected: "comma or closing bracket",
                        found: from_windows_1252(token),
                        variable: name,
                    })
                }
            }
        }
        let token = self.expect_token(b"", "\"OF\"", &name)?;
        if token != b"OF" {
            return Err(Error::UnexpectedToken {
                expected: "\"OF\"",
                found: from_windows_1252(token),
                variable: name,
            });
        }
        let element_type = self.expect_token(b";[:", "element type", &name)?;
        if element_type == b"STRUCT" || BlockKind::from_token(element_type).is_some() {
            // Complex element types are unpacked: the element body is
            // re-read once per index tuple, laying out each element in turn.
            let saved_position = self.tokens.position();
            for indexes in ArrayIndexes::new(&dimensions) {
                self.tokens.seek(saved_position);
                let mut element_name = format!("{name}[");
                for (i, index) in indexes.iter().enumerate() {
                    if i > 0 {
                        element_name.push(',');
                    }
                    let _ = write!(element_name, "{index}");
                }
                element_name.push(']');
                if let Some(kind) = BlockKind::from_token(element_type) {
                    self.add_block_variable(element_name, kind)?;
                } else {
                    self.add_struct_variable(element_name)?;
                }
            }
        } else {
            self.add_primitive_variable(section, name, element_type, &dimensions)?;
        }
        // Variables after an array always start on a 2-byte boundary.
        self.ctx.align_up(2 * 8);
        Ok(())
    }

    fn next_array_dimension(&mut self, name: &str) -> Result<ArrayDimension, Error> {
        let token = self.expect_token(b".", "start index", name)?;
        let Some(start) = parse_i32(token) else {
            return Err(Error::UnexpectedToken {
                expected: "start index",
                found: from_windows_1252(token),
                variable: name.to_string(),
            });
        };
        if start < i32::from(i16::MIN) || start > i32::from(i16::MAX) {
            return Err(Error::StartIndexOutOfRange {
                index: start,
                variable: name.to_string(),
            });
        }
        for _ in 0..2 {
            let token = self.expect_token(b".", "dot", name)?;
            if token != b"." {
                return Err(Error::UnexpectedToken {
                    expected: "dot",
                    found: from_windows_1252(token),
                    variable: name.to_string(),
                });
            }
        }
        let token = self.expect_token(b",]", "end index", name)?;
        let Some(end) = parse_i32(token) else {
            return Err(Error::UnexpectedToken {
                expected: "end index",
                found: from_windows_1252(token),
                variable: name.to_string(),
            });
        };
        if end < i32::from(i16::MIN) || end > i32::from(i16::MAX) || end < start {
            return Err(Error::EndIndexOutOfRange {
                index: end,
                start,
                variable: name.to_string(),
            });
        }
        Ok(ArrayDimension {
            start: start as i16,
            end: end as i16,
        })
    }

    fn add_primitive_variable(
        &mut self,
        section: &'static str,
        name: String,
        variable_type: &[u8],
        dimensions: &[ArrayDimension],
    ) -> Result<(), Error> {
        // Elements of multi-dimensional arrays are laid out linearly without
        // padding between dimensions; only BOOL packs differently.
        let element_count = dimensions
            .iter()
            .map(ArrayDimension::len)
            .fold(1_u64, u64::saturating_mul);
        let bit_addr;
        let mut full_type = String::new();
        if variable_type == b"BOOL" {
            // BOOL works on the current address with no extra alignment.
            bit_addr = self.ctx.bit_addr;
            if dimensions.len() > 1 {
                // A multi-dimensional BOOL array needs one bit per element of
                // the last dimension, but aligns up to a byte boundary for
                // every run over the other dimensions:
                // ARRAY[1..2, 1..8] OF BOOL occupies 2 bytes,
                // ARRAY[1..8, 1..2] OF BOOL occupies 8 bytes.
                let last_dimension_len = dimensions[dimensions.len() - 1].len();
                let runs = element_count / last_dimension_len;
                for _ in 0..runs {
                    self.ctx.align_up(8);
                    self.ctx.bit_addr += last_dimension_len;
                }
            } else {
                self.ctx.bit_addr += element_count;
            }
        } else if variable_type == b"STRING" {
            let token = self.expect_token(b"[", "opening bracket", &name)?;
            if token != b"[" {
                return Err(Error::UnexpectedToken {
                    expected: "opening bracket",
                    found: from_windows_1252(token),
                    variable: name,
                });
            }
            let token = self.expect_token(b"]", "character count", &name)?;
            let Some(character_count) = parse_u32(token) else {
                return Err(Error::UnexpectedToken {
                    expected: "character count",
                    found: from_windows_1252(token),
                    variable: name,
                });
            };
            full_type = format!("STRING [{character_count}]");
            // Two length bytes precede the characters.
            let string_bits = (2 + u64::from(character_count)) * 8;
            self.ctx.align_up(2 * 8);
            bit_addr = self.ctx.bit_addr;
            for _ in 0..element_count {
                // Each element starts on its own 2-byte boundary; the byte
                // count itself can be odd.
                self.ctx.align_up(2 * 8);
                self.ctx.bit_addr += string_bits;
            }
        } else {
            let Some(primitive) = PRIMITIVE_TYPES
                .iter()
                .find(|primitive| primitive.name.as_bytes() == variable_type)
            else {
                return Err(Error::UnknownType {
                    variable: name,
                    db: self.ctx.db_number,
                    type_name: from_windows_1252(variable_type),
                });
            };
            self.ctx.align_up(primitive.byte_alignment * 8);
            bit_addr = self.ctx.bit_addr;
            self.ctx.bit_addr += primitive.byte_size * 8 * element_count;
        }
        self.skip_to_semicolon();
        let trailing_comment = self.trailing_comment();
        let mut datatype = String::new();
        if element_count > 1 {
            datatype.push_str("ARRAY [");
            for (i, dimension) in dimensions.iter().enumerate() {
                if i > 0 {
                    datatype.push_str(", ");
                }
                let _ = write!(datatype, "{dimension}");
            }
            datatype.push_str("] OF ");
        }
        if full_type.is_empty() {
            datatype.push_str(&from_windows_1252(variable_type));
        } else {
            datatype.push_str(&full_type);
        }
        let mut comment = section.to_string();
        if let Some(trailing_comment) = trailing_comment {
            comment.push_str("; ");
            comment.push_str(&trailing_comment);
        }
        let code = format!(
            "DB{}:{}.{}",
            self.ctx.db_number,
            bit_addr / 8,
            bit_addr % 8
        );
        self.ctx.symbols.push(Symbol {
            name,
            code,
            datatype,
            comment,
        });
        Ok(())
    }

    /// Consumes tokens up to the final semicolon of a declaration, or to the
    /// end of input.
    fn skip_to_semicolon(&mut self) {
        while let Some(token) = self.tokens.next_token(b";", false) {
            if token == b";" {
                break;
            }
        }
    }

    /// Harvests the last line comment following a declaration, if any.
    ///
    /// A non-comment token read too far is pushed back for the caller.
    fn trailing_comment(&mut self) -> Option<String> {
        let mut comment = None;
        while let Some(token) = self.tokens.next_token(b":{", true) {
            if let Some(body) = token.strip_prefix(b"//") {
                comment = if body.is_empty() {
                    None
                } else {
                    Some(from_windows_1252(body))
                };
            } else {
                self.tokens.rewind(token.len());
                break;
            }
        }
        comment
    }

    fn expect_token(
        &mut self,
        delimiters: &[u8],
        expected: &'static str,
        variable: &str,
    ) -> Result<&'a [u8], Error> {
        self.tokens
            .next_token(delimiters, false)
            .ok_or_else(|| Error::UnexpectedEnd {
                expected,
                variable: variable.to_string(),
            })
    }
}

/// Parses one data block declaration text, appending one symbol per leaf
/// variable. The bit address counter starts at zero.
fn parse_db_declaration(
    db_number: u32,
    mc5code: &[u8],
    maps: &Mc5CodeMaps,
    symbols: &mut Vec<Symbol>,
) -> Result<(), Error> {
    let mut ctx = ParseContext {
        symbols,
        bit_addr: 0,
        db_number,
        maps,
        expanding: Vec::new(),
    };
    let mut parser = Mc5Parser {
        tokens: Tokenizer::new(mc5code),
        ctx: &mut ctx,
    };
    parser.parse("")
}

/// A data block whose own MC5 code is empty may instantiate a function
/// block; its DB reference subblock then starts with `FB<n>`. The rest of
/// those subblocks is left uninterpreted.
fn extract_fb_reference(db_ref: &BTreeMap<u32, Vec<u8>>, db_number: u32) -> Option<u32> {
    let code = db_ref.get(&db_number)?;
    let digits = code.strip_prefix(b"FB")?;
    let len = digits.iter().take_while(|b| b.is_ascii_digit()).count();
    if len == 0 {
        return None;
    }
    parse_u32(&digits[..len])
}

/// Parses every data block of one Subblock List into `device`.
///
/// Each data block gets its own block entry, named `DB<n>` plus the
/// user-given name when the Symbol List provided one. A parse failure turns
/// into a device warning; symbols extracted before the failure are kept, and
/// the remaining data blocks are still processed.
pub(crate) fn parse_dbs(device: &mut DeviceSymbolInfo, maps: &Mc5CodeMaps) {
    for (&db_number, mc5code) in &maps.db {
        let mut symbols = Vec::new();
        let result = if !mc5code.is_empty() {
            parse_db_declaration(db_number, mc5code, maps, &mut symbols)
        } else if let Some(fb_number) = extract_fb_reference(&maps.db_ref, db_number) {
            match maps.fb.get(&fb_number) {
                Some(fb_code) => parse_db_declaration(db_number, fb_code, maps, &mut symbols),
                None => {
                    warn!("DB{db_number}: referenced FB{fb_number} not found");
                    device.warnings.push(Error::MissingFb {
                        fb: fb_number,
                        db: db_number,
                    });
                    continue;
                }
            }
        } else {
            // No declaration text and no usable reference.
            continue;
        };
        if let Err(error) = result {
            warn!("DB{db_number}: {error}");
            device.warnings.push(error);
        }
        if symbols.is_empty() {
            continue;
        }
        let mut name = format!("DB{db_number}");
        if let Some(db_name) = device.db_names.get(&db_number) {
            let _ = write!(name, " ({db_name})");
        }
        device.blocks.push(Block { name, symbols });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fmt::Write as _;

    use arbtest::arbtest;

    fn parse(db: u32, code: &str, maps: &Mc5CodeMaps) -> (Vec<Symbol>, Result<(), Error>) {
        let mut symbols = Vec::new();
        let result = parse_db_declaration(db, code.as_bytes(), maps, &mut symbols);
        (symbols, result)
    }

    fn symbols(db: u32, code: &str, maps: &Mc5CodeMaps) -> Vec<Symbol> {
        let (symbols, result) = parse(db, code, maps);
        result.expect("declaration should parse");
        symbols
    }

    fn rows(symbols: &[Symbol]) -> Vec<(&str, &str, &str, &str)> {
        symbols
            .iter()
            .map(|s| {
                (
                    s.name.as_str(),
                    s.code.as_str(),
                    s.datatype.as_str(),
                    s.comment.as_str(),
                )
            })
            .collect()
    }

    fn bit_addr(code: &str) -> u64 {
        let (_, addr) = code.split_once(':').expect("code has a DB prefix");
        let (byte, bit) = addr.split_once('.').expect("code has a bit part");
        byte.parse::<u64>().expect("byte") * 8 + bit.parse::<u64>().expect("bit")
    }

    #[test]
    fn scalar_layout() {
        let maps = Mc5CodeMaps::default();
        let symbols = symbols(1, "VAR a : BOOL; b : BOOL; c : INT; END_VAR", &maps);
        assert_eq!(
            vec![
                ("a", "DB1:0.0", "BOOL", "Var"),
                ("b", "DB1:0.1", "BOOL", "Var"),
                ("c", "DB1:2.0", "INT", "Var"),
            ],
            rows(&symbols)
        );
    }

    #[test]
    fn primitive_array() {
        let maps = Mc5CodeMaps::default();
        let symbols = symbols(2, "VAR arr : ARRAY [1..3] OF DINT; END_VAR", &maps);
        assert_eq!(
            vec![("arr", "DB2:0.0", "ARRAY [1..3] OF DINT", "Var")],
            rows(&symbols)
        );
    }

    #[test]
    fn nested_structs() {
        let maps = Mc5CodeMaps::default();
        let symbols = symbols(
            3,
            "VAR s : STRUCT x : BOOL; y : STRUCT a : INT; b : INT; END_STRUCT; \
             END_STRUCT; END_VAR",
            &maps,
        );
        assert_eq!(
            vec![
                ("s.x", "DB3:0.0", "BOOL", "Struct"),
                ("s.y.a", "DB3:2.0", "INT", "Struct"),
                ("s.y.b", "DB3:4.0", "INT", "Struct"),
            ],
            rows(&symbols)
        );
    }

    #[test]
    fn array_of_udt_is_unpacked() {
        let mut maps = Mc5CodeMaps::default();
        maps.udt.insert(
            10,
            b"STRUCT p : INT; q : BOOL; END_STRUCT ;".to_vec(),
        );
        let symbols = symbols(4, "VAR t : ARRAY [0..1] OF UDT 10; END_VAR", &maps);
        assert_eq!(
            vec![
                ("t[0].p", "DB4:0.0", "INT", "Struct"),
                ("t[0].q", "DB4:2.0", "BOOL", "Struct"),
                ("t[1].p", "DB4:4.0", "INT", "Struct"),
                ("t[1].q", "DB4:6.0", "BOOL", "Struct"),
            ],
            rows(&symbols)
        );
    }

    #[test]
    fn multidimensional_array_index_order() {
        let mut maps = Mc5CodeMaps::default();
        maps.udt
            .insert(1, b"STRUCT v : BYTE; END_STRUCT ;".to_vec());
        let symbols = symbols(1, "VAR g : ARRAY [-5..-4, 1..2, 3..4] OF UDT 1; END_VAR", &maps);
        let names: Vec<&str> = symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            vec![
                "g[-5,1,3].v",
                "g[-5,1,4].v",
                "g[-5,2,3].v",
                "g[-5,2,4].v",
                "g[-4,1,3].v",
                "g[-4,1,4].v",
                "g[-4,2,3].v",
                "g[-4,2,4].v",
            ],
            names
        );
    }

    #[test]
    fn bool_matrix_packs_by_last_dimension() {
        let maps = Mc5CodeMaps::default();
        // Eight bits per row fill whole bytes: two bytes in total.
        let symbols1 = symbols(5, "VAR m : ARRAY [1..2, 1..8] OF BOOL; n : BOOL; END_VAR", &maps);
        assert_eq!(
            vec![
                ("m", "DB5:0.0", "ARRAY [1..2, 1..8] OF BOOL", "Var"),
                ("n", "DB5:2.0", "BOOL", "Var"),
            ],
            rows(&symbols1)
        );
        // Two bits per row, each row starting on its own byte: eight bytes.
        let symbols2 = symbols(5, "VAR m : ARRAY [1..8, 1..2] OF BOOL; n : INT; END_VAR", &maps);
        assert_eq!(
            vec![
                ("m", "DB5:0.0", "ARRAY [1..8, 1..2] OF BOOL", "Var"),
                ("n", "DB5:8.0", "INT", "Var"),
            ],
            rows(&symbols2)
        );
    }

    #[test]
    fn fb_sections_keep_their_tags() {
        let maps = Mc5CodeMaps::default();
        let symbols = symbols(
            6,
            "VAR_INPUT in1 : REAL; END_VAR VAR_OUTPUT out1 : BOOL; END_VAR",
            &maps,
        );
        assert_eq!(
            vec![
                ("in1", "DB6:0.0", "REAL", "In"),
                ("out1", "DB6:4.0", "BOOL", "Out"),
            ],
            rows(&symbols)
        );
    }

    #[test]
    fn single_element_array_renders_as_plain_type() {
        let maps = Mc5CodeMaps::default();
        let symbols = symbols(1, "VAR a : ARRAY [0..0] OF INT; b : INT; END_VAR", &maps);
        assert_eq!(
            vec![
                ("a", "DB1:0.0", "INT", "Var"),
                ("b", "DB1:2.0", "INT", "Var"),
            ],
            rows(&symbols)
        );
    }

    #[test]
    fn string_array_elements_are_padded_to_word_boundaries() {
        let maps = Mc5CodeMaps::default();
        let symbols = symbols(
            1,
            "VAR s : ARRAY [1..2] OF STRING [3]; t : INT; END_VAR",
            &maps,
        );
        // Each element occupies 2 + 3 bytes, padded to 6; the array ends at
        // byte 11 and the next variable starts at byte 12.
        assert_eq!(
            vec![
                ("s", "DB1:0.0", "ARRAY [1..2] OF STRING [3]", "Var"),
                ("t", "DB1:12.0", "INT", "Var"),
            ],
            rows(&symbols)
        );
    }

    #[test]
    fn scalar_string() {
        let maps = Mc5CodeMaps::default();
        let symbols = symbols(1, "VAR s : STRING [32]; b : BOOL; END_VAR", &maps);
        assert_eq!(
            vec![
                ("s", "DB1:0.0", "STRING [32]", "Var"),
                ("b", "DB1:34.0", "BOOL", "Var"),
            ],
            rows(&symbols)
        );
    }

    #[test]
    fn var_temp_ends_the_whole_declaration() {
        let maps = Mc5CodeMaps::default();
        let symbols = symbols(
            1,
            "VAR a : BOOL; END_VAR VAR_TEMP t : INT; END_VAR VAR b : INT; END_VAR",
            &maps,
        );
        assert_eq!(vec![("a", "DB1:0.0", "BOOL", "Var")], rows(&symbols));
    }

    #[test]
    fn attribute_lists_are_skipped() {
        let maps = Mc5CodeMaps::default();
        let symbols = symbols(
            1,
            "VAR a { S7_visible := 'false' } : INT; END_VAR",
            &maps,
        );
        assert_eq!(vec![("a", "DB1:0.0", "INT", "Var")], rows(&symbols));
    }

    #[test]
    fn last_trailing_comment_wins() {
        let maps = Mc5CodeMaps::default();
        let symbols = symbols(
            1,
            "VAR a : INT; //first\n//second\nb : INT; END_VAR",
            &maps,
        );
        assert_eq!(
            vec![
                ("a", "DB1:0.0", "INT", "Var; second"),
                ("b", "DB1:2.0", "INT", "Var"),
            ],
            rows(&symbols)
        );
    }

    #[test]
    fn comment_encoding_is_windows_1252() {
        let mut symbols = Vec::new();
        let maps = Mc5CodeMaps::default();
        parse_db_declaration(
            1,
            b"VAR a : INT; //F\xfcllstand\nEND_VAR",
            &maps,
            &mut symbols,
        )
        .expect("declaration should parse");
        assert_eq!("Var; F\u{00fc}llstand", symbols[0].comment);
    }

    #[test]
    fn unknown_type_is_an_error() {
        let maps = Mc5CodeMaps::default();
        let (symbols, result) = parse(1, "VAR a : FLOAT; END_VAR", &maps);
        assert!(symbols.is_empty());
        assert!(matches!(result, Err(Error::UnknownType { .. })));
    }

    #[test]
    fn dimension_limit() {
        let maps = Mc5CodeMaps::default();
        let (_, result) = parse(
            1,
            "VAR a : ARRAY [1..2, 1..2, 1..2, 1..2, 1..2, 1..2, 1..2] OF INT; END_VAR",
            &maps,
        );
        assert!(matches!(result, Err(Error::TooManyDimensions(_))));
    }

    #[test]
    fn descending_index_range_is_an_error() {
        let maps = Mc5CodeMaps::default();
        let (_, result) = parse(1, "VAR a : ARRAY [5..2] OF INT; END_VAR", &maps);
        assert!(matches!(result, Err(Error::EndIndexOutOfRange { .. })));
        let (_, result) = parse(1, "VAR a : ARRAY [40000..40001] OF INT; END_VAR", &maps);
        assert!(matches!(result, Err(Error::StartIndexOutOfRange { .. })));
    }

    #[test]
    fn sfb_references_are_inlined() {
        let mut maps = Mc5CodeMaps::default();
        maps.sfb.insert(
            4,
            b"VAR_INPUT start : BOOL; preset : TIME; END_VAR".to_vec(),
        );
        let symbols = symbols(2, "VAR timer : SFB 4; next : BOOL; END_VAR", &maps);
        assert_eq!(
            vec![
                ("timer.start", "DB2:0.0", "BOOL", "In"),
                ("timer.preset", "DB2:2.0", "TIME", "In"),
                ("next", "DB2:6.0", "BOOL", "Var"),
            ],
            rows(&symbols)
        );
    }

    #[test]
    fn missing_block_keeps_earlier_symbols() {
        let mut device = DeviceSymbolInfo {
            name: "test".to_string(),
            blocks: Vec::new(),
            db_names: BTreeMap::new(),
            warnings: Vec::new(),
        };
        let mut maps = Mc5CodeMaps::default();
        maps.db
            .insert(1, b"VAR a : INT; b : UDT 99; END_VAR".to_vec());
        parse_dbs(&mut device, &maps);
        assert_eq!(1, device.blocks.len());
        assert_eq!(
            vec![("a", "DB1:0.0", "INT", "Var")],
            rows(&device.blocks[0].symbols)
        );
        assert_eq!(1, device.warnings.len());
        assert!(matches!(device.warnings[0], Error::MissingBlock { .. }));
    }

    #[test]
    fn self_referencing_udt_is_caught() {
        let mut maps = Mc5CodeMaps::default();
        maps.udt
            .insert(1, b"STRUCT x : UDT 1; END_STRUCT ;".to_vec());
        let (_, result) = parse(1, "VAR a : UDT 1; END_VAR", &maps);
        assert!(matches!(result, Err(Error::RecursiveBlock { .. })));
    }

    #[test]
    fn empty_db_uses_fb_reference() {
        let mut device = DeviceSymbolInfo {
            name: "test".to_string(),
            blocks: Vec::new(),
            db_names: BTreeMap::new(),
            warnings: Vec::new(),
        };
        let mut maps = Mc5CodeMaps::default();
        maps.db.insert(6, Vec::new());
        maps.db_ref.insert(6, b"FB3\x00\x17\x01".to_vec());
        maps.fb.insert(
            3,
            b"VAR_INPUT in1 : REAL; END_VAR VAR_OUTPUT out1 : BOOL; END_VAR".to_vec(),
        );
        parse_dbs(&mut device, &maps);
        assert!(device.warnings.is_empty());
        assert_eq!(1, device.blocks.len());
        assert_eq!("DB6", device.blocks[0].name);
        assert_eq!(
            vec![
                ("in1", "DB6:0.0", "REAL", "In"),
                ("out1", "DB6:4.0", "BOOL", "Out"),
            ],
            rows(&device.blocks[0].symbols)
        );
    }

    #[test]
    fn missing_fb_reference_is_a_warning() {
        let mut device = DeviceSymbolInfo {
            name: "test".to_string(),
            blocks: Vec::new(),
            db_names: BTreeMap::new(),
            warnings: Vec::new(),
        };
        let mut maps = Mc5CodeMaps::default();
        maps.db.insert(6, Vec::new());
        maps.db_ref.insert(6, b"FB7".to_vec());
        maps.db.insert(8, b"VAR a : INT; END_VAR".to_vec());
        parse_dbs(&mut device, &maps);
        assert_eq!(1, device.warnings.len());
        assert!(matches!(device.warnings[0], Error::MissingFb { fb: 7, db: 6 }));
        // The other data block is still processed.
        assert_eq!(1, device.blocks.len());
        assert_eq!("DB8", device.blocks[0].name);
    }

    #[test]
    fn block_names_carry_user_given_names() {
        let mut device = DeviceSymbolInfo {
            name: "test".to_string(),
            blocks: Vec::new(),
            db_names: BTreeMap::new(),
            warnings: Vec::new(),
        };
        device.db_names.insert(7, "Level".to_string());
        let mut maps = Mc5CodeMaps::default();
        maps.db.insert(7, b"VAR a : INT; END_VAR".to_vec());
        maps.db.insert(9, b"VAR b : INT; END_VAR".to_vec());
        parse_dbs(&mut device, &maps);
        let names: Vec<&str> = device.blocks.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(vec!["DB7 (Level)", "DB9"], names);
    }

    #[test]
    fn fb_reference_requires_digits() {
        let mut db_ref = BTreeMap::new();
        db_ref.insert(1, b"FB".to_vec());
        db_ref.insert(2, b"FBX1".to_vec());
        db_ref.insert(3, b"FB12abc".to_vec());
        assert_eq!(None, extract_fb_reference(&db_ref, 1));
        assert_eq!(None, extract_fb_reference(&db_ref, 2));
        assert_eq!(Some(12), extract_fb_reference(&db_ref, 3));
        assert_eq!(None, extract_fb_reference(&db_ref, 4));
    }

    #[test]
    fn addresses_are_monotone_and_aligned() {
        let type_names = [
            "BOOL", "BYTE", "CHAR", "INT", "WORD", "DINT", "REAL", "POINTER",
            "DATE_AND_TIME", "ANY",
        ];
        arbtest(|u| {
            let count = u.int_in_range(1_usize..=20)?;
            let mut declaration = String::from("VAR ");
            let mut picked = Vec::with_capacity(count);
            for i in 0..count {
                let type_name = *u.choose(&type_names)?;
                picked.push(type_name);
                let _ = write!(declaration, "v{i} : {type_name}; ");
            }
            declaration.push_str("END_VAR");
            let maps = Mc5CodeMaps::default();
            let symbols = symbols(1, &declaration, &maps);
            assert_eq!(count, symbols.len());
            let mut previous = 0;
            for (symbol, type_name) in symbols.iter().zip(&picked) {
                let addr = bit_addr(&symbol.code);
                assert!(addr >= previous, "{}: not monotone", symbol.name);
                match *type_name {
                    "BOOL" => {}
                    "BYTE" | "CHAR" => assert_eq!(0, addr % 8, "{}", symbol.name),
                    _ => assert_eq!(0, addr % 16, "{}", symbol.name),
                }
                previous = addr;
            }
            Ok(())
        });
    }
}
