use std::io::BufReader;
use std::io::Read;
use std::path::Path;

use fs_err::File;

use crate::Error;

const HEADER_LEN: usize = 32;
const FIELD_DESCRIPTOR_LEN: usize = 32;
const FIELD_TERMINATOR: u8 = 0x0d;
const DELETED_RECORD: u8 = b'*';

#[derive(Debug)]
struct Field {
    name: String,
    len: usize,
}

/// Streaming reader for dBASE III tables.
///
/// Records come back as ordered lists of byte strings, one per field, with
/// ASCII spaces trimmed from both ends. Values are never interpreted beyond
/// that; numeric and text decoding is up to the caller.
pub struct DbfReader<R> {
    reader: R,
    fields: Vec<Field>,
    record_len: usize,
    records_left: u32,
}

impl DbfReader<BufReader<File>> {
    /// Open the table at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = File::open(path.as_ref())?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read> DbfReader<R> {
    /// Read the table header and field descriptors from `reader`.
    pub fn new(mut reader: R) -> Result<Self, Error> {
        let mut header = [0_u8; HEADER_LEN];
        reader.read_exact(&mut header)?;
        let version = header[0];
        if version & 0x07 != 0x03 {
            return Err(Error::NotDbf(version));
        }
        let num_records = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        let header_len = u16::from_le_bytes([header[8], header[9]]) as usize;
        let record_len = u16::from_le_bytes([header[10], header[11]]) as usize;
        let mut fields = Vec::new();
        let mut descriptor = [0_u8; FIELD_DESCRIPTOR_LEN];
        loop {
            let mut first = [0_u8; 1];
            reader.read_exact(&mut first)?;
            if first[0] == FIELD_TERMINATOR {
                break;
            }
            descriptor[0] = first[0];
            reader.read_exact(&mut descriptor[1..])?;
            let name_len = descriptor[..11].iter().position(|b| *b == 0).unwrap_or(11);
            let name = String::from_utf8_lossy(&descriptor[..name_len]).into_owned();
            let kind = descriptor[11];
            let mut len = descriptor[16] as usize;
            // Character fields longer than 255 bytes keep the high length
            // byte in the decimal-count slot.
            if kind == b'C' {
                len |= (descriptor[17] as usize) << 8;
            }
            fields.push(Field { name, len });
        }
        let descriptor_area = HEADER_LEN + fields.len() * FIELD_DESCRIPTOR_LEN + 1;
        let fields_len: usize = fields.iter().map(|f| f.len).sum();
        if header_len < descriptor_area || record_len != fields_len + 1 {
            return Err(Error::MalformedHeader);
        }
        // Skip any vendor padding between the terminator and the record area.
        let mut padding = vec![0_u8; header_len - descriptor_area];
        reader.read_exact(&mut padding)?;
        Ok(Self {
            reader,
            fields,
            record_len,
            records_left: num_records,
        })
    }

    /// Positional index of the field named `name`.
    pub fn field_index(&self, name: &str) -> Result<usize, Error> {
        self.fields
            .iter()
            .position(|field| field.name == name)
            .ok_or_else(|| Error::MissingField(name.to_string()))
    }

    /// Read the next live record.
    ///
    /// Deleted records are skipped. Returns `None` once all records have
    /// been read.
    pub fn read_record(&mut self) -> Result<Option<Vec<Vec<u8>>>, Error> {
        let mut record = vec![0_u8; self.record_len];
        while self.records_left > 0 {
            self.records_left -= 1;
            self.reader
                .read_exact(&mut record)
                .map_err(|_| Error::TruncatedRecord)?;
            if record[0] == DELETED_RECORD {
                continue;
            }
            let mut values = Vec::with_capacity(self.fields.len());
            let mut offset = 1;
            for field in &self.fields {
                let value = &record[offset..offset + field.len];
                values.push(trim_spaces(value).to_vec());
                offset += field.len;
            }
            return Ok(Some(values));
        }
        Ok(None)
    }
}

fn trim_spaces(mut bytes: &[u8]) -> &[u8] {
    while let [b' ', rest @ ..] = bytes {
        bytes = rest;
    }
    while let [rest @ .., b' '] = bytes {
        bytes = rest;
    }
    bytes
}
