//! Symbol List (YDB) pass.
//!
//! Creates one [`DeviceSymbolInfo`] per `SYMLISTS.DBF` row and fills its
//! first block with the device's global input, memory and output symbols.
//! Rows addressing data blocks contribute display names for the later
//! Subblock List pass instead.

use std::collections::BTreeMap;
use std::path::Path;

use log::debug;

use crate::dbf::DbfReader;
use crate::device_id::DeviceIdInfo;
use crate::symbols::Block;
use crate::symbols::DeviceSymbolInfo;
use crate::symbols::Symbol;
use crate::text::from_windows_1252;
use crate::text::parse_u32;
use crate::Error;

fn parse_symbol_list(
    path: &Path,
    symbols: &mut Vec<Symbol>,
    db_names: &mut BTreeMap<u32, String>,
) -> Result<(), Error> {
    let mut reader = DbfReader::open(path)?;
    let skz = reader.field_index("_SKZ")?;
    let opiec = reader.field_index("_OPIEC")?;
    let datatyp = reader.field_index("_DATATYP")?;
    let comment = reader.field_index("_COMMENT")?;
    while let Some(record) = reader.read_record()? {
        // The address code may contain interior spaces ("I 0.0").
        let code: Vec<u8> = record[opiec]
            .iter()
            .copied()
            .filter(|b| *b != b' ')
            .collect();
        match code.first() {
            Some(b'I' | b'M' | b'Q') => {
                symbols.push(Symbol {
                    name: from_windows_1252(&record[skz]),
                    code: from_windows_1252(&code),
                    datatype: from_windows_1252(&record[datatyp]),
                    comment: from_windows_1252(&record[comment]),
                });
            }
            _ if code.starts_with(b"DB") => {
                // Data blocks are addressed later via the Subblock List;
                // here the row only contributes the user-given name.
                if let Some(db_number) = parse_u32(&code[2..]) {
                    db_names.insert(db_number, from_windows_1252(&record[skz]));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Creates the per-device results, one for each Symbol List of the project.
///
/// The device order of the final output is the enumeration order of
/// `YDBs/SYMLISTS.DBF`.
pub(crate) fn parse_symbol_lists(
    folder: &Path,
    device_ids: &[DeviceIdInfo],
) -> Result<Vec<DeviceSymbolInfo>, Error> {
    let mut reader = DbfReader::open(folder.join("YDBs").join("SYMLISTS.DBF"))?;
    let id = reader
        .field_index("_ID")
        .map_err(|e| e.context("SYMLISTS.DBF"))?;
    let db_path = reader
        .field_index("_DBPATH")
        .map_err(|e| e.context("SYMLISTS.DBF"))?;
    let mut devices = Vec::new();
    while let Some(record) = reader.read_record()? {
        let Some(symbol_list_id) = parse_u32(&record[id]) else {
            return Err(Error::InvalidNumber {
                table: "SYMLISTS.DBF",
                field: "_ID",
                value: from_windows_1252(&record[id]),
            });
        };
        // The subdirectory name usually spells the id but is not required
        // to, hence the separate _DBPATH column.
        let path = folder
            .join("YDBs")
            .join(from_windows_1252(&record[db_path]))
            .join("SYMLIST.DBF");
        let Some(device_id) = device_ids
            .iter()
            .find(|info| info.symbol_list_id == Some(symbol_list_id))
        else {
            return Err(Error::UnknownSymbolList(symbol_list_id));
        };
        let mut device = DeviceSymbolInfo {
            name: device_id.name.clone(),
            blocks: vec![Block {
                name: "Symbol List".to_string(),
                symbols: Vec::new(),
            }],
            db_names: BTreeMap::new(),
            warnings: Vec::new(),
        };
        let block = &mut device.blocks[0];
        parse_symbol_list(&path, &mut block.symbols, &mut device.db_names)
            .map_err(|e| e.context("SYMLIST.DBF"))?;
        debug!(
            "Device {:?}: {} symbols, {} DB names",
            device.name,
            device.blocks[0].symbols.len(),
            device.db_names.len()
        );
        devices.push(device);
    }
    Ok(devices)
}
