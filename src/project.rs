//! Top-level project parsing pipeline.

use std::path::Path;

use log::debug;

use crate::device_id;
use crate::subblocks;
use crate::symbol_list;
use crate::symbols::DeviceSymbolInfo;
use crate::Error;

/// Parses the STEP 7 project in `folder`.
///
/// `folder` is the directory containing the `.s7p` marker file; the marker
/// itself is never read. Returns one entry per device, in the order the
/// project's Symbol Lists enumerate them.
///
/// Problems local to a single data block do not abort the parse; they are
/// collected in [`DeviceSymbolInfo::warnings`] and the remaining data blocks
/// are still processed.
pub fn parse_project<P: AsRef<Path>>(folder: P) -> Result<Vec<DeviceSymbolInfo>, Error> {
    let folder = folder.as_ref();
    debug!("Parsing project folder {:?}", folder);
    let device_ids = device_id::resolve_device_ids(folder)?;
    let mut devices = symbol_list::parse_symbol_lists(folder, &device_ids)?;
    subblocks::parse_subblock_lists(folder, &device_ids, &mut devices)?;
    Ok(devices)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::test::DbfBuilder;

    const SUBBLOCK_LIST_ID_TAG: u32 = 0x0011_6001;
    const SYMBOL_LIST_ID_TAG: u32 = 0x0011_3001;

    fn write_project(folder: &Path) {
        DbfBuilder::new()
            .field("ID", 8)
            .field("NAME", 16)
            .field("RSRVD4_L", 8)
            .record(&[b"300", b"Program1", b"0"])
            .write(folder.join("hrs").join("S7RESOFF.DBF"));
        let mut words = [0_u32; 128];
        words[10] = SUBBLOCK_LIST_ID_TAG;
        words[11] = 7;
        words[30] = SYMBOL_LIST_ID_TAG;
        words[31] = 9;
        let linkhrs: Vec<u8> = words.iter().flat_map(|word| word.to_le_bytes()).collect();
        fs_err::write(folder.join("hrs").join("linkhrs.lnk"), linkhrs).expect("write linkhrs");
        DbfBuilder::new()
            .field("_ID", 8)
            .field("_DBPATH", 8)
            .record(&[b"9", b"00000009"])
            .write(folder.join("YDBs").join("SYMLISTS.DBF"));
        DbfBuilder::new()
            .field("_SKZ", 24)
            .field("_OPIEC", 12)
            .field("_DATATYP", 10)
            .field("_COMMENT", 40)
            .record(&[b"Motor", b"I 0.0", b"BOOL", b"main motor"])
            .record(&[b"Level", b"DB 7", b"DB 7", b""])
            .write(folder.join("YDBs").join("00000009").join("SYMLIST.DBF"));
        DbfBuilder::new()
            .field("ID", 8)
            .record(&[b"7"])
            .record(&[b"123"])
            .write(folder.join("ombstx").join("offline").join("BSTCNTOF.DBF"));
        let code = b"VAR a : BOOL; b : INT; //water level\nEND_VAR";
        let len = code.len().to_string();
        DbfBuilder::new()
            .field("SUBBLKTYP", 5)
            .field("BLKNUMBER", 5)
            .field("MC5LEN", 5)
            .field("MC5CODE", 100)
            .record(&[b"00006", b"7", len.as_bytes(), code])
            .write(
                folder
                    .join("ombstx")
                    .join("offline")
                    .join("00000007")
                    .join("SUBBLK.DBF"),
            );
    }

    #[test]
    fn parses_a_minimal_project() {
        let dir = tempfile::tempdir().expect("temp dir");
        let folder = dir.path();
        write_project(folder);
        let devices = parse_project(folder).expect("parse");
        assert_eq!(1, devices.len());
        let device = &devices[0];
        // Without the optional hOmSave7 tables the device is known by its
        // program name alone.
        assert_eq!("Program1", device.name);
        assert!(device.warnings.is_empty());
        let block_names: Vec<&str> = device.blocks.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(vec!["Symbol List", "DB7 (Level)"], block_names);
        let symbol_list = &device.blocks[0].symbols;
        assert_eq!(1, symbol_list.len());
        assert_eq!("Motor", symbol_list[0].name);
        assert_eq!("I0.0", symbol_list[0].code);
        assert_eq!("main motor", symbol_list[0].comment);
        let db = &device.blocks[1].symbols;
        assert_eq!(2, db.len());
        assert_eq!(("a", "DB7:0.0"), (db[0].name.as_str(), db[0].code.as_str()));
        assert_eq!(("b", "DB7:2.0"), (db[1].name.as_str(), db[1].code.as_str()));
        assert_eq!("Var; water level", db[1].comment);
    }

    #[test]
    fn parsing_twice_yields_equal_results() {
        let dir = tempfile::tempdir().expect("temp dir");
        let folder = dir.path();
        write_project(folder);
        let first = parse_project(folder).expect("first parse");
        let second = parse_project(folder).expect("second parse");
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.blocks, b.blocks);
            assert_eq!(a.db_names, b.db_names);
        }
    }
}
