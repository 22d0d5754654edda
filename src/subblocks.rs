//! Subblock List (ombstx) pass.
//!
//! Every Subblock List is a directory named after its id, holding one
//! `SUBBLK.DBF` with all block declarations of a device. The records are
//! partitioned by subblock type and handed to the MC5 layout engine.

use std::collections::BTreeMap;
use std::path::Path;

use log::debug;

use crate::dbf::DbfReader;
use crate::device_id::DeviceIdInfo;
use crate::mc5;
use crate::mc5::BlockKind;
use crate::symbols::DeviceSymbolInfo;
use crate::text::from_windows_1252;
use crate::text::parse_u32;
use crate::Error;

/// MC5 declaration texts of one Subblock List, partitioned by block kind and
/// keyed by block number.
#[derive(Default)]
pub(crate) struct Mc5CodeMaps {
    /// Data blocks — the declarations the symbols come from.
    pub(crate) db: BTreeMap<u32, Vec<u8>>,
    /// DB reference subblocks, consulted when a data block is empty.
    pub(crate) db_ref: BTreeMap<u32, Vec<u8>>,
    /// Function blocks.
    pub(crate) fb: BTreeMap<u32, Vec<u8>>,
    /// System function blocks.
    pub(crate) sfb: BTreeMap<u32, Vec<u8>>,
    /// User-defined types.
    pub(crate) udt: BTreeMap<u32, Vec<u8>>,
}

impl Mc5CodeMaps {
    pub(crate) fn block(&self, kind: BlockKind) -> &BTreeMap<u32, Vec<u8>> {
        match kind {
            BlockKind::Fb => &self.fb,
            BlockKind::Sfb => &self.sfb,
            BlockKind::Udt => &self.udt,
        }
    }
}

fn read_subblocks(path: &Path) -> Result<Mc5CodeMaps, Error> {
    let mut reader = DbfReader::open(path)?;
    let subblktyp = reader
        .field_index("SUBBLKTYP")
        .map_err(|e| e.context("SUBBLK.DBF"))?;
    let blknumber = reader
        .field_index("BLKNUMBER")
        .map_err(|e| e.context("SUBBLK.DBF"))?;
    let mc5len = reader
        .field_index("MC5LEN")
        .map_err(|e| e.context("SUBBLK.DBF"))?;
    let mc5code = reader
        .field_index("MC5CODE")
        .map_err(|e| e.context("SUBBLK.DBF"))?;
    let mut maps = Mc5CodeMaps::default();
    while let Some(mut record) = reader.read_record()? {
        // Records without a numeric block number or length are not block
        // declarations.
        let Some(block_number) = parse_u32(&record[blknumber]) else {
            continue;
        };
        let Some(block_len) = parse_u32(&record[mc5len]) else {
            continue;
        };
        let mut code = std::mem::take(&mut record[mc5code]);
        code.truncate(block_len as usize);
        let map = match record[subblktyp].as_slice() {
            b"00006" => &mut maps.db,
            b"00066" => &mut maps.db_ref,
            b"00004" => &mut maps.fb,
            b"00009" => &mut maps.sfb,
            b"00001" => &mut maps.udt,
            _ => continue,
        };
        map.insert(block_number, code);
    }
    Ok(maps)
}

/// Walks `ombstx/offline/BSTCNTOF.DBF` and extends each matching device with
/// the data blocks of its Subblock List.
///
/// Subblock Lists without a corresponding device occur in real projects and
/// are skipped; their tables have always turned out empty.
pub(crate) fn parse_subblock_lists(
    folder: &Path,
    device_ids: &[DeviceIdInfo],
    devices: &mut [DeviceSymbolInfo],
) -> Result<(), Error> {
    let mut reader = DbfReader::open(folder.join("ombstx").join("offline").join("BSTCNTOF.DBF"))?;
    let id = reader
        .field_index("ID")
        .map_err(|e| e.context("BSTCNTOF.DBF"))?;
    while let Some(record) = reader.read_record()? {
        let Some(subblock_list_id) = parse_u32(&record[id]) else {
            return Err(Error::InvalidNumber {
                table: "BSTCNTOF.DBF",
                field: "ID",
                value: from_windows_1252(&record[id]),
            });
        };
        let Some(device_id) = device_ids
            .iter()
            .find(|info| info.subblock_list_id == Some(subblock_list_id))
        else {
            continue;
        };
        let Some(device) = devices
            .iter_mut()
            .find(|device| device.name == device_id.name)
        else {
            return Err(Error::UnknownDevice {
                name: device_id.name.clone(),
                id: subblock_list_id,
            });
        };
        let path = folder
            .join("ombstx")
            .join("offline")
            .join(format!("{subblock_list_id:08x}"))
            .join("SUBBLK.DBF");
        let maps = read_subblocks(&path)?;
        debug!(
            "Subblock List {subblock_list_id:08x}: {} DBs, {} FBs, {} SFBs, {} UDTs",
            maps.db.len(),
            maps.fb.len(),
            maps.sfb.len(),
            maps.udt.len()
        );
        mc5::parse_dbs(device, &maps);
    }
    Ok(())
}
