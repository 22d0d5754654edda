//! Correlates stations, devices and programs across the project tables.
//!
//! The station and device tables under `hOmSave7` are optional; without them
//! a device is known only by its program name. The program table
//! `hrs/S7RESOFF.DBF` and the `hrs/linkhrs.lnk` index are mandatory: they
//! yield the Subblock List and Symbol List ids that the later passes join
//! on.

use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::path::Path;

use fs_err::File;
use log::debug;

use crate::dbf::DbfReader;
use crate::text::from_windows_1252;
use crate::text::parse_u64;
use crate::Error;

/// Word preceding the Subblock List id in a `linkhrs.lnk` window.
const SUBBLOCK_LIST_ID_TAG: u32 = 0x0011_6001;
/// Word preceding the Symbol List id in a `linkhrs.lnk` window.
const SYMBOL_LIST_ID_TAG: u32 = 0x0011_3001;

/// Relation id linking a station to the devices it contains.
const STATION_RELATION_ID: &[u8] = b"1315838";
/// Relation id linking a device to its content objects.
const DEVICE_CONTENT_RELATION_ID: &[u8] = b"16";

/// One device of the project, identified by name and by the ids of its two
/// per-program object lists.
#[derive(Debug)]
pub(crate) struct DeviceIdInfo {
    pub(crate) name: String,
    pub(crate) subblock_list_id: Option<u32>,
    pub(crate) symbol_list_id: Option<u32>,
}

struct Intermediate {
    name: String,
    obj_id: Vec<u8>,
    obj_typ: Vec<u8>,
}

fn station_family(obj_typ: &[u8]) -> Option<&'static str> {
    match obj_typ {
        b"1314969" => Some("S7-300"),
        b"1314970" => Some("S7-400"),
        b"1315650" => Some("S7-400H"),
        b"1315651" => Some("S7-PC"),
        _ => None,
    }
}

fn parse_stations(path: &Path) -> Result<Vec<Intermediate>, Error> {
    let mut reader = DbfReader::open(path)?;
    let id = reader.field_index("ID")?;
    let obj_typ = reader.field_index("OBJTYP")?;
    let name = reader.field_index("NAME")?;
    let mut stations = Vec::new();
    while let Some(record) = reader.read_record()? {
        // Stations of other families (PC stations aside) are not PLCs.
        let Some(family) = station_family(&record[obj_typ]) else {
            continue;
        };
        stations.push(Intermediate {
            name: format!("{}: {}", family, from_windows_1252(&record[name])),
            obj_id: record[id].clone(),
            obj_typ: record[obj_typ].clone(),
        });
    }
    Ok(stations)
}

/// Follows one relation table: rows whose source matches a previous
/// intermediate and whose relation id matches `relation_id` carry the name
/// forward to the target object.
fn parse_relations(
    path: &Path,
    previous: &[Intermediate],
    relation_id: &[u8],
) -> Result<Vec<Intermediate>, Error> {
    let mut reader = DbfReader::open(path)?;
    let sobj_id = reader.field_index("SOBJID")?;
    let sobj_typ = reader.field_index("SOBJTYP")?;
    let rel_id = reader.field_index("RELID")?;
    let tobj_id = reader.field_index("TOBJID")?;
    let tobj_typ = reader.field_index("TOBJTYP")?;
    let mut relations = Vec::new();
    while let Some(record) = reader.read_record()? {
        for info in previous {
            if record[sobj_id] != info.obj_id
                || record[sobj_typ] != info.obj_typ
                || record[rel_id] != relation_id
            {
                continue;
            }
            relations.push(Intermediate {
                name: info.name.clone(),
                obj_id: record[tobj_id].clone(),
                obj_typ: record[tobj_typ].clone(),
            });
        }
    }
    Ok(relations)
}

fn parse_devices(path: &Path, previous: &[Intermediate]) -> Result<Vec<Intermediate>, Error> {
    let mut reader = DbfReader::open(path)?;
    let id = reader.field_index("ID")?;
    let obj_typ = reader.field_index("OBJTYP")?;
    let name = reader.field_index("NAME")?;
    let mut devices = Vec::new();
    while let Some(record) = reader.read_record()? {
        for info in previous {
            if record[id] != info.obj_id || record[obj_typ] != info.obj_typ {
                continue;
            }
            devices.push(Intermediate {
                name: format!("{} -> {}", info.name, from_windows_1252(&record[name])),
                obj_id: record[id].clone(),
                obj_typ: record[obj_typ].clone(),
            });
        }
    }
    Ok(devices)
}

/// Reads the 512-byte window at `offset` as 128 little-endian words.
fn read_link_words(linkhrs: &mut File, offset: u64) -> Result<[u32; 128], Error> {
    linkhrs
        .seek(SeekFrom::Start(offset))
        .map_err(|e| Error::from(e).context(format!("Could not seek to linkhrs.lnk offset {offset}")))?;
    let mut buffer = [0_u8; 512];
    linkhrs
        .read_exact(&mut buffer)
        .map_err(|e| Error::from(e).context(format!("Could not read linkhrs.lnk offset {offset}")))?;
    let mut words = [0_u32; 128];
    for (word, chunk) in words.iter_mut().zip(buffer.chunks_exact(4)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    Ok(words)
}

fn word_after(words: &[u32], tag: u32) -> Option<u32> {
    let index = words.iter().position(|word| *word == tag)?;
    words.get(index + 1).copied()
}

/// Enumerates the programs in `hrs/S7RESOFF.DBF` and pulls each program's
/// list ids out of its `linkhrs.lnk` window.
///
/// Every program row yields a device entry, whether or not a station/device
/// name could be correlated for it. Missing id tags are not an error; the
/// later joins simply skip such devices.
fn parse_resoff_and_linkhrs(
    folder: &Path,
    previous: &[Intermediate],
) -> Result<Vec<DeviceIdInfo>, Error> {
    let mut reader = DbfReader::open(folder.join("hrs").join("S7RESOFF.DBF"))?;
    let id = reader.field_index("ID")?;
    let name = reader.field_index("NAME")?;
    let rsrvd4_l = reader.field_index("RSRVD4_L")?;
    let mut linkhrs = File::open(folder.join("hrs").join("linkhrs.lnk"))?;
    let mut infos = Vec::new();
    while let Some(record) = reader.read_record()? {
        let mut device_name = String::new();
        for info in previous {
            if record[id] == info.obj_id {
                device_name = format!("{} -> ", info.name);
                break;
            }
        }
        device_name.push_str(&from_windows_1252(&record[name]));
        // The RSRVD4_L column is a byte offset into linkhrs.lnk.
        let Some(offset) = parse_u64(&record[rsrvd4_l]) else {
            return Err(Error::InvalidNumber {
                table: "S7RESOFF.DBF",
                field: "RSRVD4_L",
                value: from_windows_1252(&record[rsrvd4_l]),
            });
        };
        let words = read_link_words(&mut linkhrs, offset)?;
        infos.push(DeviceIdInfo {
            name: device_name,
            subblock_list_id: word_after(&words, SUBBLOCK_LIST_ID_TAG),
            symbol_list_id: word_after(&words, SYMBOL_LIST_ID_TAG),
        });
    }
    Ok(infos)
}

/// Builds the list of devices with their Subblock List and Symbol List ids.
pub(crate) fn resolve_device_ids(folder: &Path) -> Result<Vec<DeviceIdInfo>, Error> {
    let stations_path = folder.join("hOmSave7").join("s7hstatx").join("HOBJECT1.DBF");
    let station_relations_path = folder.join("hOmSave7").join("s7hstatx").join("HRELATI1.DBF");
    let mut previous = Vec::new();
    if stations_path.is_file() && station_relations_path.is_file() {
        let stations = parse_stations(&stations_path).map_err(|e| e.context("Stations"))?;
        let station_relations =
            parse_relations(&station_relations_path, &stations, STATION_RELATION_ID)
                .map_err(|e| e.context("Station relations"))?;
        // One table pair per CPU family.
        for family in ["S7HK31AX", "S7HK41AX"] {
            let devices_path = folder.join("hOmSave7").join(family).join("HOBJECT1.DBF");
            let relations_path = folder.join("hOmSave7").join(family).join("HRELATI1.DBF");
            if !devices_path.is_file() || !relations_path.is_file() {
                continue;
            }
            let devices = parse_devices(&devices_path, &station_relations)
                .map_err(|e| e.context(devices_path.display().to_string()))?;
            let device_relations =
                parse_relations(&relations_path, &devices, DEVICE_CONTENT_RELATION_ID)
                    .map_err(|e| e.context(relations_path.display().to_string()))?;
            previous.extend(device_relations);
        }
    }
    let infos = parse_resoff_and_linkhrs(folder, &previous)
        .map_err(|e| e.context("Resoff/Linkhrs"))?;
    debug!("Resolved {} device id entries", infos.len());
    Ok(infos)
}
