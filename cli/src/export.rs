use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;

use fs_err::File;
use s7p::DeviceSymbolInfo;

/// Strips the delimiter and quotes from a free-text column.
fn sanitize(text: &str) -> String {
    text.chars().filter(|c| *c != ';' && *c != '"').collect()
}

fn render_csv(devices: &[DeviceSymbolInfo]) -> String {
    let mut csv = String::from("DEVICE;BLOCK;VARIABLE;CODE;DATATYPE;COMMENT\n");
    for device in devices {
        let device_name = sanitize(&device.name);
        for block in &device.blocks {
            let block_name = sanitize(&block.name);
            for symbol in &block.symbols {
                let _ = writeln!(
                    csv,
                    "{device_name};{block_name};{};{};{};{}",
                    sanitize(&symbol.name),
                    symbol.code,
                    symbol.datatype,
                    sanitize(&symbol.comment)
                );
            }
        }
        // Warnings ride in the DEVICE and COMMENT columns, leaving the rest
        // empty.
        for warning in &device.warnings {
            let _ = writeln!(csv, "{device_name};;;;;{}", sanitize(&warning.to_string()));
        }
    }
    csv
}

/// Writes all devices as semicolon-separated CSV to `path`.
pub fn export_csv(path: &Path, devices: &[DeviceSymbolInfo]) -> Result<(), s7p::Error> {
    let csv = render_csv(devices);
    let mut file = File::create(path)?;
    // UTF-8 byte order mark, so spreadsheet applications pick the right
    // encoding.
    file.write_all(b"\xef\xbb\xbf")?;
    file.write_all(csv.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use s7p::Block;
    use s7p::Symbol;

    #[test]
    fn sanitize_strips_delimiters() {
        assert_eq!("ab", sanitize("a;b"));
        assert_eq!("ab", sanitize("a\"b\""));
        assert_eq!("a,b", sanitize("a,b"));
    }

    #[test]
    fn renders_symbols_and_warning_rows() {
        let device = DeviceSymbolInfo {
            name: "S7-300: Station;1 -> CPU".to_string(),
            blocks: vec![Block {
                name: "DB7 (Level)".to_string(),
                symbols: vec![Symbol {
                    name: "a".to_string(),
                    code: "DB7:0.0".to_string(),
                    datatype: "BOOL".to_string(),
                    comment: "Var".to_string(),
                }],
            }],
            db_names: Default::default(),
            warnings: vec![s7p::Error::MissingFb { fb: 3, db: 9 }],
        };
        let csv = render_csv(&[device]);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            vec![
                "DEVICE;BLOCK;VARIABLE;CODE;DATATYPE;COMMENT",
                "S7-300: Station1 -> CPU;DB7 (Level);a;DB7:0.0;BOOL;Var",
                "S7-300: Station1 -> CPU;;;;;Could not find referenced FB3 while parsing DB9",
            ],
            lines
        );
    }
}
