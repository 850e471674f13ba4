//! Content extraction: raw uploads to canonical text plus structural
//! metadata.
//!
//! The extractor is pipeline-layer and pure: callers supply the declared
//! [`SourceKind`] and raw bytes; this module returns the canonical text the
//! embedding and concept stages consume, and nothing is persisted here.
//! The size ceiling is enforced against the raw byte length before any
//! decoding or parsing starts.

use std::io::Read;

use crate::error::{FeedError, Result};
use crate::models::{Extracted, SourceKind, StructuralMetadata};

/// Maximum sheets to process in an xlsx workbook.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to process per sheet (avoids unbounded memory).
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb
/// protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Ordered candidate encodings for plain-text decoding. The winner is
/// recorded in the structural metadata.
const ENCODING_LADDER: &[&encoding_rs::Encoding] = &[
    encoding_rs::UTF_8,
    encoding_rs::UTF_16LE,
    encoding_rs::UTF_16BE,
    encoding_rs::WINDOWS_1252,
];

/// Extract canonical text and structural metadata from raw content.
///
/// Fails fast with [`FeedError::SizeExceeded`] when the payload is over
/// `max_bytes`; no parser runs on oversized input.
pub fn extract(kind: SourceKind, raw: &[u8], max_bytes: u64) -> Result<Extracted> {
    if raw.len() as u64 > max_bytes {
        return Err(FeedError::SizeExceeded {
            actual: raw.len() as u64,
            limit: max_bytes,
        });
    }

    match kind {
        SourceKind::Plain => extract_plain(raw),
        SourceKind::Tabular => extract_tabular(raw),
        SourceKind::Spreadsheet => extract_xlsx(raw),
        SourceKind::Direct => extract_direct(raw),
    }
}

// ============ Plain text ============

fn extract_plain(raw: &[u8]) -> Result<Extracted> {
    let (text, encoding) = decode_text(raw)?;
    let text = normalize_newlines(&text);
    let line_count = if text.is_empty() { 0 } else { text.lines().count() };
    Ok(Extracted {
        text,
        metadata: StructuralMetadata::PlainText {
            encoding,
            line_count,
        },
    })
}

/// Walk the encoding ladder until one candidate decodes without error.
/// Returns the decoded text and the name of the winning encoding.
fn decode_text(raw: &[u8]) -> Result<(String, String)> {
    for enc in ENCODING_LADDER {
        let (text, actual, had_errors) = enc.decode(raw);
        if had_errors {
            continue;
        }
        // BOM-less UTF-16 is only plausible when NULs are present; plain
        // 8-bit text would otherwise decode as CJK soup without errors.
        if (*enc == encoding_rs::UTF_16LE || *enc == encoding_rs::UTF_16BE)
            && actual == *enc
            && !raw.starts_with(&[0xFF, 0xFE])
            && !raw.starts_with(&[0xFE, 0xFF])
            && !raw.contains(&0)
        {
            continue;
        }
        // C1 controls out of windows-1252 signal binary, not regional text.
        if *enc == encoding_rs::WINDOWS_1252
            && text.chars().any(|c| ('\u{80}'..='\u{9F}').contains(&c))
        {
            continue;
        }
        return Ok((text.into_owned(), actual.name().to_ascii_lowercase()));
    }

    // ASCII-safe fallback: keep printable ASCII and whitespace only.
    let ascii: String = raw
        .iter()
        .copied()
        .filter(|b| b.is_ascii() && (!b.is_ascii_control() || b"\n\r\t".contains(b)))
        .map(|b| b as char)
        .collect();
    if ascii.trim().is_empty() && !raw.is_empty() {
        return Err(FeedError::Encoding);
    }
    Ok((ascii, "ascii-lossy".to_string()))
}

fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

// ============ Delimited tabular text ============

fn extract_tabular(raw: &[u8]) -> Result<Extracted> {
    let (decoded, _) = decode_text(raw)?;
    let decoded = normalize_newlines(&decoded);

    // Sniff the delimiter from the header line.
    let delimiter = if decoded.lines().next().is_some_and(|l| l.contains('\t')) {
        b'\t'
    } else {
        b','
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(decoded.as_bytes());

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| FeedError::Validation(format!("tabular parse failed: {}", e)))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut out = String::new();
    let mut row_count = 0usize;
    for record in reader.records() {
        let record =
            record.map_err(|e| FeedError::Validation(format!("tabular parse failed: {}", e)))?;
        let mut fields = Vec::with_capacity(record.len());
        for (i, field) in record.iter().enumerate() {
            let field = field.trim();
            if field.is_empty() {
                continue;
            }
            match columns.get(i) {
                Some(col) if !col.is_empty() => fields.push(format!("{}: {}", col, field)),
                _ => fields.push(field.to_string()),
            }
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&fields.join("; "));
        row_count += 1;
    }

    Ok(Extracted {
        text: out,
        metadata: StructuralMetadata::Tabular { columns, row_count },
    })
}

// ============ Spreadsheet (xlsx) ============

fn extract_xlsx(raw: &[u8]) -> Result<Extracted> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(raw))
        .map_err(|e| FeedError::Validation(format!("spreadsheet parse failed: {}", e)))?;

    let shared_strings = read_shared_strings(&mut archive)?;
    let sheet_names = list_worksheet_names(&mut archive);

    let mut out = String::new();
    let mut sheet_count = 0usize;
    let mut row_count = 0usize;
    let mut cell_count = 0usize;

    for name in sheet_names.into_iter().take(XLSX_MAX_SHEETS) {
        let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        let sheet = parse_sheet(&xml, &shared_strings)?;
        sheet_count += 1;
        row_count += sheet.rows;
        cell_count += sheet.cells;
        if !out.is_empty() && !sheet.text.is_empty() {
            out.push('\n');
        }
        out.push_str(&sheet.text);
    }

    Ok(Extracted {
        text: out,
        metadata: StructuralMetadata::Spreadsheet {
            sheet_count,
            row_count,
            cell_count,
        },
    })
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>> {
    let entry = archive
        .by_name(name)
        .map_err(|e| FeedError::Validation(format!("spreadsheet parse failed: {}", e)))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| FeedError::Validation(format!("spreadsheet parse failed: {}", e)))?;
    if out.len() as u64 >= max_bytes {
        return Err(FeedError::Validation(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn read_shared_strings(archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>) -> Result<Vec<String>> {
    // Workbooks without string cells have no sharedStrings part at all.
    if archive.by_name("xl/sharedStrings.xml").is_err() {
        return Ok(Vec::new());
    }
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)?;

    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_si = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"si" {
                    in_si = true;
                } else if in_si && e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        strings.push(te.unescape().unwrap_or_default().into_owned());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"si" {
                    in_si = false;
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => {
                return Err(FeedError::Validation(format!(
                    "spreadsheet parse failed: {}",
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn list_worksheet_names(archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

struct SheetContent {
    text: String,
    rows: usize,
    cells: usize,
}

fn parse_sheet(xml: &[u8], shared_strings: &[String]) -> Result<SheetContent> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut current_row: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_v = false;
    let mut cell_is_shared_str = false;
    let mut cell_count = 0usize;

    loop {
        if cell_count >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => current_row.clear(),
                b"c" => {
                    cell_is_shared_str = e.attributes().any(|a| {
                        a.as_ref()
                            .map(|a| a.key.as_ref() == b"t" && a.value.as_ref() == b"s")
                            .unwrap_or(false)
                    });
                }
                b"v" => in_v = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(te)) if in_v => {
                let v = te.unescape().unwrap_or_default();
                let s = v.trim();
                if !s.is_empty() {
                    let resolved = if cell_is_shared_str {
                        s.parse::<usize>()
                            .ok()
                            .and_then(|i| shared_strings.get(i))
                            .cloned()
                    } else {
                        Some(s.to_string())
                    };
                    if let Some(value) = resolved {
                        current_row.push(value);
                        cell_count += 1;
                    }
                }
                in_v = false;
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"v" => in_v = false,
                b"c" => cell_is_shared_str = false,
                b"row" => {
                    if !current_row.is_empty() {
                        rows.push(std::mem::take(&mut current_row));
                    }
                }
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => {
                return Err(FeedError::Validation(format!(
                    "spreadsheet parse failed: {}",
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    let row_count = rows.len();
    let text = rows
        .iter()
        .map(|r| r.join(" "))
        .collect::<Vec<_>>()
        .join("\n");
    Ok(SheetContent {
        text,
        rows: row_count,
        cells: cell_count,
    })
}

// ============ Direct text ============

fn extract_direct(raw: &[u8]) -> Result<Extracted> {
    let text = String::from_utf8_lossy(raw).trim().to_string();
    Ok(Extracted {
        metadata: StructuralMetadata::Direct {
            char_count: text.chars().count(),
        },
        text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_input_rejected_before_parsing() {
        // Malformed tabular bytes: a parser would error, but the ceiling
        // must fire first.
        let raw = b"\"unclosed quote\njunk,junk";
        let err = extract(SourceKind::Tabular, raw, 10).unwrap_err();
        assert!(matches!(err, FeedError::SizeExceeded { actual: 25, limit: 10 }));
    }

    #[test]
    fn payload_at_exact_ceiling_succeeds() {
        let raw = b"0123456789";
        let out = extract(SourceKind::Direct, raw, 10).unwrap();
        assert_eq!(out.text, "0123456789");
    }

    #[test]
    fn utf8_decodes_and_is_recorded() {
        let out = extract(SourceKind::Plain, "héllo\nwörld".as_bytes(), 1024).unwrap();
        assert_eq!(out.text, "héllo\nwörld");
        assert_eq!(
            out.metadata,
            StructuralMetadata::PlainText {
                encoding: "utf-8".to_string(),
                line_count: 2,
            }
        );
    }

    #[test]
    fn utf16le_bom_decodes() {
        let mut raw = vec![0xFF, 0xFE];
        for unit in "hello".encode_utf16() {
            raw.extend_from_slice(&unit.to_le_bytes());
        }
        let out = extract(SourceKind::Plain, &raw, 1024).unwrap();
        assert_eq!(out.text, "hello");
        match out.metadata {
            StructuralMetadata::PlainText { encoding, .. } => assert_eq!(encoding, "utf-16le"),
            other => panic!("unexpected metadata: {:?}", other),
        }
    }

    #[test]
    fn latin1_falls_through_to_windows_1252() {
        // 0xE9 is 'é' in windows-1252 and invalid as a lone UTF-8 byte.
        let raw = b"caf\xE9";
        let out = extract(SourceKind::Plain, raw, 1024).unwrap();
        assert_eq!(out.text, "café");
        match out.metadata {
            StructuralMetadata::PlainText { encoding, .. } => assert_eq!(encoding, "windows-1252"),
            other => panic!("unexpected metadata: {:?}", other),
        }
    }

    #[test]
    fn undecodable_binary_is_an_encoding_error() {
        // Invalid UTF-8, implausible UTF-16, C1 controls under
        // windows-1252, and nothing for the ASCII fallback to keep.
        let raw = &[0x81u8, 0x8D, 0x8F, 0x9D];
        let err = extract(SourceKind::Plain, raw, 1024).unwrap_err();
        assert!(matches!(err, FeedError::Encoding));
    }

    #[test]
    fn csv_canonical_form_and_counts() {
        let raw = b"name,email\nAda,ada@example.com\nBob,bob@example.com\n";
        let out = extract(SourceKind::Tabular, raw, 1024).unwrap();
        assert_eq!(
            out.text,
            "name: Ada; email: ada@example.com\nname: Bob; email: bob@example.com"
        );
        assert_eq!(
            out.metadata,
            StructuralMetadata::Tabular {
                columns: vec!["name".to_string(), "email".to_string()],
                row_count: 2,
            }
        );
    }

    #[test]
    fn tsv_delimiter_sniffed() {
        let raw = b"a\tb\n1\t2\n";
        let out = extract(SourceKind::Tabular, raw, 1024).unwrap();
        assert_eq!(out.text, "a: 1; b: 2");
    }

    #[test]
    fn direct_text_trimmed_with_char_count() {
        let out = extract(SourceKind::Direct, b"  note to self  ", 1024).unwrap();
        assert_eq!(out.text, "note to self");
        assert_eq!(
            out.metadata,
            StructuralMetadata::Direct { char_count: 12 }
        );
    }

    #[test]
    fn invalid_zip_rejected_for_spreadsheet() {
        let err = extract(SourceKind::Spreadsheet, b"not a zip", 1024).unwrap_err();
        assert!(matches!(err, FeedError::Validation(_)));
    }
}
