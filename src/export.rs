//! Spreadsheet reports: a record list or derived view laid out as a table,
//! written as an xlsx workbook or CSV, and read back.

use anyhow::{anyhow, Context};
use log::info;
use regex::Regex;
use serde::Serialize;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use xmlwriter::{Indent, Options, XmlWriter};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::calc::{merit_order, search, SearchMode};
use crate::config::{ReportFormat, SubjectOrder};
use crate::model::{subject_union, Status, StudentRecord};

pub const SEAT_COLUMN: &str = "Seat Number";
pub const NAME_COLUMN: &str = "Name";
pub const SUMMARY_COLUMNS: [&str; 4] = ["Total", "Percentage", "Status", "Division"];

const SHEET_ENTRY: &str = "xl/worksheets/sheet1.xml";
const SHARED_STRINGS_ENTRY: &str = "xl/sharedStrings.xml";
/// Columns in a worksheet, `A` through `XFD`.
const MAX_COLUMNS: usize = 16_384;
const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const NS_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_PKG_REL: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportView {
    All,
    Passed,
    Failed,
    Top(usize),
    Search { query: String, mode: SearchMode },
}

impl ReportView {
    pub fn name(&self) -> &'static str {
        match self {
            ReportView::All => "all",
            ReportView::Passed => "passed",
            ReportView::Failed => "failed",
            ReportView::Top(_) => "top",
            ReportView::Search { .. } => "search",
        }
    }

    /// Rows of the view. `Top` is in merit order, everything else in
    /// document order.
    pub fn select<'a>(&self, records: &'a [StudentRecord]) -> Vec<&'a StudentRecord> {
        match self {
            ReportView::All => records.iter().collect(),
            ReportView::Passed => records.iter().filter(|r| r.status == Status::Pass).collect(),
            ReportView::Failed => records.iter().filter(|r| r.status == Status::Fail).collect(),
            ReportView::Top(n) => merit_order(records).into_iter().take(*n).collect(),
            ReportView::Search { query, mode } => search(records, query, *mode),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Empty,
}

impl Cell {
    fn display(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => fmt_number(*n),
            Cell::Empty => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

fn fmt_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Subject columns come from the selected rows only; a student without a
/// mark for a subject gets an empty cell.
pub fn build_table(records: &[&StudentRecord], order: SubjectOrder) -> ReportTable {
    let mut subjects = subject_union(records.iter().copied());
    if order == SubjectOrder::Alphabetical {
        subjects.sort_by_key(|s| s.to_lowercase());
    }

    let mut columns = vec![SEAT_COLUMN.to_string(), NAME_COLUMN.to_string()];
    columns.extend(subjects.iter().cloned());
    columns.extend(SUMMARY_COLUMNS.iter().map(|s| s.to_string()));

    let rows = records
        .iter()
        .map(|r| {
            let mut row = vec![Cell::Text(r.seat_number.clone()), Cell::Text(r.name.clone())];
            for s in &subjects {
                row.push(match r.mark_for(s) {
                    Some(m) => Cell::Number(m.mark),
                    None => Cell::Empty,
                });
            }
            row.push(Cell::Number(r.total_marks));
            row.push(Cell::Number(r.percentage));
            row.push(Cell::Text(r.status.as_str().to_string()));
            row.push(Cell::Text(r.division.as_str().to_string()));
            row
        })
        .collect();

    ReportTable { columns, rows }
}

fn create_output(out_path: &Path) -> anyhow::Result<File> {
    if let Some(parent) = out_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create directory {}", parent.to_string_lossy())
            })?;
        }
    }
    File::create(out_path)
        .with_context(|| format!("failed to create output file {}", out_path.to_string_lossy()))
}

pub fn write_report(
    out_path: &Path,
    table: &ReportTable,
    format: ReportFormat,
    sheet_name: &str,
) -> anyhow::Result<()> {
    match format {
        ReportFormat::Csv => write_csv(out_path, table)?,
        ReportFormat::Xlsx => write_xlsx(out_path, table, sheet_name)?,
    }
    info!(
        "wrote {} report {} ({} rows, {} columns)",
        format.as_str(),
        out_path.to_string_lossy(),
        table.rows.len(),
        table.columns.len()
    );
    Ok(())
}

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

pub fn write_csv(out_path: &Path, table: &ReportTable) -> anyhow::Result<()> {
    let mut out = String::new();
    let header: Vec<String> = table.columns.iter().map(|c| csv_quote(c)).collect();
    out.push_str(&header.join(","));
    out.push('\n');
    for row in &table.rows {
        let cells: Vec<String> = row.iter().map(|c| csv_quote(&c.display())).collect();
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    let mut f = create_output(out_path)?;
    f.write_all(out.as_bytes())
        .with_context(|| format!("failed to write {}", out_path.to_string_lossy()))?;
    Ok(())
}

fn xml_part(build: impl FnOnce(&mut XmlWriter)) -> String {
    let mut w = XmlWriter::new(Options {
        indent: Indent::None,
        attributes_indent: Indent::None,
        ..Options::default()
    });
    w.write_declaration();
    build(&mut w);
    w.end_document()
}

/// 0 -> A, 25 -> Z, 26 -> AA.
fn column_letters(mut index: usize) -> String {
    let mut out = Vec::new();
    loop {
        out.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Inverse of [`column_letters`]; `None` past `XFD`.
fn column_index(letters: &str) -> Option<usize> {
    let mut n = 0usize;
    for ch in letters.chars() {
        if !ch.is_ascii_uppercase() {
            return None;
        }
        n = n
            .checked_mul(26)?
            .checked_add(ch as usize - 'A' as usize + 1)?;
        if n > MAX_COLUMNS {
            return None;
        }
    }
    n.checked_sub(1)
}

fn content_types_xml() -> String {
    xml_part(|w| {
        w.start_element("Types");
        w.write_attribute(
            "xmlns",
            "http://schemas.openxmlformats.org/package/2006/content-types",
        );
        for (ext, ty) in [
            ("rels", "application/vnd.openxmlformats-package.relationships+xml"),
            ("xml", "application/xml"),
        ] {
            w.start_element("Default");
            w.write_attribute("Extension", ext);
            w.write_attribute("ContentType", ty);
            w.end_element();
        }
        for (part, ty) in [
            (
                "/xl/workbook.xml",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml",
            ),
            (
                "/xl/worksheets/sheet1.xml",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml",
            ),
            (
                "/xl/styles.xml",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml",
            ),
        ] {
            w.start_element("Override");
            w.write_attribute("PartName", part);
            w.write_attribute("ContentType", ty);
            w.end_element();
        }
    })
}

fn relationships_xml(rels: &[(&str, &str, &str)]) -> String {
    xml_part(|w| {
        w.start_element("Relationships");
        w.write_attribute("xmlns", NS_PKG_REL);
        for (id, kind, target) in rels {
            w.start_element("Relationship");
            w.write_attribute("Id", id);
            w.write_attribute("Type", &format!("{}/{}", NS_REL, kind));
            w.write_attribute("Target", target);
            w.end_element();
        }
    })
}

fn workbook_xml(sheet_name: &str) -> String {
    xml_part(|w| {
        w.start_element("workbook");
        w.write_attribute("xmlns", NS_MAIN);
        w.write_attribute("xmlns:r", NS_REL);
        w.start_element("sheets");
        w.start_element("sheet");
        w.write_attribute("name", sheet_name);
        w.write_attribute("sheetId", "1");
        w.write_attribute("r:id", "rId1");
    })
}

/// Style 0 is the default, style 1 is the bold header.
fn styles_xml() -> String {
    xml_part(|w| {
        w.start_element("styleSheet");
        w.write_attribute("xmlns", NS_MAIN);

        w.start_element("fonts");
        w.write_attribute("count", "2");
        for bold in [false, true] {
            w.start_element("font");
            if bold {
                w.start_element("b");
                w.end_element();
            }
            w.start_element("sz");
            w.write_attribute("val", "11");
            w.end_element();
            w.start_element("name");
            w.write_attribute("val", "Calibri");
            w.end_element();
            w.end_element();
        }
        w.end_element();

        w.start_element("fills");
        w.write_attribute("count", "2");
        for pattern in ["none", "gray125"] {
            w.start_element("fill");
            w.start_element("patternFill");
            w.write_attribute("patternType", pattern);
            w.end_element();
            w.end_element();
        }
        w.end_element();

        w.start_element("borders");
        w.write_attribute("count", "1");
        w.start_element("border");
        w.end_element();
        w.end_element();

        w.start_element("cellStyleXfs");
        w.write_attribute("count", "1");
        w.start_element("xf");
        w.write_attribute("numFmtId", "0");
        w.write_attribute("fontId", "0");
        w.write_attribute("fillId", "0");
        w.write_attribute("borderId", "0");
        w.end_element();
        w.end_element();

        w.start_element("cellXfs");
        w.write_attribute("count", "2");
        for font in ["0", "1"] {
            w.start_element("xf");
            w.write_attribute("numFmtId", "0");
            w.write_attribute("fontId", font);
            w.write_attribute("fillId", "0");
            w.write_attribute("borderId", "0");
            w.write_attribute("xfId", "0");
            w.end_element();
        }
    })
}

fn write_inline_string(w: &mut XmlWriter, r: &str, text: &str, style: Option<&str>) {
    w.start_element("c");
    w.write_attribute("r", r);
    if let Some(s) = style {
        w.write_attribute("s", s);
    }
    w.write_attribute("t", "inlineStr");
    w.start_element("is");
    w.start_element("t");
    w.write_attribute("xml:space", "preserve");
    w.write_text(text);
    w.end_element();
    w.end_element();
    w.end_element();
}

fn sheet_xml(table: &ReportTable) -> String {
    xml_part(|w| {
        w.start_element("worksheet");
        w.write_attribute("xmlns", NS_MAIN);
        w.start_element("sheetData");

        w.start_element("row");
        w.write_attribute("r", "1");
        for (i, col) in table.columns.iter().enumerate() {
            write_inline_string(w, &format!("{}1", column_letters(i)), col, Some("1"));
        }
        w.end_element();

        for (ri, row) in table.rows.iter().enumerate() {
            let rn = ri + 2;
            w.start_element("row");
            w.write_attribute("r", &rn);
            for (ci, cell) in row.iter().enumerate() {
                let r = format!("{}{}", column_letters(ci), rn);
                match cell {
                    Cell::Text(s) => write_inline_string(w, &r, s, None),
                    Cell::Number(n) => {
                        w.start_element("c");
                        w.write_attribute("r", &r);
                        w.start_element("v");
                        w.write_text(&fmt_number(*n));
                        w.end_element();
                        w.end_element();
                    }
                    Cell::Empty => {}
                }
            }
            w.end_element();
        }
    })
}

pub fn write_xlsx(out_path: &Path, table: &ReportTable, sheet_name: &str) -> anyhow::Result<()> {
    let out_file = create_output(out_path)?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let parts: [(&str, String); 6] = [
        ("[Content_Types].xml", content_types_xml()),
        (
            "_rels/.rels",
            relationships_xml(&[("rId1", "officeDocument", "xl/workbook.xml")]),
        ),
        ("xl/workbook.xml", workbook_xml(sheet_name)),
        (
            "xl/_rels/workbook.xml.rels",
            relationships_xml(&[
                ("rId1", "worksheet", "worksheets/sheet1.xml"),
                ("rId2", "styles", "styles.xml"),
            ]),
        ),
        ("xl/styles.xml", styles_xml()),
        (SHEET_ENTRY, sheet_xml(table)),
    ];
    for (name, body) in &parts {
        zip.start_file(*name, opts)
            .with_context(|| format!("failed to start {} entry", name))?;
        zip.write_all(body.as_bytes())
            .with_context(|| format!("failed to write {} entry", name))?;
    }
    zip.finish().context("failed to finalize workbook")?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMark {
    pub subject: String,
    pub mark: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    pub seat_number: String,
    pub name: String,
    pub marks: Vec<ReportMark>,
    pub total: Option<f64>,
    pub percentage: Option<f64>,
    pub status: String,
    pub division: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSheet {
    pub format: ReportFormat,
    pub columns: Vec<String>,
    pub subjects: Vec<String>,
    pub rows: Vec<ReportRow>,
}

/// Reads a report written by [`write_report`]; the format is chosen by the
/// file signature, not the extension.
pub fn read_report(path: &Path) -> anyhow::Result<ReportSheet> {
    let (format, grid) = if is_zip_file(path)? {
        (ReportFormat::Xlsx, read_xlsx_grid(path)?)
    } else {
        (ReportFormat::Csv, read_csv_grid(path)?)
    };
    sheet_from_grid(format, grid)
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 4];
    let read = f.read(&mut sig).context("failed to read file signature")?;
    if read < 4 {
        return Ok(false);
    }
    Ok(sig == [0x50, 0x4B, 0x03, 0x04])
}

/// Splits CSV text into records. Quoted cells may hold commas, doubled quotes
/// and line breaks; blank lines are dropped.
fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    let mut end_record = |record: &mut Vec<String>, buf: &mut String| {
        record.push(std::mem::take(buf));
        let row = std::mem::take(record);
        if !(row.len() == 1 && row[0].trim().is_empty()) {
            rows.push(row);
        }
    };

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                buf.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => record.push(std::mem::take(&mut buf)),
            '\r' if !in_quotes => {}
            '\n' if !in_quotes => end_record(&mut record, &mut buf),
            _ => buf.push(ch),
        }
    }
    if !record.is_empty() || !buf.is_empty() {
        end_record(&mut record, &mut buf);
    }
    rows
}

fn read_csv_grid(path: &Path) -> anyhow::Result<Vec<Vec<String>>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
    Ok(parse_csv(text.trim_start_matches('\u{feff}')))
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> anyhow::Result<Option<String>> {
    let mut entry = match archive.by_name(name) {
        Ok(e) => e,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(anyhow!(e).context(format!("failed to open {}", name))),
    };
    let mut text = String::new();
    entry
        .read_to_string(&mut text)
        .with_context(|| format!("failed to read {}", name))?;
    Ok(Some(text))
}

fn text_runs(re_t: &Regex, xml: &str) -> String {
    re_t.captures_iter(xml)
        .filter_map(|c| c.get(1))
        .map(|m| unescape_xml(m.as_str()))
        .collect()
}

fn read_xlsx_grid(path: &Path) -> anyhow::Result<Vec<Vec<String>>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open workbook {}", path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(file).context("invalid zip archive")?;
    let sheet = read_entry(&mut archive, SHEET_ENTRY)?
        .ok_or_else(|| anyhow!("workbook has no {}", SHEET_ENTRY))?;

    let re_row = Regex::new(r"(?s)<row\b[^>]*?(?:/>|>(.*?)</row>)")?;
    let re_cell = Regex::new(r"(?s)<c\b([^>]*?)(?:/>|>(.*?)</c>)")?;
    let re_ref = Regex::new(r#"\br="([A-Z]+)\d*""#)?;
    let re_type = Regex::new(r#"\bt="([A-Za-z]+)""#)?;
    let re_v = Regex::new(r"(?s)<v>(.*?)</v>")?;
    let re_t = Regex::new(r"(?s)<t\b[^>]*>(.*?)</t>")?;
    let re_si = Regex::new(r"(?s)<si\b[^>]*>(.*?)</si>")?;

    let shared: Vec<String> = match read_entry(&mut archive, SHARED_STRINGS_ENTRY)? {
        Some(xml) => re_si
            .captures_iter(&xml)
            .map(|c| c.get(1).map(|m| text_runs(&re_t, m.as_str())).unwrap_or_default())
            .collect(),
        None => Vec::new(),
    };

    let mut grid = Vec::new();
    for row in re_row.captures_iter(&sheet) {
        let body = row.get(1).map(|m| m.as_str()).unwrap_or("");
        let mut cells: Vec<String> = Vec::new();
        for cell in re_cell.captures_iter(body) {
            let attrs = cell.get(1).map(|m| m.as_str()).unwrap_or("");
            let inner = cell.get(2).map(|m| m.as_str()).unwrap_or("");
            let value = match re_type.captures(attrs).and_then(|c| c.get(1)).map(|m| m.as_str()) {
                Some("inlineStr") => text_runs(&re_t, inner),
                Some("s") => re_v
                    .captures(inner)
                    .and_then(|c| c.get(1))
                    .and_then(|m| m.as_str().trim().parse::<usize>().ok())
                    .and_then(|i| shared.get(i).cloned())
                    .unwrap_or_default(),
                _ => re_v
                    .captures(inner)
                    .and_then(|c| c.get(1))
                    .map(|m| unescape_xml(m.as_str()))
                    .unwrap_or_default(),
            };
            let col = match re_ref.captures(attrs).and_then(|c| c.get(1)) {
                Some(m) => column_index(m.as_str()).ok_or_else(|| {
                    anyhow!("cell reference {} is beyond column XFD", m.as_str())
                })?,
                None => cells.len(),
            };
            if col >= MAX_COLUMNS {
                return Err(anyhow!("row has more than {} cells", MAX_COLUMNS));
            }
            if col >= cells.len() {
                cells.resize(col + 1, String::new());
            }
            cells[col] = value;
        }
        grid.push(cells);
    }
    Ok(grid)
}

fn parse_cell_number(s: &str) -> Option<f64> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        t.parse::<f64>().ok()
    }
}

fn sheet_from_grid(format: ReportFormat, grid: Vec<Vec<String>>) -> anyhow::Result<ReportSheet> {
    let mut rows_iter = grid.into_iter();
    let columns: Vec<String> = rows_iter
        .next()
        .ok_or_else(|| anyhow!("report is empty"))?
        .into_iter()
        .map(|c| c.trim().to_string())
        .collect();
    let width = columns.len();
    let min_width = 2 + SUMMARY_COLUMNS.len();
    let summary_ok = width >= min_width
        && columns[width - SUMMARY_COLUMNS.len()..]
            .iter()
            .zip(SUMMARY_COLUMNS)
            .all(|(a, b)| a.eq_ignore_ascii_case(b));
    if columns.first().map(String::as_str) != Some(SEAT_COLUMN)
        || columns.get(1).map(String::as_str) != Some(NAME_COLUMN)
        || !summary_ok
    {
        return Err(anyhow!("not a results report: unexpected header {:?}", columns));
    }
    let subjects: Vec<String> = columns[2..width - SUMMARY_COLUMNS.len()].to_vec();

    let mut rows = Vec::new();
    for mut cells in rows_iter {
        cells.resize(width, String::new());
        let at = |i: usize| cells[i].trim().to_string();
        let first_summary = 2 + subjects.len();
        rows.push(ReportRow {
            seat_number: at(0),
            name: at(1),
            marks: subjects
                .iter()
                .enumerate()
                .map(|(i, s)| ReportMark {
                    subject: s.clone(),
                    mark: parse_cell_number(&cells[2 + i]),
                })
                .collect(),
            total: parse_cell_number(&cells[first_summary]),
            percentage: parse_cell_number(&cells[first_summary + 1]),
            status: at(first_summary + 2),
            division: at(first_summary + 3),
        });
    }
    Ok(ReportSheet {
        format,
        columns,
        subjects,
        rows,
    })
}
