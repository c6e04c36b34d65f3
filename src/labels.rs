//! Label sheet output.
//!
//! Records are printed on A4 sheets of 2 × 7 adhesive labels. Positions are
//! given in millimetres from the top left of the sheet and converted to PDF
//! points, with y measured from the bottom of the page.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use tracing::info;

use crate::error::{Error, Result};
use crate::types::{AddressRecord, HomeCountry};

/// Labels across a sheet.
pub const COLUMNS: usize = 2;
/// Labels down a sheet.
pub const ROWS: usize = 7;
/// Labels on one sheet.
pub const LABELS_PER_PAGE: usize = COLUMNS * ROWS;

/// PDF points per millimetre.
pub const POINTS_PER_MM: f64 = 72.0 / 25.4;

const PAGE_WIDTH: f64 = 210.0;
const PAGE_HEIGHT: f64 = 297.0;
const MARGIN_TOP: f64 = 15.15;
const MARGIN_LEFT: f64 = 7.75;
const LABEL_WIDTH: f64 = 99.1;
const LABEL_HEIGHT: f64 = 38.1;
const TEXT_TOP: f64 = 9.5;
const TEXT_LEFT: f64 = 6.5;
const LINE_SPACING: f64 = 4.75;

/// Font size in points.
pub const FONT_SIZE: u32 = 11;

/// Document title.
pub const TITLE: &str = "Address Labels";

/// One line of text placed on a page, in points.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedText {
    /// Distance from the left edge
    pub x: f64,
    /// Distance from the bottom edge
    pub y: f64,
    /// Text to draw
    pub text: String,
}

/// One printed sheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelPage {
    /// Lines in drawing order
    pub lines: Vec<PlacedText>,
}

/// Text lines of one label.
///
/// Name, address, the optional second address line, postal code and city,
/// and the country when it is not the home country.
pub fn label_lines(record: &AddressRecord, home: &HomeCountry) -> Vec<String> {
    let mut lines = vec![
        format!("{} {}", record.first_name, record.last_name),
        record.address.clone(),
    ];
    if !record.address_2.is_empty() {
        lines.push(record.address_2.clone());
    }
    lines.push(format!("{}  {}", record.postal_code, record.city));
    if !record.country.is_empty() && record.country.to_lowercase() != home.name.to_lowercase() {
        lines.push(record.country.to_uppercase());
    }
    lines
}

/// Laid-out label sheets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelSheet {
    pages: Vec<LabelPage>,
}

impl LabelSheet {
    /// Place `records` on sheets, filling each sheet row by row.
    pub fn layout(records: &[AddressRecord], home: &HomeCountry) -> Self {
        let pages = records
            .chunks(LABELS_PER_PAGE)
            .map(|chunk| {
                let mut page = LabelPage::default();
                for (slot, record) in chunk.iter().enumerate() {
                    let row = slot / COLUMNS;
                    let column = slot % COLUMNS;
                    let x = MARGIN_LEFT + column as f64 * LABEL_WIDTH + TEXT_LEFT;
                    let y = PAGE_HEIGHT - (MARGIN_TOP + row as f64 * LABEL_HEIGHT + TEXT_TOP);

                    for (index, text) in label_lines(record, home).into_iter().enumerate() {
                        page.lines.push(PlacedText {
                            x: x * POINTS_PER_MM,
                            y: (y - index as f64 * LINE_SPACING) * POINTS_PER_MM,
                            text,
                        });
                    }
                }
                page
            })
            .collect();

        Self { pages }
    }

    /// Laid-out pages.
    pub fn pages(&self) -> &[LabelPage] {
        &self.pages
    }

    /// Encode the sheets as a PDF document.
    ///
    /// Uses the standard Helvetica font, so nothing is embedded. An empty
    /// sheet still produces one blank page.
    pub fn to_pdf(&self) -> Vec<u8> {
        let blank = [LabelPage::default()];
        let pages: &[LabelPage] = if self.pages.is_empty() { &blank } else { &self.pages };

        let mut pdf = PdfWriter::new();
        // fixed object numbers: 1 catalog, 2 page tree, 3 font, 4 info
        let first_page = 5;
        let kids = (0..pages.len())
            .map(|i| format!("{} 0 R", first_page + 2 * i))
            .collect::<Vec<_>>()
            .join(" ");

        pdf.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
        pdf.object(
            2,
            &format!("<< /Type /Pages /Kids [{kids}] /Count {} >>", pages.len()),
        );
        pdf.object(
            3,
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>",
        );
        pdf.object(
            4,
            &format!(
                "<< /Title {} /Producer {} >>",
                pdf_string(TITLE),
                pdf_string(env!("CARGO_PKG_NAME"))
            ),
        );

        for (i, page) in pages.iter().enumerate() {
            let page_id = first_page + 2 * i;
            let content_id = page_id + 1;
            pdf.object(
                page_id,
                &format!(
                    "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {:.2} {:.2}] \
                     /Resources << /Font << /F1 3 0 R >> >> /Contents {content_id} 0 R >>",
                    PAGE_WIDTH * POINTS_PER_MM,
                    PAGE_HEIGHT * POINTS_PER_MM
                ),
            );
            pdf.stream(content_id, &content_stream(page));
        }

        pdf.finish(1, 4)
    }

    /// Write the sheets to a PDF file.
    pub fn write_pdf(&self, path: &Path) -> Result<()> {
        let labels: usize = self.pages.iter().map(|p| p.lines.len()).sum();
        info!(pages = self.pages.len(), lines = labels, path = %path.display(), "writing label sheet");
        fs::write(path, self.to_pdf())
            .map_err(|e| Error::render(format!("{}: {}", path.display(), e)))
    }
}

fn content_stream(page: &LabelPage) -> Vec<u8> {
    let mut content = format!("BT\n/F1 {FONT_SIZE} Tf\n").into_bytes();
    for line in &page.lines {
        content.extend_from_slice(format!("1 0 0 1 {:.2} {:.2} Tm\n", line.x, line.y).as_bytes());
        content.extend_from_slice(pdf_string(&line.text).as_bytes());
        content.extend_from_slice(b" Tj\n");
    }
    content.extend_from_slice(b"ET\n");
    content
}

/// Encode text as a PDF literal string in WinAnsi encoding.
///
/// Latin-1 characters map one to one; anything else becomes `?`.
fn pdf_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('(');
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            ' '..='~' => out.push(c),
            '\u{a0}'..='\u{ff}' => {
                let _ = write!(out, "\\{:03o}", c as u32);
            }
            _ => out.push('?'),
        }
    }
    out.push(')');
    out
}

/// Sequential PDF object writer with a cross-reference table.
struct PdfWriter {
    buffer: Vec<u8>,
    offsets: Vec<(usize, usize)>,
}

impl PdfWriter {
    fn new() -> Self {
        Self {
            buffer: b"%PDF-1.4\n".to_vec(),
            offsets: Vec::new(),
        }
    }

    fn object(&mut self, id: usize, body: &str) {
        self.offsets.push((id, self.buffer.len()));
        self.buffer
            .extend_from_slice(format!("{id} 0 obj\n{body}\nendobj\n").as_bytes());
    }

    fn stream(&mut self, id: usize, data: &[u8]) {
        self.offsets.push((id, self.buffer.len()));
        self.buffer.extend_from_slice(
            format!("{id} 0 obj\n<< /Length {} >>\nstream\n", data.len()).as_bytes(),
        );
        self.buffer.extend_from_slice(data);
        self.buffer.extend_from_slice(b"\nendstream\nendobj\n");
    }

    fn finish(mut self, root: usize, info: usize) -> Vec<u8> {
        self.offsets.sort_unstable();
        let size = self.offsets.len() + 1;
        let xref = self.buffer.len();

        let mut table = format!("xref\n0 {size}\n0000000000 65535 f \n");
        for (_, offset) in &self.offsets {
            let _ = writeln!(table, "{offset:010} 00000 n ");
        }
        let _ = write!(
            table,
            "trailer\n<< /Size {size} /Root {root} 0 R /Info {info} 0 R >>\nstartxref\n{xref}\n%%EOF\n"
        );

        self.buffer.extend_from_slice(table.as_bytes());
        self.buffer
    }
}
