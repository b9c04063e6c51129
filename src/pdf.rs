//! Minimal single-column PDF writer for plain-text reports.
//!
//! Uses the three built-in Helvetica faces with WinAnsi encoding, so no font
//! data is embedded. Output carries no creation date or document id: the same
//! lines always produce the same bytes.

use std::fmt::Write as _;

const MM: f32 = 72.0 / 25.4;
const PAGE_WIDTH: f32 = 595.28;
const PAGE_HEIGHT: f32 = 841.89;
const MARGIN: f32 = 10.0 * MM;
const BREAK_MARGIN: f32 = 20.0 * MM;
const CELL_PADDING: f32 = 1.0 * MM;
const FIRST_PAGE_OBJECT: usize = 7;

/// Glyph advance widths (1/1000 em) of Helvetica for bytes 0x20..=0x7E.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // '0'..'?'
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // '@'..'O'
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 'P'..'_'
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // '`'..'o'
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 'p'..'~'
];

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FontStyle {
    Regular,
    Bold,
    Italic,
}

impl FontStyle {
    fn resource(self) -> &'static str {
        match self {
            FontStyle::Regular => "F1",
            FontStyle::Bold => "F2",
            FontStyle::Italic => "F3",
        }
    }
}

/// Accumulates text rows top to bottom, breaking pages as needed.
pub struct PdfDocument {
    title: String,
    pages: Vec<String>,
    cursor: f32,
}

impl PdfDocument {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            pages: vec![String::new()],
            cursor: MARGIN,
        }
    }

    /// Writes `text` in rows of `row_height_mm`, wrapping at word boundaries.
    pub fn text_row(&mut self, style: FontStyle, size: f32, row_height_mm: f32, text: &str) {
        let row_height = row_height_mm * MM;
        let encoded = encode_win_ansi(text);
        let max_width = PAGE_WIDTH - 2.0 * MARGIN - 2.0 * CELL_PADDING;
        let rows = wrap(&encoded, size, max_width);
        for row in rows {
            if self.cursor + row_height > PAGE_HEIGHT - BREAK_MARGIN {
                self.pages.push(String::new());
                self.cursor = MARGIN;
            }
            let baseline = PAGE_HEIGHT - (self.cursor + 0.5 * row_height + 0.3 * size);
            let Some(stream) = self.pages.last_mut() else {
                return;
            };
            let _ = writeln!(
                stream,
                "BT /{} {:.2} Tf {:.2} {:.2} Td ({}) Tj ET",
                style.resource(),
                size,
                MARGIN + CELL_PADDING,
                baseline,
                escape_literal(row)
            );
            self.cursor += row_height;
        }
    }

    /// Advances the cursor without drawing.
    pub fn gap(&mut self, height_mm: f32) {
        self.cursor += height_mm * MM;
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn finish(self) -> Vec<u8> {
        let page_count = self.pages.len();
        let content_len: usize = self.pages.iter().map(String::len).sum();
        let mut out: Vec<u8> = Vec::with_capacity(1024 + content_len);
        let mut offsets: Vec<usize> = Vec::new();
        out.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");

        let kids = (0..page_count)
            .map(|idx| format!("{} 0 R", FIRST_PAGE_OBJECT + idx * 2))
            .collect::<Vec<_>>()
            .join(" ");
        let title = escape_literal(&encode_win_ansi(&self.title));

        let mut objects: Vec<Vec<u8>> = vec![
            b"<< /Type /Catalog /Pages 2 0 R >>".to_vec(),
            format!("<< /Type /Pages /Kids [{kids}] /Count {page_count} >>").into_bytes(),
            font_object("Helvetica"),
            font_object("Helvetica-Bold"),
            font_object("Helvetica-Oblique"),
            format!("<< /Title ({title}) /Producer (toxguard-rs) >>").into_bytes(),
        ];
        for (idx, content) in self.pages.iter().enumerate() {
            let contents_id = FIRST_PAGE_OBJECT + idx * 2 + 1;
            objects.push(
                format!(
                    "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH:.2} {PAGE_HEIGHT:.2}] \
                     /Resources << /Font << /F1 3 0 R /F2 4 0 R /F3 5 0 R >> >> \
                     /Contents {contents_id} 0 R >>"
                )
                .into_bytes(),
            );
            let mut stream = format!("<< /Length {} >>\nstream\n", content.len()).into_bytes();
            stream.extend_from_slice(content.as_bytes());
            stream.extend_from_slice(b"endstream");
            objects.push(stream);
        }

        for (idx, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj\n", idx + 1).as_bytes());
            out.extend_from_slice(body);
            out.extend_from_slice(b"\nendobj\n");
        }

        let xref_offset = out.len();
        let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
        for offset in &offsets {
            let _ = write!(xref, "{offset:010} 00000 n \n");
        }
        let _ = write!(
            xref,
            "trailer\n<< /Size {} /Root 1 0 R /Info 6 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
            objects.len() + 1
        );
        out.extend_from_slice(xref.as_bytes());
        out
    }
}

fn font_object(base: &str) -> Vec<u8> {
    format!("<< /Type /Font /Subtype /Type1 /BaseFont /{base} /Encoding /WinAnsiEncoding >>")
        .into_bytes()
}

/// Encodes text as WinAnsi (CP1252). Unsupported characters are dropped;
/// line breaks and tabs become spaces.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars().filter_map(win_ansi_byte).collect()
}

fn win_ansi_byte(ch: char) -> Option<u8> {
    let code = ch as u32;
    match ch {
        '\t' | '\n' | '\r' => Some(b' '),
        ' '..='~' => Some(code as u8),
        '\u{A0}'..='\u{FF}' => Some(code as u8),
        '€' => Some(0x80),
        '‚' => Some(0x82),
        'ƒ' => Some(0x83),
        '„' => Some(0x84),
        '…' => Some(0x85),
        '†' => Some(0x86),
        '‡' => Some(0x87),
        'ˆ' => Some(0x88),
        '‰' => Some(0x89),
        'Š' => Some(0x8A),
        '‹' => Some(0x8B),
        'Œ' => Some(0x8C),
        'Ž' => Some(0x8E),
        '\u{2018}' => Some(0x91),
        '\u{2019}' => Some(0x92),
        '\u{201C}' => Some(0x93),
        '\u{201D}' => Some(0x94),
        '•' => Some(0x95),
        '–' => Some(0x96),
        '—' => Some(0x97),
        '˜' => Some(0x98),
        '™' => Some(0x99),
        'š' => Some(0x9A),
        '›' => Some(0x9B),
        'œ' => Some(0x9C),
        'ž' => Some(0x9E),
        'Ÿ' => Some(0x9F),
        _ => None,
    }
}

fn glyph_width(byte: u8) -> u16 {
    match byte {
        0x20..=0x7E => HELVETICA_WIDTHS[(byte - 0x20) as usize],
        _ => 556,
    }
}

fn text_width(bytes: &[u8], size: f32) -> f32 {
    bytes.iter().map(|b| f32::from(glyph_width(*b))).sum::<f32>() * size / 1000.0
}

/// Splits encoded text into rows no wider than `max_width` points.
fn wrap(bytes: &[u8], size: f32, max_width: f32) -> Vec<&[u8]> {
    let mut rows = Vec::new();
    let mut start = 0;
    while start < bytes.len() {
        let mut end = start;
        let mut last_space = None;
        let mut width = 0.0;
        while end < bytes.len() {
            let advance = f32::from(glyph_width(bytes[end])) * size / 1000.0;
            if width + advance > max_width && end > start {
                break;
            }
            if bytes[end] == b' ' {
                last_space = Some(end);
            }
            width += advance;
            end += 1;
        }
        if end < bytes.len() {
            if let Some(space) = last_space.filter(|space| *space > start) {
                end = space;
            }
        }
        rows.push(&bytes[start..end]);
        start = end;
        while start < bytes.len() && bytes[start] == b' ' {
            start += 1;
        }
    }
    if rows.is_empty() {
        rows.push(bytes);
    }
    debug_assert!(
        rows.iter()
            .all(|row| row.len() <= 1 || text_width(row, size) <= max_width + 0.01)
    );
    rows
}

/// Escapes a byte string for a PDF literal; non-ASCII bytes become octal escapes.
fn escape_literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &byte in bytes {
        match byte {
            b'(' | b')' | b'\\' => {
                out.push('\\');
                out.push(byte as char);
            }
            0x20..=0x7E => out.push(byte as char),
            _ => {
                let _ = write!(out, "\\{byte:03o}");
            }
        }
    }
    out
}
