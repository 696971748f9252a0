//! YOLO label text format: one `<class> <x> <y> <w> <h>` line per box.

use thiserror::Error;

use crate::BoundingBox;

const DECIMALS: usize = 6;

#[derive(Debug, Error, PartialEq)]
pub enum LabelParseError {
    #[error("line {line}: expected 5 fields, got {got}")]
    FieldCount { line: usize, got: usize },
    #[error("line {line}: invalid class id {value:?}")]
    Class { line: usize, value: String },
    #[error("line {line}: invalid coordinate {value:?}")]
    Coordinate { line: usize, value: String },
}

pub fn render_line(b: &BoundingBox) -> String {
    format!(
        "{} {:.p$} {:.p$} {:.p$} {:.p$}",
        b.class, b.x, b.y, b.width, b.height,
        p = DECIMALS
    )
}

/// Parse one label line. `line_no` is 1-based and only used for error reporting.
pub fn parse_line(text: &str, line_no: usize) -> Result<BoundingBox, LabelParseError> {
    let fields: Vec<&str> = text.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(LabelParseError::FieldCount { line: line_no, got: fields.len() });
    }

    let class = fields[0]
        .parse::<usize>()
        .map_err(|_| LabelParseError::Class { line: line_no, value: fields[0].to_string() })?;

    let mut coords = [0.0f32; 4];
    for (slot, raw) in coords.iter_mut().zip(&fields[1..]) {
        let v = raw
            .parse::<f32>()
            .map_err(|_| LabelParseError::Coordinate { line: line_no, value: raw.to_string() })?;
        if !v.is_finite() {
            return Err(LabelParseError::Coordinate { line: line_no, value: raw.to_string() });
        }
        *slot = v;
    }

    Ok(BoundingBox { class, x: coords[0], y: coords[1], width: coords[2], height: coords[3] })
}

/// Blank lines are skipped.
pub fn parse_label_file(text: &str) -> Result<Vec<BoundingBox>, LabelParseError> {
    text.lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| parse_line(l, i + 1))
        .collect()
}

pub fn render_label_file(boxes: &[BoundingBox]) -> String {
    let mut out = String::new();
    for b in boxes {
        out.push_str(&render_line(b));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_six_decimals() {
        let b = BoundingBox { class: 1, x: 0.5, y: 0.5, width: 0.15625, height: 0.078125 };
        assert_eq!(render_line(&b), "1 0.500000 0.500000 0.156250 0.078125");
    }

    #[test]
    fn parses_file_and_skips_blank_lines() {
        let text = "0 0.1 0.2 0.3 0.4\n\n2 0.5 0.5 0.25 0.125\n";
        let boxes = parse_label_file(text).unwrap();
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[1].class, 2);
        assert_eq!(boxes[1].height, 0.125);
    }

    #[test]
    fn rejects_polygon_lines() {
        let err = parse_line("0 0.1 0.1 0.2 0.1 0.2 0.2", 7).unwrap_err();
        assert_eq!(err, LabelParseError::FieldCount { line: 7, got: 7 });
    }

    #[test]
    fn reports_bad_fields_with_line_numbers() {
        assert_eq!(
            parse_label_file("0 0.1 0.1 0.1 0.1\n-1 0.1 0.1 0.1 0.1").unwrap_err(),
            LabelParseError::Class { line: 2, value: "-1".into() }
        );
        assert_eq!(
            parse_line("0 0.1 nan 0.1 0.1", 1).unwrap_err(),
            LabelParseError::Coordinate { line: 1, value: "nan".into() }
        );
    }

    #[test]
    fn rendered_file_parses_back() {
        let boxes = vec![
            BoundingBox { class: 0, x: 0.25, y: 0.5, width: 0.125, height: 0.0625 },
            BoundingBox { class: 4, x: 0.75, y: 0.375, width: 0.5, height: 0.25 },
        ];
        assert_eq!(parse_label_file(&render_label_file(&boxes)).unwrap(), boxes);
    }
}
