use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, DataType as _, Range, Reader, Sheets};
use chrono::NaiveDateTime;

use crate::error::{IngestionError, IngestionResult};
use crate::types::{DataSet, DataType, Field, Schema, Value};

/// How to read one worksheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetReadOptions {
    /// Sheet rows (counted from row 1) to skip before looking for the header row.
    pub skip_rows: usize,
    /// Zero-based sheet column positions to keep (`A` = 0). `None` keeps all columns.
    pub column_positions: Option<Vec<usize>>,
}

/// An open workbook with its sheet list cached.
pub struct Workbook {
    path: PathBuf,
    sheets: Sheets<BufReader<File>>,
    sheet_names: Vec<String>,
}

impl std::fmt::Debug for Workbook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workbook")
            .field("path", &self.path)
            .field("sheet_names", &self.sheet_names)
            .finish()
    }
}

/// Open an Excel document (`.xlsx`, `.xls`, `.xlsb`, `.ods`, ...).
pub fn open_workbook(path: impl AsRef<Path>) -> IngestionResult<Workbook> {
    let path = path.as_ref();
    let sheets = open_workbook_auto(path)?;
    let sheet_names = sheets.sheet_names().to_vec();
    Ok(Workbook {
        path: path.to_path_buf(),
        sheets,
        sheet_names,
    })
}

impl Workbook {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sheet names in workbook order.
    pub fn sheet_names(&self) -> &[String] {
        &self.sheet_names
    }

    /// Name of the first sheet; a workbook without sheets is reported as a missing sheet.
    pub fn first_sheet(&self) -> IngestionResult<String> {
        self.sheet_names
            .first()
            .cloned()
            .ok_or_else(|| IngestionError::MissingSheet {
                requested: vec!["<first sheet>".to_string()],
                available: Vec::new(),
            })
    }

    /// Fails with [`IngestionError::MissingSheet`] unless every requested sheet exists.
    pub fn ensure_sheets(&self, requested: &[String]) -> IngestionResult<()> {
        let missing: Vec<String> = requested
            .iter()
            .filter(|name| !self.sheet_names.contains(name))
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(IngestionError::MissingSheet {
                requested: missing,
                available: self.sheet_names.clone(),
            })
        }
    }

    /// Read one sheet into a [`DataSet`].
    ///
    /// Behavior:
    /// - Skips `skip_rows` sheet rows, then treats the first non-empty row as the header
    /// - Empty header cells become `Unnamed: <col>`, repeated headers get `.1`, `.2`, ... suffixes
    /// - Fully empty rows are dropped
    /// - Column types are inferred from the cells (see [`infer_type`])
    /// - Selected column positions outside the used range fail with
    ///   [`IngestionError::MissingColumns`]
    pub fn read_sheet(&mut self, sheet: &str, options: &SheetReadOptions) -> IngestionResult<DataSet> {
        self.ensure_sheets(&[sheet.to_string()])?;
        let range = self.sheets.worksheet_range(sheet)?;
        read_range(&range, options)
    }
}

fn read_range(range: &Range<Data>, options: &SheetReadOptions) -> IngestionResult<DataSet> {
    // Ranges start at the first used cell, not at A1.
    let (start_row, start_col) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));
    let skip_in_range = options.skip_rows.saturating_sub(start_row);

    let mut rows = range.rows().skip(skip_in_range);
    let header = loop {
        match rows.next() {
            Some(row) if row.iter().any(|c| !is_blank(c)) => break row,
            Some(_) => continue,
            None => return Ok(DataSet::default()),
        }
    };

    let width = range.width();
    let positions: Vec<usize> = match &options.column_positions {
        Some(wanted) => {
            let (inside, outside): (Vec<usize>, Vec<usize>) = wanted
                .iter()
                .copied()
                .partition(|&abs| abs >= start_col && abs - start_col < width);
            if !outside.is_empty() {
                return Err(IngestionError::MissingColumns {
                    missing: outside.into_iter().map(column_letters).collect(),
                    available: (start_col..start_col + width).map(column_letters).collect(),
                });
            }
            inside.into_iter().map(|abs| abs - start_col).collect()
        }
        None => (0..width).collect(),
    };

    let body: Vec<&[Data]> = rows.filter(|row| row.iter().any(|c| !is_blank(c))).collect();

    let mut names: Vec<String> = Vec::new();
    let mut columns: Vec<Vec<Value>> = Vec::new();
    for &rel in &positions {
        let label = header.get(rel).map(cell_to_header_string).unwrap_or_default();
        let label = label.trim();
        let values: Vec<Value> = body
            .iter()
            .map(|row| row.get(rel).map(cell_to_value).unwrap_or(Value::Null))
            .collect();

        if label.is_empty() {
            if values.iter().all(Value::is_null) && options.column_positions.is_none() {
                continue;
            }
            names.push(format!("Unnamed: {}", start_col + rel));
        } else {
            names.push(label.to_string());
        }
        columns.push(values);
    }
    dedupe_names(&mut names);

    let mut fields = Vec::with_capacity(names.len());
    let mut typed_columns = Vec::with_capacity(columns.len());
    for (name, values) in names.into_iter().zip(columns) {
        let data_type = infer_type(&values);
        fields.push(Field::new(name, data_type));
        typed_columns.push(
            values
                .into_iter()
                .map(|v| settle(v, data_type))
                .collect::<Vec<_>>(),
        );
    }

    let mut out_rows: Vec<Vec<Value>> = (0..body.len())
        .map(|_| Vec::with_capacity(fields.len()))
        .collect();
    for column in typed_columns {
        for (row, value) in out_rows.iter_mut().zip(column) {
            row.push(value);
        }
    }

    Ok(DataSet::new(Schema::new(fields), out_rows))
}

fn dedupe_names(names: &mut [String]) {
    for i in 0..names.len() {
        let mut n = 0;
        let base = names[i].clone();
        while names[..i].contains(&names[i]) {
            n += 1;
            names[i] = format!("{base}.{n}");
        }
    }
}

fn is_blank(c: &Data) -> bool {
    match c {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Infer a column type from its raw values.
///
/// Integral floats count as integers (Excel stores every number as a float). Nulls are
/// ignored; an all-null column is `Utf8`.
pub fn infer_type(values: &[Value]) -> DataType {
    let mut inferred: Option<DataType> = None;
    for v in values {
        let t = match v {
            Value::Null => continue,
            Value::Int64(_) => DataType::Int64,
            Value::Float64(f) if is_integral(*f) => DataType::Int64,
            Value::Float64(_) => DataType::Float64,
            Value::Bool(_) => DataType::Bool,
            Value::Timestamp(_) => DataType::Timestamp,
            Value::Utf8(_) => DataType::Utf8,
        };
        inferred = Some(inferred.map_or(t, |cur| cur.widen(t)));
    }
    inferred.unwrap_or(DataType::Utf8)
}

fn is_integral(f: f64) -> bool {
    f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15
}

fn settle(v: Value, data_type: DataType) -> Value {
    match (v, data_type) {
        (Value::Float64(f), DataType::Int64) => Value::Int64(f as i64),
        (v, t) => v.coerce(t),
    }
}

/// Text form of a header cell. Integral numbers render without a fractional part so that
/// period headers like `202301` survive.
pub fn cell_to_header_string(c: &Data) -> String {
    match c {
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 {
                (*f as i64).to_string()
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(_) => match c.as_datetime() {
            Some(dt) => dt.to_string(),
            None => c.to_string(),
        },
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("{e:?}"),
        Data::Empty => "".to_string(),
    }
}

fn cell_to_value(c: &Data) -> Value {
    match c {
        Data::Empty | Data::Error(_) => Value::Null,
        Data::String(s) if s.trim().is_empty() => Value::Null,
        Data::String(s) => Value::Utf8(s.clone()),
        Data::Int(i) => Value::Int64(*i),
        Data::Float(f) => Value::Float64(*f),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(_) => match c.as_datetime() {
            Some(dt) => Value::Timestamp(dt),
            None => Value::Utf8(c.to_string()),
        },
        Data::DateTimeIso(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .map(Value::Timestamp)
            .unwrap_or_else(|_| Value::Utf8(s.clone())),
        Data::DurationIso(s) => Value::Utf8(s.clone()),
    }
}

/// Last column of an Excel sheet (`XFD`), zero-based.
const MAX_COLUMN: usize = 16_383;

/// Parse an Excel column-letter selection such as `"A:C,E"` into zero-based positions.
///
/// Returns `None` when the text is not a letter selection: a part that is not one to three
/// letters, a column past `XFD` or a reversed range.
pub fn parse_column_letters(selection: &str) -> Option<Vec<usize>> {
    let mut out = Vec::new();
    for part in selection.split(',') {
        let part = part.trim();
        match part.split_once(':') {
            Some((from, to)) => {
                let from = letters_to_index(from.trim())?;
                let to = letters_to_index(to.trim())?;
                if from > to {
                    return None;
                }
                out.extend(from..=to);
            }
            None => out.push(letters_to_index(part)?),
        }
    }
    Some(out)
}

fn letters_to_index(letters: &str) -> Option<usize> {
    if !(1..=3).contains(&letters.len()) || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let n = letters
        .chars()
        .fold(0usize, |acc, c| acc * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1));
    Some(n - 1).filter(|&idx| idx <= MAX_COLUMN)
}

/// Zero-based column position to its Excel letters (`0` → `A`, `26` → `AA`).
pub fn column_letters(position: usize) -> String {
    let mut n = position + 1;
    let mut out = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        out.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range_from(rows: Vec<Vec<Data>>) -> Range<Data> {
        let height = rows.len() as u32;
        let width = rows.iter().map(Vec::len).max().unwrap_or(0) as u32;
        let mut range = Range::new((0, 0), (height - 1, width - 1));
        for (r, row) in rows.into_iter().enumerate() {
            for (c, cell) in row.into_iter().enumerate() {
                range.set_value((r as u32, c as u32), cell);
            }
        }
        range
    }

    #[test]
    fn header_detection_skip_rows_and_types() {
        let range = range_from(vec![
            vec![Data::String("Report".into()), Data::Empty, Data::Empty],
            vec![Data::Empty, Data::Empty, Data::Empty],
            vec![Data::String("id".into()), Data::Float(202301.0), Data::String("name".into())],
            vec![Data::Float(1.0), Data::Float(1.5), Data::String("a".into())],
            vec![Data::Empty, Data::Empty, Data::Empty],
            vec![Data::Float(2.0), Data::Int(3), Data::Empty],
        ]);

        let ds = read_range(&range, &SheetReadOptions { skip_rows: 1, column_positions: None }).unwrap();
        assert_eq!(ds.column_names(), vec!["id", "202301", "name"]);
        assert_eq!(ds.row_count(), 2);
        assert_eq!(ds.schema.fields[0].data_type, DataType::Int64);
        assert_eq!(ds.schema.fields[1].data_type, DataType::Float64);
        assert_eq!(ds.rows[0][0], Value::Int64(1));
        assert_eq!(ds.rows[1][1], Value::Float64(3.0));
        assert_eq!(ds.rows[1][2], Value::Null);
    }

    #[test]
    fn unnamed_and_duplicate_headers() {
        let range = range_from(vec![
            vec![Data::String("a".into()), Data::Empty, Data::String("a".into()), Data::Empty],
            vec![Data::Int(1), Data::Int(2), Data::Int(3), Data::Empty],
        ]);
        let ds = read_range(&range, &SheetReadOptions::default()).unwrap();
        assert_eq!(ds.column_names(), vec!["a", "Unnamed: 1", "a.1"]);
    }

    #[test]
    fn column_positions_project() {
        let range = range_from(vec![
            vec![Data::String("a".into()), Data::String("b".into()), Data::String("c".into())],
            vec![Data::Int(1), Data::Bool(true), Data::String("x".into())],
        ]);
        let ds = read_range(
            &range,
            &SheetReadOptions { skip_rows: 0, column_positions: Some(vec![0, 2]) },
        )
        .unwrap();
        assert_eq!(ds.column_names(), vec!["a", "c"]);
        assert_eq!(ds.rows[0], vec![Value::Int64(1), Value::Utf8("x".into())]);
    }

    #[test]
    fn positions_outside_the_sheet_are_missing_columns() {
        let range = range_from(vec![
            vec![Data::String("a".into()), Data::String("b".into())],
            vec![Data::Int(1), Data::Int(2)],
        ]);
        let options = SheetReadOptions { skip_rows: 0, column_positions: Some(vec![0, 3, 237]) };
        match read_range(&range, &options) {
            Err(IngestionError::MissingColumns { missing, available }) => {
                assert_eq!(missing, vec!["D", "ID"]);
                assert_eq!(available, vec!["A", "B"]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn mixed_columns_fall_back_to_text() {
        let values = vec![Value::Float64(1.0), Value::Utf8("n/a".into()), Value::Null];
        assert_eq!(infer_type(&values), DataType::Utf8);
        assert_eq!(settle(Value::Float64(1.0), DataType::Utf8), Value::Utf8("1".into()));
        assert_eq!(infer_type(&[Value::Null]), DataType::Utf8);
    }

    #[test]
    fn letter_selections() {
        assert_eq!(parse_column_letters("A:C,E"), Some(vec![0, 1, 2, 4]));
        assert_eq!(parse_column_letters("aa"), Some(vec![26]));
        assert_eq!(parse_column_letters("C:A"), None);
        assert_eq!(parse_column_letters("id, name"), None);
        assert_eq!(parse_column_letters("XFD"), Some(vec![MAX_COLUMN]));
        assert_eq!(parse_column_letters("XFE"), None);
        assert_eq!(parse_column_letters("name"), None);
    }

    #[test]
    fn letters_for_positions() {
        assert_eq!(column_letters(0), "A");
        assert_eq!(column_letters(25), "Z");
        assert_eq!(column_letters(26), "AA");
        assert_eq!(column_letters(237), "ID");
        assert_eq!(column_letters(MAX_COLUMN), "XFD");
    }
}
