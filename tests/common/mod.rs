#![allow(dead_code)]

use std::path::{Path, PathBuf};

use rust_xlsxwriter::Workbook;

/// A cell in a fixture sheet.
#[derive(Debug, Clone, Copy)]
pub enum Cell {
    N(f64),
    S(&'static str),
    B(bool),
    Empty,
}

pub struct Sheet<'a> {
    pub name: &'a str,
    pub header: &'a [&'a str],
    pub rows: Vec<Vec<Cell>>,
}

/// Write a workbook with the given sheets; row 0 of each sheet is its header.
pub fn write_workbook(path: &Path, sheets: &[Sheet<'_>]) {
    let mut wb = Workbook::new();
    for sheet in sheets {
        let ws = wb.add_worksheet();
        ws.set_name(sheet.name).unwrap();
        for (c, h) in sheet.header.iter().enumerate() {
            ws.write_string(0, c as u16, *h).unwrap();
        }
        for (r, row) in sheet.rows.iter().enumerate() {
            let r = r as u32 + 1;
            for (c, cell) in row.iter().enumerate() {
                let c = c as u16;
                match cell {
                    Cell::N(n) => {
                        ws.write_number(r, c, *n).unwrap();
                    }
                    Cell::S(s) => {
                        ws.write_string(r, c, *s).unwrap();
                    }
                    Cell::B(b) => {
                        ws.write_boolean(r, c, *b).unwrap();
                    }
                    Cell::Empty => {}
                }
            }
        }
    }
    wb.save(path).unwrap();
}

/// Write `description.xlsx` with `key`/`value` rows into `dir`.
pub fn write_config(dir: &Path, pairs: &[(&str, &str)]) {
    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    ws.write_string(0, 0, "key").unwrap();
    ws.write_string(0, 1, "value").unwrap();
    for (r, (k, v)) in pairs.iter().enumerate() {
        ws.write_string(r as u32 + 1, 0, *k).unwrap();
        ws.write_string(r as u32 + 1, 1, *v).unwrap();
    }
    wb.save(dir.join("description.xlsx")).unwrap();
}

/// A one-sheet sales workbook: `ID`, `Сумма`, `Регион` with `rows` rows.
pub fn write_sales(path: &Path, rows: usize) {
    write_workbook(
        path,
        &[Sheet {
            name: "Sheet1",
            header: &["ID", "Сумма", "Регион"],
            rows: (0..rows)
                .map(|i| vec![Cell::N(i as f64 + 1.0), Cell::N(10.5 * (i as f64 + 1.0)), Cell::S("Юг")])
                .collect(),
        }],
    );
}

/// A wide plan workbook: `id`, `name` and one column per period, `rows` rows.
pub fn write_plan(path: &Path, sheet: &str, periods: &[&'static str], rows: usize) {
    let mut header = vec!["id", "name"];
    header.extend_from_slice(periods);
    write_workbook(
        path,
        &[Sheet {
            name: sheet,
            header: &header,
            rows: (0..rows)
                .map(|i| {
                    let mut row = vec![Cell::N(i as f64 + 1.0), Cell::S("item")];
                    row.extend(periods.iter().enumerate().map(|(p, _)| Cell::N((i * 10 + p) as f64)));
                    row
                })
                .collect(),
        }],
    );
}

pub fn sub_dir(root: &Path, name: &str) -> PathBuf {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
