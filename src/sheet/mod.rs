pub mod transform;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use rust_xlsxwriter::{Workbook, XlsxError};
use std::{io::Cursor, path::Path};
use thiserror::Error;

pub const XLSX_MEDIA_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Error, Debug)]
pub enum SheetError {
    #[error("failed to parse spreadsheet: {0}")]
    Parse(#[from] calamine::Error),
    #[error("spreadsheet has no worksheet")]
    NoWorksheet,
    #[error("spreadsheet has no header row")]
    Empty,
    #[error("column `{0}` not found")]
    MissingColumn(String),
    #[error("failed to write spreadsheet: {0}")]
    Write(#[from] XlsxError),
}

/// A worksheet with every cell rendered as text. The first row is the header.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

/// Render a cell the way pandas' `astype(str)` shows it.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Bool(true) => "True".to_string(),
        Data::Bool(false) => "False".to_string(),
        Data::DateTime(dt) if dt.is_duration() => {
            let secs = (dt.as_f64() * 86_400.0).round() as i64;
            format!(
                "{} days {:02}:{:02}:{:02}",
                secs.div_euclid(86_400),
                secs.rem_euclid(86_400) / 3600,
                secs.rem_euclid(3600) / 60,
                secs.rem_euclid(60)
            )
        }
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(datetime) => datetime.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => dt.as_f64().to_string(),
        },
        other => other.to_string(),
    }
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();

        Self { headers, rows }
    }

    /// Read the first worksheet of an xlsx, xls, xlsb or ods payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SheetError> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or(SheetError::NoWorksheet)??;

        let mut rows = range.rows();
        let headers: Vec<String> = rows
            .next()
            .ok_or(SheetError::Empty)?
            .iter()
            .map(cell_text)
            .collect();

        if headers.iter().all(|h| h.is_empty()) {
            return Err(SheetError::Empty);
        }

        let rows = rows
            .map(|row| row.iter().map(cell_text).collect())
            .collect();

        Ok(Self::new(headers, rows))
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Result<usize, SheetError> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| SheetError::MissingColumn(name.to_string()))
    }

    pub fn filter_eq(&self, column: &str, value: &str) -> Result<Self, SheetError> {
        let idx = self.column_index(column)?;
        let rows = self
            .rows
            .iter()
            .filter(|row| row[idx] == value)
            .cloned()
            .collect();

        Ok(Self {
            headers: self.headers.clone(),
            rows,
        })
    }

    pub fn select_columns<S: AsRef<str>>(&self, columns: &[S]) -> Result<Self, SheetError> {
        let indexes = columns
            .iter()
            .map(|c| self.column_index(c.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            headers: indexes.iter().map(|&i| self.headers[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| indexes.iter().map(|&i| row[i].clone()).collect())
                .collect(),
        })
    }

    pub fn append_column(&mut self, name: &str, value: &str) {
        self.headers.push(name.to_string());
        for row in &mut self.rows {
            row.push(value.to_string());
        }
    }

    /// Append a column joining the given columns of each row with `sep`.
    pub fn concat_columns<S: AsRef<str>>(
        &mut self,
        columns: &[S],
        name: &str,
        sep: &str,
    ) -> Result<(), SheetError> {
        let indexes = columns
            .iter()
            .map(|c| self.column_index(c.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        self.headers.push(name.to_string());
        for row in &mut self.rows {
            let joined = indexes
                .iter()
                .map(|&i| row[i].as_str())
                .collect::<Vec<_>>()
                .join(sep);
            row.push(joined);
        }

        Ok(())
    }

    fn to_workbook(&self) -> Result<Workbook, SheetError> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();

        for (col, header) in self.headers.iter().enumerate() {
            worksheet.write_string(0, col as u16, header)?;
        }
        for (row_idx, row) in self.rows.iter().enumerate() {
            for (col, cell) in row.iter().enumerate() {
                if !cell.is_empty() {
                    worksheet.write_string(row_idx as u32 + 1, col as u16, cell)?;
                }
            }
        }

        Ok(workbook)
    }

    pub fn to_xlsx_bytes(&self) -> Result<Vec<u8>, SheetError> {
        Ok(self.to_workbook()?.save_to_buffer()?)
    }

    /// Blocking; call from `spawn_blocking` inside async code.
    pub fn write_xlsx(&self, path: impl AsRef<Path>) -> Result<(), SheetError> {
        self.to_workbook()?.save(path.as_ref())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::{ExcelDateTime, Format};

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn sample() -> Table {
        Table::new(
            strings(&["LIVRO", "CONC", "UC"]),
            vec![
                strings(&["5", "a", "1"]),
                strings(&["4", "b", "2"]),
                strings(&["5", "c"]),
            ],
        )
    }

    #[test]
    fn short_rows_are_padded() {
        assert_eq!(sample().rows()[2], strings(&["5", "c", ""]));
    }

    #[test]
    fn filter_and_select() {
        let table = sample().filter_eq("LIVRO", "5").unwrap();
        assert_eq!(table.len(), 2);

        let table = table.select_columns(&["UC", "LIVRO"]).unwrap();
        assert_eq!(table.headers(), strings(&["UC", "LIVRO"]).as_slice());
        assert_eq!(table.rows()[0], strings(&["1", "5"]));
    }

    #[test]
    fn unknown_column_is_reported() {
        let err = sample().filter_eq("ROTA", "1").unwrap_err();
        assert!(matches!(err, SheetError::MissingColumn(c) if c == "ROTA"));
    }

    #[test]
    fn concat_columns_joins_values() {
        let mut table = sample();
        table.concat_columns(&["CONC", "UC"], "concatenar", "_").unwrap();
        assert_eq!(table.headers().last().unwrap(), "concatenar");
        assert_eq!(table.rows()[0][3], "a_1");
        assert_eq!(table.rows()[2][3], "c_");
    }

    #[test]
    fn xlsx_bytes_read_back() {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.write_string(0, 0, "LIVRO").unwrap();
        worksheet.write_string(0, 1, "UC").unwrap();
        worksheet.write_number(1, 0, 5).unwrap();
        worksheet.write_string(1, 1, "x").unwrap();
        worksheet.write_number(2, 0, 2.5).unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let table = Table::from_bytes(&bytes).unwrap();
        assert_eq!(table.headers(), strings(&["LIVRO", "UC"]).as_slice());
        assert_eq!(table.rows()[0], strings(&["5", "x"]));
        assert_eq!(table.rows()[1], strings(&["2.5", ""]));

        let written = Table::from_bytes(&table.to_xlsx_bytes().unwrap()).unwrap();
        assert_eq!(written, table);
    }

    #[test]
    fn dates_and_booleans_render_as_text() {
        let date_format = Format::new().set_num_format("yyyy-mm-dd");
        let time_format = Format::new().set_num_format("[h]:mm:ss");

        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.write_string(0, 0, "DATA").unwrap();
        worksheet.write_string(0, 1, "ATIVO").unwrap();
        worksheet.write_string(0, 2, "DURACAO").unwrap();
        let date = ExcelDateTime::from_ymd(2023, 11, 1).unwrap();
        worksheet
            .write_datetime_with_format(1, 0, &date, &date_format)
            .unwrap();
        worksheet.write_boolean(1, 1, true).unwrap();
        worksheet
            .write_number_with_format(1, 2, 1.0625, &time_format)
            .unwrap();
        worksheet.write_boolean(2, 1, false).unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let table = Table::from_bytes(&bytes).unwrap();
        assert_eq!(
            table.rows()[0],
            strings(&["2023-11-01 00:00:00", "True", "1 days 01:30:00"])
        );
        assert_eq!(table.rows()[1][1], "False");

        // written back as text, so the value survives another pass
        let written = Table::from_bytes(&table.to_xlsx_bytes().unwrap()).unwrap();
        assert_eq!(written.rows()[0][0], "2023-11-01 00:00:00");
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = Table::from_bytes(b"id;name\n1;foo\n").unwrap_err();
        assert!(matches!(err, SheetError::Parse(_)));
    }
}
