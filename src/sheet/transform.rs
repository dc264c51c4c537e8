use super::{SheetError, Table};

/// Business rule applied to every uploaded sheet, parameterized by the submitted value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transform {
    /// Keep rows where `column` equals the parameter, projected to
    /// `column` followed by `return_columns` when those are given.
    Filter {
        column: String,
        return_columns: Vec<String>,
    },
    /// Append `column` holding the parameter on every row.
    AppendColumn { column: String },
}

impl Transform {
    /// Whether the submitted parameter must parse as a number.
    pub fn requires_numeric(&self) -> bool {
        matches!(self, Transform::AppendColumn { .. })
    }

    pub fn apply(&self, table: &Table, parameter: &str) -> Result<Table, SheetError> {
        let parameter = parameter.trim();

        match self {
            Transform::Filter {
                column,
                return_columns,
            } => {
                let filtered = table.filter_eq(column, parameter)?;
                if return_columns.is_empty() {
                    return Ok(filtered);
                }

                let mut selected = Vec::with_capacity(return_columns.len() + 1);
                selected.push(column.as_str());
                selected.extend(return_columns.iter().map(String::as_str));
                filtered.select_columns(&selected)
            }
            Transform::AppendColumn { column } => {
                let mut table = table.clone();
                table.append_column(column, parameter);
                Ok(table)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        let headers = ["LIVRO", "CONC", "UC", "ROTA"]
            .iter()
            .map(|h| h.to_string())
            .collect();
        let rows = (0..10)
            .map(|i| {
                vec![
                    (i % 3 + 4).to_string(),
                    format!("c{}", i),
                    format!("u{}", i),
                    "r".to_string(),
                ]
            })
            .collect();
        Table::new(headers, rows)
    }

    #[test]
    fn filter_projects_to_return_columns() {
        let transform = Transform::Filter {
            column: "LIVRO".into(),
            return_columns: vec!["CONC".into(), "UC".into()],
        };

        let out = transform.apply(&table(), " 5 ").unwrap();
        assert_eq!(out.headers(), ["LIVRO", "CONC", "UC"]);
        assert_eq!(out.len(), 3);
        assert!(out.rows().iter().all(|row| row[0] == "5"));
    }

    #[test]
    fn filter_without_return_columns_keeps_all() {
        let transform = Transform::Filter {
            column: "LIVRO".into(),
            return_columns: vec![],
        };

        let out = transform.apply(&table(), "4").unwrap();
        assert_eq!(out.headers().len(), 4);
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn filter_missing_return_column_fails() {
        let transform = Transform::Filter {
            column: "LIVRO".into(),
            return_columns: vec!["NOPE".into()],
        };

        assert!(matches!(
            transform.apply(&table(), "5"),
            Err(SheetError::MissingColumn(c)) if c == "NOPE"
        ));
    }

    #[test]
    fn append_column_fills_parameter() {
        let transform = Transform::AppendColumn {
            column: "numero".into(),
        };
        assert!(transform.requires_numeric());

        let out = transform.apply(&table(), "42").unwrap();
        assert_eq!(out.headers().last().unwrap(), "numero");
        assert_eq!(out.len(), 10);
        assert!(out.rows().iter().all(|row| row[4] == "42"));
    }
}
