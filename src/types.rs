//! Core tabular types.
//!
//! Every parsing strategy produces one or more [`DataSet`]s: an ordered list of typed [`Field`]s
//! (the [`Schema`]) plus row-major [`Value`] storage with a uniform row length.

use chrono::NaiveDateTime;

/// Logical data type for a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point number.
    Float64,
    /// Boolean.
    Bool,
    /// Date and time without zone.
    Timestamp,
    /// UTF-8 string.
    Utf8,
}

impl DataType {
    /// Smallest type able to hold values of both `self` and `other`.
    pub fn widen(self, other: DataType) -> DataType {
        match (self, other) {
            (a, b) if a == b => a,
            (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => {
                DataType::Float64
            }
            _ => DataType::Utf8,
        }
    }
}

/// A single named, typed field in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field/column name.
    pub name: String,
    /// Field data type.
    pub data_type: DataType,
}

impl Field {
    /// Create a new field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// A list of fields describing the shape of a [`DataSet`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    /// Ordered list of fields.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Create a new schema from fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns the index of a field by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// A single typed value in a [`DataSet`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing/empty value.
    Null,
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// Boolean.
    Bool(bool),
    /// Date and time.
    Timestamp(NaiveDateTime),
    /// UTF-8 string.
    Utf8(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Converts the value so it fits a column of `data_type`.
    ///
    /// Only widening conversions are performed (see [`DataType::widen`]); anything else is
    /// rendered as text.
    pub fn coerce(self, data_type: DataType) -> Value {
        match (self, data_type) {
            (Value::Null, _) => Value::Null,
            (Value::Int64(i), DataType::Float64) => Value::Float64(i as f64),
            (v @ Value::Int64(_), DataType::Int64)
            | (v @ Value::Float64(_), DataType::Float64)
            | (v @ Value::Bool(_), DataType::Bool)
            | (v @ Value::Timestamp(_), DataType::Timestamp)
            | (v @ Value::Utf8(_), DataType::Utf8) => v,
            (v, _) => Value::Utf8(v.render().unwrap_or_default()),
        }
    }

    /// Text form used for CSV payloads and text columns. `None` for nulls.
    pub fn render(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Int64(i) => Some(i.to_string()),
            Value::Float64(f) => Some(f.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Timestamp(ts) => Some(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            Value::Utf8(s) => Some(s.clone()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(f) => Some(*f),
            Value::Int64(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }
}

/// In-memory tabular dataset.
///
/// Rows are stored as `Vec<Vec<Value>>` in the same order as the [`Schema`] fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataSet {
    /// Schema describing row shape.
    pub schema: Schema,
    /// Row-major value storage.
    pub rows: Vec<Vec<Value>>,
}

impl DataSet {
    /// Create a dataset from schema and rows.
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> Self {
        Self { schema, rows }
    }

    /// Number of rows in the dataset.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names in schema order.
    pub fn column_names(&self) -> Vec<String> {
        self.schema.field_names().map(str::to_string).collect()
    }

    /// Values of one column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.schema.index_of(name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// Keep only the first `n` rows.
    pub fn truncate(&mut self, n: usize) {
        self.rows.truncate(n);
    }

    /// Sets `name` to `value` on every row, appending the column if it does not exist yet.
    pub fn fill_column(&mut self, field: Field, value: Value) {
        match self.schema.index_of(&field.name) {
            Some(idx) => {
                self.schema.fields[idx] = field;
                for row in &mut self.rows {
                    row[idx] = value.clone();
                }
            }
            None => {
                self.schema.fields.push(field);
                for row in &mut self.rows {
                    row.push(value.clone());
                }
            }
        }
    }

    /// Keep only the named columns, in the given order.
    ///
    /// Returns the names that do not exist as `Err`.
    pub fn select(&self, names: &[String]) -> Result<DataSet, Vec<String>> {
        let missing: Vec<String> = names
            .iter()
            .filter(|n| self.schema.index_of(n).is_none())
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(missing);
        }
        let idxs: Vec<usize> = names
            .iter()
            .filter_map(|n| self.schema.index_of(n))
            .collect();
        Ok(self.select_indices(&idxs))
    }

    /// Keep only the columns at `idxs` (out of range indices are ignored).
    pub fn select_indices(&self, idxs: &[usize]) -> DataSet {
        let idxs: Vec<usize> = idxs
            .iter()
            .copied()
            .filter(|&i| i < self.schema.fields.len())
            .collect();
        let fields = idxs.iter().map(|&i| self.schema.fields[i].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| idxs.iter().map(|&i| row[i].clone()).collect())
            .collect();
        DataSet::new(Schema::new(fields), rows)
    }

    /// Concatenate datasets, aligning columns by name.
    ///
    /// The output schema is the union of all columns in first-seen order. Cells for columns a
    /// dataset lacks are null; a column whose type differs between inputs is widened.
    pub fn concat(parts: Vec<DataSet>) -> DataSet {
        let mut fields: Vec<Field> = Vec::new();
        for part in &parts {
            for f in &part.schema.fields {
                match fields.iter_mut().find(|existing| existing.name == f.name) {
                    Some(existing) => existing.data_type = existing.data_type.widen(f.data_type),
                    None => fields.push(f.clone()),
                }
            }
        }

        let mut rows = Vec::with_capacity(parts.iter().map(DataSet::row_count).sum());
        for part in parts {
            let mapping: Vec<Option<usize>> = fields
                .iter()
                .map(|f| part.schema.index_of(&f.name))
                .collect();
            for mut row in part.rows {
                let out = mapping
                    .iter()
                    .zip(&fields)
                    .map(|(idx, f)| match idx {
                        Some(i) => std::mem::replace(&mut row[*i], Value::Null).coerce(f.data_type),
                        None => Value::Null,
                    })
                    .collect();
                rows.push(out);
            }
        }

        DataSet::new(Schema::new(fields), rows)
    }
}
