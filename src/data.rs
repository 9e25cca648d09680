use crate::error::{Error, Result};
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::io;

/// A single cell of a row table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    Num(f64),
    Str(String),
    #[default]
    Null,
}

impl Value {
    /// Parse a raw text field: empty / `NA` become `Null`, numbers become `Num`.
    pub fn parse(raw: &str) -> Value {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "NA" {
            return Value::Null;
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => Value::Num(n),
            _ => Value::Str(raw.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Num(n) if !n.is_nan() => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Num(n) => n.is_nan(),
            Value::Str(_) => false,
        }
    }

    /// Text used for discrete keys, legend labels and facet strips.
    pub fn label(&self) -> String {
        match self {
            Value::Num(n) => format_number(*n),
            Value::Str(s) => s.clone(),
            Value::Null => "NA".to_string(),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Num(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

/// Numeric-aware ordering: numbers ascending, then strings, then nulls.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Num(x), Value::Num(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::Num(_), _) => Ordering::Less,
        (_, Value::Num(_)) => Ordering::Greater,
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        (Value::Str(_), Value::Null) => Ordering::Less,
        (Value::Null, Value::Str(_)) => Ordering::Greater,
        (Value::Null, Value::Null) => Ordering::Equal,
    }
}

/// Format a number without trailing noise (`3` rather than `3.0`).
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NA".to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        let s = format!("{:.6}", n);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Ordered records of named columns, plus the reserved `panel_id` and
/// `group_id` columns.
///
/// The reserved ids are assigned once (panel layout, then the pre-stat
/// aesthetic mapper) and afterwards only travel with their rows: filters move
/// them, and partitioned stages get them back from the partition key in
/// [`RowTable::from_partitions`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowTable {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    panel_ids: Option<Vec<usize>>,
    group_ids: Option<Vec<usize>>,
}

/// One (`panel_id`, `group_id`) slice of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub panel_id: usize,
    pub group_id: usize,
    pub table: RowTable,
}

impl RowTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows,
            panel_ids: None,
            group_ids: None,
        }
    }

    pub fn empty(columns: Vec<String>) -> Self {
        Self::new(columns, Vec::new())
    }

    /// Build a table from named columns of equal length.
    pub fn from_columns(columns: Vec<(&str, Vec<Value>)>) -> Result<Self> {
        let nrow = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        if let Some((name, values)) = columns.iter().find(|(_, v)| v.len() != nrow) {
            return Err(Error::DataShape(format!(
                "column '{}' has {} values, expected {}",
                name,
                values.len(),
                nrow
            )));
        }
        let names = columns.iter().map(|(n, _)| n.to_string()).collect();
        let mut rows = vec![Vec::with_capacity(columns.len()); nrow];
        for (_, values) in columns {
            for (row, value) in rows.iter_mut().zip(values) {
                row.push(value);
            }
        }
        let table = Self::new(names, rows);
        table.validate()?;
        Ok(table)
    }

    /// Create table from a JSON array of objects.
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        let array = value
            .as_array()
            .ok_or_else(|| Error::DataShape("input data must be a JSON array of objects".to_string()))?;

        if array.is_empty() {
            return Err(Error::DataShape("input data array is empty".to_string()));
        }

        let mut headers: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for item in array {
            let obj = item
                .as_object()
                .ok_or_else(|| Error::DataShape("items in array must be objects".to_string()))?;
            for key in obj.keys() {
                if seen.insert(key.clone()) {
                    headers.push(key.clone());
                }
            }
        }

        let mut rows = Vec::with_capacity(array.len());
        for item in array {
            // Checked above.
            let Some(obj) = item.as_object() else { continue };
            let mut row = Vec::with_capacity(headers.len());
            for header in &headers {
                let cell = match obj.get(header) {
                    Some(JsonValue::String(s)) => Value::Str(s.clone()),
                    Some(JsonValue::Number(n)) => n.as_f64().map(Value::Num).unwrap_or(Value::Null),
                    Some(JsonValue::Bool(b)) => Value::Str(b.to_string()),
                    Some(JsonValue::Null) | None => Value::Null,
                    _ => {
                        return Err(Error::DataShape(format!(
                            "unsupported nested value for field '{}'",
                            header
                        )))
                    }
                };
                row.push(cell);
            }
            rows.push(row);
        }

        Ok(Self::new(headers, rows))
    }

    /// Read a headed CSV stream; numeric-looking fields become numbers.
    pub fn from_csv<R: io::Read>(reader: R) -> Result<Self> {
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(reader);

        let headers: Vec<String> = reader.headers()?.iter().map(|s| s.to_string()).collect();

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            rows.push(record.iter().map(Value::parse).collect());
        }

        if rows.is_empty() {
            return Err(Error::DataShape("CSV must contain at least one data row".to_string()));
        }

        let table = Self::new(headers, rows);
        table.validate()?;
        Ok(table)
    }

    /// Check that this is a table of uniquely named columns with uniform rows.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for name in &self.columns {
            if name.trim().is_empty() {
                return Err(Error::DataShape("column names must not be empty".to_string()));
            }
            if !seen.insert(name.as_str()) {
                return Err(Error::DataShape(format!("duplicate column name '{}'", name)));
            }
        }
        if let Some((idx, row)) = self.rows.iter().enumerate().find(|(_, r)| r.len() != self.columns.len()) {
            return Err(Error::DataShape(format!(
                "row {} has {} fields, expected {}",
                idx + 1,
                row.len(),
                self.columns.len()
            )));
        }
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn nrow(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column lookup; exact match first, then ASCII case-insensitive.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|h| h == name)
            .or_else(|| self.columns.iter().position(|h| h.eq_ignore_ascii_case(name)))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn value(&self, row: usize, name: &str) -> Option<&Value> {
        let idx = self.column_index(name)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| &r[idx]).collect())
    }

    /// Numeric view of a column (`None` per non-numeric cell).
    pub fn numeric(&self, name: &str) -> Option<Vec<Option<f64>>> {
        self.column(name)
            .map(|col| col.into_iter().map(Value::as_f64).collect())
    }

    /// Finite numeric values of a column, skipping nulls and text.
    pub fn finite(&self, name: &str) -> Vec<f64> {
        self.numeric(name)
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .filter(|v| v.is_finite())
            .collect()
    }

    pub fn num(&self, row: usize, name: &str) -> Option<f64> {
        self.value(row, name).and_then(Value::as_f64)
    }

    /// Replace or append a column.
    pub fn set_column(&mut self, name: &str, values: Vec<Value>) {
        debug_assert_eq!(values.len(), self.rows.len(), "column '{}' length", name);
        match self.column_index(name) {
            Some(idx) => {
                for (row, v) in self.rows.iter_mut().zip(values) {
                    row[idx] = v;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, v) in self.rows.iter_mut().zip(values) {
                    row.push(v);
                }
            }
        }
    }

    pub fn set_numeric(&mut self, name: &str, values: Vec<f64>) {
        self.set_column(name, values.into_iter().map(Value::Num).collect());
    }

    pub fn set(&mut self, row: usize, name: &str, value: Value) {
        if let Some(idx) = self.column_index(name) {
            self.rows[row][idx] = value;
        } else {
            let mut col = vec![Value::Null; self.rows.len()];
            col[row] = value;
            self.set_column(name, col);
        }
    }

    pub fn remove_column(&mut self, name: &str) {
        if let Some(idx) = self.column_index(name) {
            self.columns.remove(idx);
            for row in &mut self.rows {
                row.remove(idx);
            }
        }
    }

    pub fn push_row(&mut self, row: Vec<Value>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn has_panels(&self) -> bool {
        self.panel_ids.is_some()
    }

    pub fn has_groups(&self) -> bool {
        self.group_ids.is_some()
    }

    pub fn panel_id(&self, row: usize) -> usize {
        self.panel_ids.as_ref().map(|p| p[row]).unwrap_or(0)
    }

    pub fn group_id(&self, row: usize) -> usize {
        self.group_ids.as_ref().map(|g| g[row]).unwrap_or(0)
    }

    pub fn panel_ids(&self) -> Vec<usize> {
        (0..self.nrow()).map(|i| self.panel_id(i)).collect()
    }

    pub fn group_ids(&self) -> Vec<usize> {
        (0..self.nrow()).map(|i| self.group_id(i)).collect()
    }

    /// Attach panel ids. Only the panel layout engine calls this, once.
    pub(crate) fn assign_panels(&mut self, ids: Vec<usize>) {
        debug_assert!(self.panel_ids.is_none(), "panel ids assigned twice");
        debug_assert_eq!(ids.len(), self.rows.len());
        self.panel_ids = Some(ids);
    }

    /// Attach group ids. Only the pre-stat aesthetic mapper calls this, once.
    pub(crate) fn assign_groups(&mut self, ids: Vec<usize>) {
        debug_assert!(self.group_ids.is_none(), "group ids assigned twice");
        debug_assert_eq!(ids.len(), self.rows.len());
        self.group_ids = Some(ids);
    }

    /// Keep rows matching the predicate; reserved ids move with their rows.
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(usize, &[Value]) -> bool,
    {
        let mask: Vec<bool> = self.rows.iter().enumerate().map(|(i, r)| keep(i, r)).collect();
        let before = self.rows.len();
        let mut it = mask.iter();
        self.rows.retain(|_| *it.next().unwrap_or(&true));
        if let Some(ids) = self.panel_ids.as_mut() {
            let mut it = mask.iter();
            ids.retain(|_| *it.next().unwrap_or(&true));
        }
        if let Some(ids) = self.group_ids.as_mut() {
            let mut it = mask.iter();
            ids.retain(|_| *it.next().unwrap_or(&true));
        }
        before - self.rows.len()
    }

    /// Rows of one panel, ids preserved.
    pub fn panel_slice(&self, panel_id: usize) -> RowTable {
        let mut table = self.clone();
        let ids = self.panel_ids();
        table.retain(|i, _| ids[i] == panel_id);
        table
    }

    /// Split into (`panel_id`, `group_id`) partitions in ascending key order.
    /// Partition tables carry no reserved ids of their own.
    pub fn partitions(&self) -> Vec<Partition> {
        let mut buckets: BTreeMap<(usize, usize), Vec<Vec<Value>>> = BTreeMap::new();
        for (i, row) in self.rows.iter().enumerate() {
            buckets
                .entry((self.panel_id(i), self.group_id(i)))
                .or_default()
                .push(row.clone());
        }
        buckets
            .into_iter()
            .map(|((panel_id, group_id), rows)| Partition {
                panel_id,
                group_id,
                table: RowTable::new(self.columns.clone(), rows),
            })
            .collect()
    }

    /// Reassemble partitions; ids come from each partition's key and columns
    /// are the union in first-seen order (missing cells become `Null`).
    pub fn from_partitions(parts: Vec<Partition>) -> RowTable {
        let mut columns: Vec<String> = Vec::new();
        for part in &parts {
            for c in part.table.columns() {
                if !columns.contains(c) {
                    columns.push(c.clone());
                }
            }
        }
        let mut rows = Vec::new();
        let mut panel_ids = Vec::new();
        let mut group_ids = Vec::new();
        for part in parts {
            let map: Vec<Option<usize>> = columns.iter().map(|c| part.table.column_index(c)).collect();
            for row in part.table.rows {
                rows.push(
                    map.iter()
                        .map(|idx| idx.map(|i| row[i].clone()).unwrap_or(Value::Null))
                        .collect(),
                );
                panel_ids.push(part.panel_id);
                group_ids.push(part.group_id);
            }
        }
        RowTable {
            columns,
            rows,
            panel_ids: Some(panel_ids),
            group_ids: Some(group_ids),
        }
    }

    /// Build a table with explicit panel ids (used by the layout engine when
    /// rows are repeated across panels).
    pub(crate) fn with_panels(columns: Vec<String>, rows: Vec<Vec<Value>>, panel_ids: Vec<usize>) -> RowTable {
        RowTable {
            columns,
            rows,
            panel_ids: Some(panel_ids),
            group_ids: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table() -> RowTable {
        RowTable::new(
            vec!["x".to_string(), "g".to_string()],
            vec![
                vec![Value::Num(1.0), Value::from("a")],
                vec![Value::Num(2.0), Value::from("b")],
                vec![Value::Num(3.0), Value::from("a")],
            ],
        )
    }

    #[test]
    fn test_value_parse() {
        assert_eq!(Value::parse("3.5"), Value::Num(3.5));
        assert_eq!(Value::parse(""), Value::Null);
        assert_eq!(Value::parse("NA"), Value::Null);
        assert_eq!(Value::parse("abc"), Value::from("abc"));
    }

    #[test]
    fn test_label_formatting() {
        assert_eq!(Value::Num(4.0).label(), "4");
        assert_eq!(Value::Num(0.25).label(), "0.25");
        assert_eq!(Value::Null.label(), "NA");
    }

    #[test]
    fn test_from_json() {
        let t = RowTable::from_json(&json!([{"x": 1, "g": "a"}, {"x": 2}])).unwrap();
        assert_eq!(t.nrow(), 2);
        assert_eq!(t.value(1, "g"), Some(&Value::Null));
        assert_eq!(t.num(1, "x"), Some(2.0));
    }

    #[test]
    fn test_from_json_not_tabular() {
        assert!(matches!(RowTable::from_json(&json!({"x": 1})), Err(Error::DataShape(_))));
        assert!(matches!(RowTable::from_json(&json!([1, 2])), Err(Error::DataShape(_))));
        assert!(matches!(
            RowTable::from_json(&json!([{"x": [1, 2]}])),
            Err(Error::DataShape(_))
        ));
    }

    #[test]
    fn test_validate_ragged_and_duplicates() {
        let ragged = RowTable::new(vec!["a".into(), "b".into()], vec![vec![Value::Num(1.0)]]);
        assert!(matches!(ragged.validate(), Err(Error::DataShape(_))));
        let dup = RowTable::new(vec!["a".into(), "a".into()], vec![]);
        assert!(matches!(dup.validate(), Err(Error::DataShape(_))));
    }

    #[test]
    fn test_from_csv() {
        let csv = "x,label\n1,a\n2,\n";
        let t = RowTable::from_csv(csv.as_bytes()).unwrap();
        assert_eq!(t.columns(), &["x".to_string(), "label".to_string()]);
        assert_eq!(t.value(1, "label"), Some(&Value::Null));
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let t = table();
        assert_eq!(t.column_index("X"), Some(0));
    }

    #[test]
    fn test_partitions_round_trip_keep_ids() {
        let mut t = table();
        t.assign_panels(vec![0, 0, 1]);
        t.assign_groups(vec![1, 0, 1]);
        let parts = t.partitions();
        let keys: Vec<(usize, usize)> = parts.iter().map(|p| (p.panel_id, p.group_id)).collect();
        assert_eq!(keys, vec![(0, 0), (0, 1), (1, 1)]);

        let back = RowTable::from_partitions(parts);
        assert_eq!(back.panel_ids(), vec![0, 0, 1]);
        assert_eq!(back.group_ids(), vec![0, 1, 1]);
    }

    #[test]
    fn test_retain_moves_ids() {
        let mut t = table();
        t.assign_panels(vec![0, 1, 2]);
        let removed = t.retain(|_, row| row[1] == Value::from("a"));
        assert_eq!(removed, 1);
        assert_eq!(t.panel_ids(), vec![0, 2]);
    }

    #[test]
    fn test_from_partitions_unions_columns() {
        let a = Partition {
            panel_id: 0,
            group_id: 0,
            table: RowTable::new(vec!["x".into()], vec![vec![Value::Num(1.0)]]),
        };
        let b = Partition {
            panel_id: 0,
            group_id: 1,
            table: RowTable::new(vec!["y".into()], vec![vec![Value::Num(2.0)]]),
        };
        let t = RowTable::from_partitions(vec![a, b]);
        assert_eq!(t.columns(), &["x".to_string(), "y".to_string()]);
        assert_eq!(t.value(1, "x"), Some(&Value::Null));
    }
}
