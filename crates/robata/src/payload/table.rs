use std::collections::BTreeSet;
use serde::{Deserialize, Serialize};
use crate::backend::Batchable;
use crate::constant::TABLE_ROW_AXIS;
use crate::error::{Result, RobataError};
use super::ndarray::{DType, NdArray};

/// Name and element type of one table column, as carried in payload metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub dtype: DType,
}

/// # Table
///
/// A column-oriented table: named rank 1 arrays of equal length. Batching a
/// table means concatenating rows, so the only batch axis a table has is
/// [`TABLE_ROW_AXIS`].
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<(String, NdArray)>,
}

impl Table {
    /// Creates a table from `(name, column)` pairs.
    ///
    /// Every column must be rank 1, column names must be unique, and all columns
    /// must hold the same number of rows.
    pub fn new<S: Into<String>>(columns: Vec<(S, NdArray)>) -> Result<Self> {
        let columns: Vec<(String, NdArray)> = columns
            .into_iter()
            .map(|(name, values)| (name.into(), values))
            .collect();

        let mut seen = BTreeSet::new();
        for (name, values) in &columns {
            if !seen.insert(name.as_str()) {
                return Err(RobataError::malformed(format!("duplicate column `{name}`")));
            }
            if values.rank() != 1 {
                return Err(RobataError::malformed(format!(
                    "column `{name}` has rank {}, tables hold rank 1 columns",
                    values.rank()
                )));
            }
        }
        if let Some((_, first)) = columns.first() {
            let rows = first.len();
            if let Some((name, _)) = columns.iter().find(|(_, values)| values.len() != rows) {
                return Err(RobataError::malformed(format!(
                    "column `{name}` does not have {rows} rows"
                )));
            }
        }
        Ok(Self { columns })
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(|(_, values)| values.len()).unwrap_or(0)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, name: &str) -> Option<&NdArray> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, values)| values)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &NdArray)> {
        self.columns.iter().map(|(name, values)| (name.as_str(), values))
    }

    pub fn schema(&self) -> Vec<ColumnMeta> {
        self.columns
            .iter()
            .map(|(name, values)| ColumnMeta { name: name.clone(), dtype: values.dtype() })
            .collect()
    }

    /// Column bytes laid out one column after another, in schema order.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.columns
            .iter()
            .flat_map(|(_, values)| values.to_le_bytes())
            .collect()
    }

    /// Decodes bytes produced by [`Table::to_le_bytes`] for the given schema.
    pub fn from_le_bytes(schema: &[ColumnMeta], rows: usize, bytes: &[u8]) -> Result<Self> {
        let expected = schema
            .iter()
            .try_fold(0usize, |total, c| {
                c.dtype.size_in_bytes().checked_mul(rows).and_then(|width| total.checked_add(width))
            })
            .ok_or_else(|| RobataError::malformed(format!("table of {rows} rows is too large")))?;
        if bytes.len() != expected {
            return Err(RobataError::malformed(format!(
                "table of {rows} rows needs {expected} bytes, got {}",
                bytes.len()
            )));
        }
        let mut offset = 0;
        let mut columns = Vec::with_capacity(schema.len());
        for column in schema {
            let width = column.dtype.size_in_bytes() * rows;
            let values = NdArray::from_le_bytes(column.dtype, vec![rows], &bytes[offset..offset + width])?;
            columns.push((column.name.clone(), values));
            offset += width;
        }
        Self::new(columns)
    }

    fn check_axis(axis: usize) -> Result<()> {
        if axis != TABLE_ROW_AXIS {
            return Err(RobataError::incompatible(format!(
                "tables can only be batched along axis {TABLE_ROW_AXIS}, not {axis}"
            )));
        }
        Ok(())
    }
}

impl Batchable for Table {
    fn extent(&self, axis: usize) -> Option<usize> {
        (axis == TABLE_ROW_AXIS).then(|| self.num_rows())
    }

    fn cat(items: &[Self], axis: usize) -> Result<Self> {
        Self::check_axis(axis)?;
        let first = items
            .first()
            .ok_or_else(|| RobataError::malformed("cannot concatenate an empty list of tables"))?;

        for item in &items[1..] {
            let names_match = item.columns.len() == first.columns.len()
                && item.columns.iter().zip(&first.columns).all(|((a, _), (b, _))| a == b);
            if !names_match {
                return Err(RobataError::incompatible(format!(
                    "table columns {:?} do not match {:?}",
                    item.schema().iter().map(|c| &c.name).collect::<Vec<_>>(),
                    first.schema().iter().map(|c| &c.name).collect::<Vec<_>>(),
                )));
            }
        }

        let mut columns = Vec::with_capacity(first.columns.len());
        for (index, (name, _)) in first.columns.iter().enumerate() {
            let parts: Vec<NdArray> = items.iter().map(|t| t.columns[index].1.clone()).collect();
            let merged = NdArray::cat(&parts, 0).map_err(|err| match err {
                RobataError::TypeMismatch(msg) => {
                    RobataError::type_mismatch(format!("column `{name}`: {msg}"))
                }
                other => other,
            })?;
            columns.push((name.clone(), merged));
        }
        Self::new(columns)
    }

    fn slice(&self, axis: usize, start: usize, len: usize) -> Result<Self> {
        Self::check_axis(axis)?;
        let columns = self
            .columns
            .iter()
            .map(|(name, values)| Ok((name.clone(), values.slice(0, start, len)?)))
            .collect::<Result<Vec<_>>>()?;
        Self::new(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people(ages: Vec<i64>, scores: Vec<f32>) -> Table {
        let rows = ages.len();
        Table::new(vec![
            ("age", NdArray::from_vec(vec![rows], ages).unwrap()),
            ("score", NdArray::from_vec(vec![rows], scores).unwrap()),
        ])
        .unwrap()
    }

    #[test]
    fn test_from_le_bytes_rejects_oversized_row_count() {
        let schema = people(vec![1], vec![1.0]).schema();
        let err = Table::from_le_bytes(&schema, usize::MAX / 2, &[0u8; 12]).unwrap_err();
        assert!(matches!(err, RobataError::MalformedBatch(_)));
    }

    #[test]
    fn test_new_validates_columns() {
        let short = NdArray::from_vec(vec![1], vec![1i64]).unwrap();
        let long = NdArray::from_vec(vec![2], vec![1i64, 2]).unwrap();
        assert!(Table::new(vec![("a", short.clone()), ("b", long)]).is_err());
        assert!(Table::new(vec![("a", short.clone()), ("a", short)]).is_err());

        let matrix = NdArray::from_vec(vec![1, 1], vec![1i64]).unwrap();
        assert!(Table::new(vec![("m", matrix)]).is_err());
    }

    #[test]
    fn test_cat_concatenates_rows() {
        let merged = Table::cat(&[people(vec![30], vec![0.5]), people(vec![41, 52], vec![0.1, 0.9])], 0).unwrap();

        assert_eq!(merged.num_rows(), 3);
        assert_eq!(merged.column("age").unwrap().as_slice::<i64>().unwrap(), &[30, 41, 52]);
        assert_eq!(merged.column("score").unwrap().as_slice::<f32>().unwrap(), &[0.5, 0.1, 0.9]);
    }

    #[test]
    fn test_cat_rejects_other_axes_and_schemas() {
        let a = people(vec![1], vec![1.0]);
        assert!(matches!(Table::cat(&[a.clone(), a.clone()], 1).unwrap_err(), RobataError::IncompatibleBatch(_)));

        let other = Table::new(vec![("height", NdArray::from_vec(vec![1], vec![1.8f32]).unwrap())]).unwrap();
        assert!(matches!(Table::cat(&[a, other], 0).unwrap_err(), RobataError::IncompatibleBatch(_)));
    }

    #[test]
    fn test_cat_rejects_column_dtype_mismatch() {
        let a = people(vec![1], vec![1.0]);
        let b = Table::new(vec![
            ("age", NdArray::from_vec(vec![1], vec![2i32]).unwrap()),
            ("score", NdArray::from_vec(vec![1], vec![2.0f32]).unwrap()),
        ])
        .unwrap();
        assert!(matches!(Table::cat(&[a, b], 0).unwrap_err(), RobataError::TypeMismatch(_)));
    }

    #[test]
    fn test_split_and_bytes() {
        let a = people(vec![1, 2], vec![0.1, 0.2]);
        let b = people(vec![3], vec![0.3]);
        let merged = Table::cat(&[a.clone(), b.clone()], 0).unwrap();
        assert_eq!(merged.split(0, &[2, 1]).unwrap(), vec![a, b]);

        let decoded = Table::from_le_bytes(&merged.schema(), merged.num_rows(), &merged.to_le_bytes()).unwrap();
        assert_eq!(decoded, merged);
    }
}
