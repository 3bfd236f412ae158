//! Strata Table - Compiled Table Schema
//!
//! Compiles a `TableConfig` into parsed field expressions and a fixed row
//! layout. A row packs every field's encoded accumulator state side by
//! side; a run of rows, newest first, is one series at the table's
//! resolution.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::rollup::{self, Rollup, Source};
use crate::sequence::Sequence;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::ops::Range;
use strata_common::{Result, StrataError, TableConfig};
use strata_expr::{EncodedAccumulator, Expr, Params, Updated};

// =============================================================================
// Field
// =============================================================================

/// A named, compiled field of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub expr: Expr,
    offset: usize,
    width: usize,
}

impl Field {
    /// Byte range of this field within a row.
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.width
    }

    pub fn width(&self) -> usize {
        self.width
    }
}

// =============================================================================
// Table
// =============================================================================

#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    resolution: Duration,
    retention: Duration,
    fields: Vec<Field>,
    row_width: usize,
}

impl Table {
    /// Parse and validate every field expression and lay out the row.
    pub fn from_config(config: &TableConfig) -> Result<Self> {
        config.validate()?;

        let mut fields = Vec::with_capacity(config.fields.len());
        let mut offset = 0;
        for field in &config.fields {
            let expr = strata_expr::parse(&field.expression).map_err(|e| {
                StrataError::Configuration(format!(
                    "table '{}' field '{}': {}",
                    config.name, field.name, e
                ))
            })?;
            expr.validate().map_err(|e| {
                StrataError::Configuration(format!(
                    "table '{}' field '{}': {}",
                    config.name, field.name, e
                ))
            })?;
            let width = expr.encoded_width();
            fields.push(Field {
                name: field.name.clone(),
                expr,
                offset,
                width,
            });
            offset += width;
        }
        if offset == 0 {
            return Err(StrataError::Configuration(format!(
                "table '{}' stores no state: every field is stateless",
                config.name
            )));
        }

        tracing::debug!(
            table = %config.name,
            fields = fields.len(),
            row_width = offset,
            "compiled table"
        );

        Ok(Self {
            name: config.name.clone(),
            resolution: config.resolution,
            retention: config.retention,
            fields,
            row_width: offset,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resolution(&self) -> Duration {
        self.resolution
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn row_width(&self) -> usize {
        self.row_width
    }

    /// Raw field names read by any field, first seen first.
    pub fn depends_on(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.fields
            .iter()
            .flat_map(|f| f.expr.depends_on())
            .filter(|name| seen.insert(name.clone()))
            .collect()
    }

    /// Oldest time a sequence of this table may retain as of `now`.
    pub fn truncate_before(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.retention
    }

    /// Number of buckets covered by the retention period.
    pub fn max_periods(&self) -> usize {
        usize::try_from(
            self.retention
                .num_nanoseconds()
                .zip(self.resolution.num_nanoseconds())
                .map_or(0, |(retention, resolution)| retention / resolution.max(1)),
        )
        .unwrap_or(0)
    }

    pub fn new_row(&self) -> Vec<u8> {
        vec![0u8; self.row_width]
    }

    fn check_row(&self, len: usize) -> Result<()> {
        if len < self.row_width {
            return Err(StrataError::BufferTooShort {
                expected: self.row_width,
                actual: len,
            });
        }
        Ok(())
    }

    /// Fold one record into every field of `row`.
    pub fn update_row(
        &self,
        row: &mut [u8],
        params: &dyn Params,
        meta: Option<&dyn Params>,
    ) -> Result<Vec<Updated>> {
        self.check_row(row.len())?;
        self.fields
            .iter()
            .map(|f| f.expr.update(&mut row[f.range()], params, meta))
            .collect()
    }

    /// Fold `src` into `dst`, field by field.
    pub fn merge_rows(&self, dst: &mut [u8], src: &[u8]) -> Result<()> {
        self.check_row(dst.len())?;
        self.check_row(src.len())?;
        for f in &self.fields {
            f.expr.merge_into(&mut dst[f.range()], &src[f.range()])?;
        }
        Ok(())
    }

    /// Current value of every field, `None` where nothing was written.
    pub fn row_values(&self, row: &[u8]) -> Result<Vec<Option<f64>>> {
        self.check_row(row.len())?;
        self.fields
            .iter()
            .map(|f| {
                let (value, valid) = f.expr.get(&row[f.range()])?;
                Ok(valid.then_some(value))
            })
            .collect()
    }

    fn num_rows(&self, rows: &[u8]) -> Result<usize> {
        if self.row_width == 0 || rows.len() % self.row_width != 0 {
            return Err(StrataError::BufferTooShort {
                expected: (rows.len() / self.row_width.max(1) + 1) * self.row_width,
                actual: rows.len(),
            });
        }
        Ok(rows.len() / self.row_width)
    }

    /// Contiguous bucket array of field `index` across newest-first `rows`.
    pub fn column(&self, rows: &[u8], index: usize) -> Result<Vec<u8>> {
        let field = self.fields.get(index).ok_or_else(|| {
            StrataError::Configuration(format!("table '{}' has no field {}", self.name, index))
        })?;
        let count = self.num_rows(rows)?;
        let mut column = Vec::with_capacity(count * field.width);
        for row in rows.chunks_exact(self.row_width) {
            column.extend_from_slice(&row[field.range()]);
        }
        Ok(column)
    }

    /// One sequence per field from newest-first `rows` starting at `start`.
    pub fn to_sequences(&self, rows: &[u8], start: DateTime<Utc>) -> Result<Vec<Sequence>> {
        let count = self.num_rows(rows)?;
        (0..self.fields.len())
            .map(|i| {
                let column = self.column(rows, i)?;
                rollup::to_sequence(&self.fields[i].expr, &column, start, count)
            })
            .collect()
    }

    /// Derive this table's rows from the newest-first rows of a finer table.
    ///
    /// Each of this table's fields is built from whichever of `source`'s
    /// fields its sub-merge functions consume.
    pub fn rollup_from(
        &self,
        source: &Table,
        rows: &[u8],
        start: DateTime<Utc>,
        meta: Option<&dyn Params>,
    ) -> Result<(DateTime<Utc>, Vec<u8>)> {
        let columns = (0..source.fields.len())
            .map(|i| source.column(rows, i))
            .collect::<Result<Vec<_>>>()?;
        let sources: Vec<Source<'_>> = source
            .fields
            .iter()
            .zip(&columns)
            .map(|(f, column)| Source::new(&f.expr, column))
            .collect();

        let periods = self.max_periods();
        let rollups = self
            .fields
            .iter()
            .map(|f| {
                rollup::rollup(
                    &f.expr,
                    &sources,
                    start,
                    source.resolution,
                    self.resolution,
                    periods,
                    meta,
                )
            })
            .collect::<Result<Vec<Rollup>>>()?;

        let bucket_start = rollup::bucket_start(start, self.resolution);
        let mut out = vec![0u8; self.row_width * periods];
        for (f, r) in self.fields.iter().zip(&rollups) {
            for i in 0..periods {
                if let Some(bucket) = r.bucket(i) {
                    let row = &mut out[i * self.row_width..(i + 1) * self.row_width];
                    row[f.range()].copy_from_slice(bucket);
                }
            }
        }

        tracing::debug!(
            from = %source.name,
            to = %self.name,
            periods,
            "rolled up table"
        );
        Ok((bucket_start, out))
    }
}

// =============================================================================
// Tests
// =============================================================================
