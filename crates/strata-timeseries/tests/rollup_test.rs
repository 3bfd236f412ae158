//! Rollup integration tests
//!
//! Ingests the same records into a minute table and an hour table and
//! checks that rolling the minute rows up reproduces the hour rows.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashMap;
use strata_common::SchemaConfig;
use strata_expr::{EncodedAccumulator, Expr};
use strata_timeseries::{bucket_start, rollup, Source, Table};

const SCHEMA: &str = r#"
[[tables]]
name = "minutely"
resolution = "1m"
retention = "3h"

[[tables.fields]]
name = "sum_a"
expression = 'SUM("a")'

[[tables.fields]]
name = "count_a"
expression = 'COUNT("a")'

[[tables.fields]]
name = "avg_b"
expression = 'AVG("b")'

[[tables.fields]]
name = "max_b"
expression = 'MAX("b")'

[[tables]]
name = "hourly"
resolution = "1h"
retention = "3h"

[[tables.fields]]
name = "sum_a"
expression = 'SUM("a")'

[[tables.fields]]
name = "avg_b"
expression = 'AVG("b")'

[[tables.fields]]
name = "max_b"
expression = 'MAX("b")'

[[tables.fields]]
name = "mean_a"
expression = 'DIV(SUM("a"), COUNT("a"))'
"#;

fn tables() -> (Table, Table) {
    let schema = SchemaConfig::from_toml_str(SCHEMA).unwrap();
    (
        Table::from_config(schema.table("minutely").unwrap()).unwrap(),
        Table::from_config(schema.table("hourly").unwrap()).unwrap(),
    )
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, 12, 29, 0).unwrap()
}

/// Records one per minute, `m` minutes before `now()`.
fn records() -> Vec<(DateTime<Utc>, HashMap<&'static str, f64>)> {
    (0..150)
        .map(|m| {
            let params = [("a", m as f64), ("b", (m % 7 + 1) as f64)]
                .into_iter()
                .collect();
            (now() - Duration::minutes(m), params)
        })
        .collect()
}

/// Ingest into newest-first rows starting at the bucket containing `now()`.
fn ingest(table: &Table) -> (DateTime<Utc>, Vec<u8>) {
    let start = bucket_start(now(), table.resolution());
    let periods = table.max_periods();
    let width = table.row_width();
    let mut rows = vec![0u8; width * periods];

    let resolution = table.resolution().num_nanoseconds().unwrap();
    for (ts, params) in records() {
        let age = (start - bucket_start(ts, table.resolution()))
            .num_nanoseconds()
            .unwrap();
        let index = (age / resolution) as usize;
        if index < periods {
            table
                .update_row(&mut rows[index * width..(index + 1) * width], &params, None)
                .unwrap();
        }
    }
    (start, rows)
}

fn row_values(table: &Table, rows: &[u8]) -> Vec<Vec<Option<f64>>> {
    rows.chunks_exact(table.row_width())
        .map(|row| table.row_values(row).unwrap())
        .collect()
}

#[test]
fn test_rollup_matches_direct_ingest() {
    let (minutely, hourly) = tables();
    let (minute_start, minute_rows) = ingest(&minutely);
    let (hour_start, hour_rows) = ingest(&hourly);

    let (rolled_start, rolled_rows) = hourly
        .rollup_from(&minutely, &minute_rows, minute_start, None)
        .unwrap();

    assert_eq!(rolled_start, hour_start);
    assert_eq!(rolled_rows.len(), hour_rows.len());
    assert_eq!(
        row_values(&hourly, &rolled_rows),
        row_values(&hourly, &hour_rows)
    );

    // 12:00 through 12:29 covers minutes 0..=29 back.
    let newest = &row_values(&hourly, &hour_rows)[0];
    assert_eq!(newest[0], Some((0..30).sum::<i32>() as f64));
    assert_eq!(newest[3], Some(14.5));
}

#[test]
fn test_rollup_sequences() {
    let (minutely, hourly) = tables();
    let (minute_start, minute_rows) = ingest(&minutely);
    let (start, rows) = hourly
        .rollup_from(&minutely, &minute_rows, minute_start, None)
        .unwrap();

    let seqs = hourly.to_sequences(&rows, start).unwrap();
    let sum_a = &seqs[0];
    assert_eq!(sum_a.start(), Some(start));
    assert_eq!(sum_a.num_buckets(), 3);

    let ten = Utc.with_ymd_and_hms(2020, 1, 1, 10, 0, 0).unwrap();
    assert_eq!(
        sum_a.value_at_time(ten, hourly.resolution()),
        (90..150).sum::<i32>() as f64
    );
    assert_eq!(sum_a.value_at_time(now() + Duration::hours(1), hourly.resolution()), 0.0);
}

#[test]
fn test_shifted_rollup() {
    let (minutely, _) = tables();
    let shifted = SchemaConfig::from_toml_str(
        r#"
[[tables]]
name = "hourly_prev"
resolution = "1h"
retention = "3h"

[[tables.fields]]
name = "prev_sum_a"
expression = 'SHIFT(SUM("a"), "-1h")'
"#,
    )
    .unwrap();
    let hourly_prev = Table::from_config(&shifted.tables[0]).unwrap();

    let (minute_start, minute_rows) = ingest(&minutely);
    let (_, rows) = hourly_prev
        .rollup_from(&minutely, &minute_rows, minute_start, None)
        .unwrap();

    let values = row_values(&hourly_prev, &rows);
    // The partial current hour compares against the same minutes an hour earlier.
    assert_eq!(values[0], vec![Some((60..90).sum::<i32>() as f64)]);
    assert_eq!(values[1], vec![Some((90..150).sum::<i32>() as f64)]);
    assert_eq!(values[2], vec![None]);
}

const HOURS: usize = 4;

/// Encode `expr` over 240 one-minute records ending at 12:59, either one
/// bucket per minute or one bucket per hour.
fn encode_minutes(expr: &Expr, minutes_per_bucket: usize) -> Vec<u8> {
    let width = expr.encoded_width();
    let mut buf = vec![0u8; width * (HOURS * 60 / minutes_per_bucket)];
    for m in 0..HOURS * 60 {
        let params: HashMap<&str, f64> = [
            ("a", (m % 13 + 1) as f64),
            ("b", ((m * 7) % 11) as f64 - 5.0),
        ]
        .into_iter()
        .collect();
        let index = m / minutes_per_bucket;
        expr.update(&mut buf[index * width..], &params, None).unwrap();
    }
    buf
}

#[test]
fn test_sub_merge_shapes_match_direct_ingest() {
    let start = Utc.with_ymd_and_hms(2020, 1, 1, 12, 59, 0).unwrap();
    let deps: Vec<Expr> = ["SUM(\"a\")", "MAX(\"b\")", "MIN(\"b\")", "AVG(\"a\")"]
        .iter()
        .map(|s| s.parse().unwrap())
        .collect();
    let columns: Vec<Vec<u8>> = deps.iter().map(|d| encode_minutes(d, 1)).collect();
    let sources: Vec<Source<'_>> = deps
        .iter()
        .zip(&columns)
        .map(|(d, c)| Source::new(d, c))
        .collect();

    let shapes = [
        "LN(SUM(\"a\"))",
        "MIN(\"b\")",
        "MAX(\"b\")",
        "AVG(\"a\")",
        "ADD(AVG(\"a\"), MIN(\"b\"))",
    ];
    for shape in shapes {
        let target: Expr = shape.parse().unwrap();
        let rolled = rollup(
            &target,
            &sources,
            start,
            Duration::minutes(1),
            Duration::hours(1),
            HOURS,
            None,
        )
        .unwrap();
        let direct = encode_minutes(&target, 60);
        let width = target.encoded_width();

        assert_eq!(rolled.num_buckets(), HOURS, "{}", shape);
        for i in 0..HOURS {
            assert_eq!(
                target.get(rolled.bucket(i).unwrap()).unwrap(),
                target.get(&direct[i * width..]).unwrap(),
                "{} differs in hour {}",
                shape,
                i
            );
        }
    }
}

#[test]
fn test_sub_merge_sides_shifted_differently() {
    let start = Utc.with_ymd_and_hms(2020, 1, 1, 12, 59, 0).unwrap();
    let sum: Expr = r#"SUM("a")"#.parse().unwrap();
    let max: Expr = r#"MAX("b")"#.parse().unwrap();
    let (sums, maxes) = (encode_minutes(&sum, 1), encode_minutes(&max, 1));
    let sources = [Source::new(&sum, &sums), Source::new(&max, &maxes)];

    let target: Expr = r#"SUB(SHIFT(SUM("a"), "-1h"), SHIFT(MAX("b"), "-2h"))"#
        .parse()
        .unwrap();
    let rolled = rollup(
        &target,
        &sources,
        start,
        Duration::minutes(1),
        Duration::hours(1),
        HOURS,
        None,
    )
    .unwrap();

    let (hourly_sums, hourly_maxes) = (encode_minutes(&sum, 60), encode_minutes(&max, 60));
    let hourly = |expr: &Expr, buf: &[u8], hour: usize| {
        let width = expr.encoded_width();
        buf.get(hour * width..)
            .filter(|b| !b.is_empty())
            .map_or((0.0, false), |b| expr.get(b).unwrap())
    };

    for i in 0..HOURS {
        let (left, left_valid) = hourly(&sum, &hourly_sums, i + 1);
        let (right, right_valid) = hourly(&max, &hourly_maxes, i + 2);
        assert_eq!(
            target.get(rolled.bucket(i).unwrap()).unwrap(),
            (left - right, left_valid || right_valid),
            "hour {}",
            i
        );
    }
    // The oldest hour has nothing to look back on.
    assert!(!target.get(rolled.bucket(HOURS - 1).unwrap()).unwrap().1);
}
