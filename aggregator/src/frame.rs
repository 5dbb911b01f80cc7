use crate::store::QueryResponse;
use polars::prelude::*;
use std::io::{Seek, SeekFrom, Write};

/// Convert a query response into a [DataFrame] with one row per result row.
///
/// Group tags of each series are added as columns alongside the selected columns, and the `time`
/// column is parsed into a datetime. An empty response gives an empty frame.
pub(crate) fn load_from_response(response: &QueryResponse) -> anyhow::Result<DataFrame> {
    if response.is_empty() {
        return Ok(DataFrame::empty());
    }

    // Convert to the polars format, an array of objects with each field named per object
    let mut content: Vec<serde_json::Value> = Vec::new();
    for series in &response.series {
        for values in &series.values {
            let mut obj = serde_json::Map::<String, serde_json::Value>::new();
            for (tag, value) in &series.tags {
                obj.insert(tag.clone(), serde_json::Value::String(value.clone()));
            }
            for (column, value) in series.columns.iter().zip(values.iter()) {
                obj.insert(column.clone(), value.clone());
            }
            content.push(serde_json::Value::Object(obj));
        }
    }

    let mut f = tempfile::tempfile()?;
    f.write_all(serde_json::to_string(&content)?.as_bytes())?;
    f.seek(SeekFrom::Start(0))?;

    let mut frame = JsonReader::new(f).finish()?;
    if frame.get_column_names().iter().any(|name| name.as_str() == "time") {
        frame = frame
            .lazy()
            .with_column(
                col("time")
                    .str()
                    .to_datetime(
                        None,
                        None,
                        StrptimeOptions {
                            format: Some("%Y-%m-%dT%H:%M:%S%.fZ".into()),
                            strict: false, // InfluxDB drops the fraction when it is zero
                            ..Default::default()
                        },
                        lit("raise"),
                    )
                    .alias("time"),
            )
            .collect()?;
    }

    log::trace!("Loaded frame: {}", frame);

    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::QuerySeries;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn tags_become_columns() -> anyhow::Result<()> {
        let response = QueryResponse {
            series: vec![
                QuerySeries {
                    name: "api_comparison".to_string(),
                    tags: BTreeMap::from([("request_name".to_string(), "login".to_string())]),
                    columns: vec!["time".to_string(), "total".to_string()],
                    values: vec![vec![json!("2024-03-01T10:00:00Z"), json!(10.0)]],
                },
                QuerySeries {
                    name: "api_comparison".to_string(),
                    tags: BTreeMap::from([("request_name".to_string(), "search".to_string())]),
                    columns: vec!["time".to_string(), "total".to_string()],
                    values: vec![vec![json!("2024-03-01T10:00:00.5Z"), json!(4.0)]],
                },
            ],
        };

        let frame = load_from_response(&response)?;
        assert_eq!(frame.height(), 2);
        let totals: Vec<f64> = frame.column("total")?.f64()?.into_iter().flatten().collect();
        assert_eq!(totals, vec![10.0, 4.0]);
        let names: Vec<&str> = frame
            .column("request_name")?
            .str()?
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(names, vec!["login", "search"]);
        assert!(matches!(
            frame.column("time")?.dtype(),
            DataType::Datetime(_, _)
        ));
        Ok(())
    }

    #[test]
    fn empty_response_is_empty_frame() -> anyhow::Result<()> {
        let frame = load_from_response(&QueryResponse::default())?;
        assert_eq!(frame.height(), 0);
        Ok(())
    }
}
