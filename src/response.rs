//! Encoding of window results for callers.
//!
//! Results are JSON by default. Callers whose `Accept` header names the
//! Arrow stream type get an Arrow IPC stream with an `x` and a `y` column
//! instead.

use crate::addressing::Position;
use crate::downsample::Method;
use crate::error::Result;
use crate::window::WindowResult;
use arrow::array::{ArrayRef, Float64Array, RecordBatch, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::ipc::writer::StreamWriter;
use bytes::Bytes;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

pub const ARROW_STREAM_MIME: &str = "application/vnd.apache.arrow.stream";
pub const JSON_MIME: &str = "application/json";

/// JSON shape of a window result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowResponse {
    pub x: Vec<Position>,
    pub y: Vec<f64>,
    pub unit: String,
    pub has_time: bool,
    /// "s" when positions were rebased to relative seconds
    pub x_unit: &'static str,
    pub method: Method,
    pub original_points: usize,
    pub returned_points: usize,
    pub has_more: bool,
    pub next_cursor: Option<Position>,
    pub approximate: bool,
}

impl From<WindowResult> for WindowResponse {
    fn from(r: WindowResult) -> Self {
        Self {
            x_unit: x_unit(&r),
            x: r.positions,
            y: r.values,
            unit: r.unit,
            has_time: r.has_time,
            method: r.method,
            original_points: r.original_points,
            returned_points: r.returned_points,
            has_more: r.has_more,
            next_cursor: r.next_cursor,
            approximate: r.approximate,
        }
    }
}

fn x_unit(r: &WindowResult) -> &'static str {
    if r.relative && r.has_time {
        "s"
    } else {
        ""
    }
}

/// An encoded response body with its content type
#[derive(Debug, Clone)]
pub struct Encoded {
    pub content_type: &'static str,
    pub body: Bytes,
}

/// Whether an `Accept` header asks for the Arrow stream encoding
pub fn wants_arrow(accept: Option<&str>) -> bool {
    accept.is_some_and(|a| a.contains(ARROW_STREAM_MIME))
}

/// Encode per the caller's `Accept` header.
pub fn encode(result: WindowResult, accept: Option<&str>) -> Result<Encoded> {
    if wants_arrow(accept) {
        return Ok(Encoded {
            content_type: ARROW_STREAM_MIME,
            body: encode_arrow_stream(&result)?,
        });
    }
    let body = serde_json::to_vec(&WindowResponse::from(result))?;
    Ok(Encoded {
        content_type: JSON_MIME,
        body: Bytes::from(body),
    })
}

/// Arrow batch with `x` (seconds or index) and `y` columns.
///
/// Result metadata travels in the schema metadata.
pub fn to_record_batch(result: &WindowResult) -> Result<RecordBatch> {
    let (x_type, x): (DataType, ArrayRef) = if result.has_time {
        let secs: Float64Array = result.positions.iter().map(|p| Some(p.axis_value())).collect();
        (DataType::Float64, Arc::new(secs))
    } else {
        let idx: UInt64Array = result
            .positions
            .iter()
            .map(|p| match p {
                Position::Index(i) => Some(*i),
                Position::Time(_) => None,
            })
            .collect();
        (DataType::UInt64, Arc::new(idx))
    };

    let mut metadata = HashMap::new();
    metadata.insert("unit".to_owned(), result.unit.clone());
    metadata.insert("has_time".to_owned(), result.has_time.to_string());
    metadata.insert("x_unit".to_owned(), x_unit(result).to_owned());
    metadata.insert("method".to_owned(), result.method.to_string());
    metadata.insert("original_points".to_owned(), result.original_points.to_string());
    metadata.insert("returned_points".to_owned(), result.returned_points.to_string());
    metadata.insert("approximate".to_owned(), result.approximate.to_string());
    metadata.insert("has_more".to_owned(), result.has_more.to_string());
    if let Some(cursor) = result.next_cursor {
        metadata.insert("next_cursor".to_owned(), cursor.axis_value().to_string());
    }

    let schema = Schema::new(vec![
        Field::new("x", x_type, false),
        Field::new("y", DataType::Float64, false),
    ])
    .with_metadata(metadata);

    Ok(RecordBatch::try_new(
        Arc::new(schema),
        vec![x, Arc::new(Float64Array::from(result.values.clone()))],
    )?)
}

/// Encode a window result as an Arrow IPC stream.
pub fn encode_arrow_stream(result: &WindowResult) -> Result<Bytes> {
    let batch = to_record_batch(result)?;
    let mut buffer = Vec::new();
    {
        let mut writer = StreamWriter::try_new(&mut buffer, batch.schema().as_ref())?;
        writer.write(&batch)?;
        writer.finish()?;
    }
    Ok(Bytes::from(buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::ipc::reader::StreamReader;
    use uuid::Uuid;

    fn result(has_time: bool, relative: bool) -> WindowResult {
        let positions = if has_time {
            vec![Position::Time(0), Position::Time(1_500_000)]
        } else {
            vec![Position::Index(0), Position::Index(7)]
        };
        WindowResult {
            channel_id: Uuid::new_v4(),
            positions,
            values: vec![1.0, 2.0],
            unit: "V".into(),
            has_time,
            relative,
            method: Method::Lttb,
            original_points: 2,
            returned_points: 2,
            has_more: false,
            next_cursor: None,
            approximate: false,
        }
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(WindowResponse::from(result(true, true))).unwrap();
        assert_eq!(json["x"], serde_json::json!([0.0, 1.5]));
        assert_eq!(json["x_unit"], "s");
        assert_eq!(json["method"], "lttb");
        assert_eq!(json["next_cursor"], serde_json::Value::Null);

        let json = serde_json::to_value(WindowResponse::from(result(false, true))).unwrap();
        assert_eq!(json["x"], serde_json::json!([0, 7]));
        assert_eq!(json["x_unit"], "");
    }

    #[test]
    fn test_content_negotiation() {
        assert!(wants_arrow(Some("application/vnd.apache.arrow.stream, */*")));
        assert!(!wants_arrow(Some("application/json")));
        assert!(!wants_arrow(None));

        let encoded = encode(result(true, false), None).unwrap();
        assert_eq!(encoded.content_type, JSON_MIME);
        let encoded = encode(result(true, false), Some(ARROW_STREAM_MIME)).unwrap();
        assert_eq!(encoded.content_type, ARROW_STREAM_MIME);
    }

    #[test]
    fn test_arrow_stream_decodes() {
        let bytes = encode_arrow_stream(&result(false, false)).unwrap();
        let reader = StreamReader::try_new(std::io::Cursor::new(bytes.to_vec()), None).unwrap();
        assert_eq!(reader.schema().metadata().get("unit").map(String::as_str), Some("V"));
        let batches: Vec<RecordBatch> = reader.map(|b| b.unwrap()).collect();
        assert_eq!(batches.len(), 1);
        let x = batches[0].column(0).as_any().downcast_ref::<UInt64Array>().unwrap();
        assert_eq!(x.values(), &[0, 7]);

        let mut native = result(false, false);
        native.method = Method::Native;
        native.original_points = 14;
        native.approximate = true;
        let bytes = encode_arrow_stream(&native).unwrap();
        let reader = StreamReader::try_new(std::io::Cursor::new(bytes.to_vec()), None).unwrap();
        let metadata = reader.schema().metadata().clone();
        assert_eq!(metadata.get("approximate").map(String::as_str), Some("true"));
        assert_eq!(metadata.get("returned_points").map(String::as_str), Some("2"));
        assert_eq!(metadata.get("original_points").map(String::as_str), Some("14"));
        assert_eq!(metadata.get("method").map(String::as_str), Some("native"));
    }
}
