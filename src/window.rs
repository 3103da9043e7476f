//! Windowed reads of one channel.
//!
//! A request names a channel and optionally bounds the window by absolute
//! time, by seconds relative to the channel's first sample, or (for index
//! channels) by sample index. A pagination cursor replaces the lower bound
//! and makes it exclusive. Rows are fetched in ascending position order up to
//! `limit` and then reduced to the `points` budget.

use crate::addressing::{parse_timestamp, secs_to_micros, Position};
use crate::auth::OwnershipGuard;
use crate::catalog::{id_param, Catalog, Channel, TimeRange};
use crate::config::QueryLimits;
use crate::downsample::{self, Method};
use crate::error::{Error, Result};
use crate::storage::{
    as_f64, as_i64, as_u64, collect_column, first_value, SqlValue, StorageBackend, POINTS_TABLE,
};
use arrow::array::RecordBatch;
use arrow::datatypes::DataType;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// One window read
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowRequest {
    pub channel_id: Uuid,
    /// ISO-8601 start (time channels) or sample index (index channels)
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    /// Seconds after the channel's first timestamp; ignored when `start` is set
    #[serde(default)]
    pub start_sec: Option<f64>,
    #[serde(default)]
    pub end_sec: Option<f64>,
    /// Rebase returned time positions to the first returned one
    #[serde(default)]
    pub relative: bool,
    #[serde(default)]
    pub points: Option<usize>,
    #[serde(default)]
    pub method: Method,
    /// Last position of the previous page
    #[serde(default)]
    pub cursor: Option<f64>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl WindowRequest {
    pub fn new(channel_id: Uuid) -> Self {
        Self {
            channel_id,
            ..Default::default()
        }
    }
}

/// Rows of one window after downsampling
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowResult {
    pub channel_id: Uuid,
    pub positions: Vec<Position>,
    pub values: Vec<f64>,
    pub unit: String,
    pub has_time: bool,
    /// Positions were rebased to the first returned position
    pub relative: bool,
    pub method: Method,
    /// Rows fetched before downsampling
    pub original_points: usize,
    pub returned_points: usize,
    pub has_more: bool,
    pub next_cursor: Option<Position>,
    pub approximate: bool,
}

impl WindowResult {
    fn empty(channel: &Channel, method: Method, relative: bool) -> Self {
        Self {
            channel_id: channel.channel_id,
            positions: Vec::new(),
            values: Vec::new(),
            unit: channel.unit.clone(),
            has_time: channel.has_time,
            relative: relative && channel.has_time,
            method,
            original_points: 0,
            returned_points: 0,
            has_more: false,
            next_cursor: None,
            approximate: false,
        }
    }
}

/// Inclusive window bounds in the channel's native unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    lo: Option<Position>,
    hi: Option<Position>,
}

/// Serves window requests for any channel
#[derive(Clone)]
pub struct WindowEngine {
    backend: Arc<dyn StorageBackend>,
    catalog: Catalog,
    guard: OwnershipGuard,
    limits: QueryLimits,
}

impl WindowEngine {
    pub fn new(backend: Arc<dyn StorageBackend>, limits: QueryLimits) -> Self {
        let catalog = Catalog::new(backend.clone());
        Self {
            backend,
            guard: OwnershipGuard::new(catalog.clone()),
            catalog,
            limits,
        }
    }

    pub async fn fetch(&self, req: &WindowRequest, caller: Option<&str>) -> Result<WindowResult> {
        let (channel, _) = self.guard.authorize_channel(req.channel_id, caller).await?;

        let points = self
            .limits
            .check_points(req.points.unwrap_or(self.limits.default_points))?;
        let limit = self
            .limits
            .check_limit(req.limit.unwrap_or(self.limits.default_limit))?;

        let channel_min = if needs_channel_min(channel.has_time, req) {
            match self.catalog.channel_time_range(&channel).await?.min {
                Some(Position::Time(us)) => Some(us),
                _ => return Ok(WindowResult::empty(&channel, req.method, req.relative)),
            }
        } else {
            None
        };

        let Some(span) = resolve_span(channel.has_time, req, channel_min)? else {
            return Ok(WindowResult::empty(&channel, req.method, req.relative));
        };
        debug!(channel_id = %channel.channel_id, ?span, points, limit, method = %req.method, "Window");

        let mut result = match req.method {
            Method::Native => self.fetch_native(&channel, span, points, limit).await?,
            method => self.fetch_rows(&channel, span, points, limit, method).await?,
        };

        if req.relative && channel.has_time {
            rebase(&mut result.positions);
            result.relative = true;
        }
        Ok(result)
    }

    /// Extent of a channel, after the ownership check.
    pub async fn time_range(&self, channel_id: Uuid, caller: Option<&str>) -> Result<TimeRange> {
        let (channel, _) = self.guard.authorize_channel(channel_id, caller).await?;
        self.catalog.channel_time_range(&channel).await
    }

    async fn fetch_rows(
        &self,
        channel: &Channel,
        span: Span,
        points: usize,
        limit: usize,
        method: Method,
    ) -> Result<WindowResult> {
        let col = channel.position_column();
        let (filter, params) = window_filter(channel, span);
        let sql = format!(
            "SELECT {col} AS pos, value FROM {POINTS_TABLE} WHERE {filter} ORDER BY {col} LIMIT {limit}"
        );
        let batches = self.backend.query(&sql, params).await?;
        let (positions, values) = read_rows(channel, &batches)?;

        let fetched = positions.len();
        let has_more = fetched > 0 && fetched == limit;
        let next_cursor = if has_more { positions.last().copied() } else { None };

        let (positions, values) = if fetched > points {
            let axis = axis(&positions);
            let keep = downsample::select(&axis, &values, points, method);
            (
                keep.iter().map(|&i| positions[i]).collect(),
                keep.iter().map(|&i| values[i]).collect(),
            )
        } else {
            (positions, values)
        };

        Ok(WindowResult {
            channel_id: channel.channel_id,
            returned_points: positions.len(),
            positions,
            values,
            unit: channel.unit.clone(),
            has_time: channel.has_time,
            relative: false,
            method,
            original_points: fetched,
            has_more,
            next_cursor,
            approximate: false,
        })
    }

    /// Stride decimation inside the store over the first `limit` rows.
    async fn fetch_native(
        &self,
        channel: &Channel,
        span: Span,
        points: usize,
        limit: usize,
    ) -> Result<WindowResult> {
        let col = channel.position_column();
        let (filter, params) = window_filter(channel, span);
        let window = format!(
            "SELECT {col} AS pos, value FROM {POINTS_TABLE} WHERE {filter} ORDER BY {col} LIMIT {limit}"
        );

        let count_sql = format!("SELECT count(*) AS n, max(pos) AS last FROM ({window})");
        let batches = self.backend.query(&count_sql, params.clone()).await?;
        let total = first_value(&batches, "n", &DataType::UInt64, as_u64)?.unwrap_or(0) as usize;
        if total == 0 {
            return Ok(WindowResult::empty(channel, Method::Native, false));
        }
        let last = if channel.has_time {
            first_value(&batches, "last", &DataType::Int64, as_i64)?.map(Position::Time)
        } else {
            first_value(&batches, "last", &DataType::UInt64, as_u64)?.map(Position::Index)
        };

        let stride = total.div_ceil(points.max(1));
        let sql = format!(
            "SELECT pos, value FROM (
                SELECT pos, value, row_number() OVER (ORDER BY pos) - 1 AS rn FROM ({window})
             ) WHERE rn % {stride} = 0 ORDER BY pos"
        );
        let batches = self.backend.query(&sql, params).await?;
        let (positions, values) = read_rows(channel, &batches)?;

        let has_more = total == limit;
        Ok(WindowResult {
            channel_id: channel.channel_id,
            returned_points: positions.len(),
            approximate: stride > 1,
            positions,
            values,
            unit: channel.unit.clone(),
            has_time: channel.has_time,
            relative: false,
            method: Method::Native,
            original_points: total,
            has_more,
            next_cursor: if has_more { last } else { None },
        })
    }
}

fn needs_channel_min(has_time: bool, req: &WindowRequest) -> bool {
    has_time
        && ((req.start.is_none() && req.start_sec.is_some() && req.cursor.is_none())
            || (req.end.is_none() && req.end_sec.is_some()))
}

/// Normalize the request's bounds. `None` means the window is empty.
fn resolve_span(has_time: bool, req: &WindowRequest, channel_min: Option<i64>) -> Result<Option<Span>> {
    if has_time {
        time_span(req, channel_min)
    } else {
        index_span(req)
    }
}

fn time_span(req: &WindowRequest, channel_min: Option<i64>) -> Result<Option<Span>> {
    let bound = |iso: &Option<String>, secs: Option<f64>, name: &str| -> Result<Option<i64>> {
        if let Some(iso) = iso {
            let dt = parse_timestamp(iso)
                .ok_or_else(|| Error::Validation(format!("{name}: invalid ISO-8601 time {iso:?}")))?;
            return Ok(Some(dt.timestamp_micros()));
        }
        match (secs, channel_min) {
            (Some(secs), Some(min)) => {
                let offset = micros(secs, name)?;
                Ok(Some(min.saturating_add(offset)))
            }
            _ => Ok(None),
        }
    };

    let mut lo = bound(&req.start, req.start_sec, "start")?;
    let hi = bound(&req.end, req.end_sec, "end")?;

    if let Some(cursor) = req.cursor {
        lo = Some(micros(cursor, "cursor")?.saturating_add(1));
    }

    if let (Some(lo), Some(hi)) = (lo, hi) {
        if lo > hi {
            return Ok(None);
        }
    }
    Ok(Some(Span {
        lo: lo.map(Position::Time),
        hi: hi.map(Position::Time),
    }))
}

fn index_span(req: &WindowRequest) -> Result<Option<Span>> {
    let mut lo = match &req.start {
        Some(s) => {
            let v = index_value(s, "start")?;
            (v > 0.0).then(|| v.ceil() as u64)
        }
        None => None,
    };
    let hi = match &req.end {
        Some(s) => {
            let v = index_value(s, "end")?;
            if v < 0.0 {
                return Ok(None);
            }
            Some(v.floor() as u64)
        }
        None => None,
    };

    if let Some(cursor) = req.cursor {
        if !cursor.is_finite() {
            return Err(Error::Validation("cursor must be finite".into()));
        }
        lo = (cursor >= 0.0).then(|| cursor.floor() as u64 + 1);
    }

    if let (Some(lo), Some(hi)) = (lo, hi) {
        if lo > hi {
            return Ok(None);
        }
    }
    Ok(Some(Span {
        lo: lo.map(Position::Index),
        hi: hi.map(Position::Index),
    }))
}

fn micros(secs: f64, name: &str) -> Result<i64> {
    secs_to_micros(secs).ok_or_else(|| Error::Validation(format!("{name} must be a finite number of seconds")))
}

fn index_value(s: &str, name: &str) -> Result<f64> {
    s.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| Error::Validation(format!("{name}: {s:?} is not a sample index")))
}

fn position_param(p: Position) -> SqlValue {
    match p {
        Position::Time(us) => SqlValue::Int(us),
        Position::Index(i) => SqlValue::UInt(i),
    }
}

fn window_filter(channel: &Channel, span: Span) -> (String, Vec<SqlValue>) {
    let col = channel.position_column();
    let mut filter = String::from("dataset_id = ? AND channel_id = ? AND is_time_series = ?");
    let mut params = vec![
        id_param(&channel.dataset_id),
        id_param(&channel.channel_id),
        SqlValue::UInt(u64::from(channel.has_time)),
    ];
    if let Some(lo) = span.lo {
        filter.push_str(&format!(" AND {col} >= ?"));
        params.push(position_param(lo));
    }
    if let Some(hi) = span.hi {
        filter.push_str(&format!(" AND {col} <= ?"));
        params.push(position_param(hi));
    }
    (filter, params)
}

fn read_rows(channel: &Channel, batches: &[RecordBatch]) -> Result<(Vec<Position>, Vec<f64>)> {
    let positions = if channel.has_time {
        collect_column(batches, "pos", &DataType::Int64, as_i64)?
            .into_iter()
            .map(Position::Time)
            .collect()
    } else {
        collect_column(batches, "pos", &DataType::UInt64, as_u64)?
            .into_iter()
            .map(Position::Index)
            .collect()
    };
    let values = collect_column(batches, "value", &DataType::Float64, as_f64)?;
    Ok((positions, values))
}

/// Numeric axis for downsampling, offset to the first position
fn axis(positions: &[Position]) -> Vec<f64> {
    match positions.first() {
        Some(Position::Time(t0)) => positions
            .iter()
            .map(|p| match p {
                Position::Time(us) => (us - t0) as f64 / 1e6,
                Position::Index(i) => *i as f64,
            })
            .collect(),
        Some(Position::Index(i0)) => {
            let origin = *i0 as f64;
            positions.iter().map(|p| p.axis_value() - origin).collect()
        }
        None => Vec::new(),
    }
}

fn rebase(positions: &mut [Position]) {
    let Some(min) = positions
        .iter()
        .filter_map(|p| match p {
            Position::Time(us) => Some(*us),
            Position::Index(_) => None,
        })
        .min()
    else {
        return;
    };
    for p in positions.iter_mut() {
        if let Position::Time(us) = p {
            *us -= min;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_704_067_200_000_000; // 2024-01-01T00:00:00Z

    fn req() -> WindowRequest {
        WindowRequest::new(Uuid::new_v4())
    }

    fn span(lo: Option<Position>, hi: Option<Position>) -> Option<Span> {
        Some(Span { lo, hi })
    }

    #[test]
    fn test_iso_bounds() {
        let mut r = req();
        r.start = Some("2024-01-01T00:00:01Z".into());
        r.end = Some("2024-01-01T00:00:02".into());
        assert_eq!(
            resolve_span(true, &r, None).unwrap(),
            span(
                Some(Position::Time(T0 + 1_000_000)),
                Some(Position::Time(T0 + 2_000_000))
            )
        );
    }

    #[test]
    fn test_relative_seconds_from_channel_min() {
        let mut r = req();
        r.start_sec = Some(1.5);
        r.end_sec = Some(2.0);
        assert!(needs_channel_min(true, &r));
        assert_eq!(
            resolve_span(true, &r, Some(T0)).unwrap(),
            span(
                Some(Position::Time(T0 + 1_500_000)),
                Some(Position::Time(T0 + 2_000_000))
            )
        );
    }

    #[test]
    fn test_iso_beats_relative() {
        let mut r = req();
        r.start = Some("2024-01-01T00:00:05Z".into());
        r.start_sec = Some(1.0);
        assert!(!needs_channel_min(true, &r));
        let s = resolve_span(true, &r, Some(T0)).unwrap().unwrap();
        assert_eq!(s.lo, Some(Position::Time(T0 + 5_000_000)));
    }

    #[test]
    fn test_cursor_is_exclusive() {
        let mut r = req();
        r.start = Some("2024-01-01T00:00:00Z".into());
        r.cursor = Some(T0 as f64 / 1e6 + 3.0);
        let s = resolve_span(true, &r, None).unwrap().unwrap();
        assert_eq!(s.lo, Some(Position::Time(T0 + 3_000_001)));

        let mut r = req();
        r.cursor = Some(41.0);
        let s = resolve_span(false, &r, None).unwrap().unwrap();
        assert_eq!(s.lo, Some(Position::Index(42)));
    }

    #[test]
    fn test_index_channel_ignores_time_fields() {
        let mut r = req();
        r.start = Some("10".into());
        r.end = Some("20.5".into());
        r.start_sec = Some(100.0);
        r.end_sec = Some(200.0);
        assert!(!needs_channel_min(false, &r));
        assert_eq!(
            resolve_span(false, &r, None).unwrap(),
            span(Some(Position::Index(10)), Some(Position::Index(20)))
        );
    }

    #[test]
    fn test_empty_and_invalid_bounds() {
        let mut r = req();
        r.start = Some("2024-01-02T00:00:00Z".into());
        r.end = Some("2024-01-01T00:00:00Z".into());
        assert_eq!(resolve_span(true, &r, None).unwrap(), None);

        let mut r = req();
        r.end = Some("-1".into());
        assert_eq!(resolve_span(false, &r, None).unwrap(), None);

        let mut r = req();
        r.start = Some("not a time".into());
        assert!(matches!(resolve_span(true, &r, None), Err(Error::Validation(_))));

        let mut r = req();
        r.start = Some("2024-01-01".into());
        assert!(matches!(resolve_span(false, &r, None), Err(Error::Validation(_))));
    }

    #[test]
    fn test_rebase_and_axis() {
        let mut positions = vec![Position::Time(T0 + 500_000), Position::Time(T0 + 1_500_000)];
        assert_eq!(axis(&positions), vec![0.0, 1.0]);
        rebase(&mut positions);
        assert_eq!(positions, vec![Position::Time(0), Position::Time(1_000_000)]);

        let idx = vec![Position::Index(10), Position::Index(12)];
        assert_eq!(axis(&idx), vec![0.0, 2.0]);
    }
}
