//! Validation of untrusted model-supplied chart JSON into a `ChartSpec`.

use serde_json::Value;

use crate::models::{AxisValue, ChartKind, ChartPoint, ChartSpec};

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("chart payload must be an object or null")]
    NotAnObject,
    #[error("unknown chart kind: {0}")]
    UnknownKind(String),
    #[error("chart is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("chart point {index} has no usable `{field}` value")]
    BadPoint { index: usize, field: &'static str },
}

/// Validates an arbitrary JSON value from the model into a chart, or `None`
/// when the model sent `null` ("no chart for this answer").
///
/// Scatter points must be fully numeric; a point that is not parseable is
/// dropped rather than failing the chart, so the renderer never receives
/// NaN. Bar and line charts keep `x` as a categorical label but cannot
/// survive a non-numeric `y`. Axis key tags are re-derived from the result,
/// never trusted from the model.
pub fn validate(raw: &Value) -> Result<Option<ChartSpec>, ValidationError> {
    if raw.is_null() {
        return Ok(None);
    }

    let chart = raw.as_object().ok_or(ValidationError::NotAnObject)?;

    let kind = chart
        .get("kind")
        .and_then(Value::as_str)
        .ok_or(ValidationError::MissingField("kind"))?;
    let kind =
        ChartKind::parse(kind).ok_or_else(|| ValidationError::UnknownKind(kind.to_string()))?;

    let raw_points = chart
        .get("points")
        .and_then(Value::as_array)
        .ok_or(ValidationError::MissingField("points"))?;

    let mut points = Vec::with_capacity(raw_points.len());
    for (index, entry) in raw_points.iter().enumerate() {
        match kind {
            ChartKind::Scatter => {
                if let Some(point) = scatter_point(entry) {
                    points.push(point);
                }
            }
            ChartKind::Bar | ChartKind::Line => {
                points.push(category_point(entry, index)?);
            }
        }
    }

    Ok(Some(ChartSpec::new(kind, points)))
}

/// A scatter point is kept only when `x`, `y` and (if present) `z` all parse
/// as finite floats; anything else makes the point unplottable.
fn scatter_point(entry: &Value) -> Option<ChartPoint> {
    let point = entry.as_object()?;
    let x = numeric(point.get("x")?)?;
    let y = numeric(point.get("y")?)?;
    let z = match point.get("z") {
        None | Some(Value::Null) => None,
        Some(value) => Some(numeric(value)?),
    };
    Some(ChartPoint {
        x: AxisValue::Number(x),
        y,
        z,
    })
}

/// Bar/line point: `x` stays a literal (possibly categorical) label, `y`
/// must be numeric or the whole chart is invalid. A stray `z` is discarded
/// so non-scatter charts never carry one.
fn category_point(entry: &Value, index: usize) -> Result<ChartPoint, ValidationError> {
    let point = entry
        .as_object()
        .ok_or(ValidationError::BadPoint { index, field: "x" })?;

    let x = match point.get("x") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(ValidationError::BadPoint { index, field: "x" }),
    };

    let y = point
        .get("y")
        .and_then(|v| numeric(v))
        .ok_or(ValidationError::BadPoint { index, field: "y" })?;

    Ok(ChartPoint {
        x: AxisValue::Label(x),
        y,
        z: None,
    })
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}
