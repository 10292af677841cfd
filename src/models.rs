use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// A single parsed CSV cell. Coercion is cell-local: a cell whose trimmed
/// text parses as a finite float becomes `Number`, everything else stays
/// `Text` verbatim.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// One record keyed by header name. A key is absent when the source line had
/// fewer fields than the header row.
pub type Row = HashMap<String, CellValue>;

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Scatter,
}

impl ChartKind {
    pub fn parse(kind: &str) -> Option<ChartKind> {
        match kind {
            "bar" => Some(ChartKind::Bar),
            "line" => Some(ChartKind::Line),
            "scatter" => Some(ChartKind::Scatter),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Scatter => "scatter",
        }
    }
}

/// X-axis value of a chart point: numeric for scatter, categorical label for
/// bar and line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AxisValue {
    Number(f64),
    Label(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub x: AxisValue,
    pub y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

/// A validated, renderer-agnostic chart description. The axis key tags are
/// contractually fixed to "x"/"y"/"z" so the renderer never has to know the
/// source column names; `zKey` is present exactly when a scatter point
/// carries `z`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub points: Vec<ChartPoint>,
    #[serde(rename = "xKey")]
    pub x_key: &'static str,
    #[serde(rename = "yKey")]
    pub y_key: &'static str,
    #[serde(rename = "zKey", skip_serializing_if = "Option::is_none")]
    pub z_key: Option<&'static str>,
}

impl ChartSpec {
    /// Key tags are derived here, never taken from model output.
    pub fn new(kind: ChartKind, points: Vec<ChartPoint>) -> Self {
        let has_z = kind == ChartKind::Scatter && points.iter().any(|p| p.z.is_some());
        ChartSpec {
            kind,
            points,
            x_key: "x",
            y_key: "y",
            z_key: has_z.then_some("z"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

/// One message in the conversation. Turns are immutable once appended to the
/// transcript.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart: Option<ChartSpec>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Turn {
            speaker: Speaker::User,
            text: text.into(),
            chart: None,
        }
    }

    pub fn assistant(text: impl Into<String>, chart: Option<ChartSpec>) -> Self {
        Turn {
            speaker: Speaker::Assistant,
            text: text.into(),
            chart,
        }
    }
}
