use serde::{Deserialize, Serialize};

use crate::error::{Result, RunnerError};

/// Event time in milliseconds since epoch.
pub type EventTime = i64;

/// Minimum possible event time. Used as the "no timestamp" sentinel.
pub const EVENT_TIME_MIN: EventTime = i64::MIN;

/// Maximum possible event time. Used as the end of the global window.
pub const EVENT_TIME_MAX: EventTime = i64::MAX;

/// Watermark indicates that no elements with timestamp <= this value will arrive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Watermark {
    pub timestamp: EventTime,
}

impl Watermark {
    /// Create a new watermark at the given timestamp.
    pub fn new(timestamp: EventTime) -> Self {
        Self { timestamp }
    }
}

impl std::fmt::Display for Watermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Watermark({}ms)", self.timestamp)
    }
}

// ── Values ────────────────────────────────────────────────────────────────────

/// Dynamically typed element value flowing through a DoFn.
///
/// Key/value pairs are represented as a two-element `Tuple` (or `List`).
/// Batches handled by the default batch converter are `List`s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Tuple(Vec<Value>),
    List(Vec<Value>),
}

impl Value {
    /// Build a key/value pair.
    pub fn kv(key: impl Into<Value>, value: impl Into<Value>) -> Self {
        Value::Tuple(vec![key.into(), value.into()])
    }

    /// Build a list value from anything convertible to values.
    pub fn list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    /// Destructure a two-element tuple or list into `(key, value)`.
    pub fn as_kv(&self) -> Option<(&Value, &Value)> {
        match self {
            Value::Tuple(items) | Value::List(items) if items.len() == 2 => {
                Some((&items[0], &items[1]))
            }
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_items(&self) -> Option<&[Value]> {
        match self {
            Value::Tuple(items) | Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::Tuple(_) => "tuple",
            Value::List(_) => "list",
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn join(f: &mut std::fmt::Formatter<'_>, items: &[Value]) -> std::fmt::Result {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{item}")?;
            }
            Ok(())
        }
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v:?}"),
            Value::Bytes(v) => write!(f, "b{:?}", v),
            Value::Tuple(items) => {
                write!(f, "(")?;
                join(f, items)?;
                write!(f, ")")
            }
            Value::List(items) => {
                write!(f, "[")?;
                join(f, items)?;
                write!(f, "]")
            }
        }
    }
}

// ── Windows ───────────────────────────────────────────────────────────────────

/// A half-open event-time window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: EventTime,
    pub end: EventTime,
}

impl TimeWindow {
    pub fn new(start: EventTime, end: EventTime) -> Self {
        Self { start, end }
    }

    /// The maximum timestamp that belongs to this window.
    pub fn max_timestamp(&self) -> EventTime {
        self.end - 1
    }

    /// Return true if `timestamp` falls inside this window.
    pub fn contains(&self, timestamp: EventTime) -> bool {
        timestamp >= self.start && timestamp < self.end
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TimeWindow([{}, {}))", self.start, self.end)
    }
}

/// A window an element belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Window {
    /// The single window spanning all of event time.
    Global,
    Interval(TimeWindow),
}

impl Window {
    pub fn interval(start: EventTime, end: EventTime) -> Self {
        Window::Interval(TimeWindow::new(start, end))
    }

    pub fn max_timestamp(&self) -> EventTime {
        match self {
            Window::Global => EVENT_TIME_MAX,
            Window::Interval(w) => w.max_timestamp(),
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Window::Global)
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Window::Global => write!(f, "GlobalWindow"),
            Window::Interval(w) => write!(f, "{w}"),
        }
    }
}

/// Repeat `windows` `times` times, preserving order.
///
/// Used when an output carries its own window list but the input it was
/// produced from had been collapsed from several windows.
pub fn repeat_windows(windows: &[Window], times: usize) -> Vec<Window> {
    let mut out = Vec::with_capacity(windows.len() * times);
    for _ in 0..times {
        out.extend_from_slice(windows);
    }
    out
}

// ── Panes ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaneTiming {
    Early,
    OnTime,
    Late,
    Unknown,
}

/// Describes which trigger firing produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaneInfo {
    pub is_first: bool,
    pub is_last: bool,
    pub timing: PaneTiming,
    pub index: u64,
    pub nonspeculative_index: i64,
}

impl PaneInfo {
    /// Pane of values that were never produced by a trigger firing.
    pub const NO_FIRING: PaneInfo = PaneInfo {
        is_first: true,
        is_last: true,
        timing: PaneTiming::Unknown,
        index: 0,
        nonspeculative_index: 0,
    };
}

impl Default for PaneInfo {
    fn default() -> Self {
        Self::NO_FIRING
    }
}

// ── Windowed values ───────────────────────────────────────────────────────────

/// A value together with its event time, windows and pane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowedValue {
    pub value: Value,
    pub timestamp: EventTime,
    pub windows: Vec<Window>,
    pub pane_info: PaneInfo,
}

impl WindowedValue {
    pub fn new(value: impl Into<Value>, timestamp: EventTime, windows: Vec<Window>) -> Self {
        Self {
            value: value.into(),
            timestamp,
            windows,
            pane_info: PaneInfo::NO_FIRING,
        }
    }

    /// A value in the global window with no meaningful timestamp.
    pub fn in_global_window(value: impl Into<Value>) -> Self {
        Self::new(value, EVENT_TIME_MIN, vec![Window::Global])
    }

    pub fn with_pane_info(mut self, pane_info: PaneInfo) -> Self {
        self.pane_info = pane_info;
        self
    }

    /// Copy of this value's metadata carrying a different value.
    pub fn with_value(&self, value: Value) -> Self {
        Self {
            value,
            timestamp: self.timestamp,
            windows: self.windows.clone(),
            pane_info: self.pane_info,
        }
    }

    /// Copy of this value restricted to a single window.
    pub fn in_window(&self, window: Window) -> Self {
        Self {
            value: self.value.clone(),
            timestamp: self.timestamp,
            windows: vec![window],
            pane_info: self.pane_info,
        }
    }

    /// Copy of this value restricted to a subset of its windows.
    pub fn with_windows(&self, windows: Vec<Window>) -> Self {
        Self {
            value: self.value.clone(),
            timestamp: self.timestamp,
            windows,
            pane_info: self.pane_info,
        }
    }
}

/// A batch of values sharing one timestamp, window list and pane.
///
/// `values` is the batch itself; its length is measured by a
/// [`BatchConverter`](crate::output::BatchConverter).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowedBatch {
    pub values: Value,
    pub timestamp: EventTime,
    pub windows: Vec<Window>,
    pub pane_info: PaneInfo,
}

impl WindowedBatch {
    pub fn of(values: Value, timestamp: EventTime, windows: Vec<Window>, pane_info: PaneInfo) -> Self {
        Self {
            values,
            timestamp,
            windows,
            pane_info,
        }
    }

    /// Wrap `values` with the metadata of `input`.
    pub fn from_batch_and_windowed_value(values: Value, input: &WindowedValue) -> Self {
        Self::of(values, input.timestamp, input.windows.clone(), input.pane_info)
    }

    pub fn with_values(&self, values: Value) -> Self {
        Self::of(values, self.timestamp, self.windows.clone(), self.pane_info)
    }

    /// A null value carrying this batch's metadata.
    ///
    /// Element outputs of a batch call are windowed against this.
    pub fn as_empty_windowed_value(&self) -> WindowedValue {
        WindowedValue {
            value: Value::Null,
            timestamp: self.timestamp,
            windows: self.windows.clone(),
            pane_info: self.pane_info,
        }
    }
}

// ── Outputs ───────────────────────────────────────────────────────────────────

/// One result produced by a DoFn call.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// Plain value; inherits the input's metadata.
    Value(Value),
    /// Value with an explicit timestamp; windows are re-assigned.
    Timestamped { value: Value, timestamp: EventTime },
    /// Fully formed windowed value.
    Windowed(WindowedValue),
    /// Fully formed windowed batch.
    WindowedBatch(WindowedBatch),
    /// Output addressed to a named receiver.
    Tagged { tag: String, output: Box<Output> },
}

impl Output {
    pub fn tagged(tag: impl Into<String>, output: Output) -> Self {
        Output::Tagged {
            tag: tag.into(),
            output: Box::new(output),
        }
    }

    pub fn timestamped(value: impl Into<Value>, timestamp: EventTime) -> Self {
        Output::Timestamped {
            value: value.into(),
            timestamp,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Output::Value(_) => "value",
            Output::Timestamped { .. } => "timestamped value",
            Output::Windowed(_) => "windowed value",
            Output::WindowedBatch(_) => "windowed batch",
            Output::Tagged { .. } => "tagged output",
        }
    }
}

impl From<Value> for Output {
    fn from(v: Value) -> Self {
        Output::Value(v)
    }
}

// ── Sized restrictions ────────────────────────────────────────────────────────

/// An element paired with a restriction, watermark-estimator state and size.
///
/// Encoded as the value `((element, (restriction, estimator_state)), size)`,
/// which is what split primaries and residuals carry and what
/// `process_with_sized_restriction` consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizedRestriction {
    pub element: Value,
    pub restriction: Value,
    pub estimator_state: Value,
    pub size: f64,
}

impl SizedRestriction {
    pub fn new(element: Value, restriction: Value, estimator_state: Value, size: f64) -> Self {
        Self {
            element,
            restriction,
            estimator_state,
            size,
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Tuple(vec![
            Value::Tuple(vec![
                self.element.clone(),
                Value::Tuple(vec![self.restriction.clone(), self.estimator_state.clone()]),
            ]),
            Value::Float(self.size),
        ])
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let malformed = || RunnerError::InvalidSizedRestriction(value.to_string());
        let (payload, size) = value.as_kv().ok_or_else(malformed)?;
        let size = size.as_float().ok_or_else(malformed)?;
        let (element, rest) = payload.as_kv().ok_or_else(malformed)?;
        let (restriction, estimator_state) = rest.as_kv().ok_or_else(malformed)?;
        Ok(Self::new(
            element.clone(),
            restriction.clone(),
            estimator_state.clone(),
            size,
        ))
    }
}

#[cfg(test)]
#[path = "tests/types_tests.rs"]
mod tests;
