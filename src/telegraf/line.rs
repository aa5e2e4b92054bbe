// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! InfluxDB line protocol encoding.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::collector::ChipBase;

/// Measurement name of per-chip points.
pub const NPU_MEASUREMENT: &str = "npu";

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(i64::from(v))
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::Int(i64::from(v))
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        i64::try_from(v).map_or(FieldValue::UInt(v), FieldValue::Int)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

/// One line protocol point.
#[derive(Debug, Clone, PartialEq)]
pub struct LinePoint {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    timestamp_ns: Option<i64>,
}

impl LinePoint {
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp_ns: None,
        }
    }

    /// Empty tag values are dropped; the protocol does not allow them.
    pub fn tag(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let value = value.into();
        if !value.is_empty() {
            self.tags.insert(key.into(), value);
        }
        self
    }

    pub fn field(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> &mut Self {
        let value = value.into();
        if let FieldValue::Float(f) = value {
            if !f.is_finite() {
                return self;
            }
        }
        self.fields.insert(key.into(), value);
        self
    }

    pub fn timestamp(&mut self, nanos: i64) -> &mut Self {
        self.timestamp_ns = Some(nanos);
        self
    }

    pub fn has_fields(&self) -> bool {
        !self.fields.is_empty()
    }

    /// Encodes the point, or `None` when it has no fields.
    pub fn to_line(&self) -> Option<String> {
        if self.fields.is_empty() {
            return None;
        }

        let mut line = String::new();
        escape(&self.measurement, &[',', ' '], &mut line);
        for (key, value) in &self.tags {
            line.push(',');
            escape(key, &[',', '=', ' '], &mut line);
            line.push('=');
            escape(value, &[',', '=', ' '], &mut line);
        }

        for (i, (key, value)) in self.fields.iter().enumerate() {
            line.push(if i == 0 { ' ' } else { ',' });
            escape(key, &[',', '=', ' '], &mut line);
            line.push('=');
            match value {
                FieldValue::Int(v) => {
                    let _ = write!(line, "{v}i");
                }
                FieldValue::UInt(v) => {
                    let _ = write!(line, "{v}u");
                }
                FieldValue::Float(v) => {
                    let _ = write!(line, "{v}");
                }
                FieldValue::Bool(v) => {
                    let _ = write!(line, "{v}");
                }
                FieldValue::Str(v) => {
                    line.push('"');
                    escape(v, &['"'], &mut line);
                    line.push('"');
                }
            }
        }

        if let Some(ts) = self.timestamp_ns {
            let _ = write!(line, " {ts}");
        }
        Some(line)
    }
}

fn escape(value: &str, special: &[char], out: &mut String) {
    for c in value.chars() {
        if c == '\\' || special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Per-chip points collected by the telegraf exporters.
#[derive(Debug, Default)]
pub struct TelegrafPoints {
    chips: BTreeMap<i32, LinePoint>,
    extra: Vec<LinePoint>,
}

impl TelegrafPoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point of `chip`, tagged with its id and model name.
    pub fn chip(&mut self, chip: &ChipBase) -> &mut LinePoint {
        self.chips.entry(chip.logic_id).or_insert_with(|| {
            let mut point = LinePoint::new(NPU_MEASUREMENT);
            point
                .tag("id", chip.logic_id.to_string())
                .tag("model_name", chip.chip.model_name());
            point
        })
    }

    /// Adds a point not tied to one chip.
    pub fn push(&mut self, point: LinePoint) {
        self.extra.push(point);
    }

    /// Encodes every point with fields, stamped with `timestamp_ns`.
    pub fn into_lines(self, timestamp_ns: i64) -> Vec<String> {
        self.chips
            .into_values()
            .chain(self.extra)
            .filter_map(|mut point| {
                if point.timestamp_ns.is_none() {
                    point.timestamp(timestamp_ns);
                }
                point.to_line()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_encoding() {
        let mut point = LinePoint::new("npu");
        point
            .tag("id", "0")
            .tag("model_name", "Ascend910B3")
            .field("npu_chip_info_temperature", 41i32)
            .field("npu_chip_info_power", 95.5f64)
            .field("npu_chip_info_health_status", "Healthy")
            .timestamp(1_700_000_000_000_000_000);
        assert_eq!(
            point.to_line().unwrap(),
            "npu,id=0,model_name=Ascend910B3 npu_chip_info_health_status=\"Healthy\",\
             npu_chip_info_power=95.5,npu_chip_info_temperature=41i 1700000000000000000"
        );
    }

    #[test]
    fn test_escaping() {
        let mut point = LinePoint::new("my measurement");
        point
            .tag("pod name", "a,b=c")
            .field("msg", "say \"hi\"");
        assert_eq!(
            point.to_line().unwrap(),
            "my\\ measurement,pod\\ name=a\\,b\\=c msg=\"say \\\"hi\\\"\""
        );
    }

    #[test]
    fn test_point_without_fields_is_skipped() {
        let mut point = LinePoint::new("npu");
        point.tag("id", "0").field("nan", f64::NAN);
        assert!(point.to_line().is_none());
    }

    #[test]
    fn test_empty_tag_dropped() {
        let mut point = LinePoint::new("npu");
        point.tag("pod_name", "").field("v", true);
        assert_eq!(point.to_line().unwrap(), "npu v=true");
    }

    #[test]
    fn test_large_unsigned_field() {
        let mut point = LinePoint::new("npu");
        point.field("tx", u64::MAX - 1).field("rx", 7u64);
        assert_eq!(
            point.to_line().unwrap(),
            format!("npu rx=7i,tx={}u", u64::MAX - 1)
        );
    }
}
