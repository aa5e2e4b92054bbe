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

//! Prometheus text exposition helpers.

use std::fmt::Display;

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Helper struct to build Prometheus metrics
pub struct MetricBuilder {
    metrics: String,
}

impl MetricBuilder {
    pub fn new() -> Self {
        Self {
            metrics: String::new(),
        }
    }

    /// Add a HELP line
    pub fn help(&mut self, name: &str, description: &str) -> &mut Self {
        self.metrics
            .push_str(&format!("# HELP {name} {description}\n"));
        self
    }

    /// Add a TYPE line
    pub fn type_(&mut self, name: &str, metric_type: &str) -> &mut Self {
        self.metrics
            .push_str(&format!("# TYPE {name} {metric_type}\n"));
        self
    }

    /// HELP and TYPE lines of a metric family.
    pub fn family(&mut self, name: &str, description: &str, metric_type: &str) -> &mut Self {
        self.help(name, description).type_(name, metric_type)
    }

    /// Add a metric line with labels
    pub fn metric<K, V>(&mut self, name: &str, labels: &[(K, V)], value: impl Display) -> &mut Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.metrics.push_str(name);

        if !labels.is_empty() {
            self.metrics.push('{');
            for (i, (key, value)) in labels.iter().enumerate() {
                if i > 0 {
                    self.metrics.push(',');
                }
                self.metrics.push_str(key.as_ref());
                self.metrics.push_str("=\"");
                escape_label_value(value.as_ref(), &mut self.metrics);
                self.metrics.push('"');
            }
            self.metrics.push('}');
        }

        self.metrics.push(' ');
        self.metrics.push_str(&value.to_string());
        self.metrics.push('\n');
        self
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Build the final metric string
    pub fn build(self) -> String {
        self.metrics
    }
}

impl Default for MetricBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn escape_label_value(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_with_labels() {
        let mut builder = MetricBuilder::new();
        builder
            .family("npu_chip_info_temperature", "the npu temperature", "gauge")
            .metric(
                "npu_chip_info_temperature",
                &[("id", "0"), ("model_name", "Ascend910B3")],
                41,
            );
        assert_eq!(
            builder.build(),
            "# HELP npu_chip_info_temperature the npu temperature\n\
             # TYPE npu_chip_info_temperature gauge\n\
             npu_chip_info_temperature{id=\"0\",model_name=\"Ascend910B3\"} 41\n"
        );
    }

    #[test]
    fn test_label_escaping() {
        let mut builder = MetricBuilder::new();
        builder.metric("m", &[("name", "a\"b\\c\nd")], 1);
        assert_eq!(builder.build(), "m{name=\"a\\\"b\\\\c\\nd\"} 1\n");
    }

    #[test]
    fn test_metric_without_labels() {
        let mut builder = MetricBuilder::new();
        builder.metric::<&str, &str>("machine_npu_nums", &[], 8);
        assert_eq!(builder.build(), "machine_npu_nums 8\n");
    }
}
