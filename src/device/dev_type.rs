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

use serde::Serialize;

/// Ascend chip family, detected from the chip name the driver reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DevType {
    Ascend310,
    Ascend310B,
    Ascend310P,
    Ascend910,
    Ascend910B,
    Ascend910A3,
    Unknown,
}

impl DevType {
    /// Maps a chip name such as `910B3`, `310P3` or `910_9391` to its family.
    pub fn from_chip_name(name: &str) -> Self {
        let name = name.trim().to_ascii_uppercase();
        let name = name.strip_prefix("ASCEND").unwrap_or(&name);

        if name.starts_with("910_9") {
            DevType::Ascend910A3
        } else if name.starts_with("910B") {
            DevType::Ascend910B
        } else if name.starts_with("910") {
            DevType::Ascend910
        } else if name.starts_with("310P") {
            DevType::Ascend310P
        } else if name.starts_with("310B") {
            DevType::Ascend310B
        } else if name.starts_with("310") {
            DevType::Ascend310
        } else {
            DevType::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DevType::Ascend310 => "Ascend310",
            DevType::Ascend310B => "Ascend310B",
            DevType::Ascend310P => "Ascend310P",
            DevType::Ascend910 => "Ascend910",
            DevType::Ascend910B => "Ascend910B",
            DevType::Ascend910A3 => "Ascend910A3",
            DevType::Unknown => "Unknown",
        }
    }

    pub fn is_910_family(&self) -> bool {
        matches!(
            self,
            DevType::Ascend910 | DevType::Ascend910B | DevType::Ascend910A3
        )
    }

    pub fn is_310_family(&self) -> bool {
        matches!(
            self,
            DevType::Ascend310 | DevType::Ascend310B | DevType::Ascend310P
        )
    }

    pub fn has_hbm(&self) -> bool {
        self.is_910_family()
    }

    pub fn has_ddr(&self) -> bool {
        self.is_310_family()
    }

    pub fn has_hccs(&self) -> bool {
        matches!(self, DevType::Ascend910B | DevType::Ascend910A3)
    }

    /// RoCE NICs driven through hccn_tool.
    pub fn has_roce(&self) -> bool {
        self.is_910_family()
    }

    pub fn has_pcie_bandwidth(&self) -> bool {
        matches!(
            self,
            DevType::Ascend310P | DevType::Ascend910B | DevType::Ascend910A3
        )
    }

    pub fn supports_vnpu(&self) -> bool {
        matches!(
            self,
            DevType::Ascend310P | DevType::Ascend910 | DevType::Ascend910B
        )
    }
}

impl std::fmt::Display for DevType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection() {
        assert_eq!(DevType::from_chip_name("310"), DevType::Ascend310);
        assert_eq!(DevType::from_chip_name("310B1"), DevType::Ascend310B);
        assert_eq!(DevType::from_chip_name("310P3"), DevType::Ascend310P);
        assert_eq!(DevType::from_chip_name("910"), DevType::Ascend910);
        assert_eq!(DevType::from_chip_name("910PremiumA"), DevType::Ascend910);
        assert_eq!(DevType::from_chip_name("910B3"), DevType::Ascend910B);
        assert_eq!(DevType::from_chip_name("910_9391"), DevType::Ascend910A3);
        assert_eq!(DevType::from_chip_name("Ascend910B4"), DevType::Ascend910B);
        assert_eq!(DevType::from_chip_name(""), DevType::Unknown);
        assert_eq!(DevType::from_chip_name("A100"), DevType::Unknown);
    }

    #[test]
    fn test_feature_predicates() {
        assert!(DevType::Ascend910B.has_hbm());
        assert!(!DevType::Ascend910B.has_ddr());
        assert!(DevType::Ascend310P.has_ddr());
        assert!(!DevType::Ascend310P.has_hccs());
        assert!(DevType::Ascend910A3.has_hccs());
        assert!(!DevType::Ascend910A3.supports_vnpu());
        assert!(!DevType::Unknown.has_roce());
    }
}
