//! Operator settings loaded from `Config/settings.yaml`

use crate::rules::DEFAULT_MODEL;
use crate::types::Consultant;
use serde::{Deserialize, Serialize};

fn default_brand() -> String {
    "别克".to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_delimiter() -> char {
    ','
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Brand stamped on every lead
    #[serde(default = "default_brand")]
    pub brand: String,
    /// Car series used when nothing matches or the export leaves it blank
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Delimiter of the Autohome CSV export
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Consultant who receives the first lead
    #[serde(default)]
    pub first_pick: Option<String>,
    #[serde(default = "stock_roster")]
    pub consultants: Vec<Consultant>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            brand: default_brand(),
            default_model: default_model(),
            delimiter: default_delimiter(),
            first_pick: None,
            consultants: stock_roster(),
        }
    }
}

/// The dealership's roster as shipped
pub fn stock_roster() -> Vec<Consultant> {
    const SERVICE_CO: &str = "上海安吉名流汽车服务有限公司";
    const SALES_DEPT: &str = "安吉名流销售部";

    vec![
        Consultant::new("陈婷", SERVICE_CO, true),
        Consultant::new("张理平", SERVICE_CO, true),
        Consultant::new("邵振艺", SERVICE_CO, true),
        Consultant::new("耿佶", SERVICE_CO, true),
        Consultant::new("翁佳跃", SALES_DEPT, false),
        Consultant::new("陈杰", SALES_DEPT, false),
    ]
}

impl Settings {
    /// Delimiter as a byte, `None` if it is not ASCII
    pub fn delimiter_byte(&self) -> Option<u8> {
        u8::try_from(self.delimiter).ok().filter(u8::is_ascii)
    }

    /// Toggle a consultant by name; returns false when nobody has that name
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        let mut found = false;
        for consultant in self.consultants.iter_mut().filter(|c| c.name == name) {
            consultant.enabled = enabled;
            found = true;
        }
        found
    }

    /// The configured first pick, only if it names an enabled consultant
    pub fn effective_first_pick(&self) -> Option<&str> {
        let pick = self.first_pick.as_deref()?;
        self.consultants
            .iter()
            .any(|c| c.enabled && c.name == pick)
            .then_some(pick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.brand, "别克");
        assert_eq!(settings.default_model, "昂科威PLUS");
        assert_eq!(settings.delimiter_byte(), Some(b','));
        assert_eq!(settings.consultants.iter().filter(|c| c.enabled).count(), 4);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "first_pick: 耿佶\nconsultants:\n  - name: 耿佶\n    unit: 一组\n  - 姓名: 陈杰\n    单位: 二组\n    是否启用: false\n";
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.brand, "别克");
        assert_eq!(settings.consultants.len(), 2);
        assert!(settings.consultants[0].enabled);
        assert!(!settings.consultants[1].enabled);
        assert_eq!(settings.effective_first_pick(), Some("耿佶"));
    }

    #[test]
    fn test_set_enabled_and_first_pick() {
        let mut settings = Settings {
            first_pick: Some("陈杰".to_string()),
            ..Settings::default()
        };
        assert_eq!(settings.effective_first_pick(), None);
        assert!(settings.set_enabled("陈杰", true));
        assert_eq!(settings.effective_first_pick(), Some("陈杰"));
        assert!(!settings.set_enabled("不存在", true));
    }

    #[test]
    fn test_non_ascii_delimiter_rejected() {
        let settings = Settings {
            delimiter: '，',
            ..Settings::default()
        };
        assert_eq!(settings.delimiter_byte(), None);
    }
}
