use anyhow::{anyhow, Result};

use crate::detect::result::Detection;

/// Label substrings that mark a detection as weapon-indicating.
pub const DEFAULT_WEAPON_LABELS: &[&str] = &[
    "gun", "pistol", "rifle", "knife", "weapon", "firearms", "arma",
];

/// Case-insensitive substring matcher for weapon labels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WeaponLabels {
    needles: Vec<String>,
}

impl WeaponLabels {
    pub fn new<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut needles = Vec::new();
        for label in labels {
            let label = label.as_ref().trim().to_lowercase();
            if label.is_empty() {
                return Err(anyhow!("weapon labels must not contain empty entries"));
            }
            if !needles.contains(&label) {
                needles.push(label);
            }
        }
        if needles.is_empty() {
            return Err(anyhow!("at least one weapon label is required"));
        }
        Ok(Self { needles })
    }

    pub fn is_weapon(&self, label: &str) -> bool {
        let label = label.to_lowercase();
        self.needles.iter().any(|needle| label.contains(needle.as_str()))
    }

    /// True when at least one detection carries a weapon label.
    pub fn any_weapon(&self, detections: &[Detection]) -> bool {
        detections.iter().any(|d| self.is_weapon(&d.label))
    }

    pub fn labels(&self) -> &[String] {
        &self.needles
    }
}

impl Default for WeaponLabels {
    fn default() -> Self {
        Self {
            needles: DEFAULT_WEAPON_LABELS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;

    #[test]
    fn matches_substrings_case_insensitively() {
        let labels = WeaponLabels::default();
        assert!(labels.is_weapon("Handgun"));
        assert!(labels.is_weapon("KNIFE"));
        assert!(labels.is_weapon("assault_rifle"));
        assert!(!labels.is_weapon("person"));
        assert!(!labels.is_weapon("cell phone"));
    }

    #[test]
    fn any_weapon_requires_one_match() {
        let labels = WeaponLabels::new(["pistol"]).unwrap();
        let person = Detection::new("person", 0.9, BoundingBox::default());
        let pistol = Detection::new("Pistol", 0.6, BoundingBox::default());
        assert!(!labels.any_weapon(&[person.clone()]));
        assert!(labels.any_weapon(&[person, pistol]));
        assert!(!labels.any_weapon(&[]));
    }

    #[test]
    fn rejects_empty_label_sets() {
        assert!(WeaponLabels::new(Vec::<String>::new()).is_err());
        assert!(WeaponLabels::new(["gun", "  "]).is_err());
    }

    #[test]
    fn normalizes_and_dedups() {
        let labels = WeaponLabels::new([" Gun ", "gun", "KNIFE"]).unwrap();
        assert_eq!(labels.labels(), &["gun".to_string(), "knife".to_string()]);
    }
}
