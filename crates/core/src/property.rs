use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum PropertySection {
    #[default]
    Unknown,
    Info,
    OverallHealth,
    Capabilities,
    Attributes,
    ErrorLog,
    SelftestLog,
    SelectiveSelftestLog,
    TemperatureLog,
    Statistics,
    PhyLog,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum PropertyValue {
    #[default]
    Empty,
    Bool(bool),
    Integer(i64),
    String(String),
}

impl PropertyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(value) => Some(value),
            _ => None,
        }
    }

    fn render(&self) -> String {
        match self {
            PropertyValue::Empty => String::new(),
            PropertyValue::Bool(value) => if *value { "Yes" } else { "No" }.to_string(),
            PropertyValue::Integer(value) => value.to_string(),
            PropertyValue::String(value) => value.clone(),
        }
    }
}

/// One entry of a [`PropertyRepository`], addressed by a `/`-separated path
/// such as `smart_status/passed`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Property {
    pub path: String,
    pub value: PropertyValue,
    #[serde(default)]
    pub readable_value: String,
    #[serde(default)]
    pub displayable_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub section: PropertySection,
}

impl Property {
    pub fn new(path: impl Into<String>, value: PropertyValue) -> Self {
        let readable_value = value.render();
        Self {
            path: path.into(),
            value,
            readable_value,
            displayable_name: String::new(),
            description: None,
            section: PropertySection::Unknown,
        }
    }

    pub fn with_readable(mut self, readable: impl Into<String>) -> Self {
        self.readable_value = readable.into();
        self
    }

    pub fn with_section(mut self, section: PropertySection) -> Self {
        self.section = section;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PropertyRepository {
    properties: Vec<Property>,
}

impl PropertyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a property, replacing an earlier one with the same path in place.
    pub fn add(&mut self, property: Property) {
        match self
            .properties
            .iter_mut()
            .find(|existing| existing.path == property.path)
        {
            Some(existing) => *existing = property,
            None => self.properties.push(property),
        }
    }

    pub fn lookup(&self, path: &str) -> Option<&Property> {
        self.properties.iter().find(|property| property.path == path)
    }

    pub fn lookup_in_section(&self, path: &str, section: PropertySection) -> Option<&Property> {
        self.properties
            .iter()
            .find(|property| property.path == path && property.section == section)
    }

    /// Returns the first property found among `candidates`, tried in order.
    pub fn lookup_first(&self, candidates: &[&str]) -> Option<&Property> {
        candidates.iter().find_map(|path| self.lookup(path))
    }

    pub fn has_properties_for_section(&self, section: PropertySection) -> bool {
        self.properties
            .iter()
            .any(|property| property.section == section)
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> impl Iterator<Item = &mut Property> {
        self.properties.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn clear(&mut self) {
        self.properties.clear();
    }
}

impl FromIterator<Property> for PropertyRepository {
    fn from_iter<T: IntoIterator<Item = Property>>(iter: T) -> Self {
        let mut repository = PropertyRepository::new();
        for property in iter {
            repository.add(property);
        }
        repository
    }
}

#[cfg(test)]
mod tests {
    use super::{Property, PropertyRepository, PropertySection, PropertyValue};

    #[test]
    fn lookup_first_prefers_earlier_candidates() {
        let repository: PropertyRepository = [
            Property::new("scsi_model_name", PropertyValue::String("Cruzer".into())),
            Property::new("model_name", PropertyValue::String("WDC WD10".into())),
        ]
        .into_iter()
        .collect();

        let found = repository
            .lookup_first(&["model_name", "scsi_model_name"])
            .expect("model present");
        assert_eq!(found.value.as_str(), Some("WDC WD10"));
        assert!(repository.lookup_first(&["model_family", "scsi_vendor"]).is_none());
    }

    #[test]
    fn adding_same_path_replaces_in_place() {
        let mut repository = PropertyRepository::new();
        repository.add(Property::new("rotation_rate", PropertyValue::Integer(7200)));
        repository.add(Property::new("serial_number", PropertyValue::String("X".into())));
        repository.add(Property::new("rotation_rate", PropertyValue::Integer(0)));

        assert_eq!(repository.len(), 2);
        assert_eq!(repository.properties()[0].value.as_integer(), Some(0));
    }

    #[test]
    fn section_lookup_ignores_other_sections() {
        let repository: PropertyRepository = [Property::new(
            "smart_status/passed",
            PropertyValue::Bool(true),
        )
        .with_section(PropertySection::Info)]
        .into_iter()
        .collect();

        assert!(repository
            .lookup_in_section("smart_status/passed", PropertySection::OverallHealth)
            .is_none());
        assert!(!repository.has_properties_for_section(PropertySection::SelftestLog));
        assert_eq!(repository.properties()[0].readable_value, "Yes");
    }
}
