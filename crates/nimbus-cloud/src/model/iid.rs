use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier pair of a resource: the caller's name and the backend's id
///
/// After a successful create both parts are set. Lookups accept either;
/// the system id wins when both are present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Iid {
    pub name_id: String,
    pub system_id: String,
}

impl Iid {
    pub fn new(name_id: impl Into<String>, system_id: impl Into<String>) -> Self {
        Self {
            name_id: name_id.into(),
            system_id: system_id.into(),
        }
    }

    pub fn by_name(name_id: impl Into<String>) -> Self {
        Self::new(name_id, "")
    }

    pub fn by_system_id(system_id: impl Into<String>) -> Self {
        Self::new("", system_id)
    }

    pub fn is_empty(&self) -> bool {
        self.name_id.is_empty() && self.system_id.is_empty()
    }

    /// Name comparison used for uniqueness checks (case-insensitive)
    pub fn same_name(&self, other: &str) -> bool {
        self.name_id.eq_ignore_ascii_case(other)
    }
}

impl fmt::Display for Iid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.name_id.is_empty(), self.system_id.is_empty()) {
            (false, false) => write!(f, "{} ({})", self.name_id, self.system_id),
            (false, true) => f.write_str(&self.name_id),
            (true, false) => f.write_str(&self.system_id),
            (true, true) => f.write_str("<empty>"),
        }
    }
}

/// Free-form key/value pair, used for tags and provider extras
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iid_display() {
        assert_eq!(Iid::new("net-a", "abc").to_string(), "net-a (abc)");
        assert_eq!(Iid::by_name("net-a").to_string(), "net-a");
        assert_eq!(Iid::by_system_id("abc").to_string(), "abc");
        assert!(Iid::default().is_empty());
    }

    #[test]
    fn test_same_name_ignores_case() {
        assert!(Iid::by_name("VM-1").same_name("vm-1"));
        assert!(!Iid::by_name("vm-1").same_name("vm-10"));
    }
}
