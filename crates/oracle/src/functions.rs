use std::collections::HashMap;

/// Function name ↔ global ordinal. Ordinals are dense, assigned on first
/// sight, and never change for the life of the table.
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    by_name: HashMap<String, u32>,
    names: Vec<String>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the ordinal for `name`, assigning the next one if unseen.
    pub fn ordinal(&mut self, name: &str) -> u32 {
        if let Some(&ordinal) = self.by_name.get(name) {
            return ordinal;
        }
        let ordinal = self.names.len() as u32;
        self.names.push(name.to_string());
        self.by_name.insert(name.to_string(), ordinal);
        ordinal
    }

    pub fn get(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, ordinal: u32) -> Option<&str> {
        self.names.get(ordinal as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// `(ordinal, name)` in ordinal order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, n)| (i as u32, n.as_str()))
    }
}
