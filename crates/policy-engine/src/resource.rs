use serde::Serialize;

use crate::error::{json_kind, InputError};

/// A resource subject to policy evaluation.
///
/// `id` is what rule resource patterns are matched against; `data` is opaque
/// to the engine and interpreted only by policy checkers. Fields are private
/// so a resource cannot change while it is being evaluated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    id: String,
    data: serde_json::Value,
}

impl Resource {
    pub fn new(id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// A resource with no payload.
    pub fn bare(id: impl Into<String>) -> Self {
        Self::new(id, serde_json::Value::Null)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }

    /// Build a resource from an untyped `{"id": ..., "data": ...}` mapping.
    ///
    /// `data` is optional and defaults to `null`; any other key is rejected.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, InputError> {
        let map = value
            .as_object()
            .ok_or_else(|| InputError::InvalidResource(format!("got {}", json_kind(value))))?;

        if let Some(key) = map.keys().find(|k| *k != "id" && *k != "data") {
            return Err(InputError::InvalidResource(format!("unexpected field `{key}`")));
        }

        let id = match map.get("id") {
            Some(serde_json::Value::String(id)) => id.clone(),
            Some(other) => {
                return Err(InputError::InvalidResource(format!(
                    "`id` is {}",
                    json_kind(other)
                )))
            }
            None => return Err(InputError::InvalidResource("missing `id`".to_string())),
        };
        let data = map.get("data").cloned().unwrap_or(serde_json::Value::Null);

        Ok(Self { id, data })
    }

    /// Build a list of resources from an untyped list value.
    ///
    /// Every element must itself be a well-formed resource.
    pub fn list_from_value(value: &serde_json::Value) -> Result<Vec<Self>, InputError> {
        let items = value
            .as_array()
            .ok_or_else(|| InputError::InvalidResourceList(format!("got {}", json_kind(value))))?;

        items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                Self::from_value(item).map_err(|e| {
                    InputError::InvalidResourceList(format!("element {i} is not a resource: {e}"))
                })
            })
            .collect()
    }
}
