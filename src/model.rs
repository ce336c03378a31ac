//! Data models for the stowage console.
//!
//! This module defines the records exchanged with the stowage backend:
//! - `NormalizedItem` / `NormalizedContainer`: staged rows produced by the CSV pipeline
//! - `Dimensions` / `Position`: geometry resolved by the backend
//! - Request and response bodies for placement, lookup, retrieval, waste and logs
//!
//! Field names follow the backend's snake_case contract throughout.

use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use thiserror::Error;
use utoipa::{IntoParams, ToSchema};

use crate::types::{BoundingBox, Dimensional, Vec3};

/// Validation error for records composed by hand (inline edits, manual placements).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("Missing field: {0} must not be empty")]
    MissingField(&'static str),
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

fn require_text(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(())
}

/// Extent triple in centimeters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "width": 10.0, "depth": 10.0, "height": 20.0 }))]
pub struct Dimensions {
    pub width: f64,
    pub depth: f64,
    pub height: f64,
}

impl Dimensions {
    pub const fn new(width: f64, depth: f64, height: f64) -> Self {
        Self {
            width,
            depth,
            height,
        }
    }

    /// Converts to the internal axis layout (x = width, y = depth, z = height).
    #[inline]
    pub fn as_vec3(&self) -> Vec3 {
        Vec3::new(self.width, self.depth, self.height)
    }

    fn is_finite(&self) -> bool {
        self.width.is_finite() && self.depth.is_finite() && self.height.is_finite()
    }
}

impl Dimensional for Dimensions {
    fn dimensions(&self) -> Vec3 {
        self.as_vec3()
    }
}

/// Corner pair of an item inside its container's local frame.
///
/// The backend guarantees `end >= start` componentwise; nothing here re-checks it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Position {
    pub start_coordinates: Dimensions,
    pub end_coordinates: Dimensions,
}

impl Position {
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::new(
            self.start_coordinates.as_vec3(),
            self.end_coordinates.as_vec3(),
        )
    }
}

/// Staged item row, ready for placement submission.
///
/// Numeric fields are `None` when the uploaded cell was blank or unparsable.
/// Zero is a real value and never stands in for "unknown".
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NormalizedItem {
    pub item_id: String,
    #[serde(default)]
    pub name: String,
    pub width: Option<f64>,
    pub depth: Option<f64>,
    pub height: Option<f64>,
    pub mass: Option<f64>,
    pub priority: Option<i64>,
    /// ISO-8601 date-time, or empty when not given.
    #[serde(default)]
    #[schema(example = "2024-03-01T00:00:00")]
    pub expiry_date: String,
    pub usage_limit: Option<i64>,
    pub usage_count: Option<i64>,
    #[serde(default)]
    pub preferred_zone: String,
}

/// Staged container row.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NormalizedContainer {
    pub container_id: String,
    #[serde(default)]
    pub zone: String,
    pub width: Option<f64>,
    pub depth: Option<f64>,
    pub height: Option<f64>,
}

/// Inline edit of a staged item. Absent fields are left untouched.
#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct ItemPatch {
    pub item_id: Option<String>,
    pub name: Option<String>,
    pub width: Option<f64>,
    pub depth: Option<f64>,
    pub height: Option<f64>,
    pub mass: Option<f64>,
    pub priority: Option<i64>,
    pub expiry_date: Option<String>,
    pub usage_limit: Option<i64>,
    pub usage_count: Option<i64>,
    pub preferred_zone: Option<String>,
}

impl ItemPatch {
    /// Applies the patch, refusing to blank out the identifying field.
    pub fn apply(self, item: &mut NormalizedItem) -> Result<(), ValidationError> {
        if let Some(ref item_id) = self.item_id {
            require_text(item_id, "item_id")?;
        }

        if let Some(item_id) = self.item_id {
            item.item_id = item_id.trim().to_string();
        }
        if let Some(name) = self.name {
            item.name = name.trim().to_string();
        }
        if let Some(expiry_date) = self.expiry_date {
            item.expiry_date = crate::ingest::normalize_expiry(&expiry_date);
        }
        if let Some(preferred_zone) = self.preferred_zone {
            item.preferred_zone = preferred_zone.trim().to_string();
        }
        item.width = self.width.or(item.width);
        item.depth = self.depth.or(item.depth);
        item.height = self.height.or(item.height);
        item.mass = self.mass.or(item.mass);
        item.priority = self.priority.or(item.priority);
        item.usage_limit = self.usage_limit.or(item.usage_limit);
        item.usage_count = self.usage_count.or(item.usage_count);
        Ok(())
    }
}

/// Inline edit of a staged container. Absent fields are left untouched.
#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct ContainerPatch {
    pub container_id: Option<String>,
    pub zone: Option<String>,
    pub width: Option<f64>,
    pub depth: Option<f64>,
    pub height: Option<f64>,
}

impl ContainerPatch {
    pub fn apply(self, container: &mut NormalizedContainer) -> Result<(), ValidationError> {
        if let Some(ref container_id) = self.container_id {
            require_text(container_id, "container_id")?;
        }

        if let Some(container_id) = self.container_id {
            container.container_id = container_id.trim().to_string();
        }
        if let Some(zone) = self.zone {
            container.zone = zone.trim().to_string();
        }
        container.width = self.width.or(container.width);
        container.depth = self.depth.or(container.depth);
        container.height = self.height.or(container.height);
        Ok(())
    }
}

/// Body of the placement recommendation request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PlacementPayload {
    pub containers: Vec<NormalizedContainer>,
    pub items: Vec<NormalizedItem>,
}

/// One placement computed by the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Placement {
    pub item_id: String,
    #[serde(default)]
    pub name: String,
    pub container_id: String,
    pub position: Position,
    #[serde(default)]
    pub is_waste: bool,
    #[serde(default)]
    pub waste_reason: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct PlacementResponse {
    #[serde(default)]
    pub placements: Vec<Placement>,
}

/// Manual placement with coordinates chosen by the uploader.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PlacementRequest {
    pub item_id: String,
    #[serde(default)]
    pub user_id: String,
    /// RFC 3339 timestamp of the action.
    pub timestamp: String,
    pub container_id: String,
    pub position: Position,
}

impl PlacementRequest {
    /// Checks the identifying fields and that every coordinate is a finite number.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text(&self.item_id, "item_id")?;
        require_text(&self.container_id, "container_id")?;
        if !self.position.start_coordinates.is_finite()
            || !self.position.end_coordinates.is_finite()
        {
            return Err(ValidationError::InvalidValue(format!(
                "position of {} contains a non-finite value",
                self.item_id
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchPlacementRequest {
    pub items: Vec<PlacementRequest>,
}

/// Acknowledgement returned by the write endpoints of the backend.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OperationAck {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Item as persisted by the backend.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StoredItem {
    pub item_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub dimensions: Option<Dimensions>,
    #[serde(default)]
    pub mass: Option<f64>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub expiry_date: Option<String>,
    #[serde(default)]
    pub usage_limit: Option<i64>,
    #[serde(default)]
    pub usage_count: Option<i64>,
    #[serde(default)]
    pub preferred_zone: String,
    #[serde(default)]
    pub container_id: Option<String>,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub is_waste: bool,
    #[serde(default)]
    pub waste_reason: Option<String>,
}

/// Entry of the container listing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ContainerSummary {
    pub container_id: String,
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub dimensions: Option<Dimensions>,
}

/// Container with its contents, as returned by the lookup endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ContainerDetails {
    #[serde(default)]
    pub container_id: String,
    #[serde(default)]
    pub zone: String,
    pub dimensions: Dimensions,
    #[serde(default)]
    pub occupied_volume: f64,
    #[serde(default)]
    pub items: Vec<StoredItem>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RetrieveRequest {
    pub item_id: String,
}

/// Item flagged as waste by the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WasteItem {
    pub item_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub container_id: Option<String>,
    #[serde(default)]
    pub position: Option<Position>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct WasteReport {
    #[serde(default)]
    pub waste_items: Vec<WasteItem>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "undocking_container_id": "contB", "max_weight": 250.0 }))]
pub struct ReturnPlanRequest {
    pub undocking_container_id: String,
    pub max_weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub undocking_date: Option<String>,
}

impl ReturnPlanRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text(&self.undocking_container_id, "undocking_container_id")?;
        if !self.max_weight.is_finite() || self.max_weight <= 0.0 {
            return Err(ValidationError::InvalidValue(format!(
                "max_weight must be positive, got: {}",
                self.max_weight
            )));
        }
        Ok(())
    }
}

/// Waste return plan computed by the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReturnPlan {
    pub container_id: String,
    pub container_dimensions: Dimensions,
    #[serde(default)]
    pub total_mass: f64,
    #[serde(default)]
    pub volume_utilization: f64,
    #[serde(default)]
    pub plan_valid: bool,
    #[serde(default)]
    pub placed_items: Vec<StoredItem>,
}

/// Kind of action recorded in the backend log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Placement,
    Retrieval,
    Rearrangement,
    Disposal,
}

/// Filter for the action log. Both dates are required by the backend.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LogQuery {
    pub start_date: String,
    pub end_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_type: Option<ActionType>,
}

impl LogQuery {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text(&self.start_date, "start_date")?;
        require_text(&self.end_date, "end_date")?;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LogEntry {
    pub timestamp: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub action_type: ActionType,
    pub item_id: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub details: serde_json::Value,
}
