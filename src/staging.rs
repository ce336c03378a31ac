//! Staged records awaiting placement submission.
//!
//! The console holds exactly one staging area. Uploads replace its contents
//! wholesale (the last completed upload wins); inline edits mutate single rows.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use utoipa::ToSchema;

use crate::ingest::{ColumnMapping, ParsedUpload, RawRow, RecordKind, Records};
use crate::model::{
    ContainerPatch, ItemPatch, NormalizedContainer, NormalizedItem, PlacementPayload,
    ValidationError,
};

pub type SharedStaging = Arc<RwLock<StagingArea>>;

#[derive(Debug, Error, PartialEq)]
pub enum StagingError {
    #[error("No staged {kind} row at index {index}")]
    UnknownIndex { kind: RecordKind, index: usize },
    #[error("No items staged for submission")]
    NothingToSubmit,
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Outcome of the upload that produced the current staged set.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct UploadSummary {
    /// `items` or `containers`
    pub kind: String,
    pub file_name: String,
    pub accepted: usize,
    pub rejected_count: usize,
    pub columns: Vec<ColumnMapping>,
    /// Raw rows keyed by the uploaded header text.
    #[schema(value_type = Vec<Object>)]
    pub preview: Vec<RawRow>,
}

#[derive(Clone, Debug, Default, Serialize, ToSchema)]
pub struct StagingArea {
    pub items: Vec<NormalizedItem>,
    pub containers: Vec<NormalizedContainer>,
    pub last_upload: Option<UploadSummary>,
}

impl StagingArea {
    pub fn shared() -> SharedStaging {
        Arc::new(RwLock::new(Self::default()))
    }

    /// Replaces the staged set matching the upload's kind.
    pub fn stage(
        &mut self,
        file_name: &str,
        parsed: ParsedUpload,
        preview_rows: usize,
    ) -> UploadSummary {
        let preview = parsed.preview(preview_rows);
        let accepted = parsed.records.len();
        let kind = match parsed.records {
            Records::Items(items) => {
                self.replace_items(items);
                RecordKind::Items
            }
            Records::Containers(containers) => {
                self.replace_containers(containers);
                RecordKind::Containers
            }
        };

        let summary = UploadSummary {
            kind: kind.to_string(),
            file_name: file_name.to_string(),
            accepted,
            rejected_count: parsed.rejected_count,
            columns: parsed.columns,
            preview,
        };
        self.last_upload = Some(summary.clone());
        summary
    }

    pub fn replace_items(&mut self, items: Vec<NormalizedItem>) {
        self.items = items;
    }

    pub fn replace_containers(&mut self, containers: Vec<NormalizedContainer>) {
        self.containers = containers;
    }

    /// Appends a blank item row and returns its index.
    pub fn add_item(&mut self) -> usize {
        self.items.push(NormalizedItem::default());
        self.items.len() - 1
    }

    pub fn update_item(
        &mut self,
        index: usize,
        patch: ItemPatch,
    ) -> Result<&NormalizedItem, StagingError> {
        let item = self.items.get_mut(index).ok_or(StagingError::UnknownIndex {
            kind: RecordKind::Items,
            index,
        })?;
        patch.apply(item)?;
        Ok(item)
    }

    pub fn remove_item(&mut self, index: usize) -> Result<NormalizedItem, StagingError> {
        if index >= self.items.len() {
            return Err(StagingError::UnknownIndex {
                kind: RecordKind::Items,
                index,
            });
        }
        Ok(self.items.remove(index))
    }

    pub fn add_container(&mut self) -> usize {
        self.containers.push(NormalizedContainer::default());
        self.containers.len() - 1
    }

    pub fn update_container(
        &mut self,
        index: usize,
        patch: ContainerPatch,
    ) -> Result<&NormalizedContainer, StagingError> {
        let container = self
            .containers
            .get_mut(index)
            .ok_or(StagingError::UnknownIndex {
                kind: RecordKind::Containers,
                index,
            })?;
        patch.apply(container)?;
        Ok(container)
    }

    pub fn remove_container(&mut self, index: usize) -> Result<NormalizedContainer, StagingError> {
        if index >= self.containers.len() {
            return Err(StagingError::UnknownIndex {
                kind: RecordKind::Containers,
                index,
            });
        }
        Ok(self.containers.remove(index))
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Builds the placement request body.
    ///
    /// Rows still lacking their identifier (blank rows added by hand) are left
    /// out, the same way the upload pipeline rejects them.
    pub fn submission_payload(&self) -> Result<PlacementPayload, StagingError> {
        let items: Vec<NormalizedItem> = self
            .items
            .iter()
            .filter(|item| !item.item_id.trim().is_empty())
            .cloned()
            .collect();
        if items.is_empty() {
            return Err(StagingError::NothingToSubmit);
        }

        let containers = self
            .containers
            .iter()
            .filter(|container| !container.container_id.trim().is_empty())
            .cloned()
            .collect();

        Ok(PlacementPayload { containers, items })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::parse_rows;

    fn staged_from(csv: &str, kind: RecordKind) -> (StagingArea, UploadSummary) {
        let mut area = StagingArea::default();
        let parsed = parse_rows(csv.as_bytes(), kind).unwrap();
        let summary = area.stage("upload.csv", parsed, 2);
        (area, summary)
    }

    #[test]
    fn upload_replaces_previous_set_without_merging() {
        let (mut area, summary) = staged_from("item_id,name\na,A\nb,B\n,C\n", RecordKind::Items);
        assert_eq!(summary.kind, "items");
        assert_eq!(summary.accepted, 2);
        assert_eq!(summary.rejected_count, 1);
        assert_eq!(summary.preview.len(), 2);

        let parsed = parse_rows(b"item_id\nz\n", RecordKind::Items).unwrap();
        area.stage("second.csv", parsed, 5);
        assert_eq!(area.items.len(), 1);
        assert_eq!(area.items[0].item_id, "z");
        assert_eq!(
            area.last_upload.as_ref().map(|s| s.file_name.as_str()),
            Some("second.csv")
        );
    }

    #[test]
    fn container_upload_leaves_items_alone() {
        let (mut area, _) = staged_from("item_id\na\n", RecordKind::Items);
        let parsed = parse_rows(b"container_id,zone\ncontA,Lab\n", RecordKind::Containers).unwrap();
        area.stage("containers.csv", parsed, 5);
        assert_eq!(area.items.len(), 1);
        assert_eq!(area.containers.len(), 1);
    }

    #[test]
    fn inline_edits_target_single_rows() {
        let (mut area, _) = staged_from("item_id,mass\na,1\nb,2\n", RecordKind::Items);

        let patch = ItemPatch {
            mass: Some(9.0),
            ..ItemPatch::default()
        };
        let updated = area.update_item(1, patch).unwrap();
        assert_eq!(updated.mass, Some(9.0));
        assert_eq!(area.items[0].mass, Some(1.0));

        let blank = ItemPatch {
            item_id: Some(String::new()),
            ..ItemPatch::default()
        };
        assert!(matches!(
            area.update_item(0, blank),
            Err(StagingError::Invalid(ValidationError::MissingField("item_id")))
        ));

        assert_eq!(
            area.remove_item(5),
            Err(StagingError::UnknownIndex {
                kind: RecordKind::Items,
                index: 5,
            })
        );
        assert_eq!(area.remove_item(0).unwrap().item_id, "a");
        assert_eq!(area.items[0].item_id, "b");
    }

    #[test]
    fn container_rows_can_be_added_and_edited() {
        let mut area = StagingArea::default();
        let index = area.add_container();
        let patch = ContainerPatch {
            container_id: Some("contC".to_string()),
            width: Some(40.0),
            ..ContainerPatch::default()
        };
        area.update_container(index, patch).unwrap();
        assert_eq!(area.containers[0].container_id, "contC");
        assert!(area.update_container(3, ContainerPatch::default()).is_err());
        assert!(area.remove_container(0).is_ok());
        assert!(area.containers.is_empty());
    }

    #[test]
    fn submission_requires_identified_items() {
        let mut area = StagingArea::default();
        assert_eq!(area.submission_payload(), Err(StagingError::NothingToSubmit));

        area.add_item();
        area.add_container();
        assert_eq!(area.submission_payload(), Err(StagingError::NothingToSubmit));

        let patch = ItemPatch {
            item_id: Some("007".to_string()),
            ..ItemPatch::default()
        };
        area.update_item(0, patch).unwrap();
        let payload = area.submission_payload().unwrap();
        assert_eq!(payload.items.len(), 1);
        assert!(payload.containers.is_empty());
    }

    #[test]
    fn clear_drops_everything() {
        let (mut area, _) = staged_from("item_id\na\n", RecordKind::Items);
        area.clear();
        assert!(area.items.is_empty());
        assert!(area.last_upload.is_none());
    }
}
