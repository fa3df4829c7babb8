use std::collections::HashMap;

use shared::domain::{
    CueId, ItemId, ItemKind, ManualItemId, OverlaySettings, RundownItem, Segment, SegmentId,
};

/// An item together with where it sits in the rundown.
#[derive(Debug, Clone)]
pub struct IndexedItem {
    pub item: RundownItem,
    pub segment_id: SegmentId,
    /// Index in the flat sequence; `None` for overlays, which ride on a parent.
    pub position: Option<usize>,
    /// For overlays, the item the run is attached to.
    pub parent_item_id: Option<ItemId>,
}

/// Read-only view over an episode's segments, flattened for next-item resolution.
#[derive(Debug, Clone, Default)]
pub struct RundownIndex {
    segments: Vec<Segment>,
    sequence: Vec<ItemId>,
    items: HashMap<ItemId, IndexedItem>,
    overlays_by_parent: HashMap<ItemId, Vec<ItemId>>,
    manual_parents: HashMap<ManualItemId, ItemId>,
}

/// Skip policy shared by every next-item lookup.
pub fn is_actionable(kind: ItemKind) -> bool {
    !matches!(kind, ItemKind::ManualBlock | ItemKind::PresenterNote)
}

impl RundownIndex {
    pub fn new(segments: Vec<Segment>) -> Self {
        let mut index = Self::default();

        for segment in &segments {
            for cue in &segment.cues {
                // Overlays attach to the closest preceding non-overlay item in the same cue.
                let mut anchor: Option<ItemId> = None;
                for item in &cue.items {
                    if index.items.contains_key(&item.id) {
                        tracing::warn!(item_id = item.id.0, "duplicate rundown item id ignored");
                        continue;
                    }

                    let mut entry = IndexedItem {
                        item: item.clone(),
                        segment_id: segment.id,
                        position: None,
                        parent_item_id: None,
                    };

                    if item.kind == ItemKind::Overlay {
                        entry.parent_item_id = anchor;
                        if let Some(parent) = anchor {
                            index
                                .overlays_by_parent
                                .entry(parent)
                                .or_default()
                                .push(item.id);
                        }
                    } else {
                        anchor = Some(item.id);
                        entry.position = Some(index.sequence.len());
                        index.sequence.push(item.id);
                    }

                    if item.kind == ItemKind::ManualBlock {
                        for manual in &item.manual_items {
                            index.manual_parents.insert(manual.id, item.id);
                        }
                    }

                    index.items.insert(item.id, entry);
                }
            }
        }

        index.segments = segments;
        index
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    pub fn get(&self, item_id: ItemId) -> Option<&IndexedItem> {
        self.items.get(&item_id)
    }

    pub fn item(&self, item_id: ItemId) -> Option<&RundownItem> {
        self.items.get(&item_id).map(|entry| &entry.item)
    }

    pub fn kind(&self, item_id: ItemId) -> Option<ItemKind> {
        self.item(item_id).map(|item| item.kind)
    }

    pub fn position(&self, item_id: ItemId) -> Option<usize> {
        self.items.get(&item_id).and_then(|entry| entry.position)
    }

    pub fn item_at(&self, index: usize) -> Option<&RundownItem> {
        self.sequence.get(index).and_then(|id| self.item(*id))
    }

    pub fn segment_of(&self, item_id: ItemId) -> Option<SegmentId> {
        self.items.get(&item_id).map(|entry| entry.segment_id)
    }

    pub fn cue_of(&self, item_id: ItemId) -> Option<CueId> {
        self.item(item_id).map(|item| item.cue_id)
    }

    /// First item at or after `from_index` that is neither a manual block nor a presenter note.
    pub fn find_next_actionable(&self, from_index: usize) -> Option<ItemId> {
        self.sequence
            .iter()
            .skip(from_index)
            .copied()
            .find(|id| self.kind(*id).is_some_and(is_actionable))
    }

    pub fn next_actionable_after(&self, item_id: ItemId) -> Option<ItemId> {
        let position = self.position(item_id)?;
        self.find_next_actionable(position + 1)
    }

    /// The overlay run immediately following `parent` in its cue.
    pub fn overlays_for(&self, parent: ItemId) -> &[ItemId] {
        self.overlays_by_parent
            .get(&parent)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn overlay_settings(&self, overlay_id: ItemId) -> Option<OverlaySettings> {
        let entry = self.items.get(&overlay_id)?;
        if entry.item.kind != ItemKind::Overlay {
            return None;
        }
        entry.item.overlay
    }

    pub fn manual_parent(&self, manual_item_id: ManualItemId) -> Option<ItemId> {
        self.manual_parents.get(&manual_item_id).copied()
    }

    pub fn contains_manual_item(&self, manual_item_id: ManualItemId) -> bool {
        self.manual_parents.contains_key(&manual_item_id)
    }
}

#[cfg(test)]
#[path = "tests/rundown_tests.rs"]
mod tests;
