//! Attachment slots for engine input fields.
//!
//! Each image or video field declared by an engine owns a fixed set of
//! slots. Adding past capacity replaces the oldest occupant, and every
//! displaced or removed attachment is handed back to the caller so its
//! backing resource (an object URL, a temp file) can be released.

use serde::{Deserialize, Serialize};

use crate::engine::{EngineInputField, SchemaSummary};

// ---------------------------------------------------------------------------
// Attachments
// ---------------------------------------------------------------------------

/// One uploaded asset bound to an engine input field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub field_id: String,
    pub name: String,
    /// Provider-side URL once uploaded.
    pub url: String,
    pub content_type: Option<String>,
}

/// Outcome of adding an attachment to a field's slots.
#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome {
    Added,
    /// Capacity was full; the returned attachment was displaced and its
    /// backing resource should be released.
    Replaced(Attachment),
    /// The target field does not exist in the current schema; the
    /// attachment is handed back untouched.
    Rejected(Attachment),
}

/// All attachments for the current form, grouped by field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttachmentSet {
    entries: Vec<Attachment>,
}

impl AttachmentSet {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn for_field<'s>(&'s self, field_id: &str) -> impl Iterator<Item = &'s Attachment> + 's {
        let field_id = field_id.to_string();
        self.entries.iter().filter(move |a| a.field_id == field_id)
    }

    pub fn filled_count(&self, field_id: &str) -> usize {
        self.for_field(field_id).count()
    }

    /// Add an attachment to the slots of its field.
    ///
    /// When the field is at capacity the oldest attachment for that
    /// field is displaced and returned.
    pub fn add(&mut self, schema: &SchemaSummary, attachment: Attachment) -> AddOutcome {
        let Some(slot) = schema
            .asset_slots
            .iter()
            .find(|s| s.field.id == attachment.field_id)
        else {
            return AddOutcome::Rejected(attachment);
        };
        let capacity = slot.field.max_count.unwrap_or(1).max(1) as usize;
        if self.filled_count(&attachment.field_id) >= capacity {
            let oldest = self
                .entries
                .iter()
                .position(|a| a.field_id == attachment.field_id);
            if let Some(idx) = oldest {
                let displaced = self.entries.remove(idx);
                self.entries.push(attachment);
                return AddOutcome::Replaced(displaced);
            }
        }
        self.entries.push(attachment);
        AddOutcome::Added
    }

    /// Remove one attachment by field and position, returning it for
    /// resource release.
    pub fn remove(&mut self, field_id: &str, index: usize) -> Option<Attachment> {
        let pos = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, a)| a.field_id == field_id)
            .map(|(i, _)| i)
            .nth(index)?;
        Some(self.entries.remove(pos))
    }

    /// Drop attachments whose field no longer exists in the schema,
    /// returning the dropped ones for resource release.
    pub fn retain_fields(&mut self, schema: &SchemaSummary) -> Vec<Attachment> {
        let keep: Vec<&EngineInputField> =
            schema.asset_slots.iter().map(|s| &s.field).collect();
        let mut released = Vec::new();
        self.entries.retain(|a| {
            if keep.iter().any(|f| f.id == a.field_id) {
                true
            } else {
                released.push(a.clone());
                false
            }
        });
        released
    }

    /// Drain everything, returning the attachments for resource release.
    pub fn drain_all(&mut self) -> Vec<Attachment> {
        std::mem::take(&mut self.entries)
    }

    /// First required field in schema order that is not yet filled to
    /// its minimum, if any. Submission must be blocked while one exists.
    pub fn missing_required_field<'a>(
        &self,
        schema: &'a SchemaSummary,
    ) -> Option<&'a EngineInputField> {
        schema
            .asset_slots
            .iter()
            .filter(|s| s.required)
            .map(|s| &s.field)
            .find(|f| self.filled_count(&f.id) < f.min_required() as usize)
    }

    /// Attachments ordered by schema field order for the request payload.
    pub fn ordered_payload(&self, schema: &SchemaSummary) -> Vec<&Attachment> {
        let mut out = Vec::with_capacity(self.entries.len());
        for slot in &schema.asset_slots {
            out.extend(self.for_field(&slot.field.id));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{
        summarize_schema, DurationSpec, EngineCaps, EtaProfile, FieldKind, Mode,
    };

    fn caps() -> EngineCaps {
        EngineCaps {
            id: "engine-a".to_string(),
            label: "Engine A".to_string(),
            modes: vec![Mode::ImageToVideo, Mode::ReferenceToVideo],
            duration: DurationSpec::Range {
                min_secs: 1,
                default_secs: None,
                max_secs: 10,
            },
            resolutions: Vec::new(),
            aspect_ratios: Vec::new(),
            fps_options: Vec::new(),
            supports_audio: false,
            eta: EtaProfile {
                base_secs: 10,
                secs_per_output_sec: 5,
            },
            input_fields: vec![
                EngineInputField {
                    id: "start_image".to_string(),
                    label: "Start Image".to_string(),
                    kind: FieldKind::Image,
                    modes: None,
                    required_in_modes: vec![Mode::ImageToVideo],
                    min_count: None,
                    max_count: Some(1),
                },
                EngineInputField {
                    id: "references".to_string(),
                    label: "Reference Images".to_string(),
                    kind: FieldKind::Image,
                    modes: Some(vec![Mode::ReferenceToVideo]),
                    required_in_modes: vec![Mode::ReferenceToVideo],
                    min_count: Some(2),
                    max_count: Some(3),
                },
            ],
        }
    }

    fn attachment(field_id: &str, name: &str) -> Attachment {
        Attachment {
            field_id: field_id.to_string(),
            name: name.to_string(),
            url: format!("https://cdn.example/{name}"),
            content_type: Some("image/png".to_string()),
        }
    }

    // -- add and capacity --

    #[test]
    fn add_within_capacity() {
        let schema = summarize_schema(&caps(), Mode::ImageToVideo);
        let mut set = AttachmentSet::default();
        let outcome = set.add(&schema, attachment("start_image", "a.png"));
        assert_eq!(outcome, AddOutcome::Added);
        assert_eq!(set.filled_count("start_image"), 1);
    }

    #[test]
    fn add_past_capacity_displaces_oldest() {
        let schema = summarize_schema(&caps(), Mode::ImageToVideo);
        let mut set = AttachmentSet::default();
        set.add(&schema, attachment("start_image", "a.png"));
        let outcome = set.add(&schema, attachment("start_image", "b.png"));
        match outcome {
            AddOutcome::Replaced(displaced) => assert_eq!(displaced.name, "a.png"),
            other => panic!("expected Replaced, got {other:?}"),
        }
        assert_eq!(set.filled_count("start_image"), 1);
        assert_eq!(set.for_field("start_image").next().unwrap().name, "b.png");
    }

    #[test]
    fn add_to_unknown_field_is_rejected() {
        let schema = summarize_schema(&caps(), Mode::ImageToVideo);
        let mut set = AttachmentSet::default();
        let outcome = set.add(&schema, attachment("end_image", "a.png"));
        assert_matches::assert_matches!(outcome, AddOutcome::Rejected(a) if a.name == "a.png");
        assert!(set.is_empty());
    }

    // -- removal and retention --

    #[test]
    fn remove_returns_attachment_for_release() {
        let schema = summarize_schema(&caps(), Mode::ReferenceToVideo);
        let mut set = AttachmentSet::default();
        set.add(&schema, attachment("references", "a.png"));
        set.add(&schema, attachment("references", "b.png"));
        let removed = set.remove("references", 0).unwrap();
        assert_eq!(removed.name, "a.png");
        assert_eq!(set.filled_count("references"), 1);
    }

    #[test]
    fn retain_fields_releases_orphans_on_mode_switch() {
        let r2v = summarize_schema(&caps(), Mode::ReferenceToVideo);
        let mut set = AttachmentSet::default();
        set.add(&r2v, attachment("references", "a.png"));
        set.add(&r2v, attachment("start_image", "s.png"));

        // Switching to i2v drops the references field from the schema.
        let i2v = summarize_schema(&caps(), Mode::ImageToVideo);
        let released = set.retain_fields(&i2v);
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].name, "a.png");
        assert_eq!(set.filled_count("start_image"), 1);
    }

    // -- required checks --

    #[test]
    fn missing_required_blocks_until_min_count_met() {
        let schema = summarize_schema(&caps(), Mode::ReferenceToVideo);
        let mut set = AttachmentSet::default();
        set.add(&schema, attachment("references", "a.png"));
        // min_count is 2, so one attachment is still missing.
        assert_eq!(
            set.missing_required_field(&schema).map(|f| f.id.as_str()),
            Some("references")
        );
        set.add(&schema, attachment("references", "b.png"));
        assert!(set.missing_required_field(&schema).is_none());
    }

    #[test]
    fn optional_field_never_blocks() {
        // start_image is optional in r2v.
        let schema = summarize_schema(&caps(), Mode::ReferenceToVideo);
        let mut set = AttachmentSet::default();
        set.add(&schema, attachment("references", "a.png"));
        set.add(&schema, attachment("references", "b.png"));
        assert!(set.missing_required_field(&schema).is_none());
    }

    // -- payload ordering --

    #[test]
    fn payload_follows_schema_field_order() {
        let schema = summarize_schema(&caps(), Mode::ReferenceToVideo);
        let mut set = AttachmentSet::default();
        set.add(&schema, attachment("references", "r.png"));
        set.add(&schema, attachment("start_image", "s.png"));
        let payload = set.ordered_payload(&schema);
        // start_image is declared first in the schema.
        assert_eq!(payload[0].name, "s.png");
        assert_eq!(payload[1].name, "r.png");
    }
}
