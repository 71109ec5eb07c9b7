use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::layers::Layer;
use crate::model::{Annotation, ViewAngle, now_secs};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AuditEntity {
    Annotation,
    Layer,
}

/// Durable audit record, fire-and-forget. Not the undo history.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEvent {
    pub evaluation_id: String,
    pub action: AuditAction,
    pub entity: AuditEntity,
    pub entity_id: u64,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub at: u64,
}

impl AuditEvent {
    pub fn new(
        evaluation_id: &str,
        action: AuditAction,
        entity: AuditEntity,
        entity_id: u64,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
    ) -> Self {
        Self {
            evaluation_id: evaluation_id.to_string(),
            action,
            entity,
            entity_id,
            before,
            after,
            at: now_secs(),
        }
    }
}

/// Boundary to wherever layers and annotations live. Failures are plain
/// `Result`s; call sites log them and keep the optimistic in-memory state.
pub trait EvaluationStore {
    fn load_layers(&mut self, evaluation_id: &str) -> Result<Vec<Layer>>;
    fn create_layer(&mut self, evaluation_id: &str, layer: &Layer) -> Result<()>;
    fn update_layer(&mut self, evaluation_id: &str, layer: &Layer) -> Result<()>;
    fn delete_layer(&mut self, evaluation_id: &str, layer_id: u64) -> Result<()>;
    fn load_annotations(
        &mut self,
        evaluation_id: &str,
        angle: Option<ViewAngle>,
    ) -> Result<Vec<Annotation>>;
    fn create_annotation(&mut self, evaluation_id: &str, annotation: &Annotation) -> Result<()>;
    fn update_annotation(&mut self, evaluation_id: &str, annotation: &Annotation) -> Result<()>;
    fn delete_annotation(&mut self, evaluation_id: &str, annotation_id: u64) -> Result<()>;
    fn append_audit_event(&mut self, event: &AuditEvent) -> Result<()>;

    /// Explicit Save: rewrites the persisted sets wholesale so they match
    /// the in-memory state (including anything undo rolled back).
    fn save_all(
        &mut self,
        evaluation_id: &str,
        layers: &[Layer],
        annotations: &[Annotation],
    ) -> Result<()>;
}

/// Save-health service, injected into the session rather than reached as a
/// global. Feeds the status bar.
#[derive(Clone, Debug, Default)]
pub struct SyncStatus {
    pub failed_writes: u32,
    pub last_error: Option<String>,
}

impl SyncStatus {
    pub fn record_failure(&mut self, what: &str, err: &anyhow::Error) {
        self.failed_writes += 1;
        self.last_error = Some(format!("{what}: {err:#}"));
        log::warn!("persistence failed ({what}): {err:#}");
    }

    pub fn clear(&mut self) {
        self.failed_writes = 0;
        self.last_error = None;
    }

    pub fn is_healthy(&self) -> bool {
        self.failed_writes == 0
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct EvaluationDoc {
    #[serde(default)]
    layers: Vec<Layer>,
    #[serde(default)]
    annotations: Vec<Annotation>,
}

impl EvaluationDoc {
    fn apply_layer(&mut self, layer: &Layer) {
        match self.layers.iter_mut().find(|l| l.id == layer.id) {
            Some(existing) => *existing = layer.clone(),
            None => self.layers.push(layer.clone()),
        }
    }

    fn apply_annotation(&mut self, annotation: &Annotation) {
        match self.annotations.iter_mut().find(|a| a.id == annotation.id) {
            Some(existing) => *existing = annotation.clone(),
            None => self.annotations.push(annotation.clone()),
        }
    }

    fn delete_layer(&mut self, layer_id: u64) {
        // Cascade: a layer never leaves orphaned annotations behind.
        self.annotations.retain(|a| a.layer_id != layer_id);
        self.layers.retain(|l| l.id != layer_id);
    }
}

/// One pretty-printed JSON document per evaluation under the data directory,
/// with audit events appended as JSON lines to a sibling file.
pub struct JsonFileStore {
    data_dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn doc_path(&self, evaluation_id: &str) -> PathBuf {
        self.data_dir
            .join(format!("{}.json", sanitize_id(evaluation_id)))
    }

    fn audit_path(&self, evaluation_id: &str) -> PathBuf {
        self.data_dir
            .join(format!("{}.audit.jsonl", sanitize_id(evaluation_id)))
    }

    fn read_doc(&self, evaluation_id: &str) -> Result<EvaluationDoc> {
        let path = self.doc_path(evaluation_id);
        if !path.exists() {
            // Nothing persisted yet is "nothing", not an error.
            return Ok(EvaluationDoc::default());
        }
        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("read {}", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("parse {}", path.display()))
    }

    fn write_doc(&self, evaluation_id: &str, doc: &EvaluationDoc) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("create {}", self.data_dir.display()))?;
        let path = self.doc_path(evaluation_id);
        let json = serde_json::to_string_pretty(doc).context("serialize evaluation")?;
        std::fs::write(&path, json).with_context(|| format!("write {}", path.display()))
    }

    fn mutate(
        &self,
        evaluation_id: &str,
        f: impl FnOnce(&mut EvaluationDoc),
    ) -> Result<()> {
        let mut doc = self.read_doc(evaluation_id)?;
        f(&mut doc);
        self.write_doc(evaluation_id, &doc)
    }
}

impl EvaluationStore for JsonFileStore {
    fn load_layers(&mut self, evaluation_id: &str) -> Result<Vec<Layer>> {
        Ok(self.read_doc(evaluation_id)?.layers)
    }

    fn create_layer(&mut self, evaluation_id: &str, layer: &Layer) -> Result<()> {
        self.mutate(evaluation_id, |doc| doc.apply_layer(layer))
    }

    fn update_layer(&mut self, evaluation_id: &str, layer: &Layer) -> Result<()> {
        self.mutate(evaluation_id, |doc| doc.apply_layer(layer))
    }

    fn delete_layer(&mut self, evaluation_id: &str, layer_id: u64) -> Result<()> {
        self.mutate(evaluation_id, |doc| doc.delete_layer(layer_id))
    }

    fn load_annotations(
        &mut self,
        evaluation_id: &str,
        angle: Option<ViewAngle>,
    ) -> Result<Vec<Annotation>> {
        let mut annotations = self.read_doc(evaluation_id)?.annotations;
        if let Some(angle) = angle {
            annotations.retain(|a| a.view_angle == angle);
        }
        Ok(annotations)
    }

    fn create_annotation(&mut self, evaluation_id: &str, annotation: &Annotation) -> Result<()> {
        self.mutate(evaluation_id, |doc| doc.apply_annotation(annotation))
    }

    fn update_annotation(&mut self, evaluation_id: &str, annotation: &Annotation) -> Result<()> {
        self.mutate(evaluation_id, |doc| doc.apply_annotation(annotation))
    }

    fn delete_annotation(&mut self, evaluation_id: &str, annotation_id: u64) -> Result<()> {
        self.mutate(evaluation_id, |doc| {
            doc.annotations.retain(|a| a.id != annotation_id);
        })
    }

    fn append_audit_event(&mut self, event: &AuditEvent) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("create {}", self.data_dir.display()))?;
        let path = self.audit_path(&event.evaluation_id);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open {}", path.display()))?;
        let line = serde_json::to_string(event).context("serialize audit event")?;
        writeln!(file, "{line}").with_context(|| format!("append {}", path.display()))
    }

    fn save_all(
        &mut self,
        evaluation_id: &str,
        layers: &[Layer],
        annotations: &[Annotation],
    ) -> Result<()> {
        self.write_doc(
            evaluation_id,
            &EvaluationDoc {
                layers: layers.to_vec(),
                annotations: annotations.to_vec(),
            },
        )
    }
}

fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// In-process double for tests: counts writes and can be told to fail them.
#[derive(Default)]
pub struct MemoryStore {
    docs: HashMap<String, EvaluationDoc>,
    pub audit_events: Vec<AuditEvent>,
    pub create_annotation_calls: u32,
    pub fail_writes: bool,
}

impl MemoryStore {
    fn doc_mut(&mut self, evaluation_id: &str) -> &mut EvaluationDoc {
        self.docs.entry(evaluation_id.to_string()).or_default()
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_writes {
            anyhow::bail!("simulated backend failure");
        }
        Ok(())
    }
}

impl EvaluationStore for MemoryStore {
    fn load_layers(&mut self, evaluation_id: &str) -> Result<Vec<Layer>> {
        Ok(self.doc_mut(evaluation_id).layers.clone())
    }

    fn create_layer(&mut self, evaluation_id: &str, layer: &Layer) -> Result<()> {
        self.check_write()?;
        self.doc_mut(evaluation_id).apply_layer(layer);
        Ok(())
    }

    fn update_layer(&mut self, evaluation_id: &str, layer: &Layer) -> Result<()> {
        self.check_write()?;
        self.doc_mut(evaluation_id).apply_layer(layer);
        Ok(())
    }

    fn delete_layer(&mut self, evaluation_id: &str, layer_id: u64) -> Result<()> {
        self.check_write()?;
        self.doc_mut(evaluation_id).delete_layer(layer_id);
        Ok(())
    }

    fn load_annotations(
        &mut self,
        evaluation_id: &str,
        angle: Option<ViewAngle>,
    ) -> Result<Vec<Annotation>> {
        let mut annotations = self.doc_mut(evaluation_id).annotations.clone();
        if let Some(angle) = angle {
            annotations.retain(|a| a.view_angle == angle);
        }
        Ok(annotations)
    }

    fn create_annotation(&mut self, evaluation_id: &str, annotation: &Annotation) -> Result<()> {
        self.create_annotation_calls += 1;
        self.check_write()?;
        self.doc_mut(evaluation_id).apply_annotation(annotation);
        Ok(())
    }

    fn update_annotation(&mut self, evaluation_id: &str, annotation: &Annotation) -> Result<()> {
        self.check_write()?;
        self.doc_mut(evaluation_id).apply_annotation(annotation);
        Ok(())
    }

    fn delete_annotation(&mut self, evaluation_id: &str, annotation_id: u64) -> Result<()> {
        self.check_write()?;
        self.doc_mut(evaluation_id)
            .annotations
            .retain(|a| a.id != annotation_id);
        Ok(())
    }

    fn append_audit_event(&mut self, event: &AuditEvent) -> Result<()> {
        self.check_write()?;
        self.audit_events.push(event.clone());
        Ok(())
    }

    fn save_all(
        &mut self,
        evaluation_id: &str,
        layers: &[Layer],
        annotations: &[Annotation],
    ) -> Result<()> {
        self.check_write()?;
        *self.doc_mut(evaluation_id) = EvaluationDoc {
            layers: layers.to_vec(),
            annotations: annotations.to_vec(),
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnnotationKind, Point, Style};
    use std::sync::atomic::{AtomicU32, Ordering};

    static DIR_SEQ: AtomicU32 = AtomicU32::new(0);

    fn scratch_dir() -> PathBuf {
        let seq = DIR_SEQ.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!(
            "facemark-store-{}-{seq}",
            std::process::id()
        ))
    }

    fn sample_annotation(id: u64, layer_id: u64) -> Annotation {
        Annotation::new(
            id,
            layer_id,
            ViewAngle::Frontal,
            AnnotationKind::measurement_from_drag(Point::new(0.0, 0.0), Point::new(3.0, 4.0)),
            Style::default(),
        )
    }

    #[test]
    fn json_store_round_trips_layers_and_annotations() {
        let dir = scratch_dir();
        let mut store = JsonFileStore::new(&dir);
        let layer = Layer {
            id: 1,
            name: "Base".into(),
            order: 0,
            visible: true,
            locked: false,
        };
        store.create_layer("eval-1", &layer).unwrap();
        store
            .create_annotation("eval-1", &sample_annotation(1, 1))
            .unwrap();

        assert_eq!(store.load_layers("eval-1").unwrap(), vec![layer]);
        let loaded = store
            .load_annotations("eval-1", Some(ViewAngle::Frontal))
            .unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(
            store
                .load_annotations("eval-1", Some(ViewAngle::Superior))
                .unwrap()
                .is_empty()
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn updating_an_annotation_replaces_the_stored_row() {
        let dir = scratch_dir();
        let mut store = JsonFileStore::new(&dir);
        let layer = Layer {
            id: 1,
            name: "Base".into(),
            order: 0,
            visible: true,
            locked: false,
        };
        store.create_layer("eval-1", &layer).unwrap();
        let mut annotation = sample_annotation(1, 1);
        store.create_annotation("eval-1", &annotation).unwrap();

        annotation.style.thickness = 7.0;
        annotation.touch();
        store.update_annotation("eval-1", &annotation).unwrap();

        let loaded = store.load_annotations("eval-1", None).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].style.thickness, 7.0);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn json_store_missing_file_reads_as_empty() {
        let dir = scratch_dir();
        let mut store = JsonFileStore::new(&dir);
        assert!(store.load_layers("nobody").unwrap().is_empty());
        assert!(store.load_annotations("nobody", None).unwrap().is_empty());
    }

    #[test]
    fn deleting_a_layer_cascades_in_the_document() {
        let dir = scratch_dir();
        let mut store = JsonFileStore::new(&dir);
        let layer = Layer {
            id: 1,
            name: "Base".into(),
            order: 0,
            visible: true,
            locked: false,
        };
        store.create_layer("eval-1", &layer).unwrap();
        store
            .create_annotation("eval-1", &sample_annotation(1, 1))
            .unwrap();
        store
            .create_annotation("eval-1", &sample_annotation(2, 1))
            .unwrap();

        store.delete_layer("eval-1", 1).unwrap();
        assert!(store.load_layers("eval-1").unwrap().is_empty());
        assert!(store.load_annotations("eval-1", None).unwrap().is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn audit_events_append_as_json_lines() {
        let dir = scratch_dir();
        let mut store = JsonFileStore::new(&dir);
        for id in 1..=2 {
            let event = AuditEvent::new(
                "eval-1",
                AuditAction::Create,
                AuditEntity::Annotation,
                id,
                None,
                Some(serde_json::json!({ "id": id })),
            );
            store.append_audit_event(&event).unwrap();
        }
        let lines = std::fs::read_to_string(store.audit_path("eval-1")).unwrap();
        assert_eq!(lines.lines().count(), 2);
        let first: AuditEvent = serde_json::from_str(lines.lines().next().unwrap()).unwrap();
        assert_eq!(first.entity_id, 1);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn evaluation_id_is_sanitized_for_paths() {
        assert_eq!(sanitize_id("eval/7"), "eval_7");
        assert_eq!(sanitize_id("a b/c"), "a_b_c");
    }
}
