use crate::history::History;
use crate::layers::{Layer, LayerRegistry};
use crate::model::{Annotation, AnnotationKind, Point, Style, ViewAngle};
use crate::store::{AuditAction, AuditEntity, AuditEvent, EvaluationStore, SyncStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tool {
    Pointer,
    Line,
    Arrow,
    Circle,
    Measurement,
    Text,
    Freehand,
    Eraser,
}

impl Tool {
    pub fn label(self) -> &'static str {
        match self {
            Tool::Pointer => "Pointer",
            Tool::Line => "Line",
            Tool::Arrow => "Arrow",
            Tool::Circle => "Circle",
            Tool::Measurement => "Measure",
            Tool::Text => "Text",
            Tool::Freehand => "Freehand",
            Tool::Eraser => "Eraser",
        }
    }
}

/// In-progress gesture. One per pointer-down; dropped without commit when a
/// tool change or view switch interrupts it.
#[derive(Clone, Debug, PartialEq)]
enum Gesture {
    Drag { start: Point, current: Point },
    Stroke { points: Vec<Point> },
}

/// What a pointer-up produced.
#[derive(Clone, Debug, PartialEq)]
pub enum Commit {
    None,
    Annotation(u64),
    /// Text needs a value before anything is created; the host collects it
    /// and calls [`CanvasSession::commit_text`].
    TextPrompt(Point),
}

/// The interactive canvas for one evaluation: annotations, layers, history,
/// the current pen, and the gesture state machine. UI-free; the egui shell
/// feeds it image-space points.
pub struct CanvasSession<S: EvaluationStore> {
    evaluation_id: String,
    store: S,
    pub sync: SyncStatus,
    layers: LayerRegistry,
    annotations: Vec<Annotation>,
    history: History<Vec<Annotation>>,
    next_annotation_id: u64,
    tool: Tool,
    pub pen: Style,
    current_angle: ViewAngle,
    gesture: Option<Gesture>,
    pending_text: Option<Point>,
}

impl<S: EvaluationStore> CanvasSession<S> {
    pub fn new(evaluation_id: &str, mut store: S, max_history: usize) -> Self {
        let mut sync = SyncStatus::default();
        let loaded_layers = match store.load_layers(evaluation_id) {
            Ok(layers) => layers,
            Err(err) => {
                // Empty reads are "nothing yet", a failed read is logged and
                // still starts an empty session.
                sync.record_failure("load layers", &err);
                Vec::new()
            }
        };
        let mut layers = LayerRegistry::from_loaded(loaded_layers);
        if let Some(created) = layers.ensure_default() {
            if let Err(err) = store.create_layer(evaluation_id, &created) {
                sync.record_failure("create default layer", &err);
            }
        }

        let mut annotations = match store.load_annotations(evaluation_id, None) {
            Ok(annotations) => annotations,
            Err(err) => {
                sync.record_failure("load annotations", &err);
                Vec::new()
            }
        };
        // Boundary invariant: an annotation without an owning layer is
        // invalid and never enters the session.
        annotations.retain(|a| {
            let known = layers.get(a.layer_id).is_some();
            if !known {
                log::warn!(
                    "dropping annotation {} referencing missing layer {}",
                    a.id,
                    a.layer_id
                );
            }
            known
        });
        let next_annotation_id = annotations.iter().map(|a| a.id).max().unwrap_or(0) + 1;
        let history = History::with_max_depth(annotations.clone(), max_history);

        Self {
            evaluation_id: evaluation_id.to_string(),
            store,
            sync,
            layers,
            annotations,
            history,
            next_annotation_id,
            tool: Tool::Freehand,
            pen: Style::default(),
            current_angle: ViewAngle::Frontal,
            gesture: None,
            pending_text: None,
        }
    }

    pub fn evaluation_id(&self) -> &str {
        &self.evaluation_id
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    /// Selecting a tool abandons any in-progress gesture without commit.
    pub fn set_tool(&mut self, tool: Tool) {
        if self.tool != tool {
            self.gesture = None;
            self.pending_text = None;
        }
        self.tool = tool;
    }

    pub fn current_angle(&self) -> ViewAngle {
        self.current_angle
    }

    /// Switching the photographed angle swaps the whole canvas context;
    /// a gesture cannot survive it.
    pub fn set_angle(&mut self, angle: ViewAngle) {
        if self.current_angle != angle {
            self.gesture = None;
            self.pending_text = None;
        }
        self.current_angle = angle;
    }

    pub fn layers(&self) -> &LayerRegistry {
        &self.layers
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn is_drawing(&self) -> bool {
        self.gesture.is_some()
    }

    pub fn pending_text_anchor(&self) -> Option<Point> {
        self.pending_text
    }

    /// Preview points of the in-progress gesture, for the render pass.
    pub fn gesture_preview(&self) -> Option<(Point, Point, Option<&[Point]>)> {
        match self.gesture.as_ref()? {
            Gesture::Drag { start, current } => Some((*start, *current, None)),
            Gesture::Stroke { points } => {
                let first = *points.first()?;
                let last = *points.last()?;
                Some((first, last, Some(points.as_slice())))
            }
        }
    }

    /// The annotations that actually render: owning layer visible, angle
    /// matching, ascending layer order, creation order within a layer.
    pub fn visible(&self) -> Vec<&Annotation> {
        let mut visible: Vec<&Annotation> = self
            .annotations
            .iter()
            .filter(|a| a.view_angle == self.current_angle)
            .filter(|a| self.layers.get(a.layer_id).is_some_and(|l| l.visible))
            .collect();
        visible.sort_by_key(|a| self.layers.get(a.layer_id).map_or(0, |l| l.order));
        visible
    }

    /// Every annotation of the current view angle, hidden layers included.
    pub fn count_for_angle(&self) -> usize {
        self.annotations
            .iter()
            .filter(|a| a.view_angle == self.current_angle)
            .count()
    }

    // ---- gesture protocol ----------------------------------------------

    /// Idle → Drawing. Guarded: refuses with a user-facing notice when no
    /// layer is active or the active layer is locked; model state and the
    /// store are untouched by a refusal.
    pub fn pointer_down(&mut self, p: Point, tolerance: f32) -> Result<Commit, String> {
        match self.tool {
            Tool::Pointer => Ok(Commit::None),
            Tool::Eraser => self.erase_at(p, tolerance),
            _ => {
                self.guard_active_layer()?;
                self.gesture = Some(match self.tool {
                    Tool::Freehand => Gesture::Stroke { points: vec![p] },
                    _ => Gesture::Drag {
                        start: p,
                        current: p,
                    },
                });
                Ok(Commit::None)
            }
        }
    }

    pub fn pointer_move(&mut self, p: Point) {
        match &mut self.gesture {
            Some(Gesture::Drag { current, .. }) => *current = p,
            Some(Gesture::Stroke { points }) => {
                // Move events repeat positions; only genuinely new points
                // extend the stroke.
                if points.last() != Some(&p) {
                    points.push(p);
                }
            }
            None => {}
        }
    }

    /// Drawing → Idle. Finalizes the payload per tool.
    pub fn pointer_up(&mut self, p: Point) -> Commit {
        let Some(gesture) = self.gesture.take() else {
            return Commit::None;
        };
        match (self.tool, gesture) {
            (Tool::Line, Gesture::Drag { start, .. }) => {
                // Zero-length is a valid, if degenerate, line.
                self.commit(AnnotationKind::Line { start, end: p })
            }
            (Tool::Arrow, Gesture::Drag { start, .. }) => {
                self.commit(AnnotationKind::Arrow { start, end: p })
            }
            (Tool::Circle, Gesture::Drag { start, .. }) => {
                self.commit(AnnotationKind::circle_from_drag(start, p))
            }
            (Tool::Measurement, Gesture::Drag { start, .. }) => {
                self.commit(AnnotationKind::measurement_from_drag(start, p))
            }
            (Tool::Text, Gesture::Drag { start, .. }) => {
                self.pending_text = Some(start);
                Commit::TextPrompt(start)
            }
            (Tool::Freehand, Gesture::Stroke { mut points }) => {
                if points.last() != Some(&p) {
                    points.push(p);
                }
                if points.len() >= 2 {
                    self.commit(AnnotationKind::Freehand { points })
                } else {
                    Commit::None
                }
            }
            _ => Commit::None,
        }
    }

    /// Resolves a pending text prompt. Empty (after trim) or cancelled text
    /// creates nothing. The layer guard runs again here: the active layer
    /// may have been locked while the prompt was open.
    pub fn commit_text(&mut self, text: &str, font_size: f32) -> Result<Commit, String> {
        let Some(position) = self.pending_text.take() else {
            return Ok(Commit::None);
        };
        let text = text.trim();
        if text.is_empty() {
            return Ok(Commit::None);
        }
        self.guard_active_layer()?;
        Ok(self.commit(AnnotationKind::Text {
            position,
            text: text.to_string(),
            font_size,
        }))
    }

    pub fn cancel_text(&mut self) {
        self.pending_text = None;
    }

    pub fn abandon_gesture(&mut self) {
        self.gesture = None;
        self.pending_text = None;
    }

    fn guard_active_layer(&self) -> Result<&Layer, String> {
        let Some(layer) = self.layers.active() else {
            return Err("No active layer; create a layer first".to_string());
        };
        if layer.locked {
            return Err(format!("Layer \"{}\" is locked", layer.name));
        }
        Ok(layer)
    }

    /// Commit order mirrors the interactive contract: in-memory first, then
    /// best-effort persistence, then the history snapshot, then audit.
    fn commit(&mut self, kind: AnnotationKind) -> Commit {
        let Some(layer_id) = self.layers.active_id() else {
            return Commit::None;
        };
        let id = self.next_annotation_id;
        self.next_annotation_id += 1;
        let annotation = Annotation::new(id, layer_id, self.current_angle, kind, self.pen);
        self.annotations.push(annotation.clone());
        if let Err(err) = self.store.create_annotation(&self.evaluation_id, &annotation) {
            self.sync.record_failure("create annotation", &err);
        }
        self.history.push(self.annotations.clone());
        self.audit(
            AuditAction::Create,
            AuditEntity::Annotation,
            id,
            None,
            serde_json::to_value(&annotation).ok(),
        );
        Commit::Annotation(id)
    }

    fn erase_at(&mut self, p: Point, tolerance: f32) -> Result<Commit, String> {
        // Topmost first: reverse of paint order.
        let hit = self
            .visible()
            .iter()
            .rev()
            .find(|a| a.hit_test(p, tolerance))
            .map(|a| (a.id, a.layer_id));
        let Some((id, layer_id)) = hit else {
            return Ok(Commit::None);
        };
        if self.layers.get(layer_id).is_some_and(|l| l.locked) {
            let name = self.layers.get(layer_id).map_or_else(String::new, |l| l.name.clone());
            return Err(format!("Layer \"{name}\" is locked"));
        }
        let Some(idx) = self.annotations.iter().position(|a| a.id == id) else {
            return Ok(Commit::None);
        };
        let removed = self.annotations.remove(idx);
        if let Err(err) = self.store.delete_annotation(&self.evaluation_id, id) {
            self.sync.record_failure("delete annotation", &err);
        }
        self.history.push(self.annotations.clone());
        self.audit(
            AuditAction::Delete,
            AuditEntity::Annotation,
            id,
            serde_json::to_value(&removed).ok(),
            None,
        );
        Ok(Commit::Annotation(id))
    }

    // ---- history -------------------------------------------------------

    /// Client-side only: reverting never writes to the store. An explicit
    /// [`save`](Self::save) reconciles the persisted set.
    pub fn undo(&mut self) {
        self.annotations = self.history.undo().clone();
        self.gesture = None;
    }

    pub fn redo(&mut self) {
        self.annotations = self.history.redo().clone();
        self.gesture = None;
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // ---- commands ------------------------------------------------------

    /// Removes every annotation of the current view angle.
    pub fn clear_view(&mut self) -> usize {
        let cleared: Vec<Annotation> = self
            .annotations
            .iter()
            .filter(|a| a.view_angle == self.current_angle)
            .cloned()
            .collect();
        if cleared.is_empty() {
            return 0;
        }
        self.annotations
            .retain(|a| a.view_angle != self.current_angle);
        for annotation in &cleared {
            if let Err(err) = self
                .store
                .delete_annotation(&self.evaluation_id, annotation.id)
            {
                self.sync.record_failure("delete annotation", &err);
            }
            self.audit(
                AuditAction::Delete,
                AuditEntity::Annotation,
                annotation.id,
                serde_json::to_value(annotation).ok(),
                None,
            );
        }
        self.history.push(self.annotations.clone());
        cleared.len()
    }

    /// Rewrites the persisted sets wholesale so durable state matches what
    /// is on screen, undo included.
    pub fn save(&mut self) -> Result<(), String> {
        match self.store.save_all(
            &self.evaluation_id,
            self.layers.layers(),
            &self.annotations,
        ) {
            Ok(()) => {
                self.sync.clear();
                Ok(())
            }
            Err(err) => {
                self.sync.record_failure("save evaluation", &err);
                Err(format!("Save failed: {err:#}"))
            }
        }
    }

    // ---- layer operations (persisted best-effort) ----------------------

    pub fn create_layer(&mut self, name: &str) -> Option<Layer> {
        let layer = self.layers.create(name)?;
        if let Err(err) = self.store.create_layer(&self.evaluation_id, &layer) {
            self.sync.record_failure("create layer", &err);
        }
        self.audit(
            AuditAction::Create,
            AuditEntity::Layer,
            layer.id,
            None,
            serde_json::to_value(&layer).ok(),
        );
        Some(layer)
    }

    pub fn rename_layer(&mut self, id: u64, name: &str) -> bool {
        let before = self.layers.get(id).cloned();
        if !self.layers.rename(id, name) {
            return false;
        }
        self.persist_layer_update(id, before);
        true
    }

    pub fn toggle_layer_visibility(&mut self, id: u64) -> Option<bool> {
        let before = self.layers.get(id).cloned();
        let state = self.layers.toggle_visibility(id)?;
        self.persist_layer_update(id, before);
        Some(state)
    }

    /// Locked layers still render and stay toggleable; they only reject
    /// edits.
    pub fn toggle_layer_lock(&mut self, id: u64) -> Option<bool> {
        let before = self.layers.get(id).cloned();
        let state = self.layers.toggle_lock(id)?;
        self.persist_layer_update(id, before);
        Some(state)
    }

    pub fn set_active_layer(&mut self, id: u64) -> bool {
        self.layers.set_active(id)
    }

    pub fn move_layer_by(&mut self, id: u64, delta: i32) -> bool {
        if !self.layers.move_by(id, delta) {
            return false;
        }
        // Best-effort: both swapped rows get persisted.
        for layer in self.layers.layers().to_vec() {
            if let Err(err) = self.store.update_layer(&self.evaluation_id, &layer) {
                self.sync.record_failure("update layer", &err);
            }
        }
        true
    }

    /// Cascades: the layer's annotations are removed first, then the layer;
    /// the active layer reassigns to the first remaining one, or none.
    pub fn delete_layer(&mut self, id: u64) -> bool {
        let Some(removed) = self.layers.delete(id) else {
            return false;
        };
        let owned: Vec<Annotation> = self
            .annotations
            .iter()
            .filter(|a| a.layer_id == id)
            .cloned()
            .collect();
        self.annotations.retain(|a| a.layer_id != id);
        if let Err(err) = self.store.delete_layer(&self.evaluation_id, id) {
            self.sync.record_failure("delete layer", &err);
        }
        // History snapshots never reference a deleted layer. Earlier
        // snapshots can hold annotations of this layer even when none are
        // live right now.
        self.history
            .edit_all(|snapshot| snapshot.retain(|a| a.layer_id != id));
        for annotation in &owned {
            self.audit(
                AuditAction::Delete,
                AuditEntity::Annotation,
                annotation.id,
                serde_json::to_value(annotation).ok(),
                None,
            );
        }
        self.audit(
            AuditAction::Delete,
            AuditEntity::Layer,
            id,
            serde_json::to_value(&removed).ok(),
            None,
        );
        true
    }

    fn persist_layer_update(&mut self, id: u64, before: Option<Layer>) {
        let Some(layer) = self.layers.get(id).cloned() else {
            return;
        };
        if let Err(err) = self.store.update_layer(&self.evaluation_id, &layer) {
            self.sync.record_failure("update layer", &err);
        }
        self.audit(
            AuditAction::Update,
            AuditEntity::Layer,
            id,
            before.and_then(|b| serde_json::to_value(b).ok()),
            serde_json::to_value(&layer).ok(),
        );
    }

    fn audit(
        &mut self,
        action: AuditAction,
        entity: AuditEntity,
        entity_id: u64,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
    ) {
        let event = AuditEvent::new(
            &self.evaluation_id,
            action,
            entity,
            entity_id,
            before,
            after,
        );
        if let Err(err) = self.store.append_audit_event(&event) {
            // Fire-and-forget; a lost audit line never blocks the canvas.
            log::warn!("audit append failed: {err:#}");
        }
    }

    #[cfg(test)]
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }
}
