use eframe::egui;

use crate::model::{DEFAULT_FONT_SIZE, ViewAngle};
use crate::session::{Commit, Tool};

use super::EvaluationApp;
use super::render::{
    draw_annotations, draw_background, draw_in_progress, draw_photo, draw_placeholder,
    style_editor, tool_button,
};

impl eframe::App for EvaluationApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let wants_keyboard = ctx.wants_keyboard_input();
        let prompt_open = self.session.pending_text_anchor().is_some();
        let mut open_photo = false;

        ctx.input_mut(|i| {
            if i.consume_key(egui::Modifiers::COMMAND, egui::Key::S) {
                self.save_evaluation();
            }
            if i.consume_key(egui::Modifiers::COMMAND, egui::Key::E) {
                self.export_png_dialog();
            }
            if i.consume_key(egui::Modifiers::COMMAND, egui::Key::O) {
                open_photo = true;
            }

            let skip_shortcuts = wants_keyboard || prompt_open;
            if !skip_shortcuts {
                if i.consume_key(
                    egui::Modifiers::COMMAND | egui::Modifiers::SHIFT,
                    egui::Key::Z,
                ) || i.consume_key(egui::Modifiers::COMMAND, egui::Key::Y)
                {
                    self.session.redo();
                } else if i.consume_key(egui::Modifiers::COMMAND, egui::Key::Z) {
                    self.session.undo();
                }
                if i.consume_key(egui::Modifiers::NONE, egui::Key::Escape) {
                    self.session.abandon_gesture();
                    self.session.set_tool(Tool::Pointer);
                    self.tool_before_pan = None;
                }
                if i.consume_key(egui::Modifiers::NONE, egui::Key::Plus)
                    || i.consume_key(egui::Modifiers::NONE, egui::Key::Equals)
                {
                    self.view_mut().zoom_in();
                }
                if i.consume_key(egui::Modifiers::NONE, egui::Key::Minus) {
                    self.view_mut().zoom_out();
                }
                if i.consume_key(egui::Modifiers::NONE, egui::Key::V) {
                    self.session.set_tool(Tool::Pointer);
                }
                if i.consume_key(egui::Modifiers::NONE, egui::Key::P) {
                    self.session.set_tool(Tool::Freehand);
                }
                if i.consume_key(egui::Modifiers::NONE, egui::Key::L) {
                    self.session.set_tool(Tool::Line);
                }
                if i.consume_key(egui::Modifiers::NONE, egui::Key::A) {
                    self.session.set_tool(Tool::Arrow);
                }
                if i.consume_key(egui::Modifiers::NONE, egui::Key::O) {
                    self.session.set_tool(Tool::Circle);
                }
                if i.consume_key(egui::Modifiers::NONE, egui::Key::M) {
                    self.session.set_tool(Tool::Measurement);
                }
                if i.consume_key(egui::Modifiers::NONE, egui::Key::T) {
                    self.session.set_tool(Tool::Text);
                }
                if i.consume_key(egui::Modifiers::NONE, egui::Key::E) {
                    self.session.set_tool(Tool::Eraser);
                }
            }
        });
        if open_photo {
            self.load_photo_dialog(ctx);
        }

        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("File", |ui| {
                    ui.label("Evaluation:");
                    ui.label(self.session.evaluation_id());
                    ui.separator();
                    if ui.button("Load Photo... (⌘O)").clicked() {
                        self.load_photo_dialog(ctx);
                        ui.close_menu();
                    }
                    if ui.button("Save (⌘S)").clicked() {
                        self.save_evaluation();
                        ui.close_menu();
                    }
                    if ui.button("Export PNG... (⌘E)").clicked() {
                        self.export_png_dialog();
                        ui.close_menu();
                    }
                });
                ui.menu_button("Edit", |ui| {
                    if ui
                        .add_enabled(self.session.can_undo(), egui::Button::new("Undo (⌘Z)"))
                        .clicked()
                    {
                        self.session.undo();
                        ui.close_menu();
                    }
                    if ui
                        .add_enabled(self.session.can_redo(), egui::Button::new("Redo (⌘⇧Z)"))
                        .clicked()
                    {
                        self.session.redo();
                        ui.close_menu();
                    }
                    ui.separator();
                    if ui.button("Clear View").clicked() {
                        let cleared = self.session.clear_view();
                        self.status = Some(format!("Cleared {cleared} annotation(s)"));
                        ui.close_menu();
                    }
                });
                ui.menu_button("View", |ui| {
                    if ui.button("Zoom In (+)").clicked() {
                        self.view_mut().zoom_in();
                        ui.close_menu();
                    }
                    if ui.button("Zoom Out (-)").clicked() {
                        self.view_mut().zoom_out();
                        ui.close_menu();
                    }
                    if ui.button("Reset View").clicked() {
                        self.view_mut().reset();
                        ui.close_menu();
                    }
                    if ui.button("Fit to Window").clicked() {
                        self.fit_to_window();
                        ui.close_menu();
                    }
                });
                ui.separator();

                let current = self.session.tool();
                let mut picked = None;
                for (label, tool) in [
                    ("V", Tool::Pointer),
                    ("✎", Tool::Freehand),
                    ("L", Tool::Line),
                    ("→", Tool::Arrow),
                    ("○", Tool::Circle),
                    ("M", Tool::Measurement),
                    ("T", Tool::Text),
                    ("⌫", Tool::Eraser),
                ] {
                    if let Some(t) = tool_button(ui, label, tool, current) {
                        picked = Some(t);
                    }
                }
                if let Some(tool) = picked {
                    self.session.set_tool(tool);
                }
                ui.separator();

                let mut angle = self.session.current_angle();
                egui::ComboBox::from_id_salt("view_angle")
                    .selected_text(angle.label())
                    .show_ui(ui, |ui| {
                        for a in ViewAngle::ALL {
                            ui.selectable_value(&mut angle, a, a.label());
                        }
                    });
                if angle != self.session.current_angle() {
                    self.session.set_angle(angle);
                    self.status = None;
                }
            });
        });

        egui::SidePanel::right("side_panel")
            .resizable(true)
            .min_width(220.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    ui.heading("Pen");
                    ui.separator();
                    if style_editor(ui, &mut self.session.pen) {
                        self.persist_settings();
                    }
                    ui.separator();

                    ui.heading("Layers");
                    ui.separator();
                    let layers = self.session.layers().layers().to_vec();
                    let active = self.session.layers().active_id();
                    // Topmost layer first, matching paint order on screen.
                    for layer in layers.iter().rev() {
                        ui.horizontal(|ui| {
                            let eye = if layer.visible { "👁" } else { "–" };
                            if ui
                                .small_button(eye)
                                .on_hover_text("Toggle visibility")
                                .clicked()
                            {
                                self.session.toggle_layer_visibility(layer.id);
                            }
                            let lock = if layer.locked { "🔒" } else { "🔓" };
                            if ui.small_button(lock).on_hover_text("Toggle lock").clicked() {
                                self.session.toggle_layer_lock(layer.id);
                            }
                            let selected = active == Some(layer.id);
                            if ui.selectable_label(selected, &layer.name).clicked() {
                                self.session.set_active_layer(layer.id);
                                self.rename_buffer = layer.name.clone();
                            }
                        });
                    }
                    ui.horizontal(|ui| {
                        if let Some(active) = active {
                            if ui.button("▲").clicked() {
                                self.session.move_layer_by(active, 1);
                            }
                            if ui.button("▼").clicked() {
                                self.session.move_layer_by(active, -1);
                            }
                            if ui.button("Delete").clicked() {
                                self.session.delete_layer(active);
                            }
                        }
                    });
                    ui.horizontal(|ui| {
                        ui.text_edit_singleline(&mut self.rename_buffer);
                        if ui.button("Rename").clicked() {
                            if let Some(active) = active {
                                let name = self.rename_buffer.clone();
                                if !self.session.rename_layer(active, &name) {
                                    self.status = Some("Layer name cannot be empty".to_string());
                                }
                            }
                        }
                    });
                    ui.separator();
                    ui.horizontal(|ui| {
                        ui.text_edit_singleline(&mut self.new_layer_name);
                        if ui.button("Add layer").clicked() {
                            let name = self.new_layer_name.trim().to_string();
                            if self.session.create_layer(&name).is_some() {
                                self.new_layer_name.clear();
                            } else {
                                self.status = Some("Layer name cannot be empty".to_string());
                            }
                        }
                    });
                });
            });

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if let Some(status) = &self.status {
                    ui.label(status);
                } else {
                    ui.label("Ready");
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.label(format!("Zoom: {:.0}%", self.view().zoom * 100.0));
                    ui.separator();
                    ui.label(format!("Marks: {}", self.session.count_for_angle()));
                    ui.separator();
                    if self.session.sync.is_healthy() {
                        ui.label("Synced");
                    } else {
                        ui.colored_label(
                            egui::Color32::from_rgb(200, 80, 60),
                            format!("{} failed write(s)", self.session.sync.failed_writes),
                        )
                        .on_hover_text(
                            self.session
                                .sync
                                .last_error
                                .clone()
                                .unwrap_or_default(),
                        );
                    }
                });
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            let (rect, response) =
                ui.allocate_exact_size(ui.available_size(), egui::Sense::click_and_drag());
            let origin = rect.min;
            self.last_canvas_size = rect.size();

            let space_down =
                ctx.input(|i| i.key_down(egui::Key::Space)) && !ctx.wants_keyboard_input();
            if space_down {
                if self.tool_before_pan.is_none() {
                    self.tool_before_pan = Some(self.session.tool());
                    self.session.set_tool(Tool::Pointer);
                }
            } else if let Some(prev) = self.tool_before_pan.take() {
                if self.session.tool() == Tool::Pointer {
                    self.session.set_tool(prev);
                }
            }

            let scroll_delta = ctx.input(|i| i.raw_scroll_delta.y);
            if scroll_delta.abs() > 0.0 {
                if let Some(hover_pos) = ctx.input(|i| i.pointer.hover_pos()) {
                    if rect.contains(hover_pos) {
                        if scroll_delta > 0.0 {
                            self.view_mut().zoom_in();
                        } else {
                            self.view_mut().zoom_out();
                        }
                    }
                }
            }

            let view = *self.view();
            let pointer_pos = ctx.input(|i| i.pointer.interact_pos());
            let pointer_image = pointer_pos.map(|p| view.to_image(origin, p));
            let tolerance = 6.0 / view.zoom;

            if self.session.tool() == Tool::Pointer && response.dragged() {
                self.view_mut().pan_by_screen_delta(response.drag_delta());
            }

            let pressed = response.drag_started() || response.clicked();
            let released = response.drag_stopped() || response.clicked();

            if pressed {
                if let Some(p) = pointer_image {
                    if self.session.tool() != Tool::Pointer {
                        if let Err(notice) = self.session.pointer_down(p, tolerance) {
                            self.status = Some(notice);
                        }
                    }
                }
            }
            if response.dragged() {
                if let Some(p) = pointer_image {
                    self.session.pointer_move(p);
                }
            }
            if released {
                if let Some(p) = pointer_image {
                    match self.session.pointer_up(p) {
                        Commit::Annotation(_) => self.status = None,
                        Commit::TextPrompt(_) => self.text_input.clear(),
                        Commit::None => {}
                    }
                }
            }

            let painter = ui.painter_at(rect);
            draw_background(&painter, rect);
            if let Some(photo) = self.photo() {
                draw_photo(&painter, origin, &view, photo);
            } else {
                draw_placeholder(&painter, rect, self.session.current_angle());
            }
            draw_annotations(&painter, origin, &view, &self.session.visible());
            if let Some((start, current, points)) = self.session.gesture_preview() {
                draw_in_progress(
                    &painter,
                    origin,
                    &view,
                    self.session.tool(),
                    &self.session.pen,
                    start,
                    current,
                    points,
                );
            }

            match self.session.tool() {
                Tool::Pointer => ctx.set_cursor_icon(egui::CursorIcon::Grab),
                Tool::Eraser => ctx.set_cursor_icon(egui::CursorIcon::PointingHand),
                _ => ctx.set_cursor_icon(egui::CursorIcon::Crosshair),
            }
        });

        if self.session.pending_text_anchor().is_some() {
            let mut submit = false;
            let mut cancel = false;
            egui::Window::new("Annotation text")
                .collapsible(false)
                .resizable(false)
                .show(ctx, |ui| {
                    let response = ui.text_edit_singleline(&mut self.text_input);
                    response.request_focus();
                    if response.lost_focus() && ctx.input(|i| i.key_pressed(egui::Key::Enter)) {
                        submit = true;
                    }
                    ui.horizontal(|ui| {
                        if ui.button("Add").clicked() {
                            submit = true;
                        }
                        if ui.button("Cancel").clicked() {
                            cancel = true;
                        }
                    });
                });
            if cancel || ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
                self.session.cancel_text();
                self.text_input.clear();
            } else if submit {
                let text = self.text_input.clone();
                match self.session.commit_text(&text, DEFAULT_FONT_SIZE) {
                    Ok(Commit::None) if !text.trim().is_empty() => {
                        self.status = Some("Text annotation not created".to_string());
                    }
                    Ok(_) => {}
                    Err(notice) => self.status = Some(notice),
                }
                self.text_input.clear();
            }
        }
    }
}
