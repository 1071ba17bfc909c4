use std::path::PathBuf;

use chrono::Utc;
use eframe::egui;
use workflow_canvas::controller::{AppController, NotificationLevel};
use workflow_canvas::document::PersistedFullWorkflow;
use workflow_canvas::editor::CanvasEditor;
use workflow_canvas::graph::NODE_GROUP;
use workflow_canvas::settings::{
    AppSettings, EdgeType, Precision, PreviewMode, SETTINGS_FILE, SelectionMode,
};
use workflow_canvas::storage::JsonDirStore;
use workflow_canvas::widgets::{WidgetCatalog, replacement_suggestions};

fn main() -> eframe::Result<()> {
    env_logger::init();
    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([1280.0, 800.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Workflow Canvas",
        native_options,
        Box::new(|_cc| Ok(Box::new(WorkflowApp::new()?))),
    )
}

struct WorkflowApp {
    controller: AppController,
    editor: CanvasEditor,
    settings: AppSettings,
    settings_path: PathBuf,
    show_load_window: bool,
    show_nodes_window: bool,
    show_settings_window: bool,
    nodes_search_filter: String,
    title_edit: String,
    /// Documents shown in the load window, refreshed when it opens.
    documents: Vec<PersistedFullWorkflow>,
}

fn settings_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("workflow_canvas"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(SETTINGS_FILE)
}

impl WorkflowApp {
    fn new() -> anyhow::Result<Self> {
        let settings_path = settings_path();
        let settings = AppSettings::load_or_default(&settings_path);
        let store = JsonDirStore::open(settings.documents_dir())?;
        log::info!("Documents stored in {}", store.dir().display());

        let mut controller = AppController::new(
            Box::new(store),
            WidgetCatalog::builtin(),
            settings.history_max_records,
        );
        controller.open_or_create(settings.last_document_id.as_deref())?;

        let mut app = Self {
            title_edit: controller
                .document()
                .current()
                .map(|d| d.title.clone())
                .unwrap_or_default(),
            controller,
            editor: CanvasEditor::default(),
            settings,
            settings_path,
            show_load_window: false,
            show_nodes_window: true,
            show_settings_window: false,
            nodes_search_filter: String::new(),
            documents: Vec::new(),
        };
        app.remember_document();
        Ok(app)
    }

    /// Store the open document id so the next launch reopens it.
    fn remember_document(&mut self) {
        let id = self.controller.document().id().map(str::to_string);
        if id == self.settings.last_document_id {
            return;
        }
        self.settings.last_document_id = id;
        self.save_settings();
    }

    fn save_settings(&mut self) {
        if let Some(dir) = self.settings_path.parent() {
            if let Err(e) = std::fs::create_dir_all(dir) {
                log::warn!("Failed to create settings directory: {}", e);
            }
        }
        if let Err(e) = self.settings.save(&self.settings_path) {
            log::error!("Failed to save settings: {:#}", e);
        }
    }

    fn sync_title(&mut self) {
        self.title_edit = self
            .controller
            .document()
            .current()
            .map(|d| d.title.clone())
            .unwrap_or_default();
    }

    fn top_panel(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                let title =
                    ui.add(egui::TextEdit::singleline(&mut self.title_edit).desired_width(180.0));
                if title.lost_focus() {
                    let current = self.controller.document().current().map(|d| d.title.clone());
                    if current.as_deref() != Some(self.title_edit.as_str()) {
                        self.controller.rename_document(&self.title_edit);
                    }
                }
                ui.separator();
                if ui.button("New").clicked() {
                    if let Err(e) = self.controller.new_document("Untitled") {
                        log::error!("Failed to create document: {:#}", e);
                    }
                    self.sync_title();
                    self.remember_document();
                }
                if ui.button("Open…").clicked() {
                    self.show_load_window = true;
                    match self.controller.list_documents() {
                        Ok(docs) => self.documents = docs,
                        Err(e) => log::error!("Failed to list documents: {:#}", e),
                    }
                }
                if ui.button("Save").clicked() {
                    if let Err(e) = self.controller.save() {
                        log::error!("Failed to save workflow: {:#}", e);
                    }
                }
                if ui.button("Delete").clicked() {
                    if let Err(e) = self.controller.delete_document() {
                        log::error!("Failed to delete document: {:#}", e);
                    }
                    self.sync_title();
                    self.remember_document();
                }
                ui.separator();
                if ui
                    .add_enabled(self.controller.can_undo(), egui::Button::new("Undo"))
                    .clicked()
                {
                    self.controller.undo();
                }
                if ui
                    .add_enabled(self.controller.can_redo(), egui::Button::new("Redo"))
                    .clicked()
                {
                    self.controller.redo();
                }
                if ui.button("Group selection").clicked() {
                    self.controller.create_group("Group");
                }
                ui.separator();

                let mut changed = false;
                egui::ComboBox::from_label("Edges")
                    .selected_text(format!("{:?}", self.settings.edge_type))
                    .show_ui(ui, |ui| {
                        for edge_type in [EdgeType::Bezier, EdgeType::Step, EdgeType::Straight] {
                            let label = format!("{:?}", edge_type);
                            changed |= ui
                                .selectable_value(&mut self.settings.edge_type, edge_type, label)
                                .changed();
                        }
                    });
                egui::ComboBox::from_label("Selection")
                    .selected_text(format!("{:?}", self.settings.selection_mode))
                    .show_ui(ui, |ui| {
                        for mode in [SelectionMode::Default, SelectionMode::Figma] {
                            let label = format!("{:?}", mode);
                            changed |= ui
                                .selectable_value(&mut self.settings.selection_mode, mode, label)
                                .changed();
                        }
                    });
                if changed {
                    self.save_settings();
                }
                ui.checkbox(&mut self.show_nodes_window, "Widgets");
                if ui.button("Settings").clicked() {
                    self.show_settings_window = true;
                }
                ui.label(format!("Zoom {:.0}%", self.editor.transform.zoom * 100.0));
            });
        });
    }

    fn load_window(&mut self, ctx: &egui::Context) {
        let mut open = self.show_load_window;
        let mut picked = None;
        egui::Window::new("Open Workflow").open(&mut open).show(ctx, |ui| {
            if self.documents.is_empty() {
                ui.weak("No saved workflows");
            }
            for doc in &self.documents {
                let edited = chrono::DateTime::from_timestamp_millis(doc.last_edit_time)
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                ui.horizontal(|ui| {
                    if ui.button(&doc.title).clicked() {
                        picked = Some(doc.id.clone());
                    }
                    ui.weak(edited);
                });
            }
        });
        if let Some(id) = picked {
            match self.controller.load_document(&id) {
                Ok(true) => {
                    open = false;
                    self.sync_title();
                    self.remember_document();
                }
                Ok(false) => {
                    // Deleted from another window; drop it from the list.
                    self.documents.retain(|d| d.id != id);
                }
                Err(e) => log::error!("Failed to open workflow: {:#}", e),
            }
        }
        self.show_load_window = open;
    }

    fn settings_window(&mut self, ctx: &egui::Context) {
        let mut changed = false;
        let run = &mut self.settings.run_config;
        egui::Window::new("Settings")
            .open(&mut self.show_settings_window)
            .resizable(false)
            .show(ctx, |ui| {
                egui::Grid::new("settings_grid").num_columns(2).show(ui, |ui| {
                    ui.label("Undo steps");
                    changed |= ui
                        .add(
                            egui::DragValue::new(&mut self.settings.history_max_records)
                                .range(1..=500),
                        )
                        .on_hover_text("Applies after a restart")
                        .changed();
                    ui.end_row();

                    let precisions = [
                        ("Model precision", &mut run.fp_mode),
                        ("VAE precision", &mut run.vae_mode),
                    ];
                    for (label, value) in precisions {
                        ui.label(label);
                        egui::ComboBox::from_id_salt(label)
                            .selected_text(format!("{:?}", value))
                            .show_ui(ui, |ui| {
                                for mode in [Precision::Normal, Precision::Fp16, Precision::Fp32] {
                                    let text = format!("{:?}", mode);
                                    changed |=
                                        ui.selectable_value(&mut *value, mode, text).changed();
                                }
                            });
                        ui.end_row();
                    }

                    ui.label("Preview");
                    egui::ComboBox::from_id_salt("preview_mode")
                        .selected_text(format!("{:?}", run.preview_mode))
                        .show_ui(ui, |ui| {
                            let modes = [
                                PreviewMode::None,
                                PreviewMode::Auto,
                                PreviewMode::Latent2Rgb,
                                PreviewMode::Taesd,
                            ];
                            for mode in modes {
                                let text = format!("{:?}", mode);
                                let current = &mut run.preview_mode;
                                changed |= ui.selectable_value(current, mode, text).changed();
                            }
                        });
                    ui.end_row();

                    ui.label("Extra arguments");
                    changed |= ui.text_edit_singleline(&mut run.extra_command).lost_focus();
                    ui.end_row();
                });
                ui.separator();
                ui.weak(run.launch_args().join(" "));
            });
        if changed {
            self.save_settings();
        }
    }

    fn nodes_window(&mut self, ctx: &egui::Context) {
        let mut add = None;
        egui::Window::new("Widgets")
            .open(&mut self.show_nodes_window)
            .resizable(true)
            .default_width(200.0)
            .anchor(egui::Align2::RIGHT_TOP, egui::vec2(-10.0, 40.0))
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.label("🔍");
                    ui.text_edit_singleline(&mut self.nodes_search_filter);
                });
                ui.separator();
                let filter = self.nodes_search_filter.to_lowercase();
                egui::ScrollArea::vertical().show(ui, |ui| {
                    if ui.button(NODE_GROUP).clicked() {
                        add = Some(NODE_GROUP.to_string());
                    }
                    for widget in self
                        .controller
                        .catalog()
                        .iter()
                        .filter(|w| w.name.to_lowercase().contains(&filter))
                    {
                        if ui
                            .button(&widget.display_name)
                            .on_hover_text(&widget.category)
                            .clicked()
                        {
                            add = Some(widget.name.clone());
                        }
                    }
                });
            });
        if let Some(widget) = add {
            let pos = self.editor.view_center();
            self.controller.on_add_node(&widget, pos);
        }
    }

    /// Offer replacements for widgets the catalog does not know.
    fn missing_widgets_panel(&mut self, ctx: &egui::Context) {
        let missing = self.controller.missing_widgets();
        if missing.is_empty() {
            return;
        }
        let mut replace = None;
        egui::TopBottomPanel::bottom("missing_widgets").show(ctx, |ui| {
            ui.label("This workflow uses widgets that are not installed:");
            for (name, nodes) in &missing {
                ui.horizontal(|ui| {
                    ui.label(format!("{} ({} nodes)", name, nodes.len()));
                    for candidate in replacement_suggestions(name, self.controller.catalog())
                        .into_iter()
                        .take(3)
                    {
                        if ui.button(format!("Use {}", candidate.name)).clicked() {
                            replace = Some((name.clone(), candidate.name.clone()));
                        }
                    }
                });
            }
        });
        if let Some((missing, replacement)) = replace {
            self.controller.replace_missing_widget(&missing, &replacement);
        }
    }

    fn notifications(&mut self, ctx: &egui::Context) {
        self.controller.expire_notifications(Utc::now());
        let mut dismiss = None;
        egui::Area::new(egui::Id::new("notifications"))
            .anchor(egui::Align2::LEFT_BOTTOM, egui::vec2(10.0, -10.0))
            .show(ctx, |ui| {
                for (index, note) in self.controller.notifications().iter().enumerate() {
                    let color = match note.level {
                        NotificationLevel::Info => egui::Color32::LIGHT_BLUE,
                        NotificationLevel::Error => egui::Color32::LIGHT_RED,
                    };
                    egui::Frame::popup(ui.style()).show(ui, |ui| {
                        ui.horizontal(|ui| {
                            ui.colored_label(color, &note.message);
                            if ui.small_button("✕").clicked() {
                                dismiss = Some(index);
                            }
                        });
                    });
                }
            });
        if let Some(index) = dismiss {
            self.controller.dismiss_notification(index);
        }
        if !self.controller.notifications().is_empty() {
            ctx.request_repaint_after(std::time::Duration::from_millis(500));
        }
    }
}

impl eframe::App for WorkflowApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        for event in self.controller.poll_document_events(Utc::now()) {
            log::debug!("Document event: {:?}", event);
        }
        // Another window may edit the same document; look again shortly.
        ctx.request_repaint_after(std::time::Duration::from_secs(2));

        self.top_panel(ctx);
        self.missing_widgets_panel(ctx);
        self.load_window(ctx);
        self.settings_window(ctx);
        self.nodes_window(ctx);

        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                self.editor.show(
                    ui,
                    &mut self.controller,
                    self.settings.edge_type,
                    self.settings.selection_mode,
                );
            });

        self.notifications(ctx);
    }
}
