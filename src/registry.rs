/// Widget / group / page / dashboard / theme registry
///
/// Entities live in independent maps keyed by id (arena style); containment
/// is expressed as id references and views are rebuilt by query. Removal
/// cascades: a group with zero widgets is pruned, then a page with zero
/// groups. Dashboards and themes are never auto-pruned.
use crate::config::{HistoryConfig, TopicPolicy};
use crate::hooks::WidgetHandler;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Layout descriptor for a widget
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub width: u32,
    pub height: u32,
    pub order: u32,
}

/// Source descriptor for externally contributed widget types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetSource {
    /// Contributing package/module name
    pub module: String,

    /// Entry path within the package
    pub path: String,
}

/// Top-level dashboard entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub id: String,
    pub name: String,
}

/// Theme attached to a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub colors: Map<String, Value>,
}

/// Page within a dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dashboard_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme_id: Option<String>,
    #[serde(default)]
    pub order: u32,
}

/// Group within a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_id: Option<String>,
    #[serde(default)]
    pub order: u32,
}

/// Host-supplied widget registration config
#[derive(Clone)]
pub struct WidgetSpec {
    /// Globally unique id, assigned by the host
    pub id: String,

    /// Widget type tag
    pub kind: String,

    /// Property bag
    pub props: Map<String, Value>,

    /// Layout descriptor
    pub layout: Layout,

    /// Optional externally contributed source
    pub source: Option<WidgetSource>,

    /// History buffer configuration (chart-like widgets)
    pub history: Option<HistoryConfig>,

    /// Topic decoration applied before forwarding
    pub topic: TopicPolicy,

    /// Optional widget-specific handlers
    pub handler: Option<Arc<dyn WidgetHandler>>,
}

impl WidgetSpec {
    /// Minimal spec with defaults
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            props: Map::new(),
            layout: Layout::default(),
            source: None,
            history: None,
            topic: TopicPolicy::None,
            handler: None,
        }
    }

    pub fn with_props(mut self, props: Map<String, Value>) -> Self {
        self.props = props;
        self
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_history(mut self, history: HistoryConfig) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_topic(mut self, topic: TopicPolicy) -> Self {
        self.topic = topic;
        self
    }

    pub fn with_handler(mut self, handler: Arc<dyn WidgetHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn with_source(mut self, source: WidgetSource) -> Self {
        self.source = Some(source);
        self
    }
}

/// A live widget in the registry
#[derive(Clone)]
pub struct Widget {
    pub id: String,
    pub kind: String,
    pub props: Map<String, Value>,
    pub layout: Layout,

    /// State snapshot captured at registration time
    pub state: Map<String, Value>,

    /// Owning group (id reference)
    pub group_id: Option<String>,

    pub source: Option<WidgetSource>,
    pub history: Option<HistoryConfig>,
    pub topic: TopicPolicy,
    pub handler: Option<Arc<dyn WidgetHandler>>,
}

/// Result of a registration call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterOutcome {
    /// The widget id was not previously present
    pub widget_added: bool,
}

/// Result of a deregistration call, listing cascade removals
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeregisterOutcome {
    pub removed_widgets: Vec<String>,
    pub removed_groups: Vec<String>,
    pub removed_pages: Vec<String>,
}

impl DeregisterOutcome {
    /// Whether anything was removed
    pub fn changed(&self) -> bool {
        !self.removed_widgets.is_empty()
            || !self.removed_groups.is_empty()
            || !self.removed_pages.is_empty()
    }
}

/// Registry of live dashboard entities
#[derive(Default)]
pub struct WidgetRegistry {
    widgets: RwLock<HashMap<String, Widget>>,
    groups: RwLock<HashMap<String, Group>>,
    pages: RwLock<HashMap<String, Page>>,
    dashboards: RwLock<HashMap<String, Dashboard>>,
    themes: RwLock<HashMap<String, Theme>>,
}

impl WidgetRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent upsert of a widget and its containment chain
    ///
    /// A widget already present by id is not re-inserted: its props,
    /// layout, handler and containment refresh, but its state snapshot is
    /// preserved. Page/group/dashboard/theme mappings always refresh.
    pub fn register(
        &self,
        page: Option<Page>,
        group: Option<Group>,
        widget: Option<WidgetSpec>,
        state_snapshot: Map<String, Value>,
    ) -> RegisterOutcome {
        if let Some(page) = page {
            self.pages.write().insert(page.id.clone(), page);
        }

        let group_id = group.as_ref().map(|g| g.id.clone());
        if let Some(group) = group {
            self.groups.write().insert(group.id.clone(), group);
        }

        let mut outcome = RegisterOutcome::default();

        if let Some(spec) = widget {
            let mut widgets = self.widgets.write();
            match widgets.get_mut(&spec.id) {
                Some(existing) => {
                    existing.kind = spec.kind;
                    existing.props = spec.props;
                    existing.layout = spec.layout;
                    existing.source = spec.source;
                    existing.history = spec.history;
                    existing.topic = spec.topic;
                    existing.handler = spec.handler;
                    existing.group_id = group_id.or(existing.group_id.take());
                }
                None => {
                    tracing::debug!("Registered widget {} ({})", spec.id, spec.kind);
                    outcome.widget_added = true;
                    widgets.insert(
                        spec.id.clone(),
                        Widget {
                            id: spec.id,
                            kind: spec.kind,
                            props: spec.props,
                            layout: spec.layout,
                            state: state_snapshot,
                            group_id,
                            source: spec.source,
                            history: spec.history,
                            topic: spec.topic,
                            handler: spec.handler,
                        },
                    );
                }
            }
        }

        outcome
    }

    /// Register a dashboard
    pub fn add_dashboard(&self, dashboard: Dashboard) {
        self.dashboards
            .write()
            .insert(dashboard.id.clone(), dashboard);
    }

    /// Register a theme
    pub fn add_theme(&self, theme: Theme) {
        self.themes.write().insert(theme.id.clone(), theme);
    }

    /// Remove any combination of page, group and widget, pruning newly
    /// empty containers
    ///
    /// Mirrors `register`: each argument is removed independently. A
    /// widget removal prunes its group once empty, which in turn prunes
    /// the owning page once it holds no groups. An explicit group or page
    /// id removes that container even when no widget is involved, so
    /// widgetless containers never outlive their host registration.
    pub fn deregister(
        &self,
        page_id: Option<&str>,
        group_id: Option<&str>,
        widget_id: Option<&str>,
    ) -> DeregisterOutcome {
        let mut outcome = DeregisterOutcome::default();

        if let Some(widget_id) = widget_id {
            self.remove_widget(widget_id, &mut outcome);
        }
        if let Some(group_id) = group_id {
            self.remove_group(group_id, &mut outcome);
        }
        if let Some(page_id) = page_id {
            if self.pages.write().remove(page_id).is_some() {
                outcome.removed_pages.push(page_id.to_string());
                tracing::debug!("Removed page {}", page_id);
            }
        }

        outcome
    }

    fn remove_widget(&self, widget_id: &str, outcome: &mut DeregisterOutcome) {
        let group_id = {
            let mut widgets = self.widgets.write();
            match widgets.remove(widget_id) {
                Some(widget) => {
                    outcome.removed_widgets.push(widget_id.to_string());
                    widget.group_id
                }
                None => return,
            }
        };

        if let Some(group_id) = group_id {
            let group_empty = {
                let widgets = self.widgets.read();
                !widgets
                    .values()
                    .any(|w| w.group_id.as_deref() == Some(group_id.as_str()))
            };

            if group_empty {
                tracing::debug!("Pruning empty group {}", group_id);
                self.remove_group(&group_id, outcome);
            }
        }
    }

    fn remove_group(&self, group_id: &str, outcome: &mut DeregisterOutcome) {
        let page_id = {
            let mut groups = self.groups.write();
            match groups.remove(group_id) {
                Some(group) => group.page_id,
                None => return,
            }
        };
        outcome.removed_groups.push(group_id.to_string());

        if let Some(page_id) = page_id {
            let page_empty = {
                let groups = self.groups.read();
                !groups
                    .values()
                    .any(|g| g.page_id.as_deref() == Some(page_id.as_str()))
            };

            if page_empty && self.pages.write().remove(&page_id).is_some() {
                outcome.removed_pages.push(page_id.clone());
                tracing::debug!("Pruned empty page {}", page_id);
            }
        }
    }

    /// Widget lookup by id
    pub fn get(&self, widget_id: &str) -> Option<Widget> {
        self.widgets.read().get(widget_id).cloned()
    }

    /// Whether a widget id is live
    pub fn contains(&self, widget_id: &str) -> bool {
        self.widgets.read().contains_key(widget_id)
    }

    /// All widgets, ordered by layout order then id
    pub fn widgets(&self) -> Vec<Widget> {
        let mut widgets: Vec<_> = self.widgets.read().values().cloned().collect();
        widgets.sort_by(|a, b| {
            a.layout
                .order
                .cmp(&b.layout.order)
                .then_with(|| a.id.cmp(&b.id))
        });
        widgets
    }

    /// All groups, ordered
    pub fn groups(&self) -> Vec<Group> {
        let mut groups: Vec<_> = self.groups.read().values().cloned().collect();
        groups.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        groups
    }

    /// All pages, ordered
    pub fn pages(&self) -> Vec<Page> {
        let mut pages: Vec<_> = self.pages.read().values().cloned().collect();
        pages.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        pages
    }

    /// All dashboards
    pub fn dashboards(&self) -> Vec<Dashboard> {
        let mut dashboards: Vec<_> = self.dashboards.read().values().cloned().collect();
        dashboards.sort_by(|a, b| a.id.cmp(&b.id));
        dashboards
    }

    /// All themes
    pub fn themes(&self) -> Vec<Theme> {
        let mut themes: Vec<_> = self.themes.read().values().cloned().collect();
        themes.sort_by(|a, b| a.id.cmp(&b.id));
        themes
    }

    /// Widget ids contained in a group (query-derived view)
    pub fn widgets_in_group(&self, group_id: &str) -> Vec<String> {
        let mut ids: Vec<_> = self
            .widgets
            .read()
            .values()
            .filter(|w| w.group_id.as_deref() == Some(group_id))
            .map(|w| w.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of live widgets
    pub fn widget_count(&self) -> usize {
        self.widgets.read().len()
    }

    /// Drop everything (coordinator teardown)
    pub fn clear(&self) {
        self.widgets.write().clear();
        self.groups.write().clear();
        self.pages.write().clear();
        self.dashboards.write().clear();
        self.themes.write().clear();
    }
}
