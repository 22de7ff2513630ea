use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::env;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock, Weak};
use tracing::{debug, info, warn};

pub mod binder;
pub mod blocks;
pub mod error;
pub mod pages;
pub mod rpc;
pub mod schema;
pub mod search;
pub mod session;
pub mod slash;
pub mod tags;
pub mod workspace;

pub use blocks::{BlockKind, BlockPatch, ContentBlock};
pub use error::{Result, WorkspaceError};
pub use pages::{Page, PagePatch, PageStore, PropertyView};
pub use schema::{
    PageTemplate, PropertyDef, PropertyKind, PropertyMap, PropertyValue, SuperTag, SuperTagInput,
    SuperTagPatch,
};
pub use search::{SearchIndex, SearchResult};
pub use session::{AuthProvider, AuthSnapshot, LocalAuth, Subscription, User};
pub use slash::SlashCommand;
pub use tags::{PropertyRename, TagStore};
pub use workspace::Workspace;

const SETTINGS_ENV: &str = "TAGSPACE_SETTINGS";
const LOG_ENV: &str = "TAGSPACE_LOG";
const DEFAULT_SETTINGS_FILE: &str = "settings.json";

// App settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Load the sample workspace on first sign-in to an empty workspace.
    pub seed_sample_data: bool,
    pub default_page_title: String,
    pub search_limit: usize,
    pub log_filter: String,
    /// Display name of the in-process user.
    pub local_user: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            seed_sample_data: true,
            default_page_title: pages::DEFAULT_PAGE_TITLE.to_string(),
            search_limit: 20,
            log_filter: "info".to_string(),
            local_user: "Local User".to_string(),
        }
    }
}

impl Settings {
    /// Settings from `TAGSPACE_SETTINGS` (or `settings.json`), then env overrides.
    pub fn from_env() -> Self {
        let path = env::var(SETTINGS_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_SETTINGS_FILE));
        let mut settings = load_settings(&path);
        if let Ok(filter) = env::var(LOG_ENV) {
            settings.log_filter = filter;
        }
        settings
    }
}

// Load settings from disk; anything missing or unreadable falls back to defaults
pub fn load_settings(path: &Path) -> Settings {
    if !path.exists() {
        return Settings::default();
    }

    std::fs::read_to_string(path)
        .ok()
        .and_then(|content| serde_json::from_str(&content).ok())
        .unwrap_or_default()
}

// Save settings to disk
pub fn save_settings(path: &Path, settings: &Settings) -> anyhow::Result<()> {
    let content = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, content)?;
    Ok(())
}

// ---- Navigation ----

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    #[default]
    Home,
    Tags,
    Page,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Navigation {
    pub view: View,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_page_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagChip {
    pub id: String,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageCard {
    pub id: String,
    pub title: String,
    pub tags: Vec<TagChip>,
    pub block_count: usize,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeSummary {
    pub tag_count: usize,
    pub page_count: usize,
    pub pages: Vec<PageCard>,
}

const HOME_PAGE_CARDS: usize = 4;

// App state shared by every command
pub struct AppState {
    pub settings: RwLock<Settings>,
    pub workspace: RwLock<Workspace>,
    pub session: RwLock<AuthSnapshot>,
    pub navigation: RwLock<Navigation>,
    pub search_index: Mutex<Option<SearchIndex>>,
    auth: Arc<dyn AuthProvider>,
    #[allow(dead_code)]
    subscription: Mutex<Option<Subscription>>,
}

impl AppState {
    /// Build the state and subscribe it to `auth`. The listener holds a weak
    /// reference, so dropping the last `Arc` ends deliveries.
    pub fn new(settings: Settings, auth: Arc<dyn AuthProvider>) -> Arc<Self> {
        let search_index = match SearchIndex::new() {
            Ok(index) => Some(index),
            Err(e) => {
                warn!("Search index unavailable, using fallback search: {}", e);
                None
            }
        };

        let state = Arc::new(Self {
            workspace: RwLock::new(Workspace::with_default_title(
                settings.default_page_title.clone(),
            )),
            settings: RwLock::new(settings),
            session: RwLock::new(AuthSnapshot::default()),
            navigation: RwLock::new(Navigation::default()),
            search_index: Mutex::new(search_index),
            auth: Arc::clone(&auth),
            subscription: Mutex::new(None),
        });

        let weak: Weak<AppState> = Arc::downgrade(&state);
        let subscription = auth.on_auth_state_changed(Box::new(move |snapshot: &AuthSnapshot| {
            if let Some(state) = weak.upgrade() {
                state.apply_auth_snapshot(snapshot);
            }
        }));
        *state.subscription.lock().expect("subscription mutex") = Some(subscription);

        state
    }

    pub fn is_active(&self) -> bool {
        self.session.read().expect("session read lock").is_active()
    }

    fn ensure_active(&self) -> std::result::Result<(), String> {
        if self.is_active() {
            Ok(())
        } else {
            Err(WorkspaceError::Inactive.to_string())
        }
    }

    fn apply_auth_snapshot(&self, snapshot: &AuthSnapshot) {
        *self.session.write().expect("session write lock") = snapshot.clone();
        if !snapshot.is_active() {
            return;
        }

        let seed = self.settings.read().expect("settings read lock").seed_sample_data;
        let mut ws = self.workspace.write().expect("workspace write lock");
        if seed && ws.tags.is_empty() {
            if let Err(e) = ws.seed_sample_data() {
                warn!("Failed to seed sample workspace: {:#}", e);
            }
            self.rebuild_search(&ws);
        }
    }

    fn navigate(&self, view: View, page_id: Option<String>) {
        let mut nav = self.navigation.write().expect("navigation write lock");
        nav.view = view;
        nav.current_page_id = page_id;
    }

    // Refresh one page's search document; removes it if the page is gone
    fn reindex_page(&self, ws: &Workspace, page_id: &str) {
        let index = self.search_index.lock().expect("search index mutex");
        let Some(ref search_index) = *index else {
            return;
        };
        let result = match ws.pages.get(page_id) {
            Some(page) => search_index.index_page(page, &ws.tags),
            None => search_index.delete_page(page_id),
        };
        if let Err(e) = result {
            warn!("Failed to update search index for {}: {}", page_id, e);
        }
    }

    fn rebuild_search(&self, ws: &Workspace) {
        let index = self.search_index.lock().expect("search index mutex");
        if let Some(ref search_index) = *index {
            if let Err(e) = search_index.rebuild(&ws.pages, &ws.tags) {
                warn!("Failed to rebuild search index: {}", e);
            }
        }
    }
}

// Utility: card shown on the home view
fn page_card(page: &Page, tags: &TagStore, default_title: &str) -> PageCard {
    let title = if page.title.trim().is_empty() {
        default_title.to_string()
    } else {
        page.title.clone()
    };
    PageCard {
        id: page.id.clone(),
        title,
        tags: page
            .tags
            .iter()
            .filter_map(|id| tags.get(id))
            .map(|tag| TagChip {
                id: tag.id.clone(),
                name: tag.name.clone(),
                color: tag.color.clone(),
            })
            .collect(),
        block_count: page.content.len(),
        updated_at: page.updated_at,
    }
}

// COMMANDS

// ---- Session ----

pub fn login(state: &AppState) -> std::result::Result<AuthSnapshot, String> {
    state.auth.login();
    Ok(state.auth.snapshot())
}

pub fn logout(state: &AppState) -> std::result::Result<AuthSnapshot, String> {
    state.auth.logout();
    Ok(state.auth.snapshot())
}

pub fn get_session(state: &AppState) -> AuthSnapshot {
    state.session.read().expect("session read lock").clone()
}

pub fn get_settings(state: &AppState) -> Settings {
    state.settings.read().expect("settings read lock").clone()
}

// ---- Navigation ----

pub fn get_navigation(state: &AppState) -> Navigation {
    state.navigation.read().expect("navigation read lock").clone()
}

pub fn show_home(state: &AppState) -> std::result::Result<Navigation, String> {
    state.ensure_active()?;
    state.navigate(View::Home, None);
    Ok(get_navigation(state))
}

pub fn show_tags(state: &AppState) -> std::result::Result<Navigation, String> {
    state.ensure_active()?;
    state.navigate(View::Tags, None);
    Ok(get_navigation(state))
}

pub fn open_page(state: &AppState, id: String) -> std::result::Result<Page, String> {
    state.ensure_active()?;
    let page = {
        let ws = state.workspace.read().expect("workspace read lock");
        ws.pages
            .get(&id)
            .cloned()
            .ok_or_else(|| WorkspaceError::PageNotFound(id.clone()).to_string())?
    };
    state.navigate(View::Page, Some(id));
    Ok(page)
}

pub fn home_summary(state: &AppState) -> std::result::Result<HomeSummary, String> {
    state.ensure_active()?;
    let default_title = state
        .settings
        .read()
        .expect("settings read lock")
        .default_page_title
        .clone();
    let ws = state.workspace.read().expect("workspace read lock");
    Ok(HomeSummary {
        tag_count: ws.tags.len(),
        page_count: ws.pages.len(),
        pages: ws
            .pages
            .list()
            .iter()
            .take(HOME_PAGE_CARDS)
            .map(|page| page_card(page, &ws.tags, &default_title))
            .collect(),
    })
}

// ---- Super Tags ----

pub fn list_tags(state: &AppState) -> std::result::Result<Vec<SuperTag>, String> {
    state.ensure_active()?;
    let ws = state.workspace.read().expect("workspace read lock");
    Ok(ws.tags.list().to_vec())
}

pub fn get_tag(state: &AppState, id: String) -> std::result::Result<SuperTag, String> {
    state.ensure_active()?;
    let ws = state.workspace.read().expect("workspace read lock");
    ws.tags
        .get(&id)
        .cloned()
        .ok_or_else(|| WorkspaceError::TagNotFound(id).to_string())
}

pub fn create_tag(state: &AppState, input: SuperTagInput) -> std::result::Result<SuperTag, String> {
    state.ensure_active()?;
    input.validate().map_err(|e| e.to_string())?;
    let mut ws = state.workspace.write().expect("workspace write lock");
    Ok(ws.tags.create(input))
}

pub fn update_tag(
    state: &AppState,
    id: String,
    patch: SuperTagPatch,
) -> std::result::Result<SuperTag, String> {
    state.ensure_active()?;
    let mut ws = state.workspace.write().expect("workspace write lock");

    // Validate the tag as it would look after the patch
    let mut candidate = ws
        .tags
        .get(&id)
        .cloned()
        .ok_or_else(|| WorkspaceError::TagNotFound(id.clone()).to_string())?;
    if let Some(ref name) = patch.name {
        candidate.name = name.clone();
    }
    if let Some(ref properties) = patch.properties {
        candidate.properties = properties.clone();
    }
    candidate.validate().map_err(|e| e.to_string())?;

    let renames = ws.update_tag(&id, patch).map_err(|e| e.to_string())?;
    if !renames.is_empty() {
        debug!("Tag {} renamed {} propert(ies)", id, renames.len());
    }
    state.rebuild_search(&ws);

    ws.tags
        .get(&id)
        .cloned()
        .ok_or_else(|| WorkspaceError::TagNotFound(id).to_string())
}

pub fn delete_tag(state: &AppState, id: String) -> std::result::Result<(), String> {
    state.ensure_active()?;
    let mut ws = state.workspace.write().expect("workspace write lock");
    ws.delete_tag(&id).map_err(|e| e.to_string())?;
    state.rebuild_search(&ws);
    Ok(())
}

// ---- Pages ----

pub fn list_pages(state: &AppState) -> std::result::Result<Vec<Page>, String> {
    state.ensure_active()?;
    let ws = state.workspace.read().expect("workspace read lock");
    Ok(ws.pages.list().to_vec())
}

pub fn get_page(state: &AppState, id: String) -> std::result::Result<Page, String> {
    state.ensure_active()?;
    let ws = state.workspace.read().expect("workspace read lock");
    ws.pages
        .get(&id)
        .cloned()
        .ok_or_else(|| WorkspaceError::PageNotFound(id).to_string())
}

pub fn list_root_pages(state: &AppState) -> std::result::Result<Vec<Page>, String> {
    state.ensure_active()?;
    let ws = state.workspace.read().expect("workspace read lock");
    Ok(ws.pages.roots().into_iter().cloned().collect())
}

pub fn list_child_pages(state: &AppState, parent_id: String) -> std::result::Result<Vec<Page>, String> {
    state.ensure_active()?;
    let ws = state.workspace.read().expect("workspace read lock");
    Ok(ws.pages.children(&parent_id).into_iter().cloned().collect())
}

pub fn filter_pages(state: &AppState, query: String) -> std::result::Result<Vec<Page>, String> {
    state.ensure_active()?;
    let ws = state.workspace.read().expect("workspace read lock");
    Ok(ws.pages.filter_by_title(&query).into_iter().cloned().collect())
}

pub fn recent_pages(state: &AppState, limit: usize) -> std::result::Result<Vec<Page>, String> {
    state.ensure_active()?;
    let ws = state.workspace.read().expect("workspace read lock");
    Ok(ws.pages.recent(limit).into_iter().cloned().collect())
}

/// Create a page and open it.
pub fn create_page(state: &AppState, parent_id: Option<String>) -> std::result::Result<Page, String> {
    state.ensure_active()?;
    let page = {
        let mut ws = state.workspace.write().expect("workspace write lock");
        let page = ws.pages.create(parent_id.as_deref());
        state.reindex_page(&ws, &page.id);
        page
    };
    state.navigate(View::Page, Some(page.id.clone()));
    Ok(page)
}

pub fn create_page_from_template(
    state: &AppState,
    tag_id: String,
    parent_id: Option<String>,
    variables: HashMap<String, String>,
) -> std::result::Result<Page, String> {
    state.ensure_active()?;
    let page = {
        let mut ws = state.workspace.write().expect("workspace write lock");
        let page = ws
            .create_page_from_template(&tag_id, parent_id.as_deref(), variables)
            .map_err(|e| e.to_string())?;
        state.reindex_page(&ws, &page.id);
        page
    };
    state.navigate(View::Page, Some(page.id.clone()));
    Ok(page)
}

/// Merge `patch` into a page. A tag change without properties is reconciled here
/// so tags and properties always change together.
pub fn update_page(
    state: &AppState,
    id: String,
    mut patch: PagePatch,
) -> std::result::Result<Page, String> {
    state.ensure_active()?;
    let mut ws = state.workspace.write().expect("workspace write lock");

    if let Some(ref new_tags) = patch.tags {
        let existing = match patch.properties {
            Some(ref properties) => properties.clone(),
            None => ws
                .pages
                .get(&id)
                .map(|p| p.properties.clone())
                .ok_or_else(|| WorkspaceError::PageNotFound(id.clone()).to_string())?,
        };
        patch.properties = Some(binder::reconcile(&existing, &ws.tags.resolve(new_tags)));
    }

    ws.pages.update(&id, patch).map_err(|e| e.to_string())?;
    state.reindex_page(&ws, &id);
    ws.pages
        .get(&id)
        .cloned()
        .ok_or_else(|| WorkspaceError::PageNotFound(id).to_string())
}

pub fn delete_page(state: &AppState, id: String) -> std::result::Result<(), String> {
    state.ensure_active()?;
    {
        let mut ws = state.workspace.write().expect("workspace write lock");
        ws.pages.delete(&id).map_err(|e| e.to_string())?;
        state.reindex_page(&ws, &id);
    }

    let mut nav = state.navigation.write().expect("navigation write lock");
    if nav.current_page_id.as_deref() == Some(id.as_str()) {
        nav.view = View::Home;
        nav.current_page_id = None;
    }
    Ok(())
}

pub fn move_page(
    state: &AppState,
    id: String,
    parent_id: Option<String>,
) -> std::result::Result<Page, String> {
    state.ensure_active()?;
    let mut ws = state.workspace.write().expect("workspace write lock");
    ws.pages
        .move_page(&id, parent_id.as_deref())
        .map_err(|e| e.to_string())?;
    ws.pages
        .get(&id)
        .cloned()
        .ok_or_else(|| WorkspaceError::PageNotFound(id).to_string())
}

// ---- Tag Binding ----

pub fn attach_tag(state: &AppState, page_id: String, tag_id: String) -> std::result::Result<Page, String> {
    state.ensure_active()?;
    let mut ws = state.workspace.write().expect("workspace write lock");
    ws.attach_tag(&page_id, &tag_id).map_err(|e| e.to_string())?;
    state.reindex_page(&ws, &page_id);
    ws.pages
        .get(&page_id)
        .cloned()
        .ok_or_else(|| WorkspaceError::PageNotFound(page_id).to_string())
}

pub fn detach_tag(state: &AppState, page_id: String, tag_id: String) -> std::result::Result<Page, String> {
    state.ensure_active()?;
    let mut ws = state.workspace.write().expect("workspace write lock");
    ws.detach_tag(&page_id, &tag_id).map_err(|e| e.to_string())?;
    state.reindex_page(&ws, &page_id);
    ws.pages
        .get(&page_id)
        .cloned()
        .ok_or_else(|| WorkspaceError::PageNotFound(page_id).to_string())
}

/// Set a property from raw editor input, converted through the page's schema.
pub fn set_property(
    state: &AppState,
    page_id: String,
    name: String,
    value: JsonValue,
) -> std::result::Result<PropertyValue, String> {
    state.ensure_active()?;
    let mut ws = state.workspace.write().expect("workspace write lock");
    let ws = &mut *ws;
    let stored = ws
        .pages
        .set_property_input(&page_id, &name, &value, &ws.tags)
        .map_err(|e| e.to_string())?;
    state.reindex_page(ws, &page_id);
    Ok(stored)
}

pub fn property_view(state: &AppState, page_id: String) -> std::result::Result<PropertyView, String> {
    state.ensure_active()?;
    let ws = state.workspace.read().expect("workspace read lock");
    ws.pages
        .property_view(&page_id, &ws.tags)
        .map_err(|e| e.to_string())
}

pub fn purge_orphaned_properties(
    state: &AppState,
    page_id: String,
) -> std::result::Result<Vec<String>, String> {
    state.ensure_active()?;
    let mut ws = state.workspace.write().expect("workspace write lock");
    let ws = &mut *ws;
    let removed = ws
        .pages
        .purge_orphaned_properties(&page_id, &ws.tags)
        .map_err(|e| e.to_string())?;
    state.reindex_page(ws, &page_id);
    Ok(removed)
}

// ---- Blocks & Editor ----

pub fn insert_block(
    state: &AppState,
    page_id: String,
    after: Option<String>,
    kind: BlockKind,
    content: String,
) -> std::result::Result<String, String> {
    state.ensure_active()?;
    let mut ws = state.workspace.write().expect("workspace write lock");
    let block = match kind {
        BlockKind::Todo => ContentBlock::todo(content, false),
        kind => ContentBlock::new(kind, content),
    };
    let block_id = ws
        .pages
        .insert_block(&page_id, after.as_deref(), block)
        .map_err(|e| e.to_string())?;
    state.reindex_page(&ws, &page_id);
    Ok(block_id)
}

pub fn update_block(
    state: &AppState,
    page_id: String,
    block_id: String,
    patch: BlockPatch,
) -> std::result::Result<(), String> {
    state.ensure_active()?;
    let mut ws = state.workspace.write().expect("workspace write lock");
    ws.pages
        .update_block(&page_id, &block_id, &patch)
        .map_err(|e| e.to_string())?;
    state.reindex_page(&ws, &page_id);
    Ok(())
}

pub fn remove_block(state: &AppState, page_id: String, block_id: String) -> std::result::Result<(), String> {
    state.ensure_active()?;
    let mut ws = state.workspace.write().expect("workspace write lock");
    ws.pages
        .remove_block(&page_id, &block_id)
        .map_err(|e| e.to_string())?;
    state.reindex_page(&ws, &page_id);
    Ok(())
}

/// Editor markup for a page's blocks.
pub fn page_markup(state: &AppState, page_id: String) -> std::result::Result<String, String> {
    state.ensure_active()?;
    let ws = state.workspace.read().expect("workspace read lock");
    ws.pages
        .get(&page_id)
        .map(|page| blocks::to_markup(&page.content))
        .ok_or_else(|| WorkspaceError::PageNotFound(page_id).to_string())
}

/// Replace a page's blocks with the editor's output.
pub fn ingest_markup(
    state: &AppState,
    page_id: String,
    markup: String,
) -> std::result::Result<Page, String> {
    state.ensure_active()?;
    let mut ws = state.workspace.write().expect("workspace write lock");
    ws.pages
        .ingest_markup(&page_id, &markup)
        .map_err(|e| e.to_string())?;
    state.reindex_page(&ws, &page_id);
    ws.pages
        .get(&page_id)
        .cloned()
        .ok_or_else(|| WorkspaceError::PageNotFound(page_id).to_string())
}

pub fn slash_commands(query: String) -> Vec<SlashCommand> {
    slash::filter(&query).into_iter().cloned().collect()
}

// ---- Search ----

pub fn search_pages(state: &AppState, query: String) -> std::result::Result<Vec<SearchResult>, String> {
    state.ensure_active()?;
    if query.trim().is_empty() {
        return Ok(vec![]);
    }

    let limit = state.settings.read().expect("settings read lock").search_limit;
    // Workspace before index, same order as every mutation
    let ws = state.workspace.read().expect("workspace read lock");
    let index = state.search_index.lock().expect("search index mutex");
    if let Some(ref search_index) = *index {
        search_index.search(&query, limit).map_err(|e| e.to_string())
    } else {
        // Fallback to simple search if index not available
        Ok(search::fallback_search(&ws.pages, &query, limit))
    }
}

pub fn rebuild_search_index(state: &AppState) -> std::result::Result<(), String> {
    state.ensure_active()?;
    let ws = state.workspace.read().expect("workspace read lock");
    let index = state.search_index.lock().expect("search index mutex");
    match *index {
        Some(ref search_index) => search_index
            .rebuild(&ws.pages, &ws.tags)
            .map_err(|e| e.to_string()),
        None => Err("Search index not initialized".to_string()),
    }
}

// ---- Entry Point ----

fn init_tracing(filter: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Serve JSON-RPC requests, one per stdin line, answering one per stdout line.
pub fn run() -> anyhow::Result<()> {
    let settings = Settings::from_env();
    init_tracing(&settings.log_filter);

    let user = User {
        id: "local-user".to_string(),
        display_name: settings.local_user.clone(),
        email: None,
    };
    let auth: Arc<dyn AuthProvider> = Arc::new(LocalAuth::new(user));
    let state = AppState::new(settings, auth);
    info!("Tagspace ready, reading requests from stdin");

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = rpc::handle_line(&state, &line);
        writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
        stdout.flush()?;
    }

    info!("stdin closed, shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn signed_in(settings: Settings) -> Arc<AppState> {
        let auth: Arc<dyn AuthProvider> = Arc::new(LocalAuth::new(User {
            id: "user-1".to_string(),
            display_name: "Alice".to_string(),
            email: None,
        }));
        let state = AppState::new(settings, auth);
        login(&state).unwrap();
        state
    }

    fn empty_settings() -> Settings {
        Settings {
            seed_sample_data: false,
            ..Settings::default()
        }
    }

    #[test]
    fn test_settings_defaults_and_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert_eq!(load_settings(&missing), Settings::default());

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();
        assert_eq!(load_settings(&broken), Settings::default());

        let partial = dir.path().join("partial.json");
        std::fs::write(&partial, r#"{"searchLimit": 5, "seedSampleData": false}"#).unwrap();
        let settings = load_settings(&partial);
        assert_eq!(settings.search_limit, 5);
        assert!(!settings.seed_sample_data);
        assert_eq!(settings.default_page_title, "Untitled");
    }

    #[test]
    fn test_save_settings_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = Settings {
            default_page_title: "New note".to_string(),
            ..Settings::default()
        };
        save_settings(&path, &settings).unwrap();

        let raw: JsonValue = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["defaultPageTitle"], json!("New note"));
        assert_eq!(load_settings(&path), settings);
    }

    #[test]
    fn test_inactive_session_is_rejected() {
        let auth: Arc<dyn AuthProvider> = Arc::new(LocalAuth::new(User {
            id: "user-1".to_string(),
            display_name: "Alice".to_string(),
            email: None,
        }));
        let state = AppState::new(Settings::default(), auth);

        let err = list_pages(&state).unwrap_err();
        assert_eq!(err, "Please sign in to access your workspace");
        assert!(create_page(&state, None).is_err());

        login(&state).unwrap();
        assert!(state.is_active());
        logout(&state).unwrap();
        assert!(list_tags(&state).is_err());
    }

    #[test]
    fn test_first_sign_in_seeds_sample_data() {
        let state = signed_in(Settings::default());
        assert_eq!(list_tags(&state).unwrap().len(), 3);

        let summary = home_summary(&state).unwrap();
        assert_eq!(summary.page_count, 3);
        assert_eq!(summary.pages[0].tags[0].name, "Project");
        assert_eq!(summary.pages[0].block_count, 6);

        // Signing in again does not seed twice
        logout(&state).unwrap();
        login(&state).unwrap();
        assert_eq!(list_tags(&state).unwrap().len(), 3);

        let empty = signed_in(empty_settings());
        assert!(list_tags(&empty).unwrap().is_empty());
    }

    #[test]
    fn test_delete_current_page_returns_home() {
        let state = signed_in(empty_settings());
        let page = create_page(&state, None).unwrap();
        assert_eq!(get_navigation(&state).view, View::Page);
        assert_eq!(get_navigation(&state).current_page_id, Some(page.id.clone()));

        delete_page(&state, page.id.clone()).unwrap();
        assert_eq!(get_navigation(&state), Navigation::default());
        assert!(get_page(&state, page.id).is_err());
    }

    #[test]
    fn test_update_page_reconciles_new_tags() {
        let state = signed_in(empty_settings());
        let tag = create_tag(
            &state,
            SuperTagInput::named("Task").with_property(
                PropertyDef::new("p1", "Done", PropertyKind::Checkbox)
                    .with_default(PropertyValue::Checkbox(false)),
            ),
        )
        .unwrap();
        let page = create_page(&state, None).unwrap();

        let patch = PagePatch {
            tags: Some(vec![tag.id.clone()]),
            ..Default::default()
        };
        let page = update_page(&state, page.id, patch).unwrap();
        assert_eq!(page.properties["Done"], PropertyValue::Checkbox(false));
    }

    #[test]
    fn test_create_tag_rejects_invalid_input() {
        let state = signed_in(empty_settings());
        assert!(create_tag(&state, SuperTagInput::named("  ")).is_err());

        let bad_select = SuperTagInput::named("Project")
            .with_property(PropertyDef::new("p1", "Status", PropertyKind::Select));
        assert!(create_tag(&state, bad_select).is_err());
        assert!(list_tags(&state).unwrap().is_empty());
    }

    #[test]
    fn test_search_after_edit() {
        let state = signed_in(Settings::default());
        let hits = search_pages(&state, "standup".to_string()).unwrap();
        assert_eq!(hits[0].id, "page-2");

        let page = create_page(&state, None).unwrap();
        insert_block(
            &state,
            page.id.clone(),
            None,
            BlockKind::Paragraph,
            "Quarterly budget review".to_string(),
        )
        .unwrap();
        let hits = search_pages(&state, "budget".to_string()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, page.id);

        assert!(search_pages(&state, "  ".to_string()).unwrap().is_empty());
    }
}
