mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{ensure, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::Value;
use uuid::Uuid;

use crate::models::*;
use crate::pipeline::{persist_hierarchy, HierarchyStore};

/// Environment variable overriding the default database location.
pub const DB_PATH_ENV: &str = "BLUEPRINT_DB_PATH";

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> Result<Self> {
        if let Some(path) = std::env::var_os(DB_PATH_ENV).filter(|p| !p.is_empty()) {
            return Self::open(PathBuf::from(path));
        }
        let dirs = directories::ProjectDirs::from("", "", "blueprint")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        let db_path = dirs.data_dir().join("blueprint.db");
        Self::open(db_path)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&mut conn)
    }

    // ============================================================
    // Project operations
    // ============================================================

    pub fn get_all_projects(&self) -> Result<Vec<Project>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, name, description, application_type, overview, created_at, updated_at
             FROM projects ORDER BY name",
        )?;

        let projects = stmt
            .query_map([], project_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(projects)
    }

    pub fn get_project(&self, id: Uuid) -> Result<Option<Project>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let project = conn
            .query_row(
                "SELECT id, name, description, application_type, overview, created_at, updated_at
                 FROM projects WHERE id = ?",
                [id.to_string()],
                project_from_row,
            )
            .optional()?;
        Ok(project)
    }

    pub fn create_project(&self, input: CreateProjectInput) -> Result<Project> {
        ensure!(!input.name.trim().is_empty(), "project name is required");

        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();
        let now = Utc::now();
        let application_type = input.application_type.unwrap_or_default();
        let overview_json = input
            .overview
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        conn.execute(
            "INSERT INTO projects (id, name, description, application_type, overview, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                &input.name,
                &input.description,
                application_type.as_str(),
                &overview_json,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ),
        )?;

        Ok(Project {
            id,
            name: input.name,
            description: input.description,
            application_type,
            overview: input.overview,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn update_project(&self, id: Uuid, input: UpdateProjectInput) -> Result<Option<Project>> {
        let Some(existing) = self.get_project(id)? else {
            return Ok(None);
        };

        let conn = self.conn.lock().expect("database lock poisoned");
        let now = Utc::now();
        let name = input.name.unwrap_or(existing.name);
        let description = input.description.or(existing.description);
        let application_type = input.application_type.unwrap_or(existing.application_type);
        let overview = input.overview.or(existing.overview);
        let overview_json = overview.as_ref().map(serde_json::to_string).transpose()?;

        conn.execute(
            "UPDATE projects SET name = ?, description = ?, application_type = ?, overview = ?, updated_at = ?
             WHERE id = ?",
            (
                &name,
                &description,
                application_type.as_str(),
                &overview_json,
                now.to_rfc3339(),
                id.to_string(),
            ),
        )?;

        Ok(Some(Project {
            id,
            name,
            description,
            application_type,
            overview,
            created_at: existing.created_at,
            updated_at: now,
        }))
    }

    /// Delete a project; its hierarchy and config blobs go with it.
    pub fn delete_project(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute("DELETE FROM projects WHERE id = ?", [id.to_string()])?;
        Ok(rows > 0)
    }

    // ============================================================
    // Whole-tree operations
    // ============================================================

    /// Create a project from an extracted tree and persist the tree under it.
    ///
    /// The project is named after the overview unless `name` is given.
    pub fn create_project_from_tree(
        &self,
        tree: &ParsedBrd,
        name: Option<String>,
    ) -> Result<(Project, PersistenceReport)> {
        let overview = &tree.project_overview;
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| overview.project_name.trim().to_string());
        let description = Some(overview.project_description.trim().to_string())
            .filter(|d| !d.is_empty());

        let project = self.create_project(CreateProjectInput {
            name,
            description,
            application_type: Some(tree.application_type),
            overview: Some(overview.clone()),
        })?;
        let report = persist_hierarchy(self, project.id, tree);
        Ok((project, report))
    }

    /// Replace a project's overview, hierarchy, and configs with `tree`.
    ///
    /// Returns `None` when the project does not exist.
    pub fn replace_project_tree(
        &self,
        project_id: Uuid,
        tree: &ParsedBrd,
    ) -> Result<Option<PersistenceReport>> {
        let update = UpdateProjectInput {
            application_type: Some(tree.application_type),
            overview: Some(tree.project_overview.clone()),
            ..Default::default()
        };
        if self.update_project(project_id, update)?.is_none() {
            return Ok(None);
        }
        Ok(Some(persist_hierarchy(self, project_id, tree)))
    }

    // ============================================================
    // Hierarchy operations
    // ============================================================

    pub fn clear_hierarchy(&self, project_id: Uuid) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        // Stories and features follow through ON DELETE CASCADE.
        let rows = conn.execute(
            "DELETE FROM modules WHERE project_id = ?",
            [project_id.to_string()],
        )?;
        tracing::debug!(%project_id, modules = rows, "Cleared hierarchy");
        Ok(())
    }

    /// Insert a module row, reusing the module's id if it carries one that no
    /// other row holds.
    pub fn insert_module(&self, project_id: Uuid, position: usize, module: &Module) -> Result<Uuid> {
        ensure!(
            !module.module_name.trim().is_empty(),
            "module name is required"
        );

        let conn = self.conn.lock().expect("database lock poisoned");
        let id = claim_id(&conn, "modules", module.id)?;

        conn.execute(
            "INSERT INTO modules (id, project_id, position, module_name, description, priority,
                                  business_impact, dependencies, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                project_id.to_string(),
                position as i64,
                module.module_name.trim(),
                &module.module_description,
                module.priority.as_str(),
                &module.business_impact,
                serde_json::to_string(&module.dependencies)?,
                Utc::now().to_rfc3339(),
            ),
        )?;

        Ok(id)
    }

    pub fn insert_user_story(
        &self,
        project_id: Uuid,
        module_id: Uuid,
        position: usize,
        story: &UserStory,
    ) -> Result<Uuid> {
        ensure!(!story.title.trim().is_empty(), "user story title is required");

        let conn = self.conn.lock().expect("database lock poisoned");
        let id = claim_id(&conn, "user_stories", story.id)?;

        conn.execute(
            "INSERT INTO user_stories (id, project_id, module_id, position, title, user_role,
                                       description, acceptance_criteria, priority, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                project_id.to_string(),
                module_id.to_string(),
                position as i64,
                story.title.trim(),
                &story.user_role,
                &story.description,
                serde_json::to_string(&story.acceptance_criteria)?,
                story.priority.as_str(),
                Utc::now().to_rfc3339(),
            ),
        )?;

        Ok(id)
    }

    pub fn insert_feature(
        &self,
        project_id: Uuid,
        module_id: Uuid,
        story_id: Uuid,
        position: usize,
        feature: &Feature,
    ) -> Result<Uuid> {
        ensure!(
            !feature.feature_name.trim().is_empty(),
            "feature name is required"
        );

        let conn = self.conn.lock().expect("database lock poisoned");
        let id = claim_id(&conn, "features", feature.id)?;

        conn.execute(
            "INSERT INTO features (id, project_id, module_id, user_story_id, position, feature_name,
                                   task_description, priority, estimated_hours, business_rules, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                project_id.to_string(),
                module_id.to_string(),
                story_id.to_string(),
                position as i64,
                feature.feature_name.trim(),
                &feature.task_description,
                feature.priority.as_str(),
                feature.estimated_hours,
                &feature.business_rules,
                Utc::now().to_rfc3339(),
            ),
        )?;

        Ok(id)
    }

    pub fn delete_module(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute("DELETE FROM modules WHERE id = ?", [id.to_string()])?;
        Ok(rows > 0)
    }

    pub fn delete_user_story(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute("DELETE FROM user_stories WHERE id = ?", [id.to_string()])?;
        Ok(rows > 0)
    }

    pub fn delete_feature(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute("DELETE FROM features WHERE id = ?", [id.to_string()])?;
        Ok(rows > 0)
    }

    /// Modules of a project in document order, without their stories.
    pub fn load_modules(&self, project_id: Uuid) -> Result<Vec<Module>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, module_name, description, priority, business_impact, dependencies
             FROM modules WHERE project_id = ? ORDER BY position",
        )?;

        let modules = stmt
            .query_map([project_id.to_string()], |row| {
                Ok(Module {
                    id: Some(parse_uuid(row.get::<_, String>(0)?)),
                    module_name: row.get(1)?,
                    module_description: row.get(2)?,
                    priority: parse_priority(row.get::<_, String>(3)?),
                    business_impact: row.get(4)?,
                    dependencies: parse_list(row.get::<_, String>(5)?),
                    user_stories: Vec::new(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(modules)
    }

    /// Stories of a module in document order, without their features.
    pub fn load_user_stories(&self, module_id: Uuid) -> Result<Vec<UserStory>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, title, user_role, description, acceptance_criteria, priority
             FROM user_stories WHERE module_id = ? ORDER BY position",
        )?;

        let stories = stmt
            .query_map([module_id.to_string()], |row| {
                Ok(UserStory {
                    id: Some(parse_uuid(row.get::<_, String>(0)?)),
                    title: row.get(1)?,
                    user_role: row.get(2)?,
                    description: row.get(3)?,
                    acceptance_criteria: parse_list(row.get::<_, String>(4)?),
                    priority: parse_priority(row.get::<_, String>(5)?),
                    features: Vec::new(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(stories)
    }

    pub fn load_features(&self, story_id: Uuid) -> Result<Vec<Feature>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, feature_name, task_description, priority, estimated_hours, business_rules
             FROM features WHERE user_story_id = ? ORDER BY position",
        )?;

        let features = stmt
            .query_map([story_id.to_string()], |row| {
                Ok(Feature {
                    id: Some(parse_uuid(row.get::<_, String>(0)?)),
                    feature_name: row.get(1)?,
                    task_description: row.get(2)?,
                    priority: parse_priority(row.get::<_, String>(3)?),
                    estimated_hours: row.get(4)?,
                    business_rules: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(features)
    }

    // ============================================================
    // Config operations
    // ============================================================

    /// Replace the project's business rules with `rules`, bumping the version.
    pub fn save_business_rules(
        &self,
        project_id: Uuid,
        rules: &[BusinessRule],
    ) -> Result<BusinessRulesConfig> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let current: Option<u32> = conn
            .query_row(
                "SELECT version FROM business_rule_configs WHERE project_id = ?",
                [project_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        let config = BusinessRulesConfig::from_rules(current.map_or(1, |v| v + 1), rules);

        conn.execute(
            "INSERT INTO business_rule_configs (project_id, version, config, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(project_id) DO UPDATE SET
                version = excluded.version,
                config = excluded.config,
                updated_at = excluded.updated_at",
            (
                project_id.to_string(),
                config.version,
                serde_json::to_string(&config)?,
                Utc::now().to_rfc3339(),
            ),
        )?;

        Ok(config)
    }

    pub fn get_business_rules(&self, project_id: Uuid) -> Result<Option<BusinessRulesConfig>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let row = conn
            .query_row(
                "SELECT version, config FROM business_rule_configs WHERE project_id = ?",
                [project_id.to_string()],
                |row| Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        let Some((version, config_json)) = row else {
            return Ok(None);
        };
        let mut config: BusinessRulesConfig = serde_json::from_str(&config_json)?;
        config.version = version;
        Ok(Some(config))
    }

    pub fn save_tech_stack(&self, project_id: Uuid, config: &Value) -> Result<()> {
        self.upsert_blob("tech_stack_configs", project_id, config)
    }

    pub fn get_tech_stack(&self, project_id: Uuid) -> Result<Option<ProjectConfigBlob>> {
        self.get_blob("tech_stack_configs", project_id)
    }

    pub fn save_uiux_guidelines(&self, project_id: Uuid, config: &Value) -> Result<()> {
        self.upsert_blob("uiux_configs", project_id, config)
    }

    pub fn get_uiux_guidelines(&self, project_id: Uuid) -> Result<Option<ProjectConfigBlob>> {
        self.get_blob("uiux_configs", project_id)
    }

    fn upsert_blob(&self, table: &'static str, project_id: Uuid, config: &Value) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute(
            &format!(
                "INSERT INTO {table} (project_id, config, updated_at) VALUES (?, ?, ?)
                 ON CONFLICT(project_id) DO UPDATE SET
                    config = excluded.config,
                    updated_at = excluded.updated_at"
            ),
            (
                project_id.to_string(),
                serde_json::to_string(config)?,
                Utc::now().to_rfc3339(),
            ),
        )?;
        Ok(())
    }

    fn get_blob(&self, table: &'static str, project_id: Uuid) -> Result<Option<ProjectConfigBlob>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let row = conn
            .query_row(
                &format!("SELECT config, updated_at FROM {table} WHERE project_id = ?"),
                [project_id.to_string()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        let Some((config_json, updated_at)) = row else {
            return Ok(None);
        };
        Ok(Some(ProjectConfigBlob {
            project_id,
            config: serde_json::from_str(&config_json)?,
            updated_at: parse_datetime(updated_at),
        }))
    }
}

impl HierarchyStore for Database {
    fn clear_hierarchy(&self, project_id: Uuid) -> Result<()> {
        Database::clear_hierarchy(self, project_id)
    }

    fn insert_module(&self, project_id: Uuid, position: usize, module: &Module) -> Result<Uuid> {
        Database::insert_module(self, project_id, position, module)
    }

    fn insert_user_story(
        &self,
        project_id: Uuid,
        module_id: Uuid,
        position: usize,
        story: &UserStory,
    ) -> Result<Uuid> {
        Database::insert_user_story(self, project_id, module_id, position, story)
    }

    fn insert_feature(
        &self,
        project_id: Uuid,
        module_id: Uuid,
        story_id: Uuid,
        position: usize,
        feature: &Feature,
    ) -> Result<Uuid> {
        Database::insert_feature(self, project_id, module_id, story_id, position, feature)
    }

    fn save_business_rules(
        &self,
        project_id: Uuid,
        rules: &[BusinessRule],
    ) -> Result<BusinessRulesConfig> {
        Database::save_business_rules(self, project_id, rules)
    }

    fn save_tech_stack(&self, project_id: Uuid, config: &Value) -> Result<()> {
        Database::save_tech_stack(self, project_id, config)
    }

    fn save_uiux_guidelines(&self, project_id: Uuid, config: &Value) -> Result<()> {
        Database::save_uiux_guidelines(self, project_id, config)
    }

    fn delete_module(&self, id: Uuid) -> Result<bool> {
        Database::delete_module(self, id)
    }

    fn delete_user_story(&self, id: Uuid) -> Result<bool> {
        Database::delete_user_story(self, id)
    }

    fn delete_feature(&self, id: Uuid) -> Result<bool> {
        Database::delete_feature(self, id)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    let overview: Option<String> = row.get(4)?;
    Ok(Project {
        id: parse_uuid(row.get::<_, String>(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        application_type: ApplicationType::from_str(&row.get::<_, String>(3)?).unwrap_or_default(),
        overview: overview.and_then(|json| serde_json::from_str(&json).ok()),
        created_at: parse_datetime(row.get::<_, String>(5)?),
        updated_at: parse_datetime(row.get::<_, String>(6)?),
    })
}

/// Keep a node's incoming id when it is free in `table`, else mint a new one.
///
/// After `clear_hierarchy` a project's own ids are free again, so a re-saved
/// tree keeps its ids while a tree copied from another project gets fresh ones.
fn claim_id(conn: &Connection, table: &'static str, requested: Option<Uuid>) -> Result<Uuid> {
    let Some(id) = requested else {
        return Ok(Uuid::new_v4());
    };
    let taken: bool = conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?)", table),
        [id.to_string()],
        |row| row.get(0),
    )?;
    if taken {
        tracing::debug!(%id, table, "Id already in use, assigning a new one");
        Ok(Uuid::new_v4())
    } else {
        Ok(id)
    }
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_priority(s: String) -> Priority {
    Priority::from_str(&s).unwrap_or_default()
}

fn parse_list(s: String) -> Vec<String> {
    serde_json::from_str(&s).unwrap_or_default()
}
