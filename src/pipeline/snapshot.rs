//! Reassembles a stored project into a [`ParsedBrd`].
//!
//! Every store read runs on a blocking task. Each module's stories and
//! features get their own task, with at most [`MAX_PARALLEL_READS`] modules
//! in flight. The config blobs are read alongside. Reads finish in any order; positions put them back.

use anyhow::Result;
use futures::stream::{self, StreamExt, TryStreamExt};
use uuid::Uuid;

use crate::db::Database;
use crate::models::{ParsedBrd, UserStory};

/// Upper bound on concurrent per-module reads.
pub const MAX_PARALLEL_READS: usize = 4;

/// Load the project's full tree, or `None` when the project does not exist.
pub async fn load_project_tree(db: &Database, project_id: Uuid) -> Result<Option<ParsedBrd>> {
    let head = {
        let db = db.clone();
        tokio::task::spawn_blocking(move || -> Result<_> {
            let Some(project) = db.get_project(project_id)? else {
                return Ok(None);
            };
            let modules = db.load_modules(project_id)?;
            Ok(Some((project, modules)))
        })
    };
    let Some((project, mut modules)) = head.await?? else {
        return Ok(None);
    };

    let configs = {
        let db = db.clone();
        tokio::task::spawn_blocking(move || -> Result<_> {
            Ok((
                db.get_business_rules(project_id)?,
                db.get_tech_stack(project_id)?,
                db.get_uiux_guidelines(project_id)?,
            ))
        })
    };

    let module_ids: Vec<(usize, Uuid)> = modules
        .iter()
        .enumerate()
        .filter_map(|(i, m)| m.id.map(|id| (i, id)))
        .collect();

    let mut branches: Vec<(usize, Vec<UserStory>)> = stream::iter(module_ids)
        .map(|(position, module_id)| {
            let db = db.clone();
            async move {
                let stories =
                    tokio::task::spawn_blocking(move || load_branch(&db, module_id)).await??;
                Ok::<_, anyhow::Error>((position, stories))
            }
        })
        .buffer_unordered(MAX_PARALLEL_READS)
        .try_collect()
        .await?;

    branches.sort_by_key(|(position, _)| *position);
    for (position, stories) in branches {
        modules[position].user_stories = stories;
    }

    let (rules, tech_stack, uiux) = configs.await??;

    let mut overview = project.overview.unwrap_or_default();
    if overview.project_name.trim().is_empty() {
        overview.project_name = project.name.clone();
    }
    if overview.project_description.trim().is_empty() {
        overview.project_description = project.description.clone().unwrap_or_default();
    }

    let tree = ParsedBrd {
        project_overview: overview,
        application_type: project.application_type,
        modules,
        business_rules: rules.map(|config| config.rules()).unwrap_or_default(),
        tech_stack_suggestions: tech_stack.map(|blob| blob.config),
        ui_ux_guidelines: uiux.map(|blob| blob.config),
    };

    let counts = tree.counts();
    tracing::debug!(
        %project_id,
        modules = counts.modules,
        user_stories = counts.user_stories,
        features = counts.features,
        "Loaded project tree"
    );
    Ok(Some(tree))
}

fn load_branch(db: &Database, module_id: Uuid) -> Result<Vec<UserStory>> {
    let mut stories = db.load_user_stories(module_id)?;
    for story in &mut stories {
        if let Some(story_id) = story.id {
            story.features = db.load_features(story_id)?;
        }
    }
    Ok(stories)
}
