use crate::error::CliError;
use engine_processing::coordinator::PRIORITY_PATH_BOOST;
use model::{
    core::repository::Repository,
    records::work_item::WorkItem,
};
use serde::Deserialize;
use std::path::Path;

/// One entry of a targets file.
///
/// ```json
/// [{ "repo": "acme/api", "paths": ["package.json"], "priority_paths": ["package.json"] }]
/// ```
///
/// An empty `paths` list means "every configured common manifest file".
#[derive(Debug, Clone, Deserialize)]
pub struct TargetSpec {
    pub repo: String,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub priority_paths: Vec<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub default_branch: Option<String>,
    /// Priority applied to every path of this target.
    #[serde(default)]
    pub priority: i32,
}

pub fn parse_targets(source: &str, origin: &str) -> Result<Vec<TargetSpec>, CliError> {
    serde_json::from_str(source).map_err(|source| CliError::TargetsParse {
        path: origin.to_string(),
        source,
    })
}

pub async fn load_targets(path: impl AsRef<Path>) -> Result<Vec<TargetSpec>, CliError> {
    let path = path.as_ref();
    let source = tokio::fs::read_to_string(path).await?;
    parse_targets(&source, &path.display().to_string())
}

/// Expands target specs into work items, falling back to `default_paths`
/// for targets that list none.
pub fn to_work_items(
    targets: &[TargetSpec],
    default_paths: &[String],
) -> Result<Vec<WorkItem>, CliError> {
    let mut items = Vec::new();

    for target in targets {
        let mut repo = Repository::parse(&target.repo)
            .ok_or_else(|| CliError::InvalidTarget(target.repo.clone()))?
            .archived(target.archived);
        if let Some(branch) = &target.default_branch {
            repo = repo.with_default_branch(branch.clone());
        }

        let paths = if target.paths.is_empty() {
            default_paths
        } else {
            &target.paths
        };

        for path in paths {
            let boost = if target.priority_paths.contains(path) {
                PRIORITY_PATH_BOOST
            } else {
                0
            };
            items.push(
                WorkItem::new(repo.clone(), path.clone()).with_priority(target.priority + boost),
            );
        }
    }

    Ok(items)
}
