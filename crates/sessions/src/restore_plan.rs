//! Restore Plan Builder (§4.7): pure derivation of a layered restore plan
//! from a runtime manifest plus identity. No I/O, no shared state — the
//! whole module is a set of plain functions, the way the teacher's
//! `workspace/files.rs` keeps path-hygiene concerns free of network/queue
//! machinery even though the domain here (container restore, not LLM
//! context files) is entirely new.

use sa_domain::error::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedFile {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountPoint {
    pub source: String,
    pub target_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupRule {
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    KeepSession,
    KeepRegistry,
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        ConflictPolicy::KeepSession
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeManifest {
    pub app_id: String,
    pub project_name: Option<String>,
    pub user_login_name: String,
    pub session_id: String,
    pub runtime_version: String,
    pub workspace_s3_prefix: String,
    #[serde(default)]
    pub conflict_policy: Option<ConflictPolicy>,
    #[serde(default)]
    pub required_paths: Vec<String>,
    #[serde(default)]
    pub protected_paths: Vec<String>,
    #[serde(default)]
    pub seed_files: Vec<SeedFile>,
    #[serde(default)]
    pub mount_points: Vec<MountPoint>,
    #[serde(default)]
    pub cleanup_rules: Vec<CleanupRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreLayerEntry {
    pub layer: &'static str,
    pub kind: &'static str,
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestorePlan {
    pub app_id: String,
    pub runtime_version: String,
    pub workspace_s3_prefix: String,
    pub conflict_policy: ConflictPolicy,
    pub protected_paths: Vec<String>,
    pub required_paths: Vec<String>,
    pub seed_files: Vec<SeedFile>,
    pub mount_points: Vec<MountPoint>,
    pub cleanup_rules: Vec<CleanupRule>,
    pub entries: Vec<RestoreLayerEntry>,
}

/// Collapse repeated `/` and trim trailing slash, preserving a leading `/`.
fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut last_was_slash = false;
    for c in path.chars() {
        if c == '/' {
            if last_was_slash {
                continue;
            }
            last_was_slash = true;
        } else {
            last_was_slash = false;
        }
        out.push(c);
    }
    if out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

/// Validate one path-bearing manifest field per §4.7: absolute,
/// `/workspace`-rooted, free of `..` segments, with `//` collapsed.
fn validate_workspace_path(field: &str, value: &str) -> Result<String> {
    let normalized = collapse_slashes(value);
    if !normalized.starts_with('/') {
        return Err(Error::Validation(format!(
            "field '{field}' must be absolute: got '{value}'"
        )));
    }
    if !normalized.starts_with("/workspace") {
        return Err(Error::Validation(format!(
            "field '{field}' must be rooted at /workspace: got '{value}'"
        )));
    }
    if normalized.split('/').any(|seg| seg == "..") {
        return Err(Error::Validation(format!(
            "field '{field}' must not contain '..' segments: got '{value}'"
        )));
    }
    Ok(normalized)
}

fn validate_paths<'a>(field: &str, values: impl Iterator<Item = &'a str>) -> Result<Vec<String>> {
    values.map(|v| validate_workspace_path(field, v)).collect()
}

/// Trim surrounding slashes from one path segment (§6 "bit-exact" prefix rule).
fn trim_segment(s: &str) -> &str {
    s.trim_matches('/')
}

/// `app/<appId>/project/<projectName||default>/<userLoginName>/session/<sessionId>/workspace`.
pub fn compute_workspace_s3_prefix(
    app_id: &str,
    project_name: Option<&str>,
    user_login_name: &str,
    session_id: &str,
) -> String {
    let project = project_name.filter(|p| !p.is_empty()).unwrap_or("default");
    format!(
        "app/{}/project/{}/{}/session/{}/workspace",
        trim_segment(app_id),
        trim_segment(project),
        trim_segment(user_login_name),
        trim_segment(session_id),
    )
}

/// Build the ordered, layered restore plan (§4.7). Pure: same inputs always
/// produce the same output (§8 invariant 7).
pub fn build_restore_plan(
    manifest: &RuntimeManifest,
    requested_runtime_version: &str,
) -> Result<RestorePlan> {
    if manifest.runtime_version != requested_runtime_version {
        return Err(Error::Validation(format!(
            "runtime version mismatch: manifest has '{}', requested '{}'",
            manifest.runtime_version, requested_runtime_version
        )));
    }

    let required_paths = validate_paths("requiredPaths", manifest.required_paths.iter().map(|s| s.as_str()))?;
    let protected_paths = validate_paths(
        "protectedPaths",
        manifest.protected_paths.iter().map(|s| s.as_str()),
    )?;
    for mp in &manifest.mount_points {
        validate_workspace_path("mountPoints.targetPath", &mp.target_path)?;
    }
    for sf in &manifest.seed_files {
        validate_workspace_path("seedFiles.to", &sf.to)?;
    }
    for cr in &manifest.cleanup_rules {
        validate_workspace_path("cleanupRules.path", &cr.path)?;
    }

    let mount_points: Vec<MountPoint> = manifest
        .mount_points
        .iter()
        .map(|mp| MountPoint {
            source: mp.source.clone(),
            target_path: collapse_slashes(&mp.target_path),
        })
        .collect();
    let seed_files: Vec<SeedFile> = manifest
        .seed_files
        .iter()
        .map(|sf| SeedFile {
            from: sf.from.clone(),
            to: collapse_slashes(&sf.to),
        })
        .collect();
    let cleanup_rules: Vec<CleanupRule> = manifest
        .cleanup_rules
        .iter()
        .map(|cr| CleanupRule {
            path: collapse_slashes(&cr.path),
        })
        .collect();

    let entries = vec![
        RestoreLayerEntry {
            layer: "L0",
            kind: "registry_base",
            source: "registry://base".into(),
            target: "/workspace".into(),
        },
        RestoreLayerEntry {
            layer: "L1",
            kind: "session_overlay",
            source: format!("s3://{}", manifest.workspace_s3_prefix),
            target: "/workspace".into(),
        },
        RestoreLayerEntry {
            layer: "L2",
            kind: "knowledge_overlay",
            source: format!("kb://app/{}", manifest.app_id),
            target: "/workspace/.kb/app".into(),
        },
        RestoreLayerEntry {
            layer: "L2",
            kind: "knowledge_overlay",
            source: format!(
                "kb://project/{}",
                manifest.project_name.as_deref().unwrap_or("default")
            ),
            target: "/workspace/.kb/project".into(),
        },
        RestoreLayerEntry {
            layer: "L3",
            kind: "user_overlay",
            source: format!("kb://user/{}", manifest.user_login_name),
            target: "/workspace/.kb/user".into(),
        },
        RestoreLayerEntry {
            layer: "L4",
            kind: "runtime_fixups",
            source: "runtime://link-agent-data".into(),
            target: "/workspace/.agent_data".into(),
        },
    ];

    Ok(RestorePlan {
        app_id: manifest.app_id.clone(),
        runtime_version: manifest.runtime_version.clone(),
        workspace_s3_prefix: manifest.workspace_s3_prefix.clone(),
        conflict_policy: manifest.conflict_policy.unwrap_or_default(),
        protected_paths,
        required_paths,
        seed_files,
        mount_points,
        cleanup_rules,
        entries,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidateRequiredPathsResult {
    pub ok: bool,
    pub missing_required_paths: Vec<String>,
}

/// `validateRequiredPaths(required, existing) -> {ok, missingRequiredPaths}`
/// using normalized-path set membership (§4.7).
pub fn validate_required_paths(required: &[String], existing: &[String]) -> ValidateRequiredPathsResult {
    let existing_set: std::collections::HashSet<String> =
        existing.iter().map(|p| collapse_slashes(p)).collect();
    let missing: Vec<String> = required
        .iter()
        .map(|p| collapse_slashes(p))
        .filter(|p| !existing_set.contains(p))
        .collect();
    ValidateRequiredPathsResult {
        ok: missing.is_empty(),
        missing_required_paths: missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_manifest() -> RuntimeManifest {
        RuntimeManifest {
            app_id: "app1".into(),
            project_name: Some("proj".into()),
            user_login_name: "alice".into(),
            session_id: "s1".into(),
            runtime_version: "v1".into(),
            workspace_s3_prefix: compute_workspace_s3_prefix("app1", Some("proj"), "alice", "s1"),
            conflict_policy: None,
            required_paths: vec!["/workspace/.agent_data".into()],
            protected_paths: vec!["/workspace/.kb".into()],
            seed_files: vec![],
            mount_points: vec![],
            cleanup_rules: vec![],
        }
    }

    #[test]
    fn workspace_prefix_matches_bit_exact_contract() {
        let prefix = compute_workspace_s3_prefix("app1", Some("proj"), "alice", "s1");
        assert_eq!(prefix, "app/app1/project/proj/alice/session/s1/workspace");
    }

    #[test]
    fn workspace_prefix_defaults_project_name() {
        let prefix = compute_workspace_s3_prefix("app1", None, "alice", "s1");
        assert_eq!(prefix, "app/app1/project/default/alice/session/s1/workspace");
    }

    #[test]
    fn workspace_prefix_trims_segment_slashes() {
        let prefix = compute_workspace_s3_prefix("/app1/", Some("/proj/"), "/alice/", "/s1/");
        assert_eq!(prefix, "app/app1/project/proj/alice/session/s1/workspace");
    }

    #[test]
    fn rejects_runtime_version_mismatch() {
        let manifest = sample_manifest();
        let err = build_restore_plan(&manifest, "v2").unwrap_err();
        assert!(err.to_string().contains("runtime version mismatch"));
    }

    #[test]
    fn rejects_non_workspace_rooted_path() {
        let mut manifest = sample_manifest();
        manifest.required_paths = vec!["/etc/passwd".into()];
        let err = build_restore_plan(&manifest, "v1").unwrap_err();
        assert!(err.to_string().contains("requiredPaths"));
    }

    #[test]
    fn rejects_dotdot_segment() {
        let mut manifest = sample_manifest();
        manifest.required_paths = vec!["/workspace/../etc".into()];
        let err = build_restore_plan(&manifest, "v1").unwrap_err();
        assert!(err.to_string().contains(".."));
    }

    #[test]
    fn collapses_double_slashes() {
        let mut manifest = sample_manifest();
        manifest.required_paths = vec!["/workspace//.agent_data".into()];
        let plan = build_restore_plan(&manifest, "v1").unwrap();
        assert_eq!(plan.required_paths, vec!["/workspace/.agent_data"]);
    }

    #[test]
    fn entries_are_ordered_l0_through_l4() {
        let manifest = sample_manifest();
        let plan = build_restore_plan(&manifest, "v1").unwrap();
        let layers: Vec<&str> = plan.entries.iter().map(|e| e.layer).collect();
        assert_eq!(layers, vec!["L0", "L1", "L2", "L2", "L3", "L4"]);
    }

    #[test]
    fn default_conflict_policy_is_keep_session() {
        let manifest = sample_manifest();
        let plan = build_restore_plan(&manifest, "v1").unwrap();
        assert_eq!(plan.conflict_policy, ConflictPolicy::KeepSession);
    }

    // ── §8 invariant 7: idempotent derivation ────────────────────────
    #[test]
    fn build_is_idempotent() {
        let manifest = sample_manifest();
        let plan1 = build_restore_plan(&manifest, "v1").unwrap();
        let plan2 = build_restore_plan(&manifest, "v1").unwrap();
        assert_eq!(
            serde_json::to_string(&plan1).unwrap(),
            serde_json::to_string(&plan2).unwrap()
        );
    }

    // ── S5: required paths missing ────────────────────────────────────
    #[test]
    fn s5_required_paths_missing() {
        let required = vec![
            "/workspace/.agent_data".to_string(),
            "/workspace/.kb/app".to_string(),
        ];
        let existing = vec!["/workspace/.agent_data".to_string()];
        let result = validate_required_paths(&required, &existing);
        assert!(!result.ok);
        assert_eq!(result.missing_required_paths, vec!["/workspace/.kb/app"]);
    }

    #[test]
    fn validate_required_paths_all_present() {
        let required = vec!["/workspace/a".to_string()];
        let existing = vec!["/workspace/a".to_string()];
        let result = validate_required_paths(&required, &existing);
        assert!(result.ok);
        assert!(result.missing_required_paths.is_empty());
    }
}
