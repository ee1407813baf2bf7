//! API, CI, and Security Indexers
//!
//! Outward surfaces of the workspace: HTTP/GraphQL schemas, CI pipelines,
//! and security-sensitive configuration. Same pattern as the config
//! family: parse, hash, tag.

use serde_json::{json, Value};

use crate::model::{content_hash, IngestionItem, ItemMetadata, TaxonomyTag};

use super::configs::parse_config_value;
use super::{IngestContext, IngestionSource, SourceOutput};

// ============================================================================
// API SOURCE
// ============================================================================

/// OpenAPI documents and GraphQL schemas
#[derive(Debug, Default)]
pub struct ApiSource;

/// Operation paths of an OpenAPI document
fn openapi_paths(value: &Value) -> Vec<String> {
    value
        .get("paths")
        .and_then(Value::as_object)
        .map(|paths| paths.keys().cloned().collect())
        .unwrap_or_default()
}

/// Type names of a GraphQL schema
fn graphql_types(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            for prefix in ["type ", "input ", "interface ", "enum "] {
                if let Some(rest) = trimmed.strip_prefix(prefix) {
                    return rest.split([' ', '{']).next().map(str::to_string);
                }
            }
            None
        })
        .collect()
}

#[async_trait::async_trait]
impl IngestionSource for ApiSource {
    fn source_type(&self) -> &'static str {
        "apis"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn validate(&self, item: &IngestionItem) -> bool {
        item.payload.get("path").is_some() && item.payload.get("kind").is_some()
    }

    async fn ingest(&self, ctx: &IngestContext) -> SourceOutput {
        let mut output = SourceOutput::default();
        for file in &ctx.files {
            let file_name = file.rsplit('/').next().unwrap_or(file).to_lowercase();
            let is_openapi = file_name.starts_with("openapi") || file_name.starts_with("swagger");
            let is_graphql = file.ends_with(".graphql") || file.ends_with(".gql");
            if !is_openapi && !is_graphql {
                continue;
            }
            let content = match ctx.read_file(file) {
                Ok(content) => content,
                Err(e) => {
                    output.errors.push(format!("{file}: {e}"));
                    continue;
                }
            };

            let payload = if is_openapi {
                let parsed = parse_config_value(file, &content)
                    .or_else(|| serde_yaml::from_str(&content).ok());
                json!({
                    "path": file,
                    "kind": "openapi",
                    "paths": parsed.as_ref().map(openapi_paths).unwrap_or_default(),
                })
            } else {
                json!({
                    "path": file,
                    "kind": "graphql",
                    "types": graphql_types(&content),
                })
            };
            output.items.push(IngestionItem::new(
                self.source_type(),
                self.version(),
                payload,
                ItemMetadata {
                    hash: content_hash(&content),
                    taxonomy: vec![TaxonomyTag::ApiSchemas],
                    path: Some(file.clone()),
                    ..Default::default()
                },
            ));
        }
        output
    }
}

// ============================================================================
// CI SOURCE
// ============================================================================

/// GitHub workflow definitions
#[derive(Debug, Default)]
pub struct CiSource;

#[async_trait::async_trait]
impl IngestionSource for CiSource {
    fn source_type(&self) -> &'static str {
        "ci"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn validate(&self, item: &IngestionItem) -> bool {
        item.payload.get("path").is_some() && item.payload.get("jobs").is_some()
    }

    async fn ingest(&self, ctx: &IngestContext) -> SourceOutput {
        let mut output = SourceOutput::default();
        for file in &ctx.files {
            if !file.starts_with(".github/workflows/")
                || !(file.ends_with(".yml") || file.ends_with(".yaml"))
            {
                continue;
            }
            let content = match ctx.read_file(file) {
                Ok(content) => content,
                Err(e) => {
                    output.errors.push(format!("{file}: {e}"));
                    continue;
                }
            };
            let parsed: Option<Value> = serde_yaml::from_str(&content).ok();
            let jobs: Vec<String> = parsed
                .as_ref()
                .and_then(|v| v.get("jobs"))
                .and_then(Value::as_object)
                .map(|jobs| jobs.keys().cloned().collect())
                .unwrap_or_default();
            let name = parsed
                .as_ref()
                .and_then(|v| v.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string);

            let payload = json!({
                "path": file,
                "name": name,
                "jobs": jobs,
            });
            output.items.push(IngestionItem::new(
                self.source_type(),
                self.version(),
                payload,
                ItemMetadata {
                    hash: content_hash(&content),
                    taxonomy: vec![TaxonomyTag::CiPipelines],
                    path: Some(file.clone()),
                    ..Default::default()
                },
            ));
        }
        output
    }
}

// ============================================================================
// SECURITY SOURCE
// ============================================================================

/// CODEOWNERS, security policies, and dependency-update configuration
#[derive(Debug, Default)]
pub struct SecuritySource;

/// Parse CODEOWNERS rules into (pattern, owners) pairs
pub fn parse_codeowners(content: &str) -> Vec<(String, Vec<String>)> {
    content
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                return None;
            }
            let mut parts = trimmed.split_whitespace();
            let pattern = parts.next()?.to_string();
            let owners: Vec<String> = parts.map(str::to_string).collect();
            if owners.is_empty() {
                None
            } else {
                Some((pattern, owners))
            }
        })
        .collect()
}

#[async_trait::async_trait]
impl IngestionSource for SecuritySource {
    fn source_type(&self) -> &'static str {
        "security"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn validate(&self, item: &IngestionItem) -> bool {
        item.payload.get("path").is_some() && item.payload.get("kind").is_some()
    }

    async fn ingest(&self, ctx: &IngestContext) -> SourceOutput {
        let mut output = SourceOutput::default();
        for file in &ctx.files {
            let file_name = file.rsplit('/').next().unwrap_or(file);
            let kind = match file_name {
                "CODEOWNERS" => "codeowners",
                "SECURITY.md" => "policy",
                "dependabot.yml" | "dependabot.yaml" => "dependency-updates",
                _ => continue,
            };
            let content = match ctx.read_file(file) {
                Ok(content) => content,
                Err(e) => {
                    output.errors.push(format!("{file}: {e}"));
                    continue;
                }
            };
            let payload = match kind {
                "codeowners" => {
                    let rules = parse_codeowners(&content);
                    json!({
                        "path": file,
                        "kind": kind,
                        "rules": rules.iter().map(|(pattern, owners)| json!({
                            "pattern": pattern,
                            "owners": owners,
                        })).collect::<Vec<_>>(),
                    })
                }
                _ => json!({
                    "path": file,
                    "kind": kind,
                    "lineCount": content.lines().count(),
                }),
            };
            output.items.push(IngestionItem::new(
                self.source_type(),
                self.version(),
                payload,
                ItemMetadata {
                    hash: content_hash(&content),
                    taxonomy: vec![TaxonomyTag::Security],
                    path: Some(file.clone()),
                    ..Default::default()
                },
            ));
        }
        output
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_paths_listing() {
        let doc: Value = serde_json::json!({
            "openapi": "3.0.0",
            "paths": {"/users": {}, "/users/{id}": {}}
        });
        let mut paths = openapi_paths(&doc);
        paths.sort();
        assert_eq!(paths, vec!["/users", "/users/{id}"]);
    }

    #[test]
    fn test_graphql_type_names() {
        let schema = "type Query {\n users: [User]\n}\n\ninput Filter { q: String }\nenum Role { ADMIN }";
        assert_eq!(graphql_types(schema), vec!["Query", "Filter", "Role"]);
    }

    #[test]
    fn test_codeowners_rules() {
        let content = "# comment\n*.ts @frontend\nsrc/db/ @data-team @dba\n\nbroken-line\n";
        let rules = parse_codeowners(content);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].0, "*.ts");
        assert_eq!(rules[1].1, vec!["@data-team", "@dba"]);
    }
}
