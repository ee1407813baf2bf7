//! Config, Dependency, and Schema Indexers
//!
//! Three file-family sources following one pattern: find the family's
//! files, parse them into a structured JSON payload, hash the content, tag
//! with taxonomy.

use serde_json::{json, Value};

use crate::model::{content_hash, IngestionItem, ItemMetadata, TaxonomyTag};

use super::{IngestContext, IngestionSource, SourceOutput};

// ============================================================================
// PARSING HELPERS
// ============================================================================

/// Strip `//` and `/* */` comments so JSONC configs (tsconfig, eslint)
/// parse as JSON. String contents are preserved.
pub fn strip_json_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut previous = ' ';
                for next in chars.by_ref() {
                    if previous == '*' && next == '/' {
                        break;
                    }
                    previous = next;
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Parse a config file body by extension into a JSON value
pub fn parse_config_value(path: &str, content: &str) -> Option<Value> {
    if path.ends_with(".json") || path.ends_with(".jsonc") || path.contains("rc") {
        serde_json::from_str(&strip_json_comments(content)).ok()
    } else if path.ends_with(".yaml") || path.ends_with(".yml") {
        serde_yaml::from_str::<Value>(content).ok()
    } else if path.ends_with(".toml") {
        toml::from_str::<toml::Value>(content)
            .ok()
            .and_then(|v| serde_json::to_value(v).ok())
    } else {
        None
    }
}

/// Top-level keys of a JSON object, for compact payloads
fn top_level_keys(value: &Value) -> Vec<String> {
    value
        .as_object()
        .map(|o| o.keys().cloned().collect())
        .unwrap_or_default()
}

// ============================================================================
// CONFIG SOURCE
// ============================================================================

const CONFIG_NAMES: &[&str] = &[
    "tsconfig", ".eslintrc", "jest.config", "vite.config", "webpack.config",
    "babel.config", ".prettierrc", "rollup.config",
];

/// Runtime and build configuration files
#[derive(Debug, Default)]
pub struct ConfigSource;

#[async_trait::async_trait]
impl IngestionSource for ConfigSource {
    fn source_type(&self) -> &'static str {
        "configs"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn validate(&self, item: &IngestionItem) -> bool {
        item.payload.get("path").is_some()
    }

    async fn ingest(&self, ctx: &IngestContext) -> SourceOutput {
        let mut output = SourceOutput::default();
        for file in &ctx.files {
            let file_name = file.rsplit('/').next().unwrap_or(file);
            let is_config = CONFIG_NAMES.iter().any(|n| file_name.starts_with(n))
                || (file_name.ends_with(".toml") && file_name != "Cargo.toml");
            if !is_config {
                continue;
            }
            let content = match ctx.read_file(file) {
                Ok(content) => content,
                Err(e) => {
                    output.errors.push(format!("{file}: {e}"));
                    continue;
                }
            };
            let parsed = parse_config_value(file, &content);
            let payload = json!({
                "path": file,
                "keys": parsed.as_ref().map(top_level_keys).unwrap_or_default(),
                "parsed": parsed.is_some(),
            });
            output.items.push(IngestionItem::new(
                self.source_type(),
                self.version(),
                payload,
                ItemMetadata {
                    hash: content_hash(&content),
                    taxonomy: vec![TaxonomyTag::Configuration],
                    path: Some(file.clone()),
                    ..Default::default()
                },
            ));
        }
        output
    }
}

// ============================================================================
// DEPENDENCY SOURCE
// ============================================================================

/// Dependency manifests and lockfiles
#[derive(Debug, Default)]
pub struct DependencySource;

#[async_trait::async_trait]
impl IngestionSource for DependencySource {
    fn source_type(&self) -> &'static str {
        "dependencies"
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
                "package.json" => "npm-manifest",
                "package-lock.json" => "npm-lock",
                "yarn.lock" => "yarn-lock",
                "pnpm-lock.yaml" => "pnpm-lock",
                "Cargo.toml" => "cargo-manifest",
                "Cargo.lock" => "cargo-lock",
                _ => continue,
            };
            let content = match ctx.read_file(file) {
                Ok(content) => content,
                Err(e) => {
                    output.errors.push(format!("{file}: {e}"));
                    continue;
                }
            };

            let dependencies: Vec<String> = match kind {
                "npm-manifest" => serde_json::from_str::<Value>(&content)
                    .ok()
                    .map(|v| {
                        ["dependencies", "devDependencies", "peerDependencies"]
                            .iter()
                            .flat_map(|section| {
                                v.get(section)
                                    .and_then(Value::as_object)
                                    .map(|o| o.keys().cloned().collect::<Vec<_>>())
                                    .unwrap_or_default()
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
                "cargo-manifest" => toml::from_str::<toml::Value>(&content)
                    .ok()
                    .map(|v| {
                        ["dependencies", "dev-dependencies"]
                            .iter()
                            .flat_map(|section| {
                                v.get(section)
                                    .and_then(toml::Value::as_table)
                                    .map(|t| t.keys().cloned().collect::<Vec<_>>())
                                    .unwrap_or_default()
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
                // Lockfiles are counted, not enumerated
                _ => Vec::new(),
            };

            let payload = json!({
                "path": file,
                "kind": kind,
                "dependencies": dependencies,
                "lineCount": content.lines().count(),
            });
            output.items.push(IngestionItem::new(
                self.source_type(),
                self.version(),
                payload,
                ItemMetadata {
                    hash: content_hash(&content),
                    taxonomy: vec![TaxonomyTag::Dependencies],
                    path: Some(file.clone()),
                    ..Default::default()
                },
            ));
        }
        output
    }
}

// ============================================================================
// SCHEMA SOURCE
// ============================================================================

/// Database schemas: Prisma models, SQL DDL, TypeORM entities
#[derive(Debug, Default)]
pub struct SchemaSource;

/// Model/table names found in a schema file
pub fn schema_entities(path: &str, content: &str) -> Vec<String> {
    let mut entities = Vec::new();
    if path.ends_with(".prisma") {
        for line in content.lines() {
            let trimmed = line.trim();
            if let Some(rest) = trimmed.strip_prefix("model ") {
                if let Some(name) = rest.split_whitespace().next() {
                    entities.push(name.to_string());
                }
            }
        }
    } else if path.ends_with(".sql") {
        let upper = content.to_uppercase();
        for (offset, _) in upper.match_indices("CREATE TABLE") {
            let rest = &content[offset + "CREATE TABLE".len()..];
            if let Some(name) = rest
                .split_whitespace()
                .find(|token| !token.eq_ignore_ascii_case("IF") && !token.eq_ignore_ascii_case("NOT") && !token.eq_ignore_ascii_case("EXISTS"))
            {
                entities.push(name.trim_matches(['`', '"', '(']).to_string());
            }
        }
    } else if content.contains("@Entity") {
        // TypeORM: class names following an @Entity decorator
        let mut pending = false;
        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.starts_with("@Entity") {
                pending = true;
            } else if pending {
                if let Some(rest) = trimmed
                    .strip_prefix("export class ")
                    .or_else(|| trimmed.strip_prefix("class "))
                {
                    if let Some(name) = rest.split([' ', '{', '<']).next() {
                        entities.push(name.to_string());
                    }
                    pending = false;
                }
            }
        }
    }
    entities
}

#[async_trait::async_trait]
impl IngestionSource for SchemaSource {
    fn source_type(&self) -> &'static str {
        "schemas"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn validate(&self, item: &IngestionItem) -> bool {
        item.payload.get("path").is_some() && item.payload.get("entities").is_some()
    }

    async fn ingest(&self, ctx: &IngestContext) -> SourceOutput {
        let mut output = SourceOutput::default();
        for file in &ctx.files {
            let is_schema = file.ends_with(".prisma")
                || file.ends_with(".sql")
                || file.contains("entities/")
                || file.contains("entity");
            if !is_schema {
                continue;
            }
            let content = match ctx.read_file(file) {
                Ok(content) => content,
                Err(e) => {
                    output.errors.push(format!("{file}: {e}"));
                    continue;
                }
            };
            let entities = schema_entities(file, &content);
            if entities.is_empty() && !file.ends_with(".prisma") && !file.ends_with(".sql") {
                continue;
            }
            let payload = json!({
                "path": file,
                "entities": entities,
            });
            output.items.push(IngestionItem::new(
                self.source_type(),
                self.version(),
                payload,
                ItemMetadata {
                    hash: content_hash(&content),
                    taxonomy: vec![TaxonomyTag::DatabaseSchema],
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
    fn test_strip_json_comments() {
        let input = r#"{
  // line comment
  "a": 1, /* block */ "b": "http://not-a-comment"
}"#;
        let stripped = strip_json_comments(input);
        let value: Value = serde_json::from_str(&stripped).unwrap();
        assert_eq!(value["a"], 1);
        assert_eq!(value["b"], "http://not-a-comment");
    }

    #[test]
    fn test_parse_config_families() {
        assert!(parse_config_value("tsconfig.json", "{\"compilerOptions\": {}}").is_some());
        assert!(parse_config_value("ci.yaml", "name: test\non: push").is_some());
        assert!(parse_config_value("app.toml", "[section]\nkey = 1").is_some());
        assert!(parse_config_value("script.sh", "echo hi").is_none());
    }

    #[test]
    fn test_prisma_models() {
        let schema = "model User {\n id Int @id\n}\n\nmodel Post {\n id Int @id\n}\n";
        assert_eq!(schema_entities("schema.prisma", schema), vec!["User", "Post"]);
    }

    #[test]
    fn test_sql_tables() {
        let ddl = "CREATE TABLE users (id INT);\nCREATE TABLE IF NOT EXISTS posts (id INT);";
        assert_eq!(schema_entities("init.sql", ddl), vec!["users", "posts"]);
    }

    #[test]
    fn test_typeorm_entities() {
        let source = "@Entity()\nexport class Account {\n}\n\n@Entity('orders')\nclass Order {}";
        assert_eq!(
            schema_entities("src/entities/account.ts", source),
            vec!["Account", "Order"]
        );
    }
}
