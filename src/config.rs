//! The Config Loader: reads a virtual-hosts document and resolves each
//! route-reference URN into a validated list of
//! [`crate::spec::VirtualHostSpec`]s.
//!
//! Reads a document with `serde`-typed structs and wraps I/O/parse failures
//! with context.

use crate::error::{Error, ResultExt};
use crate::registry::Registry;
use crate::spec::{VHostConfig, VirtualHostSpec};
use std::path::{Path, PathBuf};

/// Resolves a route URN:
/// - `kixx://…` returns the bundled default route set.
/// - `app://<path>` reads `<app-routes-dir>/<path>`, dropping any
///   empty path segments.
/// - anything else is a configuration error.
async fn resolve_urn(urn: &str, app_routes_dir: &Path) -> crate::Result<Vec<crate::spec::RouteConfig>> {
    if let Some(_rest) = urn.strip_prefix("kixx://") {
        return Ok(default_routes());
    }

    if let Some(rest) = urn.strip_prefix("app://") {
        let relative: PathBuf = rest.split('/').filter(|segment| !segment.is_empty()).collect();
        let path = app_routes_dir.join(relative);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .context(&format!("could not read route document at {}", path.display()))?;
        let routes: Vec<crate::spec::RouteConfig> = serde_json::from_str(&contents)
            .context(&format!("could not parse route document at {}", path.display()))?;
        return Ok(routes);
    }

    Err(Error::assertion("config:resolve_urn", format!("unsupported route URN scheme: {urn}")))
}

/// The bundled default route set returned for every `kixx://` URN. Empty by
/// default; applications are expected to supply their own routes via
/// `app://` references.
fn default_routes() -> Vec<crate::spec::RouteConfig> {
    Vec::new()
}

/// Raw shape of one entry in the virtual-hosts configuration document: like
/// [`VHostConfig`] but with `routes` still as unresolved URN strings.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct VHostDocumentEntry {
    name: Option<String>,
    #[serde(default)]
    hostname: Option<String>,
    #[serde(default)]
    pattern: Option<String>,
    routes: Vec<String>,
}

/// Reads and validates the virtual-hosts configuration, resolving every
/// route URN and running full [`VirtualHostSpec`] validation. Re-invoked by
/// the application on every request cycle to support hot configuration
/// reload — callers must be prepared for the vhost list to change between
/// requests.
pub struct ConfigLoader {
    vhosts_document_path: PathBuf,
    app_routes_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new(vhosts_document_path: impl Into<PathBuf>, app_routes_dir: impl Into<PathBuf>) -> Self {
        ConfigLoader {
            vhosts_document_path: vhosts_document_path.into(),
            app_routes_dir: app_routes_dir.into(),
        }
    }

    /// Loads the virtual-hosts document, resolves every route reference,
    /// and validates the result, but does not resolve middleware/handler
    /// names yet — callers run [`VirtualHostSpec::assign_middleware`]
    /// themselves against their own [`Registry`].
    pub async fn load(&self) -> crate::Result<Vec<VirtualHostSpec>> {
        let contents = tokio::fs::read_to_string(&self.vhosts_document_path)
            .await
            .context(&format!(
                "could not read virtual-hosts document at {}",
                self.vhosts_document_path.display()
            ))?;

        let entries: Vec<VHostDocumentEntry> = serde_json::from_str(&contents).context(&format!(
            "could not parse virtual-hosts document at {}",
            self.vhosts_document_path.display()
        ))?;

        let mut specs = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            let mut all_routes = Vec::new();
            for urn in &entry.routes {
                all_routes.extend(resolve_urn(urn, &self.app_routes_dir).await?);
            }

            let config = VHostConfig {
                name: entry.name,
                hostname: entry.hostname,
                pattern: entry.pattern,
                routes: all_routes,
            };
            specs.push(VirtualHostSpec::validate_and_create(config, index)?);
        }

        Ok(specs)
    }

    /// Loads, resolves middleware against `registry`, and compiles every
    /// vhost into its executable form — the full pipeline a caller runs on
    /// every hot-reload cycle.
    pub async fn load_and_compile(&self, registry: &Registry) -> crate::Result<Vec<crate::vhost::VirtualHost>> {
        let mut specs = self.load().await?;
        let mut compiled = Vec::with_capacity(specs.len());
        for spec in specs.iter_mut() {
            spec.assign_middleware(registry)?;
            compiled.push(spec.to_virtual_host()?);
        }
        Ok(compiled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_unsupported_urn_scheme() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_urn("ftp://whatever", dir.path()).await.unwrap_err();
        assert!(matches!(err, Error::Assertion { .. }));
    }

    #[tokio::test]
    async fn resolves_app_urn_relative_to_routes_dir_dropping_empty_segments() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("users.json"),
            r#"[{"pattern":"/users","targets":[{"name":"list","handlers":["h"]}]}]"#,
        )
        .unwrap();

        let routes = resolve_urn("app:///users.json", dir.path()).await.unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].pattern, "/users");
    }

    #[tokio::test]
    async fn kixx_urn_resolves_to_bundled_default_routes() {
        let dir = tempfile::tempdir().unwrap();
        let routes = resolve_urn("kixx://defaults", dir.path()).await.unwrap();
        assert!(routes.is_empty());
    }

    #[tokio::test]
    async fn load_reads_and_validates_full_vhost_document() {
        let dir = tempfile::tempdir().unwrap();
        let routes_dir = dir.path().join("routes");
        tokio::fs::create_dir_all(&routes_dir).await.unwrap();
        tokio::fs::write(
            routes_dir.join("users.json"),
            r#"[{"pattern":"/users/:id","targets":[{"name":"get","methods":["GET"],"handlers":["load-user"]}]}]"#,
        )
        .await
        .unwrap();

        let vhosts_path = dir.path().join("vhosts.json");
        tokio::fs::write(
            &vhosts_path,
            r#"[{"hostname":"example.com","routes":["app://users.json"]}]"#,
        )
        .await
        .unwrap();

        let loader = ConfigLoader::new(&vhosts_path, &routes_dir);
        let specs = loader.load().await.unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].routes.len(), 1);
    }
}
