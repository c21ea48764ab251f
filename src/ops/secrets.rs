//! Move inline client secrets out of tenants.toml into `secrets.env`

use crate::config::{ConfigManager, parse_env_file};
use crate::error::Result;
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretMigration {
    pub tenant: String,
    pub env_name: String,
}

/// Tenants that still carry an inline secret
pub fn plan(manager: &ConfigManager) -> Result<Vec<SecretMigration>> {
    Ok(manager
        .load_tenants()?
        .iter()
        .filter(|t| t.client_secret.as_deref().is_some_and(|s| !s.is_empty()))
        .map(|t| SecretMigration {
            tenant: t.name.clone(),
            env_name: t.secret_env_name(),
        })
        .collect())
}

fn quote_value(value: &str) -> String {
    if value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || c == '#' || c == '"' || c == '\'')
    {
        if value.contains('\'') {
            format!("\"{}\"", value)
        } else {
            format!("'{}'", value)
        }
    } else {
        value.to_string()
    }
}

/// Set `key=value` lines in an env file body, replacing existing keys and
/// keeping everything else (comments included) in place
pub fn merge_env(existing: &str, updates: &[(String, String)]) -> String {
    let mut pending: Vec<&(String, String)> = updates.iter().collect();
    let mut lines: Vec<String> = Vec::new();

    for line in existing.lines() {
        let key = line
            .trim()
            .strip_prefix("export ")
            .unwrap_or(line.trim())
            .split_once('=')
            .map(|(k, _)| k.trim());

        match key.and_then(|k| pending.iter().position(|(name, _)| name == k)) {
            Some(idx) => {
                let (name, value) = pending.remove(idx);
                lines.push(format!("{}={}", name, quote_value(value)));
            }
            None => lines.push(line.to_string()),
        }
    }

    for (name, value) in pending {
        lines.push(format!("{}={}", name, quote_value(value)));
    }

    let mut body = lines.join("\n");
    body.push('\n');
    body
}

fn write_private(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

/// Run the migration. With `dry_run` nothing is written and the plan is
/// returned as-is.
pub fn migrate(manager: &ConfigManager, dry_run: bool) -> Result<Vec<SecretMigration>> {
    let planned = plan(manager)?;
    if dry_run || planned.is_empty() {
        return Ok(planned);
    }

    let mut tenants = manager.load_tenants()?;
    let mut updates = Vec::new();
    for tenant in tenants.iter_mut() {
        let Some(secret) = tenant.client_secret.take().filter(|s| !s.is_empty()) else {
            continue;
        };
        let env_name = tenant.secret_env_name();
        updates.push((env_name.clone(), secret));
        tenant.client_secret_env = Some(env_name);
    }

    // Secrets land on disk before tenants.toml stops carrying them
    let secrets_path = manager.secrets_file();
    let existing = if secrets_path.exists() {
        fs::read_to_string(&secrets_path)?
    } else {
        String::from("# Client secrets moved out of tenants.toml by m365ops\n")
    };
    write_private(&secrets_path, &merge_env(&existing, &updates))?;
    manager.save_tenants(&tenants)?;

    info!(count = planned.len(), path = %secrets_path.display(), "Migrated client secrets");
    Ok(planned)
}

/// True when every migrated tenant resolves its secret from `secrets.env`
pub fn verify(manager: &ConfigManager, migrated: &[SecretMigration]) -> Result<bool> {
    let path = manager.secrets_file();
    if !path.exists() {
        return Ok(migrated.is_empty());
    }
    let vars = parse_env_file(&fs::read_to_string(path)?);
    Ok(migrated
        .iter()
        .all(|m| vars.get(&m.env_name).is_some_and(|v| !v.is_empty())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TenantConfig;
    use pretty_assertions::assert_eq;

    fn manager_with_secret() -> (tempfile::TempDir, ConfigManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_dir(dir.path()).unwrap();
        let mut contoso = TenantConfig::new("Contoso EU", "tid", "cid");
        contoso.client_secret = Some("s3cr3t value".into());
        manager.add_tenant(contoso).unwrap();
        manager
            .add_tenant(TenantConfig::new("fabrikam", "tid2", "cid2"))
            .unwrap();
        (dir, manager)
    }

    #[test]
    fn test_plan_lists_inline_secrets() {
        let (_dir, manager) = manager_with_secret();
        assert_eq!(
            plan(&manager).unwrap(),
            vec![SecretMigration {
                tenant: "Contoso EU".into(),
                env_name: "M365OPS_CONTOSO_EU_CLIENT_SECRET".into(),
            }]
        );
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let (_dir, manager) = manager_with_secret();
        migrate(&manager, true).unwrap();
        assert!(!manager.secrets_file().exists());
        assert!(manager.get_tenant("Contoso EU").unwrap().client_secret.is_some());
    }

    #[test]
    fn test_migrate_moves_secret() {
        let (_dir, manager) = manager_with_secret();
        let migrated = migrate(&manager, false).unwrap();
        assert_eq!(migrated.len(), 1);
        assert!(verify(&manager, &migrated).unwrap());

        let tenant = manager.get_tenant("Contoso EU").unwrap();
        assert_eq!(tenant.client_secret, None);
        assert_eq!(
            tenant.client_secret_env.as_deref(),
            Some("M365OPS_CONTOSO_EU_CLIENT_SECRET")
        );
        assert_eq!(
            manager.resolve_client_secret(&tenant).unwrap().as_deref(),
            Some("s3cr3t value")
        );

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(manager.secrets_file()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        // Second run has nothing left to do
        assert!(migrate(&manager, false).unwrap().is_empty());
    }

    #[test]
    fn test_merge_env_replaces_existing_keys() {
        let existing = "# secrets\nOTHER=1\nexport M365OPS_A_CLIENT_SECRET=old\n";
        let merged = merge_env(
            existing,
            &[
                ("M365OPS_A_CLIENT_SECRET".into(), "new".into()),
                ("M365OPS_B_CLIENT_SECRET".into(), "has space".into()),
            ],
        );
        assert_eq!(
            merged,
            "# secrets\nOTHER=1\nM365OPS_A_CLIENT_SECRET=new\nM365OPS_B_CLIENT_SECRET='has space'\n"
        );
        let vars = parse_env_file(&merged);
        assert_eq!(vars["M365OPS_B_CLIENT_SECRET"], "has space");
    }
}
