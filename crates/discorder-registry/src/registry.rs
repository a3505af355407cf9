use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::Connection;
use tracing::{debug, info, instrument, warn};

use discorder_core::types::{ErrorPolicy, ServerConfig, ServerId};

use crate::error::{RegistryError, Result};

/// Collaborator that interactively gathers `{error_policy, embedding_model_id}`
/// for a newly-seen server. Out of scope for this crate (treated as an
/// external collaborator per the terminal setup flow) — callers provide a
/// concrete implementation (e.g. a one-shot DM prompt, or a fixed default for
/// headless deployments).
pub trait ServerSetupFlow: Send + Sync {
    fn collect(&self, server_id: &str, server_name: &str) -> Option<(ErrorPolicy, String)>;
}

/// Fallback setup flow that always answers with conservative defaults.
/// Useful for tests and for servers onboarded non-interactively.
pub struct DefaultSetupFlow {
    pub error_policy: ErrorPolicy,
    pub embedding_model_id: String,
}

impl ServerSetupFlow for DefaultSetupFlow {
    fn collect(&self, _server_id: &str, _server_name: &str) -> Option<(ErrorPolicy, String)> {
        Some((self.error_policy.clone(), self.embedding_model_id.clone()))
    }
}

/// Authoritative source of per-server policy: a durable row per server,
/// mirrored in an in-process map for lock-free-after-publication reads.
pub struct ConfigRegistry {
    db: Mutex<Connection>,
    mirror: Mutex<HashMap<String, ServerConfig>>,
}

impl ConfigRegistry {
    pub fn new(conn: Connection) -> Result<Self> {
        crate::db::init_schema(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
            mirror: Mutex::new(HashMap::new()),
        })
    }

    /// Populate the mirror from the durable store. Called once at startup;
    /// the caller should treat a failure here as fatal.
    #[instrument(skip(self))]
    pub fn load_all(&self) -> Result<Vec<ServerId>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT server_id, server_name, error_policy, embedding_model_id, created_at, updated_at
             FROM server_configs",
        )?;
        let rows = stmt.query_map([], row_to_config)?;

        let mut mirror = self.mirror.lock().unwrap();
        let mut ids = Vec::new();
        for row in rows {
            let cfg = row?;
            ids.push(cfg.server_id.clone());
            mirror.insert(cfg.server_id.as_str().to_string(), cfg);
        }
        info!(count = ids.len(), "config registry loaded");
        Ok(ids)
    }

    /// Mirror-only lookup; never performs I/O.
    pub fn is_configured(&self, server_id: &str) -> bool {
        self.mirror.lock().unwrap().contains_key(server_id)
    }

    pub fn get(&self, server_id: &str) -> Option<ServerConfig> {
        self.mirror.lock().unwrap().get(server_id).cloned()
    }

    /// If the server is not yet configured, run the setup flow and persist +
    /// mirror the result atomically. Returns `true` if the server is
    /// configured after this call (whether it already was, or was just set
    /// up), `false` if setup failed or was declined.
    #[instrument(skip(self, setup), fields(server_id, server_name))]
    pub fn ensure_configured(
        &self,
        server_id: &str,
        server_name: &str,
        setup: &dyn ServerSetupFlow,
    ) -> Result<bool> {
        if self.is_configured(server_id) {
            debug!("already configured");
            return Ok(true);
        }

        let Some((error_policy, embedding_model_id)) = setup.collect(server_id, server_name)
        else {
            warn!("setup flow declined or failed");
            return Ok(false);
        };

        let now = Utc::now();
        let cfg = ServerConfig {
            server_id: ServerId::from(server_id.to_string()),
            server_name: server_name.to_string(),
            error_policy,
            embedding_model_id,
            created_at: now,
            updated_at: now,
        };

        {
            let db = self.db.lock().unwrap();
            let written = db
                .execute(
                    "INSERT OR IGNORE INTO server_configs
                     (server_id, server_name, error_policy, embedding_model_id, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                    rusqlite::params![
                        cfg.server_id.as_str(),
                        cfg.server_name,
                        cfg.error_policy.to_string(),
                        cfg.embedding_model_id,
                        now.to_rfc3339(),
                    ],
                )
                .map_err(RegistryError::Database)?;
            if written == 0 {
                // Raced with a concurrent ensure_configured for the same server;
                // fall through and let the mirror pick up whatever won.
                drop(db);
                return Ok(self.refresh_one(server_id)?.is_some());
            }
        }

        self.mirror
            .lock()
            .unwrap()
            .insert(server_id.to_string(), cfg);
        info!("server configured");
        Ok(true)
    }

    /// Update the server name in both the store and the mirror if it changed.
    /// Per design: this does NOT rewrite historical vector-store metadata —
    /// see DESIGN.md Open Question 1.
    #[instrument(skip(self))]
    pub fn update_name_if_changed(&self, server_id: &str, new_name: &str) -> Result<bool> {
        let Some(mut cfg) = self.get(server_id) else {
            return Err(RegistryError::NotConfigured {
                server_id: server_id.to_string(),
            });
        };
        if cfg.server_name == new_name {
            return Ok(false);
        }

        let now = Utc::now();
        {
            let db = self.db.lock().unwrap();
            db.execute(
                "UPDATE server_configs SET server_name = ?1, updated_at = ?2 WHERE server_id = ?3",
                rusqlite::params![new_name, now.to_rfc3339(), server_id],
            )?;
        }
        cfg.server_name = new_name.to_string();
        cfg.updated_at = now;
        self.mirror
            .lock()
            .unwrap()
            .insert(server_id.to_string(), cfg);
        Ok(true)
    }

    fn refresh_one(&self, server_id: &str) -> Result<Option<ServerConfig>> {
        let db = self.db.lock().unwrap();
        let result = db.query_row(
            "SELECT server_id, server_name, error_policy, embedding_model_id, created_at, updated_at
             FROM server_configs WHERE server_id = ?1",
            rusqlite::params![server_id],
            row_to_config,
        );
        match result {
            Ok(cfg) => {
                drop(db);
                self.mirror
                    .lock()
                    .unwrap()
                    .insert(server_id.to_string(), cfg.clone());
                Ok(Some(cfg))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(RegistryError::Database(e)),
        }
    }
}

fn row_to_config(row: &rusqlite::Row<'_>) -> rusqlite::Result<ServerConfig> {
    let policy_str: String = row.get(2)?;
    let created_str: String = row.get(4)?;
    let updated_str: String = row.get(5)?;
    Ok(ServerConfig {
        server_id: ServerId::from(row.get::<_, String>(0)?),
        server_name: row.get(1)?,
        error_policy: policy_str.parse().unwrap_or(ErrorPolicy::Skip),
        embedding_model_id: row.get(3)?,
        created_at: chrono::DateTime::parse_from_rfc3339(&created_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        updated_at: chrono::DateTime::parse_from_rfc3339(&updated_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ConfigRegistry {
        ConfigRegistry::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    fn setup() -> DefaultSetupFlow {
        DefaultSetupFlow {
            error_policy: ErrorPolicy::Skip,
            embedding_model_id: "nomic-embed-text".to_string(),
        }
    }

    #[test]
    fn not_configured_until_ensured() {
        let reg = registry();
        assert!(!reg.is_configured("g1"));
        assert!(reg.ensure_configured("g1", "Alpha", &setup()).unwrap());
        assert!(reg.is_configured("g1"));
    }

    #[test]
    fn ensure_configured_is_idempotent() {
        let reg = registry();
        assert!(reg.ensure_configured("g1", "Alpha", &setup()).unwrap());
        let cfg_before = reg.get("g1").unwrap();
        assert!(reg.ensure_configured("g1", "Alpha", &setup()).unwrap());
        let cfg_after = reg.get("g1").unwrap();
        assert_eq!(cfg_before.created_at, cfg_after.created_at);
    }

    #[test]
    fn load_all_repopulates_mirror() {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO server_configs (server_id, server_name, error_policy, embedding_model_id, created_at, updated_at)
             VALUES ('g2', 'Beta', 'stop', 'nomic-embed-text', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        let reg = ConfigRegistry::new(conn).unwrap();
        assert!(!reg.is_configured("g2"));
        let ids = reg.load_all().unwrap();
        assert_eq!(ids.len(), 1);
        assert!(reg.is_configured("g2"));
    }

    #[test]
    fn update_name_if_changed_updates_mirror_and_store() {
        let reg = registry();
        reg.ensure_configured("g1", "Alpha", &setup()).unwrap();
        assert!(reg.update_name_if_changed("g1", "Alpha Prime").unwrap());
        assert!(!reg.update_name_if_changed("g1", "Alpha Prime").unwrap());
        assert_eq!(reg.get("g1").unwrap().server_name, "Alpha Prime");
    }
}
