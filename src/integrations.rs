use rusqlite::{Connection, OptionalExtension, Row};
use tracing::{info, warn};

use crate::context::TenantContext;
use crate::error::{MostradorError, Result};
use crate::models::{
    ConnectionStatus, Environment, IntegrationConnection, IntegrationConnector, IntegrationProvider,
};

#[derive(Debug, PartialEq)]
pub struct IntegrationStats {
    pub total: usize,
    pub by_status: Vec<(ConnectionStatus, usize)>,
    pub by_environment: Vec<(Environment, usize)>,
}

impl IntegrationStats {
    pub fn count(&self, status: ConnectionStatus) -> usize {
        self.by_status
            .iter()
            .find(|(s, _)| *s == status)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}

const SELECT_CONNECTIONS: &str = "\
    SELECT c.id, c.connector_id, k.name, p.name, c.name, c.environment, c.status, c.last_sync_at, c.last_error \
    FROM integration_connections c \
    JOIN integration_connectors k ON k.id = c.connector_id \
    JOIN integration_providers p ON p.id = k.provider_id";

fn connection_from_row(row: &Row) -> rusqlite::Result<IntegrationConnection> {
    Ok(IntegrationConnection {
        id: row.get(0)?,
        connector_id: row.get(1)?,
        connector_name: row.get(2)?,
        provider_name: row.get(3)?,
        name: row.get(4)?,
        environment: row.get(5)?,
        status: row.get(6)?,
        last_sync_at: row.get(7)?,
        last_error: row.get(8)?,
    })
}

pub fn list_providers(conn: &Connection) -> Result<Vec<IntegrationProvider>> {
    let mut stmt = conn.prepare("SELECT id, code, name, category FROM integration_providers ORDER BY name")?;
    let rows = stmt.query_map([], |row| {
        Ok(IntegrationProvider {
            id: row.get(0)?,
            code: row.get(1)?,
            name: row.get(2)?,
            category: row.get(3)?,
        })
    })?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

/// Connectors of one provider (by code), or of every provider.
pub fn list_connectors(conn: &Connection, provider: Option<&str>) -> Result<Vec<IntegrationConnector>> {
    let mut stmt = conn.prepare(
        "SELECT k.id, k.provider_id, k.code, k.name, k.description \
         FROM integration_connectors k JOIN integration_providers p ON p.id = k.provider_id \
         WHERE (?1 IS NULL OR p.code = ?1) ORDER BY p.name, k.name",
    )?;
    let rows = stmt.query_map([provider], |row| {
        Ok(IntegrationConnector {
            id: row.get(0)?,
            provider_id: row.get(1)?,
            code: row.get(2)?,
            name: row.get(3)?,
            description: row.get(4)?,
        })
    })?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

pub fn create_connection(
    conn: &Connection,
    ctx: &TenantContext,
    connector_code: &str,
    name: &str,
    environment: Environment,
) -> Result<IntegrationConnection> {
    let org = ctx.require_organization()?;
    if name.trim().is_empty() {
        return Err(MostradorError::Validation("connection name is required".into()));
    }
    let connector_id: i64 = conn
        .query_row(
            "SELECT id FROM integration_connectors WHERE code = ?1",
            [connector_code],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| MostradorError::Validation(format!("unknown connector: {connector_code}")))?;

    conn.execute(
        "INSERT INTO integration_connections (organization_id, connector_id, name, environment) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![org, connector_id, name.trim(), environment],
    )?;
    let id = conn.last_insert_rowid();
    info!(connection_id = id, connector = connector_code, %environment, "Integration connection created");
    require_connection(conn, ctx, id)
}

pub fn get_connection(conn: &Connection, ctx: &TenantContext, id: i64) -> Result<Option<IntegrationConnection>> {
    let org = ctx.require_organization()?;
    let sql = format!("{SELECT_CONNECTIONS} WHERE c.id = ?1 AND c.organization_id = ?2");
    Ok(conn.query_row(&sql, [id, org], connection_from_row).optional()?)
}

fn require_connection(conn: &Connection, ctx: &TenantContext, id: i64) -> Result<IntegrationConnection> {
    get_connection(conn, ctx, id)?.ok_or(MostradorError::not_found("integration connection", id))
}

pub fn list_connections(
    conn: &Connection,
    ctx: &TenantContext,
    status: Option<ConnectionStatus>,
) -> Result<Vec<IntegrationConnection>> {
    let org = ctx.require_organization()?;
    let sql = format!(
        "{SELECT_CONNECTIONS} WHERE c.organization_id = ?1 AND (?2 IS NULL OR c.status = ?2) ORDER BY c.id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params![org, status], connection_from_row)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

/// Move a connection to `to`, provided its current status is one of `from`.
fn transition(
    conn: &Connection,
    ctx: &TenantContext,
    id: i64,
    from: &[ConnectionStatus],
    to: ConnectionStatus,
    last_error: Option<&str>,
) -> Result<IntegrationConnection> {
    let current = require_connection(conn, ctx, id)?;
    if !from.contains(&current.status) {
        return Err(MostradorError::InvalidState(format!(
            "connection {id} is {}, cannot become {to}",
            current.status
        )));
    }
    let sync = if to == ConnectionStatus::Connected { Some("now") } else { None };
    conn.execute(
        "UPDATE integration_connections SET status = ?1, last_error = ?2, \
         last_sync_at = CASE WHEN ?3 IS NULL THEN last_sync_at ELSE datetime(?3) END \
         WHERE id = ?4",
        rusqlite::params![to, last_error, sync, id],
    )?;
    info!(connection_id = id, from = %current.status, to = %to, "Integration status changed");
    require_connection(conn, ctx, id)
}

const LIVE: &[ConnectionStatus] = &[
    ConnectionStatus::Draft,
    ConnectionStatus::Connected,
    ConnectionStatus::Paused,
    ConnectionStatus::Error,
];

pub fn mark_connected(conn: &Connection, ctx: &TenantContext, id: i64) -> Result<IntegrationConnection> {
    transition(
        conn,
        ctx,
        id,
        &[ConnectionStatus::Draft, ConnectionStatus::Error, ConnectionStatus::Connected],
        ConnectionStatus::Connected,
        None,
    )
}

pub fn mark_error(conn: &Connection, ctx: &TenantContext, id: i64, message: &str) -> Result<IntegrationConnection> {
    let connection = transition(conn, ctx, id, LIVE, ConnectionStatus::Error, Some(message))?;
    warn!(connection_id = id, error = message, "Integration reported an error");
    Ok(connection)
}

pub fn pause(conn: &Connection, ctx: &TenantContext, id: i64) -> Result<IntegrationConnection> {
    transition(conn, ctx, id, &[ConnectionStatus::Connected], ConnectionStatus::Paused, None)
}

pub fn resume(conn: &Connection, ctx: &TenantContext, id: i64) -> Result<IntegrationConnection> {
    transition(conn, ctx, id, &[ConnectionStatus::Paused], ConnectionStatus::Connected, None)
}

pub fn revoke(conn: &Connection, ctx: &TenantContext, id: i64) -> Result<IntegrationConnection> {
    transition(conn, ctx, id, LIVE, ConnectionStatus::Revoked, None)
}

pub fn stats(connections: &[IntegrationConnection]) -> IntegrationStats {
    let by_status = ConnectionStatus::ALL
        .iter()
        .map(|s| (*s, connections.iter().filter(|c| c.status == *s).count()))
        .collect();
    let by_environment = Environment::ALL
        .iter()
        .map(|e| (*e, connections.iter().filter(|c| c.environment == *e).count()))
        .collect();
    IntegrationStats {
        total: connections.len(),
        by_status,
        by_environment,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::db::test_db;

    fn ctx() -> TenantContext {
        TenantContext::new(1)
    }

    #[test]
    fn test_catalog_seeded() {
        let (_dir, conn) = test_db();
        let providers = list_providers(&conn).unwrap();
        assert!(providers.iter().any(|p| p.code == "mercadopago"));
        let connectors = list_connectors(&conn, Some("mercadopago")).unwrap();
        assert_eq!(connectors.len(), 2);
        assert!(list_connectors(&conn, None).unwrap().len() > connectors.len());
    }

    #[test]
    fn test_lifecycle() {
        let (_dir, conn) = test_db();
        let c = create_connection(&conn, &ctx(), "sat_cfdi", "Facturación", Environment::Sandbox).unwrap();
        assert_eq!(c.status, ConnectionStatus::Draft);
        assert_eq!(c.provider_name, "SAT");

        assert!(matches!(pause(&conn, &ctx(), c.id), Err(MostradorError::InvalidState(_))));
        let c = mark_connected(&conn, &ctx(), c.id).unwrap();
        assert!(c.last_sync_at.is_some());
        let c = pause(&conn, &ctx(), c.id).unwrap();
        assert_eq!(c.status, ConnectionStatus::Paused);
        let c = resume(&conn, &ctx(), c.id).unwrap();
        assert_eq!(c.status, ConnectionStatus::Connected);

        let c = mark_error(&conn, &ctx(), c.id, "token expired").unwrap();
        assert_eq!(c.last_error.as_deref(), Some("token expired"));
        let c = mark_connected(&conn, &ctx(), c.id).unwrap();
        assert_eq!(c.last_error, None);

        let c = revoke(&conn, &ctx(), c.id).unwrap();
        assert_eq!(c.status, ConnectionStatus::Revoked);
        for result in [
            mark_connected(&conn, &ctx(), c.id),
            resume(&conn, &ctx(), c.id),
            revoke(&conn, &ctx(), c.id),
            mark_error(&conn, &ctx(), c.id, "late"),
        ] {
            assert!(matches!(result, Err(MostradorError::InvalidState(_))));
        }
    }

    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_rejected_error_report_is_not_logged() {
        let (_dir, conn) = test_db();
        let live = create_connection(&conn, &ctx(), "sat_cfdi", "Facturación", Environment::Sandbox).unwrap();
        let gone = create_connection(&conn, &ctx(), "sat_cfdi", "Vieja", Environment::Sandbox).unwrap();
        revoke(&conn, &ctx(), gone.id).unwrap();

        let logs = Arc::new(Mutex::new(Vec::new()));
        let sink = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || Captured(sink.clone()))
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            assert!(matches!(
                mark_error(&conn, &ctx(), gone.id, "late"),
                Err(MostradorError::InvalidState(_))
            ));
        });
        let text = String::from_utf8(logs.lock().unwrap().clone()).unwrap();
        assert!(!text.contains("Integration reported an error"));
        let gone = get_connection(&conn, &ctx(), gone.id).unwrap().unwrap();
        assert_eq!(gone.last_error, None);

        let sink = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || Captured(sink.clone()))
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            mark_error(&conn, &ctx(), live.id, "token expired").unwrap();
        });
        let text = String::from_utf8(logs.lock().unwrap().clone()).unwrap();
        assert!(text.contains("Integration reported an error"));
    }

    #[test]
    fn test_unknown_connector_and_tenant_isolation() {
        let (_dir, conn) = test_db();
        assert!(create_connection(&conn, &ctx(), "nope", "x", Environment::Sandbox).is_err());
        let c = create_connection(&conn, &ctx(), "rappi_orders", "Rappi centro", Environment::Production).unwrap();
        let other = TenantContext::new(2);
        assert!(get_connection(&conn, &other, c.id).unwrap().is_none());
        assert!(list_connections(&conn, &other, None).unwrap().is_empty());
    }

    #[test]
    fn test_stats() {
        let (_dir, conn) = test_db();
        let a = create_connection(&conn, &ctx(), "sat_cfdi", "A", Environment::Production).unwrap();
        create_connection(&conn, &ctx(), "rappi_orders", "B", Environment::Sandbox).unwrap();
        create_connection(&conn, &ctx(), "bbva_statements", "C", Environment::Sandbox).unwrap();
        mark_connected(&conn, &ctx(), a.id).unwrap();

        let all = list_connections(&conn, &ctx(), None).unwrap();
        let s = stats(&all);
        assert_eq!(s.total, 3);
        assert_eq!(s.count(ConnectionStatus::Connected), 1);
        assert_eq!(s.count(ConnectionStatus::Draft), 2);
        assert_eq!(s.count(ConnectionStatus::Revoked), 0);
        assert_eq!(s.by_environment, vec![(Environment::Sandbox, 2), (Environment::Production, 1)]);
        assert_eq!(list_connections(&conn, &ctx(), Some(ConnectionStatus::Draft)).unwrap().len(), 2);
    }
}
