use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::error::Result;
use crate::integrations;
use crate::models::{ConnectionStatus, Environment, IntegrationConnection};

use super::open;

fn status_cell(status: ConnectionStatus) -> String {
    match status {
        ConnectionStatus::Connected => status.as_str().green().to_string(),
        ConnectionStatus::Error => status.as_str().red().to_string(),
        ConnectionStatus::Paused => status.as_str().yellow().to_string(),
        ConnectionStatus::Revoked => status.as_str().dimmed().to_string(),
        ConnectionStatus::Draft => status.as_str().to_string(),
    }
}

fn report(c: &IntegrationConnection) {
    println!(
        "Connection #{} {} ({} / {}) is {}",
        c.id,
        c.name,
        c.provider_name,
        c.connector_name,
        status_cell(c.status)
    );
}

pub fn providers() -> Result<()> {
    let (conn, _, _) = open()?;
    let mut table = Table::new();
    table.set_header(vec!["Provider", "Category", "Connector", "Description"]);
    for p in integrations::list_providers(&conn)? {
        for c in integrations::list_connectors(&conn, Some(p.code.as_str()))? {
            table.add_row(vec![
                Cell::new(&p.name),
                Cell::new(&p.category),
                Cell::new(c.code),
                Cell::new(c.description.unwrap_or_default()),
            ]);
        }
    }
    println!("Integration catalog\n{table}");
    Ok(())
}

pub fn add(connector: &str, name: &str, environment: &str) -> Result<()> {
    let (conn, ctx, _) = open()?;
    let environment: Environment = environment.parse()?;
    let c = integrations::create_connection(&conn, &ctx, connector, name, environment)?;
    report(&c);
    Ok(())
}

pub fn list(status: Option<&str>) -> Result<()> {
    let (conn, ctx, _) = open()?;
    let status: Option<ConnectionStatus> = status.map(str::parse).transpose()?;
    let rows = integrations::list_connections(&conn, &ctx, status)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Provider", "Connector", "Env", "Status", "Last sync", "Last error"]);
    for c in rows {
        table.add_row(vec![
            Cell::new(c.id),
            Cell::new(&c.name),
            Cell::new(&c.provider_name),
            Cell::new(&c.connector_name),
            Cell::new(c.environment),
            Cell::new(status_cell(c.status)),
            Cell::new(c.last_sync_at.as_deref().unwrap_or("")),
            Cell::new(c.last_error.as_deref().unwrap_or("")),
        ]);
    }
    println!("Integrations\n{table}");
    Ok(())
}

pub fn connect(id: i64) -> Result<()> {
    let (conn, ctx, _) = open()?;
    report(&integrations::mark_connected(&conn, &ctx, id)?);
    Ok(())
}

pub fn fail(id: i64, message: &str) -> Result<()> {
    let (conn, ctx, _) = open()?;
    report(&integrations::mark_error(&conn, &ctx, id, message)?);
    Ok(())
}

pub fn pause(id: i64) -> Result<()> {
    let (conn, ctx, _) = open()?;
    report(&integrations::pause(&conn, &ctx, id)?);
    Ok(())
}

pub fn resume(id: i64) -> Result<()> {
    let (conn, ctx, _) = open()?;
    report(&integrations::resume(&conn, &ctx, id)?);
    Ok(())
}

pub fn revoke(id: i64) -> Result<()> {
    let (conn, ctx, _) = open()?;
    report(&integrations::revoke(&conn, &ctx, id)?);
    Ok(())
}

pub fn stats() -> Result<()> {
    let (conn, ctx, _) = open()?;
    let all = integrations::list_connections(&conn, &ctx, None)?;
    let s = integrations::stats(&all);

    println!("Connections: {}", s.total);
    let mut table = Table::new();
    table.set_header(vec!["Status", "Count"]);
    for (status, n) in &s.by_status {
        table.add_row(vec![Cell::new(status_cell(*status)), Cell::new(n)]);
    }
    println!("{table}");

    let mut table = Table::new();
    table.set_header(vec!["Environment", "Count"]);
    for (env, n) in &s.by_environment {
        table.add_row(vec![Cell::new(env), Cell::new(n)]);
    }
    println!("{table}");
    Ok(())
}
