use std::path::{Path, PathBuf};

use tracing::info;

use crate::context::TenantContext;
use crate::db;
use crate::error::Result;
use crate::fmt::format_bytes;
use crate::settings::get_data_dir;

/// `<data_dir>/backups/mostrador-org<N>-<stamp>.db`
fn default_destination(data_dir: &Path, ctx: &TenantContext) -> Result<PathBuf> {
    let backups_dir = data_dir.join("backups");
    std::fs::create_dir_all(&backups_dir)?;
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    Ok(backups_dir.join(format!("mostrador-org{}-{stamp}.db", ctx.organization_id)))
}

pub fn run(output: Option<String>) -> Result<()> {
    let (conn, ctx, _) = super::open()?;
    let dest = match output {
        Some(p) => PathBuf::from(p),
        None => default_destination(&get_data_dir(), &ctx)?,
    };

    let size = db::backup_to(&conn, &dest)?;
    info!(path = %dest.display(), size, "Backup written");
    println!("Backup saved to {} ({})", dest.display(), format_bytes(size));
    Ok(())
}
