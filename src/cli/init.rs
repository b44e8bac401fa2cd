use std::path::PathBuf;

use crate::db::{enable_default_payment_methods, get_connection, init_db};
use crate::error::{MostradorError, Result};
use crate::settings::{load_settings, save_settings, shellexpand_path, DB_FILE};

pub fn run(
    data_dir: Option<String>,
    organization: i64,
    branch: Option<i64>,
    user: Option<String>,
    currency: Option<String>,
) -> Result<()> {
    if organization <= 0 {
        return Err(MostradorError::Validation("organization id must be positive".into()));
    }
    let mut settings = load_settings();
    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    }
    settings.organization_id = Some(organization);
    if branch.is_some() {
        settings.branch_id = branch;
    }
    if user.is_some() {
        settings.user_id = user;
    }
    if let Some(code) = currency {
        settings.currency = code.to_uppercase();
    }
    save_settings(&settings)?;

    let resolved = PathBuf::from(&settings.data_dir);
    std::fs::create_dir_all(&resolved)?;
    std::fs::create_dir_all(resolved.join("exports"))?;

    let conn = get_connection(&resolved.join(DB_FILE))?;
    init_db(&conn)?;
    enable_default_payment_methods(&conn, organization)?;

    println!("Initialized mostrador at {}", resolved.display());
    Ok(())
}
