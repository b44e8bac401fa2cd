use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

struct Env {
    config: TempDir,
    data: TempDir,
}

impl Env {
    fn new() -> Self {
        Self {
            config: tempfile::tempdir().unwrap(),
            data: tempfile::tempdir().unwrap(),
        }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("mostrador").unwrap();
        cmd.env("MOSTRADOR_CONFIG_DIR", self.config.path())
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG");
        cmd
    }

    fn init(&self) {
        self.cmd()
            .args(["init", "--organization", "1", "--branch", "1", "--user", "caja"])
            .arg("--data-dir")
            .arg(self.data.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("Initialized mostrador"));
    }

    fn run(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.cmd().args(args).assert()
    }
}

#[test]
fn commands_fail_before_init() {
    let env = Env::new();
    env.run(&["tables", "list"])
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn status_reports_context() {
    let env = Env::new();
    env.init();
    env.run(&["status"])
        .success()
        .stdout(predicate::str::contains("Organization: 1"))
        .stdout(predicate::str::contains("Currency:     MXN"));
}

#[test]
fn deposit_and_withdraw_update_balance() {
    let env = Env::new();
    env.init();
    env.run(&["accounts", "add", "Operativa", "--opening-balance", "500"])
        .success()
        .stdout(predicate::str::contains("Added account #1"));
    env.run(&["accounts", "deposit", "1", "100", "--description", "Venta"])
        .success();
    env.run(&["accounts", "withdraw", "1", "40", "--description", "Gas"])
        .success()
        .stdout(predicate::str::contains("New balance: $560.00 MXN"));
    env.run(&["accounts", "withdraw", "1", "-5", "--description", "Bad"])
        .failure();
}

#[test]
fn reconciliation_difference() {
    let env = Env::new();
    env.init();
    env.run(&["accounts", "add", "Operativa", "--opening-balance", "1000"]).success();
    env.run(&["accounts", "deposit", "1", "150", "--description", "Cobro", "--date", "2025-03-10"])
        .success();
    env.run(&[
        "reconcile", "create", "--account", "1", "--from", "2025-03-01", "--to", "2025-03-31",
        "--opening", "1000", "--statement", "1200",
    ])
    .success();
    env.run(&["reconcile", "match", "1", "1"])
        .success()
        .stdout(predicate::str::contains("Difference: $50.00"));
    env.run(&["reconcile", "close", "1"]).success();
    env.run(&["reconcile", "unmatch", "1"])
        .failure()
        .stderr(predicate::str::contains("closed"));
}

#[test]
fn aging_export_is_csv() {
    let env = Env::new();
    env.init();
    env.run(&["receivables", "add-customer", "Comercial \"La Paz\", S.A."]).success();
    env.run(&["receivables", "add", "--customer", "1", "--amount", "1000", "--issued", "2019-12-01", "--due", "2020-01-01"])
        .success();
    env.run(&["receivables", "export"])
        .success()
        .stdout(predicate::str::starts_with("Cliente,0-30 días,31-60 días,61-90 días,+90 días,Total,Riesgo"))
        .stdout(predicate::str::contains("\"Comercial \"\"La Paz\"\", S.A.\""))
        .stdout(predicate::str::contains("Alto Riesgo"));
}

#[test]
fn table_service_with_split_payment() {
    let env = Env::new();
    env.init();
    env.run(&["tables", "add", "Mesa 1", "--zone", "Terraza"]).success();
    env.run(&["tables", "open", "1", "--customers", "2"])
        .success()
        .stdout(predicate::str::contains("sale #1"));
    env.run(&["orders", "add-item", "1", "Tacos", "--qty", "2", "--price", "50"]).success();
    env.run(&["orders", "kitchen", "send", "1"])
        .success()
        .stdout(predicate::str::contains("Sent ticket #1"));

    env.run(&["split", "equal", "1", "--finish"])
        .failure()
        .stderr(predicate::str::contains("no comensal has paid"));
    env.run(&["split", "equal", "1", "--comensales", "2", "--pay", "1", "--finish"])
        .success()
        .stdout(predicate::str::contains("Collected $50.00 by cash"))
        .stdout(predicate::str::contains("Closed session #1"));

    env.run(&["tables", "list"])
        .success()
        .stdout(predicate::str::contains("free"));
}

#[test]
fn custom_split_must_match_total() {
    let env = Env::new();
    env.init();
    env.run(&["tables", "add", "Mesa 1"]).success();
    env.run(&["tables", "open", "1"]).success();
    env.run(&["orders", "add-item", "1", "Mole", "--price", "200"]).success();
    env.run(&["split", "custom", "1", "--amounts", "100,98"])
        .failure()
        .stderr(predicate::str::contains("order total is 200.00"));
    env.run(&["split", "custom", "1", "--amounts", "100,99.5"]).success();
}

#[test]
fn transfer_requires_free_table() {
    let env = Env::new();
    env.init();
    env.run(&["tables", "add", "Mesa 1"]).success();
    env.run(&["tables", "add", "Mesa 2"]).success();
    env.run(&["tables", "open", "1"]).success();
    env.run(&["tables", "open", "2"]).success();
    env.run(&["tables", "transfer", "1", "2"])
        .failure()
        .stderr(predicate::str::contains("not available"));
    env.run(&["tables", "combine", "1", "2"])
        .success()
        .stdout(predicate::str::contains("Freed tables: #2"));
}

#[test]
fn revoked_integration_is_terminal() {
    let env = Env::new();
    env.init();
    env.run(&["integrations", "add", "sat_cfdi", "Facturas"]).success();
    env.run(&["integrations", "connect", "1"]).success();
    env.run(&["integrations", "revoke", "1"]).success();
    env.run(&["integrations", "resume", "1"])
        .failure()
        .stderr(predicate::str::contains("revoked"));
}

#[test]
fn backup_writes_copy() {
    let env = Env::new();
    env.init();
    env.run(&["tables", "add", "Mesa 1"]).success();
    let dest = env.data.path().join("copia.db");
    env.cmd()
        .arg("backup")
        .arg("--output")
        .arg(&dest)
        .assert()
        .success()
        .stdout(predicate::str::contains("Backup saved to"));
    assert!(dest.exists());
}

#[test]
fn combine_rejects_repeated_table() {
    let env = Env::new();
    env.init();
    env.run(&["tables", "add", "Mesa 1"]).success();
    env.run(&["tables", "add", "Mesa 2"]).success();
    env.run(&["tables", "open", "2"]).success();
    env.run(&["tables", "combine", "1", "2", "2"])
        .failure()
        .stderr(predicate::str::contains("more than once"));
    env.run(&["tables", "show", "2"])
        .success()
        .stdout(predicate::str::contains("Session #1 active"));
}
