pub mod accounts;
pub mod backup;
pub mod completions;
pub mod init;
pub mod integrations;
pub mod orders;
pub mod receivables;
pub mod reconcile;
pub mod split;
pub mod status;
pub mod tables;

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rusqlite::Connection;

use crate::context::TenantContext;
use crate::db::get_connection;
use crate::error::{MostradorError, Result};
use crate::settings::{load_settings, Settings, DB_FILE};

/// Open the configured store and build the tenant context from settings.
pub(crate) fn open() -> Result<(Connection, TenantContext, Settings)> {
    let settings = load_settings();
    let db_path = PathBuf::from(&settings.data_dir).join(DB_FILE);
    if !db_path.exists() {
        return Err(MostradorError::Other(
            "Database not found. Run `mostrador init` first.".into(),
        ));
    }
    let conn = get_connection(&db_path)?;
    let ctx = TenantContext::from_settings(&settings)?;
    Ok((conn, ctx, settings))
}

pub(crate) fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Parse a comma separated list such as `1,3` or `250.5,100`.
pub(crate) fn parse_list<T: std::str::FromStr>(raw: &str) -> Result<Vec<T>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .map_err(|_| MostradorError::Validation(format!("invalid list entry: {s}")))
        })
        .collect()
}

#[derive(Parser)]
#[command(name = "mostrador", version, about = "Back-office CLI for bank reconciliation, receivables and table service.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the settings file and initialize the database.
    Init {
        /// Path for mostrador data (default: ~/Documents/mostrador)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
        /// Organization id every command is scoped to
        #[arg(long)]
        organization: i64,
        /// Branch id for table service and sales
        #[arg(long)]
        branch: Option<i64>,
        /// User recorded as the author of sessions
        #[arg(long)]
        user: Option<String>,
        /// ISO currency code
        #[arg(long)]
        currency: Option<String>,
    },
    /// Show the configured context and store statistics.
    Status,
    /// Back up the database.
    Backup {
        /// Output path (default: <data_dir>/backups/mostrador-org<N>-YYYYMMDD-HHMMSS.db)
        #[arg(long)]
        output: Option<String>,
    },
    /// Print shell completions.
    Completions {
        shell: clap_complete::Shell,
    },
    /// Manage bank accounts and their transactions.
    Accounts {
        #[command(subcommand)]
        command: AccountsCommands,
    },
    /// Bank reconciliations.
    Reconcile {
        #[command(subcommand)]
        command: ReconcileCommands,
    },
    /// Customers, invoices, payments and aging.
    Receivables {
        #[command(subcommand)]
        command: ReceivablesCommands,
    },
    /// Restaurant tables and their sessions.
    Tables {
        #[command(subcommand)]
        command: TablesCommands,
    },
    /// Sale items and kitchen tickets.
    Orders {
        #[command(subcommand)]
        command: OrdersCommands,
    },
    /// Split a table's bill between comensales and collect payments.
    Split {
        #[command(subcommand)]
        command: SplitCommands,
    },
    /// Third-party integrations.
    Integrations {
        #[command(subcommand)]
        command: IntegrationsCommands,
    },
}

#[derive(Subcommand)]
pub enum AccountsCommands {
    /// Add a bank account.
    Add {
        /// Account name, e.g. 'BBVA Operativa'
        name: String,
        /// Account type: checking, savings, credit_card
        #[arg(long = "type", default_value = "checking")]
        account_type: String,
        #[arg(long)]
        bank: Option<String>,
        #[arg(long)]
        number: Option<String>,
        /// Currency (default: configured currency)
        #[arg(long)]
        currency: Option<String>,
        #[arg(long = "opening-balance", default_value = "0")]
        opening_balance: f64,
    },
    /// List bank accounts.
    List {
        /// Include deactivated accounts
        #[arg(long)]
        all: bool,
    },
    /// Record a credit (money in).
    Deposit(MovementArgs),
    /// Record a debit (money out).
    Withdraw(MovementArgs),
    /// List transactions of an account.
    Transactions {
        account: i64,
        /// pending or matched
        #[arg(long)]
        status: Option<String>,
    },
    /// Delete a pending transaction and reverse its effect on the balance.
    Delete { transaction: i64 },
    /// Deactivate an account. Its history is kept.
    Deactivate { account: i64 },
}

#[derive(clap::Args)]
pub struct MovementArgs {
    pub account: i64,
    pub amount: f64,
    #[arg(long)]
    pub description: String,
    /// YYYY-MM-DD (default: today)
    #[arg(long)]
    pub date: Option<String>,
    #[arg(long)]
    pub reference: Option<String>,
}

#[derive(Subcommand)]
pub enum ReconcileCommands {
    /// Create a draft reconciliation for a statement period.
    Create {
        #[arg(long)]
        account: i64,
        /// Period start: YYYY-MM-DD
        #[arg(long = "from")]
        period_start: String,
        /// Period end: YYYY-MM-DD
        #[arg(long = "to")]
        period_end: String,
        #[arg(long)]
        opening: f64,
        /// Statement ending balance
        #[arg(long)]
        statement: f64,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Show a reconciliation with matched and pending transactions.
    Show { id: i64 },
    /// List reconciliations.
    List {
        #[arg(long)]
        account: Option<i64>,
    },
    /// Move a draft reconciliation to in progress.
    Start { id: i64 },
    /// Match a bank transaction.
    Match {
        id: i64,
        transaction: i64,
        /// payment, journal, manual
        #[arg(long = "type", default_value = "manual")]
        match_type: String,
    },
    /// Remove a matched item.
    Unmatch { item: i64 },
    /// Close the reconciliation. Closed reconciliations cannot be edited.
    Close { id: i64 },
}

#[derive(Subcommand)]
pub enum ReceivablesCommands {
    /// Add a customer.
    AddCustomer {
        name: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },
    /// List customers.
    Customers,
    /// Register an invoice owed by a customer.
    Add {
        #[arg(long)]
        customer: i64,
        #[arg(long)]
        amount: f64,
        /// Due date: YYYY-MM-DD
        #[arg(long)]
        due: String,
        /// Issue date: YYYY-MM-DD (default: today)
        #[arg(long)]
        issued: Option<String>,
        #[arg(long)]
        invoice: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List receivables, one page at a time.
    List {
        /// current, overdue, partial, paid
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        customer: Option<i64>,
        /// Match invoice number or customer name
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value = "1")]
        page: i64,
        #[arg(long = "page-size", default_value = "20")]
        page_size: i64,
    },
    /// Show a receivable with its payments.
    Show { id: i64 },
    /// Record a payment against a receivable.
    Pay {
        id: i64,
        amount: f64,
        #[arg(long, default_value = "transfer")]
        method: String,
        /// YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        reference: Option<String>,
    },
    /// Outstanding totals and counts by status.
    Stats,
    /// Aging report by customer.
    Aging {
        /// Limit to these customer ids
        #[arg(long = "customer")]
        customers: Vec<i64>,
    },
    /// Export the aging report as CSV.
    Export {
        /// Output file (default: stdout)
        #[arg(long)]
        output: Option<String>,
        /// Limit to these customer ids
        #[arg(long = "customer")]
        customers: Vec<i64>,
    },
}

#[derive(Subcommand)]
pub enum TablesCommands {
    /// Add a table to the current branch.
    Add {
        name: String,
        #[arg(long, default_value = "4")]
        capacity: i64,
        #[arg(long)]
        zone: Option<String>,
    },
    /// List tables, optionally in one zone.
    List {
        #[arg(long)]
        zone: Option<String>,
    },
    /// List zones in use.
    Zones,
    /// Open a session (and its sale) on a table.
    Open {
        table: i64,
        #[arg(long, default_value = "1")]
        customers: i64,
    },
    /// Show a table with its open session and items.
    Show { table: i64 },
    /// Request the bill (pre-cuenta) for a session.
    Bill { session: i64 },
    /// Close a session and free its table.
    Close { session: i64 },
    /// Combine other tables into a main table.
    Combine {
        main: i64,
        #[arg(required = true)]
        others: Vec<i64>,
    },
    /// Move a session to a free table.
    Transfer { session: i64, table: i64 },
    /// Reserve a free table.
    Reserve { table: i64 },
    /// Release a reservation.
    Release { table: i64 },
    /// Change a table's name, capacity or zone.
    Edit {
        table: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        capacity: Option<i64>,
        #[arg(long)]
        zone: Option<String>,
    },
    /// Place a table on the floor plan.
    Move { table: i64, x: f64, y: f64 },
    /// Remove a table from service.
    Remove { table: i64 },
}

#[derive(Subcommand)]
pub enum OrdersCommands {
    /// Add an item to a sale.
    AddItem {
        sale: i64,
        product: String,
        #[arg(long, default_value = "1")]
        qty: i64,
        #[arg(long)]
        price: f64,
        #[arg(long, default_value = "0")]
        discount: f64,
    },
    /// Remove an item not yet sent to the kitchen.
    RemoveItem { item: i64 },
    /// List the items of a sale.
    Items { sale: i64 },
    /// Kitchen tickets.
    Kitchen {
        #[command(subcommand)]
        command: KitchenCommands,
    },
    /// Payment methods enabled for the organization.
    Methods,
}

#[derive(Subcommand)]
pub enum KitchenCommands {
    /// Send items not yet ticketed to a station.
    Send {
        sale: i64,
        #[arg(long, default_value = "cocina")]
        station: String,
    },
    /// List tickets.
    List {
        /// pending, preparing, ready, delivered
        #[arg(long)]
        status: Option<String>,
    },
    /// Move a ticket to its next status.
    Advance { ticket: i64 },
}

#[derive(Subcommand)]
pub enum SplitCommands {
    /// Every comensal pays the same share.
    Equal {
        #[command(flatten)]
        common: SplitArgs,
    },
    /// Free amounts per comensal.
    Custom {
        /// Amounts in comensal order, e.g. 300,150.50 (default: even shares)
        #[arg(long)]
        amounts: Option<String>,
        #[command(flatten)]
        common: SplitArgs,
    },
    /// Assign item quantities to comensales.
    Items {
        /// ITEM:COMENSAL:QTY, comensales numbered from 1
        #[arg(long = "assign", required = true)]
        assignments: Vec<String>,
        #[command(flatten)]
        common: SplitArgs,
    },
}

#[derive(clap::Args)]
pub struct SplitArgs {
    pub session: i64,
    #[arg(long, default_value = "2")]
    pub comensales: usize,
    /// Comensal names in order, e.g. Ana,Luis
    #[arg(long)]
    pub names: Option<String>,
    /// Comensales paying now, e.g. 1,3
    #[arg(long)]
    pub pay: Option<String>,
    #[arg(long, default_value = "cash")]
    pub method: String,
    /// Close the session once at least one comensal has paid
    #[arg(long)]
    pub finish: bool,
}

#[derive(Subcommand)]
pub enum IntegrationsCommands {
    /// List providers and their connectors.
    Providers,
    /// Create a connection (starts as draft).
    Add {
        /// Connector code, e.g. sat_cfdi
        connector: String,
        name: String,
        /// sandbox or production
        #[arg(long = "env", default_value = "sandbox")]
        environment: String,
    },
    /// List connections.
    List {
        #[arg(long)]
        status: Option<String>,
    },
    /// Mark a connection as connected.
    Connect { id: i64 },
    /// Record an error reported by a connection.
    Fail { id: i64, message: String },
    /// Pause a connected connection.
    Pause { id: i64 },
    /// Resume a paused connection.
    Resume { id: i64 },
    /// Revoke a connection. Revoked connections cannot be reactivated.
    Revoke { id: i64 },
    /// Connection counts by status and environment.
    Stats,
}
