mod aging;
mod bank;
mod cli;
mod context;
mod db;
mod error;
mod fmt;
mod integrations;
mod models;
mod orders;
mod receivables;
mod reconciliation;
mod settings;
mod split;
mod tables;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{
    AccountsCommands, Cli, Commands, IntegrationsCommands, KitchenCommands, OrdersCommands,
    ReceivablesCommands, ReconcileCommands, SplitCommands, TablesCommands,
};
use models::TransactionType;

fn init_tracing() {
    let fallback = settings::load_settings().log_level;
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let result = match cli.command {
        Commands::Init {
            data_dir,
            organization,
            branch,
            user,
            currency,
        } => cli::init::run(data_dir, organization, branch, user, currency),
        Commands::Status => cli::status::run(),
        Commands::Backup { output } => cli::backup::run(output),
        Commands::Completions { shell } => cli::completions::run(shell),
        Commands::Accounts { command } => match command {
            AccountsCommands::Add {
                name,
                account_type,
                bank,
                number,
                currency,
                opening_balance,
            } => cli::accounts::add(
                &name,
                &account_type,
                bank.as_deref(),
                number.as_deref(),
                currency.as_deref(),
                opening_balance,
            ),
            AccountsCommands::List { all } => cli::accounts::list(all),
            AccountsCommands::Deposit(args) => cli::accounts::movement(&args, TransactionType::Credit),
            AccountsCommands::Withdraw(args) => cli::accounts::movement(&args, TransactionType::Debit),
            AccountsCommands::Transactions { account, status } => {
                cli::accounts::transactions(account, status.as_deref())
            }
            AccountsCommands::Delete { transaction } => cli::accounts::delete(transaction),
            AccountsCommands::Deactivate { account } => cli::accounts::deactivate(account),
        },
        Commands::Reconcile { command } => match command {
            ReconcileCommands::Create {
                account,
                period_start,
                period_end,
                opening,
                statement,
                notes,
            } => cli::reconcile::create(account, &period_start, &period_end, opening, statement, notes.as_deref()),
            ReconcileCommands::Show { id } => cli::reconcile::show(id),
            ReconcileCommands::List { account } => cli::reconcile::list(account),
            ReconcileCommands::Start { id } => cli::reconcile::start(id),
            ReconcileCommands::Match {
                id,
                transaction,
                match_type,
            } => cli::reconcile::match_transaction(id, transaction, &match_type),
            ReconcileCommands::Unmatch { item } => cli::reconcile::unmatch(item),
            ReconcileCommands::Close { id } => cli::reconcile::close(id),
        },
        Commands::Receivables { command } => match command {
            ReceivablesCommands::AddCustomer { name, email, phone } => {
                cli::receivables::add_customer(&name, email.as_deref(), phone.as_deref())
            }
            ReceivablesCommands::Customers => cli::receivables::customers(),
            ReceivablesCommands::Add {
                customer,
                amount,
                due,
                issued,
                invoice,
                notes,
            } => cli::receivables::add(customer, amount, &due, issued.as_deref(), invoice.as_deref(), notes.as_deref()),
            ReceivablesCommands::List {
                status,
                customer,
                search,
                page,
                page_size,
            } => cli::receivables::list(status.as_deref(), customer, search, page, page_size),
            ReceivablesCommands::Show { id } => cli::receivables::show(id),
            ReceivablesCommands::Pay {
                id,
                amount,
                method,
                date,
                reference,
            } => cli::receivables::pay(id, amount, &method, date.as_deref(), reference.as_deref()),
            ReceivablesCommands::Stats => cli::receivables::stats(),
            ReceivablesCommands::Aging { customers } => cli::receivables::aging(&customers),
            ReceivablesCommands::Export { output, customers } => cli::receivables::export(output, &customers),
        },
        Commands::Tables { command } => match command {
            TablesCommands::Add { name, capacity, zone } => cli::tables::add(&name, capacity, zone.as_deref()),
            TablesCommands::List { zone } => cli::tables::list(zone.as_deref()),
            TablesCommands::Zones => cli::tables::zones(),
            TablesCommands::Open { table, customers } => cli::tables::open_session(table, customers),
            TablesCommands::Show { table } => cli::tables::show(table),
            TablesCommands::Bill { session } => cli::tables::bill(session),
            TablesCommands::Close { session } => cli::tables::close(session),
            TablesCommands::Combine { main, others } => cli::tables::combine(main, &others),
            TablesCommands::Transfer { session, table } => cli::tables::transfer(session, table),
            TablesCommands::Reserve { table } => cli::tables::reserve(table),
            TablesCommands::Release { table } => cli::tables::release(table),
            TablesCommands::Edit {
                table,
                name,
                capacity,
                zone,
            } => cli::tables::edit(table, name, capacity, zone),
            TablesCommands::Move { table, x, y } => cli::tables::move_to(table, x, y),
            TablesCommands::Remove { table } => cli::tables::remove(table),
        },
        Commands::Orders { command } => match command {
            OrdersCommands::AddItem {
                sale,
                product,
                qty,
                price,
                discount,
            } => cli::orders::add_item(sale, &product, qty, price, discount),
            OrdersCommands::RemoveItem { item } => cli::orders::remove_item(item),
            OrdersCommands::Items { sale } => cli::orders::items(sale),
            OrdersCommands::Kitchen { command } => match command {
                KitchenCommands::Send { sale, station } => cli::orders::send(sale, &station),
                KitchenCommands::List { status } => cli::orders::tickets(status.as_deref()),
                KitchenCommands::Advance { ticket } => cli::orders::advance(ticket),
            },
            OrdersCommands::Methods => cli::orders::methods(),
        },
        Commands::Split { command } => match command {
            SplitCommands::Equal { common } => cli::split::equal(&common),
            SplitCommands::Custom { amounts, common } => cli::split::custom(amounts.as_deref(), &common),
            SplitCommands::Items { assignments, common } => cli::split::items(&assignments, &common),
        },
        Commands::Integrations { command } => match command {
            IntegrationsCommands::Providers => cli::integrations::providers(),
            IntegrationsCommands::Add {
                connector,
                name,
                environment,
            } => cli::integrations::add(&connector, &name, &environment),
            IntegrationsCommands::List { status } => cli::integrations::list(status.as_deref()),
            IntegrationsCommands::Connect { id } => cli::integrations::connect(id),
            IntegrationsCommands::Fail { id, message } => cli::integrations::fail(id, &message),
            IntegrationsCommands::Pause { id } => cli::integrations::pause(id),
            IntegrationsCommands::Resume { id } => cli::integrations::resume(id),
            IntegrationsCommands::Revoke { id } => cli::integrations::revoke(id),
            IntegrationsCommands::Stats => cli::integrations::stats(),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
