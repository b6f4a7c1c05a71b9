use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use patron_client::identity::{self, FileIdentityStore, LaunchParams};
use patron_client::logger::init_logger_with_file;
use patron_client::{ClientConfig, OrderStatus, PatronSession, PaymentMethod};
use std::path::PathBuf;

const DEFAULT_IDENTITY_FILE: &str = "fastorder_identity.json";

#[derive(Parser)]
#[command(name = "fastorder", version, about = "FastOrder patron client")]
struct Cli {
    /// JSON config file (missing file means defaults)
    #[arg(long, env = "FASTORDER_CONFIG", default_value = "fastorder.json")]
    config: PathBuf,

    /// Table number, as printed on the QR code
    #[arg(long, env = "FASTORDER_TABLE")]
    table: Option<String>,

    /// Adopt an existing user id for this run
    #[arg(long)]
    uuid: Option<String>,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Also write logs to daily files in this directory
    #[arg(long, env = "LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Available menu items by category
    Menu,
    /// Current cart
    Cart,
    /// Add a menu item to the cart
    Add {
        item: String,
        #[arg(long, default_value_t = 1)]
        qty: u32,
    },
    /// Remove a cart line
    Remove { line: String },
    /// Place an order with the current cart
    Checkout {
        /// Email or phone number for the invoice
        #[arg(long)]
        contact: String,
        /// wave, orange_money, mtn_momo, moov_money, carte, especes
        #[arg(long)]
        method: PaymentMethod,
    },
    /// Order history
    Orders,
    /// Export the invoice of an order as HTML
    Invoice {
        order: String,
        /// Output directory
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Follow the status of the latest order
    Track,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_logger_with_file(Some(&cli.log_level), cli.log_dir.as_deref());

    let mut config = ClientConfig::load(&cli.config)?;
    config.apply_env()?;

    let identity_path = config
        .identity_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_IDENTITY_FILE));
    let params = LaunchParams {
        table: cli.table.clone(),
        uuid: cli.uuid.clone(),
    };
    let identity = identity::resolve(&params, &FileIdentityStore::new(identity_path));

    let session = PatronSession::connect(config, identity)
        .await
        .context("failed to start session")?;

    run(&session, cli.command).await
}

async fn run(session: &PatronSession, command: Command) -> anyhow::Result<()> {
    let restaurant = &session.config().restaurant;
    match command {
        Command::Menu => {
            println!("{} - {}", restaurant.name, restaurant.slogan);
            for (category, items) in session.menu().grouped() {
                println!("\n[{}]", category);
                for item in items {
                    println!("  {:<38} {:<24} {}", item.id, item.name, restaurant.format_amount(item.price));
                }
            }
        }
        Command::Cart => {
            let cart = session.cart().snapshot();
            if cart.is_empty() {
                println!("Your cart is empty");
                return Ok(());
            }
            for entry in &cart.entries {
                println!(
                    "  {:<38} {:<24} x{:<3} {}",
                    entry.line.id,
                    entry.item.name,
                    entry.line.quantity,
                    restaurant.format_amount(entry.subtotal())
                );
            }
            println!("{} article(s), total {}", cart.item_count(), restaurant.format_amount(cart.total()));
        }
        Command::Add { item, qty } => {
            let cart = session.add_to_cart(&item, qty).await?;
            println!("Cart: {} article(s), {}", cart.item_count(), restaurant.format_amount(cart.total()));
        }
        Command::Remove { line } => {
            let cart = session.remove_from_cart(&line).await?;
            println!("Cart: {} article(s), {}", cart.item_count(), restaurant.format_amount(cart.total()));
        }
        Command::Checkout { contact, method } => {
            session.open_checkout()?;
            let contact = session.checkout_contact(&contact)?;
            session.checkout_select_payment(method)?;
            let order = session.confirm_checkout().await?;
            println!(
                "Order {} placed: table {}, {} by {}",
                order.short_ref(),
                order.table_number,
                restaurant.format_amount(order.total_amount),
                method.display_name()
            );
            println!("Your invoice will be sent by {}", contact.delivery_channel());
        }
        Command::Orders => {
            let records = session.history().records();
            if records.is_empty() {
                println!("No orders yet");
            }
            for record in records {
                println!(
                    "{}  {}  table {}  {} article(s)  {}  {}",
                    record.order.short_ref(),
                    record.order.created_at.as_deref().unwrap_or("-"),
                    record.order.table_number,
                    record.total_articles(),
                    restaurant.format_amount(record.order.total_amount),
                    record.order.status
                );
            }
        }
        Command::Invoice { order, out } => {
            let Some(record) = session
                .history()
                .records()
                .into_iter()
                .find(|r| r.order.id == order || r.order.short_ref() == order.to_uppercase())
            else {
                bail!("no order {} for this user", order);
            };
            let doc = session.export_invoice(&record.order.id).await?;
            std::fs::create_dir_all(&out)?;
            let path = out.join(&doc.file_name);
            std::fs::write(&path, doc.html)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("{}", path.display());
        }
        Command::Track => track(session).await?,
    }
    Ok(())
}

async fn track(session: &PatronSession) -> anyhow::Result<()> {
    let mut status = session.tracker().subscribe_status();
    loop {
        if let Some(view) = session.tracker().banner() {
            println!("[{}] {}: {}", view.status, view.presentation.text, view.presentation.description);
        }
        match status.borrow().as_ref().map(|o| o.status) {
            None => {
                println!("No order to follow");
                return Ok(());
            }
            Some(OrderStatus::Completed) => {
                println!("Your order is ready");
                return Ok(());
            }
            Some(_) => {}
        }

        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                return Ok(());
            }
        }
    }
}
