//! Cartwheel CLI - drive the cart engine from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Show the cart stored on this machine
//! cart show
//!
//! # Add two units of a variant
//! cart add shirt "Shirt (Red, L)" 150 --sale-price 120 --variant RED-L --attr color=Red -q 2
//!
//! # Change or remove a line
//! cart set-qty shirt 3 --variant RED-L
//! cart remove shirt --variant RED-L
//!
//! # Pull the remote cart, then validate before paying
//! cart sync
//! cart checkout
//! ```
//!
//! # Commands
//!
//! - `show` - Print the local cart
//! - `add` / `remove` / `set-qty` / `clear` - Mutate the cart
//! - `sync` - Replace the local cart with the remote one
//! - `checkout` - Validate the cart against the remote store
//!
//! Signed-in mode needs `CART_API_BASE_URL`, `CART_SESSION_TOKEN` and
//! `CART_USER_ID`. Without a session every command runs against the local cart
//! only, and the API URL may be left unset.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "cart")]
#[command(author, version, about = "Cartwheel cart engine CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the local cart
    Show,
    /// Add units of a product
    Add {
        /// Base product ID
        product_id: String,

        /// Display name
        name: String,

        /// List price
        price: Decimal,

        /// Sale price used for totals
        #[arg(long)]
        sale_price: Option<Decimal>,

        /// Variant SKU
        #[arg(short, long)]
        variant: Option<String>,

        /// Image URL
        #[arg(long)]
        image: Option<String>,

        /// Variant attribute as `name=value` (repeatable)
        #[arg(long = "attr", value_parser = parse_attribute)]
        attributes: Vec<(String, String)>,

        /// Units to add
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Remove a line
    Remove {
        /// Base product ID
        product_id: String,

        /// Variant SKU
        #[arg(short, long)]
        variant: Option<String>,
    },
    /// Set a line's quantity (zero or less removes it)
    SetQty {
        /// Base product ID
        product_id: String,

        /// New quantity
        #[arg(allow_negative_numbers = true)]
        quantity: i64,

        /// Variant SKU
        #[arg(short, long)]
        variant: Option<String>,
    },
    /// Empty the cart
    Clear,
    /// Replace the local cart with the remote cart
    Sync,
    /// Validate the cart against the remote store before paying
    Checkout,
}

fn parse_attribute(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got `{s}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("attribute name is empty in `{s}`"));
    }
    Ok((name.to_owned(), value.trim().to_owned()))
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cartwheel_cart=info,cartwheel_cli=info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = commands::open_engine()?;

    match cli.command {
        Commands::Show => commands::cart::show(&engine),
        Commands::Add {
            product_id,
            name,
            price,
            sale_price,
            variant,
            image,
            attributes,
            quantity,
        } => {
            let mut input = cartwheel_core::ItemInput::new(product_id, name, price);
            input.sale_price = sale_price;
            input.variant = variant;
            input.image_url = image;
            input.attributes.extend(attributes);
            commands::cart::add(&mut engine, input, quantity).await?;
        }
        Commands::Remove {
            product_id,
            variant,
        } => commands::cart::remove(&mut engine, &product_id, variant.as_deref()).await?,
        Commands::SetQty {
            product_id,
            quantity,
            variant,
        } => {
            commands::cart::set_quantity(&mut engine, &product_id, variant.as_deref(), quantity)
                .await?;
        }
        Commands::Clear => commands::cart::clear(&mut engine).await,
        Commands::Sync => commands::checkout::sync(&mut engine).await?,
        Commands::Checkout => commands::checkout::checkout(&mut engine).await?,
    }
    Ok(())
}
