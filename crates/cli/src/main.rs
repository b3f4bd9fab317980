//! Green Basket CLI - migrations and a terminal shopper.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations (plus the session table)
//! gb-cli migrate
//!
//! # Shop from the terminal
//! gb-cli shop cart add prod_123 -q 2
//! gb-cli shop login -e jane@example.com -p 'secret1!'
//! gb-cli shop status
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `shop cart ...` - Local cart (file-backed slot)
//! - `shop login|register|confirm|password|logout|whoami` - Account session
//! - `shop status` - Backend liveness probe
//! - `shop orders` - Order history

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

use commands::shop::{self, CartAction};

#[derive(Parser)]
#[command(name = "gb-cli")]
#[command(author, version, about = "Green Basket CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Shop from the terminal
    Shop {
        #[command(subcommand)]
        action: ShopAction,
    },
}

#[derive(Subcommand)]
enum ShopAction {
    /// Work with the local cart
    Cart {
        #[command(subcommand)]
        action: CartCommand,
    },
    /// Sign in with email and password
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    /// Create an account
    Register {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
        /// Where the confirmation link should land
        #[arg(long, env = "STOREFRONT_BASE_URL", default_value = "http://localhost:3000")]
        base_url: String,
    },
    /// Finish sign-up with the emailed confirmation link
    Confirm {
        /// The full link from the email
        link: String,
    },
    /// Change the signed-in user's password
    Password {
        #[arg(short, long)]
        password: String,
    },
    /// Sign out
    Logout,
    /// Show who is signed in
    Whoami,
    /// Check whether the backend is reachable
    Status,
    /// List your orders, newest first
    Orders,
}

#[derive(Subcommand)]
enum CartCommand {
    /// Show the cart
    Show,
    /// Add a product
    Add {
        /// Catalog product id (`prod_...`)
        product_id: String,
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Remove one unit of a product
    Remove {
        product_id: String,
    },
    /// Empty the cart
    Clear,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "green_basket_cli=info,green_basket_storefront=warn".into()),
        )
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Shop { action } => match action {
            ShopAction::Cart { action } => shop::cart(action.into()).await?,
            ShopAction::Login { email, password } => shop::login(&email, &password).await?,
            ShopAction::Register {
                email,
                password,
                base_url,
            } => {
                let redirect_to = format!("{}/auth/callback", base_url.trim_end_matches('/'));
                shop::register(&email, &password, &redirect_to).await?;
            }
            ShopAction::Confirm { link } => shop::confirm(&link).await?,
            ShopAction::Password { password } => shop::change_password(&password).await?,
            ShopAction::Logout => shop::logout().await?,
            ShopAction::Whoami => shop::whoami().await?,
            ShopAction::Status => shop::status().await?,
            ShopAction::Orders => shop::orders().await?,
        },
    }
    Ok(())
}

impl From<CartCommand> for CartAction {
    fn from(command: CartCommand) -> Self {
        match command {
            CartCommand::Show => Self::Show,
            CartCommand::Add {
                product_id,
                quantity,
            } => Self::Add {
                product_id,
                quantity,
            },
            CartCommand::Remove { product_id } => Self::Remove { product_id },
            CartCommand::Clear => Self::Clear,
        }
    }
}
