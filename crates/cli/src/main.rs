//! Basket CLI - storefront session, cart, and wishlist from the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Log in (password from BASKET_PASSWORD or --password)
//! basket login -e shopper@example.com
//!
//! # Show the cart, change a quantity, remove a line
//! basket cart show
//! basket cart set v-123 4
//! basket cart remove v-123
//!
//! # Toggle a product on the wishlist
//! basket wishlist toggle p-42
//!
//! # Act as the admin surface
//! basket --surface admin refresh
//! ```
//!
//! # Commands
//!
//! - `login` / `logout` / `refresh` - Session lifecycle
//! - `cart show|set|remove|clear` - Cart
//! - `wishlist show|toggle|clear` - Wishlist
//!
//! Configuration is read from the environment (see `basket_client::config`).
//! Credentials persist in `BASKET_STATE_FILE`, or `.basket/state.json` when
//! unset.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;
use std::sync::Arc;

use basket_client::{Basket, ClientConfig};
use basket_core::Surface;
use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod render;

use render::TerminalRenderer;

/// State file used when `BASKET_STATE_FILE` is not set.
const DEFAULT_STATE_FILE: &str = ".basket/state.json";

#[derive(Parser)]
#[command(name = "basket")]
#[command(author, version, about = "Basket storefront client")]
struct Cli {
    /// Client surface (`storefront`, `admin`, `inventory`)
    #[arg(long, global = true)]
    surface: Option<Surface>,

    /// Emit logs as JSON
    #[arg(long, global = true, env = "BASKET_LOG_JSON")]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and merge the guest cart and wishlist
    Login {
        /// Account email address
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(long, env = "BASKET_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Exchange the refresh token for a new access token
    Refresh,
    /// Inspect or change the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Inspect or change the wishlist
    Wishlist {
        #[command(subcommand)]
        action: WishlistAction,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Show the cart
    Show,
    /// Set a line's quantity (0 removes it)
    Set {
        /// Variant id of the line
        variant: String,
        /// New quantity
        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },
    /// Remove a line
    Remove {
        /// Variant id of the line
        variant: String,
    },
    /// Empty the cart
    Clear,
}

#[derive(Subcommand)]
enum WishlistAction {
    /// Show the wishlist
    Show,
    /// Add a product, or remove it if already present
    Toggle {
        /// Product id
        product: String,
    },
    /// Empty the wishlist
    Clear,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ClientConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry_sample_rate,
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing(json: bool) {
    // Defaults to info level for our crates if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "basket_client=info,basket_cli=info".into());

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .with(sentry_tracing::layer().event_filter(sentry_event_filter))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .with(sentry_tracing::layer().event_filter(sentry_event_filter))
            .init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(cli.json_logs);
            tracing::error!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };
    if let Some(surface) = cli.surface {
        config.surface = surface;
    }
    config
        .state_file
        .get_or_insert_with(|| PathBuf::from(DEFAULT_STATE_FILE));

    // Sentry must be initialized before the tracing subscriber
    let _sentry_guard = init_sentry(&config);
    init_tracing(cli.json_logs);

    if let Err(e) = run(cli.command, config).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: ClientConfig) -> Result<(), commands::CommandError> {
    let renderer = Arc::new(TerminalRenderer::default());
    let basket = Basket::from_config(config, renderer.clone())?;

    match command {
        Commands::Login { email, password } => {
            commands::session::login(&basket, &email, password).await?;
        }
        Commands::Logout => commands::session::logout(&basket)?,
        Commands::Refresh => commands::session::refresh(&basket).await?,
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show(&basket).await?,
            CartAction::Set { variant, quantity } => {
                commands::cart::set(&basket, &renderer, &variant, quantity).await?;
            }
            CartAction::Remove { variant } => {
                commands::cart::remove(&basket, &renderer, &variant).await?;
            }
            CartAction::Clear => commands::cart::clear(&basket, &renderer).await?,
        },
        Commands::Wishlist { action } => match action {
            WishlistAction::Show => commands::wishlist::show(&basket).await?,
            WishlistAction::Toggle { product } => {
                commands::wishlist::toggle(&basket, &product).await?;
            }
            WishlistAction::Clear => commands::wishlist::clear(&basket).await?,
        },
    }
    Ok(())
}
