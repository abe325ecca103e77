//! chat-auth - token lifecycle for an embedded chat widget
//!
//! Each invocation is one page load of the widget's host page.

mod auth;
mod browser;
mod config;
mod storage;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use auth::{AuthManager, Navigation, OAuthIdentityClient, PageLoad};
use browser::terminal::{ConsoleView, ConsoleWidget, TerminalPage};
use browser::{PageLocation, WidgetHooks};
use config::Config;
use storage::{BrowserStorage, DirDatabases, FileStore};

#[derive(Parser)]
#[command(name = "chat-auth")]
#[command(about = "Authentication for an embedded chat widget", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Args)]
struct PageArgs {
    /// URL of the page being loaded
    #[arg(long, default_value = "http://localhost/index.html")]
    url: String,

    /// The chat widget is already loaded on this page
    #[arg(long)]
    widget_active: bool,

    /// The chat widget has restored its chat from cache
    #[arg(long)]
    chat_restored: bool,

    /// The page does not embed the chat widget
    #[arg(long, conflicts_with_all = ["widget_active", "chat_restored"])]
    no_widget: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a page: resume any login/logout redirect
    Load {
        #[command(flatten)]
        page: PageArgs,
    },

    /// Sign in, coming back to the given page
    Login {
        #[command(flatten)]
        page: PageArgs,
    },

    /// Sign out, coming back to the given page
    Logout {
        #[command(flatten)]
        page: PageArgs,
    },

    /// Load a page and request a token the way the chat widget does
    Token {
        #[command(flatten)]
        page: PageArgs,
    },

    /// Load a page and show whether it is authenticated
    Status {
        #[command(flatten)]
        page: PageArgs,
    },

    /// Show the signed-in account
    Whoami,

    /// Remove chat widget state from storage
    ClearChat,
}

/// Storage tiers and databases under the data directory.
fn open_storage() -> Result<BrowserStorage> {
    let data_dir = config::data_dir()?;
    Ok(BrowserStorage {
        local: Box::new(FileStore::new(data_dir.join("local-storage.json"))),
        session: Box::new(FileStore::new(data_dir.join("session-storage.json"))),
        databases: Box::new(DirDatabases::new(data_dir.join("indexeddb"))),
    })
}

/// Build the auth manager for one page load.
fn open_page(page: &PageArgs) -> Result<AuthManager<OAuthIdentityClient>> {
    let config = Config::load()?;
    let client = OAuthIdentityClient::load(config.identity.clone())?;
    let storage = open_storage()?;

    let location = PageLocation::parse(&page.url)?;
    let widget: Option<Box<dyn WidgetHooks>> = if page.no_widget {
        None
    } else {
        Some(Box::new(ConsoleWidget::new(page.widget_active, page.chat_restored)))
    };

    Ok(AuthManager::new(
        client,
        config,
        storage,
        Box::new(TerminalPage::new(location)),
        Box::new(ConsoleView),
        widget,
    ))
}

fn report_navigation(navigation: &Navigation) {
    match navigation {
        Navigation::Redirect(target) => println!("Navigate: {}", target),
        Navigation::Reload => println!("Reload page"),
    }
}

/// Run redirect recovery and whatever it scheduled. Returns false if the
/// page was left.
async fn load_page(auth: &mut AuthManager<OAuthIdentityClient>, page: &PageArgs) -> bool {
    let outcome = auth.handle_redirect().await;
    tracing::info!("Page load finished in {:?}", outcome.state());
    match outcome {
        PageLoad::Settled { scheduled, .. } => {
            auth.run_scheduled(scheduled).await;
            if page.chat_restored {
                auth.on_chat_restored();
            }
            true
        }
        PageLoad::NavigatedAway { navigation, .. } => {
            report_navigation(&navigation);
            false
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Load { page } => {
            let mut auth = open_page(&page)?;
            load_page(&mut auth, &page).await;
        }
        Commands::Login { page } => {
            let mut auth = open_page(&page)?;
            if let Some(navigation) = auth.login().await {
                report_navigation(&navigation);
                println!("Run 'chat-auth load --url <redirect URI>' to complete sign-in.");
            }
        }
        Commands::Logout { page } => {
            let mut auth = open_page(&page)?;
            let navigation = auth.logout().await;
            report_navigation(&navigation);
        }
        Commands::Token { page } => {
            let mut auth = open_page(&page)?;
            if load_page(&mut auth, &page).await {
                auth.get_authentication_token(|token| match token {
                    Some(token) => println!("{}", token),
                    None => println!("null"),
                })
                .await;
            }
        }
        Commands::Status { page } => {
            let mut auth = open_page(&page)?;
            if load_page(&mut auth, &page).await {
                if auth.is_authenticated() {
                    println!("Authenticated: yes");
                } else {
                    println!("Authenticated: no");
                }
                match auth.session().token() {
                    Some(token) if !auth.is_token_expired() => {
                        println!("Token:         valid");
                        println!("  expires_on:  {}", token.expires_on);
                    }
                    Some(_) => println!("Token:         expired"),
                    None => println!("Token:         none"),
                }
            }
        }
        Commands::Whoami => {
            let auth = open_page(&PageArgs {
                url: "http://localhost/index.html".to_string(),
                widget_active: false,
                chat_restored: false,
                no_widget: true,
            })?;
            match auth.current_user() {
                Some(user) => {
                    println!();
                    println!("Name:      {}", user.name.as_deref().unwrap_or("(none)"));
                    println!("Username:  {}", user.username);
                    println!("Account:   {}", user.account_id);
                    println!("Tenant:    {}", user.tenant_id);
                }
                None => println!("Not signed in. Run 'chat-auth login' to authenticate."),
            }
        }
        Commands::ClearChat => {
            let config = Config::load()?;
            let mut storage = open_storage()?;
            let report = storage::clear_chat_storage(&mut storage, &config.chat_storage);
            println!(
                "Cleared {} local keys, {} session keys, {} databases",
                report.local_cleared,
                report.session_cleared,
                report.databases_deleted.len()
            );
        }
    }

    Ok(())
}
