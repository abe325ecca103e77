//! Terminal stand-ins for the page, the auth UI and the chat widget

use crate::auth::Navigation;

use super::{AccountSummary, AuthView, LogoutEvent, Page, PageLocation, WidgetHooks};

/// A page whose location is given on the command line.
pub struct TerminalPage {
    location: PageLocation,
}

impl TerminalPage {
    pub fn new(location: PageLocation) -> Self {
        Self { location }
    }
}

impl Page for TerminalPage {
    fn location(&self) -> PageLocation {
        self.location.clone()
    }

    fn navigate(&mut self, target: &str) -> Navigation {
        tracing::debug!("Navigating from {} to {}", self.location.href(), target);
        Navigation::Redirect(target.to_string())
    }

    fn reload(&mut self) -> Navigation {
        Navigation::Reload
    }

    fn alert(&mut self, message: &str) {
        eprintln!("Alert: {}", message);
    }

    fn dispatch_logout(&mut self, event: &LogoutEvent) {
        tracing::info!("Dispatched logout event (timestamp {})", event.timestamp);
    }
}

/// Prints the login/logout affordance.
pub struct ConsoleView;

impl AuthView for ConsoleView {
    fn render(&mut self, account: Option<&AccountSummary>) {
        match account {
            Some(account) if account.display_name != account.username => println!(
                "[Logout]  signed in as {} ({})",
                account.display_name, account.username
            ),
            Some(account) => println!("[Logout]  signed in as {}", account.username),
            None => println!("[Login]   not signed in"),
        }
    }
}

/// Widget whose state comes from command-line flags.
pub struct ConsoleWidget {
    active: bool,
    restored: bool,
}

impl ConsoleWidget {
    pub fn new(active: bool, restored: bool) -> Self {
        Self { active, restored }
    }
}

impl WidgetHooks for ConsoleWidget {
    fn is_active(&self) -> bool {
        self.active
    }

    fn load(&mut self) {
        println!("Chat widget loaded");
        self.active = true;
    }

    fn deliver_token(&mut self, token: &str) {
        println!("Delivered token to chat widget ({} chars)", token.len());
    }

    fn is_restored(&self) -> bool {
        self.restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_page_navigation() {
        let location = PageLocation::parse("https://site.example/index.html").unwrap();
        let mut page = TerminalPage::new(location.clone());
        assert_eq!(page.location(), location);
        assert_eq!(
            page.navigate("/support.html"),
            Navigation::Redirect("/support.html".into())
        );
        assert_eq!(page.reload(), Navigation::Reload);
    }

    #[test]
    fn test_console_widget_load_activates() {
        let mut widget = ConsoleWidget::new(false, false);
        assert!(!widget.is_active());
        widget.load();
        assert!(widget.is_active());
        assert!(!widget.is_restored());
    }
}
