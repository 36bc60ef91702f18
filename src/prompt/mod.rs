//! Interactive questions
//!
//! The remote desktop question and the credential prompt. Both are modal:
//! the session bring-up waits until the user answers.
//!
//! [`ConsolePrompter`] renders the questions on the text console through a
//! [`LineSource`]; the terminal is driven on a blocking thread so the async
//! runtime keeps serving child watchers while the user types.

use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Result, SessionError};
use crate::session::Credentials;

/// Minimum accepted password length
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Which remote desktop question to ask
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RdQuestion {
    /// Text mode was chosen; offer remote desktop instead
    TextModeLimits,
    /// The local graphical session failed to start
    GraphicalStartupFailed,
}

impl RdQuestion {
    /// Message shown above the choices
    pub fn message(&self) -> &'static str {
        match self {
            RdQuestion::TextModeLimits => {
                "Text mode provides a limited set of installation options. It does not \
                 offer custom partitioning for full control over the disk layout. Would \
                 you like to use remote graphical access via the RDP protocol instead?"
            }
            RdQuestion::GraphicalStartupFailed => {
                "Wayland was unable to start on your machine. Would you like to start an \
                 RDP session to connect to this computer from another computer and perform \
                 a graphical installation or continue with a text mode installation?"
            }
        }
    }
}

/// Answer to the remote desktop question
#[derive(Debug, Clone)]
pub enum RdAnswer {
    /// Use remote desktop with these credentials
    Accepted(Credentials),
    /// Stay in text mode
    Declined,
}

/// Interactive question subsystem
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Ask whether to use a remote desktop session
    async fn ask_remote_desktop(&self, question: RdQuestion) -> Result<RdAnswer>;

    /// Ask for the credentials missing from `current`
    ///
    /// Returns `None` when the user cancels.
    async fn ask_credentials(&self, current: &Credentials) -> Result<Option<Credentials>>;
}

/// Line-oriented terminal
pub trait LineSource: Send + Sync {
    /// Print one line
    fn write_line(&self, text: &str) -> io::Result<()>;

    /// Read one line of visible input
    fn read_line(&self) -> io::Result<String>;

    /// Read one line without echo
    fn read_secret(&self) -> io::Result<String>;
}

impl LineSource for console::Term {
    fn write_line(&self, text: &str) -> io::Result<()> {
        console::Term::write_line(self, text)
    }

    fn read_line(&self) -> io::Result<String> {
        console::Term::read_line(self)
    }

    fn read_secret(&self) -> io::Result<String> {
        console::Term::read_secure_line(self)
    }
}

/// Prompter on the text console
pub struct ConsolePrompter {
    source: Arc<dyn LineSource>,
    width: usize,
}

impl ConsolePrompter {
    /// Prompter on the process terminal
    pub fn stdout() -> Self {
        let term = console::Term::stdout();
        let width = term.size_checked().map(|(_, cols)| cols as usize).unwrap_or(80);
        Self::new(Arc::new(term), width)
    }

    /// Prompter on an arbitrary line source
    pub fn new(source: Arc<dyn LineSource>, width: usize) -> Self {
        Self {
            source,
            width: width.max(20),
        }
    }
}

#[async_trait]
impl Prompter for ConsolePrompter {
    async fn ask_remote_desktop(&self, question: RdQuestion) -> Result<RdAnswer> {
        let source = Arc::clone(&self.source);
        let width = self.width;

        tokio::task::spawn_blocking(move || ask_remote_desktop_blocking(source.as_ref(), question, width))
            .await
            .map_err(|e| SessionError::Prompt(format!("prompt task failed: {}", e)))?
    }

    async fn ask_credentials(&self, current: &Credentials) -> Result<Option<Credentials>> {
        let source = Arc::clone(&self.source);
        let current = current.clone();

        tokio::task::spawn_blocking(move || ask_credentials_blocking(source.as_ref(), &current))
            .await
            .map_err(|e| SessionError::Prompt(format!("prompt task failed: {}", e)))?
    }
}

/// Map end of input to a cancel, everything else to an error
fn cancelled_on_eof<T>(result: io::Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(SessionError::Prompt(e.to_string())),
    }
}

fn write(source: &dyn LineSource, text: &str) -> Result<()> {
    source
        .write_line(text)
        .map_err(|e| SessionError::Prompt(e.to_string()))
}

fn ask_remote_desktop_blocking(
    source: &dyn LineSource,
    question: RdQuestion,
    width: usize,
) -> Result<RdAnswer> {
    write(source, "")?;
    write(source, "RDP")?;
    write(source, "")?;
    write(source, &textwrap::fill(question.message(), width))?;
    write(source, "")?;
    write(source, "1) Start RDP")?;
    write(source, "2) Use text mode")?;

    loop {
        write(source, "")?;
        write(source, "Please make a selection from the above: ")?;

        let Some(choice) = cancelled_on_eof(source.read_line())? else {
            info!("Remote desktop question closed, staying in text mode");
            return Ok(RdAnswer::Declined);
        };

        match choice.trim() {
            "1" => {
                return match ask_credentials_blocking(source, &Credentials::default())? {
                    Some(credentials) => Ok(RdAnswer::Accepted(credentials)),
                    None => Ok(RdAnswer::Declined),
                };
            }
            "2" => return Ok(RdAnswer::Declined),
            other => debug!("Ignoring selection {:?}", other),
        }
    }
}

fn ask_credentials_blocking(
    source: &dyn LineSource,
    current: &Credentials,
) -> Result<Option<Credentials>> {
    let mut credentials = current.clone();

    if credentials.username.is_empty() {
        write(source, "Please provide RDP user name & password.")?;
        loop {
            write(source, "RDP user name: ")?;
            let Some(username) = cancelled_on_eof(source.read_line())? else {
                return Ok(None);
            };

            let username = username.trim();
            if username.is_empty() {
                write(source, "The user name must not be empty.")?;
                continue;
            }
            credentials.username = username.to_string();
            break;
        }
    }

    while credentials.password.is_empty() {
        write(source, "RDP password: ")?;
        let Some(password) = cancelled_on_eof(source.read_secret())? else {
            return Ok(None);
        };
        let password = zeroize::Zeroizing::new(password);

        if password.len() < MIN_PASSWORD_LENGTH {
            write(source, "The password must be at least six characters long.")?;
            continue;
        }

        write(source, "Password (confirm): ")?;
        let Some(confirm) = cancelled_on_eof(source.read_secret())? else {
            return Ok(None);
        };
        let confirm = zeroize::Zeroizing::new(confirm);

        if *password != *confirm {
            write(source, "Passwords do not match!")?;
            continue;
        }

        credentials.password = password;
    }

    Ok(Some(credentials))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Line source replaying scripted input
    struct Script {
        input: Mutex<VecDeque<String>>,
        output: Mutex<Vec<String>>,
    }

    impl Script {
        fn new(lines: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                input: Mutex::new(lines.iter().map(|l| l.to_string()).collect()),
                output: Mutex::new(Vec::new()),
            })
        }

        fn next(&self) -> io::Result<String> {
            self.input
                .lock()
                .pop_front()
                .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "end of script"))
        }

        fn printed(&self) -> String {
            self.output.lock().join("\n")
        }
    }

    impl LineSource for Script {
        fn write_line(&self, text: &str) -> io::Result<()> {
            self.output.lock().push(text.to_string());
            Ok(())
        }

        fn read_line(&self) -> io::Result<String> {
            self.next()
        }

        fn read_secret(&self) -> io::Result<String> {
            self.next()
        }
    }

    #[tokio::test]
    async fn test_accept_remote_desktop() {
        let script = Script::new(&["3", "1", "admin", "short", "secret1", "secret1"]);
        let prompter = ConsolePrompter::new(script.clone(), 60);

        let answer = prompter
            .ask_remote_desktop(RdQuestion::TextModeLimits)
            .await
            .unwrap();

        match answer {
            RdAnswer::Accepted(credentials) => {
                assert_eq!(credentials.username, "admin");
                assert_eq!(credentials.password.as_str(), "secret1");
            }
            RdAnswer::Declined => panic!("expected acceptance"),
        }
        assert!(script.printed().contains("at least six characters"));
        assert!(script.printed().contains("custom partitioning"));
    }

    #[tokio::test]
    async fn test_decline_and_eof() {
        let prompter = ConsolePrompter::new(Script::new(&["2"]), 80);
        let answer = prompter
            .ask_remote_desktop(RdQuestion::GraphicalStartupFailed)
            .await
            .unwrap();
        assert!(matches!(answer, RdAnswer::Declined));

        let prompter = ConsolePrompter::new(Script::new(&[]), 80);
        let answer = prompter
            .ask_remote_desktop(RdQuestion::GraphicalStartupFailed)
            .await
            .unwrap();
        assert!(matches!(answer, RdAnswer::Declined));
    }

    #[tokio::test]
    async fn test_credentials_only_missing_fields() {
        let script = Script::new(&["password1", "password2", "password1", "password1"]);
        let prompter = ConsolePrompter::new(script.clone(), 80);

        let credentials = prompter
            .ask_credentials(&Credentials::new("admin", ""))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(credentials.username, "admin");
        assert_eq!(credentials.password.as_str(), "password1");
        assert!(script.printed().contains("Passwords do not match!"));
        assert!(!script.printed().contains("RDP user name"));
    }

    #[tokio::test]
    async fn test_credentials_cancel() {
        let prompter = ConsolePrompter::new(Script::new(&["admin"]), 80);
        let result = prompter.ask_credentials(&Credentials::default()).await.unwrap();
        assert!(result.is_none());
    }
}
