//! Line commands typed at the console prompt.

use shared::domain::{Todo, TodoId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SignIn { email: String, password: String },
    SignOut,
    ResetPassword { email: String },
    WhoAmI,
    List,
    Add { title: String },
    Toggle { target: ItemRef },
    Remove { target: ItemRef },
    Help,
    Quit,
}

/// A todo picked either by id or by its 1-based position in the rendered list (`#2`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemRef {
    Id(TodoId),
    Position(usize),
}

impl ItemRef {
    fn parse(raw: &str) -> Result<Self, String> {
        match raw.strip_prefix('#') {
            Some(position) => position
                .parse::<usize>()
                .ok()
                .filter(|position| *position > 0)
                .map(Self::Position)
                .ok_or_else(|| format!("'{raw}' is not a list position")),
            None => Ok(Self::Id(TodoId::new(raw))),
        }
    }

    pub fn resolve(&self, items: &[Todo]) -> Option<TodoId> {
        match self {
            Self::Id(id) => Some(id.clone()),
            Self::Position(position) => items.get(position - 1).map(|todo| todo.id.clone()),
        }
    }
}

pub const HELP: &str = "\
commands:
  signin <email> <password>   sign in with email and password
  signout                     sign out
  reset <email>               send a password reset email
  whoami                      show the signed-in user
  list                        reload and show the to-do list
  add <title...>              add a to-do
  toggle <id|#n>              flip a to-do's completed flag
  remove <id|#n>              delete a to-do
  help                        show this help
  quit                        exit";

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SignIn { .. } => "signin",
            Self::SignOut => "signout",
            Self::ResetPassword { .. } => "reset",
            Self::WhoAmI => "whoami",
            Self::List => "list",
            Self::Add { .. } => "add",
            Self::Toggle { .. } => "toggle",
            Self::Remove { .. } => "remove",
            Self::Help => "help",
            Self::Quit => "quit",
        }
    }

    /// Parses one input line. `Ok(None)` for blank lines.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "" => return Ok(None),
            "signin" | "login" => {
                let mut args = rest.split_whitespace();
                match (args.next(), args.next(), args.next()) {
                    (Some(email), Some(password), None) => Self::SignIn {
                        email: email.to_string(),
                        password: password.to_string(),
                    },
                    _ => return Err("usage: signin <email> <password>".to_string()),
                }
            }
            "signout" | "logout" => Self::SignOut,
            "reset" => Self::ResetPassword {
                email: rest.to_string(),
            },
            "whoami" => Self::WhoAmI,
            "list" | "ls" => Self::List,
            // Blank titles are left for the list to reject.
            "add" => Self::Add {
                title: rest.to_string(),
            },
            "toggle" | "done" => Self::Toggle {
                target: Self::item_ref(rest, "toggle")?,
            },
            "remove" | "rm" | "delete" => Self::Remove {
                target: Self::item_ref(rest, "remove")?,
            },
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("unknown command '{other}'; try 'help'")),
        };
        Ok(Some(command))
    }

    fn item_ref(rest: &str, verb: &str) -> Result<ItemRef, String> {
        if rest.is_empty() || rest.contains(char::is_whitespace) {
            return Err(format!("usage: {verb} <id|#n>"));
        }
        ItemRef::parse(rest)
    }
}
