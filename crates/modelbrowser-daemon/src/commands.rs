//! Textual command surface: `list`, `search <q>`, `categories`, `info <id>`,
//! `delete <id>`, `reload`, `gui`, `help`.

use modelbrowser_proto::config::Capability;
use modelbrowser_proto::protocol::Request;

pub const USAGE: &[&str] = &[
    "Model Browser commands:",
    "  gui - Open the model browser",
    "  list - List all available models",
    "  search <query> - Search for models",
    "  categories - Show models by category",
    "  info <model> - Show model details",
    "  delete <model> - Delete a model",
    "  reload - Reload models from the resource pack",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Gui,
    List,
    Search(String),
    Categories,
    Info(String),
    Delete(String),
    Reload,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A subcommand was given without its argument.
    Usage(&'static str),
    Unknown(String),
}

impl ParseError {
    pub fn message(&self) -> String {
        match self {
            ParseError::Usage(usage) => format!("Usage: {}", usage),
            ParseError::Unknown(sub) => format!("Unknown subcommand: {}. Use 'help' for usage.", sub),
        }
    }
}

impl Command {
    /// Parse one command line. An empty line asks for help.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim();
        let (sub, rest) = match line.split_once(char::is_whitespace) {
            Some((sub, rest)) => (sub, rest.trim()),
            None => (line, ""),
        };

        let arg = |usage: &'static str| {
            if rest.is_empty() {
                Err(ParseError::Usage(usage))
            } else {
                Ok(rest.to_string())
            }
        };

        match sub.to_lowercase().as_str() {
            "" | "help" => Ok(Command::Help),
            "gui" => Ok(Command::Gui),
            "list" => Ok(Command::List),
            "categories" => Ok(Command::Categories),
            "reload" => Ok(Command::Reload),
            "search" => arg("search <query>").map(Command::Search),
            "info" => arg("info <model>").map(Command::Info),
            "delete" => arg("delete <model>").map(Command::Delete),
            other => Err(ParseError::Unknown(other.to_string())),
        }
    }

    /// Capability a viewer needs to run this command, if any.
    pub fn required_capability(&self) -> Option<Capability> {
        match self {
            Command::Reload => Some(Capability::Admin),
            Command::Delete(_) => Some(Capability::Delete),
            Command::Gui
            | Command::List
            | Command::Search(_)
            | Command::Categories
            | Command::Info(_)
            | Command::Help => None,
        }
    }

    /// The wire request this command stands for. `help` has none.
    pub fn into_request(self, namespace: &str) -> Option<Request> {
        let qualify = |id: String| {
            if id.contains(':') {
                id
            } else {
                format!("{}:{}", namespace, id)
            }
        };
        match self {
            Command::Gui => Some(Request::BrowserOpen {
                query: String::new(),
                category: String::new(),
            }),
            Command::List => Some(Request::RequestModels),
            Command::Search(query) => Some(Request::SearchModels { query }),
            Command::Categories => Some(Request::GetCategories),
            Command::Info(id) => Some(Request::GetModelInfo { id: qualify(id) }),
            Command::Delete(id) => Some(Request::DeleteModel { id: qualify(id) }),
            Command::Reload => Some(Request::Reload),
            Command::Help => None,
        }
    }
}
