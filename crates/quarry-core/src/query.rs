//! Query parsing.
//!
//! A query may start with a command block that toggles match behavior for
//! that query only:
//!
//! - `/ap` - prefix matching on
//! - `/np` - prefix matching off
//! - `/af` - fuzzy matching on
//! - `/nf` - fuzzy matching off
//!
//! Commands are chained with `/` and the block ends at the first space, e.g.
//! `/np/af hello world`. Everything after that space is the search text.

use crate::config::SearchConfig;
use crate::error::QuarryError;
use tracing::warn;

/// Per-query match toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    pub prefix: bool,
    pub fuzzy: bool,
}

impl QueryOptions {
    pub fn from_config(config: &SearchConfig) -> Self {
        QueryOptions {
            prefix: config.prefix_match,
            fuzzy: config.fuzzy_match,
        }
    }
}

/// The result of parsing a raw query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuery {
    pub text: String,
    pub options: QueryOptions,

    /// The first unknown command, if the command block was rejected
    pub invalid_command: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Command {
    PrefixOn,
    PrefixOff,
    FuzzyOn,
    FuzzyOff,
}

impl Command {
    fn lookup(name: &str) -> Option<Command> {
        match name {
            "ap" => Some(Command::PrefixOn),
            "np" => Some(Command::PrefixOff),
            "af" => Some(Command::FuzzyOn),
            "nf" => Some(Command::FuzzyOff),
            _ => None,
        }
    }

    fn apply(self, options: &mut QueryOptions) {
        match self {
            Command::PrefixOn => options.prefix = true,
            Command::PrefixOff => options.prefix = false,
            Command::FuzzyOn => options.fuzzy = true,
            Command::FuzzyOff => options.fuzzy = false,
        }
    }
}

/// Parses raw query strings against a set of default options.
#[derive(Debug, Clone)]
pub struct QueryParser {
    defaults: QueryOptions,
}

impl QueryParser {
    pub fn new(defaults: QueryOptions) -> Self {
        QueryParser { defaults }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        QueryParser::new(QueryOptions::from_config(config))
    }

    pub fn defaults(&self) -> QueryOptions {
        self.defaults
    }

    /// Parse a raw query.
    ///
    /// An unknown command resets the options to their defaults and yields an
    /// empty search text; parsing itself never fails.
    pub fn parse(&self, raw: &str) -> ParsedQuery {
        let Some(rest) = raw.strip_prefix('/') else {
            return ParsedQuery {
                text: raw.to_string(),
                options: self.defaults,
                invalid_command: None,
            };
        };

        let (block, text) = rest.split_once(' ').unwrap_or((rest, ""));
        let mut options = self.defaults;

        for name in block.split('/').filter(|name| !name.is_empty()) {
            match Command::lookup(name) {
                Some(command) => command.apply(&mut options),
                None => {
                    let err = QuarryError::InvalidCommand {
                        command: name.to_string(),
                    };
                    warn!(error = %err, query = %raw, "Ignoring query command block");
                    return ParsedQuery {
                        text: String::new(),
                        options: self.defaults,
                        invalid_command: Some(name.to_string()),
                    };
                }
            }
        }

        ParsedQuery {
            text: text.to_string(),
            options,
            invalid_command: None,
        }
    }
}
