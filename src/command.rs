use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(?P<key>[A-Za-z_]+)\s*=\s*(?:"(?P<quoted>(?:[^"\\]|\\.)*)"|(?P<bare>\S.*?))\s*$"#)
        .expect("assignment pattern is valid")
});

/// Marks a command inside chat mode, e.g. `/reset`.
pub const COMMAND_PREFIX: char = '/';

/// Name and one-line description of every console command, in help order.
pub const COMMANDS: &[(&str, &str)] = &[
    ("chat", "enter chat mode with a new session"),
    ("exit", "leave chat mode and discard the conversation"),
    ("set <key> = \"<value>\"", "change system, model, temperature or max_tokens"),
    ("show", "print the current settings"),
    ("reset", "clear the conversation, keeping the system prompt"),
    ("sessions", "list saved sessions"),
    ("resume <id>", "continue a saved session"),
    ("forget <id>", "delete a saved session"),
    ("help", "show this list"),
    ("quit", "close the console"),
];

#[derive(Debug, Clone, PartialEq)]
pub enum Setting {
    SystemPrompt(String),
    Model(String),
    Temperature(f32),
    MaxTokens(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Chat,
    Exit,
    Set(Setting),
    Show,
    Reset,
    Sessions,
    Resume(String),
    Forget(String),
    Help,
    Quit,
}

/// A console line after routing.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Empty,
    Command(Command),
    Chat(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("Command not recognized: {0}")]
    Unknown(String),

    #[error("'{0}' takes no arguments")]
    UnexpectedArgument(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Unknown setting '{0}' (expected system, model, temperature or max_tokens)")]
    UnknownSetting(String),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Parses a command line. The command word is matched case-insensitively; the
/// arguments keep their case.
pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let name = word.to_lowercase();

    let no_args = |command: Command| {
        if rest.is_empty() { Ok(command) } else { Err(CommandError::UnexpectedArgument(name.clone())) }
    };

    match name.as_str() {
        "chat" => no_args(Command::Chat),
        "exit" => no_args(Command::Exit),
        "show" => no_args(Command::Show),
        "reset" => no_args(Command::Reset),
        "sessions" => no_args(Command::Sessions),
        "help" => no_args(Command::Help),
        "quit" => no_args(Command::Quit),
        "set" => parse_setting(rest).map(Command::Set),
        "resume" => single_id(rest, "resume <id>").map(Command::Resume),
        "forget" => single_id(rest, "forget <id>").map(Command::Forget),
        _ => Err(CommandError::Unknown(word.to_string())),
    }
}

/// Outside chat mode every line must be a command. In chat mode only a bare `exit`,
/// a `set <key> = <value>` assignment or a `/`-prefixed command is a command; everything
/// else is a chat turn.
pub fn route_input(line: &str, in_chat: bool) -> Result<Input, CommandError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(Input::Empty);
    }
    if let Some(command) = trimmed.strip_prefix(COMMAND_PREFIX) {
        return parse_command(command).map(Input::Command);
    }
    if !in_chat {
        return parse_command(trimmed).map(Input::Command);
    }

    let (word, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (trimmed, ""),
    };
    match word.to_lowercase().as_str() {
        "exit" if rest.is_empty() => Ok(Input::Command(Command::Exit)),
        "set" if ASSIGNMENT.is_match(rest) => parse_setting(rest).map(|s| Input::Command(Command::Set(s))),
        _ => Ok(Input::Chat(trimmed.to_string())),
    }
}

fn single_id(rest: &str, usage: &'static str) -> Result<String, CommandError> {
    let mut parts = rest.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(id), None) => Ok(id.to_string()),
        _ => Err(CommandError::Usage(usage)),
    }
}

fn parse_setting(rest: &str) -> Result<Setting, CommandError> {
    let caps = ASSIGNMENT.captures(rest).ok_or(CommandError::Usage("set <key> = \"<value>\""))?;
    let key = caps["key"].to_lowercase();
    let value = match (caps.name("quoted"), caps.name("bare")) {
        (Some(quoted), _) => unescape(quoted.as_str()),
        (None, Some(bare)) => bare.as_str().to_string(),
        (None, None) => String::new(),
    };

    let invalid = |reason: &str| CommandError::InvalidValue {
        key: key.clone(),
        reason: reason.to_string(),
    };

    match key.as_str() {
        "system" | "system_prompt" => {
            if value.trim().is_empty() {
                return Err(invalid("system prompt cannot be empty"));
            }
            Ok(Setting::SystemPrompt(value))
        }
        "model" => {
            if value.trim().is_empty() {
                return Err(invalid("model cannot be empty"));
            }
            Ok(Setting::Model(value.trim().to_string()))
        }
        "temperature" => {
            let t: f32 = value.trim().parse().map_err(|_| invalid("expected a number"))?;
            if !(0.0..=2.0).contains(&t) {
                return Err(invalid("must be between 0 and 2"));
            }
            Ok(Setting::Temperature(t))
        }
        "max_tokens" => {
            let n: u32 = value.trim().parse().map_err(|_| invalid("expected a positive integer"))?;
            if n == 0 {
                return Err(invalid("must be greater than 0"));
            }
            Ok(Setting::MaxTokens(n))
        }
        _ => Err(CommandError::UnknownSetting(key)),
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_words_are_case_insensitive() {
        assert_eq!(parse_command("CHAT"), Ok(Command::Chat));
        assert_eq!(parse_command("  Exit "), Ok(Command::Exit));
        assert_eq!(parse_command("Resume abc-123"), Ok(Command::Resume("abc-123".into())));
    }

    #[test]
    fn set_extracts_quoted_value_with_escapes() {
        assert_eq!(
            parse_command(r#"set system = "You are \"terse\".\nAnswer briefly.""#),
            Ok(Command::Set(Setting::SystemPrompt("You are \"terse\".\nAnswer briefly.".into())))
        );
        assert_eq!(
            parse_command("SET System_Prompt=\"Keep Case\""),
            Ok(Command::Set(Setting::SystemPrompt("Keep Case".into())))
        );
    }

    #[test]
    fn set_parses_typed_values() {
        assert_eq!(
            parse_command("set temperature = 0.2"),
            Ok(Command::Set(Setting::Temperature(0.2)))
        );
        assert_eq!(
            parse_command("set max_tokens = \"512\""),
            Ok(Command::Set(Setting::MaxTokens(512)))
        );
        assert!(
            matches!(
                parse_command("set temperature = hot"),
                Err(CommandError::InvalidValue { .. })
            )
        );
        assert!(
            matches!(parse_command("set max_tokens = 0"), Err(CommandError::InvalidValue { .. }))
        );
        assert_eq!(
            parse_command("set colour = red"),
            Err(CommandError::UnknownSetting("colour".into()))
        );
        assert!(matches!(parse_command("set system"), Err(CommandError::Usage(_))));
        assert!(
            matches!(parse_command("set system = \"\""), Err(CommandError::InvalidValue { .. }))
        );
    }

    #[test]
    fn argument_errors_are_uniform() {
        assert_eq!(parse_command("help me"), Err(CommandError::UnexpectedArgument("help".into())));
        assert_eq!(parse_command("forget"), Err(CommandError::Usage("forget <id>")));
        assert_eq!(parse_command("dance"), Err(CommandError::Unknown("dance".into())));
        assert_eq!(
            CommandError::Unknown("dance".into()).to_string(),
            "Command not recognized: dance"
        );
    }

    #[test]
    fn chat_mode_routes_non_commands_to_chat() {
        assert_eq!(route_input("exit", true), Ok(Input::Command(Command::Exit)));
        assert_eq!(route_input("EXIT ", true), Ok(Input::Command(Command::Exit)));
        assert_eq!(
            route_input("set model = \"m2\"", true),
            Ok(Input::Command(Command::Set(Setting::Model("m2".into()))))
        );
        assert_eq!(
            route_input("help me write a poem", true),
            Ok(Input::Chat("help me write a poem".into()))
        );
        assert_eq!(route_input("hello", true), Ok(Input::Chat("hello".into())));
        assert_eq!(route_input("hello", false), Err(CommandError::Unknown("hello".into())));
        assert_eq!(route_input("   ", false), Ok(Input::Empty));
    }

    #[test]
    fn chat_mode_sends_command_words_in_sentences_to_the_model() {
        for line in [
            "forget it",
            "resume writing",
            "quit",
            "show",
            "reset",
            "sessions",
            "help",
            "chat",
            "exit the loop early",
            "set the table for two",
        ] {
            assert_eq!(route_input(line, true), Ok(Input::Chat(line.into())), "line {:?}", line);
        }
        assert_eq!(route_input("quit", false), Ok(Input::Command(Command::Quit)));
        assert_eq!(route_input("forget it", false), Ok(Input::Command(Command::Forget("it".into()))));
    }

    #[test]
    fn slash_prefix_runs_any_command() {
        assert_eq!(route_input("/reset", true), Ok(Input::Command(Command::Reset)));
        assert_eq!(route_input(" /Quit", true), Ok(Input::Command(Command::Quit)));
        assert_eq!(route_input("/forget abc", true), Ok(Input::Command(Command::Forget("abc".into()))));
        assert_eq!(route_input("/show", false), Ok(Input::Command(Command::Show)));
        assert_eq!(route_input("/dance", true), Err(CommandError::Unknown("dance".into())));
    }

    #[test]
    fn chat_mode_reports_bad_setting_values() {
        assert!(
            matches!(
                route_input("set temperature = 9", true),
                Err(CommandError::InvalidValue { .. })
            )
        );
    }
}
