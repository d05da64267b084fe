use services::ControlCommand;

/// Map one stdin line to a practice command.
pub fn parse_control(line: &str) -> Option<ControlCommand> {
    let line = line.trim();
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    match (head, rest) {
        ("hide", "") => Some(ControlCommand::Hide),
        ("show", "") => Some(ControlCommand::Show),
        ("r" | "reconnect", "") => Some(ControlCommand::Reconnect),
        ("t" | "toggle", "") => Some(ControlCommand::ToggleCompletion),
        ("camera", "") => Some(ControlCommand::RetryCapture),
        ("q" | "quit", "") => Some(ControlCommand::Shutdown),
        ("say", word) if !word.is_empty() => Some(ControlCommand::Manual(word.to_string())),
        _ => None,
    }
}

pub const CONTROL_HELP: &str = "commands: hide | show | r | t | camera | say <word> | q";
