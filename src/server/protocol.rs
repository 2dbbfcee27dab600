//! Wire protocol: the `DNSTRIG<N> ` version prefix, one-shot command
//! parsing, and the persistent-channel command set. One logical message
//! per line, UTF-8, no escaping.

/// Protocol version every panel must announce on its first line.
pub const CONTROL_VERSION: u32 = 1;

/// One-shot commands, sent on a freshly opened connection after the
/// version prefix. Each either shuts the connection down after replying,
/// or upgrades it to a persistent channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OneShotCommand {
    Submit(Vec<String>),
    Reprobe,
    SkipHttp,
    HotspotSignon,
    Results,
    Status,
    CmdTray,
    Unsafe,
    TestTcp,
    TestSsl,
    TestHttp,
    TestUpdate,
    StopPanels,
    Stop,
}

/// Commands accepted one-per-line on a `persist_read` connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistentCommand {
    InsecureYes,
    InsecureNo,
    Reprobe,
    SkipHttp,
    HotspotSignon,
    UpdateCancel,
    UpdateOk,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    MissingVersionPrefix,
    VersionMismatch(u32),
    UnknownCommand(String),
    EmptyLine,
}

/// Splits off and checks the `DNSTRIG<N> ` prefix, returning the rest of
/// the line. The first line from a panel must carry this prefix; a
/// mismatch or malformed prefix terminates the connection with no reply.
pub fn strip_version_prefix(line: &str) -> Result<&str, ParseError> {
    let rest = line
        .strip_prefix("DNSTRIG")
        .ok_or(ParseError::MissingVersionPrefix)?;
    let space_idx = rest.find(' ').ok_or(ParseError::MissingVersionPrefix)?;
    let (version_str, rest) = rest.split_at(space_idx);
    let version: u32 = version_str
        .parse()
        .map_err(|_| ParseError::MissingVersionPrefix)?;
    if version != CONTROL_VERSION {
        return Err(ParseError::VersionMismatch(version));
    }
    Ok(rest.trim_start())
}

pub fn parse_one_shot(line: &str) -> Result<OneShotCommand, ParseError> {
    let line = line.trim_start();
    if line.is_empty() {
        return Err(ParseError::EmptyLine);
    }
    let mut parts = line.split_whitespace();
    let cmd = parts.next().unwrap_or("");
    match cmd {
        "submit" => {
            let ips: Vec<String> = parts.map(|s| s.to_string()).collect();
            Ok(OneShotCommand::Submit(ips))
        }
        "reprobe" => Ok(OneShotCommand::Reprobe),
        "skip_http" => Ok(OneShotCommand::SkipHttp),
        "hotspot_signon" => Ok(OneShotCommand::HotspotSignon),
        "results" => Ok(OneShotCommand::Results),
        "status" => Ok(OneShotCommand::Status),
        "cmdtray" => Ok(OneShotCommand::CmdTray),
        "unsafe" => Ok(OneShotCommand::Unsafe),
        "test_tcp" => Ok(OneShotCommand::TestTcp),
        "test_ssl" => Ok(OneShotCommand::TestSsl),
        "test_http" => Ok(OneShotCommand::TestHttp),
        "test_update" => Ok(OneShotCommand::TestUpdate),
        "stoppanels" => Ok(OneShotCommand::StopPanels),
        "stop" => Ok(OneShotCommand::Stop),
        other => Err(ParseError::UnknownCommand(other.to_string())),
    }
}

/// Unknown persistent-channel lines are logged and ignored rather than
/// closing the connection, unlike one-shot commands.
pub fn parse_persistent(line: &str) -> Option<PersistentCommand> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match line {
        "insecure yes" => Some(PersistentCommand::InsecureYes),
        "insecure no" => Some(PersistentCommand::InsecureNo),
        "reprobe" => Some(PersistentCommand::Reprobe),
        "skip_http" => Some(PersistentCommand::SkipHttp),
        "hotspot_signon" => Some(PersistentCommand::HotspotSignon),
        "update_cancel" => Some(PersistentCommand::UpdateCancel),
        "update_ok" => Some(PersistentCommand::UpdateOk),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_matching_version_prefix() {
        assert_eq!(strip_version_prefix("DNSTRIG1 results\n").unwrap(), "results\n");
    }

    #[test]
    fn rejects_mismatched_version() {
        assert_eq!(
            strip_version_prefix("DNSTRIG9999 results\n"),
            Err(ParseError::VersionMismatch(9999))
        );
    }

    #[test]
    fn rejects_missing_prefix() {
        assert_eq!(
            strip_version_prefix("results\n"),
            Err(ParseError::MissingVersionPrefix)
        );
    }

    #[test]
    fn parses_submit_with_multiple_ips() {
        assert_eq!(
            parse_one_shot("submit 192.0.2.1 192.0.2.2").unwrap(),
            OneShotCommand::Submit(vec!["192.0.2.1".to_string(), "192.0.2.2".to_string()])
        );
    }

    #[test]
    fn unknown_one_shot_command_is_error() {
        assert!(matches!(
            parse_one_shot("frobnicate"),
            Err(ParseError::UnknownCommand(_))
        ));
    }

    #[test]
    fn unknown_persistent_line_is_ignored_not_error() {
        assert_eq!(parse_persistent("frobnicate"), None);
        assert_eq!(parse_persistent(""), None);
    }

    #[test]
    fn parses_insecure_commands() {
        assert_eq!(parse_persistent("insecure yes"), Some(PersistentCommand::InsecureYes));
        assert_eq!(parse_persistent("insecure no"), Some(PersistentCommand::InsecureNo));
    }
}
