//! Command names accepted on stdin.

use std::str::FromStr;

/// Which scratch-file pair a command uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Reads the write-input file; no response payload.
    Write,
    /// Reads the read-input file and fills the read-output file.
    Read,
    /// Uses no scratch file.
    Control,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    InsertTaggables,
    InsertTags,
    InsertTagPairings,
    DeleteTagPairings,
    ToggleTagPairings,
    DeleteTags,
    DeleteTaggables,
    ReadTaggablesTags,
    ReadTaggablesSpecifiedTags,
    ReadTagGroupsTaggableCounts,
    Search,
    FlushFiles,
    PurgeUnusedFiles,
    /// Arms a test fault; without an inline name the write-input file holds it.
    Override(Option<String>),
    Exit,
}

/// The line did not name a known command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCommand(pub String);

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::InsertTaggables => "insert_taggables",
            Self::InsertTags => "insert_tags",
            Self::InsertTagPairings => "insert_tag_pairings",
            Self::DeleteTagPairings => "delete_tag_pairings",
            Self::ToggleTagPairings => "toggle_tag_pairings",
            Self::DeleteTags => "delete_tags",
            Self::DeleteTaggables => "delete_taggables",
            Self::ReadTaggablesTags => "read_taggables_tags",
            Self::ReadTaggablesSpecifiedTags => "read_taggables_specified_tags",
            Self::ReadTagGroupsTaggableCounts => "read_tag_groups_taggable_counts",
            Self::Search => "search",
            Self::FlushFiles => "flush_files",
            Self::PurgeUnusedFiles => "purge_unused_files",
            Self::Override(_) => "override",
            Self::Exit => "exit",
        }
    }

    pub fn channel(&self) -> Channel {
        match self {
            Self::InsertTaggables
            | Self::InsertTags
            | Self::InsertTagPairings
            | Self::DeleteTagPairings
            | Self::ToggleTagPairings
            | Self::DeleteTags
            | Self::DeleteTaggables => Channel::Write,
            Self::ReadTaggablesTags
            | Self::ReadTaggablesSpecifiedTags
            | Self::ReadTagGroupsTaggableCounts
            | Self::Search => Channel::Read,
            Self::Override(None) => Channel::Write,
            Self::Override(Some(_)) | Self::FlushFiles | Self::PurgeUnusedFiles | Self::Exit => {
                Channel::Control
            }
        }
    }
}

impl FromStr for Command {
    type Err = UnknownCommand;

    /// Parses one stdin line; surrounding whitespace and `\r` are ignored.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (name, argument) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, Some(rest.trim())),
            None => (line, None),
        };
        let command = match (name, argument) {
            ("override", argument) => Self::Override(argument.map(str::to_string)),
            (_, Some(_)) => return Err(UnknownCommand(line.to_string())),
            ("insert_taggables", None) => Self::InsertTaggables,
            ("insert_tags", None) => Self::InsertTags,
            ("insert_tag_pairings", None) => Self::InsertTagPairings,
            ("delete_tag_pairings", None) => Self::DeleteTagPairings,
            ("toggle_tag_pairings", None) => Self::ToggleTagPairings,
            ("delete_tags", None) => Self::DeleteTags,
            ("delete_taggables", None) => Self::DeleteTaggables,
            ("read_taggables_tags", None) => Self::ReadTaggablesTags,
            ("read_taggables_specified_tags", None) => Self::ReadTaggablesSpecifiedTags,
            ("read_tag_groups_taggable_counts", None) => Self::ReadTagGroupsTaggableCounts,
            ("search", None) => Self::Search,
            ("flush_files", None) => Self::FlushFiles,
            ("purge_unused_files", None) => Self::PurgeUnusedFiles,
            ("exit", None) => Self::Exit,
            _ => return Err(UnknownCommand(line.to_string())),
        };
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::{Channel, Command, UnknownCommand};

    #[test]
    fn line_endings_are_ignored() {
        assert_eq!("search\r\n".parse(), Ok(Command::Search));
        assert_eq!("exit\n".parse(), Ok(Command::Exit));
    }

    #[test]
    fn names_round_trip() {
        for command in [
            Command::InsertTaggables,
            Command::DeleteTaggables,
            Command::ReadTagGroupsTaggableCounts,
            Command::PurgeUnusedFiles,
        ] {
            assert_eq!(command.name().parse(), Ok(command));
        }
    }

    #[test]
    fn override_takes_an_optional_inline_name() {
        let inline: Command = "override fail_tags_insert_between_pairings_and_singles_writes"
            .parse()
            .expect("inline override");
        assert_eq!(inline.channel(), Channel::Control);
        assert_eq!("override".parse::<Command>().map(|c| c.channel()), Ok(Channel::Write));
    }

    #[test]
    fn unknown_names_and_stray_arguments_are_rejected() {
        assert_eq!(
            "begin_transaction".parse::<Command>(),
            Err(UnknownCommand("begin_transaction".to_string()))
        );
        assert!("search now".parse::<Command>().is_err());
        assert!("".parse::<Command>().is_err());
    }
}
