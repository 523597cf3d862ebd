//! Command types and definitions.

use std::fmt;

/// Available bot commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCommand {
    /// Welcome message with a short how-to.
    Start,

    /// Step-by-step guide for requesting a data export.
    Help,
}

impl BotCommand {
    /// Parses a command from a message text.
    ///
    /// Accepts `/start` and `/help`, optionally addressed as
    /// `/help@my_bot`. An address for a different bot, or any other text,
    /// returns `None`.
    #[must_use]
    pub fn parse(text: &str, bot_username: Option<&str>) -> Option<Self> {
        let text = text.trim();
        let after_slash = text.strip_prefix('/')?;

        // Only the first word matters; trailing arguments are ignored.
        let word = after_slash.split_whitespace().next()?;

        let (cmd, addressee) = match word.split_once('@') {
            Some((cmd, addressee)) => (cmd, Some(addressee)),
            None => (word, None),
        };

        if let (Some(addressee), Some(username)) = (addressee, bot_username)
            && !addressee.eq_ignore_ascii_case(username)
        {
            return None;
        }

        match cmd.to_lowercase().as_str() {
            "start" => Some(Self::Start),
            "help" => Some(Self::Help),
            _ => None,
        }
    }

    /// Returns the command name as it appears in the command menu.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Help => "help",
        }
    }

    /// Returns the command description for the command menu.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Start => "Show what this bot does",
            Self::Help => "How to get your Snapchat data export",
        }
    }

    /// Returns all available commands.
    #[must_use]
    pub const fn all() -> [Self; 2] {
        [Self::Start, Self::Help]
    }

    /// HTML reply sent for the command.
    #[must_use]
    pub const fn reply(self) -> &'static str {
        match self {
            Self::Start => WELCOME_TEXT,
            Self::Help => HELP_TEXT,
        }
    }
}

impl fmt::Display for BotCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.name())
    }
}

const WELCOME_TEXT: &str = "\
🤖 <b>Snapchat Memories Bot</b>

I can help you backup your Snapchat memories to Telegram!

<b>How to use:</b>
1. Go to Snapchat app → Settings → My Data
2. Request your data and download the HTML file
3. Send that HTML file to me
4. I'll extract all your memories and upload them here

⚠️ <b>Note:</b> Download links expire after 7 days, so make sure to use fresh data exports.

Use /help for more information.";

const HELP_TEXT: &str = "\
📖 <b>Help Guide</b>

<b>Steps to get your Snapchat data:</b>
1. Open Snapchat → Settings (gear icon)
2. Scroll down to \"Privacy Controls\"
3. Tap \"My Data\"
4. Select \"Submit Request\" and choose \"Memories\"
5. Wait for email (usually takes few hours)
6. Download the HTML file from the email
7. Send that HTML file to this bot

<b>What I do:</b>
- Parse your Snapchat data export HTML
- Download all your memories (photos &amp; videos)
- Upload them to this Telegram chat with dates and locations

<b>Privacy:</b> Your files are processed temporarily and not stored anywhere.";

/// Reply to plain text messages.
pub const SEND_FILE_HINT: &str = "Please send me the HTML file you received from Snapchat data export. \
     Use /help for instructions on how to get your data.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start_and_help() {
        assert_eq!(BotCommand::parse("/start", None), Some(BotCommand::Start));
        assert_eq!(BotCommand::parse("/help", None), Some(BotCommand::Help));
    }

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!(BotCommand::parse("/HELP", None), Some(BotCommand::Help));
        assert_eq!(BotCommand::parse("/Start", None), Some(BotCommand::Start));
    }

    #[test]
    fn test_parse_with_extra_whitespace_and_args() {
        assert_eq!(
            BotCommand::parse("  /start   deep-link-payload ", None),
            Some(BotCommand::Start)
        );
    }

    #[test]
    fn test_parse_addressed() {
        assert_eq!(
            BotCommand::parse("/help@MemoriesBot", Some("memoriesbot")),
            Some(BotCommand::Help)
        );
        assert_eq!(BotCommand::parse("/help@OtherBot", Some("MemoriesBot")), None);
        assert_eq!(
            BotCommand::parse("/help@AnyBot", None),
            Some(BotCommand::Help)
        );
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(BotCommand::parse("/skip", None), None);
        assert_eq!(BotCommand::parse("help", None), None);
        assert_eq!(BotCommand::parse("/", None), None);
        assert_eq!(BotCommand::parse("", None), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(BotCommand::Start.to_string(), "/start");
        assert_eq!(BotCommand::all().len(), 2);
    }
}
