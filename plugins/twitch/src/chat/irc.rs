//! Twitch IRC line parsing and chat command formatting.

use crate::channels::ChatModes;

/// One IRC line, split into its parts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IrcMessage {
    /// Raw tag section without the leading `@`.
    pub tags: Option<String>,
    /// Prefix without the leading `:`.
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
    pub trailing: Option<String>,
}

impl IrcMessage {
    pub fn parse(line: &str) -> Self {
        let mut rest = line.trim();
        let mut message = Self::default();

        if let Some(tagged) = rest.strip_prefix('@') {
            let (tags, remainder) = tagged.split_once(' ').unwrap_or((tagged, ""));
            message.tags = Some(tags.to_string());
            rest = remainder;
        }
        if let Some(prefixed) = rest.strip_prefix(':') {
            let (prefix, remainder) = prefixed.split_once(' ').unwrap_or((prefixed, ""));
            message.prefix = Some(prefix.to_string());
            rest = remainder;
        }

        let (command, remainder) = rest.split_once(' ').unwrap_or((rest, ""));
        message.command = command.to_ascii_uppercase();
        rest = remainder;

        let params = match rest.strip_prefix(':') {
            Some(trailing) => {
                message.trailing = Some(trailing.to_string());
                ""
            }
            None => match rest.split_once(" :") {
                Some((params, trailing)) => {
                    message.trailing = Some(trailing.to_string());
                    params
                }
                None => rest,
            },
        };
        message.params = params.split_whitespace().map(str::to_string).collect();
        message
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.as_deref()?.split(';').find_map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            (name == key).then_some(value)
        })
    }

    /// The nick from a `nick!user@host` prefix.
    pub fn nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        Some(prefix.split_once('!').map_or(prefix, |(nick, _)| nick))
    }

    /// The first parameter as a channel name, without `#` and lowercased.
    pub fn channel(&self) -> Option<String> {
        let channel = self.params.first()?.strip_prefix('#')?;
        Some(channel.to_ascii_lowercase())
    }
}

/// Partial chat-mode update from a ROOMSTATE or a mode NOTICE. `None` means unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomStateDelta {
    pub emote_only: Option<bool>,
    /// Minutes a user must have followed; -1 turns followers-only mode off.
    pub followers_only: Option<i64>,
    /// Seconds between messages; 0 turns slow mode off.
    pub slow: Option<u32>,
    pub subs_only: Option<bool>,
    pub r9k: Option<bool>,
    pub room_id: Option<String>,
}

impl RoomStateDelta {
    pub fn from_tags(message: &IrcMessage) -> Self {
        let flag = |key| message.tag(key).map(|v| v == "1");
        Self {
            emote_only: flag("emote-only"),
            followers_only: message.tag("followers-only").and_then(|v| v.parse().ok()),
            slow: message.tag("slow").and_then(|v| v.parse().ok()),
            subs_only: flag("subs-only"),
            r9k: flag("r9k"),
            room_id: message
                .tag("room-id")
                .filter(|id| !id.is_empty())
                .map(str::to_string),
        }
    }

    /// The mode change announced by a NOTICE, if its `msg-id` is one.
    pub fn from_notice(msg_id: &str) -> Option<Self> {
        let delta = match msg_id {
            "emote_only_on" => Self {
                emote_only: Some(true),
                ..Self::default()
            },
            "emote_only_off" => Self {
                emote_only: Some(false),
                ..Self::default()
            },
            "subs_on" => Self {
                subs_only: Some(true),
                ..Self::default()
            },
            "subs_off" => Self {
                subs_only: Some(false),
                ..Self::default()
            },
            "r9k_on" => Self {
                r9k: Some(true),
                ..Self::default()
            },
            "r9k_off" => Self {
                r9k: Some(false),
                ..Self::default()
            },
            "slow_off" => Self {
                slow: Some(0),
                ..Self::default()
            },
            "followers_off" => Self {
                followers_only: Some(-1),
                ..Self::default()
            },
            _ => return None,
        };
        Some(delta)
    }
}

/// What the transport reports to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Connected,
    Disconnected,
    Join { channel: String, user: String },
    Part { channel: String, user: String },
    Message { channel: String },
    RoomState { channel: String, delta: RoomStateDelta },
    Notice { channel: String, msg_id: String },
}

impl ChatEvent {
    /// Interprets an inbound line. PING is answered by the transport and never gets here.
    pub fn from_message(message: &IrcMessage) -> Option<Self> {
        let event = match message.command.as_str() {
            // end of the welcome burst
            "001" => Self::Connected,
            "JOIN" => Self::Join {
                channel: message.channel()?,
                user: message.nick()?.to_ascii_lowercase(),
            },
            "PART" => Self::Part {
                channel: message.channel()?,
                user: message.nick()?.to_ascii_lowercase(),
            },
            "PRIVMSG" => Self::Message {
                channel: message.channel()?,
            },
            "ROOMSTATE" => Self::RoomState {
                channel: message.channel()?,
                delta: RoomStateDelta::from_tags(message),
            },
            "NOTICE" => Self::Notice {
                channel: message.channel()?,
                msg_id: message.tag("msg-id")?.to_string(),
            },
            "RECONNECT" => Self::Disconnected,
            _ => return None,
        };
        Some(event)
    }
}

/// Chat modes that can be toggled through chat commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatMode {
    Emote,
    Followers,
    Slow,
    Subscribers,
    Unique,
}

/// The chat command that toggles `mode` given the channel's current `modes`.
///
/// Timed modes are switched off by a zero `length`, or when they are on and `length` is absent
/// or unchanged; otherwise they are (re)enabled with `length`.
pub fn mode_command(mode: ChatMode, modes: &ChatModes, length: Option<u32>) -> String {
    let toggle = |name: &str, enabled: bool| {
        if enabled {
            format!("/{name}off")
        } else {
            format!("/{name}")
        }
    };
    let timed = |name: &str, current: crate::channels::TimedMode| match length {
        Some(0) => format!("/{name}off"),
        Some(length) if !current.enabled || current.length != length => {
            format!("/{name} {length}")
        }
        None if !current.enabled => format!("/{name}"),
        _ => format!("/{name}off"),
    };

    match mode {
        ChatMode::Emote => toggle("emoteonly", modes.emote),
        ChatMode::Subscribers => toggle("subscribers", modes.subscriber),
        ChatMode::Unique => toggle("uniquechat", modes.unique),
        ChatMode::Followers => timed("followers", modes.followers),
        ChatMode::Slow => timed("slow", modes.slow),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::TimedMode;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_tagged_privmsg() {
        let message = IrcMessage::parse(
            "@badge-info=;display-name=Foo;user-id=123 :foo!foo@foo.tmi.twitch.tv PRIVMSG #Bar :hello :) there\r\n",
        );
        assert_eq!(message.command, "PRIVMSG");
        assert_eq!(message.params, vec!["#Bar"]);
        assert_eq!(message.trailing.as_deref(), Some("hello :) there"));
        assert_eq!(message.nick(), Some("foo"));
        assert_eq!(message.tag("user-id"), Some("123"));
        assert_eq!(message.tag("badge-info"), Some(""));
        assert_eq!(message.tag("missing"), None);
        assert_eq!(
            ChatEvent::from_message(&message),
            Some(ChatEvent::Message {
                channel: "bar".into()
            })
        );
    }

    #[test]
    fn parses_ping_and_join() {
        let ping = IrcMessage::parse("PING :tmi.twitch.tv");
        assert_eq!(ping.command, "PING");
        assert!(ping.params.is_empty());
        assert_eq!(ping.trailing.as_deref(), Some("tmi.twitch.tv"));

        let join = IrcMessage::parse(":me!me@me.tmi.twitch.tv JOIN #friend");
        assert_eq!(
            ChatEvent::from_message(&join),
            Some(ChatEvent::Join {
                channel: "friend".into(),
                user: "me".into()
            })
        );
    }

    #[test]
    fn roomstate_carries_only_present_fields() {
        let full = IrcMessage::parse(
            "@emote-only=0;followers-only=-1;r9k=0;room-id=12345;slow=0;subs-only=0 :tmi.twitch.tv ROOMSTATE #friend",
        );
        let Some(ChatEvent::RoomState { channel, delta }) = ChatEvent::from_message(&full) else {
            panic!("not a room state");
        };
        assert_eq!(channel, "friend");
        assert_eq!(
            delta,
            RoomStateDelta {
                emote_only: Some(false),
                followers_only: Some(-1),
                slow: Some(0),
                subs_only: Some(false),
                r9k: Some(false),
                room_id: Some("12345".into()),
            }
        );

        let partial = IrcMessage::parse("@room-id=12345;slow=10 :tmi.twitch.tv ROOMSTATE #friend");
        assert_eq!(
            RoomStateDelta::from_tags(&partial),
            RoomStateDelta {
                slow: Some(10),
                room_id: Some("12345".into()),
                ..RoomStateDelta::default()
            }
        );
    }

    #[test]
    fn notices_map_to_deltas() {
        let notice = IrcMessage::parse(
            "@msg-id=followers_off :tmi.twitch.tv NOTICE #friend :This room is no longer in followers-only mode.",
        );
        assert_eq!(
            ChatEvent::from_message(&notice),
            Some(ChatEvent::Notice {
                channel: "friend".into(),
                msg_id: "followers_off".into()
            })
        );
        assert_eq!(
            RoomStateDelta::from_notice("followers_off").unwrap().followers_only,
            Some(-1)
        );
        assert_eq!(RoomStateDelta::from_notice("slow_off").unwrap().slow, Some(0));
        assert_eq!(RoomStateDelta::from_notice("msg_banned"), None);
    }

    #[test]
    fn mode_commands_toggle() {
        let mut modes = ChatModes::default();
        assert_eq!(mode_command(ChatMode::Emote, &modes, None), "/emoteonly");
        assert_eq!(mode_command(ChatMode::Slow, &modes, Some(30)), "/slow 30");
        assert_eq!(mode_command(ChatMode::Followers, &modes, None), "/followers");
        assert_eq!(mode_command(ChatMode::Slow, &modes, Some(0)), "/slowoff");

        modes.emote = true;
        modes.slow = TimedMode::on(30);
        modes.followers = TimedMode::on(10);
        assert_eq!(mode_command(ChatMode::Emote, &modes, None), "/emoteonlyoff");
        assert_eq!(mode_command(ChatMode::Slow, &modes, Some(30)), "/slowoff");
        assert_eq!(mode_command(ChatMode::Slow, &modes, Some(60)), "/slow 60");
        assert_eq!(mode_command(ChatMode::Followers, &modes, None), "/followersoff");
        assert_eq!(mode_command(ChatMode::Unique, &modes, None), "/uniquechat");
    }
}
