use std::collections::HashMap;

use tracing::warn;

use crate::error::{ControlError, Result};

/// A command sent over the control connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlRequest {
    pub command: String,
    pub arguments: Vec<String>,
    pub data: Option<String>,
}

impl ControlRequest {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            arguments: Vec::new(),
            data: None,
        }
    }

    pub fn with_arguments<S: AsRef<str>>(command: &str, arguments: &[S]) -> Self {
        Self {
            command: command.to_string(),
            arguments: arguments.iter().map(|a| a.as_ref().to_string()).collect(),
            data: None,
        }
    }

    /// Wire form: `CMD args\r\n`, or a `+`-prefixed multi-line block when
    /// the request carries data.
    pub fn to_protocol_string(&self) -> String {
        let mut line = self.command.clone();
        for argument in &self.arguments {
            line.push(' ');
            line.push_str(argument);
        }
        match &self.data {
            None => format!("{line}\r\n"),
            Some(data) => format!("+{line}\r\n{data}\r\n.\r\n"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlReply {
    pub reply: String,
    pub data: Option<String>,
}

impl ControlReply {
    fn text(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            data: None,
        }
    }

    /// Splits `CMD KEY=VALUE KEY="VALUE"` into the command and its pairs.
    pub fn command_and_values(&self) -> (String, HashMap<String, String>) {
        let mut parts = self.reply.split_whitespace();
        let command = parts.next().unwrap_or_default().to_string();
        let values = parts
            .filter_map(|part| part.split_once('='))
            .map(|(key, value)| (key.to_string(), value.trim_matches('"').to_string()))
            .collect();
        (command, values)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlResponse {
    pub status: u16,
    pub replies: Vec<ControlReply>,
}

impl ControlResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_error(&self) -> bool {
        (400..600).contains(&self.status)
    }

    /// Asynchronous event notification (6xx).
    pub fn is_async(&self) -> bool {
        (600..700).contains(&self.status)
    }

    pub fn first_reply(&self) -> &str {
        self.replies.first().map_or("", |reply| reply.reply.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
enum ParseState {
    #[default]
    AwaitingReply,
    BuildingReply {
        status: u16,
        replies: Vec<ControlReply>,
    },
    AwaitingReplyData {
        status: u16,
        replies: Vec<ControlReply>,
        reply: String,
        data: Vec<String>,
    },
}

/// Line-oriented parser for control port replies.
///
/// `NNN-` lines continue a reply, `NNN+` opens a data block terminated by a
/// lone `.`, and `NNN ` completes the response.
#[derive(Debug, Default)]
pub struct ControlParser {
    state: ParseState,
}

impl ControlParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one line (without its line terminator). Returns a response once
    /// its final line has been seen.
    pub fn parse_line(&mut self, line: &str) -> Result<Option<ControlResponse>> {
        let state = std::mem::take(&mut self.state);
        let (next, response) = match state {
            ParseState::AwaitingReply => {
                let (status, separator, reply) = split_reply_line(line)?;
                next_state(status, Vec::new(), separator, reply)?
            }
            ParseState::BuildingReply { status, replies } => {
                let (line_status, separator, reply) = split_reply_line(line)?;
                if line_status != status {
                    warn!(line_status, status, "Reply line status differs from its response");
                }
                next_state(status, replies, separator, reply)?
            }
            ParseState::AwaitingReplyData {
                status,
                mut replies,
                reply,
                mut data,
            } => {
                let line = line.trim_end_matches('\r');
                if line == "." {
                    replies.push(ControlReply {
                        reply,
                        data: Some(data.join("\n")),
                    });
                    (ParseState::BuildingReply { status, replies }, None)
                } else {
                    let line = line.strip_prefix('.').filter(|_| line.starts_with("..")).unwrap_or(line);
                    data.push(line.to_string());
                    (
                        ParseState::AwaitingReplyData {
                            status,
                            replies,
                            reply,
                            data,
                        },
                        None,
                    )
                }
            }
        };
        self.state = next;
        Ok(response)
    }

    pub fn reset(&mut self) {
        self.state = ParseState::AwaitingReply;
    }
}

fn split_reply_line(line: &str) -> Result<(u16, char, &str)> {
    let trimmed = line.trim();
    let malformed = || ControlError::MalformedReply {
        line: line.to_string(),
    };

    let status = trimmed
        .get(..3)
        .and_then(|status| status.parse().ok())
        .ok_or_else(malformed)?;
    let separator = trimmed[3..].chars().next().ok_or_else(malformed)?;
    let reply = &trimmed[3 + separator.len_utf8()..];
    Ok((status, separator, reply))
}

fn next_state(
    status: u16,
    mut replies: Vec<ControlReply>,
    separator: char,
    reply: &str,
) -> Result<(ParseState, Option<ControlResponse>)> {
    match separator {
        '-' => {
            replies.push(ControlReply::text(reply));
            Ok((ParseState::BuildingReply { status, replies }, None))
        }
        '+' => Ok((
            ParseState::AwaitingReplyData {
                status,
                replies,
                reply: reply.to_string(),
                data: Vec::new(),
            },
            None,
        )),
        ' ' => {
            replies.push(ControlReply::text(reply));
            Ok((
                ParseState::AwaitingReply,
                Some(ControlResponse { status, replies }),
            ))
        }
        other => Err(ControlError::UnknownSeparator { separator: other }.into()),
    }
}
