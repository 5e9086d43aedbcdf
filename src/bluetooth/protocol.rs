// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Line protocol spoken with the ignition controller.
//!
//! Plain ASCII lines terminated by `\n`. Verbs are matched
//! case-insensitively against the whole trimmed line.

use std::fmt;

use crate::state::EngineState;

/// Line terminator on the wire.
pub const LINE_TERMINATOR: char = '\n';

/// Frame an outbound line: surrounding whitespace is trimmed and exactly
/// one newline appended.
pub fn encode_line(raw: &str) -> String {
    let mut line = raw.trim().to_string();
    line.push(LINE_TERMINATOR);
    line
}

/// Commands sent to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    IgnitionOn,
    IgnitionOff,
    Status,
    CallIncoming,
}

impl Command {
    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IGNITION_ON" => Some(Self::IgnitionOn),
            "IGNITION_OFF" => Some(Self::IgnitionOff),
            "STATUS" => Some(Self::Status),
            "CALL_INCOMING" => Some(Self::CallIncoming),
            _ => None,
        }
    }

    /// Convert to string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IgnitionOn => "IGNITION_ON",
            Self::IgnitionOff => "IGNITION_OFF",
            Self::Status => "STATUS",
            Self::CallIncoming => "CALL_INCOMING",
        }
    }

    /// Wire form, newline-terminated.
    pub fn to_line(&self) -> String {
        encode_line(self.as_str())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded message from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Ignition status report.
    Ignition(EngineState),
    /// The peer reports it rejected a call.
    CallRejected,
    /// The peer reports it accepted a call.
    CallAccepted,
    /// Anything else, trimmed but with its original case.
    Unrecognized(String),
}

impl Inbound {
    /// Decode a received line. Returns `None` for blank lines.
    pub fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        let message = match trimmed.to_ascii_uppercase().as_str() {
            "ON" | "IGNITION_ON" => Self::Ignition(EngineState::On),
            "OFF" | "IGNITION_OFF" => Self::Ignition(EngineState::Off),
            "CALL_REJECTED" => Self::CallRejected,
            "CALL_ACCEPTED" => Self::CallAccepted,
            _ => Self::Unrecognized(trimmed.to_string()),
        };
        Some(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_line_normalizes_terminators() {
        assert_eq!(encode_line("STATUS"), "STATUS\n");
        assert_eq!(encode_line("STATUS\n"), "STATUS\n");
        assert_eq!(encode_line("  STATUS\r\n\n"), "STATUS\n");
    }

    #[test]
    fn test_command_lines() {
        assert_eq!(Command::IgnitionOn.to_line(), "IGNITION_ON\n");
        assert_eq!(Command::IgnitionOff.to_line(), "IGNITION_OFF\n");
        assert_eq!(Command::Status.to_line(), "STATUS\n");
        assert_eq!(Command::CallIncoming.to_line(), "CALL_INCOMING\n");
    }

    #[test]
    fn test_command_parse() {
        assert_eq!(Command::parse("ignition_on"), Some(Command::IgnitionOn));
        assert_eq!(Command::parse(" STATUS\n"), Some(Command::Status));
        assert_eq!(Command::parse("Call_Incoming"), Some(Command::CallIncoming));
        assert_eq!(Command::parse("ON"), None);
    }

    #[test]
    fn test_inbound_state_messages() {
        assert_eq!(Inbound::parse("ON"), Some(Inbound::Ignition(EngineState::On)));
        assert_eq!(Inbound::parse("  on \r"), Some(Inbound::Ignition(EngineState::On)));
        assert_eq!(Inbound::parse("Ignition_On"), Some(Inbound::Ignition(EngineState::On)));
        assert_eq!(Inbound::parse("off"), Some(Inbound::Ignition(EngineState::Off)));
        assert_eq!(Inbound::parse("IGNITION_OFF\n"), Some(Inbound::Ignition(EngineState::Off)));
    }

    #[test]
    fn test_inbound_call_notifications() {
        assert_eq!(Inbound::parse("call_rejected"), Some(Inbound::CallRejected));
        assert_eq!(Inbound::parse("CALL_ACCEPTED"), Some(Inbound::CallAccepted));
    }

    #[test]
    fn test_inbound_unrecognized_keeps_text() {
        assert_eq!(
            Inbound::parse(" status \n"),
            Some(Inbound::Unrecognized("status".to_string()))
        );
        // Whole-line match only.
        assert_eq!(
            Inbound::parse("ON OFF"),
            Some(Inbound::Unrecognized("ON OFF".to_string()))
        );
    }

    #[test]
    fn test_only_ascii_case_folding() {
        assert_eq!(
            Inbound::parse("o\u{FB00}"),
            Some(Inbound::Unrecognized("o\u{FB00}".to_string()))
        );
        assert_eq!(Command::parse("\u{17F}tatus"), None);
        assert_eq!(Inbound::parse("Ignition_On"), Some(Inbound::Ignition(EngineState::On)));
    }

    #[test]
    fn test_inbound_blank_lines() {
        assert_eq!(Inbound::parse(""), None);
        assert_eq!(Inbound::parse(" \r\n"), None);
    }
}
