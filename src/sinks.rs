//! External-sink contracts (§1, §4.7): the GUI log/status sink and the
//! button input-event stream. Only the interfaces are defined here — the
//! display driver and menu GUI are out of scope (§1).
//!
//! Grounded on the reference firmware's `buzzer_task`/`display_task`
//! pattern: a dedicated `Channel` the core publishes into, drained by a
//! platform task it does not own.

/// One button event forwarded to the GUI collaborator (§4.2:
/// `INPUT_UP`/`INPUT_DOWN`/`INPUT_SELECT`/`INPUT_BACK`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Up,
    Down,
    Select,
    Back,
}

/// A short status line forwarded to the GUI's log view, mirroring an
/// egress `status`/`error` line without re-deriving serde for the GUI's
/// benefit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy)]
pub struct LogLine<'a> {
    pub level: LogLevel,
    pub text: &'a str,
}

/// Implemented by whatever the platform layer uses to fan a log line out to
/// the GUI (typically an `embassy_sync::channel::Sender`). Kept separate
/// from the serial egress path: a dropped GUI log line is not a protocol
/// failure the way a dropped serial line is.
pub trait LogSink {
    fn publish(&mut self, line: LogLine<'_>);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CapturingSink {
        last: Option<(LogLevel, heapless::String<64>)>,
    }

    impl LogSink for CapturingSink {
        fn publish(&mut self, line: LogLine<'_>) {
            let mut s = heapless::String::new();
            let _ = s.push_str(line.text);
            self.last = Some((line.level, s));
        }
    }

    #[test]
    fn log_sink_receives_published_line() {
        let mut sink = CapturingSink { last: None };
        sink.publish(LogLine {
            level: LogLevel::Warn,
            text: "egress line dropped",
        });
        let (level, text) = sink.last.unwrap();
        assert_eq!(level, LogLevel::Warn);
        assert_eq!(text.as_str(), "egress line dropped");
    }

    #[test]
    fn input_events_are_distinct() {
        assert_ne!(InputEvent::Up, InputEvent::Down);
        assert_eq!(InputEvent::Select, InputEvent::Select);
    }
}
