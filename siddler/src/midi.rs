//! Minimal MIDI byte stream parser for the note-driven producer.

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    /// Any other complete channel message
    Other { status: u8 },
}

/// Parser with running status. Real-time bytes are skipped without
/// disturbing a message in progress; system messages are ignored.
#[derive(Debug, Default)]
pub struct MidiParser {
    status: Option<u8>,
    data: [u8; 2],
    have: usize,
}

impl MidiParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn feed(&mut self, byte: u8) -> Option<MidiMessage> {
        if byte >= 0xF8 {
            return None;
        }
        if byte & 0x80 != 0 {
            self.status = if byte < 0xF0 { Some(byte) } else { None };
            self.have = 0;
            return None;
        }

        let status = self.status?;
        self.data[self.have] = byte;
        self.have += 1;
        let needed = match status & 0xF0 {
            0xC0 | 0xD0 => 1,
            _ => 2,
        };
        if self.have < needed {
            return None;
        }
        self.have = 0;

        let channel = status & 0x0F;
        let [first, second] = self.data;
        let message = match status & 0xF0 {
            0x90 if second > 0 => MidiMessage::NoteOn {
                channel,
                note: first,
                velocity: second,
            },
            0x80 | 0x90 => MidiMessage::NoteOff {
                channel,
                note: first,
                velocity: second,
            },
            0xB0 => MidiMessage::ControlChange {
                channel,
                controller: first,
                value: second,
            },
            _ => MidiMessage::Other { status },
        };
        Some(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    fn parse(bytes: &[u8]) -> Vec<MidiMessage> {
        let mut parser = MidiParser::new();
        bytes.iter().filter_map(|b| parser.feed(*b)).collect()
    }

    #[test]
    fn note_on_and_off() {
        assert_eq!(
            parse(&[0x91, 60, 100, 0x81, 60, 0]),
            vec![
                MidiMessage::NoteOn {
                    channel: 1,
                    note: 60,
                    velocity: 100
                },
                MidiMessage::NoteOff {
                    channel: 1,
                    note: 60,
                    velocity: 0
                },
            ]
        );
    }

    #[test]
    fn running_status_and_zero_velocity() {
        let msgs = parse(&[0x90, 60, 100, 64, 90, 60, 0]);
        assert_eq!(msgs.len(), 3);
        assert_eq!(
            msgs[2],
            MidiMessage::NoteOff {
                channel: 0,
                note: 60,
                velocity: 0
            }
        );
    }

    #[test]
    fn realtime_bytes_are_transparent() {
        let msgs = parse(&[0x90, 0xF8, 60, 0xFE, 100]);
        assert_eq!(
            msgs,
            vec![MidiMessage::NoteOn {
                channel: 0,
                note: 60,
                velocity: 100
            }]
        );
    }

    #[test]
    fn stray_data_and_sysex_are_ignored() {
        assert!(parse(&[60, 100, 0xF0, 0x7E, 0x01, 0xF7, 60, 100]).is_empty());
        assert_eq!(
            parse(&[0xC2, 5, 0xB0, 7, 127]),
            vec![
                MidiMessage::Other { status: 0xC2 },
                MidiMessage::ControlChange {
                    channel: 0,
                    controller: 7,
                    value: 127
                },
            ]
        );
    }
}
