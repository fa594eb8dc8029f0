//! Control-block codec.
//!
//! The bootloader control block is a fixed 832-byte record in reserved
//! storage: a 32-byte `command`, a 32-byte `status` and a 768-byte
//! `recovery` field. `command` tells the firmware what to boot next,
//! `status` is written by the firmware for us to read, and `recovery`
//! carries the argument block: the literal line `recovery` followed by one
//! argument per line. Fields are NUL-padded and truncating; the encoded
//! record never exceeds the slot.

pub const COMMAND_LEN: usize = 32;
pub const STATUS_LEN: usize = 32;
pub const RECOVERY_LEN: usize = 768;
pub const ENCODED_LEN: usize = COMMAND_LEN + STATUS_LEN + RECOVERY_LEN;

/// Argument-block limits shared with the command-file reader.
pub const MAX_ARGS: usize = 100;
pub const MAX_ARG_LENGTH: usize = 4096;

/// Sentinel first line of a well-formed recovery field.
pub const RECOVERY_SENTINEL: &str = "recovery";

#[derive(Debug, thiserror::Error)]
#[error("control block is {0} bytes, expected {ENCODED_LEN}")]
pub struct WrongSize(pub usize);

/// In-memory view of the persisted control block.
#[derive(Clone, PartialEq, Eq)]
pub struct BootloaderMessage {
    command: [u8; COMMAND_LEN],
    status: [u8; STATUS_LEN],
    recovery: [u8; RECOVERY_LEN],
}

impl Default for BootloaderMessage {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl std::fmt::Debug for BootloaderMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootloaderMessage")
            .field("command", &self.command_str())
            .field("status", &self.status_str())
            .field("recovery", &self.recovery_str())
            .finish()
    }
}

fn field_str(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

fn set_field(field: &mut [u8], value: &str) {
    field.fill(0);
    let bytes = value.as_bytes();
    // Keep one byte for the NUL terminator, as the firmware expects.
    let len = bytes.len().min(field.len() - 1);
    field[..len].copy_from_slice(&bytes[..len]);
}

impl BootloaderMessage {
    pub fn zeroed() -> Self {
        Self {
            command: [0; COMMAND_LEN],
            status: [0; STATUS_LEN],
            recovery: [0; RECOVERY_LEN],
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WrongSize> {
        if bytes.len() != ENCODED_LEN {
            return Err(WrongSize(bytes.len()));
        }
        let mut msg = Self::zeroed();
        msg.command.copy_from_slice(&bytes[..COMMAND_LEN]);
        msg.status
            .copy_from_slice(&bytes[COMMAND_LEN..COMMAND_LEN + STATUS_LEN]);
        msg.recovery
            .copy_from_slice(&bytes[COMMAND_LEN + STATUS_LEN..]);
        Ok(msg)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(ENCODED_LEN);
        bytes.extend_from_slice(&self.command);
        bytes.extend_from_slice(&self.status);
        bytes.extend_from_slice(&self.recovery);
        bytes
    }

    pub fn is_clear(&self) -> bool {
        self.command.iter().all(|&b| b == 0)
            && self.status.iter().all(|&b| b == 0)
            && self.recovery.iter().all(|&b| b == 0)
    }

    pub fn command_str(&self) -> String {
        field_str(&self.command)
    }

    /// The status field is producer-written; we only ever read it.
    pub fn status_str(&self) -> String {
        field_str(&self.status)
    }

    pub fn recovery_str(&self) -> String {
        field_str(&self.recovery)
    }

    /// True when the field carries data (erased flash reads as 0xFF).
    pub fn command_present(&self) -> bool {
        self.command[0] != 0 && self.command[0] != 0xFF
    }

    pub fn status_present(&self) -> bool {
        self.status[0] != 0 && self.status[0] != 0xFF
    }

    pub fn recovery_present(&self) -> bool {
        self.recovery[0] != 0 && self.recovery[0] != 0xFF
    }

    pub fn set_command(&mut self, value: &str) {
        set_field(&mut self.command, value);
    }

    /// Rebuild the recovery field as `recovery\n` plus one argument per
    /// line. Arguments that would overflow the field are truncated away,
    /// never written past the slot.
    pub fn set_recovery_args<S: AsRef<str>>(&mut self, args: &[S]) {
        let mut text = String::from(RECOVERY_SENTINEL);
        text.push('\n');
        for arg in args.iter().take(MAX_ARGS) {
            let line = arg.as_ref();
            // +1 for the newline, +1 for the trailing NUL.
            if text.len() + line.len() + 2 > RECOVERY_LEN {
                log::warn!("recovery field full; dropping argument {:?}", line);
                continue;
            }
            text.push_str(line);
            text.push('\n');
        }
        set_field(&mut self.recovery, &text);
    }

    /// Parse the recovery field into an argument vector. Returns `None`
    /// unless the first line is exactly the `recovery` sentinel; index 0 of
    /// the result is the sentinel itself, standing in for the program name.
    pub fn parse_recovery_args(&self) -> Option<Vec<String>> {
        let text = self.recovery_str();
        let mut lines = text.split('\n');
        if lines.next() != Some(RECOVERY_SENTINEL) {
            return None;
        }
        let mut args = vec![RECOVERY_SENTINEL.to_string()];
        for line in lines {
            if args.len() >= MAX_ARGS {
                break;
            }
            if line.is_empty() {
                continue;
            }
            args.push(line.to_string());
        }
        Some(args)
    }
}
