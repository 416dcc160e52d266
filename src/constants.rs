//! Protocol constants and default timings

use std::time::Duration;

/// ASCII-framed commands start with this byte
pub const COMMAND_START: u8 = b':';

/// End of an ASCII command or response
pub const TERMINATOR: u8 = b'#';

/// Handshake probe control byte
pub const ACK: u8 = 0x06;

/// Collection deadline for each command of a full run
pub const RUN_RESPONSE_TIMEOUT: Duration = Duration::from_secs(3);

/// Collection deadline for interactive single-command probes
pub const PROBE_RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Settling delay between consecutive commands of a run
pub const SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Pause between transport availability checks while collecting
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Response size cap
pub const MAX_RESPONSE_BYTES: usize = 50;

/// Device-side command buffer size (including the NUL slot of the firmware)
pub const DEVICE_COMMAND_BUFFER_SIZE: usize = 64;

/// Success rate at or above which a run is reported healthy
pub const HEALTHY_SUCCESS_RATE: f64 = 80.0;
