use std::time::Duration;


/// KVM API version this monitor is written against.
pub const KVM_API_VERSION: i32 = 12;


/// Main configuration for running a flat guest binary
#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Guest-physical load address and entry point. Kept off page 0, where
    /// real mode expects its interrupt vector table.
    pub guest_base: u64,
    /// Size of the single guest memory region, in bytes
    pub memory_size: usize,
    /// API version the host must report
    pub api_version: i32,
    /// Console device settings
    pub console: ConsoleConfig,
}


impl Default for VmConfig {
    fn default() -> Self {
        Self {
            guest_base: 0x1000,
            memory_size: 0x10000, // 64 KiB
            api_version: KVM_API_VERSION,
            console: ConsoleConfig::default(),
        }
    }
}


/// Console line sink
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    /// Bytes held before a newline arrives
    pub capacity: usize,
    /// Pause after each flushed line
    pub pacing: Duration,
    /// Replacement for bytes outside printable ASCII
    pub placeholder: u8,
    /// Move the host cursor to the top-left corner after each line
    pub home_cursor: bool,
}


impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            capacity: 500,
            pacing: Duration::from_millis(100),
            placeholder: b' ',
            home_cursor: true,
        }
    }
}
