//! Memory and port interfaces injected into the execution core.

/// Read-watch attribute bit for one address.
pub const ATTR_READ_WATCH: u8 = 1 << 0;
/// Write-watch attribute bit for one address.
pub const ATTR_WRITE_WATCH: u8 = 1 << 1;

/// Size of the linear Z80 address space in bytes.
pub const ADDRESS_SPACE_BYTES: usize = 0x1_0000;

/// Byte-addressable memory contract consumed by instruction execution.
///
/// The CPU core reads and writes raw bytes only; ownership of the backing
/// image and any usage attributes stays with the caller.
pub trait MemoryBus {
    /// Reads one byte.
    fn read8(&self, addr: u16) -> u8;

    /// Writes one byte.
    fn write8(&mut self, addr: u16, value: u8);

    /// Reads a little-endian 16-bit word, wrapping at the address-space end.
    fn read16(&self, addr: u16) -> u16 {
        let lo = u16::from(self.read8(addr));
        let hi = u16::from(self.read8(addr.wrapping_add(1)));
        (hi << 8) | lo
    }

    /// Writes a little-endian 16-bit word, wrapping at the address-space end.
    fn write16(&mut self, addr: u16, value: u16) {
        self.write8(addr, (value & 0xFF) as u8);
        self.write8(addr.wrapping_add(1), (value >> 8) as u8);
    }
}

/// Port contract for the `IN`/`OUT` opcode families.
///
/// Peripheral modeling is out of scope; the default implementation behaves
/// as an open bus so that every opcode byte keeps defined behavior.
pub trait IoBus {
    /// Reads one byte from a port.
    fn port_read(&mut self, port: u16) -> u8 {
        let _ = port;
        0xFF
    }

    /// Writes one byte to a port.
    fn port_write(&mut self, port: u16, value: u8) {
        let _ = (port, value);
    }
}

/// Open-bus port implementation for hosts without peripherals.
impl IoBus for () {}

/// Flat 64 KiB memory image with an optional per-address attribute plane.
///
/// The attribute plane carries watch bits consumed by the in-process
/// simulator; the CPU itself never reads it.
#[derive(Debug, Clone)]
pub struct FlatMemory {
    bytes: Box<[u8]>,
    attrs: Box<[u8]>,
}

impl Default for FlatMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl FlatMemory {
    /// Creates a zero-filled image with no attributes set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bytes: vec![0; ADDRESS_SPACE_BYTES].into_boxed_slice(),
            attrs: vec![0; ADDRESS_SPACE_BYTES].into_boxed_slice(),
        }
    }

    /// Copies `data` into the image starting at `addr`, wrapping at the end.
    pub fn load(&mut self, addr: u16, data: &[u8]) {
        let mut cursor = addr;
        for byte in data {
            self.bytes[usize::from(cursor)] = *byte;
            cursor = cursor.wrapping_add(1);
        }
    }

    /// Returns a borrowed view of the full image.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Replaces the full image from a 64 KiB dump.
    ///
    /// Returns `false` (leaving the image untouched) when `dump` is not
    /// exactly the address-space size.
    pub fn restore(&mut self, dump: &[u8]) -> bool {
        if dump.len() != ADDRESS_SPACE_BYTES {
            return false;
        }
        self.bytes.copy_from_slice(dump);
        true
    }

    /// Reads the attribute bits for one address.
    #[must_use]
    pub fn attrs(&self, addr: u16) -> u8 {
        self.attrs[usize::from(addr)]
    }

    /// Sets attribute bits for every address in an inclusive-exclusive span.
    pub fn set_attrs(&mut self, addr: u16, len: u16, mask: u8) {
        let mut cursor = addr;
        for _ in 0..len {
            self.attrs[usize::from(cursor)] |= mask;
            cursor = cursor.wrapping_add(1);
        }
    }

    /// Clears every attribute bit in the plane.
    pub fn clear_attrs(&mut self) {
        self.attrs.fill(0);
    }
}

impl MemoryBus for FlatMemory {
    fn read8(&self, addr: u16) -> u8 {
        self.bytes[usize::from(addr)]
    }

    fn write8(&mut self, addr: u16, value: u8) {
        self.bytes[usize::from(addr)] = value;
    }
}
