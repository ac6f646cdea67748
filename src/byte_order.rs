//! Helpers for the network byte-order length prefix.
//!
//! Frames start with a big-endian `u32`; keeping the conversions here scopes
//! the Clippy expectation to the two places the wire endianness is decided.

/// Serialise a `u32` in network byte order (big-endian).
///
/// # Examples
///
/// ```
/// use framelink::byte_order::write_network_u32;
///
/// assert_eq!(write_network_u32(0x0000_0102), [0x00, 0x00, 0x01, 0x02]);
/// ```
#[must_use]
pub fn write_network_u32(value: u32) -> [u8; 4] {
    #[allow(
        clippy::big_endian_bytes,
        reason = "Frame length prefixes are big-endian on the wire."
    )]
    let bytes = value.to_be_bytes();
    bytes
}

/// Parse a network-order `u32` length prefix.
///
/// # Examples
///
/// ```
/// use framelink::byte_order::read_network_u32;
///
/// assert_eq!(read_network_u32([0x00, 0x00, 0x01, 0x02]), 258);
/// ```
#[must_use]
pub fn read_network_u32(bytes: [u8; 4]) -> u32 {
    #[allow(
        clippy::big_endian_bytes,
        reason = "Frame length prefixes are big-endian on the wire."
    )]
    let value = u32::from_be_bytes(bytes);
    value
}
